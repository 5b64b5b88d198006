//! Font files used by the PDF renderer.
//!
//! Two Noto faces cover Latin and CJK text. They are looked up in the font
//! directory and downloaded once if missing (`tweetpdf --init` does only
//! this step).

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::pipeline::fetch::{build_client, download_with_retry, RetryPolicy};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// A font face the renderer loads from the font directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontSpec {
    pub family: &'static str,
    pub filename: &'static str,
    pub url: &'static str,
}

/// Latin face: used for lines without wide characters.
pub const NOTO_SANS: FontSpec = FontSpec {
    family: "Noto Sans",
    filename: "NotoSans-Regular.ttf",
    url: "https://raw.githubusercontent.com/notofonts/noto-fonts/main/hinted/ttf/NotoSans/NotoSans-Regular.ttf",
};

/// CJK face: used for any line containing characters outside Latin Extended.
pub const NOTO_SANS_CJK: FontSpec = FontSpec {
    family: "Noto Sans CJK SC",
    filename: "NotoSansCJKsc-Regular.otf",
    url: "https://raw.githubusercontent.com/notofonts/noto-cjk/main/Sans/OTF/SimplifiedChinese/NotoSansCJKsc-Regular.otf",
};

pub const FONT_SPECS: [FontSpec; 2] = [NOTO_SANS, NOTO_SANS_CJK];

impl FontSpec {
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.filename)
    }
}

/// Fonts whose file is absent (or empty) in `dir`.
pub fn missing_fonts(dir: &Path) -> Vec<FontSpec> {
    FONT_SPECS
        .iter()
        .filter(|spec| {
            std::fs::metadata(spec.path_in(dir))
                .map(|m| m.len() == 0)
                .unwrap_or(true)
        })
        .copied()
        .collect()
}

/// Download any missing font into `config.font_dir`.
///
/// Returns the fonts that were fetched. Any failure is fatal: without its
/// fonts the renderer cannot lay out text reliably.
pub async fn ensure_fonts(config: &ExportConfig) -> Result<Vec<FontSpec>, ExportError> {
    let dir = &config.font_dir;
    let missing = missing_fonts(dir);
    if missing.is_empty() {
        info!("Fonts already present in {}", dir.display());
        return Ok(missing);
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ExportError::FontUnavailable {
            name: dir.display().to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloading {} missing font(s)", missing.len());
    let client = build_client(config)?;
    let policy = RetryPolicy::from_config(config);

    for spec in &missing {
        let unavailable = |reason: String| ExportError::FontUnavailable {
            name: spec.filename.to_string(),
            reason,
        };

        let bytes = download_with_retry(&client, spec.url, policy, None)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let target = spec.path_in(dir);
        let font_dir = dir.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&font_dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| ExportError::Internal(format!("Font write task panicked: {}", e)))?
        .map_err(|e| unavailable(e.to_string()))?;

        info!("Installed font {}", spec.family);
    }

    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fonts_missing_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(missing_fonts(dir.path()), FONT_SPECS.to_vec());
    }

    #[test]
    fn empty_font_file_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(NOTO_SANS.path_in(dir.path()), b"").unwrap();
        std::fs::write(NOTO_SANS_CJK.path_in(dir.path()), b"otf").unwrap();
        assert_eq!(missing_fonts(dir.path()), vec![NOTO_SANS]);
    }

    #[tokio::test]
    async fn present_fonts_need_no_network() {
        let dir = tempfile::tempdir().unwrap();
        for spec in FONT_SPECS {
            std::fs::write(spec.path_in(dir.path()), b"font").unwrap();
        }
        let config = ExportConfig::builder().font_dir(dir.path()).build().unwrap();
        assert!(ensure_fonts(&config).await.unwrap().is_empty());
    }
}
