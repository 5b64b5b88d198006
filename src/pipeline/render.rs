//! PDF generation: draw the paginated layout via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to drive from async contexts. The coordinator runs
//! [`DocumentRenderer::render`] inside `tokio::task::spawn_blocking`, so
//! implementations are plain synchronous code.
//!
//! The renderer only ever sees records whose media is already resolved to a
//! local path or an explicit absence marker; it never touches the network.

use crate::error::ExportError;
use crate::output::ResolvedRecord;
use crate::pipeline::fonts::{FontSpec, NOTO_SANS, NOTO_SANS_CJK};
use crate::pipeline::layout::{
    layout, missing_notice, Block, FontFace, LayoutOptions, UNDECODABLE_IMAGE,
};
use image::{DynamicImage, ImageReader};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Consumes resolved records in display order and writes the output file.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, records: &[ResolvedRecord], output: &Path) -> Result<(), ExportError>;
}

/// Renders records to PDF with pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    font_dir: PathBuf,
    title: String,
    options: LayoutOptions,
}

impl PdfiumRenderer {
    pub fn new(font_dir: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            font_dir: font_dir.into(),
            title: title.into(),
            options: LayoutOptions::default(),
        }
    }
}

impl DocumentRenderer for PdfiumRenderer {
    fn render(&self, records: &[ResolvedRecord], output: &Path) -> Result<(), ExportError> {
        let pdfium = bind_pdfium()?;
        let mut document = pdfium.create_new_pdf().map_err(render_err)?;

        let latin = load_font(&mut document, &self.font_dir, &NOTO_SANS, false)
            .unwrap_or_else(|| document.fonts_mut().helvetica());
        let wide = load_font(&mut document, &self.font_dir, &NOTO_SANS_CJK, true).unwrap_or(latin);

        let subtitle = format!(
            "Generated at {}  ·  {} records",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            records.len()
        );
        let pages = layout(&self.title, &subtitle, records, image_dimensions, &self.options);
        info!("Rendering {} records onto {} pages", records.len(), pages.len());

        let page_height = self.options.page_height;
        let paper = PdfPagePaperSize::from_points(
            PdfPoints::new(self.options.page_width),
            PdfPoints::new(page_height),
        );

        for page_layout in &pages {
            let mut page = document
                .pages_mut()
                .create_page_at_end(paper)
                .map_err(render_err)?;

            for block in &page_layout.blocks {
                match block {
                    Block::Text {
                        x,
                        y,
                        size,
                        face,
                        text,
                    } => {
                        let font = match face {
                            FontFace::Latin => latin,
                            FontFace::Wide => wide,
                        };
                        page.objects_mut()
                            .create_text_object(
                                PdfPoints::new(*x),
                                PdfPoints::new(page_height - y - size),
                                text,
                                font,
                                PdfPoints::new(*size),
                            )
                            .map_err(render_err)?;
                    }
                    Block::Image {
                        x,
                        y,
                        width,
                        height,
                        path,
                    } => {
                        // The file may have changed since layout checked it.
                        let Some(img) = decode_image(path) else {
                            warn!("Image {} no longer decodes", path.display());
                            let size = self.options.meta_size;
                            page.objects_mut()
                                .create_text_object(
                                    PdfPoints::new(*x),
                                    PdfPoints::new(page_height - y - size),
                                    missing_notice(UNDECODABLE_IMAGE),
                                    latin,
                                    PdfPoints::new(size),
                                )
                                .map_err(render_err)?;
                            continue;
                        };
                        page.objects_mut()
                            .create_image_object(
                                PdfPoints::new(*x),
                                PdfPoints::new(page_height - y - height),
                                &img,
                                Some(PdfPoints::new(*width)),
                                Some(PdfPoints::new(*height)),
                            )
                            .map_err(render_err)?;
                    }
                }
            }
        }

        save_atomically(&document, output)
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH` (file or directory), the working
/// directory, or the system library search path, in that order.
pub fn bind_pdfium() -> Result<Pdfium, ExportError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            Pdfium::bind_to_library(lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExportError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn load_font(
    document: &mut PdfDocument<'_>,
    dir: &Path,
    spec: &FontSpec,
    is_cid_font: bool,
) -> Option<PdfFontToken> {
    let path = spec.path_in(dir);
    match document
        .fonts_mut()
        .load_true_type_from_file(&path, is_cid_font)
    {
        Ok(token) => {
            debug!("Loaded font {} from {}", spec.family, path.display());
            Some(token)
        }
        Err(e) => {
            warn!("Font {} unavailable ({:?}); using fallback", spec.family, e);
            None
        }
    }
}

/// Pixel dimensions of an image file, sniffing the format from its content.
///
/// The whole file is decoded: a truncated download keeps a valid header, and
/// layout must not reserve a box for an image that cannot be drawn.
pub fn image_dimensions(path: &Path) -> Option<(u32, u32)> {
    decode_image(path).map(|img| (img.width(), img.height()))
}

fn decode_image(path: &Path) -> Option<DynamicImage> {
    ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .decode()
        .ok()
}

/// Save to `<output>.tmp` then rename, so a failed save never leaves a
/// truncated PDF under the requested name.
fn save_atomically(document: &PdfDocument<'_>, output: &Path) -> Result<(), ExportError> {
    let write_err = |source: std::io::Error| ExportError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = output.with_extension("pdf.tmp");
    document.save_to_file(&tmp).map_err(render_err)?;
    std::fs::rename(&tmp, output).map_err(write_err)?;
    info!("Wrote {}", output.display());
    Ok(())
}

fn render_err(e: PdfiumError) -> ExportError {
    ExportError::RenderFailed(format!("{:?}", e))
}
