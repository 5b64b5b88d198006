//! CLI binary for tweetpdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExportConfig` and prints results.

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tweetpdf::pipeline::fonts::ensure_fonts;
use tweetpdf::{
    export, format_size, DateRange, ExportConfig, ExportOutput, ExportProgressCallback,
    FetchResult, HostMatch, MediaSummary, OutcomeKind, ProgressCallback, SortOrder,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner until the URL count is known, then a
/// bar that advances once per resolved media URL. Downloads complete out of
/// order, so only failures get their own log line.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading CSV and checking fonts…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} media  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Downloading");
        self.bar.reset_eta();
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_fetch_start(&self, total_urls: usize) {
        self.activate_bar(total_urls);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Resolving {total_urls} media URLs…"))
        ));
    }

    fn on_media_complete(&self, url: &str, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Rejected => {
                self.bar
                    .println(format!("  {} {}  {}", dim("–"), dim(url), dim("not allowed")));
            }
            OutcomeKind::Failed => {
                self.bar
                    .println(format!("  {} {}  {}", red("✗"), url, red("failed")));
            }
            OutcomeKind::CachedHit | OutcomeKind::Downloaded => {}
        }
        self.bar.inc(1);
    }

    fn on_fetch_complete(&self, summary: &MediaSummary) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}",
            if summary.failed == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            media_line(summary)
        );
    }

    fn on_render_start(&self, records: usize) {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {records} records…"))
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download fonts only
  tweetpdf --init

  # Export everything (writes tweets.pdf next to the CSV)
  tweetpdf --csv tweets.csv

  # One month, newest first, 8 parallel downloads
  tweetpdf --csv tweets.csv --start 2024-01-01 --end 2024-01-31 --sort desc -c 8

  # Allow any image host, keep the media cache for the next run
  tweetpdf --csv tweets.csv --allow-hosts "" --keep-cache

  # JSON report
  tweetpdf --csv tweets.csv --json > report.json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Overrides the log filter (e.g. tweetpdf=debug)
  TWEETPDF_*              Every flag also reads TWEETPDF_<FLAG>
"#;

/// Export a CSV of timestamped posts to a single offline PDF.
#[derive(Parser, Debug)]
#[command(
    name = "tweetpdf",
    version,
    about = "Export a CSV of timestamped posts to a single offline PDF",
    long_about = "Read a CSV export of posts, keep those in a date range, download their \
images with bounded concurrency from allow-listed hosts, and render everything into one PDF. \
Downloaded media is cached under a content-addressed name and removed once the PDF is written.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input CSV file.
    #[arg(long, env = "TWEETPDF_CSV")]
    csv: Option<PathBuf>,

    /// Output PDF path. Default: the CSV path with a .pdf extension.
    #[arg(short, long, env = "TWEETPDF_OUT")]
    out: Option<PathBuf>,

    /// First day to include (YYYY-MM-DD). Requires --end.
    #[arg(long, env = "TWEETPDF_START")]
    start: Option<String>,

    /// Last day to include (YYYY-MM-DD). Requires --start.
    #[arg(long, env = "TWEETPDF_END")]
    end: Option<String>,

    /// Record order by date.
    #[arg(long, env = "TWEETPDF_SORT", value_enum, default_value = "asc")]
    sort: SortArg,

    /// Number of parallel media downloads.
    #[arg(short, long, env = "TWEETPDF_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: u32,

    /// Comma-separated hosts media may be downloaded from. Empty allows all.
    #[arg(
        long,
        env = "TWEETPDF_ALLOW_HOSTS",
        default_value = "pbs.twimg.com,video.twimg.com"
    )]
    allow_hosts: String,

    /// How allowlist entries match a URL's host.
    #[arg(long, env = "TWEETPDF_HOST_MATCH", value_enum, default_value = "subdomain")]
    host_match: HostMatchArg,

    /// Cache directory; media is stored in its `media/` subdirectory.
    #[arg(long, env = "TWEETPDF_DOWNLOAD_DIR", default_value = ".tweetpdf_cache")]
    download_dir: PathBuf,

    /// Keep downloaded media after the PDF is written.
    #[arg(long, env = "TWEETPDF_KEEP_CACHE")]
    keep_cache: bool,

    /// Directory holding (or receiving) the Noto font files.
    #[arg(long, env = "TWEETPDF_FONT_DIR", default_value = "fonts")]
    font_dir: PathBuf,

    /// Document title printed on the first page.
    #[arg(long, env = "TWEETPDF_TITLE", default_value = "Tweet Export")]
    title: String,

    /// Per-attempt HTTP timeout in seconds.
    #[arg(long, env = "TWEETPDF_DOWNLOAD_TIMEOUT", default_value_t = 20,
          value_parser = clap::value_parser!(u64).range(1..))]
    download_timeout: u64,

    /// Download attempts per media URL.
    #[arg(long, env = "TWEETPDF_MAX_ATTEMPTS", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Download the fonts and exit.
    #[arg(long)]
    init: bool,

    /// Print the export report as JSON on stdout.
    #[arg(long, env = "TWEETPDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TWEETPDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TWEETPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TWEETPDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Asc,
    Desc,
}

impl From<SortArg> for SortOrder {
    fn from(v: SortArg) -> Self {
        match v {
            SortArg::Asc => SortOrder::Ascending,
            SortArg::Desc => SortOrder::Descending,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum HostMatchArg {
    Exact,
    Subdomain,
}

impl From<HostMatchArg> for HostMatch {
    fn from(v: HostMatchArg) -> Self {
        match v {
            HostMatchArg::Exact => HostMatch::Exact,
            HostMatchArg::Subdomain => HostMatch::Subdomain,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.init;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if !cli.quiet && !cli.json {
        eprintln!(
            "{}",
            dim(&format!(
                "tweetpdf {}  @Copyright (C) 2020 - {}",
                env!("CARGO_PKG_VERSION"),
                chrono::Local::now().year()
            ))
        );
    }

    // ── Init mode ────────────────────────────────────────────────────────
    if cli.init {
        let config = build_config(&cli, None)?;
        let fetched = ensure_fonts(&config)
            .await
            .context("Failed to download fonts")?;
        if !cli.quiet {
            eprintln!(
                "{} Init complete: fonts are ready in {} ({} downloaded)",
                green("✔"),
                config.font_dir.display(),
                fetched.len()
            );
        }
        return Ok(());
    }

    let csv = cli
        .csv
        .clone()
        .context("Missing required argument: --csv")?;
    let out = cli.out.clone().unwrap_or_else(|| csv.with_extension("pdf"));

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExportProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run export ───────────────────────────────────────────────────────
    let output = export(&csv, &out, &config)
        .await
        .with_context(|| format!("Export of {} failed", csv.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, &config, show_progress);
    }

    Ok(())
}

/// Map CLI args to `ExportConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExportConfig> {
    let date_range = DateRange::parse(cli.start.as_deref(), cli.end.as_deref())
        .context("Invalid --start/--end")?;

    let allow_hosts: Vec<String> = cli
        .allow_hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    let mut builder = ExportConfig::builder()
        .concurrency(cli.concurrency as usize)
        .cache_dir(&cli.download_dir)
        .allow_hosts(allow_hosts)
        .host_match(cli.host_match.into())
        .purge_cache(!cli.keep_cache)
        .max_attempts(cli.max_attempts)
        .download_timeout_secs(cli.download_timeout)
        .date_range(date_range)
        .sort(cli.sort.into())
        .font_dir(&cli.font_dir)
        .title(&cli.title);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn media_line(summary: &MediaSummary) -> String {
    format!(
        "Media: {} succeeded, {} rejected, {} failed",
        summary.succeeded(),
        summary.rejected,
        summary.failed
    )
}

fn print_summary(output: &ExportOutput, config: &ExportConfig, show_progress: bool) {
    println!("Records in output scope: {}", output.stats.records);
    if output.stats.skipped_rows > 0 {
        println!(
            "  {} rows skipped (unparseable date)",
            output.stats.skipped_rows
        );
    }

    // The progress callback already printed the media line and failures.
    if !show_progress {
        println!("{}", media_line(&output.summary));
        for outcome in &output.outcomes {
            if let FetchResult::Failed { error } = &outcome.result {
                println!("  {} {}  {}", red("✗"), outcome.url, error);
            }
        }
    }

    match output.report {
        Some(report) => println!(
            "Cache cleaned: removed {} files, freed {}",
            report.removed_files,
            format_size(report.freed_bytes)
        ),
        None => println!("Cache kept in {}", config.media_dir().display()),
    }
    println!(
        "{} wrote {}  {}",
        green("OK:"),
        bold(&output.output_path.display().to_string()),
        dim(&format!("{}ms", output.stats.total_duration_ms))
    );
}
