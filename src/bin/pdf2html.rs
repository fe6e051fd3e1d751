//! CLI binary for edgequake-pdf2html.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one stage (or all three in batch mode) and turns
//! an empty stage into a non-zero exit status.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_pdf2html::{
    annotate_dir, extract_dir, process_batch, render_pdf, AnthropicClient, PipelineConfig,
    ProgressCallback, RasterFormat, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_PROMPT_FILE: &str = "prompt.txt";

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar, re-armed at the start of each stage,
/// plus a log line per page. Pages may complete out of order when
/// `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(Stage, u32), Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, stage: Stage, page: u32) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&(stage, page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix(stage.to_string());
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{stage}: {total_pages} pages"))
        ));
    }

    fn on_page_start(&self, stage: Stage, page: u32) {
        self.start_times
            .lock()
            .unwrap()
            .insert((stage, page), Instant::now());
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, stage: Stage, page: u32) {
        let secs = self.elapsed(stage, page);
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, stage: Stage, page: u32, error: &str) {
        let secs = self.elapsed(stage, page);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            page,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let mark = if failed == 0 {
            green("✔")
        } else if success_count == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        self.bar.println(format!(
            "{} {}: {}/{} pages{}",
            mark,
            stage,
            bold(&success_count.to_string()),
            total_pages,
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run every stage over each PDF in ./pdfs → ./output_images/<stem>/
  pdf2html

  # Render one PDF into page images
  pdf2html render report.pdf --out output_images

  # Send every p<N>.png in output_images to the model
  pdf2html annotate --out output_images

  # Pull the ```html blocks out of the replies and build combined.html
  pdf2html extract --out output_images

FILES:
  {out}/p{n}.png                      page images       (render)
  {out}/claude_responses/p{n}.json    model replies     (annotate)
  {out}/p{n}.html                     page fragments    (extract)
  {out}/combined.html                 all fragments     (extract)

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (annotate and batch mode)
  PDF2HTML_MODEL          Override model ID
  PDF2HTML_BATCH_DIR      Batch input directory (default: pdfs)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override the log filter

EXIT STATUS:
  Non-zero when a stage fails to start or produces no artifacts at all.
"#;

/// Convert PDF pages to HTML with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2html",
    version,
    about = "Convert PDF pages to HTML with a vision model",
    long_about = "Render PDF pages to images, send each image to an Anthropic vision model \
with a prompt, and extract the ```html block from every reply into per-page fragments and a \
combined document. Without a subcommand, all three stages run over every PDF in the batch \
directory.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Batch mode: directory of PDFs to process.
    #[arg(long, env = "PDF2HTML_BATCH_DIR", default_value = "pdfs")]
    batch_dir: PathBuf,

    /// Batch mode: root directory; each PDF gets `<out>/<stem>/`.
    #[arg(short, long, default_value = "output_images")]
    out: PathBuf,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Read the API key from this file (takes precedence over --api-key).
    #[arg(long, global = true)]
    api_key_file: Option<PathBuf>,

    /// Prompt file. Defaults to ./prompt.txt when it exists, else the built-in prompt.
    #[arg(long, env = "PDF2HTML_PROMPT_FILE", global = true)]
    prompt_file: Option<PathBuf>,

    /// Model ID.
    #[arg(long, env = "PDF2HTML_MODEL", global = true)]
    model: Option<String>,

    /// Max output tokens per page.
    #[arg(long, env = "PDF2HTML_MAX_TOKENS", default_value_t = 4096, global = true)]
    max_tokens: u32,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2HTML_DPI", default_value_t = 300, global = true,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page image format.
    #[arg(long, value_enum, default_value = "png", global = true)]
    format: FormatArg,

    /// Number of pages annotated at once.
    #[arg(short, long, env = "PDF2HTML_CONCURRENCY", default_value_t = 1, global = true)]
    concurrency: usize,

    /// Retries per page on transient API errors.
    #[arg(long, env = "PDF2HTML_MAX_RETRIES", default_value_t = 0, global = true)]
    max_retries: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2HTML_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Path to libpdfium (file or containing directory).
    #[arg(long, env = "PDFIUM_LIB_PATH", global = true)]
    pdfium_lib: Option<PathBuf>,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "PDF2HTML_DOWNLOAD_TIMEOUT", default_value_t = 120, global = true)]
    download_timeout: u64,

    /// Per-request API timeout in seconds.
    #[arg(long, env = "PDF2HTML_API_TIMEOUT", default_value_t = 300, global = true)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF2HTML_NO_PROGRESS", global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2HTML_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2HTML_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every page of a PDF (path or URL) to p<N>.png.
    Render {
        /// Local PDF file path or HTTP/HTTPS URL.
        pdf: String,

        /// Output directory for page images.
        #[arg(short, long, default_value = "output_images")]
        out: PathBuf,
    },

    /// Send every page image in a directory to the model.
    Annotate {
        /// Directory holding p<N> images; replies go to <out>/claude_responses/.
        #[arg(short, long, default_value = "output_images")]
        out: PathBuf,
    },

    /// Extract HTML fragments from the model replies and build combined.html.
    Extract {
        /// Directory holding claude_responses/; fragments are written here.
        #[arg(short, long, default_value = "output_images")]
        out: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for RasterFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => RasterFormat::Png,
            FormatArg::Jpeg => RasterFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs; --verbose brings them back.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone()).await?;

    let outcome = run(&cli, &config).await;
    if let Some(bar) = &progress {
        bar.finish();
    }
    outcome
}

async fn run(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    match &cli.command {
        Some(Command::Render { pdf, out }) => {
            let output = render_pdf(pdf, out, config)
                .await
                .context("Render failed")?;
            if !output.is_success() {
                anyhow::bail!("No pages were rendered from '{}'", pdf);
            }
            summary(
                cli,
                &format!(
                    "{}/{} pages rendered into '{}'",
                    output.pages.len(),
                    output.total_pages,
                    out.display()
                ),
                output.failures.is_empty(),
            );
        }

        Some(Command::Annotate { out }) => {
            let model = AnthropicClient::from_config(config).context("Annotate failed")?;
            let report = annotate_dir(out, &model, config)
                .await
                .context("Annotate failed")?;
            if !report.is_success() {
                anyhow::bail!(
                    "No responses were written for the {} images in '{}'",
                    report.attempted,
                    out.display()
                );
            }
            summary(
                cli,
                &format!(
                    "{}/{} responses saved to '{}'  {}",
                    report.written.len(),
                    report.attempted,
                    config.responses_dir_in(out).display(),
                    dim(&format!("{}ms", report.duration_ms))
                ),
                report.failures.is_empty(),
            );
        }

        Some(Command::Extract { out }) => {
            let report = extract_dir(out, config).await.context("Extract failed")?;
            if !report.is_success() {
                anyhow::bail!(
                    "No HTML fragments found in '{}'",
                    config.responses_dir_in(out).display()
                );
            }
            let combined = report
                .combined_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            summary(
                cli,
                &format!(
                    "{} fragments  →  {}",
                    report.fragments.len(),
                    bold(&combined)
                ),
                report.missing.is_empty() && report.failures.is_empty(),
            );
        }

        None => {
            let model = AnthropicClient::from_config(config).context("Batch failed")?;
            let report = process_batch(&cli.batch_dir, &cli.out, &model, config)
                .await
                .context("Batch failed")?;

            for (pdf, error) in &report.errors {
                eprintln!("{} {}: {}", red("✘"), pdf.display(), error);
            }
            if !report.is_success() {
                anyhow::bail!(
                    "No PDF in '{}' made it through all three stages",
                    cli.batch_dir.display()
                );
            }
            let done = report.documents.iter().filter(|d| d.is_success()).count();
            let total = report.documents.len() + report.errors.len();
            summary(
                cli,
                &format!("{done}/{total} documents converted into '{}'", cli.out.display()),
                done == total,
            );
        }
    }
    Ok(())
}

fn summary(cli: &Cli, line: &str, clean: bool) {
    if !cli.quiet {
        eprintln!("{}  {}", if clean { green("✔") } else { cyan("⚠") }, line);
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .image_format(cli.format.into())
        .max_tokens(cli.max_tokens)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(key) = read_api_key(cli).await? {
        builder = builder.api_key(key);
    }
    if let Some(prompt) = read_prompt(cli.prompt_file.as_deref()).await? {
        builder = builder.prompt(prompt);
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(password) = &cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(lib) = &cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb as Arc<dyn ProgressCallback>);
    }

    builder.build().context("Invalid configuration")
}

async fn read_api_key(cli: &Cli) -> Result<Option<String>> {
    match &cli.api_key_file {
        Some(path) => {
            let key = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read API key from {:?}", path))?;
            Ok(Some(key.trim().to_string()))
        }
        None => Ok(cli.api_key.clone()),
    }
}

/// An explicit prompt file must exist; the default `prompt.txt` is optional.
async fn read_prompt(explicit: Option<&Path>) -> Result<Option<String>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_PROMPT_FILE);
            if !default.is_file() {
                return Ok(None);
            }
            default
        }
    };
    let prompt = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))?;
    Ok(Some(prompt.trim().to_string()))
}
