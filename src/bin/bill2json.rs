//! CLI binary for edgequake-bill2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints the response envelope as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_bill2json::{
    BillExtractor, ExtractionConfig, ExtractionProgressCallback, ExtractionResult,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Self::with_bar(ProgressBar::new(0))
    }

    fn with_bar(bar: ProgressBar) -> Arc<Self> {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Fetching bill…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Clear the bar if the run ended before `on_extraction_complete`.
    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Extracting");
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, item_count: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{item_count} item(s)")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, _total_pages: usize, _pages_with_items: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a bill from a URL (JSON on stdout)
  bill2json https://example.com/bills/sample_2.png

  # Local PDF, write result to a file
  bill2json discharge_bill.pdf -o result.json

  # Use a different model server
  bill2json --ollama-url http://gpu-box:11434 --model llava:13b bill.pdf

  # Check that the model server is up
  bill2json --health

OUTPUT:
  {
    "is_success": true,
    "token_usage": { "total_tokens": …, "input_tokens": …, "output_tokens": … },
    "data": {
      "pagewise_line_items": [
        { "page_no": "1", "page_type": "Final Bill", "bill_items": [ … ] }
      ],
      "total_item_count": 1
    }
  }

ENVIRONMENT VARIABLES:
  OLLAMA_URL        Model server base URL (default http://localhost:11434)
  OLLAMA_MODEL      Vision model (default llama3.2-vision:11b)
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory)
  RUST_LOG          Override log filter
"#;

/// Extract line items from medical bills using a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "bill2json",
    version,
    about = "Extract line items from medical bills (PDF or image) using a vision LLM",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bill URL (http/https) or local file path.
    #[arg(required_unless_present = "health")]
    input: Option<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "BILL2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Ollama server base URL.
    #[arg(long, env = "OLLAMA_URL", default_value = edgequake_bill2json::config::DEFAULT_BASE_URL)]
    ollama_url: String,

    /// Vision model name.
    #[arg(long, env = "OLLAMA_MODEL", default_value = edgequake_bill2json::config::DEFAULT_MODEL)]
    model: String,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "BILL2JSON_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "BILL2JSON_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// Per-page model call timeout in seconds.
    #[arg(long, env = "BILL2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Text file with a custom page prompt ({page_no} is substituted).
    #[arg(long, env = "BILL2JSON_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Emit compact single-line JSON.
    #[arg(long)]
    compact: bool,

    /// Only probe the model server and exit.
    #[arg(long)]
    health: bool,

    /// Disable progress bar.
    #[arg(long, env = "BILL2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BILL2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BILL2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose && !cli.health;
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

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn ExtractionProgressCallback>);

    let config = build_config(&cli, progress).await?;
    let extractor = BillExtractor::new(config).context("Failed to create model client")?;

    // ── Health-only mode ─────────────────────────────────────────────────
    if cli.health {
        let ok = extractor.connected().await;
        let report = serde_json::json!({
            "status": if ok { "healthy" } else { "degraded" },
            "model_connected": ok,
            "model": cli.model,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let input = cli.input.as_deref().unwrap_or_default();
    let result = extractor.extract_bill_data(input).await;
    if let Some(ref cb) = cli_progress {
        cb.finish();
    }

    let json = if cli.compact {
        serde_json::to_string(&result)
    } else {
        serde_json::to_string_pretty(&result)
    }
    .context("Failed to serialise result")?;

    match cli.output {
        Some(ref path) => write_atomic(path, &json).await?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        print_summary(&result, cli.output.as_deref());
    }

    Ok(if result.is_success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .base_url(&cli.ollama_url)
        .model(&cli.model)
        .dpi(cli.dpi)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.prompt_file {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt_template(template);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write via temp file + rename so readers never see a partial result.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move result into {:?}", path))?;
    Ok(())
}

fn print_summary(result: &ExtractionResult, output: Option<&Path>) {
    if result.is_success {
        let target = output
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{} {} item(s) on {} page(s){}",
            green("✔"),
            bold(&result.data.total_item_count.to_string()),
            result.data.pagewise_line_items.len(),
            target,
        );
        eprintln!(
            "   ~{} tokens in  /  ~{} tokens out",
            dim(&result.token_usage.input_tokens.to_string()),
            dim(&result.token_usage.output_tokens.to_string()),
        );
    } else {
        eprintln!(
            "{} {}",
            red("✘"),
            result.error.as_deref().unwrap_or("extraction failed")
        );
    }
}
