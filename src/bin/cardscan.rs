//! CLI binary for cardscan.
//!
//! A thin shim over the library crate: maps CLI flags and environment
//! variables to `ScanConfig`, then either serves HTTP or scans one image.

use anyhow::{Context, Result};
use cardscan::{serve, CardScanner, OcrFailurePolicy, PaddleModels, ScanConfig, ScanResponse};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the HTTP API on the default address
  cardscan serve

  # Upload a card
  curl -F file=@card.jpg http://127.0.0.1:8000/scan-card/

  # Scan a local image once and print the JSON response
  cardscan scan card.jpg --pretty

  # Use Anthropic through edgequake-llm instead of the Responses API
  cardscan --provider anthropic --model claude-sonnet-4-20250514 scan card.jpg

  # Add the PaddleOCR engine
  cardscan --paddle-det models/det.onnx --paddle-rec models/rec.onnx \
           --paddle-dict models/en_dict.txt serve

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            Responses API key (required unless --provider is set)
  OPENAI_BASE_URL           Responses API base URL
  CARDSCAN_MODEL            Model ID (default: gpt-5-mini)
  CARDSCAN_PROVIDER         edgequake-llm provider (anthropic, gemini, ollama, …)
  CARDSCAN_TESSERACT        Tesseract executable (default: tesseract on PATH)
  CARDSCAN_PADDLE_DET/REC/DICT  PaddleOCR model files
  CARDSCAN_BIND             Listen address for `serve`
  RUST_LOG                  Log filter, overrides -v / -q

  A .env file in the working directory is loaded first.
"#;

/// Extract structured contact data from business-card images.
#[derive(Parser, Debug)]
#[command(
    name = "cardscan",
    version,
    about = "Extract structured contact data from business-card images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    scan: ScanArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CARDSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CARDSCAN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `POST /scan-card/` over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "CARDSCAN_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },
    /// Scan one local image and print the JSON response.
    Scan {
        /// Image file (PNG or JPEG).
        image: PathBuf,

        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Model ID.
    #[arg(long, global = true, env = "CARDSCAN_MODEL", default_value = cardscan::config::DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider; if unset the Responses API is called directly.
    #[arg(long, global = true, env = "CARDSCAN_PROVIDER")]
    provider: Option<String>,

    /// Responses API key.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Responses API base URL.
    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = cardscan::config::DEFAULT_API_BASE)]
    api_base: String,

    /// Model call timeout in seconds.
    #[arg(long, global = true, env = "CARDSCAN_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Tesseract executable.
    #[arg(long, global = true, env = "CARDSCAN_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Tesseract language.
    #[arg(long, global = true, env = "CARDSCAN_TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,

    /// PaddleOCR detection model.
    #[arg(long, global = true, env = "CARDSCAN_PADDLE_DET", requires_all = ["paddle_rec", "paddle_dict"])]
    paddle_det: Option<PathBuf>,

    /// PaddleOCR recognition model.
    #[arg(long, global = true, env = "CARDSCAN_PADDLE_REC", requires_all = ["paddle_det", "paddle_dict"])]
    paddle_rec: Option<PathBuf>,

    /// PaddleOCR character dictionary.
    #[arg(long, global = true, env = "CARDSCAN_PADDLE_DICT", requires_all = ["paddle_det", "paddle_rec"])]
    paddle_dict: Option<PathBuf>,

    /// Directory for transient uploads.
    #[arg(long, global = true, env = "CARDSCAN_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Maximum request body in bytes.
    #[arg(long, global = true, env = "CARDSCAN_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// What to do when OCR fails.
    #[arg(long, global = true, env = "CARDSCAN_OCR_FAILURE", value_enum, default_value = "abort")]
    ocr_failure: OcrFailureArg,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OcrFailureArg {
    Abort,
    Continue,
}

impl From<OcrFailureArg> for OcrFailurePolicy {
    fn from(v: OcrFailureArg) -> Self {
        match v {
            OcrFailureArg::Abort => OcrFailurePolicy::Abort,
            OcrFailureArg::Continue => OcrFailurePolicy::Continue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `env = ...` arguments see values from .env.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // ── Build scanner ────────────────────────────────────────────────────
    // Probing tesseract and loading ONNX models is blocking work.
    let config = build_config(&cli.scan)?;
    let scanner = tokio::task::block_in_place(|| CardScanner::from_config(config))
        .context("Failed to initialise scanner")?;
    let scanner = Arc::new(scanner);

    match cli.command {
        Command::Serve { bind } => serve(bind, scanner).await.context("Server failed"),
        Command::Scan { image, pretty } => scan_once(&scanner, image, pretty, cli.quiet).await,
    }
}

async fn scan_once(scanner: &CardScanner, image: PathBuf, pretty: bool, quiet: bool) -> Result<()> {
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(format!("Scanning {}…", image.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    };

    let response: ScanResponse = match scanner.scan_path(&image).await {
        Ok(output) => output.into(),
        Err(e) => ScanResponse::failure(e),
    };
    spinner.finish_and_clear();

    let json = if pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    }
    .context("Failed to serialise response")?;
    println!("{json}");

    if let ScanResponse::Failure { error } = response {
        anyhow::bail!("Scan failed: {error}");
    }
    Ok(())
}

/// Map CLI args to `ScanConfig`.
fn build_config(args: &ScanArgs) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder()
        .model(&args.model)
        .api_base(&args.api_base)
        .api_timeout_secs(args.api_timeout)
        .tesseract_path(&args.tesseract)
        .tesseract_lang(&args.tesseract_lang)
        .max_upload_bytes(args.max_upload_bytes)
        .ocr_failure(args.ocr_failure.clone().into());

    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref dir) = args.upload_dir {
        builder = builder.upload_dir(dir);
    }
    if let (Some(det), Some(rec), Some(dict)) = (&args.paddle_det, &args.paddle_rec, &args.paddle_dict) {
        builder = builder.paddle_models(PaddleModels::new(det, rec, dict));
    }

    builder.build().context("Invalid configuration")
}
