//! CLI binary for edgequake-pdfslim.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! library calls and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdfslim::pipeline::input::{is_url, read_input, write_atomic};
use edgequake_pdfslim::{
    compact_async, convert_remote, inspect, lock, remove_links_from_pdf, unlock,
    CompactConfig, CompactionProgressCallback, CompressionProfile, PipelineResult,
    ProfileLevel, ProgressCallback, SourceStage, StageOutcome, StageReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_remote_jobs::{HttpJobClient, Operation, DEFAULT_POLL_INTERVAL};
use std::io;
use std::path::{Path, PathBuf};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl CompactionProgressCallback for CliProgressCallback {
    fn on_compaction_start(&self, original_size: u64, page_count: usize) {
        self.bar.set_prefix("Compacting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{} pages, {}",
                page_count,
                human_bytes(original_size)
            ))
        ));
    }

    fn on_stage_start(&self, stage: SourceStage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: SourceStage, report: &StageReport) {
        let size = report
            .size
            .map(|s| dim(&format!("{:>10}", human_bytes(s))))
            .unwrap_or_default();
        let elapsed = dim(&format!("{:.1}s", report.elapsed_ms as f64 / 1000.0));
        let line = match &report.outcome {
            StageOutcome::Accepted => format!("  {} {:<17} {}  {}", green("✓"), stage, size, elapsed),
            StageOutcome::NotSmaller => {
                format!("  {} {:<17} {}  {}  {}", dim("·"), stage, size, dim("not smaller"), elapsed)
            }
            StageOutcome::Unchanged => {
                format!("  {} {:<17} {}  {}", dim("·"), stage, dim("unchanged"), elapsed)
            }
            StageOutcome::Failed { error } => {
                let mut msg = error.to_string();
                if msg.len() > 80 {
                    msg = format!("{}\u{2026}", msg.chars().take(79).collect::<String>());
                }
                format!("  {} {:<17} {}  {}", red("✗"), stage, red(&msg), elapsed)
            }
            StageOutcome::Skipped { reason } => {
                format!("  {} {:<17} {}", dim("-"), stage, dim(reason))
            }
        };
        self.bar.println(line);
    }

    fn on_stage_skipped(&self, stage: SourceStage, reason: &str) {
        self.bar
            .println(format!("  {} {:<17} {}", dim("-"), stage, dim(reason)));
    }

    fn on_compaction_complete(&self, _result: &PipelineResult) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default (medium) compaction next to the input: report.min.pdf
  pdfslim compress report.pdf

  # Aggressive, with a 30 second budget
  pdfslim compress --level high --deadline-secs 30 scan.pdf -o scan.small.pdf

  # Custom JPEG settings
  pdfslim compress --level medium --quality 60 --max-dimension 1600 photos.pdf

  # Compact a download, JSON report on stdout
  pdfslim compress https://example.com/paper.pdf -o paper.pdf --json

  # Strip hyperlinks
  pdfslim remove-links brochure.pdf -o brochure.nolinks.pdf

  # Password protection
  pdfslim lock contract.pdf --password hunter2
  pdfslim unlock contract.locked.pdf --password hunter2

  # Document summary
  pdfslim inspect report.pdf --json

  # Outsource to a remote conversion service
  pdfslim remote --endpoint https://api.example.com/v1 --token $TOKEN \
      --operation word report.pdf -o report.docx

LEVELS:
  low      structural cleanup only (lossless)
  medium   + JPEG re-encoding of large images (quality 70, max 2000 px)
  high     + object streams, text-page rewriting, metadata trimming
           (quality 50, max 1500 px)

ENVIRONMENT VARIABLES:
  PDFSLIM_LEVEL, PDFSLIM_QUALITY, PDFSLIM_MAX_DIMENSION, PDFSLIM_DEADLINE_SECS,
  PDFSLIM_PASSWORD, PDFSLIM_REMOTE_ENDPOINT, PDFSLIM_REMOTE_TOKEN,
  PDFSLIM_REMOTE_MAX_WAIT_SECS, PDFSLIM_DOWNLOAD_TIMEOUT, PDFSLIM_VERBOSE,
  PDFSLIM_QUIET, PDFSLIM_NO_PROGRESS
  RUST_LOG overrides the log filter.
"#;

/// Shrink PDF files through an adaptive multi-stage pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "pdfslim",
    version,
    about = "Shrink PDF files through an adaptive multi-stage pipeline",
    long_about = "Shrink PDF documents (local files or URLs). Each stage produces a candidate \
that is re-parsed and page-counted; the smallest valid one wins, so the output is never \
worse than a lossless structural pass.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSLIM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFSLIM_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFSLIM_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, global = true, env = "PDFSLIM_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compact a PDF.
    Compress(CompressArgs),
    /// Remove every hyperlink annotation.
    RemoveLinks(IoArgs),
    /// Encrypt with a password.
    Lock(PasswordArgs),
    /// Remove password protection.
    Unlock(PasswordArgs),
    /// Print document metadata without modifying anything.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        /// Output JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Run a conversion on a remote job service.
    Remote(RemoteArgs),
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output file. Defaults to a suffixed name next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompressArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Compression level: low, medium, high.
    #[arg(short, long, env = "PDFSLIM_LEVEL", value_enum, default_value = "medium")]
    level: LevelArg,

    /// JPEG quality for re-encoded images (1–100). Default depends on level.
    #[arg(long, env = "PDFSLIM_QUALITY",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Longest image side in pixels after downsampling. Default depends on level.
    #[arg(long, env = "PDFSLIM_MAX_DIMENSION")]
    max_dimension: Option<u32>,

    /// Stop starting new stages after this many seconds.
    #[arg(long, env = "PDFSLIM_DEADLINE_SECS")]
    deadline_secs: Option<u64>,

    /// Print the pipeline report as JSON on stdout.
    #[arg(long, env = "PDFSLIM_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct PasswordArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Document password.
    #[arg(short, long, env = "PDFSLIM_PASSWORD")]
    password: String,
}

#[derive(Args, Debug)]
struct RemoteArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Base URL of the job service.
    #[arg(long, env = "PDFSLIM_REMOTE_ENDPOINT")]
    endpoint: String,

    /// Bearer token for the job service.
    #[arg(long, env = "PDFSLIM_REMOTE_TOKEN")]
    token: Option<String>,

    /// Conversion to run.
    #[arg(long, value_enum, default_value = "compress")]
    operation: OperationArg,

    /// Server-side level for `--operation compress`.
    #[arg(short, long, value_enum, default_value = "medium")]
    level: LevelArg,

    /// Give up after this many seconds of polling.
    #[arg(long, env = "PDFSLIM_REMOTE_MAX_WAIT_SECS", default_value_t = 300)]
    max_wait_secs: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LevelArg {
    Low,
    Medium,
    High,
}

impl From<LevelArg> for ProfileLevel {
    fn from(v: LevelArg) -> Self {
        match v {
            LevelArg::Low => ProfileLevel::Low,
            LevelArg::Medium => ProfileLevel::Medium,
            LevelArg::High => ProfileLevel::High,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OperationArg {
    Compress,
    Word,
    Excel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let json = matches!(
        cli.command,
        Command::Compress(CompressArgs { json: true, .. }) | Command::Inspect { json: true, .. }
    );
    let show_progress = !cli.quiet && !cli.no_progress && !json;
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

    match cli.command {
        Command::Compress(ref args) => run_compress(&cli, args, show_progress).await,
        Command::RemoveLinks(ref args) => {
            let bytes = read(&cli, &args.input).await?;
            let out = remove_links_from_pdf(&bytes).context("Failed to remove links")?;
            let path = output_path(args, "nolinks", "pdf");
            write_atomic(&path, &out.bytes).context("Failed to write output")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} link(s) removed from {} page(s)  →  {}",
                    green("✔"),
                    out.removed,
                    out.pages_touched,
                    bold(&path.display().to_string())
                );
            }
            Ok(())
        }
        Command::Lock(ref args) => {
            let bytes = read(&cli, &args.io.input).await?;
            let out = lock(&bytes, &args.password).context("Failed to encrypt PDF")?;
            let path = output_path(&args.io, "locked", "pdf");
            write_atomic(&path, &out).context("Failed to write output")?;
            if !cli.quiet {
                eprintln!("{}  encrypted  →  {}", green("✔"), bold(&path.display().to_string()));
            }
            Ok(())
        }
        Command::Unlock(ref args) => {
            let bytes = read(&cli, &args.io.input).await?;
            let out = unlock(&bytes, &args.password).context("Failed to decrypt PDF")?;
            let path = output_path(&args.io, "unlocked", "pdf");
            write_atomic(&path, &out).context("Failed to write output")?;
            if !cli.quiet {
                eprintln!("{}  decrypted  →  {}", green("✔"), bold(&path.display().to_string()));
            }
            Ok(())
        }
        Command::Inspect { ref input, json } => {
            let bytes = read(&cli, input).await?;
            let meta = inspect(&bytes).context("Failed to inspect PDF")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
                return Ok(());
            }
            println!("File:         {}", input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            println!("Encrypted:    {}", meta.is_encrypted);
            println!("Size:         {}", human_bytes(meta.file_size));
            if !meta.is_encrypted {
                println!(
                    "Images:       {} ({} above {})",
                    meta.image_count,
                    meta.large_image_count,
                    human_bytes(edgequake_pdfslim::config::DEFAULT_SIZE_FLOOR_BYTES)
                );
                println!(
                    "Annotations:  {} ({} links)",
                    meta.annotation_count, meta.link_count
                );
            }
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
            Ok(())
        }
        Command::Remote(ref args) => run_remote(&cli, args).await,
    }
}

async fn run_compress(cli: &Cli, args: &CompressArgs, show_progress: bool) -> Result<()> {
    let config = build_config(cli, args, show_progress)?;
    let bytes = read(cli, &args.io.input).await?;
    let result = compact_async(bytes, config)
        .await
        .context("Compaction failed")?;

    let path = output_path(&args.io, "min", "pdf");
    write_atomic(&path, result.best.bytes()).context("Failed to write output")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} → {}  ({:.1}% smaller, {})  {}ms  →  {}",
            if result.deadline_reached {
                cyan("⚠")
            } else {
                green("✔")
            },
            human_bytes(result.original_size),
            bold(&human_bytes(result.best.size())),
            result.ratio() * 100.0,
            result.best.source_stage(),
            result.duration_ms,
            bold(&path.display().to_string()),
        );
        if result.deadline_reached {
            eprintln!("   {}", dim("deadline reached; later stages were skipped"));
        }
    }
    Ok(())
}

async fn run_remote(cli: &Cli, args: &RemoteArgs) -> Result<()> {
    let bytes = read(cli, &args.io.input).await?;
    let operation = match args.operation {
        OperationArg::Compress => Operation::CompressPdf {
            level: ProfileLevel::from(args.level).to_string(),
        },
        OperationArg::Word => Operation::PdfToWord,
        OperationArg::Excel => Operation::PdfToExcel,
    };
    let extension = match args.operation {
        OperationArg::Compress => "pdf",
        OperationArg::Word => "docx",
        OperationArg::Excel => "xlsx",
    };

    let mut client = HttpJobClient::new(&args.endpoint, Duration::from_secs(cli.download_timeout))
        .context("Failed to build HTTP client")?;
    if let Some(ref token) = args.token {
        client = client.with_token(token);
    }

    let spinner = (!cli.quiet && !cli.no_progress).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_message(format!("waiting for remote {}…", operation.path()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });
    let result = convert_remote(
        &client,
        &bytes,
        &operation,
        Duration::from_secs(args.max_wait_secs),
        DEFAULT_POLL_INTERVAL,
    )
    .await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let out = result.context("Remote conversion failed")?;

    let path = output_path(&args.io, "remote", extension);
    write_atomic(&path, &out).context("Failed to write output")?;
    if !cli.quiet {
        eprintln!(
            "{}  {} → {}  →  {}",
            green("✔"),
            human_bytes(bytes.len() as u64),
            human_bytes(out.len() as u64),
            bold(&path.display().to_string())
        );
    }
    Ok(())
}

/// Map CLI args to `CompactConfig`.
fn build_config(cli: &Cli, args: &CompressArgs, show_progress: bool) -> Result<CompactConfig> {
    let level = ProfileLevel::from(args.level);
    let mut profile = CompressionProfile::builder(level);
    if let Some(q) = args.quality {
        profile = profile.image_quality(q);
    }
    if let Some(px) = args.max_dimension {
        profile = profile.max_image_dimension(px);
    }
    let profile = profile.build().context("Invalid compression profile")?;

    let mut builder = CompactConfig::builder()
        .profile(profile)
        .download_timeout_secs(cli.download_timeout);
    if let Some(secs) = args.deadline_secs {
        builder = builder.deadline(Duration::from_secs(secs));
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

async fn read(cli: &Cli, input: &str) -> Result<Vec<u8>> {
    read_input(input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to read {input}"))
}

/// `-o` if given, else `<stem>.<suffix>.<extension>` next to a local input
/// or in the working directory for URLs.
fn output_path(args: &IoArgs, suffix: &str, extension: &str) -> PathBuf {
    if let Some(ref p) = args.output {
        return p.clone();
    }
    let input = args.input.trim_end_matches('/');
    let name = input.rsplit('/').next().unwrap_or("output");
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    let file = format!("{stem}.{suffix}.{extension}");
    if is_url(input) {
        return PathBuf::from(file);
    }
    match Path::new(input).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file),
        _ => PathBuf::from(file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(input: &str) -> IoArgs {
        IoArgs {
            input: input.to_string(),
            output: None,
        }
    }

    #[test]
    fn url_output_lands_in_working_directory() {
        assert_eq!(
            output_path(&io("https://example.com/papers/report.pdf"), "min", "pdf"),
            PathBuf::from("report.min.pdf")
        );
    }

    #[test]
    fn local_output_sits_next_to_input() {
        assert_eq!(
            output_path(&io("scans/report.pdf"), "min", "pdf"),
            PathBuf::from("scans/report.min.pdf")
        );
        let explicit = IoArgs {
            input: "scans/report.pdf".into(),
            output: Some(PathBuf::from("out.pdf")),
        };
        assert_eq!(output_path(&explicit, "min", "pdf"), PathBuf::from("out.pdf"));
    }
}
