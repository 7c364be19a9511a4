//! CLI binary for faxtriage.
//!
//! A thin shim over the library crate: `classify` maps flags to
//! `ClassifierConfig` and runs a batch; `validate` scores a saved batch.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use faxtriage::{
    classify_directory, load_outcome_records, BatchProgressCallback, ClassificationValidator,
    ClassifierConfig, GroundTruth, LlmBackend, PageCapPolicy, Pricing, ProgressCallback,
    TokenUsageReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} faxes  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Classifying");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Classifying {total_documents} fax(es)…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, filename: &str, label: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<42} {}",
            green("✓"),
            index,
            total,
            filename,
            dim(label)
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(['…']).collect()
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<42} {}",
            red("✗"),
            index,
            total,
            filename,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, error_count: usize) {
        self.bar.finish_and_clear();
        if error_count == 0 {
            eprintln!("{} {} fax(es) classified", green("✔"), bold(&total_documents.to_string()));
        } else {
            eprintln!(
                "{} {}/{} fax(es) classified  ({} failed)",
                red("✘"),
                total_documents - error_count,
                total_documents,
                red(&error_count.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify every PDF in test_cases/ and save the batch artifact
  faxtriage classify test_cases -o results/classification_results.json

  # Score a saved batch against the built-in corpus and print a table
  faxtriage validate results/classification_results.json --table

  # Use a custom ground-truth file
  faxtriage validate results.json --ground-truth truth.json -o report.json

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (preferred when present)
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (anthropic, openai, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Classify scanned medical faxes with a vision LLM and score the results.
#[derive(Parser, Debug)]
#[command(
    name = "faxtriage",
    version,
    about = "Classify scanned medical faxes with a vision LLM and score them against ground truth",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FAXTRIAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FAXTRIAGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render and classify every PDF in a directory.
    Classify(ClassifyArgs),
    /// Score a saved batch artifact against ground truth.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Directory containing the fax PDFs.
    dir: PathBuf,

    /// Where to write the batch artifact.
    #[arg(short, long, env = "FAXTRIAGE_OUTPUT",
          default_value = "results/classification_results.json")]
    output: PathBuf,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "FAXTRIAGE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Documents with more pages than this are classified from a prefix.
    #[arg(long, env = "FAXTRIAGE_PAGE_THRESHOLD", default_value_t = 5)]
    page_threshold: usize,

    /// Number of leading pages sent for long documents.
    #[arg(long, env = "FAXTRIAGE_PAGE_PREFIX", default_value_t = 3)]
    page_prefix: usize,

    /// Labels below this confidence become "other".
    #[arg(long, env = "FAXTRIAGE_CONFIDENCE_THRESHOLD", default_value_t = 0.65)]
    confidence_threshold: f64,

    /// Max output tokens per document.
    #[arg(long, env = "FAXTRIAGE_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Total attempts per classifier call.
    #[arg(long, env = "FAXTRIAGE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// USD per million input tokens.
    #[arg(long, env = "FAXTRIAGE_PRICE_INPUT", default_value_t = 3.0)]
    price_input: f64,

    /// USD per million output tokens.
    #[arg(long, env = "FAXTRIAGE_PRICE_OUTPUT", default_value_t = 15.0)]
    price_output: f64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FAXTRIAGE_PASSWORD")]
    password: Option<String>,

    /// Text file replacing the built-in classification instructions.
    #[arg(long, env = "FAXTRIAGE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Ground-truth JSON; defaults to the built-in fax corpus.
    #[arg(long, env = "FAXTRIAGE_GROUND_TRUTH")]
    ground_truth: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long, env = "FAXTRIAGE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Batch artifact (or bare list of records) to score.
    #[arg(default_value = "results/classification_results.json")]
    results: PathBuf,

    /// Where to write the validation report.
    #[arg(short, long, env = "FAXTRIAGE_REPORT",
          default_value = "results/validation_report.json")]
    output: PathBuf,

    /// Print the per-document comparison table.
    #[arg(long)]
    table: bool,

    /// Ground-truth JSON; defaults to the built-in fax corpus.
    #[arg(long, env = "FAXTRIAGE_GROUND_TRUTH")]
    ground_truth: Option<PathBuf>,
}

async fn load_ground_truth(path: Option<&Path>) -> Result<GroundTruth> {
    match path {
        Some(p) => GroundTruth::from_json_file(p)
            .await
            .with_context(|| format!("Failed to load ground truth from {}", p.display())),
        None => Ok(GroundTruth::fax_corpus()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Library INFO logs are suppressed while the progress bar is active.
    let show_progress = match &cli.command {
        Command::Classify(args) => !cli.quiet && !args.no_progress,
        Command::Validate(_) => false,
    };
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
        Command::Classify(args) => run_classify(args, show_progress, cli.quiet).await,
        Command::Validate(args) => run_validate(args, cli.quiet).await,
    }
}

async fn run_classify(args: ClassifyArgs, show_progress: bool, quiet: bool) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("'{}' is not a directory", args.dir.display());
    }

    let mut builder = ClassifierConfig::builder()
        .dpi(args.dpi)
        .page_cap(PageCapPolicy {
            threshold: args.page_threshold,
            prefix: args.page_prefix,
        })
        .confidence_threshold(args.confidence_threshold)
        .max_tokens(args.max_tokens)
        .max_attempts(args.max_attempts)
        .pricing(Pricing {
            input_per_million: args.price_input,
            output_per_million: args.price_output,
        });

    if let Some(model) = args.model {
        builder = builder.model(model);
    }
    if let Some(provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(password) = args.password {
        builder = builder.password(password);
    }
    if let Some(ref prompt_path) = args.system_prompt {
        let prompt = std::fs::read_to_string(prompt_path)
            .with_context(|| format!("Failed to read system prompt: {}", prompt_path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;
    let ground_truth = load_ground_truth(args.ground_truth.as_deref()).await?;
    let backend = LlmBackend::from_config(&config).context("Failed to set up LLM provider")?;

    let run = classify_directory(&args.dir, &backend, &config, &ground_truth)
        .await
        .with_context(|| format!("Failed to classify {}", args.dir.display()))?;

    let artifact = run.to_artifact();
    faxtriage::artifact::write_json(&args.output, &artifact)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if !quiet {
        print_batch_summary(
            artifact.total_documents,
            artifact.correct_classifications,
            artifact.accuracy_percent,
            &artifact.token_usage,
        );
        eprintln!("{} results saved to {}", dim("→"), args.output.display());
    }
    Ok(())
}

fn print_batch_summary(total: usize, correct: usize, accuracy: f64, usage: &TokenUsageReport) {
    eprintln!();
    eprintln!("{}", bold("Classification summary"));
    eprintln!("  Accuracy:  {}/{} ({:.1}%)", correct, total, accuracy);
    eprintln!(
        "  Tokens:    {} in / {} out ({} total)",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    );
    eprintln!("  Est. cost: ${:.4}", usage.estimated_cost_usd);
}

async fn run_validate(args: ValidateArgs, quiet: bool) -> Result<()> {
    let records = load_outcome_records(&args.results)
        .await
        .with_context(|| format!("Failed to load results from {}", args.results.display()))?;
    let ground_truth = load_ground_truth(args.ground_truth.as_deref()).await?;

    let mut validator = ClassificationValidator::new(ground_truth);
    validator
        .validate_records(&records)
        .context("Results reference a document with no expected classification")?;

    if args.table {
        println!("{}", validator.comparison_table());
    }

    let report = validator
        .save_report(&args.output)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if !quiet {
        let s = &report.summary;
        eprintln!();
        eprintln!("{}", bold("Validation summary"));
        eprintln!(
            "  Overall:   {}/{} ({:.1}%)",
            s.correct_classifications, s.total_documents, s.accuracy_percent
        );
        eprintln!(
            "  Edge:      {}/{} ({:.1}%)",
            s.edge_cases.correct, s.edge_cases.total, s.edge_cases.accuracy_percent
        );
        eprintln!(
            "  Standard:  {}/{} ({:.1}%)",
            s.standard_cases.correct, s.standard_cases.total, s.standard_cases.accuracy_percent
        );
        for m in &report.misclassifications {
            eprintln!(
                "  {} {}: expected {}, got {}",
                red("✗"),
                m.filename,
                m.expected,
                m.actual
            );
        }
        eprintln!("{} report saved to {}", dim("→"), args.output.display());
    }
    Ok(())
}
