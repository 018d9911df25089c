//! CLI binary for scenesplit.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, drives the pipeline and prints results. Projects live in
//! a JSON file (`--store`) scoped to `--owner`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scenesplit::{
    aggregate, analyze, analyze_into_project, extract_text, normalize_response, resolve_input,
    AnalysisConfig, AnalysisOutput, AnalysisProgressCallback, AnalysisStage, BudgetCategory,
    BudgetDisplay, JsonFileStore, Project, ProjectStatus, ProjectStore, ScriptBreakdown,
    ScriptFormat,
};
use std::io;
use std::path::PathBuf;
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

/// Spinner showing the current stage, with one log line per finished stage.
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
        bar.set_prefix("scenesplit");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: AnalysisStage) {
        self.bar.set_message(format!("{}…", stage.label()));
    }

    fn on_stage_complete(&self, stage: AnalysisStage, detail: &str) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            stage.label(),
            dim(detail)
        ));
    }

    fn on_stage_error(&self, stage: AnalysisStage, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:<24} {}",
            red("✗"),
            stage.label(),
            red(first_line)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print the text scenesplit would send to the model
  scenesplit extract pilot.fdx

  # Analyse a script and print scenes and budget
  scenesplit analyze pilot.pdf

  # Analyse and store the result as a new project
  scenesplit analyze --save pilot.pdf

  # Attach a fresh analysis to an existing project
  scenesplit analyze --project 01927c3e-... revised.fountain

  # Budget display from a saved breakdown or raw model reply
  scenesplit budget --file breakdown.json

  # Project housekeeping
  scenesplit project list
  scenesplit project set-budget 01927c3e-... crew 1200
  scenesplit project status 01927c3e-... completed
  scenesplit project request-review 01927c3e-...
  scenesplit project feedback 01927c3e-... --reject --reanalyze --note "Scene 4 missing"
  scenesplit project awaiting

SUPPORTED FORMATS:
  .pdf                 text layer via pdfium (scanned PDFs are rejected)
  .txt .fountain       plain text
  .fdx                 Final Draft XML

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY           Google Gemini API key (default provider)
  OPENAI_API_KEY           OpenAI API key
  SCENESPLIT_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  SCENESPLIT_MODEL         Override model ID
  SCENESPLIT_STORE         Project store file
  SCENESPLIT_OWNER         Owner identity for project commands
  PDFIUM_LIB_PATH          Directory or file of an existing libpdfium
"#;

/// Break film scripts into scenes, characters, props and budget.
#[derive(Parser, Debug)]
#[command(
    name = "scenesplit",
    version,
    about = "Break film scripts into scenes, characters, props and budget using an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Project store (JSON file).
    #[arg(long, global = true, env = "SCENESPLIT_STORE", default_value = "scenesplit-projects.json")]
    store: PathBuf,

    /// Caller identity; projects are scoped to it.
    #[arg(long, global = true, env = "SCENESPLIT_OWNER", default_value = "local")]
    owner: String,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "SCENESPLIT_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "SCENESPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SCENESPLIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "SCENESPLIT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract plain text from a script (no API key needed).
    Extract {
        /// Local script path or HTTP/HTTPS URL.
        input: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Analyse a script into a breakdown.
    Analyze {
        /// Local script path or HTTP/HTTPS URL.
        input: String,

        /// Attach the analysis to this existing project.
        #[arg(long, conflicts_with = "save")]
        project: Option<String>,

        /// Store the analysis as a new project.
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Show the budget display for a project or a breakdown file.
    Budget {
        /// Project ID in the store.
        #[arg(long, required_unless_present = "file", conflicts_with = "file")]
        project: Option<String>,

        /// Breakdown JSON, or a raw model reply containing one.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Create an empty project.
    New {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List projects, newest first.
    List {
        /// Only projects with this status.
        #[arg(long)]
        status: Option<String>,
    },
    /// List projects whose analysis is waiting for review.
    Awaiting,
    /// Show one project with its breakdown summary.
    Show { id: String },
    /// Change status (ACTIVE, COMPLETED or any label).
    Status { id: String, status: String },
    /// Override one budget category, e.g. `crew 1200`.
    SetBudget {
        id: String,
        category: BudgetCategory,
        amount: f64,
    },
    /// Replace the analysis with a breakdown JSON file.
    SetAnalysis { id: String, file: PathBuf },
    /// Queue the analysis for human review.
    RequestReview { id: String },
    /// Approve or reject the analysis.
    Feedback {
        id: String,
        #[arg(long, required_unless_present = "reject", conflicts_with = "reject")]
        approve: bool,
        #[arg(long)]
        reject: bool,
        /// Ask for the script to be analysed again (with --reject).
        #[arg(long, requires = "reject")]
        reanalyze: bool,
        /// Reviewer comment kept on the project.
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Rename a project.
    Rename { id: String, title: String },
    /// Delete a project.
    Delete { id: String },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCENESPLIT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted script in MiB.
    #[arg(long, env = "SCENESPLIT_MAX_FILE_MB", default_value_t = 50,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    max_file_mb: u64,

    /// Directory (or file) of the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "SCENESPLIT_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "SCENESPLIT_LLM_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SCENESPLIT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "SCENESPLIT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SCENESPLIT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Wait for the model at most this many seconds.
    #[arg(long, env = "SCENESPLIT_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Truncate script text beyond this many characters.
    #[arg(long, env = "SCENESPLIT_MAX_SCRIPT_CHARS", default_value_t = 400_000)]
    max_script_chars: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback during analysis, so INFO logs are
    // suppressed while it is active.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::Analyze { .. });
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

    let store = JsonFileStore::new(&cli.store);

    match &cli.command {
        Command::Extract { input, source } => run_extract(&cli, input, source).await,
        Command::Analyze {
            input,
            project,
            save,
            source,
            llm,
        } => {
            let progress = show_progress.then(CliProgressCallback::new);
            let result = run_analyze(
                &cli,
                &store,
                input,
                project.as_deref(),
                *save,
                source,
                llm,
                progress.clone(),
            )
            .await;
            if let Some(p) = progress {
                p.finish();
            }
            if let Err(ref e) = result {
                print_retry_hint(e);
            }
            result
        }
        Command::Budget { project, file } => {
            run_budget(&cli, &store, project.as_deref(), file.as_ref()).await
        }
        Command::Project(cmd) => run_project(&cli, &store, cmd),
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn run_extract(cli: &Cli, input: &str, args: &SourceArgs) -> Result<()> {
    let source = resolve_input(input, args.download_timeout, args.max_file_mb as usize * 1024 * 1024)
        .await
        .context("Failed to read script")?;
    let format = ScriptFormat::detect(&source.filename, source.content_type.as_deref())?;
    let text = extract_text(&source.bytes, format, args.pdfium_lib_path.as_deref())
        .await
        .context("Extraction failed")?;

    if cli.json {
        let value = serde_json::json!({
            "filename": source.filename,
            "format": format,
            "chars": text.chars().count(),
            "text": text,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_analyze(
    cli: &Cli,
    store: &JsonFileStore,
    input: &str,
    project_id: Option<&str>,
    save: bool,
    source_args: &SourceArgs,
    llm: &LlmArgs,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<()> {
    let config = build_config(source_args, llm, progress).await?;

    let (project, output) = if project_id.is_some() || save {
        let source = resolve_input(input, config.download_timeout_secs, config.max_file_size_bytes)
            .await
            .context("Failed to read script")?;
        let (project, output) =
            analyze_into_project(store, &cli.owner, project_id, source, &config)
                .await
                .context("Analysis failed")?;
        (Some(project), output)
    } else {
        (None, analyze(input, &config).await.context("Analysis failed")?)
    };

    if cli.json {
        let value = match &project {
            Some(p) => serde_json::json!({ "projectId": p.id, "analysis": output }),
            None => serde_json::to_value(&output)?,
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_analysis(&output);
    if let Some(p) = project {
        println!();
        println!("{} saved to project {} ({})", green("✔"), bold(&p.title), dim(&p.id));
    }
    if !cli.quiet {
        let m = &output.metadata;
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total{}",
            dim(&m.prompt_tokens.to_string()),
            dim(&m.completion_tokens.to_string()),
            m.total_duration_ms,
            if m.truncated {
                format!("  ·  {}", red("script text truncated"))
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

async fn run_budget(
    cli: &Cli,
    store: &JsonFileStore,
    project_id: Option<&str>,
    file: Option<&PathBuf>,
) -> Result<()> {
    let breakdown: ScriptBreakdown = match (project_id, file) {
        (Some(id), _) => store
            .get(&cli.owner, id)?
            .analysis_data
            .with_context(|| format!("Project {id} has no analysis yet"))?,
        (None, Some(path)) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            normalize_response(&raw).context("No breakdown found in file")?
        }
        (None, None) => anyhow::bail!("Pass --project or --file"),
    };

    let display = aggregate(&breakdown.budget);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&display)?);
    } else {
        print_budget(&display);
    }
    Ok(())
}

fn run_project(cli: &Cli, store: &JsonFileStore, cmd: &ProjectCommand) -> Result<()> {
    let owner = cli.owner.as_str();
    let project = match cmd {
        ProjectCommand::New { title, description } => {
            let mut project = Project::new(owner, title.as_str());
            if let Some(d) = description {
                project = project.with_description(d.as_str());
            }
            store.create(project)?
        }
        ProjectCommand::List { status } => {
            let projects = match status {
                Some(label) => store.list_by_status(owner, &ProjectStatus::new(label))?,
                None => store.list(owner)?,
            };
            return print_project_list(cli, &projects);
        }
        ProjectCommand::Awaiting => {
            let awaiting = ProjectStatus::new(ProjectStatus::AWAITING_FEEDBACK);
            return print_project_list(cli, &store.list_by_status(owner, &awaiting)?);
        }
        ProjectCommand::Show { id } => store.get(owner, id)?,
        ProjectCommand::Status { id, status } => {
            let status = ProjectStatus::new(status);
            store.update(owner, id, &|p| Ok(p.with_status(status.clone())))?
        }
        ProjectCommand::SetBudget {
            id,
            category,
            amount,
        } => {
            if !amount.is_finite() || *amount < 0.0 {
                anyhow::bail!("Budget amount must be a non-negative number (got {amount})");
            }
            store.update(owner, id, &|p| p.with_budget_override(*category, *amount))?
        }
        ProjectCommand::SetAnalysis { id, file } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            store.update(owner, id, &|p| p.with_analysis_replaced(&raw))?
        }
        ProjectCommand::RequestReview { id } => {
            store.update(owner, id, &|p| p.with_review_requested())?
        }
        ProjectCommand::Feedback {
            id,
            approve,
            reject,
            reanalyze,
            note,
        } => {
            let approved = *approve && !*reject;
            store.update(owner, id, &|p| p.with_feedback(approved, *reanalyze, note))?
        }
        ProjectCommand::Rename { id, title } => {
            store.update(owner, id, &|p| Ok(p.with_title(title.as_str())))?
        }
        ProjectCommand::Delete { id } => {
            store.delete(owner, id)?;
            if !cli.quiet {
                eprintln!("{} deleted {}", green("✔"), dim(id));
            }
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&project)?);
    } else {
        print_project(&project);
    }
    Ok(())
}

// ── Output ───────────────────────────────────────────────────────────────────

fn print_analysis(output: &AnalysisOutput) {
    let s = &output.summary;
    println!(
        "{} {} scenes  ·  {} characters  ·  {} locations  ·  {} props",
        cyan("◆"),
        bold(&s.total_scenes.to_string()),
        s.total_characters,
        s.total_locations,
        s.total_props
    );
    println!();
    for scene in &output.breakdown.scenes {
        let cast: Vec<&str> = scene.characters.iter().map(String::as_str).collect();
        println!(
            "  {:>3}  {:<40}  {}",
            scene.number,
            scene.heading,
            dim(&cast.join(", "))
        );
    }
    println!();
    print_budget(&output.budget);
}

fn print_budget(display: &BudgetDisplay) {
    println!("{}  RM {}", bold("Budget"), display.total);
    if display.lines.is_empty() {
        println!("  {}", dim("no amounts"));
        return;
    }
    for line in &display.lines {
        let width = (line.percent / 5.0).round() as usize;
        println!(
            "  {:<18} {:>12}  {:>5.1}%  {}",
            line.name,
            format!("RM {}", line.amount),
            line.percent,
            cyan(&"█".repeat(width))
        );
    }
}

fn print_project_list(cli: &Cli, projects: &[Project]) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(projects)?);
    } else if projects.is_empty() {
        println!("{}", dim("No projects."));
    } else {
        for p in projects {
            print_project_row(p);
        }
    }
    Ok(())
}

fn print_project_row(p: &Project) {
    println!(
        "{}  {:<10}  {:<32}  {}",
        dim(&p.id),
        p.status.as_str(),
        p.title,
        p.budget_total
            .map(|t| format!("RM {t}"))
            .unwrap_or_else(|| dim("no analysis"))
    );
}

fn print_project(p: &Project) {
    println!("{}", bold(&p.title));
    println!("  ID:       {}", p.id);
    println!("  Status:   {}", p.status);
    if let Some(ref d) = p.description {
        println!("  About:    {}", d);
    }
    if let Some(ref f) = p.script_filename {
        println!("  Script:   {}", f);
    }
    println!("  Updated:  {}", p.updated_at.format("%Y-%m-%d %H:%M"));
    for note in &p.review_notes {
        let verdict = if note.approved { green("approved") } else { red("rejected") };
        println!("  Review:   {} {}  {}", verdict, note.text, dim(&note.created_at.format("%Y-%m-%d").to_string()));
    }
    if let Some(ref breakdown) = p.analysis_data {
        let s = breakdown.summary();
        println!(
            "  Scenes:   {}  ·  characters {}  ·  locations {}",
            s.total_scenes, s.total_characters, s.total_locations
        );
        println!();
        print_budget(&aggregate(&breakdown.budget));
    }
}

fn print_retry_hint(err: &anyhow::Error) {
    if let Some(hint) = err
        .downcast_ref::<scenesplit::SceneSplitError>()
        .and_then(|e| e.retry_hint())
    {
        eprintln!("{} {}", cyan("hint:"), hint);
    }
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(
    source: &SourceArgs,
    llm: &LlmArgs,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .temperature(llm.temperature)
        .max_tokens(llm.max_tokens)
        .api_timeout_secs(llm.api_timeout)
        .download_timeout_secs(source.download_timeout)
        .max_file_size_bytes(source.max_file_mb as usize * 1024 * 1024)
        .max_script_chars(llm.max_script_chars);

    if let Some(ref path) = llm.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = llm.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = llm.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref path) = source.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
