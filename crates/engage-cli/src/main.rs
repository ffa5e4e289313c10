//! CLI binary for validating Engage manifests, resolving targets, and running
//! surveys.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use engage_engine::{
    run_list_survey, run_survey, BranchedSurvey, ConsoleResponder, EventEmitter, HttpSurveySubmitter,
    ListSurvey, Manifest, RecordingSubmitter, RenderMode, Responder, ScriptedResponder, Severity,
    SkipResponder, SubmitRetry, SurveyConfig, SurveySubmitter,
};
use engage_types::DataContext;

#[derive(Parser)]
#[command(name = "engage", version, about = "Targeting and branching survey engine for interaction manifests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint a manifest
    Validate {
        /// Path to the manifest JSON file
        manifest: PathBuf,
    },

    /// Show the interactions and targeted events of a manifest
    Info {
        /// Path to the manifest JSON file
        manifest: PathBuf,
    },

    /// Resolve which interaction an event would show
    Target {
        /// Path to the manifest JSON file
        manifest: PathBuf,

        /// Event name, e.g. app_launch
        event: String,

        /// JSON file with the data context (device, person, counts)
        #[arg(short, long)]
        context: Option<PathBuf>,
    },

    /// Run a survey interaction and submit or print its response
    Survey {
        /// Path to the manifest JSON file
        manifest: PathBuf,

        /// Id of the survey interaction
        interaction_id: String,

        /// JSON file mapping question ids to answer entries
        #[arg(short, long, conflicts_with = "console")]
        answers: Option<PathBuf>,

        /// Ask each question on the terminal
        #[arg(long)]
        console: bool,

        /// JSON file with the data context invokes are evaluated against
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Post the response to this API base URL instead of printing it
        /// (default: $ENGAGE_API_URL)
        #[arg(long)]
        submit_url: Option<String>,

        /// Conversation id (default: $ENGAGE_CONVERSATION_ID)
        #[arg(long)]
        conversation: Option<String>,

        /// Conversation token (default: $ENGAGE_CONVERSATION_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Times a rejected answer is asked before giving up
        #[arg(long, default_value = "3")]
        max_attempts: usize,

        /// Submission attempts for retryable failures
        #[arg(long, default_value = "3")]
        submit_attempts: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { manifest } => {
            cmd_validate(&manifest)?;
        }
        Commands::Info { manifest } => {
            cmd_info(&manifest)?;
        }
        Commands::Target { manifest, event, context } => {
            cmd_target(&manifest, &event, context.as_deref())?;
        }
        Commands::Survey {
            manifest,
            interaction_id,
            answers,
            console,
            context,
            submit_url,
            conversation,
            token,
            max_attempts,
            submit_attempts,
        } => {
            let submit_url = submit_url.or_else(|| std::env::var("ENGAGE_API_URL").ok());
            let submitter: Box<dyn SurveySubmitter> = match submit_url {
                Some(url) => Box::new(HttpSurveySubmitter::new(
                    url,
                    or_env(conversation, "conversation", "ENGAGE_CONVERSATION_ID")?,
                    or_env(token, "token", "ENGAGE_CONVERSATION_TOKEN")?,
                )),
                None => Box::new(RecordingSubmitter::new()),
            };
            let responder: Box<dyn Responder> = match (answers, console) {
                (Some(path), _) => Box::new(ScriptedResponder::from_json(read_json(&path)?)?),
                (None, true) => Box::new(ConsoleResponder),
                (None, false) => Box::new(SkipResponder),
            };
            let config = SurveyConfig {
                max_attempts,
                submit_retry: SubmitRetry {
                    attempts: submit_attempts,
                    ..SubmitRetry::default()
                },
                ..SurveyConfig::default()
            };
            cmd_survey(
                &manifest,
                &interaction_id,
                load_context(context.as_deref())?,
                responder.as_ref(),
                submitter.as_ref(),
                &config,
            )
            .await?;
        }
    }

    Ok(())
}

fn or_env(value: Option<String>, flag: &str, var: &str) -> anyhow::Result<String> {
    match value {
        Some(v) => Ok(v),
        None => std::env::var(var).with_context(|| format!("--{flag} not given and {var} is not set")),
    }
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    Manifest::load(path).with_context(|| format!("loading manifest {}", path.display()))
}

fn load_context(path: Option<&Path>) -> anyhow::Result<DataContext> {
    match path {
        Some(path) => Ok(DataContext::from_value(read_json(path)?)),
        None => Ok(DataContext::new()),
    }
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let manifest = load_manifest(path)?;
    let diagnostics = engage_engine::validate(&manifest);

    if diagnostics.is_empty() {
        println!("Manifest is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        match &diag.interaction_id {
            Some(id) => println!("[{}] {} ({}): {}", severity, diag.rule, id, diag.message),
            None => println!("[{}] {}: {}", severity, diag.rule, diag.message),
        }
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let manifest = load_manifest(path)?;

    println!("Interactions: {}", manifest.interactions.len());
    for interaction in &manifest.interactions {
        match interaction.survey_definition() {
            Ok(survey) => println!(
                "  {} [{}] {} set(s), {} question(s)",
                interaction.id,
                interaction.interaction_type,
                survey.question_sets.len(),
                survey.all_questions().count()
            ),
            Err(_) => println!("  {} [{}]", interaction.id, interaction.interaction_type),
        }
    }

    let mut events: Vec<_> = manifest.targets.iter().collect();
    events.sort_by(|a, b| a.0.cmp(b.0));
    println!("Events: {}", events.len());
    for (event, invocations) in events {
        let ids: Vec<_> = invocations.iter().map(|i| i.interaction_id.as_str()).collect();
        println!("  {} -> {}", event, ids.join(", "));
    }
    Ok(())
}

fn cmd_target(path: &Path, event: &str, context: Option<&Path>) -> anyhow::Result<()> {
    let manifest = load_manifest(path)?;
    let context = load_context(context)?;

    match engage_engine::resolve(event, &manifest.targets, &context) {
        Some(invocation) => println!("{}", invocation.interaction_id),
        None => {
            println!("No interaction targeted for '{event}'");
            std::process::exit(2);
        }
    }
    Ok(())
}

async fn cmd_survey(
    path: &Path,
    interaction_id: &str,
    context: DataContext,
    responder: &dyn Responder,
    submitter: &dyn SurveySubmitter,
    config: &SurveyConfig,
) -> anyhow::Result<()> {
    let manifest = load_manifest(path)?;
    let definition = Arc::new(manifest.survey(interaction_id)?);
    let emitter = EventEmitter::default();

    let payload = match definition.render_as {
        RenderMode::Paged => {
            let mut survey = BranchedSurvey::new(interaction_id, definition, context, emitter, config)?;
            run_survey(&mut survey, responder, submitter, config).await?
        }
        RenderMode::List => {
            let mut survey = ListSurvey::new(interaction_id, definition, emitter, config)?;
            run_list_survey(&mut survey, responder, submitter, config).await?
        }
    };

    tracing::info!(survey = %payload.response.id, nonce = %payload.response.nonce, "Survey complete");
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
