use std::path::PathBuf;
use std::sync::Arc;

use aparavi_dtc::{
    shutdown, CleanupGuard, DtcConfig, PipelineDefinition, PipelineSession, SendOutcome,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "aparavi-dtc",
    about = "Anonymize PII in text with an Aparavi DTC pipeline",
    version
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "aparavi-dtc.toml")]
    config: PathBuf,

    /// API key (overrides config and APARAVI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Service base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Minutes to wait for the pipeline to reach Running
    #[arg(long)]
    timeout_minutes: Option<f64>,

    /// Pipeline definition JSON to use instead of the embedded one
    #[arg(long)]
    pipeline: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a pipeline, anonymize each TEXT (or stdin), then tear it down
    Anonymize {
        /// Texts to anonymize; stdin is read as one text when omitted
        text: Vec<String>,
    },
    /// Validate the pipeline definition with the service
    Validate,
    /// Print the pipeline's components without contacting the service
    Pipeline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Pipeline => {
            print_pipeline(&config)?;
        }
        Commands::Validate => {
            let session = PipelineSession::from_config(&config)?;
            let verdict = session.validate().await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::Anonymize { text } => {
            let inputs = if text.is_empty() {
                vec![read_stdin().await?]
            } else {
                text
            };

            let session = Arc::new(PipelineSession::from_config(&config)?);
            let guard = CleanupGuard::new(session.clone());
            let mut hook = shutdown::install(session.clone());

            let work = anonymize(&session, &inputs);
            tokio::pin!(work);

            let result = tokio::select! {
                result = &mut work => result,
                Some(signal) = hook.wait() => {
                    // The hook has already released the pipeline.
                    std::process::exit(signal.exit_code());
                }
            };

            hook.disarm();
            guard.release().await;
            result?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> aparavi_dtc::Result<DtcConfig> {
    let mut config = DtcConfig::load(&cli.config)?.with_env()?;

    if let Some(key) = &cli.api_key {
        config.api_key = key.clone();
    }
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if let Some(minutes) = cli.timeout_minutes {
        config.start_timeout_minutes = minutes;
    }
    if let Some(path) = &cli.pipeline {
        config.pipeline_file = Some(path.clone());
    }

    tracing::debug!(config = ?config, "Configuration loaded");
    Ok(config)
}

async fn anonymize(session: &PipelineSession, inputs: &[String]) -> aparavi_dtc::Result<()> {
    session.start().await?;

    for text in inputs {
        match session.send(text).await? {
            SendOutcome::Anonymized(clean) => println!("{}", clean),
            SendOutcome::Raw(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        }
    }

    Ok(())
}

async fn read_stdin() -> std::io::Result<String> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

fn print_pipeline(config: &DtcConfig) -> aparavi_dtc::Result<()> {
    let definition = match &config.pipeline_file {
        Some(path) => PipelineDefinition::from_file(path)?,
        None => PipelineDefinition::embedded()?,
    };

    println!(
        "source: {}",
        definition.source_component().unwrap_or("(none)")
    );
    for component in definition.components() {
        let inputs: Vec<String> = component
            .inputs
            .iter()
            .map(|(lane, from)| format!("{}:{}", lane, from))
            .collect();
        if inputs.is_empty() {
            println!("{} ({})", component.id, component.provider);
        } else {
            println!(
                "{} ({}) <- {}",
                component.id,
                component.provider,
                inputs.join(", ")
            );
        }
    }
    Ok(())
}
