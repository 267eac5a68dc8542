mod interactive;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use intervo_config::AppConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Parser)]
#[command(
    name = "intervo",
    version,
    about = "Adaptive technical interviews driven by a multi-agent LM pipeline"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run an interactive interview session in the terminal (default).
    Start {
        /// Override the configured model id.
        #[arg(long)]
        model: Option<String>,
        /// Override the configured turn limit.
        #[arg(long)]
        max_turns: Option<u32>,
    },
    /// List model ids advertised by the LM endpoint.
    Models,
    /// Print the resolved configuration and check endpoint reachability.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Start { model: None, max_turns: None }) {
        Commands::Start { model, max_turns } => {
            if let Some(model) = model {
                config.llm.model = model;
            }
            if let Some(max_turns) = max_turns {
                config.session.max_turns = max_turns.max(1);
            }
            interactive::run_interview(config).await?;
        }
        Commands::Models => {
            let models = intervo_llm::list_models(
                &config.llm.base_url,
                config.llm.api_key.as_deref().unwrap_or(""),
                Duration::from_secs(config.llm.timeout_secs),
            )
            .await;
            if models.is_empty() {
                println!("no models advertised; default model: {}", config.llm.model);
            } else {
                for model in models {
                    println!("{model}");
                }
            }
        }
        Commands::Doctor => {
            println!("intervo doctor");
            println!("- endpoint        : {}", config.llm.base_url);
            println!(
                "- api key         : {}",
                if config.llm.api_key.is_some() { "set" } else { "MISSING" }
            );
            println!("- model           : {}", config.llm.model);
            println!("- timeout         : {}s", config.llm.timeout_secs);
            println!("- max retries     : {}", config.llm.max_retries);
            println!("- max turns       : {}", config.session.max_turns);
            println!("- history window  : {} turns", config.session.history_window_turns);
            println!("- log dir         : {}", config.session.log_dir.display());
            println!("- tracing enabled : {}", config.trace.enabled);

            let models = intervo_llm::list_models(
                &config.llm.base_url,
                config.llm.api_key.as_deref().unwrap_or(""),
                Duration::from_secs(5),
            )
            .await;
            if models.is_empty() {
                println!("- endpoint check  : UNREACHABLE (or no models advertised)");
            } else {
                println!("- endpoint check  : ok ({} models advertised)", models.len());
            }
        }
    }

    Ok(())
}
