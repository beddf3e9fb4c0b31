mod service;

use clap::{Parser, Subcommand};
use promptpipe_core::config;
use promptpipe_store::Store;

#[derive(Parser)]
#[command(
    name = "promptpipe",
    version,
    about = "Conversational health-habit coaching over messaging"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coaching service.
    Start,
    /// Show configuration and store health.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Start => {
            let cfg = config::load(&cli.config)?;
            if cfg.llm.api_key.is_empty()
                && cfg.flow.coordinator == config::CoordinatorChoice::Llm
            {
                anyhow::bail!(
                    "llm.api_key is empty. Set it in config.toml or switch to \
                     COORDINATOR_CHOICE=static."
                );
            }
            service::run(cfg).await?;
        }
        Commands::Status => {
            let cfg = config::load(&cli.config)?;
            println!("PromptPipe status\n");
            println!("Config:      {}", cli.config);
            println!("Model:       {}", cfg.llm.model);
            println!("Gateway:     {}", cfg.messaging.gateway_url);
            println!("Database:    {}", cfg.service.db_path);
            println!("Coordinator: {:?}", cfg.flow.coordinator);
            println!();

            let store = Store::new(&cfg.service.db_path).await?;
            let participants = store.list_active_participants().await?;
            println!("Active participants: {}", participants.len());
        }
    }

    Ok(())
}
