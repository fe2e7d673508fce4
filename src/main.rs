use clap::{Parser, Subcommand};
use ragserve::commands::{serve, show_config};

#[derive(Parser)]
#[command(name = "ragserve")]
#[command(about = "Session-scoped RAG chat service with document upload and streaming completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Bind address, overriding the configured host
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overriding the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            serve(host, port).await?;
        }
        Commands::Config => {
            show_config()?;
        }
    }

    Ok(())
}
