//! iam-session CLI binary entry point.

use std::sync::Arc;

use clap::Parser;
use iam_session::auth::SessionManager;
use iam_session::cli::{auth, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = auth::load_config(cli.config.as_deref())?;
    let session = Arc::new(SessionManager::from_config(&config)?);

    match cli.command {
        Commands::Login(args) => {
            auth::handle_login(&session, &args.identifier, args.scope.as_deref()).await
        }
        Commands::Status => auth::handle_status(&session),
        Commands::Whoami(args) => auth::handle_whoami(&session, args.client_id, args.app_id).await,
        Commands::Refresh => auth::handle_refresh(&session).await,
        Commands::Logout(args) => auth::handle_logout(&session, args.remote).await,
        Commands::Request(args) => {
            auth::handle_request(
                session.clone(),
                &config,
                &args.method,
                &args.url,
                args.body.as_deref(),
            )
            .await
        }
    }
}
