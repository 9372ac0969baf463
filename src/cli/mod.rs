//! CLI entry point for iam-session.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// IAM session CLI
#[derive(Parser, Debug)]
#[command(name = "iam-session", version, about = "IAM session manager CLI")]
pub struct Cli {
    /// TOML config file (env vars override its values)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with an identifier; the secret is read from IAM_SECRET or stdin
    Login(LoginArgs),
    /// Show session status
    Status,
    /// Refresh and print the cached identity
    Whoami(WhoamiArgs),
    /// Force a token refresh
    Refresh,
    /// End the session
    Logout(LogoutArgs),
    /// Send a request through the session interceptor
    Request(RequestArgs),
}

/// Arguments for `iam-session login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Account identifier (email)
    pub identifier: String,

    /// Requested scope
    #[arg(short, long)]
    pub scope: Option<String>,
}

/// Arguments for `iam-session whoami`.
#[derive(Parser, Debug)]
pub struct WhoamiArgs {
    /// Client context (sent as X-IAM-Client)
    #[arg(long)]
    pub client_id: Option<u64>,

    /// Application context (sent as X-App-Id)
    #[arg(long)]
    pub app_id: Option<u64>,
}

/// Arguments for `iam-session logout`.
#[derive(Parser, Debug)]
pub struct LogoutArgs {
    /// Also revoke the session on the identity backend
    #[arg(long)]
    pub remote: bool,
}

/// Arguments for `iam-session request`.
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// HTTP method
    pub method: String,

    /// Absolute URL
    pub url: String,

    /// JSON body
    #[arg(short, long)]
    pub body: Option<String>,
}
