//! Handlers for the session commands.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::auth::{LoginResponse, SessionManager};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::http::{HttpRequest, ReqwestTransport};
use crate::interceptor::AuthInterceptor;

const SECRET_ENV: &str = "IAM_SECRET";

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Resolve config: file (if given) then environment.
pub fn load_config(path: Option<&Path>) -> Result<SessionConfig, SessionError> {
    let base = match path {
        Some(path) => SessionConfig::load_from_path(path)?,
        None => SessionConfig::default(),
    };
    let config = base.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Handle `iam-session login <identifier>`.
pub async fn handle_login(
    session: &SessionManager,
    identifier: &str,
    scope: Option<&str>,
) -> CliResult {
    let secret = read_secret()?;
    match session.login(identifier, &secret, scope).await? {
        LoginResponse::Success(_) => {
            session.load_identity(None, None).await?;
            println!("✅ Logged in as {identifier}");
            Ok(())
        }
        LoginResponse::Failure(failure) => {
            eprintln!("❌ Login failed: {} ({})", failure.code, failure.message);
            std::process::exit(1);
        }
    }
}

/// Handle `iam-session status`.
pub fn handle_status(session: &SessionManager) -> CliResult {
    println!("🔐 Session Status\n");
    if !session.is_authenticated() {
        println!("  ❌ Not logged in");
        return Ok(());
    }

    let secs_left = session.ms_left() / 1000;
    if secs_left > 0 {
        println!("  ✅ Logged in (expires in {}m {}s)", secs_left / 60, secs_left % 60);
    } else {
        println!("  ⚠️  Token expired (will refresh on next request)");
    }
    let has_refresh = session
        .raw_bundle()
        .is_some_and(|b| b.has_refresh_token());
    println!("  Refresh token: {}", if has_refresh { "yes" } else { "no" });

    let scopes = session.scopes();
    if scopes.is_empty() {
        println!("  Scopes: (none cached)");
    } else {
        println!("  Scopes: {}", scopes.join(", "));
    }
    Ok(())
}

/// Handle `iam-session whoami`.
pub async fn handle_whoami(
    session: &SessionManager,
    client_id: Option<u64>,
    app_id: Option<u64>,
) -> CliResult {
    session.load_identity(client_id, app_id).await?;
    println!("{}", serde_json::to_string_pretty(&session.whoami())?);
    Ok(())
}

/// Handle `iam-session refresh`.
pub async fn handle_refresh(session: &SessionManager) -> CliResult {
    let bundle = session.refresh().await?;
    println!(
        "✅ Token refreshed (expires in {}s)",
        bundle.expires_in.unwrap_or_default()
    );
    Ok(())
}

/// Handle `iam-session logout`.
pub async fn handle_logout(session: &SessionManager, remote: bool) -> CliResult {
    session.logout(remote).await;
    println!("✅ Logged out");
    Ok(())
}

/// Handle `iam-session request <METHOD> <URL>`.
pub async fn handle_request(
    session: Arc<SessionManager>,
    config: &SessionConfig,
    method: &str,
    url: &str,
    body: Option<&str>,
) -> CliResult {
    let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
    let redirect = Arc::new(|| eprintln!("🔑 Session ended; run `iam-session login` again"));
    let interceptor = AuthInterceptor::new(session, transport, redirect);

    let mut request = HttpRequest::new(method.to_ascii_uppercase(), url);
    if let Some(body) = body {
        request = request.with_json(serde_json::from_str(body)?);
    }

    let response = interceptor.intercept(request).await?;
    println!("{}", response.status);
    println!("{}", response.body);
    Ok(())
}

fn read_secret() -> Result<String, std::io::Error> {
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        return Ok(secret);
    }
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut secret = String::new();
    std::io::stdin().read_line(&mut secret)?;
    Ok(secret.trim_end_matches(['\r', '\n']).to_string())
}
