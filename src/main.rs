//! Command-line harness for the multi-protocol authentication verifier.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

use multi_auth::{
    generate_saml_auth_url, AuthConfig, Credentials, MultiAuthenticator, RequestContext,
    SamlConfig,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "multi-auth")]
#[command(about = "Verify OAuth2, SAML, LDAP and JWT credentials")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true, env = "MULTI_AUTH_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate one set of credentials and print the result as JSON
    Verify {
        /// JSON file holding a tagged authentication config
        #[arg(long, env = "MULTI_AUTH_CONFIG")]
        config: PathBuf,

        /// Credential as key=value (repeatable)
        #[arg(long = "credential", value_parser = parse_credential)]
        credentials: Vec<(String, String)>,

        /// Overall deadline for the attempt
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print the IdP redirect URL for SP-initiated SAML login
    SamlUrl {
        /// JSON file holding a SAML config
        #[arg(long, env = "MULTI_AUTH_CONFIG")]
        config: PathBuf,

        #[arg(long, default_value = "")]
        relay_state: String,
    },
}

fn parse_credential(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err("credential key must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

async fn verify(
    config_path: &Path,
    credentials: Vec<(String, String)>,
    timeout_secs: Option<u64>,
) -> Result<ExitCode> {
    let config: AuthConfig = load_json(config_path)?;
    let credentials: Credentials = credentials.into_iter().collect();

    let mut ctx = RequestContext::new();
    if let Some(secs) = timeout_secs {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    info!(method = %config.method(), "Verifying credentials");

    let authenticator = MultiAuthenticator::new().context("Failed to build HTTP client")?;
    match authenticator
        .authenticate_with_context(&ctx, &config, &credentials)
        .await
    {
        Ok(result) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("Failed to encode result")?
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!(error = %e, "Verification failed");
            eprintln!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn saml_url(config_path: &Path, relay_state: &str) -> Result<ExitCode> {
    let config: SamlConfig = load_json(config_path)?;
    let url = generate_saml_auth_url(&config, relay_state)
        .context("Failed to build SAML redirect URL")?;
    println!("{}", url);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .with_writer(std::io::stderr)
        .json()
        .init();

    match args.command {
        Command::Verify {
            config,
            credentials,
            timeout_secs,
        } => verify(&config, credentials, timeout_secs).await,
        Command::SamlUrl {
            config,
            relay_state,
        } => saml_url(&config, &relay_state),
    }
}
