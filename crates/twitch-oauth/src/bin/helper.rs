use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use twitch_oauth::{
    Authenticator, CredentialStore, OAuthEndpoints, TokenExchanger, until_interrupted,
};

/// OAuth 2.0 helper tool for Twitch API authentication
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the client credentials file (default: ~/.twitch-search-client.json)
    #[arg(long)]
    client_file: Option<PathBuf>,

    /// Path to save the OAuth token file (default: ~/.twitch-search.json)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Give up waiting for the browser after this many seconds
    #[arg(long)]
    consent_timeout_secs: Option<u64>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    twitch_oauth::logging::init(args.verbose);

    match until_interrupted(run(args)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let endpoints = OAuthEndpoints::from_env();
    let store = CredentialStore::resolve(args.client_file, args.token_file)
        .context("Locating credential files")?;

    let identity = store
        .load_client_identity()
        .context("Reading client credentials")?;

    let exchanger = TokenExchanger::with_token_url(identity, &endpoints.token_url);
    let mut authenticator = Authenticator::new(store, exchanger)
        .with_authorize_url(&endpoints.auth_url)
        .with_consent_timeout(args.consent_timeout_secs.map(Duration::from_secs));
    authenticator.authenticate().await.context("Authenticating")?;

    eprintln!(
        "\nOAuth token saved to: {}",
        authenticator.store().credential_path().display()
    );
    eprintln!("You can now use this token with twitch-search");

    Ok(())
}
