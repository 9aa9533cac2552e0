use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::debug;
use twitch_oauth::{
    Authenticator, CredentialStore, TokenExchanger, authenticated_client, until_interrupted,
};

mod config;
mod helix;

use config::Endpoints;
use helix::{HelixClient, VideoKind};

/// Twitch Search - Lists VoDs of a channel or the live channels you follow
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Type of VoDs to show
    #[arg(long = "type", value_enum, default_value_t = VideoKind::Archive)]
    kind: VideoKind,

    /// Show VoDs from specific channel
    #[arg(long)]
    vod: Option<String>,

    /// Show live followed channels
    #[arg(long)]
    live: bool,

    /// Path to the client credentials file (default: ~/.twitch-search-client.json)
    #[arg(long)]
    client_file: Option<PathBuf>,

    /// Path to the cached OAuth token file (default: ~/.twitch-search.json)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Give up waiting for the browser after this many seconds (default: wait forever)
    #[arg(long)]
    consent_timeout_secs: Option<u64>,

    /// Enable debug output on stderr
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
    // Validate arguments before touching credentials
    let channel = if args.live {
        None
    } else {
        Some(channel_name(args.vod.as_deref())?)
    };

    let endpoints = Endpoints::from_env();
    debug!(?endpoints, "Resolved endpoints");
    let store = CredentialStore::resolve(args.client_file, args.token_file)
        .context("Locating credential files")?;
    let identity = store
        .load_client_identity()
        .context("Reading client credentials")?;

    let exchanger = TokenExchanger::with_token_url(identity.clone(), &endpoints.oauth.token_url);
    let mut authenticator = Authenticator::new(store, exchanger)
        .with_authorize_url(&endpoints.oauth.auth_url)
        .with_consent_timeout(args.consent_timeout_secs.map(Duration::from_secs));
    let credential = authenticator
        .authenticate()
        .await
        .context("Authenticating")?;

    let http = authenticated_client(&identity, &credential).context("Creating API client")?;
    let helix = HelixClient::new(http, endpoints.api_base);

    match channel {
        None => {
            let user_id = helix
                .logged_user_id()
                .await
                .context("Getting logged user ID")?;
            let streams = helix
                .followed_streams(&user_id)
                .await
                .context("Querying live channels")?;
            for stream in &streams {
                println!("{}", stream.line());
            }
        }
        Some(channel) => {
            let channel_id = helix
                .search_channel(&channel)
                .await
                .context("Searching channels")?;
            let videos = helix
                .videos(&channel_id, args.kind)
                .await
                .context("Searching videos")?;
            for video in &videos {
                println!("{}", video.line());
            }
        }
    }

    Ok(())
}

/// Lowercased channel name; required unless listing live channels
fn channel_name(vod: Option<&str>) -> anyhow::Result<String> {
    let channel = vod.unwrap_or_default().trim();
    if channel.is_empty() {
        bail!("Channel to query is empty");
    }
    Ok(channel.to_lowercase())
}
