mod cache;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cache::CredentialCache;
use sessrec_api::{ApiClient, ApiError, fetch_identity};
use sessrec_recovery::{ExtractedCredential, Extractor, KeyCache, Platform, mask_token};

/// Exit codes, so scripts can tell the outcomes apart.
const EXIT_NO_CREDENTIAL: i32 = 2;
const EXIT_INVALID_CREDENTIAL: i32 = 3;
const EXIT_API_ERROR: i32 = 4;

#[derive(Parser)]
#[command(name = "sessrec", version, about = "Recover and use a messaging platform session credential")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recover the platform's session credential from its desktop app.
    Extract {
        #[arg(long)]
        platform: Platform,
        /// Print the credential as JSON instead of plain text.
        #[arg(long)]
        json: bool,
        /// Ignore the credential cache and re-run extraction.
        #[arg(long)]
        fresh: bool,
    },
    /// Validate the credential against the platform and show who it is.
    Whoami {
        #[arg(long)]
        platform: Platform,
    },
    /// Forget cached derived keys (and the platform's cached credential).
    ClearKeys {
        #[arg(long)]
        platform: Option<Platform>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Extract {
            platform,
            json,
            fresh,
        } => cmd_extract(platform, json, fresh).await?,
        Command::Whoami { platform } => cmd_whoami(platform).await?,
        Command::ClearKeys { platform } => cmd_clear_keys(platform)?,
    };
    std::process::exit(code);
}

async fn obtain_credential(
    platform: Platform,
    cache: &CredentialCache,
    fresh: bool,
) -> Result<Option<ExtractedCredential>> {
    if !fresh && let Some(credential) = cache.load(platform) {
        debug!(%platform, token = %mask_token(&credential.token), "using cached credential");
        return Ok(Some(credential));
    }
    let extractor = Extractor::new(platform)?;
    let credential = extractor.extract().await?;
    if let Some(credential) = &credential {
        cache.store(platform, credential)?;
    }
    Ok(credential)
}

async fn cmd_extract(platform: Platform, json: bool, fresh: bool) -> Result<i32> {
    let cache = CredentialCache::open_default()?;
    let Some(credential) = obtain_credential(platform, &cache, fresh).await? else {
        eprintln!("no credential found for {platform}");
        return Ok(EXIT_NO_CREDENTIAL);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&credential)?);
    } else {
        println!("{}", credential.token);
        eprintln!(
            "account: {} ({})",
            credential.account_name, credential.account_id
        );
    }
    Ok(0)
}

async fn cmd_whoami(platform: Platform) -> Result<i32> {
    let cache = CredentialCache::open_default()?;
    let Some(credential) = obtain_credential(platform, &cache, false).await? else {
        eprintln!("no credential found for {platform}");
        return Ok(EXIT_NO_CREDENTIAL);
    };

    let client = ApiClient::for_platform(platform, &credential.token);
    match fetch_identity(&client, platform).await {
        Ok(identity) => {
            println!("{} ({})", identity.account_name, identity.account_id);
            // The scanner's context pass may have come up empty; the API
            // answer is authoritative, so refresh the cache with it.
            let refreshed = ExtractedCredential {
                token: credential.token,
                account_id: identity.account_id,
                account_name: identity.account_name,
            };
            cache.store(platform, &refreshed)?;
            Ok(0)
        }
        Err(ApiError::Unauthorized) => {
            eprintln!("credential for {platform} was rejected (invalid or expired)");
            cache.clear(platform)?;
            Ok(EXIT_INVALID_CREDENTIAL)
        }
        Err(e) => {
            eprintln!("API error: {e}");
            Ok(EXIT_API_ERROR)
        }
    }
}

fn cmd_clear_keys(platform: Option<Platform>) -> Result<i32> {
    let keys = KeyCache::open_default()?;
    let credentials = CredentialCache::open_default()?;
    match platform {
        Some(platform) => {
            keys.clear(platform)?;
            credentials.clear(platform)?;
            eprintln!("cleared cached key and credential for {platform}");
        }
        None => {
            keys.clear_all()?;
            for platform in [Platform::Slack, Platform::Discord, Platform::Teams] {
                credentials.clear(platform)?;
            }
            eprintln!("cleared all cached keys and credentials");
        }
    }
    Ok(0)
}
