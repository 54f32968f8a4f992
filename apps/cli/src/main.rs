//! Third Uploader command line.
//!
//! Thin front-end over the publication pipeline: it supplies the credential
//! and 2FA prompts, prints progress events, and wires Ctrl-C to the
//! cancellation token. All pipeline logic lives in the library crates.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use tracing_subscriber::EnvFilter;

use third_bundle::read_archive;
use third_credentials::{AppConfig, StoredToken, delete_token, load_token, save_token};
use third_publish::{LiveAvatarService, ProgressEvent, PublishError, Publisher};
use third_upload::UploadDriver;
use third_vrchat::{
    ApiClient, ApiError, CookieJar, LoginFlow, Session, TwoFactorKind, begin_login,
    resume_session,
};

#[derive(Parser)]
#[command(name = "third-uploader")]
#[command(version)]
#[command(about = "Publish avatar bundles to VRChat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session cookies
    Login {
        /// Account username (default: prompt, prefilled with the last one)
        #[arg(long)]
        username: Option<String>,
    },

    /// Publish a .3b avatar bundle archive
    Publish {
        /// Path to the .3b archive
        path: PathBuf,

        /// Account username (default: the last one used)
        #[arg(long)]
        username: Option<String>,
    },

    /// Drop the stored session and log out
    Logout {
        /// Account username (default: the last one used)
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Login { username } => run_login(username).await,
        Commands::Publish { path, username } => run_publish(path, username).await,
        Commands::Logout { username } => run_logout(username).await,
    }
}

async fn run_login(username: Option<String>) -> Result<()> {
    let config = AppConfig::load()?;
    let username = resolve_username(username, &config, true)?;
    let api = ApiClient::new()?;

    let session = establish_session(&api, &username).await?;
    println!("Logged in as {}", session.user.display_name);
    Ok(())
}

async fn run_publish(path: PathBuf, username: Option<String>) -> Result<()> {
    let config = AppConfig::load()?;
    let username = resolve_username(username, &config, false)?;
    let api = ApiClient::new()?;
    let session = establish_session(&api, &username).await?;
    println!("Logged in as {}", session.user.display_name);

    println!("Reading {}", path.display());
    let bundle = tokio::task::spawn_blocking(move || read_archive(&path)).await??;
    println!(
        "Avatar: {} ({} platform bundle(s))",
        bundle.manifest.name,
        bundle.payloads.len()
    );

    let mut publisher = Publisher::new();
    let mut events = publisher.take_events().expect("fresh publisher");
    let cancel = publisher.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("Cancelling...");
            cancel.cancel();
        }
    });
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let service = LiveAvatarService::new(api.clone(), session.jar.clone());
    let driver = UploadDriver::new(third_vrchat::USER_AGENT)?;
    let result = publisher.publish(&service, &driver, &bundle).await;

    drop(publisher);
    let _ = printer.await;

    match result {
        Ok(avatar) => println!("Published {}", avatar.name),
        Err(PublishError::Cancelled) => println!("Publication cancelled."),
        Err(err) => return Err(err.into()),
    }

    // Single point of deletion for the unpack directory.
    drop(bundle);
    Ok(())
}

async fn run_logout(username: Option<String>) -> Result<()> {
    let config = AppConfig::load()?;
    let username = resolve_username(username, &config, false)?;
    let api = ApiClient::new()?;

    if let Some(token) = load_token(&username)? {
        api.logout(&CookieJar::new(token.auth, token.two_factor))
            .await;
    }
    delete_token(&username)?;
    println!("Logged out {username}.");
    Ok(())
}

/// Username from the flag, the config, or an interactive prompt.
fn resolve_username(
    flag: Option<String>,
    config: &AppConfig,
    always_prompt: bool,
) -> Result<String> {
    if let Some(username) = flag {
        return Ok(username);
    }
    if !always_prompt && let Some(username) = &config.last_username {
        return Ok(username.clone());
    }

    let mut input = Input::<String>::new().with_prompt("Username");
    if let Some(last) = &config.last_username {
        input = input.default(last.clone());
    }
    Ok(input.interact_text()?)
}

/// Resumes the stored session or walks the interactive login flow.
async fn establish_session(api: &ApiClient, username: &str) -> Result<Session> {
    if let Some(token) = load_token(username)? {
        let jar = CookieJar::new(token.auth, token.two_factor);
        match resume_session(api, &jar).await {
            Ok(session) => return Ok(session),
            Err(ApiError::SessionExpired) => {
                println!("Stored session expired, please log in again.")
            }
            Err(err) => return Err(err.into()),
        }
    }
    interactive_login(api, username).await
}

async fn interactive_login(api: &ApiClient, username: &str) -> Result<Session> {
    loop {
        let password = Password::new()
            .with_prompt(format!("Password for {username}"))
            .interact()?;

        match begin_login(api, username, &password).await? {
            LoginFlow::LoggedIn(session) => return Ok(store_session(username, session)),
            LoginFlow::TwoFactor(pending) => {
                let kind = pending.kinds.first().copied().unwrap_or(TwoFactorKind::Totp);
                let label = match kind {
                    TwoFactorKind::EmailOtp => "code sent to your email",
                    TwoFactorKind::Totp => "code from your authenticator app",
                };
                let code: String = Input::new()
                    .with_prompt(format!("Enter the {label}"))
                    .interact_text()?;

                match pending.verify(kind, code.trim()).await {
                    Ok(session) => return Ok(store_session(username, session)),
                    Err(ApiError::TwoFactorFailed) => {
                        println!("Verification failed, try again.");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            LoginFlow::BadCredentials => {
                println!("Invalid username or password, try again.");
            }
        }
    }
}

/// Persists the session cookies and the last username, best-effort.
fn store_session(username: &str, session: Session) -> Session {
    let token = StoredToken {
        auth: session.jar.auth.clone(),
        two_factor: session.jar.two_factor.clone(),
    };
    if let Err(error) = save_token(username, &token) {
        tracing::warn!(%error, "failed to store session cookies");
    }

    let config = AppConfig {
        last_username: Some(username.to_string()),
    };
    if let Err(error) = config.save() {
        tracing::warn!(%error, "failed to save config");
    }
    session
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Init => println!("Preparing publication..."),
        ProgressEvent::Thumbnail => println!("Uploading thumbnail..."),
        ProgressEvent::Waiting => println!("Preparing platform bundles..."),
        ProgressEvent::Bundle {
            part,
            total_parts,
            platform_index,
            total_platforms,
        } => println!(
            "Platform {}/{}: part {}/{}",
            platform_index + 1,
            total_platforms,
            part,
            total_parts
        ),
        ProgressEvent::Completed => println!("Publication complete."),
        ProgressEvent::Error { message } => println!("Publication failed: {message}"),
    }
}
