//! plugget - plugin downloader and installer for the editor
//!
//! Thin CLI over the install manager: parses arguments, loads config,
//! wires the event channel to the terminal, and dispatches commands.

mod auth;
mod cli;
mod config;
mod events;

use crate::auth::HttpAuthProvider;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use clap::Parser;
use futures::future::join_all;
use plugget_auth::{Credential, CredentialStore};
use plugget_errors::{Error, UserFacingError};
use plugget_install::{is_compatible, InstallConfig, InstallManager};
use plugget_types::{CancelFlag, HostVersion, PluginId};
use std::process;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;
    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("command failed: {e}");
        if !json_mode {
            eprintln!("error: {}", e.user_message());
            if let Some(hint) = e.user_hint() {
                eprintln!("hint: {hint}");
            }
        }
        process::exit(1);
    }
}

fn init_tracing(json: bool, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::load(cli.global.config.as_deref())?;
    let host = config.host()?;

    let (tx, mut rx) = plugget_events::channel();
    let json_mode = cli.global.json;
    let renderer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            events::render(&event, json_mode);
        }
    });

    let provider = Arc::new(HttpAuthProvider::new(&config.auth.refresh_url));
    let credentials = Arc::new(CredentialStore::with_events(provider, tx.clone()));
    bootstrap_session(&credentials).await;

    let mut install_config = InstallConfig::new(
        &config.plugin_root,
        &config.work_dir,
        host,
        &config.manifest_url,
    );
    install_config.manifest_max_age = chrono::Duration::minutes(config.manifest_max_age_minutes);

    let manager = InstallManager::new(install_config, credentials.clone(), tx.clone())?;
    manager.startup().await?;

    let result = dispatch(&cli.command, &manager, &credentials, host).await;

    // Drop every sender so the renderer drains and exits
    drop(manager);
    drop(credentials);
    drop(tx);
    let _ = renderer.await;

    result
}

/// Adopt a session from `PLUGGET_REFRESH_TOKEN`, if provided; the first
/// token request will turn it into a live access token.
async fn bootstrap_session(credentials: &CredentialStore) {
    if let Ok(refresh_token) = std::env::var("PLUGGET_REFRESH_TOKEN") {
        if !refresh_token.is_empty() {
            credentials
                .adopt(Credential::new(
                    String::new(),
                    chrono::DateTime::<chrono::Utc>::MIN_UTC,
                    refresh_token,
                ))
                .await;
        }
    }
}

async fn dispatch(
    command: &Commands,
    manager: &InstallManager,
    credentials: &CredentialStore,
    host: HostVersion,
) -> Result<(), Error> {
    match command {
        Commands::Install { ids } => install_all(manager, ids).await,
        Commands::Uninstall { ids } => {
            if ids.is_empty() {
                return Err(Error::internal("no plugin identifiers given"));
            }
            for id in ids {
                let id = PluginId::new(id.clone())?;
                manager.uninstall(&id).await?;
            }
            Ok(())
        }
        Commands::List => {
            for entry in manager.available().await? {
                let marker = if is_compatible(&entry, host) { ' ' } else { '!' };
                println!(
                    "{marker} {:<24} {:<10} {} ({} to {})",
                    entry.id.as_str(),
                    entry.version,
                    entry.name,
                    entry.min_version,
                    entry.max_version,
                );
            }
            Ok(())
        }
        Commands::Installed => {
            for record in manager.installed().await? {
                println!(
                    "{:<24} {:<10} {}",
                    record.id.as_str(),
                    record.version,
                    record.path.display()
                );
            }
            Ok(())
        }
        Commands::RefreshManifest => manager.ensure_manifest(true).await,
        Commands::Login => {
            credentials.login().await?;
            println!("signed in");
            Ok(())
        }
    }
}

/// Install every requested plugin; distinct identifiers run in
/// parallel, Ctrl-C cancels the whole batch cooperatively.
async fn install_all(manager: &InstallManager, ids: &[String]) -> Result<(), Error> {
    if ids.is_empty() {
        return Err(Error::internal("no plugin identifiers given"));
    }

    let ids = ids
        .iter()
        .map(|id| PluginId::new(id.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let cancel = CancelFlag::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        }
    });

    let results = join_all(
        ids.iter()
            .map(|id| manager.install(id, &cancel))
            .collect::<Vec<_>>(),
    )
    .await;

    let mut first_error = None;
    for result in results {
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
