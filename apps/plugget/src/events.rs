//! Event rendering for the terminal
//!
//! Human mode prints compact status lines; `--json` mode prints one
//! serialized event per line for tooling.

use plugget_events::{AppEvent, AuthEvent, DownloadEvent, GeneralEvent, InstallEvent};

pub fn render(event: &AppEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        AppEvent::Install(install) => render_install(install),
        AppEvent::Download(download) => render_download(download),
        AppEvent::Auth(auth) => render_auth(auth),
        AppEvent::General(GeneralEvent::Warning { message }) => {
            eprintln!("warning: {message}");
        }
        AppEvent::General(GeneralEvent::Debug { .. }) => {}
    }
}

fn render_install(event: &InstallEvent) {
    match event {
        InstallEvent::Queued { id } => println!("{id}: queued"),
        InstallEvent::Downloading { id, percent } => {
            println!("{id}: downloading {percent:>5.1}%");
        }
        InstallEvent::Extracting { id } => println!("{id}: extracting"),
        InstallEvent::Installed { id, version, path } => {
            println!("{id}: installed {version} at {}", path.display());
        }
        InstallEvent::Uninstalled { id } => println!("{id}: uninstalled"),
        InstallEvent::Failed { id, reason } => eprintln!("{id}: failed: {reason}"),
    }
}

fn render_download(event: &DownloadEvent) {
    match event {
        DownloadEvent::Resuming { offset, .. } => {
            println!("resuming download at {offset} bytes");
        }
        DownloadEvent::Retrying {
            attempt,
            max_attempts,
            ..
        } => {
            eprintln!("download retry {attempt}/{max_attempts}");
        }
        DownloadEvent::CacheHit { .. } => println!("using cached download"),
        // Byte-level progress is folded into the install percent line
        _ => {}
    }
}

fn render_auth(event: &AuthEvent) {
    match event {
        AuthEvent::Refreshing => println!("refreshing access token"),
        AuthEvent::LoginRequired => eprintln!("sign-in required"),
        AuthEvent::Refreshed { .. } | AuthEvent::Invalidated => {}
    }
}
