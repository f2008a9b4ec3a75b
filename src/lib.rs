pub mod backend;
pub mod bridge;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod notify;
pub(crate) mod prompt;
pub mod push;
pub mod store;
pub mod transport;
pub mod uri;
pub mod vault;

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tokio::sync::mpsc;

use bridge::{BridgeOutput, ContentEvent, CredentialPrompt};
use config::{CHANNEL_CAPACITY, Command, Config};
use context::ShellContext;
use error::Error;
use notify::{NotificationAggregator, TrayFile};
use push::PushProcessor;
use transport::{HostInput, HostSurface, HostTransport};

pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // stdout carries the host protocol in `serve`.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    init_tracing(cfg.verbose);
    tracing::info!(command = ?cfg.command, backend = ?cfg.backend, "Starting gomuks-native");

    let data_dir = context::data_dir(&cfg)?;
    diagnostics::check(&cfg, &data_dir)?;

    match cfg.command.clone() {
        Command::Serve => serve(cfg, &data_dir).await,
        Command::SetCredentials {
            server_url,
            username,
            error,
        } => set_credentials(cfg, server_url, username, error).await,
        Command::Push { file } => push_once(cfg, &data_dir, file).await,
        Command::RegisterToken { token } => register_token(cfg, token).await,
        Command::OpenUri { target } => open_uri(cfg, &target).await,
        Command::Wipe => wipe(&data_dir),
    }
}

fn instance_lock(data_dir: &Path) -> anyhow::Result<(fd_lock::RwLock<std::fs::File>, PathBuf)> {
    std::fs::create_dir_all(data_dir)?;
    let lock_path = context::lock_path(data_dir);
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    Ok((fd_lock::RwLock::new(lock_file), lock_path))
}

async fn open_context(cfg: &Config) -> anyhow::Result<ShellContext> {
    let cfg = cfg.clone();
    let ctx = tokio::task::spawn_blocking(move || ShellContext::open(&cfg)).await??;
    Ok(ctx)
}

pub async fn serve(cfg: Config, data_dir: &Path) -> anyhow::Result<()> {
    let (mut lock, lock_path) = instance_lock(data_dir)?;
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!("gomuks-native is already running (lock: {})", lock_path.display())
    })?;

    let ctx = open_context(&cfg).await?;
    let HostTransport {
        mut incoming_rx,
        outgoing_tx,
        task,
        writer,
    } = transport::start_stdio_transport();

    // Bridge session
    let (content_tx, content_rx) = mpsc::channel::<ContentEvent>(CHANNEL_CAPACITY);
    let (bridge_tx, mut bridge_rx) = mpsc::channel::<BridgeOutput>(CHANNEL_CAPACITY);
    let bridge = tokio::spawn(bridge::run_bridge_loop(
        content_rx,
        bridge_tx,
        ctx.tokens.subscribe(),
        ctx.bridge_deps(),
    ));
    let host_tx = outgoing_tx.clone();
    let forward = tokio::spawn(async move {
        while let Some(output) = bridge_rx.recv().await {
            if host_tx.send(output.into()).await.is_err() {
                tracing::error!("Host output channel closed");
                break;
            }
        }
    });

    // Single-writer push queue
    let surface = HostSurface::new(TrayFile::new(ctx.tray_path()), outgoing_tx.clone());
    let processor = PushProcessor::new(
        ctx.push_keys.clone(),
        NotificationAggregator::new(surface, ctx.channels.clone()),
    );
    let (push_tx, mut push_rx) = mpsc::channel::<HashMap<String, String>>(CHANNEL_CAPACITY);
    let pushes = tokio::spawn(async move {
        while let Some(data) = push_rx.recv().await {
            processor.handle(data).await;
        }
        tracing::debug!("Push queue drained");
    });
    drop(outgoing_tx);
    tracing::info!("Serving on stdio");

    while let Some(input) = incoming_rx.recv().await {
        match input {
            HostInput::Content { message } => match ContentEvent::from_value(message) {
                Ok(event) => {
                    if content_tx.send(event).await.is_err() {
                        tracing::error!("Bridge session ended");
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Dropping content message"),
            },
            HostInput::Push { data } => {
                if push_tx.send(data).await.is_err() {
                    tracing::error!("Push queue ended");
                    break;
                }
            }
            HostInput::Token { token } => {
                let tokens = ctx.tokens.clone();
                match tokio::task::spawn_blocking(move || tokens.publish(&token)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Failed to store push token"),
                    Err(e) => tracing::error!(error = %e, "Token task failed"),
                }
            }
        }
    }

    drop(content_tx);
    drop(push_tx);
    if let Err(e) = bridge.await {
        tracing::error!(error = %e, "Bridge task panicked");
    }
    if let Err(e) = pushes.await {
        tracing::error!(error = %e, "Push task panicked");
    }
    if let Err(e) = forward.await {
        tracing::error!(error = %e, "Forward task panicked");
    }
    // Every output sender is gone now; wait for the last lines to reach stdout.
    match tokio::task::spawn_blocking(move || writer.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!("Host writer thread panicked"),
        Err(e) => tracing::error!(error = %e, "Host writer join task failed"),
    }
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(anyhow::anyhow!("Host transport error: {e}")),
        Err(e) => return Err(anyhow::anyhow!("Host transport panicked: {e}")),
    }
    Ok(())
}

pub async fn set_credentials(
    cfg: Config,
    server_url: String,
    username: String,
    error: Option<String>,
) -> anyhow::Result<()> {
    let ctx = open_context(&cfg).await?;
    let state = error.map(|error| CredentialPrompt::AuthFailed { error });
    let password = prompt::read_password(
        prompt::PasswordPrompt::new(&server_url, &username, state.as_ref()),
        &cfg.pinentry,
    )
    .await?;

    let vault = ctx.vault.clone();
    let (url, user) = (server_url.clone(), username.clone());
    tokio::task::spawn_blocking(move || {
        vault.set_credentials(&url, &user, password.expose_secret())
    })
    .await??;
    println!("Stored credentials for {username} on {server_url}");
    Ok(())
}

pub async fn push_once(cfg: Config, data_dir: &Path, file: Option<PathBuf>) -> anyhow::Result<()> {
    let raw = match &file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let data: HashMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("push data must be a JSON object of strings: {e}"))?;

    // The serving process owns the tray while it runs.
    let (mut lock, lock_path) = instance_lock(data_dir)?;
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!(
            "gomuks-native is serving (lock: {}); deliver pushes through it",
            lock_path.display()
        )
    })?;

    let ctx = open_context(&cfg).await?;
    let processor = PushProcessor::new(
        ctx.push_keys.clone(),
        NotificationAggregator::new(TrayFile::new(ctx.tray_path()), ctx.channels.clone()),
    );
    let report = processor.run(data).await.map_err(Error::from)?;
    for id in &report.dismissed {
        println!("dismissed {id}");
    }
    for id in &report.shown {
        println!("shown {id}");
    }
    Ok(())
}

pub async fn register_token(cfg: Config, token: String) -> anyhow::Result<()> {
    let ctx = open_context(&cfg).await?;
    let tokens = ctx.tokens.clone();
    tokio::task::spawn_blocking(move || tokens.publish(&token)).await??;
    println!("Push token stored; it will be registered on the next connection");
    Ok(())
}

pub async fn open_uri(cfg: Config, target: &str) -> anyhow::Result<()> {
    let ctx = open_context(&cfg).await?;
    let server_url = ctx
        .vault
        .server_url()
        .ok_or_else(|| anyhow::anyhow!("no server URL stored; run set-credentials first"))?;
    let url = uri::intent_url(&server_url, target)
        .ok_or_else(|| anyhow::anyhow!("not a matrix: URI or matrix.to link: {target}"))?;
    println!("{url}");
    Ok(())
}

pub fn wipe(data_dir: &Path) -> anyhow::Result<()> {
    let (mut lock, lock_path) = instance_lock(data_dir)?;
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!("gomuks-native is running (lock: {})", lock_path.display())
    })?;

    let mut count = 0usize;
    for name in [config::PREFS_FILE, config::TRAY_FILE] {
        let path = data_dir.join(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            count += 1;
        }
    }
    let tray_lock = data_dir.join(format!("{}.lock", config::TRAY_FILE));
    if tray_lock.exists() {
        std::fs::remove_file(&tray_lock)?;
    }
    println!("Deleted {count} file(s) from {}", data_dir.display());

    let keys_dir = data_dir.join(config::KEYS_DIR);
    if keys_dir.exists() {
        let mut keys = 0usize;
        for entry in std::fs::read_dir(&keys_dir)? {
            std::fs::remove_file(entry?.path())?;
            keys += 1;
        }
        println!("Deleted {keys} sealed key(s) from {}", keys_dir.display());
    }
    Ok(())
}
