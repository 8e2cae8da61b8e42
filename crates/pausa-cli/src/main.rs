use anyhow::Result;
use clap::{Parser, Subcommand};
use pausa_core::{
    config::{settings_path, socket_path},
    ipc::{IpcClient, IpcRequest, IpcResponse},
    Daemon, SettingsStore,
};

#[derive(Parser)]
#[command(name = "pausa")]
#[command(about = "Idle-aware break reminder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reminder daemon in the foreground
    Run,
    /// Show daemon status and current settings
    Status,
    /// Restart the current timer cycle
    Restart,
    /// Shut down the running daemon
    Stop,
    /// Turn reminders on (the daemon starts a fresh cycle)
    Enable,
    /// Turn reminders off
    Disable,
    /// Set how many active minutes pass before a reminder fires
    Threshold {
        minutes: u32,
    },
    /// Set the notification message; an empty string suppresses
    /// notifications while the timer keeps cycling
    Message {
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_daemon().await,
        Commands::Status => status().await,
        Commands::Restart => send(IpcRequest::Restart).await,
        Commands::Stop => send(IpcRequest::Shutdown).await,
        Commands::Enable => {
            open_store().set_enabled(true)?;
            println!("Reminders enabled.");
            Ok(())
        }
        Commands::Disable => {
            open_store().set_enabled(false)?;
            println!("Reminders disabled.");
            Ok(())
        }
        Commands::Threshold { minutes } => {
            open_store().set_threshold_minutes(minutes)?;
            if minutes == 0 {
                println!("Threshold cleared; the default of 20 minutes applies.");
            } else {
                println!("Reminding every {minutes} minutes of active time.");
            }
            Ok(())
        }
        Commands::Message { text } => {
            open_store().set_message(&text)?;
            if text.is_empty() {
                println!("Message cleared; reminders will cycle silently.");
            } else {
                println!("Notification message updated.");
            }
            Ok(())
        }
    }
}

fn open_store() -> SettingsStore {
    match settings_path() {
        Ok(path) => SettingsStore::open(path),
        Err(e) => {
            log::warn!("No settings path available, changes will not persist: {e}");
            SettingsStore::in_memory(pausa_core::Settings::default())
        }
    }
}

async fn run_daemon() -> Result<()> {
    let store = SettingsStore::open(settings_path()?);
    let daemon = Daemon::new(store);
    daemon.run_with_signals().await
}

async fn send(request: IpcRequest) -> Result<()> {
    let client = IpcClient::new(&socket_path()?);
    match client.send_command(request).await {
        Ok(IpcResponse::Restarted) => println!("Timer restarted."),
        Ok(IpcResponse::Shutdown) => println!("Daemon shutting down."),
        Ok(other) => log::warn!("Unexpected daemon response: {other:?}"),
        Err(e) => anyhow::bail!("Could not reach the daemon (is `pausa run` active?): {e}"),
    }
    Ok(())
}

async fn status() -> Result<()> {
    let client = IpcClient::new(&socket_path()?);
    match client.send_command(IpcRequest::Status).await {
        Ok(IpcResponse::Status {
            enabled,
            threshold_minutes,
            elapsed_seconds,
            uptime_seconds,
        }) => {
            println!("Daemon: running (up {uptime_seconds}s)");
            println!(
                "Reminders: {}",
                if enabled { "enabled" } else { "disabled" }
            );
            println!("Threshold: {threshold_minutes} minutes");
            println!("Active time this cycle: {elapsed_seconds:.0} seconds");
        }
        Ok(other) => log::warn!("Unexpected daemon response: {other:?}"),
        Err(_) => {
            // Daemon not running; fall back to the persisted settings.
            let store = open_store();
            let settings = store.snapshot();
            println!("Daemon: not running");
            println!(
                "Reminders: {}",
                if settings.enabled { "enabled" } else { "disabled" }
            );
            println!("Threshold: {} minutes", store.threshold_minutes());
        }
    }
    Ok(())
}
