use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{env, fs, io, path::Path, process::Command, thread::sleep, time};
use sysinfo::{Pid, System};
use tabled::{Table, Tabled};

use restricto_core::{
    config::get_data_dir,
    ipc::{IpcClient, IpcRequest, IpcResponse},
    Monitor,
};
use restricto_storage::Database;

#[derive(Parser)]
#[command(name = "restricto")]
#[command(about = "Foreground app restriction daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the enforcement daemon
    Start,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Stop the enforcement daemon
    Stop,
    /// Check daemon status and the current enforcement session
    Status,
    /// Add a package to the restriction set
    Restrict {
        /// Package identifier (e.g. com.example.social)
        package: String,
    },
    /// Remove a package from the restriction set
    Unrestrict {
        /// Package identifier
        package: String,
    },
    /// List restricted packages
    List,
    /// Remove all restrictions
    Clear,
    /// Pause enforcement without stopping the daemon
    Pause,
    /// Resume enforcement
    Resume,
}

#[derive(Tabled)]
struct RestrictionRow {
    #[tabled(rename = "Package")]
    package: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;

    match cli.command {
        Commands::Start => start_daemon(&data_dir),
        Commands::DaemonInternalStart => run_daemon_process().await,
        Commands::Stop => stop_daemon(&data_dir).await,
        Commands::Status => show_status(&data_dir).await,
        Commands::Restrict { package } => restrict(&package),
        Commands::Unrestrict { package } => unrestrict(&package),
        Commands::List => list_restrictions(),
        Commands::Clear => clear_restrictions(),
        Commands::Pause => set_paused(&data_dir, true).await,
        Commands::Resume => set_paused(&data_dir, false).await,
    }
}

fn start_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join("restricto.pid");
    let sock_path = data_dir.join("restricto.sock");

    // 1. Check if daemon is already running
    if pid_file_path.exists() {
        if let Ok(pid_str) = fs::read_to_string(&pid_file_path) {
            if let Ok(pid) = pid_str.trim().parse::<usize>() {
                let mut sys = System::new();
                if sys.refresh_process(Pid::from(pid)) {
                    log::info!("Daemon is already running (PID: {pid}).");
                    return Ok(());
                }
            }
        }
        // If pid file is stale, remove it
        log::warn!("Removing stale PID file.");
        let _ = fs::remove_file(&pid_file_path);
    }

    // 2. Clean up old socket if it exists
    if sock_path.exists() {
        log::warn!("Removing stale socket file.");
        fs::remove_file(&sock_path)?;
    }

    log::info!("Starting Restricto daemon...");

    // 3. Spawn a new process for the daemon
    let current_exe = env::current_exe()?;
    let current_dir = env::current_dir()?;
    let child = Command::new(current_exe)
        .arg("daemon-internal-start")
        .current_dir(current_dir)
        .spawn()?;

    // 4. In parent process, write PID and exit
    log::info!("Daemon process started with PID: {}", child.id());
    fs::write(&pid_file_path, child.id().to_string())?;

    Ok(())
}

async fn run_daemon_process() -> Result<()> {
    // This is the detached daemon process
    // We must set up logging here, as this is a new process.
    if let Err(e) = setup_daemon_logging() {
        // If logging fails, we have no way to report errors. Panicking is the only option.
        panic!("Failed to set up daemon logging: {e}");
    }
    log::info!("Daemon process started internally.");

    let database = Database::new(None)?;
    let mut monitor = Monitor::new(database)?;
    if let Err(e) = monitor.run_with_signals().await {
        log::error!("Monitor loop exited with a fatal error: {e:#}");
        return Err(e);
    }

    Ok(())
}

async fn stop_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join("restricto.pid");
    let sock_path = data_dir.join("restricto.sock");

    if !pid_file_path.exists() {
        log::info!("Daemon is not running (no PID file).");
        // Also remove socket if it exists for consistency
        if sock_path.exists() {
            fs::remove_file(&sock_path)?;
        }
        return Ok(());
    }

    let pid_str = fs::read_to_string(&pid_file_path)?;
    let pid = pid_str
        .trim()
        .parse::<usize>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    log::info!("Stopping Restricto daemon (PID: {pid})...");
    let client = IpcClient::new(&sock_path);

    match client.send_command(IpcRequest::Shutdown).await {
        Ok(IpcResponse::Shutdown) => {
            log::info!("Daemon shutdown signal sent. Waiting for process to exit...");
            sleep(time::Duration::from_secs(2));

            let mut sys = System::new();
            if sys.refresh_process(Pid::from(pid)) {
                log::warn!("Daemon did not stop gracefully. Force killing...");
                if let Some(process) = sys.process(Pid::from(pid)) {
                    process.kill();
                }
            } else {
                log::info!("Daemon stopped successfully.");
            }
        }
        Ok(resp) => log::error!("Received unexpected response from daemon: {resp:?}"),
        Err(e) => {
            log::error!("Failed to send shutdown command: {e}. Forcing cleanup.");
            let mut sys = System::new();
            if sys.refresh_process(Pid::from(pid)) {
                if let Some(process) = sys.process(Pid::from(pid)) {
                    process.kill();
                    log::info!("Process killed.");
                }
            }
        }
    }

    // Only clean up once the process is confirmed gone. Removing the PID
    // file while the daemon still runs would orphan it from `start`'s
    // stale-PID check.
    sleep(time::Duration::from_millis(200));
    if process_alive(pid) {
        log::error!("Daemon (PID: {pid}) is still running; keeping PID file for a later stop.");
        return Ok(());
    }
    fs::remove_file(&pid_file_path)?;
    if sock_path.exists() {
        fs::remove_file(&sock_path)?;
    }

    Ok(())
}

fn process_alive(pid: usize) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from(pid))
}

async fn show_status(data_dir: &Path) -> Result<()> {
    let sock_path = data_dir.join("restricto.sock");

    if !sock_path.exists() {
        println!("Daemon Status: Not running");
        return Ok(());
    }

    let client = IpcClient::new(&sock_path);
    match client.send_command(IpcRequest::Status).await {
        Ok(IpcResponse::Status {
            running,
            paused,
            session_id,
            session_duration,
            current_foreground,
            last_blocked,
            blocks_this_session,
        }) => {
            println!(
                "Daemon Status: {}",
                if running { "Running" } else { "Stopped" }
            );
            if paused {
                println!("Enforcement: Paused");
            }

            println!("\nEnforcement Session: {session_id}");
            println!("  Duration: {}", format_duration(session_duration));
            println!(
                "  Foreground: {}",
                current_foreground.unwrap_or_else(|| String::from("None detected"))
            );
            println!(
                "  Last blocked: {}",
                last_blocked.unwrap_or_else(|| String::from("None"))
            );
            println!("  Blocks this session: {blocks_this_session}");
        }
        Ok(_) => anyhow::bail!("Unexpected response from daemon"),
        Err(e) => {
            log::error!("Failed to get status: {e}");
            println!("Daemon Status: Not running (or not responding)");
        }
    }
    Ok(())
}

fn restrict(package: &str) -> Result<()> {
    let db = Database::new(None)?;
    let mut restrictions = db.load_restrictions()?;

    if restrictions.insert(package) {
        db.save_restrictions(&restrictions)?;
        println!("Restricted: {package}");
    } else {
        println!("Already restricted: {package}");
    }
    Ok(())
}

fn unrestrict(package: &str) -> Result<()> {
    let db = Database::new(None)?;
    let mut restrictions = db.load_restrictions()?;

    if restrictions.remove(package) {
        db.save_restrictions(&restrictions)?;
        println!("Unrestricted: {package}");
    } else {
        println!("Not restricted: {package}");
    }
    Ok(())
}

fn list_restrictions() -> Result<()> {
    let db = Database::new(None)?;
    let restrictions = db.load_restrictions()?;

    if restrictions.is_empty() {
        println!("No restricted packages.");
        return Ok(());
    }

    let rows: Vec<RestrictionRow> = restrictions
        .iter()
        .map(|package| RestrictionRow {
            package: package.to_string(),
        })
        .collect();

    println!("{}", Table::new(rows));
    println!("\n{} restricted package(s)", restrictions.len());
    Ok(())
}

fn clear_restrictions() -> Result<()> {
    let db = Database::new(None)?;
    let count = db.load_restrictions()?.len();
    db.save_restrictions(&restricto_storage::RestrictionSet::new())?;
    println!("Cleared {count} restriction(s)");
    Ok(())
}

async fn set_paused(data_dir: &Path, paused: bool) -> Result<()> {
    // Prefer the daemon's control socket so the change is acknowledged; a
    // direct settings write covers the daemon-not-running case, since the
    // loop re-reads settings every tick anyway.
    let sock_path = data_dir.join("restricto.sock");
    if sock_path.exists() {
        let client = IpcClient::new(&sock_path);
        let request = if paused {
            IpcRequest::Pause
        } else {
            IpcRequest::Resume
        };
        match client.send_command(request).await {
            Ok(IpcResponse::Ack { paused }) => {
                println!(
                    "Enforcement {}",
                    if paused { "paused" } else { "resumed" }
                );
                return Ok(());
            }
            Ok(resp) => anyhow::bail!("Unexpected response from daemon: {resp:?}"),
            Err(e) => {
                log::warn!("Daemon not responding ({e}), updating settings directly.");
            }
        }
    }

    let db = Database::new(None)?;
    let mut settings = db.get_settings()?;
    settings.paused = paused;
    db.update_settings(&settings)?;
    println!(
        "Enforcement {} (takes effect when the daemon next reads settings)",
        if paused { "paused" } else { "resumed" }
    );
    Ok(())
}

fn setup_daemon_logging() -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = get_data_dir()?.join("restricto.log");

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .init();

    Ok(())
}

fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_alive_detects_own_process() {
        assert!(process_alive(std::process::id() as usize));
        // Far above any platform's pid_max, so never a live process
        assert!(!process_alive(999_999_999));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(59), "00:00:59");
        assert_eq!(format_duration(61), "00:01:01");
        assert_eq!(format_duration(3661), "01:01:01");
    }
}
