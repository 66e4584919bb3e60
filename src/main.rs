use clap::{Parser, Subcommand};
use lua_board_agent::config::{ConfigLoader, LogFormat, LoggingConfig};
use lua_board_agent::port::list_ports;
use lua_board_agent::{BoardService, NotificationKind};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bridge between a visual programming IDE and a Lua RTOS board.",
    long_about = "Attaches to a Lua RTOS board over its serial console, transfers and runs programs, and reports the board's resets, block events and runtime errors as notifications."
)]
struct Cli {
    /// Configuration file (defaults to the standard search path).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port of the board, or an alias from the configuration.
    #[arg(short, long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports.
    Ports,
    /// Attach and print notifications as JSON lines until interrupted.
    Monitor,
    /// Run a console command and print its output.
    Exec { command: String },
    /// List a board directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Copy a file from the board.
    Get {
        remote: String,
        /// Local destination (stdout if omitted).
        local: Option<PathBuf>,
    },
    /// Copy a file to the board.
    Put { local: PathBuf, remote: String },
    /// Store a program, make it the autorun target and start it.
    Run {
        local: PathBuf,
        remote: String,
        /// Keep printing notifications after the launch.
        #[arg(short, long)]
        follow: bool,
    },
    /// Execute a local Lua file without storing it on the board.
    Eval { local: PathBuf },
    /// Print the board description.
    Info {
        /// Also ask the firmware server for a newer build.
        #[arg(long)]
        check_update: bool,
    },
    /// Download and flash the latest firmware.
    Upgrade,
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    init_logging(&loader.config().logging)?;
    if let Some(path) = &loader.config_path {
        info!(config = %path.display(), "configuration loaded");
    }

    let mut service = BoardService::new(loader.into_config());
    let result = tokio::select! {
        result = execute(&mut service, cli.port.as_deref(), cli.command) => result,
        _ = shutdown_signal() => Ok(()),
    };
    service.detach().await;

    if let Err(err) = &result {
        error!(error = %err, "command failed");
    }
    result
}

/// Set up `tracing` from the `[logging]` section. `RUST_LOG` takes precedence
/// over the configured level.
fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.file.is_none());

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
    Ok(())
}

/// How often the monitor discards unread console output.
const MONITOR_DRAIN_INTERVAL: Duration = Duration::from_millis(50);

async fn execute(
    service: &mut BoardService,
    port: Option<&str>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Ports = command {
        for listing in list_ports()? {
            let usb = match (listing.vid, listing.pid) {
                (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
                _ => "-".to_string(),
            };
            println!(
                "{}\t{}\t{}",
                listing.name,
                usb,
                listing.product.or(listing.manufacturer).unwrap_or_default()
            );
        }
        return Ok(());
    }

    let port = port.ok_or("--port is required for this command")?;
    let mut notifications = service.subscribe();
    service.attach(port).await?;

    match command {
        Command::Ports => return Ok(()),
        Command::Monitor => {}
        Command::Exec { command } => {
            println!("{}", service.run_command(&command).await?);
            return Ok(());
        }
        Command::Ls { path } => {
            let entries = service.list_directory(&path).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        Command::Get { remote, local } => {
            let data = service.read_file(&remote).await?;
            match local {
                Some(path) => tokio::fs::write(path, data).await?,
                None => println!("{}", String::from_utf8_lossy(&data)),
            }
            return Ok(());
        }
        Command::Put { local, remote } => {
            let data = tokio::fs::read(local).await?;
            service.write_file(&remote, &data).await?;
            return Ok(());
        }
        Command::Run {
            local,
            remote,
            follow,
        } => {
            let code = tokio::fs::read(local).await?;
            service.run_program(&remote, &code).await?;
            if !follow {
                return Ok(());
            }
        }
        Command::Eval { local } => {
            let code = tokio::fs::read(local).await?;
            service.run_code(&code).await?;
            return Ok(());
        }
        Command::Info { check_update } => {
            if check_update {
                service.check_for_update().await?;
            }
            let session = service.session()?;
            let summary = serde_json::json!({
                "port": session.port_name(),
                "info": session.info(),
                "raw": session.raw_info(),
                "newFirmwareAvailable": session.new_firmware_available(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }
        Command::Upgrade => {
            service.upgrade_firmware().await?;
            return Ok(());
        }
    }

    // Monitor: stream notifications until the board goes away. Console
    // output nobody reads is drained so the inspector keeps flowing.
    let mut drain = tokio::time::interval(MONITOR_DRAIN_INTERVAL);
    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(notification) => {
                    println!("{}", serde_json::to_string(&notification)?);
                    if notification.kind == NotificationKind::BoardDetached {
                        service.reap().await;
                        return Ok(());
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    error!(skipped, "notification consumer lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = drain.tick() => {
                service.consume().await?;
            }
        }
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, detaching");
}
