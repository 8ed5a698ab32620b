use chrono::Local;
use clap::{Parser, ValueEnum};
use duplex_port::config::{Config, ConfigLoader};
use duplex_port::port::{available_devices, open_serial, AsyncStreamPort, ReaderState, StreamPort};
use duplex_port::{logging, AppError, AppResult};
use std::io::Write;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

/// How often the monitor checks whether the remote end went away.
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LineEnding {
    Lf,
    Crlf,
    Cr,
    #[value(name = "none")]
    Empty,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
            Self::Cr => "\r",
            Self::Empty => "",
        }
    }
}

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "port-monitor",
    version,
    about = "Attach a duplex port to a serial device or TCP endpoint and relay it to the terminal."
)]
struct Args {
    /// Serial device path or alias from the config file.
    #[arg(long, conflicts_with = "tcp", required_unless_present_any = ["tcp", "list"])]
    serial: Option<String>,

    /// Baud rate for --serial. Defaults to serial.default_baud.
    #[arg(long, requires = "serial")]
    baud: Option<u32>,

    /// Connect to host:port instead of a serial device.
    #[arg(long)]
    tcp: Option<String>,

    /// List serial devices and exit.
    #[arg(long)]
    list: bool,

    /// Print received data as hex.
    #[arg(long)]
    hex: bool,

    /// Prefix each received chunk with a timestamp.
    #[arg(long)]
    timestamps: bool,

    /// Line ending appended to every line sent from stdin.
    #[arg(long, value_enum, default_value_t = LineEnding::Crlf)]
    eol: LineEnding,

    /// Explicit configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> AppResult<Config> {
    match path {
        Some(path) => Ok(ConfigLoader::load_from(path)?.into_config()),
        None => Ok(match ConfigLoader::load() {
            Ok(loader) => loader.into_config(),
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {}", e);
                ConfigLoader::with_defaults().into_config()
            }
        }),
    }
}

fn connect(args: &Args, config: &Config) -> AppResult<StreamPort> {
    let settings = config.port.settings();

    if let Some(addr) = &args.tcp {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let input = stream.try_clone()?;
        return Ok(StreamPort::open(addr.as_str(), input, stream, settings)?);
    }

    let name = args
        .serial
        .as_deref()
        .ok_or_else(|| AppError::InvalidArgs("either --serial or --tcp is required".into()))?;
    let path = config.serial.resolve_port(name);
    let (input, output) = open_serial(&path, &config.serial.configuration(args.baud))?;
    Ok(StreamPort::open(path.as_str(), input, output, settings)?)
}

fn render_chunk(data: &[u8], hex: bool) -> String {
    if hex {
        data.iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    logging::init(&config.logging);

    if args.list {
        for device in available_devices()? {
            println!("{device}");
        }
        return Ok(());
    }

    let port = AsyncStreamPort::new(connect(&args, &config)?);
    info!(port = port.port().name(), "Connected");

    let mut received = port.subscribe();
    let (hex, timestamps) = (args.hex, args.timestamps);
    let printer = tokio::spawn(async move {
        while let Some(chunk) = received.recv().await {
            let text = render_chunk(&chunk, hex);
            if timestamps {
                println!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), text);
            } else if hex {
                println!("{text}");
            } else {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state_check = tokio::time::interval(STATE_POLL_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let payload = format!("{}{}", line, args.eol.as_str());
                    if let Err(e) = port.full_write(payload, Duration::from_secs(10)).await {
                        warn!(error = %e, "Write failed");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            },
            _ = state_check.tick() => {
                if port.port().reader_state() == Some(ReaderState::Stopped) {
                    info!(reason = ?port.port().stop_reason(), "Remote end closed the stream");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    if !port.drain().await {
        warn!("Output was not fully drained before closing");
    }
    port.close().await;
    printer.abort();
    info!("Port closed");

    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Signal received, closing port");
}
