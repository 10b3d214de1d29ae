//! Binaire de démonstration autonome : ouvre le périphérique série
//! configuré, lance le moniteur, et journalise chaque impulsion
//! publiée jusqu'à Ctrl+C (§ CLI).

use anyhow::{Context, Result};
use pps_monitor::config::MonitorConfig;
use pps_monitor::context::MonitorContext;
use pps_monitor::{LogLevel, Monitor, TracingHooks};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

fn main() -> Result<()> {
    init_logging()?;

    info!("pps-monitor v{}", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    let config = load_or_create_config(&config_path)?;

    info!("device: {}", config.device.path);
    info!("attempt_kernel_pps: {}", config.capture.attempt_kernel_pps);
    info!("monitored_lines: {:?}", config.capture.monitored_lines);

    #[cfg(unix)]
    {
        run(config)
    }

    #[cfg(not(unix))]
    {
        error!("pps-monitor-demo only runs on unix targets (TIOCMIWAIT is a unix ioctl)");
        std::process::exit(1);
    }
}

#[cfg(unix)]
fn run(config: MonitorConfig) -> Result<()> {
    use pps_monitor::capture::userspace::{ModemLines, UserEdgeWaiter};
    use pps_monitor::monitor;

    let port = serialport::new(&config.device.path, config.device.baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native()
        .context("failed to open serial device")?;
    let fd = port.as_raw_fd();

    let monitored = config
        .capture
        .monitored_lines
        .iter()
        .fold(ModemLines::empty(), |acc, line| {
            acc | match line.as_str() {
                "cd" => ModemLines::CARRIER_DETECT,
                "ri" => ModemLines::RING_INDICATOR,
                "cts" => ModemLines::CLEAR_TO_SEND,
                _ => ModemLines::empty(),
            }
        });

    let context = Arc::new(MonitorContext::new(fd, config.device.path.clone(), Box::new(TracingHooks)));

    let kernel = if config.capture.attempt_kernel_pps {
        monitor::try_setup_kernel_source(&context, fd)
    } else {
        None
    };

    let waiter = UserEdgeWaiter::new(fd, config.device.path.clone(), monitored)
        .context("failed to initialize modem-line waiter")?;

    let mut handle = Monitor::activate(Arc::clone(&context), waiter, kernel)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        warn!("shutdown requested");
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("stopping monitor");
    handle.deactivate();

    let snapshot = context.lastpps();
    context.hooks.log(
        LogLevel::Inf,
        &format!("final count {}, last offset {}", snapshot.count, snapshot.delta.offset()),
    );

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to create log filter")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

fn get_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        return PathBuf::from(&args[1]);
    }

    #[cfg(target_os = "linux")]
    return PathBuf::from("/etc/pps-monitor/config.toml");

    #[cfg(not(target_os = "linux"))]
    return PathBuf::from("config.toml");
}

fn load_or_create_config(path: &PathBuf) -> Result<MonitorConfig> {
    if path.exists() {
        info!("loading configuration from {}", path.display());
        MonitorConfig::from_file(path)
    } else {
        warn!("configuration file not found: {}", path.display());
        warn!("creating example configuration...");

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("failed to create config directory")?;
            }
        }

        MonitorConfig::create_example_config(path).context("failed to create example config")?;
        info!("example configuration created at {}", path.display());
        info!("edit the configuration file and restart");

        MonitorConfig::from_file(path)
    }
}
