use ad2_scope::{
    build_driver, load_config, AcquisitionSession, AnalogInDriver,
    AppConfig, CaptureJob, CaptureSettings, DwfLibrary, Job, Renderer, ScopeError,
    TerminalRenderer, TraceStats,
};
use chrono::Local;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn, LevelFilter};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[cfg(windows)]
use std::ffi::OsString;
#[cfg(windows)]
use std::os::windows::ffi::OsStrExt;

/// Analog Discovery 2 single-shot capture
#[derive(Parser, Debug)]
#[command(name = "ad2-capture")]
#[command(about = "Capture one buffer from an Analog Discovery 2 and plot it", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of samples to capture
    #[arg(short = 'n', long, value_name = "COUNT")]
    samples: Option<usize>,

    /// Sample rate in samples per second
    #[arg(short, long, value_name = "HZ")]
    rate: Option<f64>,

    /// Timeout on top of the capture duration, in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Use the built-in simulator instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Only list attached devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Skip the terminal plot
    #[arg(long)]
    no_plot: bool,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Windows-specific: Allocate console if launched from GUI
    #[cfg(windows)]
    ensure_console_allocated();

    let args = Args::parse();
    let (mut config, load_error) = match load_config(args.config.as_deref()) {
        Ok(config) => (config, None),
        // An explicit file that fails to load is fatal
        Err(e) if args.config.is_some() => return Err(e.into()),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if args.simulate {
        config.device.simulate = true;
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.logging.log_level.clone());
    initialize_logging(&log_level)?;
    match load_error {
        Some(e) => warn!("Failed to load config ({}), using defaults", e),
        None => info!("Configuration loaded successfully"),
    }
    log_startup_info(&config, args.config.as_ref());

    if args.list_devices {
        return list_devices(&config);
    }

    let sample_count = args.samples.unwrap_or(config.acquisition.sample_count);
    let sample_rate = args.rate.unwrap_or(config.acquisition.sample_rate);
    let mut settings = config.capture_settings()?;
    if let Some(ms) = args.timeout_ms {
        settings.timeout = Duration::from_millis(ms);
    }
    log_capture_settings(&settings, sample_count, sample_rate);

    let driver = build_driver(&config.device, &config.simulation)?;
    let shutdown_flag = setup_shutdown_handler()?;
    let mut session = AcquisitionSession::new(driver, settings);
    session.set_shutdown_flag(shutdown_flag.clone());

    let samples = run_and_report(&mut session, sample_count, sample_rate, shutdown_flag)?;

    if !args.no_plot {
        let mut renderer = TerminalRenderer::new(config.plot.width, config.plot.height)
            .with_title(format!(
                "CH{} | {} samples @ {} S/s | {}",
                settings.channel.0 + 1,
                samples.len(),
                sample_rate,
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ));
        renderer.render(&samples, sample_rate)?;
    }

    Ok(())
}

// Helper Functions

/// Log startup information
fn log_startup_info(config: &AppConfig, config_path: Option<&PathBuf>) {
    info!("=== AD2 Capture ===");
    match config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: defaults / auto-discovered"),
    }
    if config.device.simulate {
        info!("Instrument: simulator");
    } else {
        info!("Instrument: device #{}", config.device.device_index);
        if let Some(ref path) = config.device.library_path {
            info!("WaveForms runtime: {}", path);
        }
    }
}

/// Log the effective capture configuration
fn log_capture_settings(settings: &CaptureSettings, sample_count: usize, sample_rate: f64) {
    info!(
        "CH{}: range {:.3} V, offset {:.3} V",
        settings.channel.0 + 1,
        settings.voltage_range.0,
        settings.voltage_offset
    );
    info!("Capture: {} samples at {} S/s", sample_count, sample_rate);
    info!(
        "Poll interval: {:?}, timeout: {:?}",
        settings.poll_interval, settings.timeout
    );
    match &settings.trigger {
        Some(trigger) => info!(
            "Trigger: CH{} {:?} edge at {:.3} V (auto after {:?})",
            trigger.channel.0 + 1,
            trigger.slope,
            trigger.level,
            trigger.auto_timeout
        ),
        None => info!("Trigger: none (free running)"),
    }
}

/// Print the attached instruments
fn list_devices(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.device.simulate {
        println!("1 device: simulator");
        return Ok(());
    }
    let library = match &config.device.library_path {
        Some(path) => DwfLibrary::load_from(path)?,
        None => DwfLibrary::load()?,
    };
    info!("WaveForms runtime {}", library.version()?);
    let count = library.device_count()?;
    println!("{} device(s) attached", count);
    Ok(())
}

/// Setup Ctrl+C handler for graceful shutdown
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - cancelling capture...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

/// Run the capture and report results
fn run_and_report<D: AnalogInDriver>(
    session: &mut AcquisitionSession<D>,
    sample_count: usize,
    sample_rate: f64,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    let timeout = session.settings().timeout;
    let mut job = CaptureJob::new(session, sample_count, sample_rate)?;
    info!(
        "Starting capture ({:?} of signal)...",
        job.capture_duration()
    );

    match job.run(timeout) {
        Ok(samples) => {
            info!("✓ Capture complete: {} samples", samples.len());
            if let Some(stats) = TraceStats::from_samples(&samples) {
                info!(
                    "min {:.4} V | max {:.4} V | mean {:.4} V | p-p {:.4} V",
                    stats.min,
                    stats.max,
                    stats.mean,
                    stats.peak_to_peak()
                );
            }
            Ok(samples)
        }
        Err(ScopeError::Cancelled) if shutdown_flag.load(Ordering::SeqCst) => {
            warn!("✓ Capture stopped by user");
            Err(ScopeError::Cancelled.into())
        }
        Err(e) => {
            error!("✗ Capture failed: {}", e);
            Err(e.into())
        }
    }
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    Ok(())
}

/// Windows-specific: Allocate console if running from GUI
#[cfg(windows)]
fn ensure_console_allocated() {
    unsafe {
        if winapi::um::consoleapi::AllocConsole() != 0 {
            println!("Console allocated for AD2 capture");
        }

        let title = "AD2 Capture";
        let wide_title: Vec<u16> = OsString::from(title)
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        winapi::um::wincon::SetConsoleTitleW(wide_title.as_ptr());

        // Enable ANSI escape sequences for colored output (Windows 10+)
        let stdout_handle =
            winapi::um::processenv::GetStdHandle(winapi::um::winbase::STD_OUTPUT_HANDLE);
        if stdout_handle != winapi::um::handleapi::INVALID_HANDLE_VALUE {
            let mut mode: u32 = 0;
            if winapi::um::consoleapi::GetConsoleMode(stdout_handle, &mut mode) != 0 {
                mode |= winapi::um::wincon::ENABLE_VIRTUAL_TERMINAL_PROCESSING;
                winapi::um::consoleapi::SetConsoleMode(stdout_handle, mode);
            }
        }
    }
}
