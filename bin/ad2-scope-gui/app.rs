use ad2_scope::{
    build_driver, time_axis, AcquisitionSession, AnalogInDriver, AppConfig, SampleCount,
    SampleRate, ScopeError, TraceStats,
};
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};
use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use log::{error, info, LevelFilter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type SharedSession = Arc<Mutex<AcquisitionSession<Box<dyn AnalogInDriver>>>>;

// ============================================================================
// Tee Writer - sends env_logger output to both stderr and GUI channel
// ============================================================================

struct TeeWriter {
    sender: Sender<String>,
    stderr: std::io::Stderr,
}

impl std::io::Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stderr.write_all(buf)?;
        if let Ok(s) = std::str::from_utf8(buf) {
            let trimmed = s.trim_end_matches('\n');
            if !trimmed.is_empty() {
                let _ = self.sender.try_send(trimmed.to_string());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stderr.flush()
    }
}

pub fn init_logging(level: LevelFilter) -> Receiver<String> {
    let (tx, rx) = unbounded();
    let writer = TeeWriter {
        sender: tx,
        stderr: std::io::stderr(),
    };

    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("winit", LevelFilter::Off)
        .filter_module("eframe", LevelFilter::Off)
        .filter_module("egui_glow", LevelFilter::Off)
        .filter_module("zbus", LevelFilter::Off)
        .filter_module("tracing", LevelFilter::Off)
        .filter_module("accesskit", LevelFilter::Off)
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .init();

    rx
}

// ============================================================================
// Run Status for GUI
// ============================================================================

#[derive(Debug, Clone)]
pub enum RunStatus {
    Idle,
    Capturing,
    Completed,
    Cancelled,
    Error(String),
}

/// Last successful capture
struct Trace {
    samples: Vec<f64>,
    sample_rate: f64,
    stats: Option<TraceStats>,
    captured_at: DateTime<Local>,
}

// ============================================================================
// Main Application
// ============================================================================

pub struct ScopeApp {
    config: AppConfig,

    // Input fields
    sample_count: String,
    sample_rate: String,

    // Acquisition
    session: Option<SharedSession>,
    shutdown_flag: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    result_receiver: Option<Receiver<Result<Vec<f64>, ScopeError>>>,
    pending_rate: f64,
    run_status: RunStatus,
    start_time: Option<Instant>,
    trace: Option<Trace>,

    // Messages
    message: Option<(String, bool)>, // (message, is_error)

    // Log messages for display
    log_messages: Vec<String>,
    log_receiver: Option<Receiver<String>>,
}

impl ScopeApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let (session, message) = match open_session(&config, shutdown_flag.clone()) {
            Ok(session) => (Some(session), None),
            Err(e) => {
                error!("Instrument setup failed: {}", e);
                (None, Some((format!("Instrument setup failed: {}", e), true)))
            }
        };

        Self {
            sample_count: config.acquisition.sample_count.to_string(),
            sample_rate: config.acquisition.sample_rate.to_string(),
            config,
            session,
            shutdown_flag,
            capture_thread: None,
            result_receiver: None,
            pending_rate: 0.0,
            run_status: RunStatus::Idle,
            start_time: None,
            trace: None,
            message,
            log_messages: Vec::new(),
            log_receiver: None,
        }
    }

    pub fn set_log_receiver(&mut self, receiver: Receiver<String>) {
        self.log_receiver = Some(receiver);
    }

    fn is_capturing(&self) -> bool {
        matches!(self.run_status, RunStatus::Capturing)
    }

    /// Parse and validate the input fields
    fn parse_inputs(&self) -> Result<(SampleCount, SampleRate), String> {
        let count: usize = self
            .sample_count
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a sample count", self.sample_count.trim()))?;
        let rate: f64 = self
            .sample_rate
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a sample rate", self.sample_rate.trim()))?;
        let count = SampleCount::new(count).map_err(|e| e.to_string())?;
        let rate = SampleRate::hz(rate).map_err(|e| e.to_string())?;
        Ok((count, rate))
    }

    fn start_capture(&mut self) {
        let Some(session) = self.session.clone() else {
            self.message = Some(("No instrument available".to_string(), true));
            return;
        };
        let (count, rate) = match self.parse_inputs() {
            Ok(inputs) => inputs,
            Err(e) => {
                self.run_status = RunStatus::Error(e.clone());
                self.message = Some((e, true));
                return;
            }
        };

        self.shutdown_flag.store(false, Ordering::SeqCst);
        let (result_tx, result_rx) = unbounded();
        self.result_receiver = Some(result_rx);
        self.pending_rate = rate.get();

        let handle = thread::spawn(move || {
            let mut session = session.lock();
            let result = session.capture(count.get(), rate.get());
            let _ = result_tx.send(result);
        });

        self.capture_thread = Some(handle);
        self.run_status = RunStatus::Capturing;
        self.start_time = Some(Instant::now());
        self.message = Some((
            format!("Capturing {} samples at {} S/s", count.get(), rate.get()),
            false,
        ));
    }

    fn cancel_capture(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.message = Some(("Cancel requested...".to_string(), false));
    }

    fn poll_logs(&mut self) {
        if let Some(rx) = &self.log_receiver {
            while let Ok(msg) = rx.try_recv() {
                self.log_messages.push(msg);
                // Keep log size reasonable
                if self.log_messages.len() > 1000 {
                    self.log_messages.drain(0..200);
                }
            }
        }
    }

    fn check_capture_status(&mut self) {
        self.poll_logs();

        let Some(rx) = &self.result_receiver else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(crossbeam_channel::TryRecvError::Empty) => return,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(ScopeError::AcquisitionFailed {
                    status: Default::default(),
                    reason: "capture worker terminated unexpectedly".to_string(),
                })
            }
        };

        self.result_receiver = None;
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }

        match result {
            Ok(samples) => {
                let stats = TraceStats::from_samples(&samples);
                self.message = Some((format!("Captured {} samples", samples.len()), false));
                self.trace = Some(Trace {
                    samples,
                    sample_rate: self.pending_rate,
                    stats,
                    captured_at: Local::now(),
                });
                self.run_status = RunStatus::Completed;
            }
            Err(ScopeError::Cancelled) => {
                info!("Capture cancelled");
                self.run_status = RunStatus::Cancelled;
                self.message = Some(("Capture cancelled".to_string(), false));
            }
            Err(e) => {
                // The previous trace stays on screen
                self.run_status = RunStatus::Error(e.to_string());
                self.message = Some((format!("Error: {}", e), true));
            }
        }
    }

    fn status_text(&self) -> &str {
        match &self.run_status {
            RunStatus::Idle => "Ready",
            RunStatus::Capturing => "Capturing",
            RunStatus::Completed => "Completed",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Error(_) => "Error",
        }
    }

    fn elapsed_text(&self) -> String {
        match self.start_time {
            Some(start) if self.is_capturing() => {
                format!("{:.1}s", start.elapsed().as_secs_f64())
            }
            _ => "-".to_string(),
        }
    }

    fn data_info_text(&self) -> String {
        match &self.trace {
            Some(trace) => format!(
                "{} samples @ {} S/s | {:.4} s | captured {}",
                trace.samples.len(),
                trace.sample_rate,
                trace.samples.len() as f64 / trace.sample_rate,
                trace.captured_at.format("%H:%M:%S")
            ),
            None => "No data".to_string(),
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.vertical(|ui| {
            ui.set_min_width(260.0);

            egui::Frame::group(ui.style()).show(ui, |ui| {
                egui::Grid::new("capture_grid")
                    .num_columns(2)
                    .spacing([20.0, 4.0])
                    .show(ui, |ui| {
                        ui.label("Samples:");
                        ui.add_enabled(
                            !self.is_capturing(),
                            egui::TextEdit::singleline(&mut self.sample_count),
                        );
                        ui.end_row();

                        ui.label("Sample Rate (Hz):");
                        ui.add_enabled(
                            !self.is_capturing(),
                            egui::TextEdit::singleline(&mut self.sample_rate),
                        );
                        ui.end_row();

                        ui.label("Channel:");
                        ui.label(format!("CH{}", self.config.acquisition.channel + 1));
                        ui.end_row();

                        ui.label("Instrument:");
                        ui.label(if self.config.device.simulate {
                            "Simulator".to_string()
                        } else {
                            format!("Device #{}", self.config.device.device_index)
                        });
                        ui.end_row();
                    });
            });

            ui.add_space(10.0);

            egui::Frame::group(ui.style()).show(ui, |ui| {
                egui::Grid::new("status_grid")
                    .num_columns(2)
                    .spacing([20.0, 4.0])
                    .show(ui, |ui| {
                        ui.label("Status:");
                        let status_color = match &self.run_status {
                            RunStatus::Capturing => egui::Color32::YELLOW,
                            RunStatus::Completed => egui::Color32::GREEN,
                            RunStatus::Error(_) => egui::Color32::RED,
                            RunStatus::Idle | RunStatus::Cancelled => egui::Color32::GRAY,
                        };
                        ui.colored_label(status_color, self.status_text());
                        ui.end_row();

                        ui.label("Elapsed:");
                        ui.label(self.elapsed_text());
                        ui.end_row();

                        let stats = self.trace.as_ref().and_then(|t| t.stats);
                        let volts = |v: Option<f64>| {
                            v.map(|v| format!("{:.4} V", v))
                                .unwrap_or_else(|| "-".to_string())
                        };
                        ui.label("Min / Max:");
                        ui.label(format!(
                            "{} / {}",
                            volts(stats.map(|s| s.min)),
                            volts(stats.map(|s| s.max))
                        ));
                        ui.end_row();

                        ui.label("Mean:");
                        ui.label(volts(stats.map(|s| s.mean)));
                        ui.end_row();

                        ui.label("Peak-to-peak:");
                        ui.label(volts(stats.map(|s| s.peak_to_peak())));
                        ui.end_row();
                    });
            });

            ui.add_space(10.0);

            if let Some((ref msg, is_error)) = self.message {
                if is_error {
                    ui.colored_label(egui::Color32::RED, msg);
                } else {
                    ui.colored_label(egui::Color32::GREEN, msg);
                }
                ui.add_space(5.0);
            }

            ui.horizontal(|ui| {
                let can_capture = !self.is_capturing() && self.session.is_some();
                if ui
                    .add_enabled(can_capture, egui::Button::new("Capture"))
                    .clicked()
                {
                    self.message = None;
                    self.start_capture();
                }

                if ui
                    .add_enabled(self.is_capturing(), egui::Button::new("Cancel"))
                    .clicked()
                {
                    self.cancel_capture();
                }
            });

            ui.add_space(10.0);
            ui.label("Activity Log");
            egui::Frame::group(ui.style()).show(ui, |ui| {
                egui::ScrollArea::vertical()
                    .max_height(200.0)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        ui.set_min_width(240.0);
                        for msg in &self.log_messages {
                            ui.label(egui::RichText::new(msg).monospace().size(11.0));
                        }
                        if self.log_messages.is_empty() {
                            ui.colored_label(egui::Color32::GRAY, "No activity yet");
                        }
                    });
            });
            if ui.button("Clear Log").clicked() {
                self.log_messages.clear();
            }
        });
    }

    fn render_plot(&self, ui: &mut egui::Ui) {
        ui.vertical(|ui| {
            ui.label(self.data_info_text());

            let plot = Plot::new("trace_plot")
                .x_axis_label("Time (s)")
                .y_axis_label("Voltage (V)");
            plot.show(ui, |plot_ui| {
                if let Some(trace) = &self.trace {
                    let points: PlotPoints = time_axis(trace.samples.len(), trace.sample_rate)
                        .into_iter()
                        .zip(&trace.samples)
                        .map(|(t, &v)| [t, v])
                        .collect();
                    plot_ui.line(Line::new(
                        format!("CH{}", self.config.acquisition.channel + 1),
                        points,
                    ));
                }
            });
        });
    }
}

/// Build the configured driver and wrap it in a shareable session
fn open_session(
    config: &AppConfig,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<SharedSession, ScopeError> {
    let settings = config.capture_settings()?;
    let driver = build_driver(&config.device, &config.simulation)?;
    let mut session = AcquisitionSession::new(driver, settings);
    session.set_shutdown_flag(shutdown_flag);
    Ok(Arc::new(Mutex::new(session)))
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_capture_status();

        // Keep polling the worker while a capture is in flight
        ctx.request_repaint_after(Duration::from_millis(100));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("AD2 Scope");
            ui.separator();
            ui.add_space(5.0);

            ui.horizontal_top(|ui| {
                self.render_controls(ui);
                ui.add_space(10.0);
                self.render_plot(ui);
            });
        });
    }
}
