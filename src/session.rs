use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::dwf::AnalogInDriver;
use crate::error::ScopeError;
use crate::types::{
    AcquisitionMode, AcquisitionStatus, ChannelConfiguration, ChannelIndex, DeviceHandle,
    SampleCount, SampleRate, TriggerConfig, VoltageRange,
};

/// Per-capture settings that do not come from the caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub device_index: i32,
    pub channel: ChannelIndex,
    pub voltage_range: VoltageRange,
    pub voltage_offset: f64,
    pub trigger: Option<TriggerConfig>,
    /// Pause between two status polls; zero spins
    pub poll_interval: Duration,
    /// Allowed overhead on top of the capture's own duration
    pub timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            channel: ChannelIndex(0),
            voltage_range: VoltageRange(5.0),
            voltage_offset: 0.0,
            trigger: None,
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }
}

impl CaptureSettings {
    pub fn channel_configuration(
        &self,
        sample_count: SampleCount,
        sample_rate: SampleRate,
    ) -> ChannelConfiguration {
        ChannelConfiguration {
            channel: self.channel,
            voltage_range: self.voltage_range,
            voltage_offset: self.voltage_offset,
            acquisition_mode: AcquisitionMode::Single,
            sample_rate,
            buffer_size: sample_count,
            trigger: self.trigger,
        }
    }
}

/// Phases of one capture, logged as they happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Configuring,
    Armed,
    Done,
    Error,
    TimeoutExceeded,
    Closed,
}

/// An open device that is released when dropped.
///
/// Dropping it while a capture is still running aborts the capture first.
struct OpenDevice<'a, D: AnalogInDriver> {
    driver: &'a mut D,
    handle: DeviceHandle,
    running: bool,
}

impl<'a, D: AnalogInDriver> OpenDevice<'a, D> {
    fn open(driver: &'a mut D, device_index: i32) -> Result<Self, ScopeError> {
        let handle = driver.open_device(device_index)?;
        if !handle.is_valid() {
            return Err(ScopeError::DeviceUnavailable(
                "driver returned the null device handle".to_string(),
            ));
        }
        Ok(Self {
            driver,
            handle,
            running: false,
        })
    }

    fn configure(&mut self, config: &ChannelConfiguration) -> Result<(), ScopeError> {
        let handle = self.handle;
        let driver = &mut *self.driver;
        driver.enable_channel(handle, config.channel, true)?;
        driver.set_range(handle, config.channel, config.voltage_range)?;
        driver.set_offset(handle, config.channel, config.voltage_offset)?;
        driver.set_acquisition_mode(handle, config.acquisition_mode)?;
        driver.set_sample_rate(handle, config.sample_rate)?;
        driver.set_buffer_size(handle, config.buffer_size)?;
        driver.set_trigger(handle, config.trigger.as_ref())
    }

    fn arm(&mut self) -> Result<(), ScopeError> {
        self.running = true;
        self.driver.arm(self.handle)
    }
}

impl<D: AnalogInDriver> Drop for OpenDevice<'_, D> {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.driver.stop(self.handle) {
                warn!("Failed to abort capture on {}: {}", self.handle, e);
            }
        }
        match self.driver.close_device(self.handle) {
            Ok(()) => debug!("Released {}", self.handle),
            Err(e) => warn!("Failed to release {}: {}", self.handle, e),
        }
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!("Capture {:?} -> {:?}", state, next);
    *state = next;
}

/// One-channel, single-shot acquisition against one instrument.
///
/// Every [`capture`](Self::capture) opens the device, applies the full
/// configuration, waits for the buffer to fill, reads it and releases the
/// device again. Nothing carries over between captures.
///
/// `capture` blocks the calling thread for the whole acquisition. Callers
/// that share a session between threads must serialize access themselves.
pub struct AcquisitionSession<D: AnalogInDriver> {
    driver: D,
    settings: CaptureSettings,
    shutdown_requested: Option<Arc<AtomicBool>>,
    last_state: SessionState,
}

impl<D: AnalogInDriver> AcquisitionSession<D> {
    pub fn new(driver: D, settings: CaptureSettings) -> Self {
        Self {
            driver,
            settings,
            shutdown_requested: None,
            last_state: SessionState::Idle,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CaptureSettings {
        &mut self.settings
    }

    /// Set a flag that, once raised, aborts the poll loop of a running capture
    pub fn set_shutdown_flag(&mut self, flag: Arc<AtomicBool>) {
        self.shutdown_requested = Some(flag);
    }

    /// Phase the most recent capture ended in
    pub fn last_state(&self) -> SessionState {
        self.last_state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Capture `sample_count` voltages at `sample_rate` samples per second
    ///
    /// # Returns
    /// The samples in acquisition order, exactly `sample_count` of them.
    ///
    /// # Errors
    /// - [`ScopeError::InvalidParameters`] before touching the device
    /// - [`ScopeError::DeviceUnavailable`] if the instrument cannot be claimed
    /// - [`ScopeError::AcquisitionFailed`] if the device reports an error or stops answering
    /// - [`ScopeError::AcquisitionTimeout`] if the capture does not complete in time
    /// - [`ScopeError::Cancelled`] if the shutdown flag was raised
    /// - [`ScopeError::Driver`] if a configuration or read call fails
    ///
    /// The device is released on every path.
    pub fn capture(&mut self, sample_count: usize, sample_rate: f64) -> Result<Vec<f64>, ScopeError> {
        let count = SampleCount::new(sample_count)?;
        let rate = SampleRate::hz(sample_rate)?;
        let timeout = self.settings.timeout;
        self.capture_with_timeout(count, rate, timeout)
    }

    /// Same as [`capture`](Self::capture) with validated inputs and an explicit timeout
    pub fn capture_with_timeout(
        &mut self,
        sample_count: SampleCount,
        sample_rate: SampleRate,
        timeout: Duration,
    ) -> Result<Vec<f64>, ScopeError> {
        let settings = self.settings;
        let shutdown = self.shutdown_requested.clone();
        let config = settings.channel_configuration(sample_count, sample_rate);
        let mut state = SessionState::Idle;

        info!(
            "Capturing {} samples at {} S/s on CH{}",
            sample_count.get(),
            sample_rate.get(),
            config.channel.0 + 1
        );

        transition(&mut state, SessionState::Opening);
        let mut device = match OpenDevice::open(&mut self.driver, settings.device_index) {
            Ok(device) => device,
            Err(e) => {
                transition(&mut state, SessionState::Error);
                self.last_state = state;
                return Err(e);
            }
        };
        let deadline = timeout.saturating_add(sample_rate.duration_of(sample_count));
        let outcome = run_capture(
            &mut device,
            &config,
            settings.poll_interval,
            deadline,
            shutdown.as_deref(),
            &mut state,
        );

        drop(device);
        transition(&mut state, SessionState::Closed);
        self.last_state = state;
        let samples = outcome?;
        info!("Captured {} samples", samples.len());
        Ok(samples)
    }
}

/// Configure, arm, wait and read on an already open device
fn run_capture<D: AnalogInDriver>(
    device: &mut OpenDevice<'_, D>,
    config: &ChannelConfiguration,
    poll_interval: Duration,
    deadline: Duration,
    shutdown: Option<&AtomicBool>,
    state: &mut SessionState,
) -> Result<Vec<f64>, ScopeError> {
    transition(state, SessionState::Configuring);
    let armed = device.configure(config).and_then(|()| device.arm());
    if let Err(e) = armed {
        transition(state, SessionState::Error);
        return Err(e);
    }
    transition(state, SessionState::Armed);

    if let Err(e) = wait_for_completion(device, poll_interval, deadline, shutdown) {
        let next = match &e {
            ScopeError::AcquisitionTimeout { .. } => SessionState::TimeoutExceeded,
            _ => SessionState::Error,
        };
        transition(state, next);
        return Err(e);
    }

    device.running = false;
    transition(state, SessionState::Done);
    let mut samples = vec![0.0; config.buffer_size.get()];
    device
        .driver
        .read_samples(device.handle, config.channel, &mut samples)?;
    Ok(samples)
}

fn wait_for_completion<D: AnalogInDriver>(
    device: &mut OpenDevice<'_, D>,
    poll_interval: Duration,
    budget: Duration,
    shutdown: Option<&AtomicBool>,
) -> Result<(), ScopeError> {
    let started = Instant::now();
    let mut last_status = AcquisitionStatus::Configuring;
    let mut polls: u64 = 0;

    loop {
        if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            info!("Capture cancelled after {} polls", polls);
            return Err(ScopeError::Cancelled);
        }

        let status = device.driver.poll_status(device.handle).map_err(|e| {
            ScopeError::AcquisitionFailed {
                status: last_status,
                reason: format!("lost contact with the device: {}", e),
            }
        })?;
        polls += 1;
        if status != last_status {
            debug!("Status {} after {} polls", status, polls);
        }
        last_status = status;

        match status {
            AcquisitionStatus::Done => return Ok(()),
            AcquisitionStatus::Error => {
                return Err(ScopeError::AcquisitionFailed {
                    status,
                    reason: "device reported an error state".to_string(),
                });
            }
            AcquisitionStatus::Configuring | AcquisitionStatus::Armed => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= budget {
            return Err(ScopeError::AcquisitionTimeout {
                elapsed,
                last_status,
            });
        }
        if !poll_interval.is_zero() {
            thread::sleep(poll_interval);
        }
    }
}
