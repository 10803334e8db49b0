use std::f64::consts::PI;

use log::debug;

use super::interface::AnalogInDriver;
use crate::config::SimulationConfig;
use crate::error::ScopeError;
use crate::types::{
    AcquisitionMode, AcquisitionStatus, ChannelIndex, DeviceHandle, SampleCount, SampleRate,
    TriggerConfig, VoltageRange, ANALOG_IN_CHANNELS,
};

const CHANNELS: usize = ANALOG_IN_CHANNELS as usize;

#[derive(Debug, Clone, Copy)]
struct SimulatedChannel {
    enabled: bool,
    range: f64,
    offset: f64,
}

impl Default for SimulatedChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            range: 5.0,
            offset: 0.0,
        }
    }
}

/// Stand-in instrument for running without hardware.
///
/// CH1 carries a sine wave and CH2 a square wave of the configured frequency
/// and amplitude, both with uniform noise added, clipped to the channel's
/// input range. A capture completes after `polls_until_done` status polls.
/// Only one session can be open at a time, like the real device.
#[derive(Debug)]
pub struct SimulatedDriver {
    settings: SimulationConfig,
    handle: Option<DeviceHandle>,
    next_handle: i32,
    channels: [SimulatedChannel; CHANNELS],
    sample_rate: f64,
    buffer_size: usize,
    trigger: Option<TriggerConfig>,
    armed: bool,
    polls_remaining: u32,
}

impl SimulatedDriver {
    pub fn new(settings: SimulationConfig) -> Self {
        Self {
            settings,
            handle: None,
            next_handle: 1,
            channels: [SimulatedChannel::default(); CHANNELS],
            sample_rate: 100_000.0,
            buffer_size: 0,
            trigger: None,
            armed: false,
            polls_remaining: 0,
        }
    }

    /// Whether a session currently holds the simulated device
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn check_handle(&self, handle: DeviceHandle) -> Result<(), ScopeError> {
        match self.handle {
            Some(open) if open == handle => Ok(()),
            _ => Err(ScopeError::driver(
                "simulator",
                format!("{} is not an open device", handle),
            )),
        }
    }

    fn channel_mut(&mut self, channel: ChannelIndex) -> &mut SimulatedChannel {
        // ChannelIndex is validated on construction
        &mut self.channels[channel.0 as usize]
    }

    fn sample(&self, channel: ChannelIndex, index: usize) -> f64 {
        let t = index as f64 / self.sample_rate;
        let phase = 2.0 * PI * self.settings.frequency_hz * t;
        let clean = if channel.0 == 0 {
            self.settings.amplitude_v * phase.sin()
        } else if phase.sin() >= 0.0 {
            self.settings.amplitude_v
        } else {
            -self.settings.amplitude_v
        };
        let noise = if self.settings.noise_v > 0.0 {
            rand::random::<f64>() * 2.0 * self.settings.noise_v - self.settings.noise_v
        } else {
            0.0
        };
        let config = self.channels[channel.0 as usize];
        let half_span = config.range / 2.0;
        (clean + noise).clamp(config.offset - half_span, config.offset + half_span)
    }
}

impl AnalogInDriver for SimulatedDriver {
    fn open_device(&mut self, device_index: i32) -> Result<DeviceHandle, ScopeError> {
        if device_index != 0 {
            return Err(ScopeError::DeviceUnavailable(format!(
                "simulated device index {} does not exist",
                device_index
            )));
        }
        if self.handle.is_some() {
            return Err(ScopeError::DeviceUnavailable(
                "simulated device is busy".to_string(),
            ));
        }
        let handle = DeviceHandle(self.next_handle);
        self.next_handle += 1;
        self.handle = Some(handle);
        self.channels = [SimulatedChannel::default(); CHANNELS];
        self.trigger = None;
        self.armed = false;
        debug!("Simulator opened as {}", handle);
        Ok(handle)
    }

    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.handle = None;
        self.armed = false;
        debug!("Simulator closed {}", handle);
        Ok(())
    }

    fn enable_channel(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        enable: bool,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.channel_mut(channel).enabled = enable;
        Ok(())
    }

    fn set_range(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        range: VoltageRange,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.channel_mut(channel).range = range.0;
        Ok(())
    }

    fn set_offset(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        volts: f64,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.channel_mut(channel).offset = volts;
        Ok(())
    }

    fn set_acquisition_mode(
        &mut self,
        handle: DeviceHandle,
        _mode: AcquisitionMode,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)
    }

    fn set_sample_rate(
        &mut self,
        handle: DeviceHandle,
        rate: SampleRate,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.sample_rate = rate.get();
        Ok(())
    }

    fn set_buffer_size(
        &mut self,
        handle: DeviceHandle,
        size: SampleCount,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.buffer_size = size.get();
        Ok(())
    }

    fn set_trigger(
        &mut self,
        handle: DeviceHandle,
        trigger: Option<&TriggerConfig>,
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.trigger = trigger.copied();
        Ok(())
    }

    fn arm(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        if let Some(trigger) = &self.trigger {
            debug!(
                "Simulator armed on CH{} {:?} edge at {:.3} V",
                trigger.channel.0 + 1,
                trigger.slope,
                trigger.level
            );
        }
        self.armed = true;
        self.polls_remaining = self.settings.polls_until_done;
        Ok(())
    }

    fn poll_status(&mut self, handle: DeviceHandle) -> Result<AcquisitionStatus, ScopeError> {
        self.check_handle(handle)?;
        if !self.armed {
            return Ok(AcquisitionStatus::Configuring);
        }
        if self.polls_remaining > 0 {
            self.polls_remaining -= 1;
        }
        if self.polls_remaining == 0 {
            Ok(AcquisitionStatus::Done)
        } else {
            Ok(AcquisitionStatus::Armed)
        }
    }

    fn read_samples(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        buffer: &mut [f64],
    ) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        if !self.armed || self.polls_remaining > 0 {
            return Err(ScopeError::driver("simulator", "no completed capture"));
        }
        if !self.channels[channel.0 as usize].enabled {
            return Err(ScopeError::driver(
                "simulator",
                format!("CH{} is not enabled", channel.0 + 1),
            ));
        }
        if buffer.len() > self.buffer_size {
            return Err(ScopeError::driver(
                "simulator",
                format!(
                    "requested {} samples from a {}-sample buffer",
                    buffer.len(),
                    self.buffer_size
                ),
            ));
        }
        for (index, slot) in buffer.iter_mut().enumerate() {
            *slot = self.sample(channel, index);
        }
        Ok(())
    }

    fn stop(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        self.check_handle(handle)?;
        self.armed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_settings() -> SimulationConfig {
        SimulationConfig {
            frequency_hz: 1000.0,
            amplitude_v: 1.0,
            noise_v: 0.0,
            polls_until_done: 2,
        }
    }

    fn configured(driver: &mut SimulatedDriver, samples: usize) -> DeviceHandle {
        let handle = driver.open_device(0).unwrap();
        let ch1 = ChannelIndex::new(0).unwrap();
        driver.enable_channel(handle, ch1, true).unwrap();
        driver
            .set_range(handle, ch1, VoltageRange::volts(5.0).unwrap())
            .unwrap();
        driver
            .set_sample_rate(handle, SampleRate::hz(100_000.0).unwrap())
            .unwrap();
        driver
            .set_buffer_size(handle, SampleCount::new(samples).unwrap())
            .unwrap();
        handle
    }

    #[test]
    fn test_second_open_is_refused() {
        let mut driver = SimulatedDriver::new(quiet_settings());
        let handle = driver.open_device(0).unwrap();
        assert!(matches!(
            driver.open_device(0),
            Err(ScopeError::DeviceUnavailable(_))
        ));
        driver.close_device(handle).unwrap();
        assert!(!driver.is_open());
        assert!(driver.open_device(0).is_ok());
    }

    #[test]
    fn test_unknown_device_index() {
        let mut driver = SimulatedDriver::new(quiet_settings());
        assert!(matches!(
            driver.open_device(3),
            Err(ScopeError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_done_after_configured_polls() {
        let mut driver = SimulatedDriver::new(quiet_settings());
        let handle = configured(&mut driver, 100);
        assert_eq!(driver.poll_status(handle).unwrap(), AcquisitionStatus::Configuring);
        driver.arm(handle).unwrap();
        assert_eq!(driver.poll_status(handle).unwrap(), AcquisitionStatus::Armed);
        assert_eq!(driver.poll_status(handle).unwrap(), AcquisitionStatus::Done);
    }

    #[test]
    fn test_sine_samples() {
        let mut driver = SimulatedDriver::new(quiet_settings());
        let handle = configured(&mut driver, 100);
        driver.arm(handle).unwrap();
        while driver.poll_status(handle).unwrap() != AcquisitionStatus::Done {}

        let mut buffer = vec![f64::NAN; 100];
        driver
            .read_samples(handle, ChannelIndex::new(0).unwrap(), &mut buffer)
            .unwrap();
        // 1 kHz at 100 kS/s: quarter period is 25 samples
        assert!(buffer[0].abs() < 1e-9);
        assert!((buffer[25] - 1.0).abs() < 1e-9);
        assert!((buffer[75] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_samples_clipped_to_range() {
        let mut driver = SimulatedDriver::new(SimulationConfig {
            amplitude_v: 10.0,
            ..quiet_settings()
        });
        let handle = configured(&mut driver, 100);
        driver.arm(handle).unwrap();
        while driver.poll_status(handle).unwrap() != AcquisitionStatus::Done {}

        let mut buffer = vec![0.0; 100];
        driver
            .read_samples(handle, ChannelIndex::new(0).unwrap(), &mut buffer)
            .unwrap();
        assert!(buffer.iter().all(|v| v.abs() <= 2.5));
    }

    #[test]
    fn test_read_before_done_fails() {
        let mut driver = SimulatedDriver::new(quiet_settings());
        let handle = configured(&mut driver, 10);
        driver.arm(handle).unwrap();
        let mut buffer = vec![0.0; 10];
        assert!(driver
            .read_samples(handle, ChannelIndex::new(0).unwrap(), &mut buffer)
            .is_err());
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut driver = SimulatedDriver::new(quiet_settings());
        let handle = driver.open_device(0).unwrap();
        driver.close_device(handle).unwrap();
        assert!(driver.arm(handle).is_err());
        assert!(driver.close_device(handle).is_err());
    }
}
