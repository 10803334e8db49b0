use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ScopeError;

/// Number of analog input channels on the Analog Discovery 2
pub const ANALOG_IN_CHANNELS: i32 = 2;

/// Largest input range (peak-to-peak volts) the scope front-end accepts
pub const MAX_VOLTAGE_RANGE: f64 = 50.0;

/// Handle of an open WaveForms device session.
///
/// The driver hands out `0` when no device could be opened, so the null
/// handle doubles as the "no device" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub i32);

impl DeviceHandle {
    pub const NONE: DeviceHandle = DeviceHandle(0);

    pub fn is_valid(&self) -> bool {
        *self != Self::NONE
    }
}

impl Default for DeviceHandle {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "hdwf#{}", self.0)
        } else {
            write!(f, "hdwfNone")
        }
    }
}

/// Oscilloscope input channel (0 = CH1, 1 = CH2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelIndex(pub i32);

impl ChannelIndex {
    pub fn new(index: i32) -> Result<Self, ScopeError> {
        if (0..ANALOG_IN_CHANNELS).contains(&index) {
            Ok(ChannelIndex(index))
        } else {
            Err(ScopeError::InvalidParameters(format!(
                "Channel index must be 0-{}, got {}",
                ANALOG_IN_CHANNELS - 1,
                index
            )))
        }
    }
}

impl From<ChannelIndex> for i32 {
    fn from(channel: ChannelIndex) -> Self {
        channel.0
    }
}

/// Peak-to-peak input range in volts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageRange(pub f64);

impl VoltageRange {
    pub fn volts(value: f64) -> Result<Self, ScopeError> {
        if value.is_finite() && value > 0.0 && value <= MAX_VOLTAGE_RANGE {
            Ok(Self(value))
        } else {
            Err(ScopeError::InvalidParameters(format!(
                "Voltage range must be in (0, {}] V, got {}",
                MAX_VOLTAGE_RANGE, value
            )))
        }
    }

    /// Half the range, i.e. the largest magnitude representable around zero offset
    pub fn half_span(&self) -> f64 {
        self.0 / 2.0
    }
}

impl From<VoltageRange> for f64 {
    fn from(range: VoltageRange) -> Self {
        range.0
    }
}

/// Number of samples in one capture; always non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCount(usize);

impl SampleCount {
    pub fn new(count: usize) -> Result<Self, ScopeError> {
        if count == 0 {
            return Err(ScopeError::InvalidParameters(
                "sample_count must be greater than zero".to_string(),
            ));
        }
        if count > i32::MAX as usize {
            return Err(ScopeError::InvalidParameters(format!(
                "sample_count {} exceeds the driver buffer limit",
                count
            )));
        }
        Ok(Self(count))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<SampleCount> for usize {
    fn from(samples: SampleCount) -> Self {
        samples.0
    }
}

/// Digitizer sample rate in samples per second; always finite and positive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRate(f64);

impl SampleRate {
    pub fn hz(value: f64) -> Result<Self, ScopeError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(ScopeError::InvalidParameters(format!(
                "sample_rate must be a positive number of samples per second, got {}",
                value
            )))
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }

    /// Time between two consecutive samples
    pub fn period(&self) -> f64 {
        1.0 / self.0
    }

    /// Wall-clock time the instrument needs to fill `samples`
    ///
    /// Saturates at `Duration::MAX` for rates so low the time is unrepresentable.
    pub fn duration_of(&self, samples: SampleCount) -> Duration {
        Duration::try_from_secs_f64(samples.get() as f64 / self.0).unwrap_or(Duration::MAX)
    }
}

impl From<SampleRate> for f64 {
    fn from(rate: SampleRate) -> Self {
        rate.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// One buffer-full per arm, then stop
    #[default]
    Single,
}

/// Capture progress as seen by the poll loop.
///
/// The instrument reports a richer set of states; drivers collapse them onto
/// these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionStatus {
    #[default]
    Configuring,
    Armed,
    Done,
    Error,
}

impl AcquisitionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AcquisitionStatus::Done | AcquisitionStatus::Error)
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionStatus::Configuring => "configuring",
            AcquisitionStatus::Armed => "armed",
            AcquisitionStatus::Done => "done",
            AcquisitionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSlope {
    #[default]
    Rising,
    Falling,
}

/// Analog edge trigger on one of the scope inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub channel: ChannelIndex,
    /// Trigger level in volts
    pub level: f64,
    pub slope: TriggerSlope,
    /// Capture anyway if no edge arrives within this time; zero waits forever
    pub auto_timeout: Duration,
}

/// Everything applied to the instrument before one capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfiguration {
    pub channel: ChannelIndex,
    pub voltage_range: VoltageRange,
    pub voltage_offset: f64,
    pub acquisition_mode: AcquisitionMode,
    pub sample_rate: SampleRate,
    pub buffer_size: SampleCount,
    pub trigger: Option<TriggerConfig>,
}

/// Summary figures of a captured trace
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl TraceStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min = samples.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = samples.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self { min, max, mean })
    }

    pub fn peak_to_peak(&self) -> f64 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_is_sentinel() {
        assert!(!DeviceHandle::NONE.is_valid());
        assert!(!DeviceHandle::default().is_valid());
        assert!(DeviceHandle(1).is_valid());
        assert_eq!(DeviceHandle::NONE.to_string(), "hdwfNone");
    }

    #[test]
    fn test_channel_bounds() {
        assert!(ChannelIndex::new(0).is_ok());
        assert!(ChannelIndex::new(1).is_ok());
        assert!(matches!(
            ChannelIndex::new(2),
            Err(ScopeError::InvalidParameters(_))
        ));
        assert!(ChannelIndex::new(-1).is_err());
    }

    #[test]
    fn test_sample_count_rejects_zero() {
        assert!(matches!(
            SampleCount::new(0),
            Err(ScopeError::InvalidParameters(_))
        ));
        assert_eq!(SampleCount::new(1000).unwrap().get(), 1000);
    }

    #[test]
    fn test_sample_rate_rejects_non_positive() {
        assert!(SampleRate::hz(0.0).is_err());
        assert!(SampleRate::hz(-1e4).is_err());
        assert!(SampleRate::hz(f64::NAN).is_err());
        assert!(SampleRate::hz(f64::INFINITY).is_err());
        assert_eq!(SampleRate::hz(1e4).unwrap().period(), 1e-4);
    }

    #[test]
    fn test_capture_duration() {
        let rate = SampleRate::hz(1e4).unwrap();
        let count = SampleCount::new(1000).unwrap();
        assert_eq!(rate.duration_of(count), Duration::from_millis(100));
    }

    #[test]
    fn test_capture_duration_saturates() {
        let rate = SampleRate::hz(1e-300).unwrap();
        let count = SampleCount::new(1000).unwrap();
        assert_eq!(rate.duration_of(count), Duration::MAX);
    }

    #[test]
    fn test_voltage_range_limits() {
        assert!(VoltageRange::volts(5.0).is_ok());
        assert!(VoltageRange::volts(50.0).is_ok());
        assert!(VoltageRange::volts(0.0).is_err());
        assert!(VoltageRange::volts(51.0).is_err());
        assert_eq!(VoltageRange::volts(5.0).unwrap().half_span(), 2.5);
    }

    #[test]
    fn test_trace_stats() {
        let stats = TraceStats::from_samples(&[0.1, 0.2, 0.15, -0.05]).unwrap();
        assert_eq!(stats.min, -0.05);
        assert_eq!(stats.max, 0.2);
        assert!((stats.mean - 0.1).abs() < 1e-12);
        assert!((stats.peak_to_peak() - 0.25).abs() < 1e-12);
        assert!(TraceStats::from_samples(&[]).is_none());
    }
}
