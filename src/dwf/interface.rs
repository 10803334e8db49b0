use crate::error::ScopeError;
use crate::types::{
    AcquisitionMode, AcquisitionStatus, ChannelIndex, DeviceHandle, SampleCount, SampleRate,
    TriggerConfig, VoltageRange,
};

/// Analog-input primitives of a WaveForms-style instrument
///
/// This trait is the seam between the acquisition session and whatever
/// actually talks to the hardware: the runtime-loaded WaveForms library, the
/// built-in simulator, or a mock in tests. Implementations translate each
/// call into the vendor's own encoding; the session only relies on the
/// semantics described here.
///
/// # Design Philosophy
/// - One method per driver primitive, no hidden sequencing
/// - Every call takes the handle returned by [`open_device`](Self::open_device)
/// - Status is already collapsed onto [`AcquisitionStatus`]
/// - Enable testing through mock implementations
pub trait AnalogInDriver: Send {
    // === Device Lifecycle ===

    /// Claim the instrument at `device_index`
    ///
    /// # Returns
    /// A valid handle, or [`ScopeError::DeviceUnavailable`] when nothing is
    /// attached or the device is held by someone else
    fn open_device(&mut self, device_index: i32) -> Result<DeviceHandle, ScopeError>;

    /// Release the instrument. The handle is invalid afterwards.
    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), ScopeError>;

    // === Channel Configuration ===

    fn enable_channel(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        enable: bool,
    ) -> Result<(), ScopeError>;

    /// Set the peak-to-peak input range of a channel
    fn set_range(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        range: VoltageRange,
    ) -> Result<(), ScopeError>;

    /// Set the vertical offset of a channel in volts
    fn set_offset(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        volts: f64,
    ) -> Result<(), ScopeError>;

    fn set_acquisition_mode(
        &mut self,
        handle: DeviceHandle,
        mode: AcquisitionMode,
    ) -> Result<(), ScopeError>;

    fn set_sample_rate(&mut self, handle: DeviceHandle, rate: SampleRate)
        -> Result<(), ScopeError>;

    fn set_buffer_size(&mut self, handle: DeviceHandle, size: SampleCount)
        -> Result<(), ScopeError>;

    /// Configure the trigger; `None` captures immediately after arming
    fn set_trigger(
        &mut self,
        handle: DeviceHandle,
        trigger: Option<&TriggerConfig>,
    ) -> Result<(), ScopeError>;

    // === Acquisition ===

    /// Apply the configuration and start the capture without waiting for it
    fn arm(&mut self, handle: DeviceHandle) -> Result<(), ScopeError>;

    /// Query capture progress once
    ///
    /// An `Err` here means the driver could not be reached at all (for
    /// example the cable was pulled), which is different from the device
    /// reporting [`AcquisitionStatus::Error`].
    fn poll_status(&mut self, handle: DeviceHandle) -> Result<AcquisitionStatus, ScopeError>;

    /// Copy the captured samples of `channel` into `buffer`, earliest first.
    /// Only meaningful after [`poll_status`](Self::poll_status) reported `Done`.
    fn read_samples(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        buffer: &mut [f64],
    ) -> Result<(), ScopeError>;

    /// Abort a running capture
    fn stop(&mut self, handle: DeviceHandle) -> Result<(), ScopeError>;
}

impl<D: AnalogInDriver + ?Sized> AnalogInDriver for Box<D> {
    fn open_device(&mut self, device_index: i32) -> Result<DeviceHandle, ScopeError> {
        (**self).open_device(device_index)
    }

    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        (**self).close_device(handle)
    }

    fn enable_channel(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        enable: bool,
    ) -> Result<(), ScopeError> {
        (**self).enable_channel(handle, channel, enable)
    }

    fn set_range(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        range: VoltageRange,
    ) -> Result<(), ScopeError> {
        (**self).set_range(handle, channel, range)
    }

    fn set_offset(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        volts: f64,
    ) -> Result<(), ScopeError> {
        (**self).set_offset(handle, channel, volts)
    }

    fn set_acquisition_mode(
        &mut self,
        handle: DeviceHandle,
        mode: AcquisitionMode,
    ) -> Result<(), ScopeError> {
        (**self).set_acquisition_mode(handle, mode)
    }

    fn set_sample_rate(
        &mut self,
        handle: DeviceHandle,
        rate: SampleRate,
    ) -> Result<(), ScopeError> {
        (**self).set_sample_rate(handle, rate)
    }

    fn set_buffer_size(
        &mut self,
        handle: DeviceHandle,
        size: SampleCount,
    ) -> Result<(), ScopeError> {
        (**self).set_buffer_size(handle, size)
    }

    fn set_trigger(
        &mut self,
        handle: DeviceHandle,
        trigger: Option<&TriggerConfig>,
    ) -> Result<(), ScopeError> {
        (**self).set_trigger(handle, trigger)
    }

    fn arm(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        (**self).arm(handle)
    }

    fn poll_status(&mut self, handle: DeviceHandle) -> Result<AcquisitionStatus, ScopeError> {
        (**self).poll_status(handle)
    }

    fn read_samples(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        buffer: &mut [f64],
    ) -> Result<(), ScopeError> {
        (**self).read_samples(handle, channel, buffer)
    }

    fn stop(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        (**self).stop(handle)
    }
}
