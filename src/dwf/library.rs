use std::ffi::{c_char, c_double, c_int, CStr};
use std::path::Path;

use libloading::Library;
use log::{debug, trace};

use super::constants::{
    acqmode, status_from_dwf_state, trigger_slope, ENUMFILTER_ALL, ERROR_MSG_LEN, HDWF_NONE,
    TRIGSRC_DETECTOR_ANALOG_IN, TRIGSRC_NONE, TRIGTYPE_EDGE, VERSION_LEN,
};
use super::interface::AnalogInDriver;
use crate::error::ScopeError;
use crate::types::{
    AcquisitionMode, AcquisitionStatus, ChannelIndex, DeviceHandle, SampleCount, SampleRate,
    TriggerConfig, VoltageRange,
};

#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY: &str = "dwf.dll";
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY: &str = "/Library/Frameworks/dwf.framework/dwf";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_LIBRARY: &str = "libdwf.so";

type FnString = unsafe extern "C" fn(*mut c_char) -> c_int;
type FnEnum = unsafe extern "C" fn(c_int, *mut c_int) -> c_int;
type FnDeviceOpen = unsafe extern "C" fn(c_int, *mut c_int) -> c_int;
type FnHandle = unsafe extern "C" fn(c_int) -> c_int;
type FnHandleInt = unsafe extern "C" fn(c_int, c_int) -> c_int;
type FnHandleDouble = unsafe extern "C" fn(c_int, c_double) -> c_int;
type FnHandleByte = unsafe extern "C" fn(c_int, u8) -> c_int;
type FnChannelInt = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
type FnChannelDouble = unsafe extern "C" fn(c_int, c_int, c_double) -> c_int;
type FnStatus = unsafe extern "C" fn(c_int, c_int, *mut u8) -> c_int;
type FnStatusData = unsafe extern "C" fn(c_int, c_int, *mut c_double, c_int) -> c_int;

/// Entry points resolved from the WaveForms runtime
struct DwfApi {
    get_version: FnString,
    get_last_error_msg: FnString,
    enumerate: FnEnum,
    device_open: FnDeviceOpen,
    device_close: FnHandle,
    analog_in_reset: FnHandle,
    analog_in_configure: FnChannelInt,
    analog_in_status: FnStatus,
    analog_in_status_data: FnStatusData,
    analog_in_frequency_set: FnHandleDouble,
    analog_in_buffer_size_set: FnHandleInt,
    analog_in_acquisition_mode_set: FnHandleInt,
    analog_in_channel_enable_set: FnChannelInt,
    analog_in_channel_range_set: FnChannelDouble,
    analog_in_channel_offset_set: FnChannelDouble,
    analog_in_trigger_source_set: FnHandleByte,
    analog_in_trigger_auto_timeout_set: FnHandleDouble,
    analog_in_trigger_channel_set: FnHandleInt,
    analog_in_trigger_type_set: FnHandleInt,
    analog_in_trigger_level_set: FnHandleDouble,
    analog_in_trigger_condition_set: FnHandleInt,
}

macro_rules! resolve {
    ($library:expr, $ty:ty, $name:literal) => {
        // SAFETY: the symbol type matches the prototype in dwf.h and the
        // pointer is only used while `DwfLibrary` keeps the library loaded.
        *unsafe { $library.get::<$ty>(concat!($name, "\0").as_bytes())? }
    };
}

/// Analog Discovery driver backed by the vendor's runtime library.
///
/// The library is loaded when the driver is created; loading fails cleanly
/// on machines without WaveForms installed.
pub struct DwfLibrary {
    api: DwfApi,
    _library: Library,
}

impl DwfLibrary {
    /// Load the runtime from the platform's default location
    pub fn load() -> Result<Self, ScopeError> {
        Self::load_from(DEFAULT_LIBRARY)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ScopeError> {
        let path = path.as_ref();
        debug!("Loading WaveForms runtime from {}", path.display());
        // SAFETY: loading runs the library's initialisers; libdwf has no
        // preconditions on them.
        let library = unsafe { Library::new(path)? };
        let api = DwfApi {
            get_version: resolve!(library, FnString, "FDwfGetVersion"),
            get_last_error_msg: resolve!(library, FnString, "FDwfGetLastErrorMsg"),
            enumerate: resolve!(library, FnEnum, "FDwfEnum"),
            device_open: resolve!(library, FnDeviceOpen, "FDwfDeviceOpen"),
            device_close: resolve!(library, FnHandle, "FDwfDeviceClose"),
            analog_in_reset: resolve!(library, FnHandle, "FDwfAnalogInReset"),
            analog_in_configure: resolve!(library, FnChannelInt, "FDwfAnalogInConfigure"),
            analog_in_status: resolve!(library, FnStatus, "FDwfAnalogInStatus"),
            analog_in_status_data: resolve!(library, FnStatusData, "FDwfAnalogInStatusData"),
            analog_in_frequency_set: resolve!(library, FnHandleDouble, "FDwfAnalogInFrequencySet"),
            analog_in_buffer_size_set: resolve!(library, FnHandleInt, "FDwfAnalogInBufferSizeSet"),
            analog_in_acquisition_mode_set: resolve!(library, FnHandleInt, "FDwfAnalogInAcquisitionModeSet"),
            analog_in_channel_enable_set: resolve!(library, FnChannelInt, "FDwfAnalogInChannelEnableSet"),
            analog_in_channel_range_set: resolve!(library, FnChannelDouble, "FDwfAnalogInChannelRangeSet"),
            analog_in_channel_offset_set: resolve!(library, FnChannelDouble, "FDwfAnalogInChannelOffsetSet"),
            analog_in_trigger_source_set: resolve!(library, FnHandleByte, "FDwfAnalogInTriggerSourceSet"),
            analog_in_trigger_auto_timeout_set: resolve!(
                library, FnHandleDouble, "FDwfAnalogInTriggerAutoTimeoutSet"
            ),
            analog_in_trigger_channel_set: resolve!(library, FnHandleInt, "FDwfAnalogInTriggerChannelSet"),
            analog_in_trigger_type_set: resolve!(library, FnHandleInt, "FDwfAnalogInTriggerTypeSet"),
            analog_in_trigger_level_set: resolve!(library, FnHandleDouble, "FDwfAnalogInTriggerLevelSet"),
            analog_in_trigger_condition_set: resolve!(library, FnHandleInt, "FDwfAnalogInTriggerConditionSet"),
        };
        Ok(Self {
            api,
            _library: library,
        })
    }

    /// Version string of the installed runtime, e.g. "3.22.2"
    pub fn version(&self) -> Result<String, ScopeError> {
        let mut buffer = [0 as c_char; VERSION_LEN];
        // SAFETY: FDwfGetVersion writes at most 32 bytes including the NUL.
        let ok = unsafe { (self.api.get_version)(buffer.as_mut_ptr()) };
        self.check("FDwfGetVersion", ok)?;
        Ok(c_buffer_to_string(&buffer))
    }

    /// Number of devices the runtime can see
    pub fn device_count(&self) -> Result<i32, ScopeError> {
        let mut count: c_int = 0;
        // SAFETY: out-pointer to a live local.
        let ok = unsafe { (self.api.enumerate)(ENUMFILTER_ALL, &mut count) };
        self.check("FDwfEnum", ok)?;
        Ok(count)
    }

    fn last_error(&self) -> String {
        let mut buffer = [0 as c_char; ERROR_MSG_LEN];
        // SAFETY: FDwfGetLastErrorMsg writes at most 512 bytes including the NUL.
        let ok = unsafe { (self.api.get_last_error_msg)(buffer.as_mut_ptr()) };
        if ok == 0 {
            return "unknown error".to_string();
        }
        let message = c_buffer_to_string(&buffer);
        if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message.trim().to_string()
        }
    }

    fn check(&self, operation: &'static str, ok: c_int) -> Result<(), ScopeError> {
        trace!("{} -> {}", operation, ok);
        if ok == 0 {
            Err(ScopeError::driver(operation, self.last_error()))
        } else {
            Ok(())
        }
    }
}

fn c_buffer_to_string(buffer: &[c_char]) -> String {
    // SAFETY: the buffers are zero-initialised, so there is always a NUL
    // inside the slice even if the runtime wrote nothing.
    unsafe { CStr::from_ptr(buffer.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

impl AnalogInDriver for DwfLibrary {
    fn open_device(&mut self, device_index: i32) -> Result<DeviceHandle, ScopeError> {
        let count = self
            .device_count()
            .map_err(|e| ScopeError::DeviceUnavailable(e.to_string()))?;
        if count == 0 {
            return Err(ScopeError::DeviceUnavailable(
                "no Analog Discovery device attached".to_string(),
            ));
        }
        if device_index >= count {
            return Err(ScopeError::DeviceUnavailable(format!(
                "device index {} out of range, {} device(s) attached",
                device_index, count
            )));
        }

        let mut hdwf: c_int = HDWF_NONE;
        // SAFETY: out-pointer to a live local.
        unsafe { (self.api.device_open)(device_index, &mut hdwf) };
        let handle = DeviceHandle(hdwf);
        if !handle.is_valid() {
            return Err(ScopeError::DeviceUnavailable(self.last_error()));
        }
        debug!("Opened device {} as {}", device_index, handle);

        // start from a clean analog-in state, nothing is assumed to persist
        // SAFETY: valid handle.
        let ok = unsafe { (self.api.analog_in_reset)(handle.0) };
        if let Err(e) = self.check("FDwfAnalogInReset", ok) {
            // SAFETY: valid handle, closed exactly once.
            unsafe { (self.api.device_close)(handle.0) };
            return Err(e);
        }
        Ok(handle)
    }

    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        // SAFETY: the session closes each handle it opened exactly once.
        let ok = unsafe { (self.api.device_close)(handle.0) };
        self.check("FDwfDeviceClose", ok)
    }

    fn enable_channel(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        enable: bool,
    ) -> Result<(), ScopeError> {
        // SAFETY: plain value arguments.
        let ok = unsafe {
            (self.api.analog_in_channel_enable_set)(handle.0, channel.0, enable as c_int)
        };
        self.check("FDwfAnalogInChannelEnableSet", ok)
    }

    fn set_range(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        range: VoltageRange,
    ) -> Result<(), ScopeError> {
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_channel_range_set)(handle.0, channel.0, range.0) };
        self.check("FDwfAnalogInChannelRangeSet", ok)
    }

    fn set_offset(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        volts: f64,
    ) -> Result<(), ScopeError> {
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_channel_offset_set)(handle.0, channel.0, volts) };
        self.check("FDwfAnalogInChannelOffsetSet", ok)
    }

    fn set_acquisition_mode(
        &mut self,
        handle: DeviceHandle,
        mode: AcquisitionMode,
    ) -> Result<(), ScopeError> {
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_acquisition_mode_set)(handle.0, acqmode(mode)) };
        self.check("FDwfAnalogInAcquisitionModeSet", ok)
    }

    fn set_sample_rate(
        &mut self,
        handle: DeviceHandle,
        rate: SampleRate,
    ) -> Result<(), ScopeError> {
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_frequency_set)(handle.0, rate.get()) };
        self.check("FDwfAnalogInFrequencySet", ok)
    }

    fn set_buffer_size(
        &mut self,
        handle: DeviceHandle,
        size: SampleCount,
    ) -> Result<(), ScopeError> {
        // SampleCount is bounded by i32::MAX
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_buffer_size_set)(handle.0, size.get() as c_int) };
        self.check("FDwfAnalogInBufferSizeSet", ok)
    }

    fn set_trigger(
        &mut self,
        handle: DeviceHandle,
        trigger: Option<&TriggerConfig>,
    ) -> Result<(), ScopeError> {
        let Some(trigger) = trigger else {
            // SAFETY: plain value arguments.
            let ok = unsafe { (self.api.analog_in_trigger_source_set)(handle.0, TRIGSRC_NONE) };
            return self.check("FDwfAnalogInTriggerSourceSet", ok);
        };

        // SAFETY (all calls below): plain value arguments.
        let ok = unsafe {
            (self.api.analog_in_trigger_source_set)(handle.0, TRIGSRC_DETECTOR_ANALOG_IN)
        };
        self.check("FDwfAnalogInTriggerSourceSet", ok)?;
        let ok = unsafe {
            (self.api.analog_in_trigger_auto_timeout_set)(
                handle.0,
                trigger.auto_timeout.as_secs_f64(),
            )
        };
        self.check("FDwfAnalogInTriggerAutoTimeoutSet", ok)?;
        let ok = unsafe { (self.api.analog_in_trigger_channel_set)(handle.0, trigger.channel.0) };
        self.check("FDwfAnalogInTriggerChannelSet", ok)?;
        let ok = unsafe { (self.api.analog_in_trigger_type_set)(handle.0, TRIGTYPE_EDGE) };
        self.check("FDwfAnalogInTriggerTypeSet", ok)?;
        let ok = unsafe { (self.api.analog_in_trigger_level_set)(handle.0, trigger.level) };
        self.check("FDwfAnalogInTriggerLevelSet", ok)?;
        let ok = unsafe {
            (self.api.analog_in_trigger_condition_set)(handle.0, trigger_slope(trigger.slope))
        };
        self.check("FDwfAnalogInTriggerConditionSet", ok)
    }

    fn arm(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        // fReconfigure = 1 pushes the settings, fStart = 1 arms
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_configure)(handle.0, 1, 1) };
        self.check("FDwfAnalogInConfigure", ok)
    }

    fn poll_status(&mut self, handle: DeviceHandle) -> Result<AcquisitionStatus, ScopeError> {
        let mut state: u8 = 0;
        // fReadData = 1 so StatusData can fetch the buffer once done
        // SAFETY: out-pointer to a live local.
        let ok = unsafe { (self.api.analog_in_status)(handle.0, 1, &mut state) };
        self.check("FDwfAnalogInStatus", ok)?;
        Ok(status_from_dwf_state(state))
    }

    fn read_samples(
        &mut self,
        handle: DeviceHandle,
        channel: ChannelIndex,
        buffer: &mut [f64],
    ) -> Result<(), ScopeError> {
        let len = c_int::try_from(buffer.len()).map_err(|_| {
            ScopeError::driver("FDwfAnalogInStatusData", "buffer larger than i32::MAX")
        })?;
        // SAFETY: the runtime writes at most `len` doubles into `buffer`.
        let ok = unsafe {
            (self.api.analog_in_status_data)(handle.0, channel.0, buffer.as_mut_ptr(), len)
        };
        self.check("FDwfAnalogInStatusData", ok)
    }

    fn stop(&mut self, handle: DeviceHandle) -> Result<(), ScopeError> {
        // SAFETY: plain value arguments.
        let ok = unsafe { (self.api.analog_in_configure)(handle.0, 0, 0) };
        self.check("FDwfAnalogInConfigure", ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_runtime_is_a_library_error() {
        let result = DwfLibrary::load_from("/nonexistent/path/libdwf-missing.so");
        assert!(matches!(result, Err(ScopeError::Library(_))));
    }

    #[test]
    fn test_c_buffer_to_string_stops_at_nul() {
        let mut buffer = [0 as c_char; VERSION_LEN];
        for (slot, byte) in buffer.iter_mut().zip(b"3.22.2") {
            *slot = *byte as c_char;
        }
        assert_eq!(c_buffer_to_string(&buffer), "3.22.2");
    }
}
