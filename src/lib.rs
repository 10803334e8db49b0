pub mod config;
pub mod dwf;
pub mod error;
pub mod job;
pub mod plotting;
pub mod session;
pub mod types;

pub use config::{load_config, load_config_or_default, AppConfig};
pub use dwf::{build_driver, AnalogInDriver, DwfLibrary, SimulatedDriver};
pub use error::ScopeError;
pub use job::{CaptureJob, Job};
pub use plotting::{plot_waveform, time_axis, Renderer, TerminalRenderer};
pub use session::{AcquisitionSession, CaptureSettings, SessionState};
pub use types::{
    AcquisitionMode, AcquisitionStatus, ChannelConfiguration, ChannelIndex, DeviceHandle,
    SampleCount, SampleRate, TraceStats, TriggerConfig, TriggerSlope, VoltageRange,
};
