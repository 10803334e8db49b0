//! Numeric constants of the WaveForms SDK (`dwf.h`).

use crate::types::{AcquisitionMode, AcquisitionStatus, TriggerSlope};

/// `hdwfNone`
pub const HDWF_NONE: i32 = 0;

/// `enumfilterAll`
pub const ENUMFILTER_ALL: i32 = 0;

// DwfState
pub const DWF_STATE_READY: u8 = 0;
pub const DWF_STATE_ARMED: u8 = 1;
pub const DWF_STATE_DONE: u8 = 2;
pub const DWF_STATE_TRIGGERED: u8 = 3;
pub const DWF_STATE_CONFIG: u8 = 4;
pub const DWF_STATE_PREFILL: u8 = 5;
pub const DWF_STATE_NOT_DONE: u8 = 6;
pub const DWF_STATE_WAIT: u8 = 7;

// ACQMODE
pub const ACQMODE_SINGLE: i32 = 0;

// TRIGSRC
pub const TRIGSRC_NONE: u8 = 0;
pub const TRIGSRC_DETECTOR_ANALOG_IN: u8 = 2;

// TRIGTYPE
pub const TRIGTYPE_EDGE: i32 = 0;

// DwfTriggerSlope
pub const DWF_TRIGGER_SLOPE_RISE: i32 = 0;
pub const DWF_TRIGGER_SLOPE_FALL: i32 = 1;

/// Size of the buffer `FDwfGetLastErrorMsg` writes into
pub const ERROR_MSG_LEN: usize = 512;

/// Size of the buffer `FDwfGetVersion` writes into
pub const VERSION_LEN: usize = 32;

/// Collapse a raw `DwfState` onto the poll loop's status set
pub fn status_from_dwf_state(state: u8) -> AcquisitionStatus {
    match state {
        DWF_STATE_READY | DWF_STATE_CONFIG | DWF_STATE_PREFILL => AcquisitionStatus::Configuring,
        DWF_STATE_ARMED | DWF_STATE_TRIGGERED | DWF_STATE_NOT_DONE | DWF_STATE_WAIT => {
            AcquisitionStatus::Armed
        }
        DWF_STATE_DONE => AcquisitionStatus::Done,
        _ => AcquisitionStatus::Error,
    }
}

pub fn acqmode(mode: AcquisitionMode) -> i32 {
    match mode {
        AcquisitionMode::Single => ACQMODE_SINGLE,
    }
}

pub fn trigger_slope(slope: TriggerSlope) -> i32 {
    match slope {
        TriggerSlope::Rising => DWF_TRIGGER_SLOPE_RISE,
        TriggerSlope::Falling => DWF_TRIGGER_SLOPE_FALL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_collapse() {
        assert_eq!(status_from_dwf_state(DWF_STATE_READY), AcquisitionStatus::Configuring);
        assert_eq!(status_from_dwf_state(DWF_STATE_PREFILL), AcquisitionStatus::Configuring);
        assert_eq!(status_from_dwf_state(DWF_STATE_ARMED), AcquisitionStatus::Armed);
        assert_eq!(status_from_dwf_state(DWF_STATE_TRIGGERED), AcquisitionStatus::Armed);
        assert_eq!(status_from_dwf_state(DWF_STATE_DONE), AcquisitionStatus::Done);
        assert_eq!(status_from_dwf_state(42), AcquisitionStatus::Error);
    }
}
