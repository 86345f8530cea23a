//! v1 firmware specifics: the IMU transmit-data mask.
//!
//! v1 sensors stream full-precision float32 fields only; calibration is
//! applied in the device and both raw and calibrated channels can be
//! enabled independently. The bit order below is the wire field order of
//! the v1 sample frame.

use bitflags::bitflags;

use crate::properties::{ImuCommand, ImuProperty};
use crate::protocol::CommandV1;

bitflags! {
    /// The 32-bit IMU transmit-data mask of v1 firmware, in wire field
    /// order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct OutputFlagsV1: u32 {
        const RAW_ACC = 1 << 0;
        const ACC_CALIBRATED = 1 << 1;
        const RAW_GYR0 = 1 << 2;
        const RAW_GYR1 = 1 << 3;
        const GYR0_BIAS_CALIB = 1 << 4;
        const GYR1_BIAS_CALIB = 1 << 5;
        const GYR0_ALIGN_CALIB = 1 << 6;
        const GYR1_ALIGN_CALIB = 1 << 7;
        const RAW_MAG = 1 << 8;
        const MAG_CALIBRATED = 1 << 9;
        const ANGULAR_VEL = 1 << 10;
        const QUAT = 1 << 11;
        const EULER = 1 << 12;
        const LINEAR_ACC = 1 << 13;
        const PRESSURE = 1 << 14;
        const ALTITUDE = 1 << 15;
        const TEMPERATURE = 1 << 16;
    }
}

impl OutputFlagsV1 {
    /// Maps an `Output*` property key to its mask bit.
    pub fn for_property(property: ImuProperty) -> Option<OutputFlagsV1> {
        match property {
            ImuProperty::OutputRawAcc => Some(Self::RAW_ACC),
            ImuProperty::OutputAccCalibrated => Some(Self::ACC_CALIBRATED),
            ImuProperty::OutputRawGyr0 => Some(Self::RAW_GYR0),
            ImuProperty::OutputRawGyr1 => Some(Self::RAW_GYR1),
            ImuProperty::OutputGyr0BiasCalib => Some(Self::GYR0_BIAS_CALIB),
            ImuProperty::OutputGyr1BiasCalib => Some(Self::GYR1_BIAS_CALIB),
            ImuProperty::OutputGyr0AlignCalib => Some(Self::GYR0_ALIGN_CALIB),
            ImuProperty::OutputGyr1AlignCalib => Some(Self::GYR1_ALIGN_CALIB),
            ImuProperty::OutputRawMag => Some(Self::RAW_MAG),
            ImuProperty::OutputMagCalibrated => Some(Self::MAG_CALIBRATED),
            ImuProperty::OutputAngularVel => Some(Self::ANGULAR_VEL),
            ImuProperty::OutputQuat => Some(Self::QUAT),
            ImuProperty::OutputEuler => Some(Self::EULER),
            ImuProperty::OutputLinearAcc => Some(Self::LINEAR_ACC),
            ImuProperty::OutputPressure => Some(Self::PRESSURE),
            ImuProperty::OutputAltitude => Some(Self::ALTITUDE),
            ImuProperty::OutputTemperature => Some(Self::TEMPERATURE),
            _ => None,
        }
    }
}

/// Seconds per frame counter tick; v1 firmware ticks at a fixed 500 Hz.
pub const TIMESTAMP_PERIOD: f64 = 0.002;

/// Device function for reading a device-backed property on v1 firmware.
pub fn getter_command(property: ImuProperty) -> Option<CommandV1> {
    match property {
        ImuProperty::FilterMode => Some(CommandV1::GetFilterMode),
        _ => None,
    }
}

/// Device function for writing a device-backed property on v1 firmware.
pub fn setter_command(property: ImuProperty) -> Option<CommandV1> {
    match property {
        ImuProperty::FilterMode => Some(CommandV1::SetFilterMode),
        _ => None,
    }
}

/// Device function executing an IMU command on v1 firmware.
pub fn command(command: ImuCommand) -> CommandV1 {
    match command {
        ImuCommand::CalibrateGyro => CommandV1::StartGyroCalibration,
        ImuCommand::ResetOrientationOffset => CommandV1::ResetOrientationOffset,
        ImuCommand::StartSync => CommandV1::StartSync,
        ImuCommand::StopSync => CommandV1::StopSync,
    }
}
