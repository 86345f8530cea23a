//! v0 firmware specifics: the transmit-data bitmask, compressed-field
//! denominators, and the rounding tables for rate and range settings.
//!
//! The bit positions are the firmware's and are not documented anywhere
//! else; treat them as fixed.

use bitflags::bitflags;

use crate::properties::{ImuCommand, ImuProperty};
use crate::protocol::CommandV0;

bitflags! {
    /// The 32-bit output-enable configuration mask of v0 firmware.
    ///
    /// The streamed sample frame is a direct, ordered projection of the set
    /// bits; see the v0 sample parser for the field order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct OutputFlagsV0: u32 {
        const PRESSURE = 1 << 9;
        const RAW_MAG = 1 << 10;
        const RAW_ACC = 1 << 11;
        const RAW_GYR = 1 << 12;
        const TEMPERATURE = 1 << 13;
        const HEAVE_MOTION = 1 << 14;
        const ANGULAR_VEL = 1 << 16;
        const EULER = 1 << 17;
        const QUAT = 1 << 18;
        const ALTITUDE = 1 << 19;
        const LINEAR_ACC = 1 << 21;
        const LOW_PRECISION = 1 << 22;
    }
}

impl OutputFlagsV0 {
    /// Maps an `Output*` property key to its mask bit.
    pub fn for_property(property: ImuProperty) -> Option<OutputFlagsV0> {
        match property {
            ImuProperty::OutputPressure => Some(Self::PRESSURE),
            ImuProperty::OutputRawMag => Some(Self::RAW_MAG),
            ImuProperty::OutputRawAcc => Some(Self::RAW_ACC),
            ImuProperty::OutputRawGyr => Some(Self::RAW_GYR),
            ImuProperty::OutputTemperature => Some(Self::TEMPERATURE),
            ImuProperty::OutputHeaveMotion => Some(Self::HEAVE_MOTION),
            ImuProperty::OutputAngularVel => Some(Self::ANGULAR_VEL),
            ImuProperty::OutputEuler => Some(Self::EULER),
            ImuProperty::OutputQuat => Some(Self::QUAT),
            ImuProperty::OutputAltitude => Some(Self::ALTITUDE),
            ImuProperty::OutputLinearAcc => Some(Self::LINEAR_ACC),
            ImuProperty::OutputLowPrecision => Some(Self::LOW_PRECISION),
            _ => None,
        }
    }
}

/// Device function for reading a device-backed property, if v0 firmware
/// supports the read.
pub fn getter_command(property: ImuProperty) -> Option<CommandV0> {
    match property {
        ImuProperty::FilterMode => Some(CommandV0::GetFilterMode),
        ImuProperty::AccRange => Some(CommandV0::GetAccRange),
        ImuProperty::GyrRange => Some(CommandV0::GetGyrRange),
        ImuProperty::MagRange => Some(CommandV0::GetMagRange),
        ImuProperty::AccAlignment => Some(CommandV0::GetAccAlignment),
        ImuProperty::AccBias => Some(CommandV0::GetAccBias),
        ImuProperty::GyrAlignment => Some(CommandV0::GetGyrAlignment),
        ImuProperty::GyrBias => Some(CommandV0::GetGyrBias),
        ImuProperty::MagHardIronOffset => Some(CommandV0::GetMagHardIronOffset),
        ImuProperty::MagSoftIronMatrix => Some(CommandV0::GetMagSoftIronMatrix),
        _ => None,
    }
}

/// Device function for writing a device-backed property, if v0 firmware
/// supports the write.
pub fn setter_command(property: ImuProperty) -> Option<CommandV0> {
    match property {
        ImuProperty::SamplingRate => Some(CommandV0::SetSamplingRate),
        ImuProperty::FilterMode => Some(CommandV0::SetFilterMode),
        ImuProperty::AccRange => Some(CommandV0::SetAccRange),
        ImuProperty::GyrRange => Some(CommandV0::SetGyrRange),
        ImuProperty::MagRange => Some(CommandV0::SetMagRange),
        ImuProperty::AccAlignment => Some(CommandV0::SetAccAlignment),
        ImuProperty::AccBias => Some(CommandV0::SetAccBias),
        ImuProperty::GyrAlignment => Some(CommandV0::SetGyrAlignment),
        ImuProperty::GyrBias => Some(CommandV0::SetGyrBias),
        ImuProperty::MagHardIronOffset => Some(CommandV0::SetMagHardIronOffset),
        ImuProperty::MagSoftIronMatrix => Some(CommandV0::SetMagSoftIronMatrix),
        _ => None,
    }
}

/// Device function executing an IMU command.
pub fn command(command: ImuCommand) -> CommandV0 {
    match command {
        ImuCommand::CalibrateGyro => CommandV0::StartGyroCalibration,
        ImuCommand::ResetOrientationOffset => CommandV0::ResetOrientationOffset,
        ImuCommand::StartSync => CommandV0::StartSync,
        ImuCommand::StopSync => CommandV0::StopSync,
    }
}

/// Divisors for int16-compressed fields in low-precision mode.
pub mod denominator {
    pub const GYR: f32 = 1000.0;
    pub const ACC: f32 = 1000.0;
    pub const MAG: f32 = 100.0;
    pub const ANGULAR_VEL: f32 = 1000.0;
    pub const QUAT: f32 = 10000.0;
    pub const EULER: f32 = 10000.0;
    pub const LINEAR_ACC: f32 = 1000.0;
    pub const PRESSURE: f32 = 100.0;
    pub const ALTITUDE: f32 = 10.0;
    pub const TEMPERATURE: f32 = 100.0;
    pub const HEAVE: f32 = 1000.0;
}

pub const SUPPORTED_SAMPLING_RATES: [i32; 8] = [5, 10, 25, 50, 100, 200, 400, 800];

/// Rounds a requested sampling rate down into the firmware-supported set.
pub fn round_sampling_rate(value: i32) -> u32 {
    if value <= 5 {
        5
    } else if value <= 10 {
        10
    } else if value <= 25 {
        25
    } else if value <= 50 {
        50
    } else if value <= 100 {
        100
    } else if value <= 200 {
        200
    } else if value <= 400 {
        400
    } else {
        800
    }
}

/// Seconds per frame counter tick for a given sampling rate. Firmware
/// running above 400 Hz ticks at 800 Hz internally.
pub fn timestamp_period(sampling_rate: i32) -> f64 {
    if sampling_rate > 400 {
        0.00125
    } else {
        0.0025
    }
}

pub const SUPPORTED_ACC_RANGES: [i32; 4] = [2, 4, 8, 16];
pub const SUPPORTED_GYR_RANGES: [i32; 5] = [125, 245, 500, 1000, 2000];
pub const SUPPORTED_MAG_RANGES: [i32; 4] = [4, 8, 12, 16];

pub fn round_acc_range(value: i32) -> u32 {
    if value <= 2 {
        2
    } else if value <= 4 {
        4
    } else if value <= 8 {
        8
    } else {
        16
    }
}

pub fn round_gyr_range(value: i32) -> u32 {
    if value <= 125 {
        125
    } else if value <= 245 {
        245
    } else if value <= 500 {
        500
    } else if value <= 1000 {
        1000
    } else {
        2000
    }
}

pub fn round_mag_range(value: i32) -> u32 {
    if value <= 4 {
        4
    } else if value <= 8 {
        8
    } else if value <= 12 {
        12
    } else {
        16
    }
}
