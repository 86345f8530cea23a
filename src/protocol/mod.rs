//! Wire protocol definitions shared by the framing channel and the
//! components: protocol versions, function codes and event classification.

pub mod frame;
pub mod parser;

pub use frame::Frame;
pub use parser::FrameParser;

/// Sync byte opening every frame in both protocol versions.
pub const SYNC: u8 = 0x3A;

/// Device address used on point-to-point links.
pub const DEFAULT_ADDRESS: u8 = 0x01;

/// Function code of a positive acknowledge, identical in both versions.
pub const FN_ACK: u16 = 0;
/// Function code of a negative acknowledge, identical in both versions.
pub const FN_NACK: u16 = 1;

/// The two incompatible wire protocols. Fixed per session at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V0,
    V1,
}

/// Function codes of the legacy v0 protocol (one byte on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandV0 {
    Ack = 0,
    Nack = 1,
    GetFirmwareInfo = 2,
    GetConfig = 4,
    GotoCommandMode = 6,
    GotoStreamMode = 7,
    /// Streamed sample event while in stream mode.
    GetSensorData = 9,
    SetTransmitData = 10,
    SetSamplingRate = 11,
    SetDataMode = 12,
    StartGyroCalibration = 22,
    ResetOrientationOffset = 23,
    StartSync = 24,
    StopSync = 25,
    SetAccBias = 30,
    GetAccBias = 31,
    SetAccAlignment = 32,
    GetAccAlignment = 33,
    SetGyrBias = 34,
    GetGyrBias = 35,
    SetGyrAlignment = 36,
    GetGyrAlignment = 37,
    SetMagHardIronOffset = 38,
    GetMagHardIronOffset = 39,
    SetMagSoftIronMatrix = 40,
    GetMagSoftIronMatrix = 41,
    SetFilterMode = 42,
    GetFilterMode = 43,
    SetAccRange = 44,
    GetAccRange = 45,
    SetGyrRange = 46,
    GetGyrRange = 47,
    SetMagRange = 48,
    GetMagRange = 49,
}

impl CommandV0 {
    pub fn code(self) -> u16 {
        self as u8 as u16
    }
}

/// Function codes of the v1 protocol (two bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandV1 {
    Ack = 0,
    Nack = 1,
    GetFirmwareInfo = 2,
    GotoCommandMode = 6,
    GotoStreamMode = 7,
    /// Streamed IMU sample event.
    ImuSample = 9,
    SetImuTransmitData = 10,
    GetImuTransmitData = 11,
    StartGyroCalibration = 22,
    ResetOrientationOffset = 23,
    StartSync = 24,
    StopSync = 25,
    SetFilterMode = 42,
    GetFilterMode = 43,
    /// Streamed GNSS sample event.
    GnssSample = 70,
    SaveGpsState = 71,
    SetRtkCorrection = 72,
    SetGnssTransmitData = 73,
    GetGnssTransmitData = 74,
}

impl CommandV1 {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Kind of an unsolicited sample event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ImuSample,
    GnssSample,
}

/// Classifies a function code as a streamed event, per protocol version.
///
/// Event frames bypass the request slot and go to the component handlers.
pub fn event_kind(version: ProtocolVersion, function: u16) -> Option<EventKind> {
    match version {
        ProtocolVersion::V0 => {
            (function == CommandV0::GetSensorData.code()).then_some(EventKind::ImuSample)
        }
        ProtocolVersion::V1 => {
            if function == CommandV1::ImuSample.code() {
                Some(EventKind::ImuSample)
            } else if function == CommandV1::GnssSample.code() {
                Some(EventKind::GnssSample)
            } else {
                None
            }
        }
    }
}
