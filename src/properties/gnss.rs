//! GNSS output-enable mask and the ordered field table.
//!
//! The streamed navigation frame is a packed projection of the enabled
//! fields in exactly the order of [`FIELD_ORDER`]. The parser must consume
//! every enabled field, surfaced or not, or the decoder position drifts
//! silently.

use bitflags::bitflags;

bitflags! {
    /// Output-enable mask for the GNSS component, one bit per wire field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct GnssOutputFlags: u64 {
        const NAV_PVT_ITOW = 1 << 0;
        const NAV_PVT_YEAR = 1 << 1;
        const NAV_PVT_MONTH = 1 << 2;
        const NAV_PVT_DAY = 1 << 3;
        const NAV_PVT_HOUR = 1 << 4;
        const NAV_PVT_MINUTE = 1 << 5;
        const NAV_PVT_SECOND = 1 << 6;
        const NAV_PVT_VALID = 1 << 7;
        const NAV_PVT_T_ACC = 1 << 8;
        const NAV_PVT_NANO = 1 << 9;
        const NAV_PVT_FIX_TYPE = 1 << 10;
        const NAV_PVT_FLAGS = 1 << 11;
        const NAV_PVT_FLAGS2 = 1 << 12;
        const NAV_PVT_NUM_SV = 1 << 13;
        const NAV_PVT_LONGITUDE = 1 << 14;
        const NAV_PVT_LATITUDE = 1 << 15;
        const NAV_PVT_HEIGHT = 1 << 16;
        const NAV_PVT_H_MSL = 1 << 17;
        const NAV_PVT_H_ACC = 1 << 18;
        const NAV_PVT_V_ACC = 1 << 19;
        const NAV_PVT_VEL_N = 1 << 20;
        const NAV_PVT_VEL_E = 1 << 21;
        const NAV_PVT_VEL_D = 1 << 22;
        const NAV_PVT_GROUND_SPEED = 1 << 23;
        const NAV_PVT_HEAD_MOTION = 1 << 24;
        const NAV_PVT_S_ACC = 1 << 25;
        const NAV_PVT_HEAD_ACC = 1 << 26;
        const NAV_PVT_P_DOP = 1 << 27;
        const NAV_PVT_HEAD_VEHICLE = 1 << 28;
        const NAV_ATT_ITOW = 1 << 29;
        const NAV_ATT_VERSION = 1 << 30;
        const NAV_ATT_ROLL = 1 << 31;
        const NAV_ATT_PITCH = 1 << 32;
        const NAV_ATT_HEADING = 1 << 33;
        const NAV_ATT_ACC_ROLL = 1 << 34;
        const NAV_ATT_ACC_PITCH = 1 << 35;
        const NAV_ATT_ACC_HEADING = 1 << 36;
        const ESF_STATUS_ITOW = 1 << 37;
        const ESF_STATUS_VERSION = 1 << 38;
        const ESF_STATUS_INIT_STATUS1 = 1 << 39;
        const ESF_STATUS_INIT_STATUS2 = 1 << 40;
        const ESF_STATUS_FUSION_MODE = 1 << 41;
        const ESF_STATUS_NUM_SENS = 1 << 42;
    }
}

/// Scalar encoding of one wire field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnssFieldKind {
    U8,
    U16,
    U32,
    I32,
}

impl GnssFieldKind {
    pub fn wire_size(self) -> usize {
        match self {
            GnssFieldKind::U8 => 1,
            GnssFieldKind::U16 => 2,
            GnssFieldKind::U32 | GnssFieldKind::I32 => 4,
        }
    }
}

/// Identity of a wire field, used by the parser to route decoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnssField {
    Itow,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Valid,
    TimeAccuracy,
    Nano,
    FixType,
    Flags,
    Flags2,
    NumSv,
    Longitude,
    Latitude,
    Height,
    HeightMsl,
    HorizontalAccuracy,
    VerticalAccuracy,
    VelocityNorth,
    VelocityEast,
    VelocityDown,
    GroundSpeed,
    HeadingOfMotion,
    SpeedAccuracy,
    HeadingAccuracy,
    PositionDop,
    HeadingOfVehicle,
    AttItow,
    AttVersion,
    AttRoll,
    AttPitch,
    AttHeading,
    AttAccRoll,
    AttAccPitch,
    AttAccHeading,
    EsfItow,
    EsfVersion,
    EsfInitStatus1,
    EsfInitStatus2,
    EsfFusionMode,
    EsfNumSens,
}

/// Wire order of every GNSS field with its enable bit and encoding.
pub const FIELD_ORDER: [(GnssOutputFlags, GnssField, GnssFieldKind); 43] = [
    (GnssOutputFlags::NAV_PVT_ITOW, GnssField::Itow, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_PVT_YEAR, GnssField::Year, GnssFieldKind::U16),
    (GnssOutputFlags::NAV_PVT_MONTH, GnssField::Month, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_DAY, GnssField::Day, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_HOUR, GnssField::Hour, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_MINUTE, GnssField::Minute, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_SECOND, GnssField::Second, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_VALID, GnssField::Valid, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_T_ACC, GnssField::TimeAccuracy, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_PVT_NANO, GnssField::Nano, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_FIX_TYPE, GnssField::FixType, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_FLAGS, GnssField::Flags, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_FLAGS2, GnssField::Flags2, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_NUM_SV, GnssField::NumSv, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_PVT_LONGITUDE, GnssField::Longitude, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_LATITUDE, GnssField::Latitude, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_HEIGHT, GnssField::Height, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_H_MSL, GnssField::HeightMsl, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_H_ACC, GnssField::HorizontalAccuracy, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_PVT_V_ACC, GnssField::VerticalAccuracy, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_PVT_VEL_N, GnssField::VelocityNorth, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_VEL_E, GnssField::VelocityEast, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_VEL_D, GnssField::VelocityDown, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_GROUND_SPEED, GnssField::GroundSpeed, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_HEAD_MOTION, GnssField::HeadingOfMotion, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_PVT_S_ACC, GnssField::SpeedAccuracy, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_PVT_HEAD_ACC, GnssField::HeadingAccuracy, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_PVT_P_DOP, GnssField::PositionDop, GnssFieldKind::U16),
    (GnssOutputFlags::NAV_PVT_HEAD_VEHICLE, GnssField::HeadingOfVehicle, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_ATT_ITOW, GnssField::AttItow, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_ATT_VERSION, GnssField::AttVersion, GnssFieldKind::U8),
    (GnssOutputFlags::NAV_ATT_ROLL, GnssField::AttRoll, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_ATT_PITCH, GnssField::AttPitch, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_ATT_HEADING, GnssField::AttHeading, GnssFieldKind::I32),
    (GnssOutputFlags::NAV_ATT_ACC_ROLL, GnssField::AttAccRoll, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_ATT_ACC_PITCH, GnssField::AttAccPitch, GnssFieldKind::U32),
    (GnssOutputFlags::NAV_ATT_ACC_HEADING, GnssField::AttAccHeading, GnssFieldKind::U32),
    (GnssOutputFlags::ESF_STATUS_ITOW, GnssField::EsfItow, GnssFieldKind::U32),
    (GnssOutputFlags::ESF_STATUS_VERSION, GnssField::EsfVersion, GnssFieldKind::U8),
    (GnssOutputFlags::ESF_STATUS_INIT_STATUS1, GnssField::EsfInitStatus1, GnssFieldKind::U8),
    (GnssOutputFlags::ESF_STATUS_INIT_STATUS2, GnssField::EsfInitStatus2, GnssFieldKind::U8),
    (GnssOutputFlags::ESF_STATUS_FUSION_MODE, GnssField::EsfFusionMode, GnssFieldKind::U8),
    (GnssOutputFlags::ESF_STATUS_NUM_SENS, GnssField::EsfNumSens, GnssFieldKind::U8),
];
