//! Public data model: sensor descriptors, sample records and events.
//!
//! These types are free of wire format concerns; the component parsers in
//! [`crate::components`] populate them from streamed frames.

use serde::{Deserialize, Serialize};

use crate::math::{Matrix3x3, Vector3};

/// Description of a discoverable sensor endpoint.
///
/// Produced by transport discovery, consumed by [`crate::sensor::Sensor::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDesc {
    /// Human readable device name.
    pub name: String,
    /// Device serial number as reported by the transport.
    pub serial_number: String,
    /// Registry key of the transport that produced this descriptor.
    pub io_type: String,
    /// Transport specific address (port path, host:port, ...).
    pub identifier: String,
    /// Baud rate to open the byte channel with.
    pub baud_rate: u32,
}

impl SensorDesc {
    /// Descriptor for an endpoint that was not discovered but is known to
    /// the caller, e.g. a network event publisher.
    pub fn for_endpoint(io_type: &str, identifier: &str) -> Self {
        Self {
            name: identifier.to_string(),
            serial_number: String::new(),
            io_type: io_type.to_string(),
            identifier: identifier.to_string(),
            baud_rate: 0,
        }
    }
}

/// Handle addressing a logical sub-device within one sensor.
///
/// Protocol v1 routes frames by this handle; v0 sensors expose a single
/// component with handle 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentHandle(pub u8);

/// Kind of a logical sub-device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Imu,
    Gnss,
}

/// One inertial sample as streamed by the firmware.
///
/// Gyroscope and angular velocity values are converted to degrees per
/// second at parse time; acceleration stays in device-native g.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Device frame counter, strictly increasing while streaming.
    pub frame_count: u32,
    /// Seconds, derived from the frame counter and the sampling period.
    pub timestamp: f64,
    /// Accelerometer before calibration, in g.
    pub acc_raw: Vector3,
    /// Accelerometer after alignment and bias, in g.
    pub acc: Vector3,
    /// Gyroscope before calibration, in deg/s.
    pub gyr_raw: Vector3,
    /// Gyroscope after alignment and bias, in deg/s.
    pub gyr: Vector3,
    /// Magnetometer before calibration, in uT.
    pub mag_raw: Vector3,
    /// Magnetometer after hard/soft iron correction, in uT.
    pub mag: Vector3,
    /// Orientation-offset-compensated angular velocity, in deg/s.
    pub angular_velocity: Vector3,
    /// Euler angles in degrees.
    pub euler: Vector3,
    /// Orientation quaternion `(w, x, y, z)`.
    pub quat: [f32; 4],
    /// Rotation matrix derived from [`ImuSample::quat`].
    pub rotation: Matrix3x3,
    /// Linear acceleration (gravity removed), in g.
    pub linear_acc: Vector3,
    /// Barometric pressure, in kPa.
    pub pressure: f32,
    /// Barometric altitude, in m.
    pub altitude: f32,
    /// Sensor temperature, in deg C.
    pub temperature: f32,
    /// Heave motion, in m.
    pub heave: f32,
}

impl Default for ImuSample {
    fn default() -> Self {
        Self {
            frame_count: 0,
            timestamp: 0.0,
            acc_raw: Vector3::ZERO,
            acc: Vector3::ZERO,
            gyr_raw: Vector3::ZERO,
            gyr: Vector3::ZERO,
            mag_raw: Vector3::ZERO,
            mag: Vector3::ZERO,
            angular_velocity: Vector3::ZERO,
            euler: Vector3::ZERO,
            quat: [1.0, 0.0, 0.0, 0.0],
            rotation: Matrix3x3::IDENTITY,
            linear_acc: Vector3::ZERO,
            pressure: 0.0,
            altitude: 0.0,
            temperature: 0.0,
            heave: 0.0,
        }
    }
}

/// GNSS fix quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GnssFixType {
    NoFix = 0,
    DeadReckoningOnly = 1,
    Fix2D = 2,
    Fix3D = 3,
    GnssAndDeadReckoning = 4,
    TimeOnly = 5,
}

impl GnssFixType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::DeadReckoningOnly,
            2 => Self::Fix2D,
            3 => Self::Fix3D,
            4 => Self::GnssAndDeadReckoning,
            5 => Self::TimeOnly,
            _ => Self::NoFix,
        }
    }
}

/// RTK carrier phase solution state, taken from bits 6-7 of the
/// navigation flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CarrierPhaseSolution {
    None = 0,
    FloatAmbiguities = 1,
    FixedAmbiguities = 2,
}

impl CarrierPhaseSolution {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::FloatAmbiguities,
            2 => Self::FixedAmbiguities,
            _ => Self::None,
        }
    }
}

/// One navigation sample as streamed by a GNSS component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnssSample {
    /// Device frame counter, strictly increasing while streaming.
    pub frame_count: u32,
    /// Seconds, derived from the frame counter at the fixed 500 Hz period.
    pub timestamp: f64,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// Height above ellipsoid in meters.
    pub height: f64,
    /// Horizontal accuracy estimate in meters.
    pub horizontal_accuracy: f64,
    /// Vertical accuracy estimate in meters.
    pub vertical_accuracy: f64,
    /// Ground speed in m/s.
    pub velocity: f64,
    /// Speed accuracy estimate in m/s.
    pub velocity_accuracy: f64,
    /// Heading of motion in degrees.
    pub heading_of_motion: f64,
    /// Heading of vehicle in degrees.
    pub heading_of_vehicle: f64,
    /// Heading accuracy estimate in degrees.
    pub heading_accuracy: f64,
    pub fix_type: GnssFixType,
    pub carrier_phase_solution: CarrierPhaseSolution,
    pub satellites_used: u8,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Nanosecond correction to the second field, may be negative.
    pub nanosecond_correction: i32,
}

impl Default for GnssSample {
    fn default() -> Self {
        Self {
            frame_count: 0,
            timestamp: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            height: 0.0,
            horizontal_accuracy: 0.0,
            vertical_accuracy: 0.0,
            velocity: 0.0,
            velocity_accuracy: 0.0,
            heading_of_motion: 0.0,
            heading_of_vehicle: 0.0,
            heading_accuracy: 0.0,
            fix_type: GnssFixType::NoFix,
            carrier_phase_solution: CarrierPhaseSolution::None,
            satellites_used: 0,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            nanosecond_correction: 0,
        }
    }
}

/// Parsed sample payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventData {
    Imu(ImuSample),
    Gnss(GnssSample),
}

/// Event delivered to the application consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Component the sample originated from.
    pub component: ComponentHandle,
    pub data: EventData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imu_sample_defaults_to_identity_orientation() {
        let sample = ImuSample::default();
        assert_eq!(sample.quat, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(sample.rotation, Matrix3x3::IDENTITY);
        assert_eq!(sample.acc, Vector3::ZERO);
    }

    #[test]
    fn fix_type_maps_unknown_values_to_no_fix() {
        assert_eq!(GnssFixType::from_u8(3), GnssFixType::Fix3D);
        assert_eq!(GnssFixType::from_u8(250), GnssFixType::NoFix);
    }

    #[test]
    fn carrier_phase_from_flag_bits() {
        let flags: u8 = 0b1000_0000;
        assert_eq!(
            CarrierPhaseSolution::from_u8(flags >> 6),
            CarrierPhaseSolution::FixedAmbiguities
        );
    }

    #[test]
    fn sensor_event_serializes_round_trip() {
        let event = SensorEvent {
            component: ComponentHandle(1),
            data: EventData::Imu(ImuSample::default()),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SensorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
