//! The IMU component: property API, calibration coherence and the v0
//! sample parser. The v1 parser lives in the sibling module.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::calibration::SharedCalibration;
use crate::communicator::Communicator;
use crate::components::{FieldReader, SensorComponent};
use crate::error::{Error, ProtocolError, Result};
use crate::math::{quaternion_to_matrix, Matrix3x3, Vector3};
use crate::properties::imu_v0::{self, denominator, OutputFlagsV0};
use crate::properties::imu_v1::{self, OutputFlagsV1};
use crate::properties::{
    decode_f32x3, decode_f32x9, decode_u32, encode_f32x3, encode_f32x9, encode_u32, ImuCommand,
    ImuProperty, PropertyNotifier, PropertyValue,
};
use crate::protocol::{CommandV0, CommandV1, EventKind, ProtocolVersion};
use crate::types::{ComponentHandle, ComponentKind, EventData, ImuSample};

pub(crate) const RAD_TO_DEG: f32 = 180.0 / std::f32::consts::PI;

/// Sampling rate assumed until the application configures one.
const DEFAULT_SAMPLING_RATE: i32 = 100;

pub struct ImuComponent {
    handle: ComponentHandle,
    version: ProtocolVersion,
    comm: Arc<Communicator>,
    calibration: SharedCalibration,
    notifier: PropertyNotifier<ImuProperty>,
    pub(crate) output_v0: Mutex<OutputFlagsV0>,
    pub(crate) output_v1: Mutex<OutputFlagsV1>,
    pub(crate) sampling_rate: AtomicI32,
    streaming: AtomicBool,
    /// Single-gyroscope hardware variants carry their only gyroscope in
    /// the second wire slot.
    pub(crate) second_gyro_is_primary: bool,
}

impl ImuComponent {
    pub(crate) fn new(
        handle: ComponentHandle,
        version: ProtocolVersion,
        comm: Arc<Communicator>,
        second_gyro_is_primary: bool,
    ) -> Self {
        Self {
            handle,
            version,
            comm,
            calibration: SharedCalibration::new(),
            notifier: PropertyNotifier::new(),
            output_v0: Mutex::new(OutputFlagsV0::empty()),
            output_v1: Mutex::new(OutputFlagsV1::empty()),
            sampling_rate: AtomicI32::new(DEFAULT_SAMPLING_RATE),
            streaming: AtomicBool::new(false),
            second_gyro_is_primary,
        }
    }

    /// Registers a property-change callback. Callbacks run on the thread
    /// performing the write and must not reenter the property API.
    pub fn subscribe<F>(&self, property: ImuProperty, callback: F)
    where
        F: Fn(&PropertyValue) + Send + Sync + 'static,
    {
        self.notifier.subscribe(property, callback);
    }

    pub fn supported_sampling_rates(&self) -> &'static [i32] {
        &imu_v0::SUPPORTED_SAMPLING_RATES
    }

    pub fn get_bool(&self, property: ImuProperty) -> Result<bool> {
        if property == ImuProperty::StreamData {
            return Ok(self.streaming.load(Ordering::SeqCst));
        }
        match self.version {
            ProtocolVersion::V0 => OutputFlagsV0::for_property(property)
                .map(|flag| self.output_v0.lock().unwrap().contains(flag))
                .ok_or(Error::UnknownProperty),
            ProtocolVersion::V1 => OutputFlagsV1::for_property(property)
                .map(|flag| self.output_v1.lock().unwrap().contains(flag))
                .ok_or(Error::UnknownProperty),
        }
    }

    pub fn set_bool(&self, property: ImuProperty, value: bool) -> Result<()> {
        if property == ImuProperty::StreamData {
            return self.set_streaming(value);
        }
        match self.version {
            ProtocolVersion::V0 => {
                if property == ImuProperty::OutputLowPrecision {
                    return self.set_precision_flag(value);
                }
                let flag = OutputFlagsV0::for_property(property).ok_or(Error::UnknownProperty)?;
                self.set_output_flag_v0(flag, value)?;
            }
            ProtocolVersion::V1 => {
                let flag = OutputFlagsV1::for_property(property).ok_or(Error::UnknownProperty)?;
                self.set_output_flag_v1(flag, value)?;
            }
        }
        self.notifier.notify(property, &PropertyValue::Bool(value));
        Ok(())
    }

    pub fn get_int32(&self, property: ImuProperty) -> Result<i32> {
        if property == ImuProperty::SamplingRate {
            return Ok(self.sampling_rate.load(Ordering::SeqCst));
        }
        let payload = match self.version {
            ProtocolVersion::V0 => {
                let command = imu_v0::getter_command(property).ok_or(Error::UnknownProperty)?;
                self.request_result(command.code())?
            }
            ProtocolVersion::V1 => {
                let command = imu_v1::getter_command(property).ok_or(Error::UnknownProperty)?;
                self.request_result(command.code())?
            }
        };
        Ok(decode_u32(&payload)? as i32)
    }

    pub fn set_int32(&self, property: ImuProperty, value: i32) -> Result<i32> {
        // Values with a firmware-fixed value set round before the write.
        let wire_value = match property {
            ImuProperty::SamplingRate => imu_v0::round_sampling_rate(value),
            ImuProperty::AccRange => imu_v0::round_acc_range(value),
            ImuProperty::GyrRange => imu_v0::round_gyr_range(value),
            ImuProperty::MagRange => imu_v0::round_mag_range(value),
            _ => value as u32,
        };

        let code = match self.version {
            ProtocolVersion::V0 => imu_v0::setter_command(property)
                .ok_or(Error::UnknownProperty)?
                .code(),
            ProtocolVersion::V1 => imu_v1::setter_command(property)
                .ok_or(Error::UnknownProperty)?
                .code(),
        };
        self.request_ack(code, &encode_u32(wire_value))?;

        if property == ImuProperty::SamplingRate {
            self.sampling_rate.store(wire_value as i32, Ordering::SeqCst);
        }
        self.notifier
            .notify(property, &PropertyValue::Int32(wire_value as i32));
        Ok(wire_value as i32)
    }

    pub fn get_vector3(&self, property: ImuProperty) -> Result<[f32; 3]> {
        let command = self.v0_getter(property)?;
        let payload = self.request_result(command.code())?;
        decode_f32x3(&payload)
    }

    pub fn set_vector3(&self, property: ImuProperty, value: [f32; 3]) -> Result<()> {
        let command = self.v0_setter(property)?;
        self.request_ack(command.code(), &encode_f32x3(value))?;
        self.notifier.notify(property, &PropertyValue::Vector3(value));
        Ok(())
    }

    pub fn get_matrix33(&self, property: ImuProperty) -> Result<[f32; 9]> {
        let command = self.v0_getter(property)?;
        let payload = self.request_result(command.code())?;
        decode_f32x9(&payload)
    }

    pub fn set_matrix33(&self, property: ImuProperty, value: [f32; 9]) -> Result<()> {
        let command = self.v0_setter(property)?;
        self.request_ack(command.code(), &encode_f32x9(value))?;
        self.notifier
            .notify(property, &PropertyValue::Matrix3x3(value));
        Ok(())
    }

    pub fn execute(&self, command: ImuCommand) -> Result<()> {
        let code = match self.version {
            ProtocolVersion::V0 => imu_v0::command(command).code(),
            ProtocolVersion::V1 => imu_v1::command(command).code(),
        };
        self.request_ack(code, &[])
    }

    /// Calibration arrays are device-backed on v0 only; v1 firmware applies
    /// its calibration before the wire.
    fn v0_getter(&self, property: ImuProperty) -> Result<CommandV0> {
        if self.version != ProtocolVersion::V0 {
            return Err(Error::UnknownProperty);
        }
        imu_v0::getter_command(property).ok_or(Error::UnknownProperty)
    }

    fn v0_setter(&self, property: ImuProperty) -> Result<CommandV0> {
        if self.version != ProtocolVersion::V0 {
            return Err(Error::UnknownProperty);
        }
        imu_v0::setter_command(property).ok_or(Error::UnknownProperty)
    }

    pub(super) fn request_ack(&self, function: u16, payload: &[u8]) -> Result<()> {
        self.comm
            .send_and_wait_for_ack(self.handle.0, function, payload)
    }

    pub(super) fn request_result(&self, function: u16) -> Result<Vec<u8>> {
        self.comm.send_and_wait_for_result(self.handle.0, function)
    }

    fn set_streaming(&self, enabled: bool) -> Result<()> {
        let code = match (self.version, enabled) {
            (ProtocolVersion::V0, true) => CommandV0::GotoStreamMode.code(),
            (ProtocolVersion::V0, false) => CommandV0::GotoCommandMode.code(),
            (ProtocolVersion::V1, true) => CommandV1::GotoStreamMode.code(),
            (ProtocolVersion::V1, false) => CommandV1::GotoCommandMode.code(),
        };
        self.request_ack(code, &[])?;
        self.streaming.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn set_output_flag_v0(&self, flag: OutputFlagsV0, value: bool) -> Result<()> {
        // Copy out, write the full mask, then store; holding the lock
        // across the round-trip would stall the parser.
        let mut mask = *self.output_v0.lock().unwrap();
        mask.set(flag, value);
        self.request_ack(CommandV0::SetTransmitData.code(), &encode_u32(mask.bits()))?;
        *self.output_v0.lock().unwrap() = mask;
        Ok(())
    }

    /// The low-precision toggle goes over its own function code; only the
    /// local mask tracks it as bit 22.
    fn set_precision_flag(&self, value: bool) -> Result<()> {
        self.request_ack(
            CommandV0::SetDataMode.code(),
            &encode_u32(if value { 1 } else { 0 }),
        )?;
        let mut mask = self.output_v0.lock().unwrap();
        mask.set(OutputFlagsV0::LOW_PRECISION, value);
        Ok(())
    }

    fn set_output_flag_v1(&self, flag: OutputFlagsV1, value: bool) -> Result<()> {
        let mut mask = *self.output_v1.lock().unwrap();
        mask.set(flag, value);
        self.request_ack(
            CommandV1::SetImuTransmitData.code(),
            &encode_u32(mask.bits()),
        )?;
        *self.output_v1.lock().unwrap() = mask;
        Ok(())
    }

    fn init_v0(&self) -> Result<()> {
        self.set_bool(ImuProperty::StreamData, false)?;

        let matrices = [
            (ImuProperty::AccAlignment, set_acc_alignment as fn(&SharedCalibration, Matrix3x3)),
            (ImuProperty::GyrAlignment, set_gyr_alignment),
            (ImuProperty::MagSoftIronMatrix, set_soft_iron),
        ];
        for (property, store) in matrices {
            let coeffs = self.get_matrix33(property)?;
            store(&self.calibration, Matrix3x3::from_row_major(coeffs));

            let calibration = self.calibration.clone();
            self.subscribe(property, move |value| {
                if let PropertyValue::Matrix3x3(coeffs) = value {
                    store(&calibration, Matrix3x3::from_row_major(*coeffs));
                }
            });
        }

        let vectors = [
            (ImuProperty::AccBias, set_acc_bias as fn(&SharedCalibration, Vector3)),
            (ImuProperty::GyrBias, set_gyr_bias),
            (ImuProperty::MagHardIronOffset, set_hard_iron),
        ];
        for (property, store) in vectors {
            let values = self.get_vector3(property)?;
            store(&self.calibration, Vector3::from_array(values));

            let calibration = self.calibration.clone();
            self.subscribe(property, move |value| {
                if let PropertyValue::Vector3(values) = value {
                    store(&calibration, Vector3::from_array(*values));
                }
            });
        }

        let mask = decode_u32(&self.request_result(CommandV0::GetConfig.code())?)?;
        *self.output_v0.lock().unwrap() = OutputFlagsV0::from_bits_retain(mask);
        debug!(mask, "cached v0 output-enable configuration");

        self.set_bool(ImuProperty::StreamData, true)
    }

    pub(crate) fn calibration(&self) -> &SharedCalibration {
        &self.calibration
    }

    fn parse_sample_v0(&self, payload: &[u8]) -> Result<ImuSample> {
        let mut reader = FieldReader::new(payload);
        let mut sample = ImuSample {
            frame_count: reader.read_u32()?,
            ..ImuSample::default()
        };

        let rate = self.sampling_rate.load(Ordering::SeqCst);
        sample.timestamp = sample.frame_count as f64 * imu_v0::timestamp_period(rate);

        let flags = *self.output_v0.lock().unwrap();
        let low = flags.contains(OutputFlagsV0::LOW_PRECISION);
        let cal = self.calibration.snapshot();

        if flags.contains(OutputFlagsV0::RAW_GYR) {
            let raw = reader.read_vector3(low, denominator::GYR)?;
            sample.gyr_raw = raw.scale(RAD_TO_DEG);
            sample.gyr = cal.calibrate_gyr(sample.gyr_raw);
        }

        if flags.contains(OutputFlagsV0::RAW_ACC) {
            sample.acc_raw = reader.read_vector3(low, denominator::ACC)?;
            sample.acc = cal.calibrate_acc(sample.acc_raw);
        }

        if flags.contains(OutputFlagsV0::RAW_MAG) {
            sample.mag_raw = reader.read_vector3(low, denominator::MAG)?;
            sample.mag = cal.calibrate_mag(sample.mag_raw);
        }

        if flags.contains(OutputFlagsV0::ANGULAR_VEL) {
            sample.angular_velocity = reader
                .read_vector3(low, denominator::ANGULAR_VEL)?
                .scale(RAD_TO_DEG);
        }

        if flags.contains(OutputFlagsV0::QUAT) {
            sample.quat = reader.read_quat(low, denominator::QUAT)?;
            sample.rotation = quaternion_to_matrix(sample.quat);
        }

        if flags.contains(OutputFlagsV0::EULER) {
            sample.euler = reader
                .read_vector3(low, denominator::EULER)?
                .scale(RAD_TO_DEG);
        }

        if flags.contains(OutputFlagsV0::LINEAR_ACC) {
            sample.linear_acc = reader.read_vector3(low, denominator::LINEAR_ACC)?;
        }

        if flags.contains(OutputFlagsV0::PRESSURE) {
            sample.pressure = reader.read_float(low, denominator::PRESSURE)?;
        }

        if flags.contains(OutputFlagsV0::ALTITUDE) {
            sample.altitude = reader.read_float(low, denominator::ALTITUDE)?;
        }

        if flags.contains(OutputFlagsV0::TEMPERATURE) {
            sample.temperature = reader.read_float(low, denominator::TEMPERATURE)?;
        }

        if flags.contains(OutputFlagsV0::HEAVE_MOTION) {
            sample.heave = reader.read_float(low, denominator::HEAVE)?;
        }

        Ok(sample)
    }
}

fn set_acc_alignment(cal: &SharedCalibration, m: Matrix3x3) {
    cal.update(|c| c.acc_alignment = m);
}
fn set_gyr_alignment(cal: &SharedCalibration, m: Matrix3x3) {
    cal.update(|c| c.gyr_alignment = m);
}
fn set_soft_iron(cal: &SharedCalibration, m: Matrix3x3) {
    cal.update(|c| c.soft_iron_matrix = m);
}
fn set_acc_bias(cal: &SharedCalibration, v: Vector3) {
    cal.update(|c| c.acc_bias = v);
}
fn set_gyr_bias(cal: &SharedCalibration, v: Vector3) {
    cal.update(|c| c.gyr_bias = v);
}
fn set_hard_iron(cal: &SharedCalibration, v: Vector3) {
    cal.update(|c| c.hard_iron_offset = v);
}

impl SensorComponent for ImuComponent {
    fn handle(&self) -> ComponentHandle {
        self.handle
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Imu
    }

    fn init(&self) -> Result<()> {
        match self.version {
            ProtocolVersion::V0 => self.init_v0(),
            ProtocolVersion::V1 => self.init_v1(),
        }
    }

    fn process_event(&self, kind: EventKind, payload: &[u8]) -> Result<EventData> {
        match kind {
            EventKind::ImuSample => {
                let sample = match self.version {
                    ProtocolVersion::V0 => self.parse_sample_v0(payload)?,
                    ProtocolVersion::V1 => self.parse_sample_v1(payload)?,
                };
                Ok(EventData::Imu(sample))
            }
            EventKind::GnssSample => {
                Err(ProtocolError::UnsupportedFunction(CommandV1::GnssSample.code()).into())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/imu.rs"]
mod tests;
