//! v1 side of the IMU component: init and the always-float32 sample
//! parser with dual-gyroscope routing.
//!
//! v1 firmware applies calibration in the device and streams raw and
//! calibrated channels side by side. Channels the sample record does not
//! surface are still consumed so the decoder stays positioned.

use crate::components::imu::ImuComponent;
use crate::components::FieldReader;
use crate::error::Result;
use crate::math::{quaternion_to_matrix, Vector3};
use crate::properties::imu_v1::{OutputFlagsV1, TIMESTAMP_PERIOD};
use crate::properties::{decode_u32, ImuProperty};
use crate::protocol::CommandV1;
use crate::types::ImuSample;

fn read_vec3(reader: &mut FieldReader<'_>) -> Result<Vector3> {
    Ok(Vector3::new(
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
    ))
}

impl ImuComponent {
    pub(super) fn init_v1(&self) -> Result<()> {
        let mask = decode_u32(&self.request_result(CommandV1::GetImuTransmitData.code())?)?;
        *self.output_v1.lock().unwrap() = OutputFlagsV1::from_bits_retain(mask);
        self.set_bool(ImuProperty::StreamData, true)
    }

    pub(super) fn parse_sample_v1(&self, payload: &[u8]) -> Result<ImuSample> {
        let mut reader = FieldReader::new(payload);
        let mut sample = ImuSample {
            frame_count: reader.read_u32()?,
            ..ImuSample::default()
        };
        sample.timestamp = sample.frame_count as f64 * TIMESTAMP_PERIOD;

        let flags = *self.output_v1.lock().unwrap();

        if flags.contains(OutputFlagsV1::RAW_ACC) {
            sample.acc_raw = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::ACC_CALIBRATED) {
            sample.acc = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::RAW_GYR0) {
            sample.gyr_raw = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::RAW_GYR1) {
            let value = read_vec3(&mut reader)?;
            if self.second_gyro_is_primary {
                sample.gyr_raw = value;
            }
        }

        // bias-calibrated channels are consumed but not surfaced
        if flags.contains(OutputFlagsV1::GYR0_BIAS_CALIB) {
            read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::GYR1_BIAS_CALIB) {
            read_vec3(&mut reader)?;
        }

        // the alignment-calibrated channel carries the full correction
        if flags.contains(OutputFlagsV1::GYR0_ALIGN_CALIB) {
            sample.gyr = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::GYR1_ALIGN_CALIB) {
            let value = read_vec3(&mut reader)?;
            if self.second_gyro_is_primary {
                sample.gyr = value;
            }
        }

        if flags.contains(OutputFlagsV1::RAW_MAG) {
            sample.mag_raw = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::MAG_CALIBRATED) {
            sample.mag = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::ANGULAR_VEL) {
            sample.angular_velocity = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::QUAT) {
            sample.quat = reader.read_quat(false, 1.0)?;
            sample.rotation = quaternion_to_matrix(sample.quat);
        }

        if flags.contains(OutputFlagsV1::EULER) {
            sample.euler = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::LINEAR_ACC) {
            sample.linear_acc = read_vec3(&mut reader)?;
        }

        if flags.contains(OutputFlagsV1::PRESSURE) {
            sample.pressure = reader.read_f32()?;
        }

        if flags.contains(OutputFlagsV1::ALTITUDE) {
            sample.altitude = reader.read_f32()?;
        }

        if flags.contains(OutputFlagsV1::TEMPERATURE) {
            sample.temperature = reader.read_f32()?;
        }

        Ok(sample)
    }
}
