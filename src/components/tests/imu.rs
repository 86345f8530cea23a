use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::calibration::SharedCalibration;
use crate::communicator::Communicator;
use crate::components::imu::{ImuComponent, RAD_TO_DEG};
use crate::components::SensorComponent;
use crate::error::{Error, ProtocolError};
use crate::math::{Matrix3x3, Vector3};
use crate::properties::imu_v0::OutputFlagsV0;
use crate::properties::imu_v1::OutputFlagsV1;
use crate::protocol::{EventKind, ProtocolVersion};
use crate::types::{ComponentHandle, EventData, ImuSample};

fn component_v0() -> ImuComponent {
    ImuComponent::new(
        ComponentHandle(0),
        ProtocolVersion::V0,
        Arc::new(Communicator::new()),
        false,
    )
}

fn component_v1(second_gyro_is_primary: bool) -> ImuComponent {
    ImuComponent::new(
        ComponentHandle(1),
        ProtocolVersion::V1,
        Arc::new(Communicator::new()),
        second_gyro_is_primary,
    )
}

fn set_flags_v0(component: &ImuComponent, flags: OutputFlagsV0) {
    *component.output_v0.lock().unwrap() = flags;
}

fn set_flags_v1(component: &ImuComponent, flags: OutputFlagsV1) {
    *component.output_v1.lock().unwrap() = flags;
}

fn payload(frame_count: u32) -> Vec<u8> {
    frame_count.to_le_bytes().to_vec()
}

fn push_i16(buf: &mut Vec<u8>, values: &[i16]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn push_f32(buf: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn parse(component: &ImuComponent, payload: &[u8]) -> crate::error::Result<ImuSample> {
    component
        .process_event(EventKind::ImuSample, payload)
        .map(|data| match data {
            EventData::Imu(sample) => sample,
            EventData::Gnss(_) => panic!("expected imu data"),
        })
}

fn assert_vec_near(v: Vector3, expected: (f32, f32, f32), eps: f32) {
    assert!((v.x - expected.0).abs() <= eps, "{v:?} !~ {expected:?}");
    assert!((v.y - expected.1).abs() <= eps, "{v:?} !~ {expected:?}");
    assert!((v.z - expected.2).abs() <= eps, "{v:?} !~ {expected:?}");
}

#[test]
fn low_precision_gyro_acc_frame_decodes() {
    let component = component_v0();
    set_flags_v0(
        &component,
        OutputFlagsV0::RAW_ACC | OutputFlagsV0::RAW_GYR | OutputFlagsV0::LOW_PRECISION,
    );

    let mut bytes = payload(1);
    push_i16(&mut bytes, &[1000, 0, 0]); // gyroscope, 1 rad/s on x
    push_i16(&mut bytes, &[0, 0, 1000]); // accelerometer, 1 g on z

    let sample = parse(&component, &bytes).unwrap();

    assert_eq!(sample.frame_count, 1);
    assert!((sample.timestamp - 0.0025).abs() < 1e-12);
    assert_vec_near(sample.gyr_raw, (57.295_78, 0.0, 0.0), 1e-3);
    assert_vec_near(sample.acc_raw, (0.0, 0.0, 1.0), 1e-6);

    // identity alignment, zero bias: calibrated equals raw
    assert_eq!(sample.gyr, sample.gyr_raw);
    assert_eq!(sample.acc, sample.acc_raw);
}

#[test]
fn full_precision_fields_appear_in_wire_order() {
    let component = component_v0();
    set_flags_v0(&component, OutputFlagsV0::RAW_GYR | OutputFlagsV0::QUAT);

    let mut bytes = payload(4);
    push_f32(&mut bytes, &[0.5, -0.25, 0.125]); // rad/s
    push_f32(&mut bytes, &[0.5, -0.5, -0.5, 0.5]);

    let sample = parse(&component, &bytes).unwrap();
    assert_vec_near(
        sample.gyr_raw,
        (0.5 * RAD_TO_DEG, -0.25 * RAD_TO_DEG, 0.125 * RAD_TO_DEG),
        1e-3,
    );
    assert_eq!(sample.quat, [0.5, -0.5, -0.5, 0.5]);

    // derived rotation is a proper rotation
    let m = sample.rotation;
    let mtm = m.transpose().mul(&m);
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((mtm.m[i][j] - expected).abs() < 1e-5);
        }
    }
    assert!((m.determinant() - 1.0).abs() < 1e-5);
}

#[test]
fn single_enable_consumes_exactly_that_field() {
    let component = component_v0();
    set_flags_v0(&component, OutputFlagsV0::QUAT);

    // exactly frame counter + 4 floats
    let mut bytes = payload(1);
    push_f32(&mut bytes, &[1.0, 0.0, 0.0, 0.0]);
    assert!(parse(&component, &bytes).is_ok());

    // one byte short: corrupt
    let short = &bytes[..bytes.len() - 1];
    assert!(matches!(
        parse(&component, short),
        Err(Error::Protocol(ProtocolError::MessageCorrupt(_)))
    ));
}

#[test]
fn no_enables_consume_only_the_frame_counter() {
    let component = component_v0();
    set_flags_v0(&component, OutputFlagsV0::empty());

    let sample = parse(&component, &payload(77)).unwrap();
    assert_eq!(sample.frame_count, 77);
    assert_eq!(sample.acc, Vector3::ZERO);
    assert_eq!(sample.quat, [1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn compressed_scalars_use_their_denominators() {
    let cases: [(OutputFlagsV0, i16, fn(&ImuSample) -> f32, f32); 4] = [
        (OutputFlagsV0::PRESSURE, 12345, |s| s.pressure, 123.45),
        (OutputFlagsV0::ALTITUDE, -1234, |s| s.altitude, -123.4),
        (OutputFlagsV0::TEMPERATURE, 2150, |s| s.temperature, 21.5),
        (OutputFlagsV0::HEAVE_MOTION, 1500, |s| s.heave, 1.5),
    ];

    for (flag, raw, extract, expected) in cases {
        let component = component_v0();
        set_flags_v0(&component, flag | OutputFlagsV0::LOW_PRECISION);

        let mut bytes = payload(1);
        push_i16(&mut bytes, &[raw]);

        let sample = parse(&component, &bytes).unwrap();
        let value = extract(&sample);
        assert!(
            (value - expected).abs() < 1e-4,
            "{flag:?}: {value} != {expected}"
        );
    }
}

#[test]
fn compressed_magnetometer_divides_by_one_hundred() {
    let component = component_v0();
    set_flags_v0(&component, OutputFlagsV0::RAW_MAG | OutputFlagsV0::LOW_PRECISION);

    let mut bytes = payload(1);
    push_i16(&mut bytes, &[2500, -100, 0]);

    let sample = parse(&component, &bytes).unwrap();
    assert_vec_near(sample.mag_raw, (25.0, -1.0, 0.0), 1e-5);
}

#[test]
fn timestamp_period_tracks_sampling_rate() {
    let component = component_v0();
    set_flags_v0(&component, OutputFlagsV0::empty());

    component.sampling_rate.store(400, Ordering::SeqCst);
    let sample = parse(&component, &payload(100)).unwrap();
    assert!((sample.timestamp - 100.0 * 0.0025).abs() < 1e-12);

    component.sampling_rate.store(800, Ordering::SeqCst);
    let sample = parse(&component, &payload(100)).unwrap();
    assert!((sample.timestamp - 100.0 * 0.00125).abs() < 1e-12);
}

#[test]
fn calibration_is_applied_per_channel() {
    let component = component_v0();
    set_flags_v0(
        &component,
        OutputFlagsV0::RAW_ACC | OutputFlagsV0::RAW_GYR | OutputFlagsV0::RAW_MAG,
    );

    let cal: &SharedCalibration = component.calibration();
    cal.update(|c| {
        // acc: swap x/y and add a bias
        c.acc_alignment =
            Matrix3x3::from_row_major([0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        c.acc_bias = Vector3::new(0.1, 0.0, 0.0);
        // gyr: scale by 2
        c.gyr_alignment =
            Matrix3x3::from_row_major([2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0]);
        c.gyr_bias = Vector3::new(0.0, 1.0, 0.0);
        // mag: hard iron then half scale
        c.hard_iron_offset = Vector3::new(1.0, 1.0, 1.0);
        c.soft_iron_matrix =
            Matrix3x3::from_row_major([0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.5]);
    });

    let mut bytes = payload(1);
    push_f32(&mut bytes, &[0.0, 0.0, 0.0]); // gyr (rad/s)
    push_f32(&mut bytes, &[1.0, 2.0, 3.0]); // acc (g)
    push_f32(&mut bytes, &[3.0, 1.0, -1.0]); // mag (uT)

    let sample = parse(&component, &bytes).unwrap();
    assert_vec_near(sample.acc, (2.1, 1.0, 3.0), 1e-5);
    assert_vec_near(sample.gyr, (0.0, 1.0, 0.0), 1e-5);
    assert_vec_near(sample.mag, (1.0, 0.0, -1.0), 1e-5);
}

#[test]
fn truncated_enabled_vector_is_corrupt() {
    let component = component_v0();
    set_flags_v0(&component, OutputFlagsV0::RAW_ACC);

    let mut bytes = payload(1);
    push_f32(&mut bytes, &[1.0, 2.0]); // missing the third float

    assert!(matches!(
        parse(&component, &bytes),
        Err(Error::Protocol(ProtocolError::MessageCorrupt(_)))
    ));
}

#[test]
fn v1_routes_second_gyro_when_primary() {
    let flags = OutputFlagsV1::RAW_GYR0
        | OutputFlagsV1::RAW_GYR1
        | OutputFlagsV1::GYR0_ALIGN_CALIB
        | OutputFlagsV1::GYR1_ALIGN_CALIB;

    let mut bytes = payload(1);
    push_f32(&mut bytes, &[1.0, 2.0, 3.0]); // gyr0 raw
    push_f32(&mut bytes, &[4.0, 5.0, 6.0]); // gyr1 raw
    push_f32(&mut bytes, &[7.0, 8.0, 9.0]); // gyr0 aligned
    push_f32(&mut bytes, &[10.0, 11.0, 12.0]); // gyr1 aligned

    let first = component_v1(false);
    set_flags_v1(&first, flags);
    let sample = parse(&first, &bytes).unwrap();
    assert_vec_near(sample.gyr_raw, (1.0, 2.0, 3.0), 1e-6);
    assert_vec_near(sample.gyr, (7.0, 8.0, 9.0), 1e-6);

    let second = component_v1(true);
    set_flags_v1(&second, flags);
    let sample = parse(&second, &bytes).unwrap();
    assert_vec_near(sample.gyr_raw, (4.0, 5.0, 6.0), 1e-6);
    assert_vec_near(sample.gyr, (10.0, 11.0, 12.0), 1e-6);
}

#[test]
fn v1_consumes_unsurfaced_channels_for_positioning() {
    let component = component_v1(false);
    set_flags_v1(
        &component,
        OutputFlagsV1::GYR0_BIAS_CALIB | OutputFlagsV1::PRESSURE,
    );

    let mut bytes = payload(1);
    push_f32(&mut bytes, &[9.0, 9.0, 9.0]); // bias-calibrated gyr, discarded
    push_f32(&mut bytes, &[101.3]);

    let sample = parse(&component, &bytes).unwrap();
    assert!((sample.pressure - 101.3).abs() < 1e-4);
}

#[test]
fn v1_timestamp_uses_fixed_period() {
    let component = component_v1(false);
    set_flags_v1(&component, OutputFlagsV1::empty());

    let sample = parse(&component, &payload(50)).unwrap();
    assert!((sample.timestamp - 0.1).abs() < 1e-12);
}

#[test]
fn unknown_properties_are_rejected() {
    use crate::properties::ImuProperty;

    let v0 = component_v0();
    assert!(matches!(
        v0.get_bool(ImuProperty::FilterMode),
        Err(Error::UnknownProperty)
    ));

    let v1 = component_v1(false);
    assert!(matches!(
        v1.get_vector3(ImuProperty::AccBias),
        Err(Error::UnknownProperty)
    ));
    assert!(matches!(
        v1.get_bool(ImuProperty::OutputLowPrecision),
        Err(Error::UnknownProperty)
    ));
}
