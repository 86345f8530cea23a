use std::sync::Arc;

use crate::communicator::Communicator;
use crate::components::gnss::GnssComponent;
use crate::components::SensorComponent;
use crate::error::{Error, ProtocolError};
use crate::properties::gnss::GnssOutputFlags;
use crate::protocol::EventKind;
use crate::types::{CarrierPhaseSolution, ComponentHandle, EventData, GnssFixType, GnssSample};

fn component() -> GnssComponent {
    GnssComponent::new(ComponentHandle(2), Arc::new(Communicator::new()))
}

fn set_flags(component: &GnssComponent, flags: GnssOutputFlags) {
    *component.output.lock().unwrap() = flags;
}

fn parse(component: &GnssComponent, payload: &[u8]) -> crate::error::Result<GnssSample> {
    component
        .process_event(EventKind::GnssSample, payload)
        .map(|data| match data {
            EventData::Gnss(sample) => sample,
            EventData::Imu(_) => panic!("expected gnss data"),
        })
}

fn payload(frame_count: u32) -> Vec<u8> {
    frame_count.to_le_bytes().to_vec()
}

#[test]
fn latitude_decodes_at_centimeter_resolution() {
    let component = component();
    set_flags(&component, GnssOutputFlags::NAV_PVT_LATITUDE);

    let mut bytes = payload(1);
    bytes.extend_from_slice(&356635894i32.to_le_bytes());
    let sample = parse(&component, &bytes).unwrap();
    assert!((sample.latitude - 35.6635894).abs() < 1e-12);

    let mut bytes = payload(2);
    bytes.extend_from_slice(&356635895i32.to_le_bytes());
    let moved = parse(&component, &bytes).unwrap();

    assert!(moved.latitude > sample.latitude);
    assert!((moved.latitude - sample.latitude - 1e-7).abs() < 1e-9);
}

#[test]
fn enabled_fields_parse_in_wire_order() {
    let component = component();
    set_flags(
        &component,
        GnssOutputFlags::NAV_PVT_FIX_TYPE
            | GnssOutputFlags::NAV_PVT_FLAGS
            | GnssOutputFlags::NAV_PVT_NUM_SV
            | GnssOutputFlags::NAV_PVT_LONGITUDE
            | GnssOutputFlags::NAV_PVT_LATITUDE
            | GnssOutputFlags::NAV_PVT_HEIGHT,
    );

    let mut bytes = payload(5);
    bytes.push(3); // fix type: 3D
    bytes.push(0b1000_0000); // carrier phase: fixed ambiguities
    bytes.push(12); // satellites
    bytes.extend_from_slice(&1397242735i32.to_le_bytes());
    bytes.extend_from_slice(&356635894i32.to_le_bytes());
    bytes.extend_from_slice(&123456i32.to_le_bytes());

    let sample = parse(&component, &bytes).unwrap();
    assert_eq!(sample.frame_count, 5);
    assert!((sample.timestamp - 0.01).abs() < 1e-12);
    assert_eq!(sample.fix_type, GnssFixType::Fix3D);
    assert_eq!(
        sample.carrier_phase_solution,
        CarrierPhaseSolution::FixedAmbiguities
    );
    assert_eq!(sample.satellites_used, 12);
    assert!((sample.longitude - 139.7242735).abs() < 1e-12);
    assert!((sample.latitude - 35.6635894).abs() < 1e-12);
    assert!((sample.height - 123.456).abs() < 1e-12);
}

#[test]
fn carrier_phase_comes_from_flag_bits_six_and_seven() {
    for (flags_byte, expected) in [
        (0x00u8, CarrierPhaseSolution::None),
        (0x40, CarrierPhaseSolution::FloatAmbiguities),
        (0x80, CarrierPhaseSolution::FixedAmbiguities),
        // low bits must not leak into the solution
        (0x3F, CarrierPhaseSolution::None),
    ] {
        let component = component();
        set_flags(&component, GnssOutputFlags::NAV_PVT_FLAGS);

        let mut bytes = payload(1);
        bytes.push(flags_byte);
        let sample = parse(&component, &bytes).unwrap();
        assert_eq!(sample.carrier_phase_solution, expected, "flags {flags_byte:#x}");
    }
}

#[test]
fn unsurfaced_fields_are_consumed_for_positioning() {
    let component = component();
    // iTOW and valid are not surfaced but precede latitude on the wire;
    // hMSL follows it.
    set_flags(
        &component,
        GnssOutputFlags::NAV_PVT_ITOW
            | GnssOutputFlags::NAV_PVT_VALID
            | GnssOutputFlags::NAV_PVT_LATITUDE
            | GnssOutputFlags::NAV_PVT_H_MSL,
    );

    let mut bytes = payload(9);
    bytes.extend_from_slice(&123456789u32.to_le_bytes()); // iTOW
    bytes.push(0x07); // valid
    bytes.extend_from_slice(&356635894i32.to_le_bytes());
    bytes.extend_from_slice(&55000i32.to_le_bytes()); // hMSL

    let sample = parse(&component, &bytes).unwrap();
    assert!((sample.latitude - 35.6635894).abs() < 1e-12);
}

#[test]
fn accuracy_velocity_and_heading_scales() {
    let component = component();
    set_flags(
        &component,
        GnssOutputFlags::NAV_PVT_H_ACC
            | GnssOutputFlags::NAV_PVT_V_ACC
            | GnssOutputFlags::NAV_PVT_GROUND_SPEED
            | GnssOutputFlags::NAV_PVT_HEAD_MOTION
            | GnssOutputFlags::NAV_PVT_S_ACC
            | GnssOutputFlags::NAV_PVT_HEAD_ACC
            | GnssOutputFlags::NAV_PVT_HEAD_VEHICLE,
    );

    let mut bytes = payload(1);
    bytes.extend_from_slice(&2500u32.to_le_bytes()); // hAcc: 2.5 m
    bytes.extend_from_slice(&4000u32.to_le_bytes()); // vAcc: 4.0 m
    bytes.extend_from_slice(&15000i32.to_le_bytes()); // gSpeed: 15 m/s
    bytes.extend_from_slice(&18000000i32.to_le_bytes()); // headMot: 180 deg
    bytes.extend_from_slice(&500u32.to_le_bytes()); // sAcc: 0.5 m/s
    bytes.extend_from_slice(&250000u32.to_le_bytes()); // headAcc: 2.5 deg
    bytes.extend_from_slice(&(-9000000i32).to_le_bytes()); // headVeh: -90 deg

    let sample = parse(&component, &bytes).unwrap();
    assert!((sample.horizontal_accuracy - 2.5).abs() < 1e-9);
    assert!((sample.vertical_accuracy - 4.0).abs() < 1e-9);
    assert!((sample.velocity - 15.0).abs() < 1e-9);
    assert!((sample.heading_of_motion - 180.0).abs() < 1e-9);
    assert!((sample.velocity_accuracy - 0.5).abs() < 1e-9);
    assert!((sample.heading_accuracy - 2.5).abs() < 1e-9);
    assert!((sample.heading_of_vehicle + 90.0).abs() < 1e-9);
}

#[test]
fn date_time_fields_are_surfaced() {
    let component = component();
    set_flags(
        &component,
        GnssOutputFlags::NAV_PVT_YEAR
            | GnssOutputFlags::NAV_PVT_MONTH
            | GnssOutputFlags::NAV_PVT_DAY
            | GnssOutputFlags::NAV_PVT_HOUR
            | GnssOutputFlags::NAV_PVT_MINUTE
            | GnssOutputFlags::NAV_PVT_SECOND
            | GnssOutputFlags::NAV_PVT_NANO,
    );

    let mut bytes = payload(1);
    bytes.extend_from_slice(&2026u16.to_le_bytes());
    bytes.push(8);
    bytes.push(1);
    bytes.push(13);
    bytes.push(37);
    bytes.push(59);
    bytes.extend_from_slice(&(-250000i32).to_le_bytes());

    let sample = parse(&component, &bytes).unwrap();
    assert_eq!(sample.year, 2026);
    assert_eq!(sample.month, 8);
    assert_eq!(sample.day, 1);
    assert_eq!(sample.hour, 13);
    assert_eq!(sample.minute, 37);
    assert_eq!(sample.second, 59);
    assert_eq!(sample.nanosecond_correction, -250000);
}

#[test]
fn truncated_enabled_field_is_corrupt() {
    let component = component();
    set_flags(&component, GnssOutputFlags::NAV_PVT_LATITUDE);

    let mut bytes = payload(1);
    bytes.extend_from_slice(&[0x01, 0x02]); // half an i32

    assert!(matches!(
        parse(&component, &bytes),
        Err(Error::Protocol(ProtocolError::MessageCorrupt(_)))
    ));
}

#[test]
fn rtk_stop_without_a_source_is_a_no_op() {
    let component = component();
    component.stop_rtk_corrections();
    component.stop_rtk_corrections();
}

#[test]
fn rtk_restart_replaces_the_previous_source() {
    use crate::rtk::RtkSourceConfig;
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    let first = TcpListener::bind("127.0.0.1:0").unwrap();
    let first_port = first.local_addr().unwrap().port();
    let second = TcpListener::bind("127.0.0.1:0").unwrap();
    let second_port = second.local_addr().unwrap().port();

    // the first server reports when its client hangs up
    let first_server = std::thread::spawn(move || {
        let (mut conn, _) = first.accept().unwrap();
        conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 16];
        matches!(conn.read(&mut buf), Ok(0))
    });
    let second_server = std::thread::spawn(move || {
        let _conn = second.accept().unwrap();
        std::thread::sleep(Duration::from_millis(100));
    });

    let component = component();
    component
        .forward_rtk_corrections(RtkSourceConfig::Network {
            host: "127.0.0.1".to_string(),
            port: first_port,
        })
        .unwrap();

    // restarting tears the first source down before the second connects
    component
        .forward_rtk_corrections(RtkSourceConfig::Network {
            host: "127.0.0.1".to_string(),
            port: second_port,
        })
        .unwrap();

    assert!(
        first_server.join().unwrap(),
        "first source was not disconnected by the restart"
    );

    component.stop_rtk_corrections();
    second_server.join().unwrap();
}

#[test]
fn imu_events_are_not_for_this_component() {
    let component = component();
    assert!(component
        .process_event(EventKind::ImuSample, &payload(1))
        .is_err());
}
