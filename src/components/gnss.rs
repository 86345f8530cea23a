//! The GNSS component: flag-driven navigation sample parser, persist-state
//! handling on close, and RTK correction forwarding.

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::communicator::Communicator;
use crate::components::{scaled_double, FieldReader, SensorComponent};
use crate::error::{ProtocolError, Result};
use crate::properties::decode_u64;
use crate::properties::gnss::{GnssField, GnssFieldKind, GnssOutputFlags, FIELD_ORDER};
use crate::protocol::{CommandV1, EventKind};
use crate::rtk::{RtcmSource, RtkSourceConfig};
use crate::types::{
    CarrierPhaseSolution, ComponentHandle, ComponentKind, EventData, GnssFixType, GnssSample,
};

/// Seconds per GNSS frame counter tick.
const TIMESTAMP_PERIOD: f64 = 0.002;

pub struct GnssComponent {
    handle: ComponentHandle,
    comm: Arc<Communicator>,
    pub(crate) output: Mutex<GnssOutputFlags>,
    rtk: Mutex<Option<RtcmSource>>,
}

impl GnssComponent {
    pub(crate) fn new(handle: ComponentHandle, comm: Arc<Communicator>) -> Self {
        Self {
            handle,
            comm,
            output: Mutex::new(GnssOutputFlags::empty()),
            rtk: Mutex::new(None),
        }
    }

    /// Attaches an RTCM3 correction source and forwards every framed
    /// message to the device. A previously running source is stopped
    /// first.
    pub fn forward_rtk_corrections(&self, config: RtkSourceConfig) -> Result<()> {
        self.stop_rtk_corrections();

        let comm = self.comm.clone();
        let component = self.handle.0;
        let callback = move |message_type: u16, frame: &[u8]| {
            info!(message_type, size = frame.len(), "forwarding rtcm3 message");
            if let Err(e) =
                comm.send_and_wait_for_ack(component, CommandV1::SetRtkCorrection.code(), frame)
            {
                error!(error = %e, "could not forward rtk correction to sensor");
            }
        };

        let source = match config {
            RtkSourceConfig::Network { ref host, port } => {
                info!(host = %host, port, "connecting to rtk correction stream");
                RtcmSource::start_network(host, port, Box::new(callback))?
            }
            RtkSourceConfig::Serial { ref port, baud_rate } => {
                info!(port = %port, baud_rate, "opening serial rtk correction source");
                RtcmSource::start_serial(port, baud_rate, Box::new(callback))?
            }
        };

        *self.rtk.lock().unwrap() = Some(source);
        Ok(())
    }

    /// Stops correction forwarding. A no-op when no source is active.
    pub fn stop_rtk_corrections(&self) {
        if let Some(source) = self.rtk.lock().unwrap().take() {
            source.stop();
        }
    }

    /// Whether the given output fields are currently enabled.
    pub fn get_output(&self, fields: GnssOutputFlags) -> bool {
        self.output.lock().unwrap().contains(fields)
    }

    /// Enables or disables output fields. The full mask goes on the wire;
    /// the cache updates once the device acknowledges.
    pub fn set_output(&self, fields: GnssOutputFlags, value: bool) -> Result<()> {
        let mut mask = *self.output.lock().unwrap();
        mask.set(fields, value);
        self.comm.send_and_wait_for_ack(
            self.handle.0,
            CommandV1::SetGnssTransmitData.code(),
            &mask.bits().to_le_bytes(),
        )?;
        *self.output.lock().unwrap() = mask;
        Ok(())
    }

    /// Tells the device to persist its navigation state. Sent best-effort
    /// during close.
    fn store_navigation_state(&self) {
        match self
            .comm
            .send_and_wait_for_ack(self.handle.0, CommandV1::SaveGpsState.code(), &[])
        {
            Ok(()) => info!("device navigation state persisted"),
            Err(e) => error!(error = %e, "could not persist device navigation state"),
        }
    }

    fn parse_sample(&self, payload: &[u8]) -> Result<GnssSample> {
        let mut reader = FieldReader::new(payload);
        let mut sample = GnssSample {
            frame_count: reader.read_u32()?,
            ..GnssSample::default()
        };
        sample.timestamp = sample.frame_count as f64 * TIMESTAMP_PERIOD;

        let flags = *self.output.lock().unwrap();

        // Every enabled field must be consumed in wire order, surfaced or
        // not, or the decoder position drifts.
        for (flag, field, kind) in FIELD_ORDER {
            if !flags.contains(flag) {
                continue;
            }
            let value: i64 = match kind {
                GnssFieldKind::U8 => reader.read_u8()? as i64,
                GnssFieldKind::U16 => reader.read_u16()? as i64,
                GnssFieldKind::U32 => reader.read_u32()? as i64,
                GnssFieldKind::I32 => reader.read_i32()? as i64,
            };
            store_field(&mut sample, field, value);
        }

        Ok(sample)
    }
}

fn store_field(sample: &mut GnssSample, field: GnssField, value: i64) {
    match field {
        GnssField::Year => sample.year = value as u16,
        GnssField::Month => sample.month = value as u8,
        GnssField::Day => sample.day = value as u8,
        GnssField::Hour => sample.hour = value as u8,
        GnssField::Minute => sample.minute = value as u8,
        GnssField::Second => sample.second = value as u8,
        GnssField::Nano => sample.nanosecond_correction = value as i32,
        GnssField::FixType => sample.fix_type = GnssFixType::from_u8(value as u8),
        GnssField::Flags => {
            sample.carrier_phase_solution = CarrierPhaseSolution::from_u8((value as u8) >> 6);
        }
        GnssField::NumSv => sample.satellites_used = value as u8,
        GnssField::Longitude => sample.longitude = scaled_double(value, -7),
        GnssField::Latitude => sample.latitude = scaled_double(value, -7),
        GnssField::Height => sample.height = scaled_double(value, -3),
        GnssField::HorizontalAccuracy => sample.horizontal_accuracy = scaled_double(value, -3),
        GnssField::VerticalAccuracy => sample.vertical_accuracy = scaled_double(value, -3),
        GnssField::GroundSpeed => sample.velocity = scaled_double(value, -3),
        GnssField::HeadingOfMotion => sample.heading_of_motion = scaled_double(value, -5),
        GnssField::SpeedAccuracy => sample.velocity_accuracy = scaled_double(value, -3),
        GnssField::HeadingAccuracy => sample.heading_accuracy = scaled_double(value, -5),
        GnssField::HeadingOfVehicle => sample.heading_of_vehicle = scaled_double(value, -5),
        // consumed for positioning only
        GnssField::Itow
        | GnssField::Valid
        | GnssField::TimeAccuracy
        | GnssField::Flags2
        | GnssField::HeightMsl
        | GnssField::VelocityNorth
        | GnssField::VelocityEast
        | GnssField::VelocityDown
        | GnssField::PositionDop
        | GnssField::AttItow
        | GnssField::AttVersion
        | GnssField::AttRoll
        | GnssField::AttPitch
        | GnssField::AttHeading
        | GnssField::AttAccRoll
        | GnssField::AttAccPitch
        | GnssField::AttAccHeading
        | GnssField::EsfItow
        | GnssField::EsfVersion
        | GnssField::EsfInitStatus1
        | GnssField::EsfInitStatus2
        | GnssField::EsfFusionMode
        | GnssField::EsfNumSens => {}
    }
}

impl SensorComponent for GnssComponent {
    fn handle(&self) -> ComponentHandle {
        self.handle
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Gnss
    }

    fn init(&self) -> Result<()> {
        // The parser needs the output configuration; everything else is
        // event-handler registration done by the session.
        let payload = self
            .comm
            .send_and_wait_for_result(self.handle.0, CommandV1::GetGnssTransmitData.code())?;
        let mask = decode_u64(&payload)?;
        *self.output.lock().unwrap() = GnssOutputFlags::from_bits_retain(mask);
        Ok(())
    }

    fn process_event(&self, kind: EventKind, payload: &[u8]) -> Result<EventData> {
        match kind {
            EventKind::GnssSample => Ok(EventData::Gnss(self.parse_sample(payload)?)),
            EventKind::ImuSample => {
                Err(ProtocolError::UnsupportedFunction(CommandV1::ImuSample.code()).into())
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.stop_rtk_corrections();
        self.store_navigation_state();
        Ok(())
    }
}

impl Drop for GnssComponent {
    fn drop(&mut self) {
        if self.rtk.lock().unwrap().is_some() {
            warn!("gnss component dropped with an active rtk source");
            self.stop_rtk_corrections();
        }
    }
}

#[cfg(test)]
#[path = "tests/gnss.rs"]
mod tests;
