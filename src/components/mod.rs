//! Logical sub-devices of one sensor and the shared wire-field readers.

pub mod gnss;
pub mod imu;
mod imu_v1;

use bytes::Buf;

use crate::error::{ProtocolError, Result};
use crate::math::Vector3;
use crate::protocol::EventKind;
use crate::types::{ComponentHandle, ComponentKind, EventData};

/// A logical sub-device addressed by a handle within one sensor.
///
/// The session dispatcher routes streamed frames here; property traffic
/// goes through each component's own typed API.
pub trait SensorComponent: Send + Sync {
    fn handle(&self) -> ComponentHandle;

    fn kind(&self) -> ComponentKind;

    /// Runs the per-component part of session init.
    fn init(&self) -> Result<()>;

    /// Parses a streamed sample frame into an event.
    fn process_event(&self, kind: EventKind, payload: &[u8]) -> Result<EventData>;

    /// Runs the per-component part of session close, while the channel is
    /// still usable.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Sequential reader over a sample payload.
///
/// Every accessor fails with `MessageCorrupt` when the remaining bytes do
/// not cover the field, which is how truncated frames surface.
pub(crate) struct FieldReader<'a> {
    data: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(ProtocolError::MessageCorrupt(what).into());
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "truncated u8 field")?.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.take(2, "truncated u16 field")?.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.take(4, "truncated u32 field")?.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.take(4, "truncated i32 field")?.get_i32_le())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.take(4, "truncated float field")?.get_f32_le())
    }

    /// Reads an int16-compressed float and divides by `denominator`.
    pub fn read_f16(&mut self, denominator: f32) -> Result<f32> {
        let raw = self.take(2, "truncated compressed field")?.get_i16_le();
        Ok(raw as f32 / denominator)
    }

    /// Reads one float, compressed or full precision.
    pub fn read_float(&mut self, low_precision: bool, denominator: f32) -> Result<f32> {
        if low_precision {
            self.read_f16(denominator)
        } else {
            self.read_f32()
        }
    }

    pub fn read_vector3(&mut self, low_precision: bool, denominator: f32) -> Result<Vector3> {
        Ok(Vector3::new(
            self.read_float(low_precision, denominator)?,
            self.read_float(low_precision, denominator)?,
            self.read_float(low_precision, denominator)?,
        ))
    }

    pub fn read_quat(&mut self, low_precision: bool, denominator: f32) -> Result<[f32; 4]> {
        let mut q = [0.0f32; 4];
        for value in &mut q {
            *value = self.read_float(low_precision, denominator)?;
        }
        Ok(q)
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

/// Decodes a packed fixed-point integer: `value * 10^exponent`.
pub(crate) fn scaled_double(value: i64, exponent: i32) -> f64 {
    value as f64 * 10f64.powi(exponent)
}
