//! Property model shared by the components: typed values, property keys,
//! payload codecs and the change-notification registry.

pub mod gnss;
pub mod imu_v0;
pub mod imu_v1;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::error::{Error, ProtocolError, Result};

/// A typed property value as carried on the wire (little-endian payloads).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Float(f32),
    Vector3([f32; 3]),
    Matrix3x3([f32; 9]),
    Bytes(Vec<u8>),
}

/// Application-visible IMU property keys.
///
/// The `Output*` keys are local-cached projections of the firmware transmit
/// mask; calibration and filter keys are device-backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImuProperty {
    StreamData,
    SamplingRate,
    FilterMode,
    AccAlignment,
    AccBias,
    AccRange,
    GyrAlignment,
    GyrBias,
    GyrRange,
    MagSoftIronMatrix,
    MagHardIronOffset,
    MagRange,
    OutputRawAcc,
    OutputRawGyr,
    OutputRawMag,
    OutputAngularVel,
    OutputQuat,
    OutputEuler,
    OutputLinearAcc,
    OutputPressure,
    OutputAltitude,
    OutputTemperature,
    OutputHeaveMotion,
    OutputLowPrecision,
    OutputAccCalibrated,
    OutputMagCalibrated,
    OutputRawGyr0,
    OutputRawGyr1,
    OutputGyr0BiasCalib,
    OutputGyr1BiasCalib,
    OutputGyr0AlignCalib,
    OutputGyr1AlignCalib,
}

/// Commands an IMU component can execute (ack-only, no payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuCommand {
    CalibrateGyro,
    ResetOrientationOffset,
    StartSync,
    StopSync,
}

type Callback = Arc<dyn Fn(&PropertyValue) + Send + Sync>;

/// Per-component registry of property-change subscribers.
///
/// Callbacks run outside the registry lock; subscribers must not reenter
/// the property API of the same component.
pub struct PropertyNotifier<K> {
    subscribers: Mutex<HashMap<K, Vec<Callback>>>,
}

impl<K: Eq + Hash + Copy> PropertyNotifier<K> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe<F>(&self, key: K, callback: F)
    where
        F: Fn(&PropertyValue) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn notify(&self, key: K, value: &PropertyValue) {
        let callbacks: Vec<Callback> = {
            let guard = self.subscribers.lock().unwrap();
            match guard.get(&key) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(value);
        }
    }
}

impl<K: Eq + Hash + Copy> Default for PropertyNotifier<K> {
    fn default() -> Self {
        Self::new()
    }
}

// Payload codecs. Every device-backed read lands here to turn response
// bytes into a typed value; sizes are validated against the wire contract.

pub(crate) fn decode_u32(payload: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| Error::from(ProtocolError::MessageCorrupt("expected a 4 byte integer")))?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn decode_u64(payload: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = payload
        .try_into()
        .map_err(|_| Error::from(ProtocolError::MessageCorrupt("expected an 8 byte integer")))?;
    Ok(u64::from_le_bytes(bytes))
}

pub(crate) fn decode_f32x3(payload: &[u8]) -> Result<[f32; 3]> {
    if payload.len() != 12 {
        return Err(ProtocolError::MessageCorrupt("expected a 3 float vector").into());
    }
    let mut out = [0.0f32; 3];
    for (i, chunk) in payload.chunks_exact(4).enumerate() {
        out[i] = f32::from_le_bytes(chunk.try_into().unwrap());
    }
    Ok(out)
}

pub(crate) fn decode_f32x9(payload: &[u8]) -> Result<[f32; 9]> {
    if payload.len() != 36 {
        return Err(ProtocolError::MessageCorrupt("expected a 9 float matrix").into());
    }
    let mut out = [0.0f32; 9];
    for (i, chunk) in payload.chunks_exact(4).enumerate() {
        out[i] = f32::from_le_bytes(chunk.try_into().unwrap());
    }
    Ok(out)
}

pub(crate) fn encode_u32(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub(crate) fn encode_f32x3(value: [f32; 3]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    for v in value {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub(crate) fn encode_f32x9(value: [f32; 9]) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    for v in value {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
