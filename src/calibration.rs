//! Locally cached IMU calibration, shared between the property-change
//! callbacks (rare writer) and the sample parser (fast reader).

use std::sync::{Arc, Mutex};

use crate::math::{Matrix3x3, Vector3};

/// Alignment matrices and bias vectors applied to raw triplets.
///
/// Plain old data; the parser copies a snapshot per sample so one parse
/// never observes a torn update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuCalibration {
    pub acc_alignment: Matrix3x3,
    pub gyr_alignment: Matrix3x3,
    pub soft_iron_matrix: Matrix3x3,
    pub acc_bias: Vector3,
    pub gyr_bias: Vector3,
    pub hard_iron_offset: Vector3,
}

impl Default for ImuCalibration {
    fn default() -> Self {
        Self {
            acc_alignment: Matrix3x3::IDENTITY,
            gyr_alignment: Matrix3x3::IDENTITY,
            soft_iron_matrix: Matrix3x3::IDENTITY,
            acc_bias: Vector3::ZERO,
            gyr_bias: Vector3::ZERO,
            hard_iron_offset: Vector3::ZERO,
        }
    }
}

impl ImuCalibration {
    /// Applies alignment and bias: `A * raw + b`.
    pub fn calibrate_acc(&self, raw: Vector3) -> Vector3 {
        self.acc_alignment.mul_vec(raw).add(self.acc_bias)
    }

    /// Applies alignment and bias: `A * raw + b`.
    pub fn calibrate_gyr(&self, raw: Vector3) -> Vector3 {
        self.gyr_alignment.mul_vec(raw).add(self.gyr_bias)
    }

    /// Applies iron corrections: `S * (raw - h)`.
    pub fn calibrate_mag(&self, raw: Vector3) -> Vector3 {
        self.soft_iron_matrix.mul_vec(raw.sub(self.hard_iron_offset))
    }
}

/// Shared ownership wrapper around the calibration cache.
///
/// The lock is held only for the duration of a copy (reader) or a field
/// store (writer); the per-sample math runs on the stack-local snapshot.
#[derive(Clone, Default)]
pub struct SharedCalibration {
    inner: Arc<Mutex<ImuCalibration>>,
}

impl SharedCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ImuCalibration {
        *self.inner.lock().unwrap()
    }

    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut ImuCalibration),
    {
        let mut guard = self.inner.lock().unwrap();
        apply(&mut guard);
    }
}
