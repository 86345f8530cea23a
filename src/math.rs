//! Small fixed-size linear algebra used by the sample pipeline.
//!
//! Matrices are row-major 3x3, matching the on-wire transmission order of
//! the alignment and soft-iron calibration properties.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(a: [f32; 3]) -> Self {
        Self {
            x: a[0],
            y: a[1],
            z: a[2],
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, s: f32) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix3x3 {
    /// Row-major coefficients.
    pub m: [[f32; 3]; 3],
}

impl Default for Matrix3x3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix3x3 {
    pub const IDENTITY: Matrix3x3 = Matrix3x3 {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Builds from nine row-major coefficients as transmitted on the wire.
    pub fn from_row_major(a: [f32; 9]) -> Self {
        Self {
            m: [[a[0], a[1], a[2]], [a[3], a[4], a[5]], [a[6], a[7], a[8]]],
        }
    }

    pub fn to_row_major(self) -> [f32; 9] {
        let m = self.m;
        [
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        ]
    }

    pub fn mul_vec(&self, v: Vector3) -> Vector3 {
        let m = &self.m;
        Vector3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    pub fn transpose(&self) -> Matrix3x3 {
        let m = &self.m;
        Matrix3x3 {
            m: [
                [m[0][0], m[1][0], m[2][0]],
                [m[0][1], m[1][1], m[2][1]],
                [m[0][2], m[1][2], m[2][2]],
            ],
        }
    }

    pub fn mul(&self, other: &Matrix3x3) -> Matrix3x3 {
        let mut out = [[0.0f32; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        Matrix3x3 { m: out }
    }

    pub fn determinant(&self) -> f32 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }
}

/// Converts a `(w, x, y, z)` quaternion to a rotation matrix.
///
/// The quaternion is normalized through the inverse squared norm, so
/// non-unit inputs still yield a proper rotation.
pub fn quaternion_to_matrix(q: [f32; 4]) -> Matrix3x3 {
    let sqw = q[0] * q[0];
    let sqx = q[1] * q[1];
    let sqy = q[2] * q[2];
    let sqz = q[3] * q[3];

    let invs = 1.0 / (sqx + sqy + sqz + sqw);

    let mut m = [[0.0f32; 3]; 3];
    m[0][0] = (sqx - sqy - sqz + sqw) * invs;
    m[1][1] = (-sqx + sqy - sqz + sqw) * invs;
    m[2][2] = (-sqx - sqy + sqz + sqw) * invs;

    let tmp1 = q[1] * q[2];
    let tmp2 = q[3] * q[0];
    m[1][0] = 2.0 * (tmp1 + tmp2) * invs;
    m[0][1] = 2.0 * (tmp1 - tmp2) * invs;

    let tmp1 = q[1] * q[3];
    let tmp2 = q[2] * q[0];
    m[2][0] = 2.0 * (tmp1 - tmp2) * invs;
    m[0][2] = 2.0 * (tmp1 + tmp2) * invs;

    let tmp1 = q[2] * q[3];
    let tmp2 = q[1] * q[0];
    m[2][1] = 2.0 * (tmp1 + tmp2) * invs;
    m[1][2] = 2.0 * (tmp1 - tmp2) * invs;

    Matrix3x3 { m }
}

/// Converts a quaternion to Euler angles in degrees.
///
/// Kept byte-for-byte compatible with the legacy firmware tooling,
/// including the quadrant handling that shifts yaw by +-180 degrees. The
/// streaming parser does not call this; sensors transmit Euler angles as
/// their own output channel.
pub fn quaternion_to_euler(q: [f32; 4]) -> Vector3 {
    const R2D: f32 = 57.2958;

    let qx = q[0];
    let qy = q[1];
    let qz = q[2];
    let qw = q[3];

    let dx = 1.0 - 2.0 * (qx * qx + qy * qy);
    let dy = 2.0 * (qw * qx + qy * qz);

    let mut yaw = 0.0f32;
    if dx.abs() > 0.0 {
        let t = (dy / dx).atan() * R2D;

        if dx >= 0.0 && dy >= 0.0 {
            yaw = t - 180.0;
        } else if dx <= 0.0 && dy >= 0.0 {
            yaw = t;
        } else if dx <= 0.0 && dy <= 0.0 {
            yaw = t;
        } else if dx >= 0.0 && dy <= 0.0 {
            yaw = t + 180.0;
        }

        yaw = -yaw;
    }

    let pitch = (2.0 * (qw * qy - qz * qx)).asin() * R2D;
    let roll = -(2.0 * (qw * qz + qx * qy)).atan2(1.0 - 2.0 * (qy * qy + qz * qz)) * R2D;

    Vector3::new(roll, pitch, yaw)
}
