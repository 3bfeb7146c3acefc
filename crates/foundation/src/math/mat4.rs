//! Column-major 4x4 matrices.
//!
//! Layout and conventions match what GL-style shaders expect: element `(row, col)`
//! lives at `m[col * 4 + row]`, and clip space uses a `[-1, 1]` depth range.

use super::Vec3;

const EPSILON: f64 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4 {
    pub m: [f64; 16],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub const fn identity() -> Self {
        Self {
            m: [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub fn scale(s: Vec3) -> Self {
        let mut out = Self::identity();
        out.m[0] = s.x;
        out.m[5] = s.y;
        out.m[10] = s.z;
        out
    }

    /// Right-handed view matrix.
    ///
    /// Returns identity when `eye` and `center` coincide.
    pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Self {
        let d = eye - center;
        if d.x.abs() < EPSILON && d.y.abs() < EPSILON && d.z.abs() < EPSILON {
            return Self::identity();
        }

        let z = d.normalize();
        let x = up.cross(z).normalize();
        let y = z.cross(x).normalize();

        Self {
            m: [
                x.x,
                y.x,
                z.x,
                0.0,
                x.y,
                y.y,
                z.y,
                0.0,
                x.z,
                y.z,
                z.z,
                0.0,
                -x.dot(eye),
                -y.dot(eye),
                -z.dot(eye),
                1.0,
            ],
        }
    }

    pub fn perspective(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Self {
        let f = 1.0 / (fov_y_rad / 2.0).tan();
        let nf = 1.0 / (near - far);
        let mut m = [0.0; 16];
        m[0] = f / aspect;
        m[5] = f;
        m[10] = (far + near) * nf;
        m[11] = -1.0;
        m[14] = 2.0 * far * near * nf;
        Self { m }
    }

    pub fn mul(&self, other: &Mat4) -> Mat4 {
        let a = &self.m;
        let b = &other.m;
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a[k * 4 + row] * b[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }
        Mat4 { m: out }
    }

    /// Applies the matrix to a point, including the perspective divide.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let m = &self.m;
        let x = m[0] * p.x + m[4] * p.y + m[8] * p.z + m[12];
        let y = m[1] * p.x + m[5] * p.y + m[9] * p.z + m[13];
        let z = m[2] * p.x + m[6] * p.y + m[10] * p.z + m[14];
        let w = m[3] * p.x + m[7] * p.y + m[11] * p.z + m[15];
        if w.abs() <= f64::EPSILON {
            return Vec3::new(x, y, z);
        }
        Vec3::new(x / w, y / w, z / w)
    }

    pub fn to_f32(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        for (dst, src) in out.iter_mut().zip(self.m.iter()) {
            *dst = *src as f32;
        }
        out
    }
}
