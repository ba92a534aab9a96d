// src/frustum.rs
//! View-frustum plane extraction and sphere testing.
//!
//! The host builds a `FrustumPlanes` from its combined view-projection
//! matrix once per frame and passes it into the cull pass by value; the
//! type is `Copy` so worker batches can carry their own.

use glam::{Mat4, Vec3, Vec4};

/// Six normalised frustum planes in the form `(normal, distance)`:
/// left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy)]
pub struct FrustumPlanes {
    planes: [Vec4; 6],
}

impl FrustumPlanes {
    /// Extract planes from a combined view-projection matrix
    /// (Gribb-Hartmann). Planes are normalised so signed distances are in
    /// world units.
    pub fn from_view_proj(vp: &Mat4) -> Self {
        // glam stores columns; the plane rows come from the transpose.
        let m = vp.transpose();
        let rows = [m.x_axis, m.y_axis, m.z_axis, m.w_axis];

        let raw = [
            rows[3] + rows[0], // left
            rows[3] - rows[0], // right
            rows[3] + rows[1], // bottom
            rows[3] - rows[1], // top
            rows[3] + rows[2], // near
            rows[3] - rows[2], // far
        ];

        let mut planes = [Vec4::ZERO; 6];
        for (dst, p) in planes.iter_mut().zip(raw) {
            let len = p.truncate().length().max(1e-6);
            *dst = p / len;
        }

        Self { planes }
    }

    /// A frustum that accepts every sphere. Useful for hosts that do their
    /// own frustum pass and for tests.
    pub fn accept_all() -> Self {
        Self {
            planes: [Vec4::new(0.0, 0.0, 0.0, 1.0); 6],
        }
    }

    /// A frustum that rejects every sphere.
    pub fn reject_all() -> Self {
        Self {
            planes: [Vec4::new(0.0, 0.0, 0.0, -f32::MAX); 6],
        }
    }

    /// Conservative sphere-in-frustum test: true unless the sphere is
    /// entirely on the negative side of some plane.
    #[inline]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        for p in &self.planes {
            let d = p.x * center.x + p.y * center.y + p.z * center.z + p.w;
            if d < -radius {
                return false;
            }
        }
        true
    }
}
