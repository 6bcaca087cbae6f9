//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use serde::{Deserialize, Serialize};

/// 3D vector, world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }
}

/// Unit quaternion (conceptually). Rotations are always world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s, self.w * s)
    }

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.x + rhs.x,
            self.y + rhs.y,
            self.z + rhs.z,
            self.w + rhs.w,
        )
    }

    pub fn normalized(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        self.scale(1.0 / len)
    }

    /// Spherical interpolation along the shortest arc.
    ///
    /// `t` is clamped to $[0,1]$. Falls back to normalized lerp when the
    /// rotations are nearly parallel, where the sin-based weights degenerate.
    pub fn slerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);

        let mut to = to;
        let mut dot = self.dot(to);
        // Negating one endpoint keeps us on the shortest arc.
        if dot < 0.0 {
            to = to.scale(-1.0);
            dot = -dot;
        }

        if dot > 0.9995 {
            return self.scale(1.0 - t).add(to.scale(t)).normalized();
        }

        let theta_0 = dot.clamp(-1.0, 1.0).acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();

        let s0 = (theta_0 - theta).sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;
        self.scale(s0).add(to.scale(s1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn vec3_lerp_clamps() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 1.0, 1.0);
        assert_eq!(a.lerp(b, 2.0), b);
        assert_eq!(a.lerp(b, -1.0), a);
    }

    #[test]
    fn quat_slerp_endpoints() {
        // 90 degrees around Y.
        let a = Quat::IDENTITY;
        let half = std::f32::consts::FRAC_PI_4 / 2.0;
        let b = Quat::new(0.0, half.sin(), 0.0, half.cos()).normalized();

        let at_start = a.slerp(b, 0.0);
        let at_end = a.slerp(b, 1.0);
        assert!((at_start.dot(a).abs() - 1.0).abs() < 1e-5);
        assert!((at_end.dot(b).abs() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn quat_slerp_midpoint_is_unit() {
        let a = Quat::IDENTITY;
        let angle = std::f32::consts::FRAC_PI_2;
        let b = Quat::new(0.0, (angle / 2.0).sin(), 0.0, (angle / 2.0).cos());
        let mid = a.slerp(b, 0.5);
        assert!((mid.dot(mid) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn quat_slerp_takes_shortest_arc() {
        let a = Quat::IDENTITY;
        // Same rotation as identity, opposite sign: slerp must not swing
        // through the long way around.
        let b = Quat::new(0.0, 0.0, 0.0, -1.0);
        let mid = a.slerp(b, 0.5);
        assert!((mid.dot(a).abs() - 1.0).abs() < 1e-4);
    }
}
