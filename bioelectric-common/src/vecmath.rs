use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A 2D vector in metres, used for cell centres, membrane midpoints and junction directions.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    pub fn zero() -> Self {
        Vec2 { x: 0.0, y: 0.0 }
    }

    /// Unit vector at `angle_rad` from the x axis.
    pub fn from_angle(angle_rad: f64) -> Self {
        Vec2::new(angle_rad.cos(), angle_rad.sin())
    }

    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns a unit vector, or zero if the vector has no length.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-300 {
            let inv_len = 1.0 / len_sq.sqrt();
            Vec2 { x: self.x * inv_len, y: self.y * inv_len }
        } else {
            Vec2::zero()
        }
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance(&self, other: Vec2) -> f64 {
        (*self - other).length()
    }

    /// Counter-clockwise perpendicular.
    pub fn perp(&self) -> Self {
        Vec2 { x: -self.y, y: self.x }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { x: self.x + other.x, y: self.y + other.y }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self { x: self.x - other.x, y: self.y - other.y }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self { x: self.x * scalar, y: self.y * scalar }
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Self { x: self.x / scalar, y: self.y / scalar }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self { x: -self.x, y: -self.y }
    }
}

/// Logistic "soft step" rising from 0 to 1 around `x_on` over a width of `width`.
pub fn step(x: f64, x_on: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return if x >= x_on { 1.0 } else { 0.0 };
    }
    1.0 / (1.0 + (-(x - x_on) / width).exp())
}

/// Hill activation `c^n / (c^n + k^n)`.
pub fn hill(c: f64, k: f64, n: f64) -> f64 {
    let c = c.max(0.0);
    let cn = c.powf(n);
    let denom = cn + k.powf(n);
    if denom > 0.0 {
        cn / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perp_is_orthogonal() {
        let v = Vec2::new(3.0, -2.0);
        assert_eq!(v.dot(v.perp()), 0.0);
        assert!((Vec2::from_angle(0.3).length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn step_is_half_at_threshold() {
        assert!((step(0.02, 0.02, 0.005) - 0.5).abs() < 1e-12);
        assert!(step(1.0, 0.02, 0.005) > 0.999);
        assert_eq!(step(0.01, 0.02, 0.0), 0.0);
    }

    #[test]
    fn hill_saturates() {
        assert!((hill(1.0, 1.0, 3.0) - 0.5).abs() < 1e-12);
        assert!(hill(100.0, 1.0, 3.0) > 0.999);
        assert_eq!(hill(-1.0, 1.0, 2.0), 0.0);
    }
}
