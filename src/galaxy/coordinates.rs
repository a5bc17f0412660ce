use serde::{Deserialize, Serialize};

/// Galactic position in light years, Sol-centered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub const SOL: Coordinates = Coordinates::new(0.0, 0.0, 0.0);

/// Sagittarius A*.
pub const GALACTIC_CORE: Coordinates = Coordinates::new(25.21875, -20.90625, 25899.96875);

impl Coordinates {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Coordinates) -> f64 {
        (other.x - self.x).powi(2) + (other.y - self.y).powi(2) + (other.z - self.z).powi(2)
    }

    /// Euclidean distance in light years.
    pub fn distance(&self, other: &Coordinates) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl From<[f64; 3]> for Coordinates {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}
