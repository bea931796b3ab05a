//! Structure-of-arrays vectors that work the same for scalars and `wide` lanes.
//!
//! The triangle kernels are written once against [`Lane`] and instantiated both for
//! `f32` and `f32x4`, so a scalar test evaluates exactly the same arithmetic as one
//! lane of the batched test.

use std::ops::{Add, Div, Mul, Sub};

use wide::f32x4;

use crate::geometry::{FloatType, WorldPoint, WorldVector};

pub trait Lane:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;

    fn splat(value: FloatType) -> Self;
}

impl Lane for FloatType {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline(always)]
    fn splat(value: FloatType) -> Self {
        value
    }
}

impl Lane for f32x4 {
    const ZERO: Self = f32x4::ZERO;
    const ONE: Self = f32x4::ONE;

    #[inline(always)]
    fn splat(value: FloatType) -> Self {
        f32x4::splat(value)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LaneVector<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T: Lane> LaneVector<T> {
    pub fn new(x: T, y: T, z: T) -> Self {
        LaneVector { x, y, z }
    }

    pub fn splat(v: &WorldVector) -> Self {
        LaneVector {
            x: T::splat(v.x),
            y: T::splat(v.y),
            z: T::splat(v.z),
        }
    }

    pub fn splat_point(p: &WorldPoint) -> Self {
        Self::splat(&p.coords)
    }

    #[inline(always)]
    pub fn dot(&self, rhs: &Self) -> T {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline(always)]
    pub fn cross(&self, rhs: &Self) -> Self {
        LaneVector {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }
}

impl<T: Lane> Sub for LaneVector<T> {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        LaneVector {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl LaneVector<f32x4> {
    /// Gathers four scalar vectors into lanes.
    pub fn gather(vectors: [LaneVector<FloatType>; 4]) -> Self {
        LaneVector {
            x: f32x4::new(vectors.map(|v| v.x)),
            y: f32x4::new(vectors.map(|v| v.y)),
            z: f32x4::new(vectors.map(|v| v.z)),
        }
    }

    pub fn lane(&self, i: usize) -> LaneVector<FloatType> {
        LaneVector {
            x: self.x.to_array()[i],
            y: self.y.to_array()[i],
            z: self.z.to_array()[i],
        }
    }
}

impl From<&WorldPoint> for LaneVector<FloatType> {
    fn from(p: &WorldPoint) -> Self {
        LaneVector::new(p.x, p.y, p.z)
    }
}

impl From<LaneVector<FloatType>> for WorldVector {
    fn from(v: LaneVector<FloatType>) -> Self {
        WorldVector::new(v.x, v.y, v.z)
    }
}
