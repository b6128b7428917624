//! Axis-aligned bounding boxes for emitter and system bounds.

use glam::{Mat4, Vec3};

/// An axis-aligned box. Starts invalid (empty) and grows by insertion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Bounds {
    /// The empty box; contains nothing and unions as identity.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// A box from explicit corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// A cube of half-size `extent` centered on `center`.
    pub fn centered(center: Vec3, extent: f32) -> Self {
        Self { min: center - Vec3::splat(extent), max: center + Vec3::splat(extent) }
    }

    /// Whether the box contains at least one point.
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Grow to contain a point.
    pub fn insert(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Union with another box.
    pub fn union(&self, other: &Bounds) -> Bounds {
        if !self.is_valid() {
            return *other;
        }
        if !other.is_valid() {
            return *self;
        }
        Bounds { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    /// Expand every face outward by a per-axis amount.
    pub fn expand_by(&self, amount: Vec3) -> Bounds {
        if !self.is_valid() {
            return *self;
        }
        Bounds { min: self.min - amount, max: self.max + amount }
    }

    /// The box containing this box under an affine transform.
    pub fn transform_by(&self, m: &Mat4) -> Bounds {
        if !self.is_valid() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        let mut out = Bounds::EMPTY;
        for c in corners {
            out.insert(m.transform_point3(c));
        }
        out
    }
}
