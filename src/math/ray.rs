use bitflags::bitflags;

use super::Vec3;

bitflags! {
    /// Per-ray flag bits carried through the integrators.
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct RayFlags: u32 {
        /// The ray is the continuation of a diffuse bounce. Direct light
        /// emission is skipped for these to avoid double counting with
        /// explicit light sampling.
        const DIFFUSE = 0b0001;
        /// Shadow ray, only occlusion matters.
        const SHADOW = 0b0010;
    }
}

/// A ray with a unit direction, recursion depth and flag bits.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ray {
    pub start: Vec3,
    pub dir: Vec3,
    pub depth: u32,
    pub flags: RayFlags,
}

impl Ray {
    pub fn new(start: Vec3, dir: Vec3) -> Self {
        Self {
            start,
            dir,
            depth: 0,
            flags: RayFlags::empty(),
        }
    }

    pub fn point(&self, dist: f64) -> Vec3 {
        self.start + self.dir * dist
    }
}
