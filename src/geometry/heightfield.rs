use std::path::Path;

use log::info;

use super::{Intersectable, IntersectionInfo};
use crate::bbox::{intersect_triangle_dist, BBox};
use crate::math::{sqr, Ray, Vec3, INF};

/// A terrain grid: one height sample per integer (x, z) position, covering
/// `[0, width) x [0, depth)` in the ground plane. Each grid cell is two
/// triangles; rays walk the cells they cross instead of testing them all.
/// [`Heightfield::begin_render`] must run before the first intersection.
pub struct Heightfield {
    heights: Vec<f32>,
    /// Per cell, the highest of its four corners.
    cell_max: Vec<f32>,
    normals: Vec<Vec3>,
    /// Level k holds, per sample, the highest height within 2^k cells.
    pyramid: Vec<Vec<f32>>,
    width: usize,
    depth: usize,
    /// Skips runs of cells the ray passes well above, using the pyramid.
    pub use_pyramid: bool,
    bbox: BBox,
}

impl Heightfield {
    pub fn new(heights: Vec<f32>, width: usize, depth: usize) -> Self {
        debug_assert_eq!(heights.len(), width * depth);
        debug_assert!(width >= 2 && depth >= 2);
        Self {
            heights,
            cell_max: Vec::new(),
            normals: Vec::new(),
            pyramid: Vec::new(),
            width,
            depth,
            use_pyramid: true,
            bbox: BBox::new_empty(),
        }
    }

    /// Loads heights from an image's pixel intensities, one sample per
    /// texel. The returned field must still go through
    /// [`Heightfield::begin_render`] before use.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let image = image::open(path)?.to_rgb32f();
        let (width, depth) = (image.width() as usize, image.height() as usize);
        let heights = image
            .pixels()
            .map(|p| (p[0] + p[1] + p[2]) / 3.0)
            .collect();
        info!("loaded heightfield {}: {}x{}", path.display(), width, depth);
        Ok(Self::new(heights, width, depth))
    }

    fn height_at(&self, x: isize, z: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let z = z.clamp(0, self.depth as isize - 1) as usize;
        self.heights[z * self.width + x]
    }

    fn highest(&self, level: &[f32], x: isize, z: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let z = z.clamp(0, self.depth as isize - 1) as usize;
        level[z * self.width + x]
    }

    /// Bilinear blend of the four precomputed corner normals around (x, z).
    fn normal_at(&self, x: f64, z: f64) -> Vec3 {
        let x0 = x.floor() as isize;
        let z0 = z.floor() as isize;
        let p = x - x0 as f64;
        let q = z - z0 as f64;
        let at = |x: isize, z: isize| {
            let x = x.clamp(0, self.width as isize - 1) as usize;
            let z = z.clamp(0, self.depth as isize - 1) as usize;
            self.normals[z * self.width + x]
        };
        (at(x0, z0) * ((1.0 - p) * (1.0 - q))
            + at(x0 + 1, z0) * (p * (1.0 - q))
            + at(x0, z0 + 1) * ((1.0 - p) * q)
            + at(x0 + 1, z0 + 1) * (p * q))
            .normalized()
    }

    /// Builds the bounding box, per-cell maxima, corner normals and the
    /// skip pyramid. Must be called once, before rendering.
    pub fn begin_render(&mut self) {
        let (w, d) = (self.width, self.depth);
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for &h in &self.heights {
            min_y = min_y.min(h);
            max_y = max_y.max(h);
        }
        self.bbox = BBox::new_empty();
        self.bbox.add(Vec3::new(0.0, f64::from(min_y), 0.0));
        self.bbox.add(Vec3::new(w as f64, f64::from(max_y), d as f64));

        self.cell_max = (0..w * d)
            .map(|i| {
                let (x, z) = ((i % w) as isize, (i / w) as isize);
                self.height_at(x, z)
                    .max(self.height_at(x + 1, z))
                    .max(self.height_at(x, z + 1))
                    .max(self.height_at(x + 1, z + 1))
            })
            .collect();

        // Corner normals from the forward height differences; the last
        // column and row copy their interior neighbors
        self.normals = vec![Vec3::zeros(); w * d];
        for z in 0..d - 1 {
            for x in 0..w - 1 {
                let h0 = f64::from(self.heights[z * w + x]);
                let hdx = f64::from(self.heights[z * w + x + 1]);
                let hdz = f64::from(self.heights[(z + 1) * w + x]);
                let vdx = Vec3::new(1.0, hdx - h0, 0.0);
                let vdz = Vec3::new(0.0, hdz - h0, 1.0);
                self.normals[z * w + x] = vdz.cross(vdx).normalized();
            }
        }
        for z in 0..d {
            self.normals[z * w + w - 1] = self.normals[z * w + w - 2];
        }
        for x in 0..w {
            self.normals[(d - 1) * w + x] = self.normals[(d - 2) * w + x];
        }

        if self.use_pyramid {
            self.build_pyramid();
            info!(
                "heightfield {}x{}: {} pyramid levels",
                w,
                d,
                self.pyramid.len()
            );
        }
    }

    fn build_pyramid(&mut self) {
        let (w, d) = (self.width, self.depth);
        let levels = ((w as f64).log2().ceil() as usize).max(1);
        self.pyramid = Vec::with_capacity(levels);

        // Level 0 is the 3x3 neighborhood maximum of the raw heights
        let base: Vec<f32> = (0..w * d)
            .map(|i| {
                let (x, z) = ((i % w) as isize, (i / w) as isize);
                let mut result = self.height_at(x, z);
                for dz in -1..=1 {
                    for dx in -1..=1 {
                        result = result.max(self.height_at(x + dx, z + dz));
                    }
                }
                result
            })
            .collect();
        self.pyramid.push(base);

        // Level k combines four level k-1 samples offset by 2^(k-1), so
        // each sample covers the highest height within 2^k cells
        for k in 1..levels {
            let offset = 1isize << (k - 1);
            let prev = &self.pyramid[k - 1];
            let level = (0..w * d)
                .map(|i| {
                    let (x, z) = ((i % w) as isize, (i / w) as isize);
                    self.highest(prev, x - offset, z - offset)
                        .max(self.highest(prev, x + offset, z - offset))
                        .max(self.highest(prev, x - offset, z + offset))
                        .max(self.highest(prev, x + offset, z + offset))
                })
                .collect();
            self.pyramid.push(level);
        }
    }

    /// Tests the two triangles of cell (x0, z0). On a hit closer than the
    /// incoming `info.dist`, fills `info` and returns true.
    fn intersect_cell(
        &self,
        x0: isize,
        z0: isize,
        ray: &Ray,
        info: &mut IntersectionInfo,
    ) -> bool {
        let a = Vec3::new(x0 as f64, f64::from(self.height_at(x0, z0)), z0 as f64);
        let b = Vec3::new(
            (x0 + 1) as f64,
            f64::from(self.height_at(x0 + 1, z0)),
            z0 as f64,
        );
        let c = Vec3::new(
            (x0 + 1) as f64,
            f64::from(self.height_at(x0 + 1, z0 + 1)),
            (z0 + 1) as f64,
        );
        let d = Vec3::new(x0 as f64, f64::from(self.height_at(x0, z0 + 1)), (z0 + 1) as f64);

        let mut closest = INF;
        let hit_abd = intersect_triangle_dist(ray, a, b, d, &mut closest);
        if !(intersect_triangle_dist(ray, b, c, d, &mut closest) || hit_abd) {
            return false;
        }
        if !(closest < info.dist) {
            return false;
        }
        info.dist = closest;
        info.ip = ray.point(closest);
        // Which triangle was struck does not matter; the normal is blended
        // from the precomputed corner normals either way
        info.norm = self.normal_at(info.ip.x, info.ip.z);
        info.u = info.ip.x / self.width as f64;
        info.v = info.ip.z / self.depth as f64;
        info.dn_dx = Vec3::new(1.0, 0.0, 0.0);
        info.dn_dy = Vec3::new(0.0, 0.0, 1.0);
        true
    }
}

impl Intersectable for Heightfield {
    fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool {
        let entry = self.bbox.closest_intersection(ray);
        if entry == INF {
            return false;
        }

        let dist_horiz = (sqr(ray.dir.x) + sqr(ray.dir.z)).sqrt();
        if dist_horiz < 1e-12 {
            // A vertical ray only ever sees the column it starts over
            let x0 = ray.start.x.floor() as isize;
            let z0 = ray.start.z.floor() as isize;
            if x0 < 0 || x0 >= self.width as isize || z0 < 0 || z0 >= self.depth as isize {
                return false;
            }
            return self.intersect_cell(x0, z0, ray, info);
        }

        // Walk the grid cells the ray crosses; `step` covers one unit of
        // ground-plane distance per application
        let step = ray.dir / dist_horiz;
        let mut p = ray.point(entry + 1e-6);
        let mx = 1.0 / ray.dir.x;
        let mz = 1.0 / ray.dir.z;

        while self.bbox.inside(p) {
            let x0 = p.x.floor() as isize;
            let z0 = p.z.floor() as isize;
            if x0 < 0 || x0 >= self.width as isize || z0 < 0 || z0 >= self.depth as isize {
                break;
            }

            if !self.pyramid.is_empty() {
                // The largest 2^k stride that stays above everything the
                // pyramid records within its radius is safe to take whole
                let mut k = 1;
                while k < self.pyramid.len()
                    && p.y + step.y * f64::from(1u32 << k)
                        > f64::from(self.highest(&self.pyramid[k], x0, z0))
                {
                    k += 1;
                }
                k -= 1;
                if k > 0 {
                    p += step * f64::from(1u32 << k);
                    continue;
                }
            }

            // Ground-plane distance to the next x and z gridlines
            let lx = if ray.dir.x.abs() < 1e-12 {
                INF
            } else if ray.dir.x > 0.0 {
                (p.x.ceil() - p.x) * mx
            } else {
                (p.x.floor() - p.x) * mx
            };
            let lz = if ray.dir.z.abs() < 1e-12 {
                INF
            } else if ray.dir.z > 0.0 {
                (p.z.ceil() - p.z) * mz
            } else {
                (p.z.floor() - p.z) * mz
            };
            let p_next = p + step * (lx.min(lz) + 1e-6);

            // Only cells the segment actually dips into get triangle tests
            if p.y.min(p_next.y) < f64::from(self.cell_max[z0 as usize * self.width + x0 as usize])
            {
                if self.intersect_cell(x0, z0, ray, info) {
                    return true;
                }
            }
            p = p_next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::Rng;
    use rand_pcg::Pcg32;

    /// A rolling terrain with enough relief to exercise the skip pyramid.
    fn rolling_field(n: usize) -> Heightfield {
        let heights = (0..n * n)
            .map(|i| {
                let x = (i % n) as f32;
                let z = (i / n) as f32;
                ((x * 0.8).sin() * (z * 0.5).cos() + 1.0) * 1.5
            })
            .collect();
        Heightfield::new(heights, n, n)
    }

    /// Tests every cell's two triangles, no traversal.
    fn brute_force_hit(field: &Heightfield, ray: &Ray) -> Option<f64> {
        let mut closest = INF;
        for z0 in 0..field.depth as isize {
            for x0 in 0..field.width as isize {
                let mut info = IntersectionInfo::new();
                info.dist = closest;
                if field.intersect_cell(x0, z0, ray, &mut info) {
                    closest = info.dist;
                }
            }
        }
        (closest < INF).then_some(closest)
    }

    #[test]
    fn grid_walk_matches_brute_force() {
        let mut field = rolling_field(16);
        field.begin_render();

        let mut rng = Pcg32::new(0x5eed, 0);
        let mut hits = 0;
        for _ in 0..256 {
            let start = Vec3::new(
                rng.gen_range(-4.0..20.0),
                rng.gen_range(4.0..8.0),
                rng.gen_range(-4.0..20.0),
            );
            let target = Vec3::new(
                rng.gen_range(1.0..15.0),
                rng.gen_range(0.0..3.0),
                rng.gen_range(1.0..15.0),
            );
            let ray = Ray::new(start, (target - start).normalized());

            let mut info = IntersectionInfo::new();
            let walked = field.intersect(&ray, &mut info);
            let brute = brute_force_hit(&field, &ray);

            assert_eq!(walked, brute.is_some(), "ray {:?}", ray);
            if let Some(dist) = brute {
                hits += 1;
                assert_abs_diff_eq!(info.dist, dist, epsilon = 1e-9);
            }
        }
        assert!(hits > 0);
    }

    #[test]
    fn pyramid_skips_do_not_change_hits() {
        let mut with_pyramid = rolling_field(16);
        with_pyramid.use_pyramid = true;
        with_pyramid.begin_render();

        let mut plain = rolling_field(16);
        plain.use_pyramid = false;
        plain.begin_render();

        let mut rng = Pcg32::new(7, 0);
        for _ in 0..128 {
            let start = Vec3::new(
                rng.gen_range(-2.0..18.0),
                rng.gen_range(3.5..7.0),
                rng.gen_range(-2.0..18.0),
            );
            let target = Vec3::new(
                rng.gen_range(2.0..14.0),
                rng.gen_range(0.0..3.0),
                rng.gen_range(2.0..14.0),
            );
            let ray = Ray::new(start, (target - start).normalized());

            let mut info_fast = IntersectionInfo::new();
            let hit_fast = with_pyramid.intersect(&ray, &mut info_fast);
            let mut info_plain = IntersectionInfo::new();
            let hit_plain = plain.intersect(&ray, &mut info_plain);

            assert_eq!(hit_fast, hit_plain, "ray {:?}", ray);
            if hit_fast {
                assert_abs_diff_eq!(info_fast.dist, info_plain.dist, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn flat_field_shades_like_a_plane() {
        let mut field = Heightfield::new(vec![2.0; 8 * 8], 8, 8);
        field.begin_render();

        let ray = Ray::new(Vec3::new(3.5, 10.0, 3.5), Vec3::new(0.0, -1.0, 0.0));
        let mut info = IntersectionInfo::new();
        assert!(field.intersect(&ray, &mut info));
        assert_abs_diff_eq!(info.dist, 8.0, epsilon = 1e-6);
        assert_abs_diff_eq!(info.norm.y, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(info.u, 3.5 / 8.0, epsilon = 1e-9);
    }

    #[test]
    fn respects_a_closer_incoming_hit() {
        let mut field = Heightfield::new(vec![1.0; 8 * 8], 8, 8);
        field.begin_render();

        let ray = Ray::new(Vec3::new(4.0, 10.0, -5.0), Vec3::new(0.0, -0.6, 0.6).normalized());
        let mut info = IntersectionInfo::new();
        assert!(field.intersect(&ray, &mut info));

        let mut blocked = IntersectionInfo::new();
        blocked.dist = info.dist - 1.0;
        assert!(!field.intersect(&ray, &mut blocked));
        assert_abs_diff_eq!(blocked.dist, info.dist - 1.0, epsilon = 1e-12);
    }
}
