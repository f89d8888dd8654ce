use rand::Rng;

use crate::color::Color;
use crate::math::{sqr, Ray, Transform, Vec3};

/// Result of a ray/light intersection test. Only the emitting face
/// contributes radiance; the back face merely occludes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LightHit {
    Miss,
    /// The emitting face, closer than the incoming distance.
    Front,
    /// The non-emitting face, closer than the incoming distance.
    Back,
}

impl LightHit {
    pub fn hit(self) -> bool {
        self != LightHit::Miss
    }
}

/// A light source. Samples are drawn with the calling thread's own
/// generator so rendering stays reproducible under concurrency.
pub trait Light: Send + Sync {
    /// Total brightness of the lamp.
    fn color(&self) -> Color;

    /// How many samples properly evaluate this light with Monte Carlo.
    fn num_samples(&self) -> usize;

    /// The n-th sample (0 <= idx < num_samples()): a position on the light
    /// in world space and its brightness as seen from `shade_pos`
    /// (accounting for obliquity).
    fn nth_sample(&self, idx: usize, shade_pos: Vec3, rng: &mut dyn rand::RngCore) -> (Vec3, Color);

    /// Tests the ray against the light itself. On a hit closer than `dist`,
    /// updates `dist` and reports which face was struck.
    fn intersect(&self, ray: &Ray, dist: &mut f64) -> LightHit;

    /// A projected solid-angle estimate of the light as seen from `p`,
    /// 0 when the emitting side faces away.
    fn solid_angle(&self, p: Vec3) -> f64;
}

pub struct PointLight {
    pub pos: Vec3,
    pub color: Color,
    pub power: f32,
}

impl Light for PointLight {
    fn color(&self) -> Color {
        self.color * self.power
    }

    fn num_samples(&self) -> usize {
        1
    }

    fn nth_sample(
        &self,
        _idx: usize,
        _shade_pos: Vec3,
        _rng: &mut dyn rand::RngCore,
    ) -> (Vec3, Color) {
        (self.pos, self.color())
    }

    fn intersect(&self, _ray: &Ray, _dist: &mut f64) -> LightHit {
        // A point has no surface to hit
        LightHit::Miss
    }

    fn solid_angle(&self, _p: Vec3) -> f64 {
        0.0
    }
}

/// A rectangular area light: the canonical unit square at the origin of
/// its local frame, emitting along local -Y, placed by a transform.
pub struct RectLight {
    transform: Transform,
    color: Color,
    power: f32,
    x_subd: usize,
    y_subd: usize,
    area: f64,
}

impl RectLight {
    pub fn new(transform: Transform, color: Color, power: f32, x_subd: usize, y_subd: usize) -> Self {
        // Side lengths of the transformed unit square give the world area
        let a = transform.point(Vec3::new(0.5, 0.0, -0.5));
        let b = transform.point(Vec3::new(-0.5, 0.0, -0.5));
        let c = transform.point(Vec3::new(0.5, 0.0, 0.5));
        let area = a.dist(b) * a.dist(c);
        Self {
            transform,
            color,
            power,
            x_subd: x_subd.max(1),
            y_subd: y_subd.max(1),
            area,
        }
    }

    pub fn area(&self) -> f64 {
        self.area
    }
}

impl Light for RectLight {
    fn color(&self) -> Color {
        self.color * self.power
    }

    fn num_samples(&self) -> usize {
        self.x_subd * self.y_subd
    }

    fn nth_sample(&self, idx: usize, shade_pos: Vec3, rng: &mut dyn rand::RngCore) -> (Vec3, Color) {
        // Stratified jitter within the idx-th cell of the subdivision grid
        let lx = ((idx % self.x_subd) as f64 + rng.gen::<f64>()) / self.x_subd as f64;
        let ly = ((idx / self.x_subd) as f64 + rng.gen::<f64>()) / self.y_subd as f64;

        // Nudged slightly below the surface so shadow rays to the sample
        // do not graze the light's own plane
        let sample_pos = self
            .transform
            .point(Vec3::new(lx - 0.5, -1e-6, ly - 0.5));

        let local_shade = self.transform.undo_point(shade_pos);
        let color = if local_shade.y < 0.0 {
            // Obliquity: dimmer at grazing angles
            self.color() * ((-local_shade.y / local_shade.length()) as f32)
        } else {
            Color::black()
        };
        (sample_pos, color)
    }

    fn intersect(&self, ray: &Ray, dist: &mut f64) -> LightHit {
        let local = self.transform.undo_ray(ray);
        if local.dir.y.abs() < 1e-12 {
            return LightHit::Miss;
        }
        let to_plane = -(local.start.y / local.dir.y);
        if to_plane <= 0.0 {
            return LightHit::Miss;
        }
        let p = local.start + local.dir * to_plane;
        if p.x.abs() >= 0.5 || p.z.abs() >= 0.5 {
            return LightHit::Miss;
        }
        // Distance in world space; the local ray is unnormalized
        let world_dist = (self.transform.point(p) - ray.start).length();
        if world_dist >= *dist {
            return LightHit::Miss;
        }
        *dist = world_dist;
        if local.start.y < 0.0 {
            LightHit::Front
        } else {
            LightHit::Back
        }
    }

    fn solid_angle(&self, p: Vec3) -> f64 {
        let light_dir = self.transform.direction(Vec3::new(0.0, -1.0, 0.0));
        let light_pos = self.transform.point(Vec3::zeros());
        let to_p = p - light_pos;
        let cos_term = to_p.dot(light_dir);
        if cos_term < 0.0 {
            return 0.0;
        }
        let d = to_p.length();
        self.area * (cos_term / d) / sqr(1.0 + d)
    }
}
