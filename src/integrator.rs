use rand::{Rng, RngCore};

use crate::color::Color;
use crate::geometry::IntersectionInfo;
use crate::lights::LightHit;
use crate::math::{Ray, RayFlags, Vec3};
use crate::scene::{Node, Scene};

/// Sentinel for runaway reflective/refractive chains; deliberately loud.
pub const OVERFLOW_COLOR: Color = Color {
    r: 1.0,
    g: 0.0,
    b: 1.0,
};

/// Paths dimmer than this are cut without Russian roulette. A deliberate
/// bias/variance tradeoff kept for output parity with reference renders.
const PATH_INTENSITY_CUTOFF: f32 = 0.001;

const SHADOW_BIAS: f64 = 1e-3;

/// Closest hit found for one traced ray.
pub struct TraceContext<'a> {
    pub info: IntersectionInfo,
    pub node: Option<&'a Node>,
}

/// Light transport over an immutable scene. Shared freely across worker
/// threads; every sampling decision draws from the caller's generator.
pub struct Tracer<'a> {
    scene: &'a Scene,
}

impl<'a> Tracer<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &Scene {
        self.scene
    }

    /// Closest node hit across the whole node list. A linear scan; per-mesh
    /// acceleration lives inside the geometries themselves.
    pub fn raycast(&self, ray: &Ray) -> TraceContext<'a> {
        let mut ctx = TraceContext {
            info: IntersectionInfo::new(),
            node: None,
        };
        for node in &self.scene.nodes {
            if node.intersect(ray, &mut ctx.info) {
                ctx.node = Some(node);
            }
        }
        ctx
    }

    /// Checks whether the ray reaches a light before the closest node hit.
    fn closer_light_hit(&self, ray: &Ray, node_dist: f64) -> Option<(LightHit, Color)> {
        let mut dist = node_dist;
        let mut hit = None;
        for light in &self.scene.lights {
            match light.intersect(ray, &mut dist) {
                LightHit::Miss => (),
                face => hit = Some((face, light.color())),
            }
        }
        hit
    }

    /// Whitted-style recursive tracing.
    pub fn raytrace(&self, ray: &Ray, rng: &mut dyn RngCore) -> Color {
        if ray.depth > self.scene.settings.max_trace_depth {
            return OVERFLOW_COLOR;
        }

        let mut ctx = self.raycast(ray);
        if let Some((face, color)) = self.closer_light_hit(ray, ctx.info.dist) {
            // The back face occludes but does not emit
            return if face == LightHit::Front {
                color
            } else {
                Color::black()
            };
        }

        let Some(node) = ctx.node else {
            return self.scene.settings.background_color;
        };
        if let Some(bump) = &node.bump {
            bump.modify_normal(&mut ctx.info);
        }
        node.shader.shade(self, ray, &ctx.info, rng)
    }

    /// Unidirectional path tracing with next-event estimation. The running
    /// `path_multiplier` is the throughput accumulated along the path so
    /// far; rays flagged as diffuse bounces skip light emission they would
    /// otherwise double-count.
    pub fn pathtrace(&self, ray: &Ray, path_multiplier: Color, rng: &mut dyn RngCore) -> Color {
        if ray.depth > self.scene.settings.max_trace_depth {
            return Color::black();
        }
        if path_multiplier.intensity() < PATH_INTENSITY_CUTOFF {
            return Color::black();
        }

        let mut ctx = self.raycast(ray);
        if let Some((face, color)) = self.closer_light_hit(ray, ctx.info.dist) {
            let counted_explicitly = ray.flags.contains(RayFlags::DIFFUSE);
            return if face == LightHit::Front && !counted_explicitly {
                color * path_multiplier
            } else {
                Color::black()
            };
        }

        let Some(node) = ctx.node else {
            return self.scene.settings.background_color * path_multiplier;
        };
        if let Some(bump) = &node.bump {
            bump.modify_normal(&mut ctx.info);
        }
        let info = &ctx.info;

        let mut result = Color::black();

        // Next-event estimation: one uniformly chosen light, one sample on
        // it, weighted by 1 / (pChooseLight * pHitLight)
        let num_lights = self.scene.lights.len();
        if num_lights > 0 {
            let light = &self.scene.lights[rng.gen_range(0..num_lights)];
            let sample_idx = rng.gen_range(0..light.num_samples());
            let (light_pos, _) = light.nth_sample(sample_idx, info.ip, rng);
            let solid_angle = light.solid_angle(info.ip);
            let shadow_start = info.ip + info.norm.faceforward(ray.dir) * 1e-6;
            if solid_angle > 0.0 && self.visible(shadow_start, light_pos) {
                let w_out = (light_pos - info.ip).normalized();
                let brdf = node.shader.eval(info, ray, w_out);
                let weight = (num_lights as f64 * solid_angle) as f32;
                result += light.color() * brdf * weight * path_multiplier;
            }
        }

        // Stochastic continuation through the BRDF
        if let Some(sample) = node.shader.spawn_ray(info, ray, rng) {
            if sample.pdf > 0.0 {
                let throughput = path_multiplier * sample.color / sample.pdf as f32;
                result += self.pathtrace(&sample.ray, throughput, rng);
            }
        }
        result
    }

    /// Shadow test: nothing, node or light, lies strictly between `a`
    /// and `b`.
    pub fn visible(&self, a: Vec3, b: Vec3) -> bool {
        let max_dist = a.dist(b) - SHADOW_BIAS;
        let mut ray = Ray::new(a, (b - a).normalized());
        ray.flags = RayFlags::SHADOW;

        let mut info = IntersectionInfo::new();
        info.dist = max_dist;
        for node in &self.scene.nodes {
            if node.intersect(&ray, &mut info) {
                return false;
            }
        }
        let mut dist = max_dist;
        for light in &self.scene.lights {
            if light.intersect(&ray, &mut dist).hit() {
                return false;
            }
        }
        true
    }
}
