use std::f64::consts::PI;
use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::color::Color;
use crate::geometry::IntersectionInfo;
use crate::integrator::Tracer;
use crate::math::{Ray, RayFlags, Vec3};
use crate::textures::Texture;

/// A stochastic BRDF continuation for path tracing.
pub struct BrdfSample {
    pub ray: Ray,
    /// BRDF value along the sampled direction, cosine included.
    pub color: Color,
    /// Probability density of the sampled direction; <= 0 kills the path.
    pub pdf: f64,
}

/// Surface material. `shade` drives Whitted-style tracing and may recurse
/// through the tracer; `eval` and `spawn_ray` form the BRDF surface used
/// by the path tracer.
pub trait Shader: Send + Sync {
    fn shade(
        &self,
        tracer: &Tracer,
        ray: &Ray,
        info: &IntersectionInfo,
        rng: &mut dyn RngCore,
    ) -> Color;

    /// BRDF value for light arriving along `w_out` at a hit reached via
    /// `w_in`, cosine term included. Zero for purely specular shaders.
    fn eval(&self, _info: &IntersectionInfo, _w_in: &Ray, _w_out: Vec3) -> Color {
        Color::black()
    }

    /// Samples a continuation direction. `None` means the path ends here
    /// (e.g. total internal reflection).
    fn spawn_ray(
        &self,
        _info: &IntersectionInfo,
        _w_in: &Ray,
        _rng: &mut dyn RngCore,
    ) -> Option<BrdfSample> {
        None
    }
}

/// Uniform direction on the hemisphere around `normal`.
fn hemisphere_sample(normal: Vec3, rng: &mut dyn RngCore) -> Vec3 {
    let u: f64 = rng.gen();
    let v: f64 = rng.gen();
    let theta = 2.0 * PI * u;
    let cos_phi = 2.0 * v - 1.0;
    let sin_phi = (1.0 - cos_phi * cos_phi).sqrt();
    let dir = Vec3::new(theta.cos() * sin_phi, cos_phi, theta.sin() * sin_phi);
    if dir.dot(normal) < 0.0 {
        -dir
    } else {
        dir
    }
}

/// Sums stratified direct lighting from every scene light, shadow-tested.
/// Shared by the diffuse shaders.
fn direct_lighting(
    tracer: &Tracer,
    info: &IntersectionInfo,
    rng: &mut dyn RngCore,
    mut contribution: impl FnMut(Vec3, Color, f64),
) {
    let shadow_start = info.ip + info.norm * 1e-6;
    for light in tracer.scene().lights.iter() {
        let num_samples = light.num_samples();
        for idx in 0..num_samples {
            let (light_pos, light_color) = light.nth_sample(idx, info.ip, rng);
            if light_color.intensity() == 0.0 || !tracer.visible(shadow_start, light_pos) {
                continue;
            }
            let mut to_light = light_pos - info.ip;
            let dist_sqr = to_light.length_sqr();
            to_light = to_light.normalized();
            let cos_angle = to_light.dot(info.norm);
            if cos_angle > 0.0 {
                contribution(
                    to_light,
                    light_color / (dist_sqr as f32 * num_samples as f32),
                    cos_angle,
                );
            }
        }
    }
}

pub struct Lambert {
    pub texture: Arc<dyn Texture>,
}

impl Shader for Lambert {
    fn shade(
        &self,
        tracer: &Tracer,
        _ray: &Ray,
        info: &IntersectionInfo,
        rng: &mut dyn RngCore,
    ) -> Color {
        let diffuse = self.texture.sample(info);
        let mut result = diffuse * tracer.scene().settings.ambient_light;
        direct_lighting(tracer, info, rng, |_, light, cos_angle| {
            result += diffuse * light * cos_angle as f32;
        });
        result
    }

    fn eval(&self, info: &IntersectionInfo, w_in: &Ray, w_out: Vec3) -> Color {
        let normal = info.norm.faceforward(w_in.dir);
        let cos_angle = w_out.dot(normal).max(0.0);
        self.texture.sample(info) * ((cos_angle / PI) as f32)
    }

    fn spawn_ray(
        &self,
        info: &IntersectionInfo,
        w_in: &Ray,
        rng: &mut dyn RngCore,
    ) -> Option<BrdfSample> {
        let normal = info.norm.faceforward(w_in.dir);
        let dir = hemisphere_sample(normal, rng);
        let mut ray = Ray::new(info.ip + normal * 1e-6, dir);
        ray.depth = w_in.depth + 1;
        ray.flags = w_in.flags | RayFlags::DIFFUSE;
        Some(BrdfSample {
            ray,
            color: self.texture.sample(info) * ((dir.dot(normal) / PI) as f32),
            pdf: 1.0 / (2.0 * PI),
        })
    }
}

pub struct Phong {
    pub texture: Arc<dyn Texture>,
    pub specular_multiplier: f32,
    pub exponent: f64,
}

impl Shader for Phong {
    fn shade(
        &self,
        tracer: &Tracer,
        ray: &Ray,
        info: &IntersectionInfo,
        rng: &mut dyn RngCore,
    ) -> Color {
        let diffuse = self.texture.sample(info);
        let mut result = diffuse * tracer.scene().settings.ambient_light;
        let view = -ray.dir;
        direct_lighting(tracer, info, rng, |to_light, light, cos_angle| {
            result += diffuse * light * cos_angle as f32;
            let reflected = info.norm.reflect(-to_light);
            let cos_spec = reflected.dot(view).max(0.0);
            result += light * (cos_spec.powf(self.exponent) as f32 * self.specular_multiplier);
        });
        result
    }

    fn eval(&self, info: &IntersectionInfo, w_in: &Ray, w_out: Vec3) -> Color {
        let normal = info.norm.faceforward(w_in.dir);
        let cos_angle = w_out.dot(normal).max(0.0);
        if cos_angle == 0.0 {
            return Color::black();
        }
        let reflected = normal.reflect(w_in.dir);
        let cos_spec = reflected.dot(w_out).max(0.0);
        let specular =
            cos_spec.powf(self.exponent) * (self.exponent + 2.0) / (2.0 * PI) * cos_angle;
        self.texture.sample(info) * ((cos_angle / PI) as f32)
            + Color::white() * (specular as f32 * self.specular_multiplier)
    }

    fn spawn_ray(
        &self,
        info: &IntersectionInfo,
        w_in: &Ray,
        rng: &mut dyn RngCore,
    ) -> Option<BrdfSample> {
        // Importance sampling the specular lobe is not worth it at these
        // exponents; sample diffusely and let eval carry the highlight
        let normal = info.norm.faceforward(w_in.dir);
        let dir = hemisphere_sample(normal, rng);
        let mut ray = Ray::new(info.ip + normal * 1e-6, dir);
        ray.depth = w_in.depth + 1;
        ray.flags = w_in.flags | RayFlags::DIFFUSE;
        Some(BrdfSample {
            ray,
            color: self.eval(info, w_in, dir),
            pdf: 1.0 / (2.0 * PI),
        })
    }
}

pub struct Reflection {
    pub color: Color,
    /// 1.0 is a perfect mirror; lower values blur the reflection.
    pub glossiness: f64,
    pub num_samples: usize,
}

impl Reflection {
    pub fn mirror(color: Color) -> Self {
        Self {
            color,
            glossiness: 1.0,
            num_samples: 25,
        }
    }
}

impl Shader for Reflection {
    fn shade(
        &self,
        tracer: &Tracer,
        ray: &Ray,
        info: &IntersectionInfo,
        rng: &mut dyn RngCore,
    ) -> Color {
        let normal = info.norm.faceforward(ray.dir);
        if self.glossiness >= 1.0 {
            let mut reflected = Ray::new(info.ip + normal * 1e-6, normal.reflect(ray.dir));
            reflected.depth = ray.depth + 1;
            return tracer.raytrace(&reflected, rng) * self.color;
        }

        // Glossy: average mirror reflections off a jittered normal. Deep
        // rays get fewer samples, their contribution is already attenuated
        let count = if ray.depth == 0 { self.num_samples } else { 2 };
        let (u_axis, v_axis) = normal.orthonormal_basis();
        let scaling = ((1.0 - self.glossiness) * PI / 2.0).tan();
        let mut sum = Color::black();
        for _ in 0..count {
            let (x, y) = unit_disc_sample(rng);
            let jittered = (normal + u_axis * (x * scaling) + v_axis * (y * scaling)).normalized();
            let mut reflected = Ray::new(info.ip + normal * 1e-6, jittered.reflect(ray.dir));
            reflected.depth = ray.depth + 1;
            sum += tracer.raytrace(&reflected, rng) * self.color;
        }
        sum / count as f32
    }

    fn spawn_ray(
        &self,
        info: &IntersectionInfo,
        w_in: &Ray,
        _rng: &mut dyn RngCore,
    ) -> Option<BrdfSample> {
        let normal = info.norm.faceforward(w_in.dir);
        let mut ray = Ray::new(info.ip + normal * 1e-6, normal.reflect(w_in.dir));
        ray.depth = w_in.depth + 1;
        ray.flags = w_in.flags;
        Some(BrdfSample {
            ray,
            color: self.color,
            pdf: 1.0,
        })
    }
}

pub struct Refraction {
    pub color: Color,
    /// Index of refraction of the medium behind the surface.
    pub ior: f64,
}

impl Refraction {
    fn refracted(&self, ray: &Ray, info: &IntersectionInfo) -> Option<Ray> {
        // Entering vs leaving the medium flips the normal and the ratio
        let (normal, eta) = if ray.dir.dot(info.norm) < 0.0 {
            (info.norm, 1.0 / self.ior)
        } else {
            (-info.norm, self.ior)
        };
        let dir = normal.refract(ray.dir, eta)?;
        let mut refracted = Ray::new(info.ip - normal * 1e-6, dir);
        refracted.depth = ray.depth + 1;
        refracted.flags = ray.flags;
        Some(refracted)
    }
}

impl Shader for Refraction {
    fn shade(
        &self,
        tracer: &Tracer,
        ray: &Ray,
        info: &IntersectionInfo,
        rng: &mut dyn RngCore,
    ) -> Color {
        match self.refracted(ray, info) {
            Some(refracted) => tracer.raytrace(&refracted, rng) * self.color,
            // Total internal reflection
            None => Color::black(),
        }
    }

    fn spawn_ray(
        &self,
        info: &IntersectionInfo,
        w_in: &Ray,
        _rng: &mut dyn RngCore,
    ) -> Option<BrdfSample> {
        let ray = self.refracted(w_in, info)?;
        Some(BrdfSample {
            ray,
            color: self.color,
            pdf: 1.0,
        })
    }
}

/// Rejection-sampled point on the unit disc, for lens and glossy jitter.
pub(crate) fn unit_disc_sample(rng: &mut dyn RngCore) -> (f64, f64) {
    loop {
        let x: f64 = rng.gen_range(-1.0..1.0);
        let y: f64 = rng.gen_range(-1.0..1.0);
        if x * x + y * y <= 1.0 {
            return (x, y);
        }
    }
}
