use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::color::Color;
use crate::geometry::{Intersectable, IntersectionInfo};
use crate::lights::Light;
use crate::math::{Ray, Transform};
use crate::shading::Shader;
use crate::textures::Bump;

fn default_max_trace_depth() -> u32 {
    8
}
fn default_aa_threshold() -> f32 {
    0.1
}
fn default_num_samples() -> usize {
    40
}
fn default_prepass_samples() -> usize {
    5
}

/// Global render settings, loadable from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub background_color: Color,
    pub ambient_light: Color,
    #[serde(default = "default_max_trace_depth")]
    pub max_trace_depth: u32,
    pub want_aa: bool,
    #[serde(default = "default_aa_threshold")]
    pub aa_threshold: f32,
    /// Monte Carlo samples per pixel in DOF/GI mode.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// Samples per bucket for the coarse preview pass.
    #[serde(default = "default_prepass_samples")]
    pub prepass_samples: usize,
    pub want_prepass: bool,
    /// Full-quality radius in pixels around the tracked point; 0 renders
    /// everything at full quality.
    pub fovea_radius: f64,
    /// 0 uses all hardware threads.
    pub n_threads: usize,
    pub gi: bool,
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            background_color: Color::black(),
            ambient_light: Color::black(),
            max_trace_depth: default_max_trace_depth(),
            want_aa: true,
            aa_threshold: default_aa_threshold(),
            num_samples: default_num_samples(),
            prepass_samples: default_prepass_samples(),
            want_prepass: false,
            fovea_radius: 0.0,
            n_threads: 0,
            gi: false,
            seed: 42,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn thread_count(&self) -> usize {
        if self.n_threads == 0 {
            num_cpus::get()
        } else {
            self.n_threads
        }
    }
}

/// An instance: shared geometry placed in the world by a transform and
/// shaded by a shared shader. Many nodes may reference one geometry.
pub struct Node {
    pub geometry: Arc<dyn Intersectable>,
    pub shader: Arc<dyn Shader>,
    pub transform: Transform,
    pub bump: Option<Bump>,
}

impl Node {
    pub fn new(geometry: Arc<dyn Intersectable>, shader: Arc<dyn Shader>) -> Self {
        Self {
            geometry,
            shader,
            transform: Transform::identity(),
            bump: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_bump(mut self, bump: Bump) -> Self {
        self.bump = Some(bump);
        self
    }

    /// Intersects in the geometry's local space, then maps the hit back to
    /// the world. The distance is recomputed from world-space points since
    /// the local parametric distance is wrong under non-uniform scale.
    pub fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool {
        let local_ray = self.transform.undo_ray(ray);
        let dir_scale = local_ray.dir.length();
        let local_ray = Ray {
            dir: local_ray.dir / dir_scale,
            ..local_ray
        };

        // The geometry compares against info.dist, which is in world
        // units; map it into local units for the comparison to hold
        let mut local_info = IntersectionInfo {
            dist: info.dist * dir_scale,
            ..IntersectionInfo::new()
        };
        if !self.geometry.intersect(&local_ray, &mut local_info) {
            return false;
        }

        *info = local_info;
        info.ip = self.transform.point(info.ip);
        info.norm = self.transform.normal(info.norm).normalized();
        info.dist = info.ip.dist(ray.start);
        true
    }
}

/// The renderable world: nodes, lights, a camera and global settings.
pub struct Scene {
    pub nodes: Vec<Node>,
    pub lights: Vec<Arc<dyn Light>>,
    pub camera: Camera,
    pub settings: Settings,
}

impl Scene {
    pub fn new(camera: Camera, settings: Settings) -> Self {
        Self {
            nodes: Vec::new(),
            lights: Vec::new(),
            camera,
            settings,
        }
    }

    /// Final fixups once the scene is assembled, before the first ray.
    pub fn begin_frame(&mut self) {
        let (w, h) = (self.settings.frame_width, self.settings.frame_height);
        self.camera.aspect_ratio = f64::from(w) / f64::from(h);
        self.camera.begin_frame(w, h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Sphere;
    use crate::math::{scaling, translation, Vec3};
    use crate::shading::Lambert;
    use crate::textures::ConstantTexture;
    use approx::assert_abs_diff_eq;

    fn gray() -> Arc<dyn Shader> {
        Arc::new(Lambert {
            texture: Arc::new(ConstantTexture {
                color: Color::new(0.5, 0.5, 0.5),
            }),
        })
    }

    #[test]
    fn node_transform_consistency() {
        let sphere: Arc<dyn Intersectable> = Arc::new(Sphere {
            center: Vec3::zeros(),
            radius: 1.0,
        });
        let transform = scaling(2.0, 2.0, 2.0).then(&translation(Vec3::new(5.0, 0.0, 0.0)));
        let node = Node::new(sphere.clone(), gray()).with_transform(transform);

        let ray = Ray::new(Vec3::new(5.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 1.0));
        let mut info = IntersectionInfo::new();
        assert!(node.intersect(&ray, &mut info));

        // Same hit via manual transform round-trip
        let local_ray = transform.undo_ray(&ray);
        let local_ray = Ray::new(local_ray.start, local_ray.dir.normalized());
        let mut local_info = IntersectionInfo::new();
        assert!(sphere.intersect(&local_ray, &mut local_info));
        let expected_ip = transform.point(local_info.ip);

        assert_abs_diff_eq!(info.ip.x, expected_ip.x, epsilon = 1e-9);
        assert_abs_diff_eq!(info.ip.y, expected_ip.y, epsilon = 1e-9);
        assert_abs_diff_eq!(info.ip.z, expected_ip.z, epsilon = 1e-9);
        // World distance: ray start to the scaled sphere's near surface
        assert_abs_diff_eq!(info.dist, 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(info.norm.z, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn node_respects_incoming_distance() {
        let sphere: Arc<dyn Intersectable> = Arc::new(Sphere {
            center: Vec3::zeros(),
            radius: 1.0,
        });
        let node = Node::new(sphere, gray())
            .with_transform(translation(Vec3::new(0.0, 0.0, 10.0)));
        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));

        let mut info = IntersectionInfo::new();
        info.dist = 5.0;
        assert!(!node.intersect(&ray, &mut info));
        assert_abs_diff_eq!(info.dist, 5.0, epsilon = 1e-12);

        let mut info = IntersectionInfo::new();
        assert!(node.intersect(&ray, &mut info));
        assert_abs_diff_eq!(info.dist, 9.0, epsilon = 1e-9);
    }

    #[test]
    fn settings_parse_from_yaml() {
        let yaml = "
frame_width: 320
frame_height: 240
gi: true
num_samples: 16
background_color: { r: 0.1, g: 0.2, b: 0.3 }
";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.frame_width, 320);
        assert!(settings.gi);
        assert_eq!(settings.num_samples, 16);
        assert_eq!(settings.max_trace_depth, 8);
        assert_abs_diff_eq!(settings.background_color.b, 0.3, epsilon = 1e-6);
    }
}
