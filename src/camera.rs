use serde::{Deserialize, Serialize};

use crate::math::{rotation, Ray, Vec3};

fn default_aspect() -> f64 {
    4.0 / 3.0
}
fn default_fov() -> f64 {
    90.0
}
fn default_f_number() -> f64 {
    2.0
}
fn default_focal_plane() -> f64 {
    100.0
}

/// A pinhole camera with an optional thin lens for depth of field.
/// Angles are in degrees. [`Camera::begin_frame`] must run before any
/// rays are generated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub pos: Vec3,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    #[serde(default = "default_aspect")]
    pub aspect_ratio: f64,
    #[serde(default = "default_fov")]
    pub fov: f64,
    pub dof: bool,
    #[serde(default = "default_f_number")]
    pub f_number: f64,
    #[serde(default = "default_focal_plane")]
    pub focal_plane_dist: f64,
    pub auto_focus: bool,
    pub stereo_separation: f64,

    #[serde(skip)]
    pub top_left: Vec3,
    #[serde(skip)]
    pub top_right: Vec3,
    #[serde(skip)]
    pub bottom_left: Vec3,
    #[serde(skip)]
    pub up_dir: Vec3,
    #[serde(skip)]
    pub right_dir: Vec3,
    #[serde(skip)]
    pub front_dir: Vec3,
    #[serde(skip)]
    pub width: f64,
    #[serde(skip)]
    pub height: f64,
    #[serde(skip)]
    pub aperture_size: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pos: Vec3::zeros(),
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            aspect_ratio: default_aspect(),
            fov: default_fov(),
            dof: false,
            f_number: default_f_number(),
            focal_plane_dist: default_focal_plane(),
            auto_focus: false,
            stereo_separation: 0.0,
            top_left: Vec3::zeros(),
            top_right: Vec3::zeros(),
            bottom_left: Vec3::zeros(),
            up_dir: Vec3::zeros(),
            right_dir: Vec3::zeros(),
            front_dir: Vec3::zeros(),
            width: 0.0,
            height: 0.0,
            aperture_size: 0.0,
        }
    }
}

impl Camera {
    /// Sets up the view frame for the given image resolution. The image
    /// plane corners start one unit in front of the camera, get scaled so
    /// the diagonal half-angle matches `fov`, then rotated and translated
    /// to the camera position.
    pub fn begin_frame(&mut self, frame_width: u32, frame_height: u32) {
        self.width = f64::from(frame_width);
        self.height = f64::from(frame_height);

        let corner_dist = Vec3::new(-self.aspect_ratio, 1.0, 1.0).dist(Vec3::new(0.0, 0.0, 1.0));
        let wanted = (self.fov / 2.0).to_radians().tan();
        let m = wanted / corner_dist;

        let rot = rotation(
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            self.roll.to_radians(),
        );
        self.top_left = rot.direction(Vec3::new(-self.aspect_ratio * m, m, 1.0)) + self.pos;
        self.top_right = rot.direction(Vec3::new(self.aspect_ratio * m, m, 1.0)) + self.pos;
        self.bottom_left = rot.direction(Vec3::new(-self.aspect_ratio * m, -m, 1.0)) + self.pos;

        self.up_dir = (self.top_left - self.bottom_left).normalized();
        self.right_dir = (self.top_right - self.top_left).normalized();
        self.front_dir = self.right_dir.cross(self.up_dir);

        self.aperture_size = 2.5 / self.f_number;
    }

    /// A primary ray through pixel coordinates (x, y). `stereo_offset`
    /// shifts the eye along the right axis in units of the stereo
    /// separation; pass 0.0 for mono rendering.
    pub fn screen_ray(&self, x: f64, y: f64, stereo_offset: f64) -> Ray {
        let through = self.top_left
            + (self.top_right - self.top_left) * (x / self.width)
            + (self.bottom_left - self.top_left) * (y / self.height);
        let mut start = self.pos;
        if stereo_offset != 0.0 {
            start += self.right_dir * (stereo_offset * self.stereo_separation);
        }
        Ray::new(start, (through - self.pos).normalized())
    }

    /// A depth-of-field ray: the pinhole ray is extended to the focal
    /// plane and re-aimed from a point (u, v) on the lens aperture.
    /// (u, v) are expected in [-1, 1).
    pub fn dof_screen_ray(&self, x: f64, y: f64, u: f64, v: f64, stereo_offset: f64) -> Ray {
        let pinhole = self.screen_ray(x, y, stereo_offset);
        let to_focal = self.focal_plane_dist / self.front_dir.dot(pinhole.dir);
        let target = pinhole.start + pinhole.dir * to_focal;
        let start =
            self.pos + self.right_dir * (u * self.aperture_size) + self.up_dir * (v * self.aperture_size);
        Ray::new(start, (target - start).normalized())
    }

    pub fn front_dir(&self) -> Vec3 {
        self.front_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_camera() -> Camera {
        let mut camera = Camera {
            pos: Vec3::new(0.0, 60.0, -120.0),
            ..Camera::default()
        };
        camera.begin_frame(800, 600);
        camera
    }

    #[test]
    fn center_ray_points_forward() {
        let camera = test_camera();
        let ray = camera.screen_ray(400.0, 300.0, 0.0);
        assert_eq!(ray.start, camera.pos);
        assert_abs_diff_eq!(ray.dir.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ray.dir.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ray.dir.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn corner_rays_span_the_fov() {
        let camera = test_camera();
        let top_left = camera.screen_ray(0.0, 0.0, 0.0);
        let bottom_right = camera.screen_ray(800.0, 600.0, 0.0);
        // Diagonal half-angle equals fov / 2
        let half = top_left.dir.dot(camera.front_dir()).acos();
        assert_abs_diff_eq!(half.to_degrees(), 45.0, epsilon = 1e-9);
        // The frame is symmetric around the optical axis
        assert_abs_diff_eq!(top_left.dir.x, -bottom_right.dir.x, epsilon = 1e-9);
        assert_abs_diff_eq!(top_left.dir.y, -bottom_right.dir.y, epsilon = 1e-9);
    }

    #[test]
    fn dof_rays_converge_on_the_focal_plane() {
        let mut camera = test_camera();
        camera.focal_plane_dist = 50.0;
        camera.begin_frame(800, 600);

        let pinhole = camera.screen_ray(213.0, 117.0, 0.0);
        let to_focal = camera.focal_plane_dist / camera.front_dir().dot(pinhole.dir);
        let target = pinhole.start + pinhole.dir * to_focal;

        for (u, v) in [(-0.9, 0.3), (0.5, -0.5), (0.0, 0.99)] {
            let lens_ray = camera.dof_screen_ray(213.0, 117.0, u, v, 0.0);
            let t = (target - lens_ray.start).length();
            let reach = lens_ray.point(t);
            assert_abs_diff_eq!(reach.x, target.x, epsilon = 1e-9);
            assert_abs_diff_eq!(reach.y, target.y, epsilon = 1e-9);
            assert_abs_diff_eq!(reach.z, target.z, epsilon = 1e-9);
        }
    }

    #[test]
    fn stereo_offset_shifts_the_eye() {
        let mut camera = test_camera();
        camera.stereo_separation = 2.0;
        camera.begin_frame(800, 600);
        let left = camera.screen_ray(400.0, 300.0, -1.0);
        let right = camera.screen_ray(400.0, 300.0, 1.0);
        assert_abs_diff_eq!((right.start - left.start).length(), 4.0, epsilon = 1e-9);
    }
}
