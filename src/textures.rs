use std::path::Path;

use image::Rgb32FImage;
use log::info;

use crate::color::Color;
use crate::geometry::IntersectionInfo;

/// Maps surface uv coordinates to an albedo.
pub trait Texture: Send + Sync {
    fn sample(&self, info: &IntersectionInfo) -> Color;
}

pub struct ConstantTexture {
    pub color: Color,
}

impl Texture for ConstantTexture {
    fn sample(&self, _info: &IntersectionInfo) -> Color {
        self.color
    }
}

pub struct CheckerTexture {
    pub color1: Color,
    pub color2: Color,
    pub scaling: f64,
}

impl CheckerTexture {
    pub fn new(color1: Color, color2: Color, scaling: f64) -> Self {
        Self {
            color1,
            color2,
            scaling,
        }
    }
}

impl Texture for CheckerTexture {
    fn sample(&self, info: &IntersectionInfo) -> Color {
        let x = (info.u / self.scaling).floor() as i64;
        let y = (info.v / self.scaling).floor() as i64;
        if (x + y) % 2 == 0 {
            self.color1
        } else {
            self.color2
        }
    }
}

/// An image-backed texture with bilinear filtering and wrap-around
/// addressing. Also usable as a heightfield for bump mapping through
/// [`BitmapTexture::differentials`].
pub struct BitmapTexture {
    image: Rgb32FImage,
    pub scaling: f64,
}

impl BitmapTexture {
    pub fn load(path: &Path, scaling: f64) -> crate::Result<Self> {
        let image = image::open(path)?.to_rgb32f();
        info!(
            "loaded texture {}: {}x{}",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self { image, scaling })
    }

    pub fn from_image(image: Rgb32FImage, scaling: f64) -> Self {
        Self { image, scaling }
    }

    fn texel(&self, x: i64, y: i64) -> Color {
        let x = x.rem_euclid(i64::from(self.image.width())) as u32;
        let y = y.rem_euclid(i64::from(self.image.height())) as u32;
        let p = self.image.get_pixel(x, y);
        Color::new(p[0], p[1], p[2])
    }

    fn filtered(&self, x: f64, y: f64) -> Color {
        let x = x - 0.5;
        let y = y - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = (x - x0) as f32;
        let fy = (y - y0) as f32;
        let x0 = x0 as i64;
        let y0 = y0 as i64;
        let top = self.texel(x0, y0) * (1.0 - fx) + self.texel(x0 + 1, y0) * fx;
        let bottom = self.texel(x0, y0 + 1) * (1.0 - fx) + self.texel(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Central-difference height slopes at (u, v), for bump mapping.
    pub fn differentials(&self, u: f64, v: f64) -> (f32, f32) {
        let x = (u * self.scaling).round() as i64;
        let y = (v * self.scaling).round() as i64;
        let dx = self.texel(x + 1, y).intensity() - self.texel(x - 1, y).intensity();
        let dy = self.texel(x, y + 1).intensity() - self.texel(x, y - 1).intensity();
        (dx, dy)
    }
}

impl Texture for BitmapTexture {
    fn sample(&self, info: &IntersectionInfo) -> Color {
        self.filtered(info.u * self.scaling, info.v * self.scaling)
    }
}

/// Perturbs shading normals from a heightmap's slopes along the surface's
/// texture-space differentials.
pub struct Bump {
    pub texture: std::sync::Arc<BitmapTexture>,
    pub strength: f64,
}

impl Bump {
    pub fn modify_normal(&self, info: &mut IntersectionInfo) {
        let (dx, dy) = self.texture.differentials(info.u, info.v);
        info.norm += (info.dn_dx * f64::from(dx) + info.dn_dy * f64::from(dy)) * self.strength;
        info.norm = info.norm.normalized();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn info_at(u: f64, v: f64) -> IntersectionInfo {
        let mut info = IntersectionInfo::new();
        info.u = u;
        info.v = v;
        info
    }

    #[test]
    fn checker_alternates() {
        let checker = CheckerTexture::new(Color::white(), Color::black(), 10.0);
        assert_eq!(checker.sample(&info_at(5.0, 5.0)), Color::white());
        assert_eq!(checker.sample(&info_at(15.0, 5.0)), Color::black());
        assert_eq!(checker.sample(&info_at(15.0, 15.0)), Color::white());
        // Negative coordinates continue the pattern, no mirroring seam
        assert_eq!(checker.sample(&info_at(-5.0, 5.0)), Color::black());
    }

    #[test]
    fn bitmap_filters_and_wraps() {
        let mut image = Rgb32FImage::new(2, 2);
        image.put_pixel(0, 0, image::Rgb([1.0, 1.0, 1.0]));
        image.put_pixel(1, 0, image::Rgb([0.0, 0.0, 0.0]));
        image.put_pixel(0, 1, image::Rgb([0.0, 0.0, 0.0]));
        image.put_pixel(1, 1, image::Rgb([1.0, 1.0, 1.0]));
        let texture = BitmapTexture::from_image(image, 1.0);

        // Texel centers reproduce the texels
        assert_abs_diff_eq!(texture.filtered(0.5, 0.5).r, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(texture.filtered(1.5, 0.5).r, 0.0, epsilon = 1e-6);
        // Halfway between the two top texels
        assert_abs_diff_eq!(texture.filtered(1.0, 0.5).r, 0.5, epsilon = 1e-6);
        // Wraps around past the right edge
        assert_abs_diff_eq!(texture.filtered(2.5, 0.5).r, 1.0, epsilon = 1e-6);
    }
}
