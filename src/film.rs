use image::RgbImage;

use crate::color::Color;

/// A half-open rectangular frame region, the unit of parallel work.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn clip(&mut self, width: u32, height: u32) {
        self.x1 = self.x1.min(width);
        self.y1 = self.y1.min(height);
    }
}

pub const BUCKET_SIZE: u32 = 48;

/// Cuts the frame into buckets in boustrophedon order, so consecutive
/// dispatches touch adjacent image regions.
pub fn bucket_list(width: u32, height: u32, bucket_size: u32) -> Vec<Rect> {
    let columns = (width + bucket_size - 1) / bucket_size;
    let rows = (height + bucket_size - 1) / bucket_size;
    let mut buckets = Vec::with_capacity((columns * rows) as usize);
    for row in 0..rows {
        let make = |col: u32| {
            let mut rect = Rect::new(
                col * bucket_size,
                row * bucket_size,
                (col + 1) * bucket_size,
                (row + 1) * bucket_size,
            );
            rect.clip(width, height);
            rect
        };
        if row % 2 == 0 {
            buckets.extend((0..columns).map(make));
        } else {
            buckets.extend((0..columns).rev().map(make));
        }
    }
    buckets
}

/// The output pixel buffer. Written bucket by bucket under an external
/// lock; no two in-flight buckets overlap.
pub struct Film {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::black(); (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn at(&self, x: u32, y: u32) -> Color {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.pixels[(y * self.width + x) as usize] = color;
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn snapshot(&self) -> Vec<Color> {
        self.pixels.clone()
    }

    /// Copies a bucket-sized row-major buffer into place.
    pub fn blit(&mut self, rect: Rect, buffer: &[Color]) {
        debug_assert_eq!(buffer.len(), (rect.width() * rect.height()) as usize);
        for row in 0..rect.height() {
            let src = (row * rect.width()) as usize;
            let dst = ((rect.y0 + row) * self.width + rect.x0) as usize;
            self.pixels[dst..dst + rect.width() as usize]
                .copy_from_slice(&buffer[src..src + rect.width() as usize]);
        }
    }

    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            image::Rgb(self.at(x, y).to_srgb8())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_cover_every_pixel_exactly_once() {
        for (w, h) in [(640, 480), (100, 70), (48, 48), (47, 49), (1, 1)] {
            let buckets = bucket_list(w, h, BUCKET_SIZE);
            let mut counts = vec![0u32; (w * h) as usize];
            for rect in &buckets {
                for y in rect.y0..rect.y1 {
                    for x in rect.x0..rect.x1 {
                        counts[(y * w + x) as usize] += 1;
                    }
                }
            }
            assert!(counts.iter().all(|&c| c == 1), "{}x{}", w, h);
        }
    }

    #[test]
    fn buckets_zigzag_between_rows() {
        let buckets = bucket_list(144, 96, 48);
        // Row 0 runs left to right, row 1 comes back
        assert_eq!(buckets[0].x0, 0);
        assert_eq!(buckets[2].x0, 96);
        assert_eq!(buckets[3].x0, 96);
        assert_eq!(buckets[3].y0, 48);
        assert_eq!(buckets[5].x0, 0);
    }

    #[test]
    fn blit_writes_only_the_rect() {
        let mut film = Film::new(8, 8);
        let rect = Rect::new(2, 3, 5, 6);
        let buffer = vec![Color::white(); 9];
        film.blit(rect, &buffer);
        for y in 0..8 {
            for x in 0..8 {
                let inside = (2..5).contains(&x) && (3..6).contains(&y);
                let expected = if inside { Color::white() } else { Color::black() };
                assert_eq!(film.at(x, y), expected, "({}, {})", x, y);
            }
        }
    }
}
