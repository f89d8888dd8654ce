mod thread_pool;

pub use thread_pool::ThreadPool;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::info;
use rand::Rng;
use rand_pcg::Pcg32;

use crate::color::Color;
use crate::film::{bucket_list, Film, Rect, BUCKET_SIZE};
use crate::integrator::Tracer;
use crate::scene::Scene;
use crate::shading::unit_disc_sample;

/// Invoked with the film lock held after each finished bucket, for
/// progressive display.
pub type BucketCallback = dyn Fn(Rect, &Film) + Send + Sync;

/// Side of the square blocks used by the foveated and coarse passes.
const DEGRADE_BLOCK: u32 = 8;

/// Sample positions within a degraded block, in pixels.
const BLOCK_SAMPLES: [(f64, f64); 5] = [
    (4.0, 4.0),
    (1.5, 1.5),
    (6.5, 1.5),
    (1.5, 6.5),
    (6.5, 6.5),
];

/// Drives a full frame: splits it into buckets, hands them to the thread
/// pool pass by pass and assembles the film. Pass order is sequenced by
/// the pool's barrier semantics alone.
pub struct Renderer {
    scene: Arc<Scene>,
    film: Arc<Mutex<Film>>,
    pool: ThreadPool,
    cancel: Arc<AtomicBool>,
    bucket_done: Option<Arc<BucketCallback>>,
    fovea_center: (f64, f64),
}

impl Renderer {
    pub fn new(mut scene: Scene) -> Self {
        scene.begin_frame();
        let (width, height) = (scene.settings.frame_width, scene.settings.frame_height);

        if scene.camera.dof && scene.camera.auto_focus {
            autofocus(&mut scene);
        }

        let pool = ThreadPool::new(scene.settings.thread_count());
        Self {
            scene: Arc::new(scene),
            film: Arc::new(Mutex::new(Film::new(width, height))),
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
            bucket_done: None,
            fovea_center: (f64::from(width) / 2.0, f64::from(height) / 2.0),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Flag checked between buckets; setting it makes `render` wind down
    /// at bucket granularity and report incompletion.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn set_bucket_callback(&mut self, callback: Arc<BucketCallback>) {
        self.bucket_done = Some(callback);
    }

    /// Point of interest for foveated degradation, in pixel coordinates.
    pub fn set_fovea_center(&mut self, x: f64, y: f64) {
        self.fovea_center = (x, y);
    }

    pub fn film(&self) -> Arc<Mutex<Film>> {
        Arc::clone(&self.film)
    }

    /// Renders the frame. Returns false if the render was cancelled;
    /// whatever buckets completed are intact in the film either way.
    pub fn render(&self) -> bool {
        let settings = &self.scene.settings;
        let start = Instant::now();
        let monte_carlo = self.scene.camera.dof || settings.gi;
        info!(
            "rendering {}x{} on {} threads ({})",
            settings.frame_width,
            settings.frame_height,
            self.pool.thread_count(),
            if monte_carlo {
                "stochastic"
            } else {
                "adaptive"
            },
        );

        let buckets = Arc::new(bucket_list(
            settings.frame_width,
            settings.frame_height,
            BUCKET_SIZE,
        ));
        let mut pass_seq = 0;

        if settings.want_prepass && !monte_carlo {
            self.coarse_pass(&mut pass_seq, &buckets);
        }
        if monte_carlo {
            self.monte_carlo_pass(&mut pass_seq, &buckets);
        } else {
            self.base_pass(&mut pass_seq, &buckets);
            if settings.want_aa && !self.cancel.load(Ordering::Relaxed) {
                self.refinement_passes(&mut pass_seq, &buckets);
            }
        }

        let cancelled = self.cancel.load(Ordering::Relaxed);
        info!(
            "render {} in {:.2}s",
            if cancelled { "cancelled" } else { "complete" },
            start.elapsed().as_secs_f64()
        );
        !cancelled
    }

    /// Claims buckets off a shared cursor until they run out or a cancel
    /// is observed. Each thread samples from its own deterministic stream.
    fn run_pass<F>(&self, pass_seq: &mut u64, bucket_count: usize, body: F)
    where
        F: Fn(usize, &mut Pcg32) + Send + Sync + 'static,
    {
        let cursor = Arc::new(AtomicUsize::new(0));
        let cancel = Arc::clone(&self.cancel);
        let seed = self.scene.settings.seed;
        let threads = self.pool.thread_count() as u64;
        let pass = *pass_seq;
        *pass_seq += 1;

        self.pool.run(move |thread_idx| {
            let mut rng = Pcg32::new(seed, pass * threads + thread_idx as u64);
            loop {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                if idx >= bucket_count {
                    break;
                }
                body(idx, &mut rng);
            }
        });
    }

    fn commit_bucket(
        film: &Mutex<Film>,
        bucket_done: &Option<Arc<BucketCallback>>,
        rect: Rect,
        buffer: &[Color],
    ) {
        let mut film = match film.lock() {
            Ok(film) => film,
            Err(poisoned) => poisoned.into_inner(),
        };
        film.blit(rect, buffer);
        if let Some(callback) = bucket_done {
            callback(rect, &film);
        }
    }

    /// One sample per pixel, with distant blocks degraded when a fovea
    /// radius is configured.
    fn base_pass(&self, pass_seq: &mut u64, buckets: &Arc<Vec<Rect>>) {
        let scene = Arc::clone(&self.scene);
        let film = Arc::clone(&self.film);
        let bucket_done = self.bucket_done.clone();
        let buckets = Arc::clone(buckets);
        let cancel = Arc::clone(&self.cancel);
        let fovea = if scene.settings.fovea_radius > 0.0 {
            Some((self.fovea_center, scene.settings.fovea_radius))
        } else {
            None
        };

        self.run_pass(pass_seq, buckets.len(), move |idx, rng| {
            let rect = buckets[idx];
            let tracer = Tracer::new(&scene);
            let mut buffer = vec![Color::black(); (rect.width() * rect.height()) as usize];

            match fovea {
                Some((center, radius)) => {
                    render_foveated(&tracer, rect, rng, center, radius, &cancel, &mut buffer);
                }
                None => {
                    for y in rect.y0..rect.y1 {
                        for x in rect.x0..rect.x1 {
                            let ray = scene.camera.screen_ray(f64::from(x), f64::from(y), 0.0);
                            let i = ((y - rect.y0) * rect.width() + (x - rect.x0)) as usize;
                            buffer[i] = tracer.raytrace(&ray, rng);
                        }
                    }
                }
            }
            Self::commit_bucket(&film, &bucket_done, rect, &buffer);
        });
    }

    /// Fast preview: one sample per block, broadcast across it. Cheap
    /// enough that cancellation mid-bucket is acceptable.
    fn coarse_pass(&self, pass_seq: &mut u64, buckets: &Arc<Vec<Rect>>) {
        let scene = Arc::clone(&self.scene);
        let film = Arc::clone(&self.film);
        let bucket_done = self.bucket_done.clone();
        let buckets = Arc::clone(buckets);
        let cancel = Arc::clone(&self.cancel);

        self.run_pass(pass_seq, buckets.len(), move |idx, rng| {
            let rect = buckets[idx];
            let tracer = Tracer::new(&scene);
            let samples = scene.settings.prepass_samples.max(1);
            let mut buffer = vec![Color::black(); (rect.width() * rect.height()) as usize];

            'rows: for by in (rect.y0..rect.y1).step_by(DEGRADE_BLOCK as usize) {
                if cancel.load(Ordering::Relaxed) {
                    break 'rows;
                }
                for bx in (rect.x0..rect.x1).step_by(DEGRADE_BLOCK as usize) {
                    let mut sum = Color::black();
                    for _ in 0..samples {
                        let x = f64::from(bx) + rng.gen::<f64>() * f64::from(DEGRADE_BLOCK);
                        let y = f64::from(by) + rng.gen::<f64>() * f64::from(DEGRADE_BLOCK);
                        let ray = scene.camera.screen_ray(x, y, 0.0);
                        sum += tracer.raytrace(&ray, rng);
                    }
                    fill_block(&mut buffer, rect, bx, by, sum / samples as f32);
                }
            }
            Self::commit_bucket(&film, &bucket_done, rect, &buffer);
        });
    }

    /// Fixed-count stochastic sampling for depth of field and global
    /// illumination; jittered primaries anti-alias on their own.
    fn monte_carlo_pass(&self, pass_seq: &mut u64, buckets: &Arc<Vec<Rect>>) {
        let scene = Arc::clone(&self.scene);
        let film = Arc::clone(&self.film);
        let bucket_done = self.bucket_done.clone();
        let buckets = Arc::clone(buckets);

        self.run_pass(pass_seq, buckets.len(), move |idx, rng| {
            let rect = buckets[idx];
            let tracer = Tracer::new(&scene);
            let samples = scene.settings.num_samples.max(1);
            let dof = scene.camera.dof;
            let gi = scene.settings.gi;
            let mut buffer = vec![Color::black(); (rect.width() * rect.height()) as usize];

            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    let mut sum = Color::black();
                    for _ in 0..samples {
                        let sx = f64::from(x) + rng.gen::<f64>();
                        let sy = f64::from(y) + rng.gen::<f64>();
                        let ray = if dof {
                            let (u, v) = unit_disc_sample(rng);
                            scene.camera.dof_screen_ray(sx, sy, u, v, 0.0)
                        } else {
                            scene.camera.screen_ray(sx, sy, 0.0)
                        };
                        sum += if gi {
                            tracer.pathtrace(&ray, Color::white(), rng)
                        } else {
                            tracer.raytrace(&ray, rng)
                        };
                    }
                    let i = ((y - rect.y0) * rect.width() + (x - rect.x0)) as usize;
                    buffer[i] = sum / samples as f32;
                }
            }
            Self::commit_bucket(&film, &bucket_done, rect, &buffer);
        });
    }

    /// Adaptive anti-aliasing on top of the base pass: flag pixels whose
    /// clamped color differs from any 8-neighbor by more than the
    /// threshold, then refine only those with extra jittered samples.
    fn refinement_passes(&self, pass_seq: &mut u64, buckets: &Arc<Vec<Rect>>) {
        let width = self.scene.settings.frame_width;
        let height = self.scene.settings.frame_height;
        let snapshot: Arc<Vec<Color>> = {
            let film = match self.film.lock() {
                Ok(film) => film,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::new(film.snapshot())
        };
        let flags: Arc<Vec<AtomicBool>> = Arc::new(
            (0..(width * height) as usize)
                .map(|_| AtomicBool::new(false))
                .collect(),
        );

        {
            let snapshot = Arc::clone(&snapshot);
            let flags = Arc::clone(&flags);
            let buckets = Arc::clone(buckets);
            let threshold = self.scene.settings.aa_threshold;
            self.run_pass(pass_seq, buckets.len(), move |idx, _rng| {
                let rect = buckets[idx];
                for y in rect.y0..rect.y1 {
                    for x in rect.x0..rect.x1 {
                        if edge_pixel(&snapshot, width, height, x, y, threshold) {
                            flags[(y * width + x) as usize].store(true, Ordering::Relaxed);
                        }
                    }
                }
            });
        }

        let scene = Arc::clone(&self.scene);
        let film = Arc::clone(&self.film);
        let bucket_done = self.bucket_done.clone();
        let buckets = Arc::clone(buckets);
        self.run_pass(pass_seq, buckets.len(), move |idx, rng| {
            let rect = buckets[idx];
            let tracer = Tracer::new(&scene);
            let mut refined: Vec<(u32, u32, Color)> = Vec::new();
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    if !flags[(y * width + x) as usize].load(Ordering::Relaxed) {
                        continue;
                    }
                    // The base sample plus four jittered ones
                    let mut sum = snapshot[(y * width + x) as usize];
                    for _ in 0..4 {
                        let sx = f64::from(x) + rng.gen::<f64>();
                        let sy = f64::from(y) + rng.gen::<f64>();
                        let ray = scene.camera.screen_ray(sx, sy, 0.0);
                        sum += tracer.raytrace(&ray, rng);
                    }
                    refined.push((x, y, sum / 5.0));
                }
            }
            if refined.is_empty() {
                return;
            }
            let mut film = match film.lock() {
                Ok(film) => film,
                Err(poisoned) => poisoned.into_inner(),
            };
            for &(x, y, color) in &refined {
                film.set(x, y, color);
            }
            if let Some(callback) = &bucket_done {
                callback(rect, &film);
            }
        });
    }
}

/// Sets the camera's focal plane to whatever the frame center sees.
fn autofocus(scene: &mut Scene) {
    let ray = scene.camera.screen_ray(
        f64::from(scene.settings.frame_width) / 2.0,
        f64::from(scene.settings.frame_height) / 2.0,
        0.0,
    );
    let ctx = Tracer::new(scene).raycast(&ray);
    if ctx.node.is_some() {
        info!("autofocus: focal plane at {:.2}", ctx.info.dist);
        scene.camera.focal_plane_dist = ctx.info.dist;
    }
}

/// Per 8x8 block: full per-pixel quality inside the fovea radius, five
/// fixed samples broadcast to the whole block outside it.
fn render_foveated(
    tracer: &Tracer,
    rect: Rect,
    rng: &mut Pcg32,
    center: (f64, f64),
    radius: f64,
    cancel: &AtomicBool,
    buffer: &mut [Color],
) {
    let camera = &tracer.scene().camera;
    let half = f64::from(DEGRADE_BLOCK) / 2.0;
    'rows: for by in (rect.y0..rect.y1).step_by(DEGRADE_BLOCK as usize) {
        if cancel.load(Ordering::Relaxed) {
            break 'rows;
        }
        for bx in (rect.x0..rect.x1).step_by(DEGRADE_BLOCK as usize) {
            let dist = ((f64::from(bx) + half - center.0).powi(2)
                + (f64::from(by) + half - center.1).powi(2))
            .sqrt();
            if dist <= radius {
                for y in by..(by + DEGRADE_BLOCK).min(rect.y1) {
                    for x in bx..(bx + DEGRADE_BLOCK).min(rect.x1) {
                        let ray = camera.screen_ray(f64::from(x), f64::from(y), 0.0);
                        buffer[((y - rect.y0) * rect.width() + (x - rect.x0)) as usize] =
                            tracer.raytrace(&ray, rng);
                    }
                }
            } else {
                let mut sum = Color::black();
                for (ox, oy) in BLOCK_SAMPLES {
                    let ray = camera.screen_ray(f64::from(bx) + ox, f64::from(by) + oy, 0.0);
                    sum += tracer.raytrace(&ray, rng);
                }
                fill_block(buffer, rect, bx, by, sum / BLOCK_SAMPLES.len() as f32);
            }
        }
    }
}

fn fill_block(buffer: &mut [Color], rect: Rect, bx: u32, by: u32, color: Color) {
    for y in by..(by + DEGRADE_BLOCK).min(rect.y1) {
        for x in bx..(bx + DEGRADE_BLOCK).min(rect.x1) {
            buffer[((y - rect.y0) * rect.width() + (x - rect.x0)) as usize] = color;
        }
    }
}

/// Any channel of the clamped color differing from an 8-neighbor by more
/// than the threshold marks an edge.
fn edge_pixel(
    pixels: &[Color],
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    threshold: f32,
) -> bool {
    let center = pixels[(y * width + x) as usize].clamped();
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                continue;
            }
            let neighbor = pixels[(ny as u32 * width + nx as u32) as usize].clamped();
            if (center.r - neighbor.r).abs() > threshold
                || (center.g - neighbor.g).abs() > threshold
                || (center.b - neighbor.b).abs() > threshold
            {
                return true;
            }
        }
    }
    false
}
