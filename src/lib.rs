pub mod bbox;
pub mod camera;
pub mod color;
pub mod film;
pub mod geometry;
pub mod integrator;
pub mod lights;
mod macros;
pub mod math;
pub mod renderer;
pub mod scene;
pub mod shading;
pub mod textures;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
