use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use helios::camera::Camera;
use helios::color::Color;
use helios::expect;
use helios::geometry::{CsgKind, CsgOp, Cube, Plane, Sphere};
use helios::lights::RectLight;
use helios::math::{rotation, scaling, translation, Vec3};
use helios::renderer::Renderer;
use helios::scene::{Node, Scene, Settings};
use helios::shading::{Lambert, Phong, Reflection, Refraction};
use helios::textures::{CheckerTexture, ConstantTexture};

fn setup_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(std::fs::File::create("helios.log")?)
        .apply()?;
    Ok(())
}

/// A showcase scene: a checkered floor, a carved cube, a mirror ball and a
/// glass ball under a rectangular ceiling lamp.
fn demo_scene(settings: Settings) -> Scene {
    let camera = Camera {
        pos: Vec3::new(0.0, 60.0, -120.0),
        pitch: -15.0,
        fov: 90.0,
        ..Camera::default()
    };
    let mut scene = Scene::new(camera, settings);

    scene.nodes.push(Node::new(
        Arc::new(Plane {
            y: 0.0,
            limit: Some(200.0),
        }),
        Arc::new(Lambert {
            texture: Arc::new(CheckerTexture::new(
                Color::new(0.7, 0.7, 0.7),
                Color::new(0.15, 0.15, 0.25),
                25.0,
            )),
        }),
    ));

    let carved = CsgOp::new(
        CsgKind::Difference,
        Arc::new(Cube {
            center: Vec3::zeros(),
            half_side: 20.0,
        }),
        Arc::new(Sphere {
            center: Vec3::zeros(),
            radius: 26.0,
        }),
    );
    scene.nodes.push(
        Node::new(
            Arc::new(carved),
            Arc::new(Phong {
                texture: Arc::new(ConstantTexture {
                    color: Color::new(0.8, 0.3, 0.2),
                }),
                specular_multiplier: 0.6,
                exponent: 64.0,
            }),
        )
        .with_transform(
            rotation(0.5, 0.0, 0.0).then(&translation(Vec3::new(-45.0, 20.0, 20.0))),
        ),
    );

    scene.nodes.push(
        Node::new(
            Arc::new(Sphere {
                center: Vec3::zeros(),
                radius: 18.0,
            }),
            Arc::new(Reflection::mirror(Color::new(0.9, 0.9, 0.9))),
        )
        .with_transform(translation(Vec3::new(10.0, 18.0, 35.0))),
    );

    scene.nodes.push(
        Node::new(
            Arc::new(Sphere {
                center: Vec3::zeros(),
                radius: 14.0,
            }),
            Arc::new(Refraction {
                color: Color::new(0.95, 0.95, 0.95),
                ior: 1.5,
            }),
        )
        .with_transform(translation(Vec3::new(45.0, 14.0, -10.0))),
    );

    scene.lights.push(Arc::new(RectLight::new(
        scaling(40.0, 1.0, 40.0).then(&translation(Vec3::new(0.0, 180.0, 0.0))),
        Color::white(),
        20000.0,
        3,
        3,
    )));

    scene
}

fn main() {
    if let Err(why) = setup_logger() {
        panic!("{}", why);
    }

    let settings = match std::env::args().nth(1) {
        Some(path) => expect!(
            Settings::load(Path::new(&path)),
            "Failed to load render settings"
        ),
        None => Settings {
            frame_width: 800,
            frame_height: 600,
            ambient_light: Color::new(0.08, 0.08, 0.1),
            background_color: Color::new(0.05, 0.06, 0.09),
            ..Settings::default()
        },
    };

    let renderer = Renderer::new(demo_scene(settings));
    if !renderer.render() {
        warn!("render was cancelled, writing the partial frame");
    }

    let film = renderer.film();
    let film = film.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    expect!(film.to_image().save("render.png"), "Failed to write render.png");
    info!("wrote render.png");
}
