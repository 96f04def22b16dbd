#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
//! Demo of the label surface pipeline in theia-rs.
//!
//! Builds a synthetic head scan and a tumor mask with three of its four label
//! values present, attaches both to a scene, then adjusts thresholds,
//! smoothing and appearance the way an interactive control panel would.
//!
//! Run with `RUST_LOG=debug` to see each pipeline stage. An optional argument
//! names a JSON options file.

use theia::{
    ColorMode, InMemorySource, Options, PipelineController, Result, Scene, SurfaceChange, UVec3,
    Vec3,
};

const N: u32 = 48;

fn head_scan() -> InMemorySource {
    let center = Vec3::splat((N - 1) as f32 / 2.0);
    let radii = Vec3::new(20.0, 22.0, 18.0);
    let mut values = Vec::with_capacity((N * N * N) as usize);
    for k in 0..N {
        for j in 0..N {
            for i in 0..N {
                let p = (Vec3::new(i as f32, j as f32, k as f32) - center) / radii;
                // Bright tissue falling off towards the skull
                values.push((60.0 * (1.0 - p.length())).max(0.0));
            }
        }
    }
    InMemorySource::new(
        "head.nii.gz",
        UVec3::splat(N),
        Vec3::splat(0.9),
        Vec3::ZERO,
        values,
    )
}

fn tumor_mask() -> InMemorySource {
    let blobs = [
        (1.0, Vec3::new(18.0, 24.0, 24.0), 6.0),
        (2.0, Vec3::new(30.0, 22.0, 26.0), 4.5),
        // Label 3 never occurs
        (4.0, Vec3::new(24.0, 32.0, 18.0), 3.5),
    ];
    let mut values = Vec::with_capacity((N * N * N) as usize);
    for k in 0..N {
        for j in 0..N {
            for i in 0..N {
                let p = Vec3::new(i as f32, j as f32, k as f32);
                let label = blobs
                    .iter()
                    .find(|(_, c, r)| p.distance(*c) <= *r)
                    .map_or(0.0, |&(label, _, _)| label);
                values.push(label);
            }
        }
    }
    InMemorySource::new(
        "tumor_mask.nii.gz",
        UVec3::splat(N),
        Vec3::splat(0.9),
        Vec3::ZERO,
        values,
    )
}

fn describe(object: &PipelineController) {
    println!("{}:", object.name());
    for view in object.views() {
        let triangles = view.mesh.map_or(0, |m| m.num_triangles());
        println!(
            "  label {:>2} {:?} enabled={} iso={} smoothing={} opacity={:.2} triangles={}",
            view.id,
            view.presence,
            view.enabled,
            view.isovalue,
            view.smoothing_iterations,
            view.opacity,
            triangles
        );
    }
}

fn report(what: &str, change: &SurfaceChange) {
    match change {
        SurfaceChange::Rebuilt(report) => println!(
            "{what}: rebuilt via {:?} -> {} triangles",
            report.stages, report.triangles
        ),
        other => println!("{what}: {other:?}"),
    }
}

fn main() -> Result<()> {
    theia::init();

    let options = match std::env::args().nth(1) {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    let mut scene = Scene::new(options)?;

    let head = scene.attach_intensity(&head_scan())?;
    describe(head);
    let change = head.set_isovalue(0, 35.0)?;
    report("head threshold 20 -> 35", &change);
    let change = head.set_opacity(0, 0.5)?;
    report("head opacity 0.2 -> 0.5", &change);

    let mask = scene.attach_segmentation(&tumor_mask())?;
    if let Some(detection) = mask.detection() {
        println!(
            "present labels {:?}, absent labels {:?}",
            detection.present, detection.absent
        );
    }
    describe(mask);

    let change = mask.set_smoothing_iterations(1, 50)?;
    report("label 1 smoothing 500 -> 50", &change);
    let change = mask.set_enabled(3, true)?;
    report("enable absent label 3", &change);
    let recolored = mask.set_color_mode(ColorMode::Single(Vec3::new(1.0, 0.6, 0.2)))?;
    println!("single color mode recolored labels {recolored:?}");

    let events = mask.drain_events();
    println!("{} surface events queued", events.len());

    if let Some(mesh) = mask.label(2)?.mesh() {
        println!(
            "label 2 upload: {} vertex bytes, {} index bytes",
            mesh.vertex_bytes().len(),
            mesh.index_bytes().len()
        );
    }

    for object in scene.objects() {
        describe(object);
    }
    Ok(())
}
