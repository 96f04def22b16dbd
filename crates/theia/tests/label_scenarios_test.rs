//! End-to-end behaviour of attached objects, driven through the public API only.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use theia::*;

const N: u32 = 16;

fn node(i: u32, j: u32, k: u32) -> usize {
    (i + N * (j + N * k)) as usize
}

/// A 16^3 mask holding labels 1, 2 and 4 in separate blocks. No voxel is 3.
fn mask_source() -> InMemorySource {
    let mut values = vec![0.0; (N * N * N) as usize];
    let blocks: [(f32, u32, u32); 3] = [(1.0, 1, 5), (2.0, 6, 10), (4.0, 11, 15)];
    for &(label, lo, hi) in &blocks {
        for k in 2..7 {
            for j in 2..7 {
                for i in lo..hi {
                    values[node(i, j, k)] = label;
                }
            }
        }
    }
    InMemorySource::new("mask.nii", UVec3::splat(N), Vec3::ONE, Vec3::ZERO, values)
}

/// A 16^3 scan whose 200 level set is a sphere of radius 5.
fn scan_source() -> InMemorySource {
    let center = Vec3::splat(7.63);
    let grid = VolumeGrid::from_fn(UVec3::splat(N), Vec3::ONE, Vec3::ZERO, |i, j, k| {
        let p = Vec3::new(i as f32, j as f32, k as f32);
        400.0 - 40.0 * p.distance(center)
    })
    .unwrap();
    InMemorySource::new(
        "scan.nii",
        grid.dims(),
        grid.spacing(),
        grid.origin(),
        grid.values().to_vec(),
    )
}

fn scan_preset(smoothing_iterations: u32) -> ObjectPreset {
    ObjectPreset {
        kind: ObjectKind::Intensity,
        isovalue: 200.0,
        smoothing_iterations,
        opacity: 1.0,
        colors: vec![Vec3::ONE],
    }
}

fn mesh_of(controller: &PipelineController, id: u32) -> LabelMesh {
    controller.label(id).unwrap().mesh().unwrap().clone()
}

#[test]
fn test_missing_label_scenario() {
    theia::init_logging();
    let mut scene = Scene::default();
    let mask = scene.attach_segmentation(&mask_source()).unwrap();

    assert_eq!(mask.label_set().grid().scalar_range(), (0.0, 4.0));
    let ids: Vec<u32> = mask.label_set().labels().iter().map(Label::id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let detection = mask.detection().unwrap();
    assert_eq!(detection.present, vec![1, 2, 4]);
    assert_eq!(detection.absent, vec![3]);

    let renderable: Vec<u32> = mask.label_set().renderable_labels().map(Label::id).collect();
    assert_eq!(renderable, vec![1, 2, 4]);

    assert_eq!(mask.set_enabled(3, true).unwrap(), SurfaceChange::Unchanged);
    let three = mask.label(3).unwrap();
    assert_eq!(three.presence(), Presence::Absent);
    assert!(!three.is_renderable());
    assert!(three.mesh().is_none());
}

#[test]
fn test_absent_label_rejects_geometry_changes() {
    let mut scene = Scene::default();
    let mask = scene.attach_segmentation(&mask_source()).unwrap();

    assert!(matches!(
        mask.set_smoothing_iterations(3, 10),
        Err(TheiaError::LabelAbsent { label: 3, .. })
    ));
    assert!(matches!(
        mask.set_isovalue(7, 1.0),
        Err(TheiaError::LabelNotFound { label: 7, .. })
    ));
}

#[test]
fn test_smoothing_change_keeps_topology() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(50)).unwrap();
    let before = mesh_of(scan, 0);
    assert!(!before.is_empty());

    let change = scan.set_smoothing_iterations(0, 500).unwrap();
    let SurfaceChange::Rebuilt(report) = change else {
        panic!("expected a rebuild");
    };
    assert_eq!(report.stages, vec![Stage::Smooth, Stage::Normals]);

    let after = mesh_of(scan, 0);
    assert_eq!(after.num_vertices(), before.num_vertices());
    assert_eq!(after.num_triangles(), before.num_triangles());
    assert_eq!(after.triangles(), before.triangles());
    assert_ne!(after.positions(), before.positions());
    assert_eq!(scan.label(0).unwrap().smoothing_iterations(), 500);
}

#[test]
fn test_smoothing_only_matches_full_rebuild() {
    let mut scene = Scene::default();
    scene.attach(&scan_source(), &scan_preset(50)).unwrap();
    let scan = scene.require_mut("scan.nii").unwrap();
    scan.set_smoothing_iterations(0, 120).unwrap();
    let incremental = mesh_of(scan, 0);

    let mut fresh = Scene::default();
    let direct = fresh.attach(&scan_source(), &scan_preset(120)).unwrap();
    assert_eq!(mesh_of(direct, 0).positions(), incremental.positions());
}

#[test]
fn test_appearance_changes_keep_geometry() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(20)).unwrap();
    let before = mesh_of(scan, 0);

    assert_eq!(scan.set_opacity(0, 0.4).unwrap(), SurfaceChange::Appearance);
    assert_eq!(scan.set_color(0, Vec3::new(0.2, 0.5, 0.9)).unwrap(), SurfaceChange::Appearance);
    assert_eq!(scan.set_opacity(0, 0.4).unwrap(), SurfaceChange::Unchanged);

    let after = mesh_of(scan, 0);
    assert_eq!(after.positions(), before.positions());
    assert_eq!(after.triangles(), before.triangles());
    assert_eq!(after.appearance().opacity, 0.4);
    assert_eq!(after.appearance().color, Vec3::new(0.2, 0.5, 0.9));
}

#[test]
fn test_invalid_settings_leave_state_untouched() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(20)).unwrap();
    let before = mesh_of(scan, 0);

    assert!(matches!(
        scan.set_opacity(0, 1.5),
        Err(TheiaError::InvalidConfig { field: "opacity", .. })
    ));
    assert!(matches!(
        scan.set_isovalue(0, f32::NAN),
        Err(TheiaError::InvalidConfig { .. })
    ));
    assert!(matches!(
        scan.set_smoothing_iterations(0, 10_000),
        Err(TheiaError::InvalidConfig { .. })
    ));

    let label = scan.label(0).unwrap();
    assert_eq!(label.opacity(), 1.0);
    assert_eq!(label.isovalue(), 200.0);
    assert_eq!(label.smoothing_iterations(), 20);
    assert_eq!(mesh_of(scan, 0), before);
}

#[test]
fn test_isovalue_change_runs_full_pipeline() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(20)).unwrap();
    let before = mesh_of(scan, 0);

    let change = scan.set_isovalue(0, 120.0).unwrap();
    let SurfaceChange::Rebuilt(report) = change else {
        panic!("expected a rebuild");
    };
    assert_eq!(
        report.stages,
        vec![Stage::Extract, Stage::Simplify, Stage::Smooth, Stage::Normals]
    );

    // A lower threshold encloses a larger sphere
    let (lo_before, hi_before) = before.bounding_box().unwrap();
    let (lo_after, hi_after) = mesh_of(scan, 0).bounding_box().unwrap();
    assert!((hi_after - lo_after).x > (hi_before - lo_before).x);

    assert_eq!(scan.set_isovalue(0, 120.0).unwrap(), SurfaceChange::Unchanged);
}

#[test]
fn test_out_of_range_isovalue_gives_empty_surface() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(20)).unwrap();

    let change = scan.set_isovalue(0, 1000.0).unwrap();
    let SurfaceChange::Rebuilt(report) = change else {
        panic!("expected a rebuild");
    };
    assert_eq!(report.triangles, 0);
    assert_eq!(report.extracted_triangles, Some(0));

    let label = scan.label(0).unwrap();
    assert_eq!(label.state(), LabelState::Built);
    assert!(label.mesh().is_some_and(LabelMesh::is_empty));
    assert!(!label.is_renderable());

    // Coming back into range restores a surface
    scan.set_isovalue(0, 200.0).unwrap();
    assert!(scan.label(0).unwrap().is_renderable());
}

#[test]
fn test_events_follow_changes() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(20)).unwrap();
    let initial = scan.drain_events();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].kind, SurfaceEventKind::GeometryChanged);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    scan.subscribe(move |event| sink.lock().unwrap().push(event.kind));

    scan.set_opacity(0, 0.5).unwrap();
    scan.set_enabled(0, false).unwrap();
    scan.set_smoothing_iterations(0, 30).unwrap();

    let expected = vec![
        SurfaceEventKind::AppearanceChanged,
        SurfaceEventKind::VisibilityChanged,
        SurfaceEventKind::GeometryChanged,
    ];
    assert_eq!(*seen.lock().unwrap(), expected);
    let queued: Vec<SurfaceEventKind> = scan.drain_events().iter().map(|e| e.kind).collect();
    assert_eq!(queued, expected);
}

#[test]
fn test_detection_is_deterministic() {
    let options = Options::default();
    let grid = Arc::new(mask_source().load().unwrap());
    let pipeline = SurfacePipeline::from_options(ExtractionMode::Discrete, &options).unwrap();

    for strategy in [ProbeStrategy::CellScan, ProbeStrategy::FullPipeline] {
        let detector = MissingLabelDetector::new(strategy, true);
        let mut first =
            LabelSet::segmentation("a", Arc::clone(&grid), &options.segmentation, &options)
                .unwrap();
        let mut second =
            LabelSet::segmentation("b", Arc::clone(&grid), &options.segmentation, &options)
                .unwrap();

        let a = detector.detect(&mut first, &pipeline);
        let b = detector.detect(&mut second, &pipeline);
        assert_eq!(a, b);
        assert_eq!(detector.detect(&mut first, &pipeline), a);
        assert_eq!(a.absent, vec![3]);
    }
}

#[test]
fn test_newer_request_wins() {
    let mut scene = Scene::default();
    let scan = scene.attach(&scan_source(), &scan_preset(20)).unwrap();
    let pipeline = scan.pipeline().clone();

    let older = scan.request_rebuild(0, 150.0, 20).unwrap();
    let newer = scan.request_rebuild(0, 250.0, 20).unwrap();
    assert!(older.is_superseded());
    assert_eq!(scan.label(0).unwrap().state(), LabelState::Stale);

    let worker_pipeline = pipeline.clone();
    let newer_result = std::thread::spawn(move || newer.run(&worker_pipeline))
        .join()
        .unwrap();
    let older_result = older.run(&pipeline);
    assert!(matches!(older_result.outcome(), JobOutcome::Cancelled));

    assert!(matches!(scan.complete(newer_result).unwrap(), SurfaceChange::Rebuilt(_)));
    let committed = mesh_of(scan, 0);
    assert_eq!(scan.complete(older_result).unwrap(), SurfaceChange::Unchanged);

    let label = scan.label(0).unwrap();
    assert_eq!(label.isovalue(), 250.0);
    assert_eq!(label.state(), LabelState::Built);
    assert_eq!(mesh_of(scan, 0), committed);
}

#[test]
fn test_set_wide_controls() {
    let mut scene = Scene::default();
    let mask = scene.attach_segmentation(&mask_source()).unwrap();
    let before: Vec<usize> = [1, 2, 4]
        .iter()
        .map(|&id| mesh_of(mask, id).num_triangles())
        .collect();

    let changed = mask.set_opacity_all(0.3).unwrap();
    assert_eq!(changed, vec![1, 2, 3, 4]);

    let changed = mask.set_color_mode(ColorMode::Single(Vec3::new(1.0, 0.0, 0.0))).unwrap();
    assert!(!changed.contains(&1));

    let rebuilt = mask.set_smoothing_all(100).unwrap();
    let ids: Vec<u32> = rebuilt.iter().map(|&(id, _)| id).collect();
    assert_eq!(ids, vec![1, 2, 4]);

    for (&id, &triangles) in [1, 2, 4].iter().zip(&before) {
        let view = mask.label(id).unwrap().view();
        assert_eq!(view.opacity, 0.3);
        assert_eq!(view.color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(view.smoothing_iterations, 100);
        assert_eq!(view.mesh.unwrap().num_triangles(), triangles);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_appearance_never_touches_geometry(
        opacity in 0.0f32..=1.0,
        r in 0.0f32..=1.0,
        g in 0.0f32..=1.0,
        b in 0.0f32..=1.0,
    ) {
        let mut scene = Scene::default();
        let scan = scene.attach(&scan_source(), &scan_preset(10)).unwrap();
        let before = mesh_of(scan, 0);

        let change = scan.set_opacity(0, opacity).unwrap();
        prop_assert!(!matches!(change, SurfaceChange::Rebuilt(_)));
        scan.set_color(0, Vec3::new(r, g, b)).unwrap();

        let after = mesh_of(scan, 0);
        prop_assert_eq!(after.positions(), before.positions());
        prop_assert_eq!(after.triangles(), before.triangles());
        prop_assert_eq!(after.appearance().opacity, opacity);
    }
}
