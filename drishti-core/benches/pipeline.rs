//! Benchmark route planning and per-frame annotation.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use drishti_core::annotate::Annotator;
use drishti_core::camera::{CameraCalibration, build_intrinsics, project_bounding_box};
use drishti_core::core::{BoundingBox, Location, Rotation, Transform};
use drishti_core::route::{CoveragePlanner, PlannerConfig};
use drishti_core::sim::mock::town::{GridSpec, MockTown};
use drishti_core::sim::{ActorCategory, ActorSnapshot, TrafficLight};

fn bench_route_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_planning");
    let planner = CoveragePlanner::new(PlannerConfig::default());

    for town in ["Town01", "Town02", "Town10HD"] {
        let spec = GridSpec::for_town(town).unwrap();
        let network = MockTown::generate(&spec, 2.0).network;
        group.bench_with_input(BenchmarkId::new("plan", town), &network, |b, network| {
            b.iter(|| planner.plan(black_box(network), None).unwrap())
        });
    }
    group.finish();
}

fn bench_projection(c: &mut Criterion) {
    let k = build_intrinsics(1920, 1080, 90.0).unwrap();
    let camera = Transform::new(Location::new(0.0, 0.0, 2.5), Rotation::from_yaw(10.0));
    let bbox = BoundingBox::axis_aligned(Location::ZERO, Location::new(0.2, 0.35, 0.55));
    let boxes: Vec<_> = (0..256)
        .map(|i| {
            let actor = Transform::new(
                Location::new(5.0 + (i % 16) as f64 * 3.0, (i / 16) as f64 - 8.0, 3.0),
                Rotation::from_yaw(180.0),
            );
            bbox.world_vertices(&actor)
        })
        .collect();

    c.bench_function("project_256_boxes", |b| {
        b.iter(|| {
            boxes
                .iter()
                .filter_map(|corners| project_bounding_box(black_box(corners), &camera, &k, 1920, 1080))
                .count()
        })
    });
}

fn bench_annotate_frame(c: &mut Criterion) {
    let spec = GridSpec::for_town("Town10HD").unwrap();
    let town = MockTown::generate(&spec, 2.0);
    let lights: Vec<TrafficLight> = town
        .lights
        .iter()
        .map(|l| TrafficLight {
            id: l.id,
            transform: l.transform,
            bounding_box: l.bounding_box,
            light_boxes: l.light_boxes.clone(),
            state: l.state_at(0.0),
        })
        .collect();
    let mut actors = town.props.clone();
    actors.extend((0..20).map(|i| ActorSnapshot {
        id: 50_000 + i,
        category: ActorCategory::Vehicle,
        role: None,
        transform: Transform::new(Location::new(i as f64 * 9.0, 1.75, 0.0), Rotation::default()),
        bounding_box: BoundingBox::axis_aligned(
            Location::new(0.0, 0.0, 0.75),
            Location::new(2.4, 1.0, 0.75),
        ),
    }));

    let calibration = CameraCalibration::new(1920, 1080, 90.0, Transform::identity()).unwrap();
    let annotator = Annotator::new(calibration, 0.01);
    let camera = Transform::new(Location::new(-20.0, 1.75, 2.5), Rotation::default());

    c.bench_function("annotate_frame", |b| {
        b.iter(|| annotator.annotate(black_box(&camera), &lights, &actors, None))
    });
}

criterion_group!(benches, bench_route_planning, bench_projection, bench_annotate_frame);
criterion_main!(benches);
