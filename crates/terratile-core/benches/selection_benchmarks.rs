//! Selection Benchmarks
//!
//! Per-frame tile selection cost at different altitudes and pyramid depths

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use terratile_core::draw_order::sort_draw_list;
use terratile_core::geometry::Frustum;
use terratile_core::{
    FetchQueue, LayerConfig, LevelPyramid, PyramidConfig, QuadtreeSelector, SphereGlobe,
    SplitEvaluator, TileKey, ViewState,
};

fn pyramid(levels: u32) -> LevelPyramid {
    LevelPyramid::new(&PyramidConfig {
        num_levels: levels,
        ..PyramidConfig::default()
    })
    .expect("valid pyramid")
}

fn view(altitude: f64) -> ViewState {
    ViewState::looking_down(Arc::new(SphereGlobe::earth()), 47.3, 8.5, altitude, 45.0, 16.0 / 9.0)
}

fn everything(_: &TileKey) -> bool {
    true
}

fn level_zero(key: &TileKey) -> bool {
    key.level == 0
}

fn bench_select_by_altitude(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_by_altitude");
    let pyramid = pyramid(19);
    let roots = pyramid.top_level_tiles();
    let config = LayerConfig::default();

    for altitude in [1.0e7, 1.0e5, 1.0e3].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(altitude), altitude, |b, &altitude| {
            let state = view(altitude);
            let mut queue = FetchQueue::default();

            b.iter(|| {
                let selection = QuadtreeSelector::new(&pyramid, &state, &everything, &config)
                    .select(&roots, &mut queue);
                queue.clear();
                black_box(selection.draw_list.len())
            });
        });
    }

    group.finish();
}

fn bench_select_with_fallback(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_with_fallback");
    let config = LayerConfig::default();

    for levels in [4u32, 8, 12].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(levels), levels, |b, &levels| {
            let pyramid = pyramid(levels);
            let roots = pyramid.top_level_tiles();
            let state = view(1.0e4);
            let mut queue = FetchQueue::default();

            b.iter(|| {
                let selection = QuadtreeSelector::new(&pyramid, &state, &level_zero, &config)
                    .select(&roots, &mut queue);
                queue.clear();
                black_box(selection.stats.drawn_fallback)
            });
        });
    }

    group.finish();
}

fn bench_capture_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_mode");

    group.bench_function("full_sphere_5_levels", |b| {
        let pyramid = pyramid(5);
        let roots = pyramid.top_level_tiles();
        let config = LayerConfig::default();
        let state = view(1.0e7)
            .with_frustum(Frustum::unbounded())
            .with_visible_sector(None)
            .with_capture_mode(true);
        let mut queue = FetchQueue::default();

        b.iter(|| {
            let selection = QuadtreeSelector::new(&pyramid, &state, &everything, &config)
                .select(&roots, &mut queue);
            queue.clear();
            black_box(selection.draw_list.len())
        });
    });

    group.finish();
}

fn bench_split_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_evaluation");

    group.bench_function("needs_split", |b| {
        let pyramid = pyramid(19);
        let evaluator = SplitEvaluator::default();
        let state = view(1.0e4);
        let sector = pyramid
            .sector_for_position(10, 47.3, 8.5)
            .expect("level in range");

        b.iter(|| black_box(evaluator.needs_split(&state, black_box(&sector))));
    });

    group.finish();
}

fn bench_sort_draw_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_draw_list");

    group.bench_function("near_surface", |b| {
        let pyramid = pyramid(19);
        let roots = pyramid.top_level_tiles();
        let config = LayerConfig::default();
        let state = view(1.0e3);
        let mut queue = FetchQueue::default();
        let draw_list = QuadtreeSelector::new(&pyramid, &state, &level_zero, &config)
            .select(&roots, &mut queue)
            .draw_list;

        b.iter(|| {
            let mut entries = draw_list.clone();
            sort_draw_list(&mut entries);
            black_box(entries.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_select_by_altitude,
    bench_select_with_fallback,
    bench_capture_mode,
    bench_split_evaluation,
    bench_sort_draw_list
);
criterion_main!(benches);
