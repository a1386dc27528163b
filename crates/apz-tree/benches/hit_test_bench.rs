//! Benchmarks for hit testing and tree rebuilds.
//!
//! Run with:
//! `cargo bench -p apz-tree --bench hit_test_bench`

use apz_core::{Point, Rect, SceneId, ScrollGeometry, ScrollId};
use apz_tree::{SceneNode, ScrollMetadata, TreeManager};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

const SCENE: SceneId = SceneId(1);

/// A grid of `n * n` scrollers, each holding a small non-scrolling leaf.
fn grid(n: u64) -> SceneNode {
    let cell = 1000.0 / n as f32;
    let geometry = ScrollGeometry::new(
        Rect::from_size(cell * 4.0, cell * 4.0),
        Rect::from_size(cell, cell),
    );
    let children = (0..n * n).map(|i| {
        let (row, col) = ((i / n) as f32, (i % n) as f32);
        let bounds = Rect::new(col * cell, row * cell, cell, cell);
        SceneNode::new(i * 2 + 1, bounds)
            .with_scroll(ScrollMetadata::new(ScrollId(i + 2), geometry))
            .with_child(SceneNode::new(i * 2 + 2, bounds))
    });
    SceneNode::new(0, Rect::from_size(1000.0, 1000.0)).with_children(children)
}

fn bench_hit_test(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/hit_test");
    for n in [4u64, 16, 32] {
        let mut manager = TreeManager::default();
        manager.rebuild_tree(SCENE, grid(n), true);
        let points: Vec<Point> = (0..64)
            .map(|i| Point::new((i * 37 % 1000) as f32, (i * 91 % 1000) as f32))
            .collect();
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(BenchmarkId::new("grid", n * n), &points, |b, points| {
            b.iter(|| {
                for p in points {
                    black_box(manager.hit_test_controller(*p));
                }
            });
        });
    }
    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/rebuild_unchanged");
    for n in [4u64, 16, 32] {
        let scene = grid(n);
        let mut manager = TreeManager::default();
        manager.rebuild_tree(SCENE, scene.clone(), true);
        group.throughput(Throughput::Elements(scene.node_count() as u64));
        group.bench_with_input(BenchmarkId::new("grid", n * n), &scene, |b, scene| {
            b.iter(|| black_box(manager.rebuild_tree(SCENE, scene.clone(), false)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hit_test, bench_rebuild);
criterion_main!(benches);
