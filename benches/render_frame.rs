//! Frame render benchmarks.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use termreel::color::{ARG, PRIMARY};
use termreel::renderer::{Cursor, FrameView, ProgressOverlay, Renderer};
use termreel::scene::{load_preset, Preset, Run};

fn bench_render(c: &mut Criterion) {
    let mut scene = load_preset(Preset::Zen).expect("load preset");
    scene.fonts.builtin_only = true;
    let lines = (0..24)
        .map(|i| {
            vec![
                Run::new("木 ", PRIMARY),
                Run::new(format!("ki████ search {i} "), PRIMARY),
                Run::new("\"B+ fintech, hiring CX\"", ARG),
            ]
        })
        .collect::<Vec<_>>();

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(20);

    group.bench_function("4k_typing_frame", |b| {
        let mut renderer = Renderer::new(&scene);
        let view = FrameView {
            lines: &lines,
            scroll: 420.0,
            cursor: Some(Cursor {
                runs: vec![Run::new("木 ", PRIMARY), Run::new("ki████ enr", PRIMARY)],
                visible: true,
            }),
            overlay: None,
            highlight: None,
        };
        b.iter(|| black_box(renderer.render(&view).expect("render")));
    });

    group.bench_function("4k_progress_frame", |b| {
        let mut renderer = Renderer::new(&scene);
        let view = FrameView {
            lines: &lines,
            scroll: 600.0,
            cursor: None,
            overlay: Some(ProgressOverlay {
                glyph: "木".to_owned(),
                glyph_color: PRIMARY,
                status: "indexing 1,095 pipeline companies...".to_owned(),
                progress: 0.42,
                bar_color: PRIMARY,
            }),
            highlight: Some(PRIMARY),
        };
        b.iter(|| black_box(renderer.render(&view).expect("render")));
    });

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
