use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use sequin::layout::compile;
use sequin::parser::parse;
use sequin::render::render_svg;
use sequin::style::default_stylesheet;
use sequin::text_metrics::FixedMetrics;

/// A conversation between `entities` participants with `messages` calls
/// bouncing between adjacent pairs, an activation per round trip, and a
/// block every eighth message.
fn conversation_source(entities: usize, messages: usize) -> String {
    let mut out = String::new();
    for i in 0..entities {
        out.push_str(&format!("declare e{i}\n"));
    }
    for i in 0..messages {
        let src = i % entities;
        let dst = (i + 1) % entities;
        if i % 4 == 0 {
            out.push_str(&format!("activate e{src}\n"));
        }
        if i % 8 == 0 {
            out.push_str(&format!(
                "loop \"retry {i}\" {{\n    e{src}->e{dst} \"message number {i}\"\n}}\n"
            ));
        } else {
            out.push_str(&format!("e{src}->e{dst} \"message number {i}\"\n"));
        }
        if i % 4 == 3 {
            out.push_str(&format!("deactivate e{src}\n"));
        }
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (entities, messages) in [(2usize, 10usize), (5, 100), (10, 500)] {
        let name = format!("{entities}x{messages}");
        let input = conversation_source(entities, messages);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, data| {
            b.iter(|| {
                let ast = parse(black_box(data)).expect("parse failed");
                black_box(ast.root.operations.len());
            });
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let style = default_stylesheet();
    let shaper = FixedMetrics::default();
    for (entities, messages) in [(2usize, 10usize), (5, 100), (10, 500)] {
        let name = format!("{entities}x{messages}");
        let ast = parse(&conversation_source(entities, messages)).expect("parse failed");
        group.bench_with_input(BenchmarkId::from_parameter(name), &ast, |b, ast| {
            b.iter(|| {
                let compiled = compile(black_box(ast), &style, &shaper).expect("compile failed");
                black_box(compiled.layers.content.len());
            });
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    let style = default_stylesheet();
    let shaper = FixedMetrics::default();
    for (entities, messages) in [(2usize, 10usize), (5, 100), (10, 500)] {
        let name = format!("{entities}x{messages}");
        let input = conversation_source(entities, messages);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, data| {
            b.iter(|| {
                let ast = parse(black_box(data)).expect("parse failed");
                let compiled = compile(&ast, &style, &shaper).expect("compile failed");
                let svg = render_svg(&compiled);
                black_box(svg.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_parse, bench_compile, bench_end_to_end
);
criterion_main!(benches);
