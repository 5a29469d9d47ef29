//! Benchmarks for the analysis pipeline.
//!
//! `parse` measures the lexer and tree builder alone, `analyze_entry` the
//! full pipeline on a five-solution helpmate, and `analyze_entries` a batch
//! of copies spread over the thread pool.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use popeye_themes::{analyze_entries, analyze_entry, parse, AnalysisConfig, ProblemEntry};

const ZILAHI_5: &str = r#"{
    "id": "z5x1",
    "stipulation": "h#2",
    "algebraic": {
        "white": ["Kb2", "Rb7", "Be5", "Bb3", "Sf3", "Sd3"],
        "black": ["Kc6", "Re3", "Sa5", "Pf6", "Pe4", "Pa6"]
    },
    "solution": "1.Re3*f3 Bb3-d1   2.e4-e3 Bd1*f3 #\n1.e4*d3 Rb7-b6 +   2.Kc6-c5 Be5-d4 #\n1.Sa5*b3 Rb7-c7 +   2.Kc6-d5 Sd3-f4 #\n1.Sa5*b7 Be5-c7   2.Kc6-b5 Sf3-d4 #\n1.f6*e5 Sf3*e5 +   2.Kc6-d6 Rb7-d7 #"
}"#;

fn bench_analysis(c: &mut Criterion) {
    let entry = ProblemEntry::from_json(ZILAHI_5).expect("benchmark entry is valid");
    let config = AnalysisConfig::default();

    c.bench_function("parse", |b| {
        b.iter(|| parse(black_box(&entry.solution)).expect("solution parses"))
    });

    c.bench_function("analyze_entry", |b| {
        b.iter(|| analyze_entry(black_box(&entry), &config).expect("analysis succeeds"))
    });

    let batch = vec![entry.clone(); 256];
    c.bench_function("analyze_entries", |b| {
        b.iter(|| analyze_entries(black_box(&batch), &config))
    });
}

criterion_group!(benches, bench_analysis);
criterion_main!(benches);
