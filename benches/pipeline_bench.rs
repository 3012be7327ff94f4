use criterion::{Criterion, black_box, criterion_group, criterion_main};

use datev_lint::parser::{Tokenizer, parse_bytes};
use datev_lint::rules::{ExecutionPipeline, RuleRegistry};

const HEAD: &str = "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231\r\n";
const LABELS: &str = "Umsatz;Soll/Haben-Kennzeichen;WKZ Umsatz;Konto;Gegenkonto;BU-Schlüssel;Belegdatum;Belegfeld 1;Buchungstext\r\n";

/// A batch of `rows` bookings with a sprinkling of findings.
fn build_batch(rows: usize) -> Vec<u8> {
    let mut s = String::with_capacity(rows * 64);
    s.push_str(HEAD);
    s.push_str(LABELS);
    for n in 0..rows {
        let flag = if n % 97 == 0 { "s" } else { "S" };
        let belegfeld = if n % 1000 == 999 { 1 } else { n };
        s.push_str(&format!(
            "{},{:02};{};EUR;{:04};8400;9;{:02}{:02};\"RE{}\";\"Wareneingang {}\"\r\n",
            n % 5000 + 1,
            n % 100,
            flag,
            1200 + n % 50,
            n % 28 + 1,
            n % 12 + 1,
            belegfeld,
            n
        ));
    }
    s.into_bytes()
}

fn bench_tokenize(c: &mut Criterion) {
    let data = build_batch(50_000);
    let text = String::from_utf8(data).unwrap();
    c.bench_function("tokenize_50k_rows", |b| {
        b.iter(|| Tokenizer::new(black_box(text.clone())).count())
    });
}

fn bench_parse(c: &mut Criterion) {
    let data = build_batch(50_000);
    c.bench_function("parse_50k_rows", |b| {
        b.iter(|| {
            parse_bytes(black_box(&data), "bench.csv")
                .unwrap()
                .rows
                .count()
        })
    });
}

fn bench_validate(c: &mut Criterion) {
    let data = build_batch(50_000);
    let registry = RuleRegistry::builtin().unwrap();
    let pipeline = ExecutionPipeline::new(&registry, "de.skr03.default").unwrap();
    c.bench_function("validate_50k_rows", |b| {
        b.iter(|| pipeline.run(black_box(&data), "bench.csv"))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_tokenize, bench_parse, bench_validate
}
criterion_main!(benches);
