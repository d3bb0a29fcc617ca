use criterion::{criterion_group, criterion_main, Criterion};
use docindex_core::jsindex::parse_search_index;
use docindex_core::tokenizer::tokenize;
use docindex_core::{search, SearchOptions};

const FIXTURE: &str = include_str!("../tests/fixtures/esgprep-searchindex.js");

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_searchindex", |b| b.iter(|| tokenize(FIXTURE)));
}

fn bench_search(c: &mut Criterion) {
    let index = parse_search_index(FIXTURE).expect("fixture parses");
    c.bench_function("parse_searchindex", |b| b.iter(|| parse_search_index(FIXTURE)));
    c.bench_function("search_drs_upgrade", |b| {
        b.iter(|| search(&index, "drs upgrade -checksum", SearchOptions::default()))
    });
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
