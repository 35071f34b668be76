//! Benchmarks for the materialization hot paths.
//!
//! Run with:  `cargo bench`

use std::sync::Arc;

use arrow_array::types::Int32Type;
use arrow_array::{ArrayRef, DictionaryArray, Int64Array, RecordBatch, TimestampNanosecondArray};
use arrow_ipc::writer::StreamWriter;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gpu_ipc_client::arrow_interop::{dictionary_recovery, temporal};

fn schema_stream(rows: usize) -> Vec<u8> {
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..rows as i64));
    let tags: DictionaryArray<Int32Type> =
        (0..rows).map(|i| ["red", "green", "blue", "cyan"][i % 4]).collect();
    let batch =
        RecordBatch::try_from_iter(vec![("id", ids), ("tag", Arc::new(tags) as ArrayRef)]).unwrap();

    let mut out = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut out, batch.schema().as_ref()).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
    }
    out
}

fn bench_recover_schema(c: &mut Criterion) {
    let bytes = schema_stream(1024);
    c.bench_function("recover_schema_one_dictionary", |b| {
        b.iter(|| {
            let recovery = dictionary_recovery::recover_schema(black_box(&bytes));
            black_box(recovery);
        })
    });
}

fn bench_recover_garbage(c: &mut Criterion) {
    let bytes = vec![0x5Au8; 4096];
    c.bench_function("recover_schema_fallback", |b| {
        b.iter(|| {
            let recovery = dictionary_recovery::recover_schema(black_box(&bytes));
            black_box(recovery);
        })
    });
}

fn bench_encode_epoch(c: &mut Criterion) {
    let values: ArrayRef = Arc::new(TimestampNanosecondArray::from_iter_values(
        (0..100_000i64).map(|i| i * 1_000_000_007),
    ));
    c.bench_function("encode_column_to_epoch_ms", |b| {
        b.iter(|| {
            let out = temporal::encode_column_to_epoch(black_box(&values), 3).unwrap();
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_recover_schema, bench_recover_garbage, bench_encode_epoch);
criterion_main!(benches);
