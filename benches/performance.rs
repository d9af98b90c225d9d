//! Performance benchmarks for the TCP messaging tester
//!
//! Covers the per-frame hot path (header encoding and framing) and the
//! per-run work done once results are in (statistics and formatting).

use clap::Parser;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::{collections::BTreeMap, hint::black_box, time::Duration};
use tcp_messaging_tester::{
    cli::Cli,
    config::ConfigParser,
    models::{OperationMetrics, ScenarioResult, Statistics},
    output::{OutputFormatter, OutputFormatterFactory},
    protocol::{encode_header, read_header, write_frame, FrameHeader},
    stats::{nearest_rank_percentile, StatisticsEngine},
    types::ScenarioKind,
};

fn sample_metrics(count: usize) -> Vec<OperationMetrics> {
    (0..count)
        .map(|i| {
            if i % 20 == 0 {
                OperationMetrics::failed(Duration::from_millis(5), "connection reset".to_string())
            } else {
                OperationMetrics::success(Duration::from_micros(200 + (i as u64 * 37) % 1800), 1024)
            }
        })
        .collect()
}

fn sample_result(count: usize) -> ScenarioResult {
    let mut result = ScenarioResult::new(ScenarioKind::Throughput, "127.0.0.1:9000".to_string());
    for metrics in sample_metrics(count) {
        result.add_measurement(metrics);
    }
    result.finish(Duration::from_secs(1));
    result
}

fn header_with_metadata() -> FrameHeader {
    let mut metadata = BTreeMap::new();
    metadata.insert("seq".to_string(), serde_json::json!(42));
    metadata.insert("client".to_string(), serde_json::json!("bench"));
    FrameHeader::data(1024).with_metadata(Some(metadata))
}

/// Benchmark frame encoding and decoding
fn benchmark_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    group.bench_function("encode_header", |b| {
        let header = header_with_metadata();
        b.iter(|| encode_header(black_box(&header)).expect("encode"));
    });

    for size in [64usize, 1024, 64 * 1024].iter() {
        let payload = vec![7u8; *size];
        let header = FrameHeader::data(*size as u64);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("write_frame", size), size, |b, _| {
            b.iter(|| {
                let mut out = Vec::with_capacity(*size + 128);
                runtime
                    .block_on(write_frame(&mut out, black_box(&header), black_box(&payload)))
                    .expect("write");
                out
            });
        });
    }

    group.bench_function("read_header", |b| {
        let mut encoded = Vec::new();
        runtime
            .block_on(write_frame(&mut encoded, &header_with_metadata(), &[]))
            .expect("write");
        b.iter(|| {
            let mut reader = encoded.as_slice();
            runtime.block_on(read_header(&mut reader)).expect("read")
        });
    });

    group.finish();
}

/// Benchmark statistics over run sizes seen in practice
fn benchmark_statistics_calculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");

    for size in [100usize, 1000, 10000].iter() {
        let metrics = sample_metrics(*size);
        group.bench_with_input(BenchmarkId::new("from_measurements", size), size, |b, _| {
            b.iter(|| {
                let refs: Vec<&OperationMetrics> = metrics.iter().collect();
                Statistics::from_measurements(black_box(&refs), *size as u64, Duration::from_secs(1))
            });
        });

        let mut sorted: Vec<f64> = metrics.iter().map(|m| m.duration_ms()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        group.bench_with_input(BenchmarkId::new("percentile", size), size, |b, _| {
            b.iter(|| nearest_rank_percentile(black_box(&sorted), 99.0));
        });
    }

    group.bench_function("analyze", |b| {
        let result = sample_result(5000);
        b.iter(|| {
            let mut engine = StatisticsEngine::with_defaults();
            engine.add_result(result.clone());
            engine.analyze().expect("analysis")
        });
    });

    group.finish();
}

/// Benchmark the configuration pipeline and result formatting
fn benchmark_application_workflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("application_workflow");
    group.sample_size(20);

    group.bench_function("config_loading_pipeline", |b| {
        b.iter(|| {
            let cli = Cli::parse_from(["tmt", "throughput", "--count", "100", "--size", "512"]);
            ConfigParser::new(black_box(cli))
                .with_env_file("/nonexistent/bench.env")
                .parse()
                .expect("config")
        });
    });

    group.bench_function("scenario_table", |b| {
        let formatter = OutputFormatterFactory::create_plain_formatter();
        let results = vec![sample_result(1000)];
        b.iter(|| formatter.format_scenario_table(black_box(&results)).expect("table"));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_framing,
    benchmark_statistics_calculation,
    benchmark_application_workflow
);
criterion_main!(benches);
