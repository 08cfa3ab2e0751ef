//! Criterion benchmarks for graph builds
//!
//! Snapshots are generated up front from manifests so only indexing, the
//! VirtualService walk, diagnostics and assembly are measured.

use std::fmt::Write;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use meshmap_common::ResourceSnapshot;
use meshmap_graph::{BuildOptions, GraphBuilder};

const NAMESPACE: &str = "bench";

// =============================================================================
// Fixtures
// =============================================================================

fn service(out: &mut String, name: &str) {
    let _ = write!(
        out,
        "---\napiVersion: v1\nkind: Service\nmetadata: {{name: {name}, namespace: {NAMESPACE}}}\n\
         spec:\n  selector: {{app: {name}}}\n  ports: [{{name: http, port: 8080}}]\n"
    );
}

fn pod(out: &mut String, name: &str, app: &str, version: &str) {
    let _ = write!(
        out,
        "---\napiVersion: v1\nkind: Pod\nmetadata:\n  name: {name}\n  namespace: {NAMESPACE}\n\
         \x20 labels: {{app: {app}, version: {version}}}\nspec:\n  containers:\n\
         \x20 - {{name: {app}, image: registry/{app}:1}}\n\
         \x20 - {{name: istio-proxy, image: docker.io/istio/proxyv2:1.20}}\n"
    );
}

fn subsets_rule(out: &mut String, host: &str) {
    let _ = write!(
        out,
        "---\napiVersion: networking.istio.io/v1beta1\nkind: DestinationRule\n\
         metadata: {{name: {host}, namespace: {NAMESPACE}}}\nspec:\n  host: {host}\n\
         \x20 trafficPolicy: {{tls: {{mode: ISTIO_MUTUAL}}}}\n  subsets:\n\
         \x20 - {{name: v1, labels: {{version: v1}}}}\n\
         \x20 - {{name: v2, labels: {{version: v2}}, trafficPolicy: {{tls: {{mode: DISABLE}}}}}}\n"
    );
}

fn split_route(out: &mut String, vs: &str, host: &str, targets: &[String]) {
    let _ = write!(
        out,
        "---\napiVersion: networking.istio.io/v1beta1\nkind: VirtualService\n\
         metadata: {{name: {vs}, namespace: {NAMESPACE}}}\nspec:\n  hosts: [{host}]\n  http:\n  - route:\n"
    );
    for target in targets {
        let _ = write!(
            out,
            "    - destination: {{host: {target}, subset: v2}}\n      weight: 10\n"
        );
    }
}

/// Chain topology: svc-0 routes to svc-1 routes to ... svc-n
fn chain_snapshot(n: usize) -> ResourceSnapshot {
    let mut yaml = String::new();
    for i in 0..n {
        let name = format!("svc-{}", i);
        service(&mut yaml, &name);
        pod(&mut yaml, &format!("{}-0", name), &name, "v1");
        subsets_rule(&mut yaml, &name);
        if i + 1 < n {
            split_route(&mut yaml, &name, &name, &[format!("svc-{}", i + 1)]);
        }
    }
    ResourceSnapshot::from_manifests(NAMESPACE, &yaml).unwrap_or_else(|e| panic!("{e}"))
}

/// Star topology: a hub splitting traffic across n spokes, plus unresolved
/// external hosts that trigger diagnostics
fn star_snapshot(n: usize) -> ResourceSnapshot {
    let mut yaml = String::new();
    service(&mut yaml, "hub");
    let mut targets = Vec::with_capacity(n * 2);
    for i in 0..n {
        let name = format!("spoke-{}", i);
        service(&mut yaml, &name);
        pod(&mut yaml, &format!("{}-0", name), &name, "v2");
        targets.push(name);
        targets.push(format!("api-{}.example.com", i));
    }
    split_route(&mut yaml, "hub", "hub", &targets);
    ResourceSnapshot::from_manifests(NAMESPACE, &yaml).unwrap_or_else(|e| panic!("{e}"))
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_build_service_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_service_level");
    let builder = GraphBuilder::new(BuildOptions::default());

    for size in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(size as u64));

        let chain = chain_snapshot(size);
        group.bench_with_input(BenchmarkId::new("chain", size), &chain, |b, snapshot| {
            b.iter(|| black_box(builder.build(black_box(snapshot))));
        });

        let star = star_snapshot(size);
        group.bench_with_input(BenchmarkId::new("star", size), &star, |b, snapshot| {
            b.iter(|| black_box(builder.build(black_box(snapshot))));
        });
    }

    group.finish();
}

fn bench_build_containers(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_containers");
    let builder = GraphBuilder::new(BuildOptions {
        expand_containers: true,
    });

    for size in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(size as u64));

        let chain = chain_snapshot(size);
        group.bench_with_input(BenchmarkId::new("chain", size), &chain, |b, snapshot| {
            b.iter(|| black_box(builder.build(black_box(snapshot))));
        });
    }

    group.finish();
}

fn bench_manifest_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_manifests");
    group.sample_size(20);

    for size in [10usize, 100] {
        let mut yaml = String::new();
        for i in 0..size {
            service(&mut yaml, &format!("svc-{}", i));
            subsets_rule(&mut yaml, &format!("svc-{}", i));
        }
        group.throughput(Throughput::Bytes(yaml.len() as u64));
        group.bench_with_input(BenchmarkId::new("services", size), &yaml, |b, yaml| {
            b.iter(|| black_box(ResourceSnapshot::from_manifests(NAMESPACE, black_box(yaml))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build_service_level,
    bench_build_containers,
    bench_manifest_parsing,
);

criterion_main!(benches);
