// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use isbg::{
    prometheus_document, GeneratorInfo, RulesGenerator, SliPluginRegistry, SpecLoader, DAY,
    MODE_CLI_GEN_PROM,
};

const NATIVE_SPEC: &str = r#"
version: prometheus/v1
service: myservice
labels:
  owner: myteam
slos:
  - name: requests-availability
    objective: 99.9
    sli:
      events:
        good_query: sum(rate(http_requests_total{code!~"(5..|429)"}[{{.window}}]))
        total_query: sum(rate(http_requests_total[{{.window}}]))
    alerting:
      name: MyServiceHighErrorRate
      page_alert:
        labels:
          severity: page
      ticket_alert:
        labels:
          severity: ticket
  - name: requests-latency
    objective: 99.0
    sli:
      raw:
        error_ratio_query: sum(rate(errors[{{.window}}])) / sum(rate(total[{{.window}}]))
    alerting:
      name: MyServiceHighLatency
"#;

fn benchmark_load_spec(c: &mut Criterion) {
    let loader = SpecLoader::new(30 * DAY);

    c.bench_function("load_native_spec", |b| {
        b.iter(|| loader.load_all(black_box(NATIVE_SPEC)).expect("load failed"))
    });
}

fn benchmark_generate_rules(c: &mut Criterion) {
    let loader = SpecLoader::new(30 * DAY);
    let specs = loader.load_all(NATIVE_SPEC).expect("load failed");
    let registry = SliPluginRegistry::new();
    let generator = RulesGenerator::new();
    let info = GeneratorInfo::new(MODE_CLI_GEN_PROM, specs[0].dialect.api_version());
    let extra_labels = BTreeMap::new();

    c.bench_function("generate_rules", |b| {
        b.iter(|| {
            generator
                .generate_group(
                    black_box(&specs[0].group),
                    &registry,
                    &info,
                    &extra_labels
                )
                .expect("generation failed")
        })
    });
}

fn benchmark_full_pipeline(c: &mut Criterion) {
    let loader = SpecLoader::new(30 * DAY);
    let registry = SliPluginRegistry::new();
    let generator = RulesGenerator::new();
    let extra_labels = BTreeMap::new();

    c.bench_function("spec_to_prometheus_document", |b| {
        b.iter(|| {
            let specs = loader.load_all(black_box(NATIVE_SPEC)).expect("load failed");
            let info = GeneratorInfo::new(MODE_CLI_GEN_PROM, specs[0].dialect.api_version());
            let generated = generator
                .generate_group(&specs[0].group, &registry, &info, &extra_labels)
                .expect("generation failed");
            prometheus_document(&generated.slos).expect("encoding failed")
        })
    });
}

criterion_group!(
    benches,
    benchmark_load_spec,
    benchmark_generate_rules,
    benchmark_full_pipeline
);
criterion_main!(benches);
