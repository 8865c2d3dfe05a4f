//! Selection performance benchmarks
//!
//! Measures the non-network parts of a routing decision: ranking healthy
//! gateways over a warm cache, cooldown computation, and config parsing.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::sync::Arc;
use switchyard::{
    config::Config,
    health::{GatewayHealthStore, HealthPatch},
    metrics::Metrics,
    router::{AttemptOutcome, CooldownPolicy},
    selector::GatewaySelector,
    store::MemoryStore,
};

fn config_with(gateways: usize) -> Config {
    let mut toml = String::from(
        r#"
[server]
host = "127.0.0.1"
port = 3000
"#,
    );
    for i in 0..gateways {
        toml.push_str(&format!(
            "\n[[gateways]]\nid = \"gw-{i}\"\nurl = \"http://localhost:{}\"\npriority = {}\n",
            9000 + i,
            i % 3
        ));
    }
    toml.parse().expect("benchmark config should be valid")
}

/// Rank N gateways, a third of them in cooldown
fn bench_list_healthy(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("list_healthy");

    for size in [3usize, 10, 50] {
        let config = Arc::new(config_with(size));
        let metrics = Arc::new(Metrics::new().expect("metrics"));
        let health = Arc::new(GatewayHealthStore::new(
            Arc::new(MemoryStore::new()),
            metrics,
        ));

        runtime.block_on(async {
            for (i, gateway) in config.gateways.iter().enumerate() {
                health
                    .update(
                        gateway.id(),
                        HealthPatch {
                            last_success: Some(i as i64),
                            avg_latency: Some((size - i) as f64),
                            cooldown_until: Some(if i % 3 == 0 { 10_000 } else { 0 }),
                            ..Default::default()
                        },
                    )
                    .await;
            }
        });

        let selector = GatewaySelector::new(config, health);
        group.bench_with_input(BenchmarkId::from_parameter(size), &selector, |b, s| {
            b.to_async(&runtime).iter(|| s.list_healthy(5_000));
        });
    }

    group.finish();
}

fn bench_cooldown(c: &mut Criterion) {
    let policy = CooldownPolicy::new(30_000, 300_000, 0.25);
    c.bench_function("cooldown_overloaded_jittered", |b| {
        b.iter(|| policy.cooldown_ms(AttemptOutcome::Overloaded, std::hint::black_box(3)));
    });
}

fn bench_config_parsing(c: &mut Criterion) {
    c.bench_function("config_parse_10_gateways", |b| {
        b.iter(|| config_with(10));
    });
}

criterion_group!(benches, bench_list_healthy, bench_cooldown, bench_config_parsing);
criterion_main!(benches);
