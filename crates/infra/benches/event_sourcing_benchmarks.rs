use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use serde_json::json;
use tania_assets::{ChangeFarmName, CreateFarm, Farm, FarmCommand, FarmId};
use tania_core::{AggregateId, AggregateType, ExpectedVersion};
use tania_events::NewEvent;
use tania_infra::composition::Tania;
use tania_infra::event_store::{EventStore, InMemoryEventStore};

fn create_farm(name: &str) -> FarmCommand {
    FarmCommand::Create(CreateFarm {
        name: name.to_string(),
        farm_type: "organic".to_string(),
        geolocation: None,
        region: None,
        occurred_at: Utc::now(),
    })
}

fn rename_farm(n: usize) -> FarmCommand {
    FarmCommand::ChangeName(ChangeFarmName {
        name: format!("Kebun {n}"),
        occurred_at: Utc::now(),
    })
}

/// A farm whose stream holds `events` records.
fn farm_with_history(tania: &Tania, events: usize) -> AggregateId {
    let id = FarmId::generate().aggregate_id();
    tania.repository().create::<Farm>(id, &create_farm("Kebun Raya")).unwrap();
    for n in 1..events {
        tania.repository().execute::<Farm>(id, &rename_farm(n)).unwrap();
    }
    id
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");

    // CreateFarm: empty stream, one append, one publish to every view
    group.bench_function("create_farm_fresh", |b| {
        let tania = Tania::in_memory();
        b.iter(|| {
            let id = FarmId::generate().aggregate_id();
            tania
                .repository()
                .create::<Farm>(id, black_box(&create_farm("Kebun Raya")))
                .unwrap();
        });
    });

    // ChangeFarmName: replay cost grows with the stream
    for history in [10usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("rename_farm_with_history", history),
            &history,
            |b, &history| {
                let tania = Tania::in_memory();
                let id = farm_with_history(&tania, history);
                let mut n = history;
                b.iter(|| {
                    n += 1;
                    tania.repository().execute::<Farm>(id, &rename_farm(n)).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            &batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                b.iter(|| {
                    let events: Vec<NewEvent> = (0..size)
                        .map(|i| NewEvent::new("assets.farm.name_changed", json!({ "name": i }), Utc::now()))
                        .collect();
                    black_box(
                        store
                            .append(AggregateType::Farm, AggregateId::new(), ExpectedVersion::Exact(0), events)
                            .unwrap(),
                    );
                });
            },
        );
    }

    group.finish();
}

fn bench_replay_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_speed");

    for event_count in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(event_count as u64));
        group.bench_with_input(
            BenchmarkId::new("replay_farm", event_count),
            &event_count,
            |b, &count| {
                let tania = Tania::in_memory();
                let id = farm_with_history(&tania, count);
                b.iter(|| {
                    let farm: Farm = tania.repository().replay(black_box(id)).unwrap();
                    black_box(farm);
                });
            },
        );
    }

    group.finish();
}

fn bench_read_model_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_model_rebuild_speed");
    group.sample_size(20);

    for farm_count in [10usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("rebuild_all_views", farm_count),
            &farm_count,
            |b, &count| {
                let tania = Tania::in_memory();
                for _ in 0..count {
                    farm_with_history(&tania, 5);
                }
                b.iter(|| {
                    black_box(tania.rebuild_read_models().unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_replay_speed,
    bench_read_model_rebuild_speed
);
criterion_main!(benches);
