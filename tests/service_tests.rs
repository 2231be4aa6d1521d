//! Aggregation Service Tests
//!
//! End-to-end behaviour of the expiration thread:
//! - Slots are flushed in deadline order
//! - A new, earlier deadline wakes the scheduler
//! - Concurrent producers lose no samples
//! - Every slot reaches the sink exactly once
//! - A late sample after a flush opens a new slot

use metricd::{
    AggregationService, ConfigList, InMemorySink, LastValueReducer, Sample, SlotId, TableConfig,
};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const MILLIS: u64 = 1_000;
const NEVER_EXPIRES: u64 = u64::MAX / 4;
const WAIT: Duration = Duration::from_secs(10);

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn start_service(sink: &Arc<InMemorySink>, config: ConfigList) -> AggregationService {
    AggregationService::builder()
        .sink(sink.clone())
        .initial_config(config)
        .start()
        .unwrap()
}

// ============================================================================
// Expiration Order Tests
// ============================================================================

#[test]
fn test_slots_flush_in_deadline_order() {
    let sink = Arc::new(InMemorySink::new());
    let service = start_service(
        &sink,
        ConfigList::new()
            .with_table(TableConfig::new("slow", 300 * MILLIS))
            .with_table(TableConfig::new("fast", 50 * MILLIS)),
    );

    service
        .insert_sample(&Sample::new("slow", "1", 0, Vec::new()))
        .unwrap();
    service
        .insert_sample(&Sample::new("fast", "2", 0, Vec::new()))
        .unwrap();

    assert!(sink.wait_for(2, WAIT));
    let flushed = sink.take();
    let names: Vec<_> = flushed.iter().map(|s| s.table_name()).collect();
    assert_eq!(names, ["fast", "slow"]);
    assert!(flushed[0].expire_at() <= flushed[1].expire_at());
    assert_eq!(service.open_slots(), 0);

    service.shutdown().unwrap();
}

#[test]
fn test_earlier_deadline_wakes_scheduler() {
    let sink = Arc::new(InMemorySink::new());
    let service = start_service(
        &sink,
        ConfigList::new()
            .with_table(TableConfig::new("archive", NEVER_EXPIRES))
            .with_table(TableConfig::new("fast", 30 * MILLIS)),
    );

    // The scheduler is now sleeping until the far-away deadline.
    service
        .insert_sample(&Sample::new("archive", "1", 0, Vec::new()))
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    service
        .insert_sample(&Sample::new("fast", "1", 0, Vec::new()))
        .unwrap();

    assert!(sink.wait_for(1, WAIT));
    let flushed = sink.take();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].table_name(), "fast");
    assert_eq!(service.open_slots(), 1);

    service.shutdown().unwrap();
}

#[test]
fn test_flushed_slot_carries_accumulated_state() {
    let sink = Arc::new(InMemorySink::new());
    let service = start_service(
        &sink,
        ConfigList::new().with_table(TableConfig::new("cpu", 50 * MILLIS).with_label("host")),
    );

    for value in ["4", "-2", "10"] {
        service
            .insert_sample(&Sample::new("cpu", value, 7, labels(&["h1"])))
            .unwrap();
    }

    assert!(sink.wait_for(1, WAIT));
    let slot = &sink.take()[0];
    assert_eq!(slot.bucket_start(), 0);
    assert_eq!(slot.labels(), ["h1"]);
    let agg = slot.aggregate();
    assert_eq!(agg.count, 3);
    assert_eq!(agg.min, -2.0);
    assert_eq!(agg.max, 10.0);
    assert_eq!(agg.sum, 12.0);

    service.shutdown().unwrap();
}

#[test]
fn test_custom_reducer_is_used() {
    let sink = Arc::new(InMemorySink::new());
    let service = AggregationService::builder()
        .sink(sink.clone())
        .reducer(Arc::new(LastValueReducer))
        .initial_config(ConfigList::new().with_table(TableConfig::new("gauge", NEVER_EXPIRES)))
        .start()
        .unwrap();

    for value in ["5", "1", "3"] {
        service
            .insert_sample(&Sample::new("gauge", value, 0, Vec::new()))
            .unwrap();
    }

    assert_eq!(service.flush_all().unwrap(), 1);
    let slot = &sink.take()[0];
    assert_eq!(slot.aggregate().last, 3.0);
    assert_eq!(slot.aggregate().min, 3.0);
    assert_eq!(slot.aggregate().count, 3);

    service.shutdown().unwrap();
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_producers_lose_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let sink = Arc::new(InMemorySink::new());
    let service = Arc::new(start_service(
        &sink,
        ConfigList::new().with_table(TableConfig::new("cpu", NEVER_EXPIRES).with_label("worker")),
    ));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|worker| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let sample =
                        Sample::new("cpu", i.to_string(), 0, vec![format!("w{}", worker % 4)]);
                    service.insert_sample(&sample).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(service.open_slots(), 4);
    assert_eq!(service.flush_all().unwrap(), 4);

    let total: u64 = sink.take().iter().map(|s| s.aggregate().count).sum();
    assert_eq!(total, (THREADS * PER_THREAD) as u64);

    service.shutdown().unwrap();
}

#[test]
fn test_every_slot_flushed_exactly_once() {
    const THREADS: usize = 4;
    const PER_THREAD: u64 = 300;

    let sink = Arc::new(InMemorySink::new());
    let service = Arc::new(start_service(
        &sink,
        ConfigList::new().with_table(TableConfig::new("req", 5 * MILLIS).with_label("route")),
    ));

    let handles: Vec<_> = (0..THREADS)
        .map(|worker| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    // Spread samples over many buckets while the scheduler runs.
                    let sample = Sample::new("req", "1", i * MILLIS, vec![format!("r{worker}")]);
                    service.insert_sample(&sample).unwrap();
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_millis(2));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    service.flush_all().unwrap();
    service.shutdown().unwrap();

    let flushed = sink.take();
    let serials: HashSet<u64> = flushed.iter().map(|s| s.serial()).collect();
    assert_eq!(serials.len(), flushed.len());

    let total: u64 = flushed.iter().map(|s| s.aggregate().count).sum();
    assert_eq!(total, THREADS as u64 * PER_THREAD);
    assert_eq!(service.open_slots(), 0);
}

// ============================================================================
// Late Arrival Tests
// ============================================================================

#[test]
fn test_late_sample_opens_new_slot() {
    let sink = Arc::new(InMemorySink::new());
    let service = start_service(
        &sink,
        ConfigList::new().with_table(TableConfig::new("cpu", 30 * MILLIS)),
    );

    service
        .insert_sample(&Sample::new("cpu", "1", 10, Vec::new()))
        .unwrap();
    assert!(sink.wait_for(1, WAIT));

    // Same bucket as the flushed slot.
    service
        .insert_sample(&Sample::new("cpu", "2", 20, Vec::new()))
        .unwrap();
    assert!(sink.wait_for(2, WAIT));

    let flushed = sink.take();
    assert_eq!(flushed[0].bucket_start(), flushed[1].bucket_start());
    assert_ne!(flushed[0].serial(), flushed[1].serial());
    assert_eq!(flushed[0].aggregate().sum, 1.0);
    assert_eq!(flushed[1].aggregate().sum, 2.0);

    service.shutdown().unwrap();
}

// ============================================================================
// Digest Collision Tests
// ============================================================================

fn constant_digest(_bucket_start: u64, _table: &str, _labels: &[String]) -> SlotId {
    SlotId::new(7)
}

#[test]
fn test_colliding_digests_stay_distinct() {
    let sink = Arc::new(InMemorySink::new());
    let service = AggregationService::builder()
        .sink(sink.clone())
        .digest(constant_digest)
        .initial_config(
            ConfigList::new().with_table(TableConfig::new("cpu", NEVER_EXPIRES).with_label("host")),
        )
        .start()
        .unwrap();

    for host in ["a", "b", "c", "a"] {
        service
            .insert_sample(&Sample::new("cpu", "1", 0, labels(&[host])))
            .unwrap();
    }
    assert_eq!(service.open_slots(), 3);

    let mut flushed = service.drain_expired(u64::MAX);
    flushed.sort_by(|a, b| a.labels().cmp(b.labels()));
    let counts: Vec<_> = flushed.iter().map(|s| s.aggregate().count).collect();
    assert_eq!(counts, [2, 1, 1]);
    assert!(flushed.iter().all(|s| s.slot_id() == SlotId::new(7)));

    service.shutdown().unwrap();
}
