//! Pure in-memory benchmarks for the priority ordering `CallQueue` relies
//! on — no database round trip, since `nextEligible`'s SQL-side ordering
//! (`ORDER BY priority DESC, position ASC, created_at ASC`) is exactly
//! mirrored here in Rust so the comparator cost itself is measurable
//! independent of storage latency, the way the teacher's
//! `02_config_validation` benchmark isolates pure-CPU config validation
//! from the database-bound benchmarks beside it.

use callcore::domain::{QueueItemKind, QueueItemRecord, QueueItemStatus};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

fn sample_item(priority: i32, position: i64) -> QueueItemRecord {
    let now = Utc::now();
    QueueItemRecord {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        campaign_id: None,
        contact_id: None,
        agent_id: Uuid::new_v4(),
        phone: "+15551234567".to_string(),
        kind: QueueItemKind::Direct,
        priority,
        position,
        scheduled_for: now,
        status: QueueItemStatus::Queued,
        attempts: 0,
        last_error: None,
        call_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// A few hundred items spread across a handful of priority tiers, the
/// rough shape of one tenant's queue depth under sustained campaign load.
fn candidate_set(n: usize) -> Vec<QueueItemRecord> {
    (0..n)
        .map(|i| sample_item((i % 5) as i32 * 10, i as i64))
        .collect()
}

fn benchmark_priority_sort(c: &mut Criterion) {
    let items = candidate_set(500);

    c.bench_function("queue_selection_sort_by_priority_position", |b| {
        b.iter(|| {
            let mut items = items.clone();
            items.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.position.cmp(&b.position))
                    .then(a.created_at.cmp(&b.created_at))
            });
            black_box(items.first().map(|i| i.id));
        });
    });
}

fn benchmark_status_transition_checks(c: &mut Criterion) {
    let transitions = [
        (QueueItemStatus::Queued, QueueItemStatus::Processing),
        (QueueItemStatus::Processing, QueueItemStatus::Completed),
        (QueueItemStatus::Processing, QueueItemStatus::Failed),
        (QueueItemStatus::Processing, QueueItemStatus::Queued),
        (QueueItemStatus::Completed, QueueItemStatus::Processing),
    ];

    c.bench_function("queue_selection_status_transition_validation", |b| {
        b.iter(|| {
            let mut allowed = 0u32;
            for (from, to) in transitions.iter().copied() {
                if from.can_transition_to(to) {
                    allowed += 1;
                }
            }
            black_box(allowed);
        });
    });
}

fn benchmark_item_validation(c: &mut Criterion) {
    let items = candidate_set(500);

    c.bench_function("queue_selection_item_validate", |b| {
        b.iter(|| {
            let mut ok = 0u32;
            for item in &items {
                if item.validate().is_ok() {
                    ok += 1;
                }
            }
            black_box(ok);
        });
    });
}

criterion_group!(
    benches,
    benchmark_priority_sort,
    benchmark_status_transition_checks,
    benchmark_item_validation
);
criterion_main!(benches);
