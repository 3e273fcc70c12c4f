//! Store invariants over arbitrary operation sequences.

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use notisync_core::{LocalStore, NotificationRecord};
use proptest::prelude::*;

const CAPACITY: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Upsert { id: u8, minute: i64, read: bool },
    Remove(u8),
    MarkRead(u8),
}

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap() + Duration::minutes(minute)
}

fn record(id: u8, minute: i64, read: bool) -> NotificationRecord {
    let record = NotificationRecord::new(format!("n{id}"), "title", "body", at(minute));
    if read {
        record.with_read_at(at(minute + 1))
    } else {
        record
    }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, 0i64..60, any::<bool>()).prop_map(|(id, minute, read)| Op::Upsert {
            id,
            minute,
            read
        }),
        (0u8..8).prop_map(Op::Remove),
        (0u8..8).prop_map(Op::MarkRead),
    ]
}

fn apply(store: &mut LocalStore, op: &Op) {
    match op {
        Op::Upsert { id, minute, read } => {
            store.upsert(record(*id, *minute, *read));
        }
        Op::Remove(id) => {
            store.remove(&format!("n{id}"));
        }
        Op::MarkRead(id) => {
            store.mark_read(&format!("n{id}"), at(99));
        }
    }
}

proptest! {
    #[test]
    fn upsert_twice_equals_upsert_once(
        seed in prop::collection::vec(op(), 0..20),
        id in 0u8..8,
        minute in 0i64..60,
        read in any::<bool>(),
    ) {
        let mut once = LocalStore::new(CAPACITY);
        for op in &seed {
            apply(&mut once, op);
        }
        let mut twice = once.clone();

        once.upsert(record(id, minute, read));
        twice.upsert(record(id, minute, read));
        twice.upsert(record(id, minute, read));

        prop_assert_eq!(once.records(), twice.records());
        prop_assert_eq!(once.unread_count(), twice.unread_count());
    }

    #[test]
    fn ids_stay_unique_and_bounded(ops in prop::collection::vec(op(), 0..60)) {
        let mut store = LocalStore::new(CAPACITY);
        for op in &ops {
            apply(&mut store, op);

            let mut seen = HashSet::new();
            prop_assert!(store.records().iter().all(|r| seen.insert(r.id.clone())));
            prop_assert!(store.len() <= CAPACITY);
        }
    }

    #[test]
    fn local_decrements_floor_at_zero(
        initial in 0u64..4,
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let mut store = LocalStore::new(CAPACITY);
        store.set_unread_count(initial);
        let mut expected = initial;

        for op in &ops {
            match op {
                Op::Upsert { id, minute, read } => {
                    store.upsert(record(*id, *minute, *read));
                }
                Op::Remove(id) => {
                    if let Some(removed) = store.remove(&format!("n{id}")) {
                        if !removed.is_read {
                            expected = expected.saturating_sub(1);
                        }
                    }
                }
                Op::MarkRead(id) => {
                    let id = format!("n{id}");
                    let was_unread = store.get(&id).is_some_and(|r| !r.is_read);
                    let changed = store.mark_read(&id, at(99));
                    prop_assert_eq!(changed, was_unread);
                    if changed {
                        expected = expected.saturating_sub(1);
                    }
                }
            }
            prop_assert_eq!(store.unread_count(), expected);
        }
    }
}
