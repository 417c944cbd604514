// tests/gc_property.rs

use std::collections::BTreeSet;

use changewatch::storage::{
    MemoryStorage, SnapshotReader, SnapshotWriter, SqliteStorage, StateUpdate,
};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// (guid index, payload index) pairs; payloads are drawn from a small set so
// that consecutive duplicates appear.
fn saves_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    proptest::collection::vec((0..5usize, 0..4usize), 0..40)
}

async fn seed(storage: &MemoryStorage, saves: &[(usize, usize)]) {
    for (ts, (g, p)) in saves.iter().enumerate() {
        storage
            .save(&format!("guid-{g}"), &format!("payload-{p}"), ts as f64)
            .await
            .unwrap();
    }
}

/// One step of cache activity. Guids 5 and 6 are never saved to, so they
/// only ever carry last-run state.
#[derive(Debug, Clone)]
enum Op {
    Save { guid: usize, payload: usize },
    Touch { guid: usize, tries: u32, etag: Option<u8> },
    /// Point the current snapshot back at one of the guid's earlier rows.
    Rewind { guid: usize, nth: usize },
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        4 => (0..5usize, 0..4usize).prop_map(|(guid, payload)| Op::Save { guid, payload }),
        2 => (0..7usize, 0..4u32, proptest::option::of(0..3u8))
            .prop_map(|(guid, tries, etag)| Op::Touch { guid, tries, etag }),
        1 => (0..5usize, 0..8usize).prop_map(|(guid, nth)| Op::Rewind { guid, nth }),
    ];
    proptest::collection::vec(op, 0..40)
}

/// Replay `ops` into an empty store. Row ids count up from 1 in every local
/// backend, so the same rewind lands on the same row everywhere.
async fn replay(storage: &dyn SnapshotWriter, ops: &[Op]) {
    let mut next_id = 0i64;
    let mut ids: Vec<Vec<i64>> = vec![Vec::new(); 7];
    for (ts, op) in ops.iter().enumerate() {
        match *op {
            Op::Save { guid, payload } => {
                storage
                    .save(&format!("guid-{guid}"), &format!("payload-{payload}"), ts as f64)
                    .await
                    .unwrap();
                next_id += 1;
                ids[guid].push(next_id);
            }
            Op::Touch { guid, tries, etag } => {
                let update = StateUpdate::new()
                    .name(format!("job {guid}"))
                    .location(format!("loc-{guid}"))
                    .last_checked(ts as f64)
                    .tries(tries)
                    .etag(etag.map(|e| format!("\"e{e}\"")));
                storage.update(&format!("guid-{guid}"), update).await.unwrap();
            }
            Op::Rewind { guid, nth } => {
                if let Some(id) = ids[guid].get(nth % ids[guid].len().max(1)) {
                    let update = StateUpdate::new().last_id(*id);
                    storage.update(&format!("guid-{guid}"), update).await.unwrap();
                }
            }
        }
    }
}

async fn sqlite() -> SqliteStorage {
    SqliteStorage::in_memory().await.unwrap()
}

proptest! {
    #[test]
    fn backup_restore_round_trips_between_memory_and_sqlite(ops in ops_strategy()) {
        runtime().block_on(async {
            let memory = MemoryStorage::new();
            replay(&memory, &ops).await;
            let source = memory.backup().await.unwrap();
            let target = sqlite().await;
            target.restore(source.clone()).await.unwrap();
            prop_assert_eq!(target.backup().await.unwrap(), source);

            let db = sqlite().await;
            replay(&db, &ops).await;
            let source = db.backup().await.unwrap();
            let target = MemoryStorage::new();
            target.restore(source.clone()).await.unwrap();
            prop_assert_eq!(target.backup().await.unwrap(), source);
            Ok(())
        })?;
    }

    #[test]
    fn memory_and_sqlite_agree_on_history(ops in ops_strategy()) {
        runtime().block_on(async {
            let memory = MemoryStorage::new();
            let db = sqlite().await;
            replay(&memory, &ops).await;
            replay(&db, &ops).await;
            prop_assert_eq!(memory.backup().await.unwrap(), db.backup().await.unwrap());
            Ok(())
        })?;
    }

    #[test]
    fn gc_is_idempotent(
        saves in saves_strategy(),
        known in proptest::collection::btree_set(0..5usize, 0..5),
        retain in 1..4usize,
    ) {
        let known: BTreeSet<String> = known.into_iter().map(|g| format!("guid-{g}")).collect();
        runtime().block_on(async {
            let storage = MemoryStorage::new();
            seed(&storage, &saves).await;

            storage.gc(&known, retain).await.unwrap();
            let first = storage.backup().await.unwrap();

            let second_report = storage.gc(&known, retain).await.unwrap();
            let second = storage.backup().await.unwrap();

            prop_assert!(second_report.removed.is_empty());
            prop_assert!(second_report.cleaned.is_empty());
            prop_assert_eq!(first, second);
            Ok(())
        })?;
    }

    #[test]
    fn gc_leaves_only_known_guids(
        saves in saves_strategy(),
        known in proptest::collection::btree_set(0..5usize, 0..5),
    ) {
        let known: BTreeSet<String> = known.into_iter().map(|g| format!("guid-{g}")).collect();
        runtime().block_on(async {
            let storage = MemoryStorage::new();
            seed(&storage, &saves).await;
            let before = storage.get_guids().await.unwrap();

            storage.gc(&known, 1).await.unwrap();
            let after = storage.get_guids().await.unwrap();

            prop_assert!(after.is_subset(&known));
            prop_assert_eq!(after, before.intersection(&known).cloned().collect::<BTreeSet<_>>());
            Ok(())
        })?;
    }

    #[test]
    fn clean_keeps_current_snapshot(saves in saves_strategy()) {
        runtime().block_on(async {
            let storage = MemoryStorage::new();
            seed(&storage, &saves).await;

            for guid in storage.get_guids().await.unwrap() {
                let current = storage.load(&guid, Some(1)).await.unwrap().snapshots;
                storage.clean(&guid).await.unwrap();
                let after = storage.load(&guid, None).await.unwrap().snapshots;
                prop_assert_eq!(after, current);
                prop_assert_eq!(storage.clean(&guid).await.unwrap(), 0);
            }
            Ok(())
        })?;
    }
}
