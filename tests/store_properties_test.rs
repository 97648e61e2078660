//! Property tests for failure store ordering and retry bookkeeping.

use chrono::{Duration, Utc};
use menu_events::storage::{FailureRecord, FailureStore, InMemoryFailureStore};
use proptest::prelude::*;
use serde_json::json;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Ages in seconds plus a processed flag for each record
fn records_strategy() -> impl Strategy<Value = Vec<(i64, bool)>> {
    prop::collection::vec((0i64..86_400, any::<bool>()), 0..40)
}

proptest! {
    #[test]
    fn unprocessed_listing_is_oldest_first_and_bounded(
        specs in records_strategy(),
        limit in 1usize..60,
    ) {
        let rt = runtime();
        let store = InMemoryFailureStore::new();
        let now = Utc::now();

        for (i, (age, processed)) in specs.iter().enumerate() {
            let mut record = FailureRecord::new(format!("r{i:03}"), "menu.updated", json!({"i": i}), "err");
            record.created_at = now - Duration::seconds(*age);
            record.processed = *processed;
            store.put(record);
        }

        let listed = rt.block_on(store.list_unprocessed(limit)).unwrap();
        let pending = specs.iter().filter(|(_, processed)| !processed).count();

        prop_assert_eq!(listed.len(), pending.min(limit));
        prop_assert!(listed.iter().all(|r| !r.processed));
        prop_assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn retry_count_and_version_only_grow(increments in 1usize..20) {
        let rt = runtime();
        let store = InMemoryFailureStore::new();

        rt.block_on(async {
            let record = store.save("item.removed", &json!({}), "initial").await.unwrap();
            let mut previous = record;

            for n in 0..increments {
                let updated = store
                    .increment_retry(&previous.id, &format!("attempt {n}"))
                    .await
                    .unwrap();
                prop_assert_eq!(updated.retry_count, previous.retry_count + 1);
                prop_assert_eq!(updated.version, previous.version + 1);
                prop_assert!(updated.updated_at >= previous.updated_at);
                previous = updated;
            }

            prop_assert_eq!(previous.retry_count as usize, increments);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
