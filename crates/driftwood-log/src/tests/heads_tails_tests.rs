//! Heads, tails, and tail hashes.

use serde_json::json;

use super::{test_identity, test_log, test_store};
use crate::log::{Log, LogOptions};

#[tokio::test]
async fn test_find_heads_single_chain() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");
    for i in 0..3 {
        log.append(json!(i), 1, false).await.unwrap();
    }

    let values = log.values().await.unwrap();
    let heads = Log::find_heads(values.iter());
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].hash, values.last().unwrap().hash);
}

#[tokio::test]
async fn test_find_heads_concurrent_entries() {
    let store = test_store();
    let mut a = test_log(&store, 1, "X");
    let mut b = test_log(&store, 2, "X");

    let a1 = a.append(json!("a1"), 1, false).await.unwrap();
    let b1 = b.append(json!("b1"), 1, false).await.unwrap();
    a.join(&b).await.unwrap();

    let values = a.values().await.unwrap();
    let heads = Log::find_heads(values.iter());
    assert_eq!(heads.len(), 2);

    // Sorted by clock id; both forks present.
    let mut found: Vec<String> = heads.iter().map(|e| e.hash.clone()).collect();
    found.sort();
    let mut expected = vec![a1.hash.clone(), b1.hash.clone()];
    expected.sort();
    assert_eq!(found, expected);

    let ids: Vec<&String> = heads.iter().map(|e| &e.clock.id).collect();
    let mut sorted_ids = ids.clone();
    sorted_ids.sort();
    assert_eq!(ids, sorted_ids, "heads must be ordered by clock id");
}

#[tokio::test]
async fn test_find_heads_is_deterministic() {
    let store = test_store();
    let mut a = test_log(&store, 1, "X");
    let mut b = test_log(&store, 2, "X");
    let mut c = test_log(&store, 3, "X");

    a.append(json!("a1"), 1, false).await.unwrap();
    b.append(json!("b1"), 1, false).await.unwrap();
    c.append(json!("c1"), 1, false).await.unwrap();
    a.join(&b).await.unwrap();
    a.join(&c).await.unwrap();

    let values = a.values().await.unwrap();
    let once = Log::find_heads(values.iter());
    let mut shuffled = values.clone();
    shuffled.reverse();
    let twice = Log::find_heads(shuffled.iter());

    let hashes = |heads: &[crate::entry::Entry]| -> Vec<String> {
        heads.iter().map(|e| e.hash.clone()).collect()
    };
    assert_eq!(
        hashes(&once),
        hashes(&twice),
        "head order must not depend on input order"
    );
}

#[tokio::test]
async fn test_find_heads_stable_for_equal_clock_ids() {
    let store = test_store();
    let (keystore, identity) = test_identity(1);

    // Two concurrent heads by the same author: same clock id, no parent
    // relationship.
    let mut forks = Vec::new();
    for payload in ["fork-a", "fork-b"] {
        let entry = crate::entry::Entry::create(
            store.as_ref(),
            keystore.as_ref(),
            &identity,
            "X",
            serde_json::json!(payload),
            &[],
            crate::entry::CreateOpts {
                clock: Some(driftwood_types::LamportClock::with_time(
                    identity.public_key.clone(),
                    1,
                )),
                ..crate::entry::CreateOpts::default()
            },
        )
        .await
        .unwrap();
        forks.push(entry);
    }
    assert_eq!(forks[0].clock.id, forks[1].clock.id);

    let forward = vec![forks[0].clone(), forks[1].clone()];
    let reversed = vec![forks[1].clone(), forks[0].clone()];

    let heads_forward = Log::find_heads(forward.iter());
    let heads_reversed = Log::find_heads(reversed.iter());

    // The sort is stable on clock id, so ties keep their incoming order.
    assert_eq!(heads_forward[0].hash, forks[0].hash);
    assert_eq!(heads_forward[1].hash, forks[1].hash);
    assert_eq!(heads_reversed[0].hash, forks[1].hash);
    assert_eq!(heads_reversed[1].hash, forks[0].hash);
}

#[tokio::test]
async fn test_heads_presented_descending() {
    let store = test_store();
    let mut a = test_log(&store, 1, "X");
    let mut b = test_log(&store, 2, "X");

    a.append(json!("a1"), 1, false).await.unwrap();
    b.append(json!("b1"), 1, false).await.unwrap();
    b.append(json!("b2"), 1, false).await.unwrap();
    a.join(&b).await.unwrap();

    let heads = a.heads().unwrap();
    assert_eq!(heads.len(), 2);
    assert!(
        heads[0].clock.time >= heads[1].clock.time,
        "heads are sorted newest first"
    );
}

#[tokio::test]
async fn test_full_log_tail_is_the_root() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");
    let root = log.append(json!("root"), 1, false).await.unwrap();
    log.append(json!("next"), 1, false).await.unwrap();

    let tails = log.tails().await.unwrap();
    assert_eq!(tails.len(), 1);
    assert_eq!(tails[0].hash, root.hash, "only the root has no parents");
    assert!(log.tail_hashes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_log_exposes_tail_hashes() {
    let store = test_store();
    let mut full = test_log(&store, 1, "A");
    let e1 = full.append(json!("e1"), 1, false).await.unwrap();
    let e2 = full.append(json!("e2"), 1, false).await.unwrap();
    let e3 = full.append(json!("e3"), 1, false).await.unwrap();

    // A replica holding only the newer half of the log.
    let (keystore, identity) = test_identity(2);
    let partial = Log::new(
        store.clone(),
        keystore,
        identity,
        LogOptions {
            id: Some("A".to_string()),
            entries: vec![e2.clone(), e3.clone()],
            ..LogOptions::default()
        },
    )
    .unwrap();

    let tails = partial.tails().await.unwrap();
    assert_eq!(tails.len(), 1);
    assert_eq!(
        tails[0].hash, e2.hash,
        "the oldest held entry references a missing parent"
    );

    let tail_hashes = partial.tail_hashes().await.unwrap();
    assert_eq!(tail_hashes, vec![e1.hash.clone()]);
}

#[tokio::test]
async fn test_find_tail_hashes_order_and_dedup() {
    let store = test_store();
    let mut a = test_log(&store, 1, "X");
    let mut b = test_log(&store, 2, "X");

    let a1 = a.append(json!("a1"), 1, false).await.unwrap();
    let b1 = b.append(json!("b1"), 1, false).await.unwrap();
    a.join(&b).await.unwrap();
    let merge = a.append(json!("merge"), 1, false).await.unwrap();

    // Keep only the merge entry: both parents are missing.
    let (keystore, identity) = test_identity(3);
    let partial = Log::new(
        store.clone(),
        keystore,
        identity,
        LogOptions {
            id: Some("X".to_string()),
            entries: vec![merge.clone()],
            ..LogOptions::default()
        },
    )
    .unwrap();

    let mut tail_hashes = partial.tail_hashes().await.unwrap();
    tail_hashes.sort();
    let mut expected = vec![a1.hash.clone(), b1.hash.clone()];
    expected.sort();
    assert_eq!(tail_hashes, expected);
}
