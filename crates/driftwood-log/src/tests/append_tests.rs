//! Append: clock advancement, next pointers, skip-list references.

use serde_json::json;

use super::{test_log, test_store};

#[tokio::test]
async fn test_append_to_empty_log() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    let entry = log.append(json!("hello"), 1, false).await.unwrap();

    assert_eq!(log.len(), 1);
    assert!(entry.next.is_empty());
    assert_eq!(entry.clock.time, 1);

    let heads = log.heads().unwrap();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].hash, entry.hash);

    let values = log.values().await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].payload, json!("hello"));
}

#[tokio::test]
async fn test_linear_chain() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    let one = log.append(json!("one"), 1, false).await.unwrap();
    let two = log.append(json!("two"), 1, false).await.unwrap();
    let three = log.append(json!("three"), 1, false).await.unwrap();

    assert_eq!(log.len(), 3);

    // Each entry references its immediate predecessor.
    assert_eq!(two.next, vec![one.hash.clone()]);
    assert_eq!(three.next, vec![two.hash.clone()]);

    // Clocks tick 1, 2, 3.
    assert_eq!(
        vec![one.clock.time, two.clock.time, three.clock.time],
        vec![1, 2, 3]
    );

    // The newest entry is the only head.
    let heads = log.heads().unwrap();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].hash, three.hash);

    // Values are presented oldest first.
    let payloads: Vec<_> = log
        .values()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.payload)
        .collect();
    assert_eq!(payloads, vec![json!("one"), json!("two"), json!("three")]);
}

#[tokio::test]
async fn test_append_pins_when_asked() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    let loose = log.append(json!("loose"), 1, false).await.unwrap();
    let pinned = log.append(json!("pinned"), 1, true).await.unwrap();

    assert!(!store.is_pinned(&loose.hash).unwrap());
    assert!(store.is_pinned(&pinned.hash).unwrap());
}

#[tokio::test]
async fn test_refs_on_shallow_log_anchor_the_deepest_entry() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    let e1 = log.append(json!("e1"), 1, false).await.unwrap();
    let e2 = log.append(json!("e2"), 1, false).await.unwrap();
    let e3 = log.append(json!("e3"), 1, false).await.unwrap();

    // Budget of 4 against a depth of 3: distances 1 and 2, plus the
    // deepest reachable entry; the causal parent is never repeated.
    let e4 = log.append(json!("e4"), 4, false).await.unwrap();

    assert_eq!(e4.next, vec![e3.hash.clone()]);
    assert_eq!(e4.refs, vec![e2.hash.clone(), e1.hash.clone()]);
}

#[tokio::test]
async fn test_refs_power_of_two_spacing() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    let mut entries = Vec::new();
    for i in 0..100u32 {
        entries.push(log.append(json!(i), 1, false).await.unwrap());
    }

    let tip = log.append(json!("tip"), 8, false).await.unwrap();

    // Distances 1, 2, 4, 8 from the head e100; distance 1 is the causal
    // parent and is excluded from refs.
    assert_eq!(tip.next, vec![entries[99].hash.clone()]);
    assert_eq!(
        tip.refs,
        vec![
            entries[98].hash.clone(),
            entries[96].hash.clone(),
            entries[92].hash.clone(),
        ]
    );
}

#[tokio::test]
async fn test_refs_never_overlap_next() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    for i in 0..20u32 {
        let entry = log.append(json!(i), 4, false).await.unwrap();
        assert!(
            entry.refs.iter().all(|r| !entry.next.contains(r)),
            "refs and next must be disjoint at entry {i}"
        );
    }
}

#[tokio::test]
async fn test_clock_advances_with_each_append() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    for expected in 1..=10u64 {
        let entry = log.append(json!(expected), 1, false).await.unwrap();
        assert_eq!(entry.clock.time, expected);
        assert_eq!(log.clock().time, expected);
    }
}

#[tokio::test]
async fn test_display_string_renders_newest_first() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");
    log.append(json!("one"), 1, false).await.unwrap();
    log.append(json!("two"), 1, false).await.unwrap();
    log.append(json!("three"), 1, false).await.unwrap();

    let rendered = log.to_display_string(None).await.unwrap();
    assert_eq!(rendered, "\"three\"\n└─\"two\"\n└─\"one\"");

    let plain = log
        .to_display_string(Some(|p: &serde_json::Value| {
            p.as_str().unwrap_or_default().to_string()
        }))
        .await
        .unwrap();
    assert_eq!(plain, "three\n└─two\n└─one");
}

#[tokio::test]
async fn test_appended_entries_are_readable_from_store() {
    let store = test_store();
    let mut log = test_log(&store, 1, "A");

    let entry = log.append(json!("durable"), 1, false).await.unwrap();

    let fetched = crate::entry::Entry::from_multihash(store.as_ref(), &entry.hash)
        .await
        .unwrap();
    assert_eq!(fetched, entry);
}
