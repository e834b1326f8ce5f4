//! Integration tests for the informer engine against the in-memory store.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use serde_json::json;

use mesh_informer::{
    layout, Informer, InformerError, MemoryStore, PathExpr, ServiceSpec, SpecChange, WatchFlow,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_TIMEOUT: Duration = Duration::from_millis(150);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn service_doc(name: &str, policy: &str, canary_weight: u64) -> String {
    json!({
        "name": name,
        "registerTenant": "default",
        "loadBalance": { "policy": policy },
        "canary": { "weight": canary_weight },
    })
    .to_string()
}

/// Poll until `f` holds or the deadline passes.
fn wait_until(f: impl Fn() -> bool) {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while Instant::now() < deadline {
        if f() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached within deadline");
}

fn collect_spec_changes(
    informer: &Informer<MemoryStore>,
    service: &str,
    path: PathExpr,
) -> Receiver<SpecChange<ServiceSpec>> {
    let (tx, rx) = unbounded();
    informer
        .on_part_of_service_spec(service, path, move |change| {
            tx.send(change).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    rx
}

#[test]
fn test_priming_then_filtered_updates_then_delete() {
    let store = MemoryStore::new();
    store.put(&layout::service_spec_key("orders"), &service_doc("orders", "roundRobin", 10));

    let informer = Informer::new(store.clone());
    let rx = collect_spec_changes(&informer, "orders", PathExpr::LOAD_BALANCE);

    // Priming delivery carries the baseline, unconditionally.
    match rx.recv_timeout(RECV_TIMEOUT).unwrap() {
        SpecChange::Update { spec, .. } => {
            assert_eq!(spec.load_balance.unwrap().policy, "roundRobin");
        }
        other => panic!("expected priming update, got {:?}", other),
    }

    // Change outside the watched path: suppressed.
    store.put(&layout::service_spec_key("orders"), &service_doc("orders", "roundRobin", 90));
    // Change at the watched path: delivered.
    store.put(&layout::service_spec_key("orders"), &service_doc("orders", "ipHash", 90));

    match rx.recv_timeout(RECV_TIMEOUT).unwrap() {
        SpecChange::Update { spec, .. } => {
            assert_eq!(spec.load_balance.unwrap().policy, "ipHash");
        }
        other => panic!("expected load-balance update, got {:?}", other),
    }

    // Deletions are never suppressed.
    store.delete(&layout::service_spec_key("orders"));
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), SpecChange::Delete);

    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());
}

#[test]
fn test_diff_is_against_latest_raw_value_not_last_delivered() {
    let store = MemoryStore::new();
    let key = layout::service_spec_key("orders");
    store.put(&key, &service_doc("orders", "roundRobin", 10));

    let informer = Informer::new(store.clone());
    let rx = collect_spec_changes(&informer, "orders", PathExpr::LOAD_BALANCE);
    rx.recv_timeout(RECV_TIMEOUT).unwrap(); // priming

    // Suppressed canary change moves the internal baseline forward; a
    // subsequent put restoring the same canary but same policy must still
    // be suppressed.
    store.put(&key, &service_doc("orders", "roundRobin", 90));
    store.put(&key, &service_doc("orders", "roundRobin", 10));
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());
}

#[test]
fn test_register_on_missing_key_is_not_found() {
    let informer = Informer::new(MemoryStore::new());
    let err = informer
        .on_part_of_service_spec("ghost", PathExpr::WHOLE, |_| WatchFlow::Continue)
        .unwrap_err();
    assert!(matches!(err, InformerError::NotFound(_)));
    assert_eq!(informer.watch_count(), 0);
}

#[test]
fn test_duplicate_watch_key_fails_until_cancelled() {
    let store = MemoryStore::new();
    store.put(&layout::service_spec_key("orders"), &service_doc("orders", "roundRobin", 10));

    let informer = Informer::new(store);
    informer
        .on_part_of_service_spec("orders", PathExpr::WHOLE, |_| WatchFlow::Continue)
        .unwrap();

    let err = informer
        .on_part_of_service_spec("orders", PathExpr::WHOLE, |_| WatchFlow::Continue)
        .unwrap_err();
    assert!(matches!(err, InformerError::AlreadyWatched(_)));

    // A different path is a different watch key.
    informer
        .on_part_of_service_spec("orders", PathExpr::CANARY, |_| WatchFlow::Continue)
        .unwrap();
    assert_eq!(informer.watch_count(), 2);

    informer.stop_watch_service_spec("orders", &PathExpr::WHOLE);
    informer
        .on_part_of_service_spec("orders", PathExpr::WHOLE, |_| WatchFlow::Continue)
        .unwrap();
}

#[test]
fn test_stop_from_callback_tears_down_and_cancel_is_noop() {
    let store = MemoryStore::new();
    let key = layout::service_spec_key("orders");
    store.put(&key, &service_doc("orders", "roundRobin", 10));

    let informer = Informer::new(store.clone());
    let (tx, rx) = unbounded();
    informer
        .on_part_of_service_spec("orders", PathExpr::WHOLE, move |change| {
            tx.send(change).unwrap();
            WatchFlow::Stop
        })
        .unwrap();

    // Exactly the priming delivery, then teardown.
    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    wait_until(|| informer.watch_count() == 0);

    store.put(&key, &service_doc("orders", "ipHash", 10));
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());

    // Cancelling the already-removed subscription is a no-op.
    informer.stop_watch_service_spec("orders", &PathExpr::WHOLE);
    assert_eq!(informer.watch_count(), 0);
}

#[test]
fn test_prefix_snapshot_lifecycle() {
    let store = MemoryStore::new();
    let key_a = layout::service_spec_key("a");
    let key_b = layout::service_spec_key("b");
    store.put(&key_a, &service_doc("a", "roundRobin", 1));
    store.put(&key_b, &service_doc("b", "roundRobin", 2));

    let informer = Informer::new(store.clone());
    let (tx, rx) = unbounded();
    informer
        .on_service_specs("", move |specs: &HashMap<String, ServiceSpec>| {
            tx.send(specs.clone()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();

    // Priming snapshot contains both members.
    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[&key_a].name, "a");
    assert_eq!(first[&key_b].name, "b");

    // Update one member: the whole current snapshot is delivered.
    store.put(&key_a, &service_doc("a", "ipHash", 1));
    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(second.len(), 2);
    assert_eq!(second[&key_a].load_balance.as_ref().unwrap().policy, "ipHash");

    // Delete one member: it disappears from the snapshot.
    store.delete(&key_b);
    let third = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(third.len(), 1);
    assert!(third.contains_key(&key_a));
}

#[test]
fn test_prefix_unchanged_member_rewrite_is_suppressed() {
    let store = MemoryStore::new();
    let key = layout::service_spec_key("a");
    store.put(&key, &service_doc("a", "roundRobin", 1));

    let informer = Informer::new(store.clone());
    let (tx, rx) = unbounded();
    informer
        .on_service_specs("", move |specs: &HashMap<String, ServiceSpec>| {
            tx.send(specs.len()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    rx.recv_timeout(RECV_TIMEOUT).unwrap(); // priming

    // Re-writing the identical document changes nothing in the snapshot.
    store.put(&key, &service_doc("a", "roundRobin", 1));
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());
}

#[test]
fn test_prefix_over_empty_set_registers_and_catches_first_put() {
    let store = MemoryStore::new();
    // Unrelated traffic moves the store revision before registration.
    store.put("/unrelated", "x");

    let informer = Informer::new(store.clone());
    let (tx, rx) = unbounded();
    informer
        .on_service_instance_specs("orders", move |specs| {
            tx.send(specs.clone()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();

    // No members yet: no priming delivery until something exists.
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());

    let key = layout::service_instance_spec_key("orders", "i-1");
    store.put(&key, &json!({"serviceName": "orders", "instanceId": "i-1"}).to_string());

    let snapshot = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[&key].instance_id, "i-1");
}

#[test]
fn test_malformed_document_is_skipped_not_fatal() {
    init_tracing();
    let store = MemoryStore::new();
    let key = layout::service_spec_key("orders");
    store.put(&key, "{not json");

    let informer = Informer::new(store.clone());
    let rx = collect_spec_changes(&informer, "orders", PathExpr::WHOLE);

    // Priming fails to decode: skipped, subscription stays alive.
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());
    assert_eq!(informer.watch_count(), 1);

    store.put(&key, &service_doc("orders", "roundRobin", 10));
    match rx.recv_timeout(RECV_TIMEOUT).unwrap() {
        SpecChange::Update { spec, .. } => assert_eq!(spec.name, "orders"),
        other => panic!("expected update, got {:?}", other),
    }
}

#[test]
fn test_prefix_snapshot_drops_malformed_members() {
    init_tracing();
    let store = MemoryStore::new();
    let good = layout::service_spec_key("good");
    let bad = layout::service_spec_key("bad");
    store.put(&good, &service_doc("good", "roundRobin", 1));
    store.put(&bad, "{broken");

    let informer = Informer::new(store);
    let (tx, rx) = unbounded();
    informer
        .on_service_specs("", move |specs: &HashMap<String, ServiceSpec>| {
            tx.send(specs.clone()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();

    let snapshot = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key(&good));
}

#[test]
fn test_close_shuts_everything_down() {
    let store = MemoryStore::new();
    store.put(&layout::service_spec_key("orders"), &service_doc("orders", "roundRobin", 10));
    store.put(&layout::tenant_spec_key("acme"), &json!({"name": "acme"}).to_string());

    let informer = Informer::new(store.clone());
    let (tx, rx) = unbounded();
    let update_tx = tx.clone();
    informer
        .on_part_of_service_spec("orders", PathExpr::WHOLE, move |_| {
            update_tx.send(()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    informer
        .on_part_of_tenant_spec("acme", PathExpr::WHOLE, move |_| {
            tx.send(()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    informer.on_service_specs("", |_| WatchFlow::Continue).unwrap();
    assert_eq!(informer.watch_count(), 3);

    // Drain the two priming deliveries.
    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    rx.recv_timeout(RECV_TIMEOUT).unwrap();

    informer.close();
    assert_eq!(informer.watch_count(), 0);

    // Closed handles deliver nothing more.
    store.put(&layout::service_spec_key("orders"), &service_doc("orders", "ipHash", 10));
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());

    let err = informer
        .on_part_of_service_spec("orders", PathExpr::WHOLE, |_| WatchFlow::Continue)
        .unwrap_err();
    assert!(matches!(err, InformerError::Closed));
}

#[test]
fn test_concurrent_cancel_and_close_do_not_race() {
    for _ in 0..20 {
        let store = MemoryStore::new();
        store.put(&layout::service_spec_key("orders"), &service_doc("orders", "roundRobin", 10));

        let informer = std::sync::Arc::new(Informer::new(store));
        informer
            .on_part_of_service_spec("orders", PathExpr::WHOLE, |_| WatchFlow::Continue)
            .unwrap();

        let canceller = {
            let informer = std::sync::Arc::clone(&informer);
            thread::spawn(move || informer.stop_watch_service_spec("orders", &PathExpr::WHOLE))
        };
        informer.close();
        canceller.join().unwrap();
        assert_eq!(informer.watch_count(), 0);
    }
}

#[test]
fn test_instance_status_and_ingress_bindings() {
    let store = MemoryStore::new();
    let status_key = layout::service_instance_status_key("orders", "i-1");
    store.put(
        &status_key,
        &json!({"serviceName": "orders", "instanceId": "i-1", "status": "UP"}).to_string(),
    );
    store.put(
        &layout::ingress_spec_key("edge"),
        &json!({"name": "edge", "rules": [{"host": "example.com"}]}).to_string(),
    );

    let informer = Informer::new(store.clone());

    let (status_tx, status_rx) = unbounded();
    informer
        .on_part_of_instance_status("orders", "i-1", PathExpr::new("status"), move |change| {
            status_tx.send(change).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    match status_rx.recv_timeout(RECV_TIMEOUT).unwrap() {
        SpecChange::Update { spec, .. } => assert_eq!(spec.status, "UP"),
        other => panic!("expected priming status, got {:?}", other),
    }

    // Heartbeat-only rewrite does not touch the watched path.
    store.put(
        &status_key,
        &json!({"serviceName": "orders", "instanceId": "i-1", "status": "UP",
                "lastHeartbeatTime": "t1"})
        .to_string(),
    );
    assert!(status_rx.recv_timeout(QUIET_TIMEOUT).is_err());

    let (ingress_tx, ingress_rx) = unbounded();
    informer
        .on_ingress_specs(move |specs| {
            ingress_tx.send(specs.len()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    assert_eq!(ingress_rx.recv_timeout(RECV_TIMEOUT).unwrap(), 1);
}

#[test]
fn test_burst_of_distinct_changes_delivered_in_commit_order() {
    let store = MemoryStore::new();
    let key = layout::service_spec_key("orders");
    store.put(&key, &service_doc("orders", "p0", 10));

    let informer = Informer::new(store.clone());
    let rx = collect_spec_changes(&informer, "orders", PathExpr::LOAD_BALANCE);
    rx.recv_timeout(RECV_TIMEOUT).unwrap(); // priming

    // Three distinct changes at the watched path, interleaved with one
    // unrelated change: exactly three updates, in commit order.
    store.put(&key, &service_doc("orders", "p1", 10));
    store.put(&key, &service_doc("orders", "p1", 90));
    store.put(&key, &service_doc("orders", "p2", 90));
    store.put(&key, &service_doc("orders", "p3", 90));

    let mut last_revision = None;
    for expected in ["p1", "p2", "p3"] {
        match rx.recv_timeout(RECV_TIMEOUT).unwrap() {
            SpecChange::Update { revision, spec } => {
                assert_eq!(spec.load_balance.unwrap().policy, expected);
                if let Some(prev) = last_revision {
                    assert!(revision > prev);
                }
                last_revision = Some(revision);
            }
            other => panic!("expected update, got {:?}", other),
        }
    }
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());
}

#[test]
fn test_scoped_prefix_watches_coexist() {
    let store = MemoryStore::new();
    let key_checkout = layout::service_spec_key("shop-checkout");
    let key_cart = layout::service_spec_key("shop-cart");
    let key_auth = layout::service_spec_key("auth");
    store.put(&key_checkout, &service_doc("shop-checkout", "roundRobin", 1));
    store.put(&key_cart, &service_doc("shop-cart", "roundRobin", 2));
    store.put(&key_auth, &service_doc("auth", "roundRobin", 3));

    let informer = Informer::new(store.clone());

    // Two differently-scoped plural watches are distinct subscriptions.
    let (shop_tx, shop_rx) = unbounded();
    informer
        .on_service_specs("shop-", move |specs: &HashMap<String, ServiceSpec>| {
            shop_tx.send(specs.clone()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    let (all_tx, all_rx) = unbounded();
    informer
        .on_service_specs("", move |specs: &HashMap<String, ServiceSpec>| {
            all_tx.send(specs.len()).unwrap();
            WatchFlow::Continue
        })
        .unwrap();
    assert_eq!(informer.watch_count(), 2);

    let shop = shop_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(shop.len(), 2);
    assert!(shop.contains_key(&key_checkout));
    assert!(!shop.contains_key(&key_auth));
    assert_eq!(all_rx.recv_timeout(RECV_TIMEOUT).unwrap(), 3);

    // A change outside the scope reaches only the wider watch.
    store.put(&key_auth, &service_doc("auth", "ipHash", 3));
    assert_eq!(all_rx.recv_timeout(RECV_TIMEOUT).unwrap(), 3);
    assert!(shop_rx.recv_timeout(QUIET_TIMEOUT).is_err());

    // Stopping one scope leaves the other alive.
    informer.stop_watch_service_specs("shop-");
    wait_until(|| informer.watch_count() == 1);
    store.put(&key_cart, &service_doc("shop-cart", "ipHash", 2));
    assert_eq!(all_rx.recv_timeout(RECV_TIMEOUT).unwrap(), 3);
}

#[test]
fn test_stop_from_prefix_callback_tears_down() {
    let store = MemoryStore::new();
    let key_a = layout::service_spec_key("a");
    store.put(&key_a, &service_doc("a", "roundRobin", 1));

    let informer = Informer::new(store.clone());
    let (tx, rx) = unbounded();
    informer
        .on_service_specs("", move |specs: &HashMap<String, ServiceSpec>| {
            tx.send(specs.clone()).unwrap();
            WatchFlow::Stop
        })
        .unwrap();

    // Exactly the priming snapshot, then teardown.
    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    wait_until(|| informer.watch_count() == 0);

    store.put(&layout::service_spec_key("b"), &service_doc("b", "roundRobin", 2));
    assert!(rx.recv_timeout(QUIET_TIMEOUT).is_err());

    // Cancelling the already-removed subscription is a no-op.
    informer.stop_watch_service_specs("");
    assert_eq!(informer.watch_count(), 0);
}
