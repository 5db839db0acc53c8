mod common;

use common::TestHost;
use remoteinv::inventory::adapter::v1_9;
use remoteinv::inventory::{InvError, ItemStack, ParticipantId, ReleaseOutcome};

fn stocked() -> v1_9::PlayerInventory {
    let mut inv = v1_9::PlayerInventory::new();
    inv.items[0] = Some(ItemStack::new("stone", 64));
    inv.armor[0] = Some(ItemStack::new("leather_boots", 1));
    inv
}

fn expect_closed(outcome: ReleaseOutcome) -> remoteinv::inventory::Teardown {
    match outcome {
        ReleaseOutcome::Closed(teardown) => teardown,
        other => panic!("expected Closed, got {:?}", other),
    }
}

#[test]
fn offline_edits_flush_once_when_last_viewer_leaves() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let a = ParticipantId::new_random();
    let b = ParticipantId::new_random();

    let ha = mgr.acquire(&a, &target).expect("primary open");
    let hb = mgr.acquire(&b, &target).expect("mirror join");
    assert!(ha.snapshot().same_as(hb.snapshot()));
    assert!(ha.is_primary());
    assert!(!hb.is_primary());

    ha.set(1, Some(ItemStack::new("torch", 16))).expect("primary write");
    assert_eq!(hb.get(1).unwrap(), Some(ItemStack::new("torch", 16)));
    assert!(matches!(
        hb.set(2, Some(ItemStack::new("dirt", 1))),
        Err(InvError::ReadOnlyView(_))
    ));

    match mgr.release(&a, &target.id).expect("release primary") {
        ReleaseOutcome::Promoted { primary } => assert_eq!(primary, b),
        other => panic!("expected promotion, got {:?}", other),
    }
    assert!(hb.is_primary());
    hb.set(2, Some(ItemStack::new("dirt", 3))).expect("promoted write");
    assert_eq!(host.data.write_count(&target.id), 0);

    let teardown = expect_closed(mgr.release(&b, &target.id).expect("release last"));
    assert!(!mgr.is_open(&target.id));
    assert_eq!(host.data.write_count(&target.id), 0);
    teardown.run().expect("teardown");

    assert_eq!(host.data.write_count(&target.id), 1);
    assert!(hb.snapshot().is_closed());
    let stored = host.stored_v19(&target.id);
    assert_eq!(stored.items[0], Some(ItemStack::new("stone", 64)));
    assert_eq!(stored.items[1], Some(ItemStack::new("torch", 16)));
    assert_eq!(stored.items[2], Some(ItemStack::new("dirt", 3)));
}

#[test]
fn oldest_mirror_is_promoted_first() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let (a, b, c) = (
        ParticipantId::new_random(),
        ParticipantId::new_random(),
        ParticipantId::new_random(),
    );
    for op in [a, b, c] {
        let _ = mgr.acquire(&op, &target).expect("open");
    }
    assert_eq!(mgr.session(&target.id).unwrap().viewers(), &[a, b, c]);

    assert!(matches!(
        mgr.release(&a, &target.id).unwrap(),
        ReleaseOutcome::Promoted { primary } if primary == b
    ));
    assert!(matches!(
        mgr.release(&b, &target.id).unwrap(),
        ReleaseOutcome::Promoted { primary } if primary == c
    ));
    expect_closed(mgr.release(&c, &target.id).unwrap())
        .run()
        .expect("teardown");
    assert_eq!(host.data.write_count(&target.id), 1);
}

#[test]
fn mirror_leaving_keeps_primary() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let (a, b, c) = (
        ParticipantId::new_random(),
        ParticipantId::new_random(),
        ParticipantId::new_random(),
    );
    let ha = mgr.acquire(&a, &target).unwrap();
    let _ = mgr.acquire(&b, &target).unwrap();
    let _ = mgr.acquire(&c, &target).unwrap();

    assert!(matches!(
        mgr.release(&b, &target.id).unwrap(),
        ReleaseOutcome::Detached
    ));
    assert!(ha.is_primary());
    assert_eq!(mgr.session(&target.id).unwrap().mirrors(), &[c]);
    assert_eq!(host.data.write_count(&target.id), 0);
    drop(mgr.drain());
}

#[test]
fn interleaved_open_and_close_flushes_exactly_once() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let (a, b, c) = (
        ParticipantId::new_random(),
        ParticipantId::new_random(),
        ParticipantId::new_random(),
    );

    let first = mgr.acquire(&a, &target).unwrap();
    let _ = mgr.acquire(&b, &target).unwrap();
    assert!(!matches!(
        mgr.release(&a, &target.id).unwrap(),
        ReleaseOutcome::Closed(_)
    ));
    let late = mgr.acquire(&c, &target).unwrap();
    assert_eq!(late.session_id(), first.session_id());
    assert!(!matches!(
        mgr.release(&b, &target.id).unwrap(),
        ReleaseOutcome::Closed(_)
    ));
    assert!(late.is_primary());
    expect_closed(mgr.release(&c, &target.id).unwrap())
        .run()
        .unwrap();

    assert_eq!(host.data.write_count(&target.id), 1);
    assert!(matches!(
        mgr.release(&c, &target.id),
        Err(InvError::NotViewing { .. })
    ));
}

#[test]
fn reopening_after_close_reads_flushed_data() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let op = ParticipantId::new_random();

    let first = mgr.acquire(&op, &target).unwrap();
    first.set(40, Some(ItemStack::new("shield", 1))).unwrap();
    expect_closed(mgr.release(&op, &target.id).unwrap())
        .run()
        .unwrap();

    let second = mgr.acquire(&op, &target).unwrap();
    assert_ne!(second.session_id(), first.session_id());
    assert!(!second.snapshot().same_as(first.snapshot()));
    assert_eq!(second.get(40).unwrap(), Some(ItemStack::new("shield", 1)));
    drop(mgr.drain());
}

#[test]
fn corrupt_record_leaves_no_session_and_retry_starts_clean() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    host.data.put_raw(target.id, b"\x1f\x8b not really gzip".to_vec());
    let mut mgr = host.manager("v1_9_R1");
    let op = ParticipantId::new_random();

    let err = mgr.acquire(&op, &target).unwrap_err();
    assert!(matches!(err, InvError::CorruptData { .. }), "got {:?}", err);
    assert!(!mgr.is_open(&target.id));
    assert!(mgr.is_empty());
    assert_eq!(host.data.write_count(&target.id), 0);

    host.data
        .put_raw(target.id, v1_9::encode_player_data(&stocked()).unwrap());
    let handle = mgr.acquire(&op, &target).expect("retry");
    assert!(handle.is_primary());
    assert_eq!(mgr.session(&target.id).unwrap().viewers(), &[op]);
    drop(mgr.drain());
}

#[test]
fn missing_record_is_data_unavailable() {
    let host = TestHost::new();
    let ghost = remoteinv::inventory::ParticipantRef::offline(ParticipantId::new_random(), "Ghost");
    let mut mgr = host.manager("v1_9_R1");
    assert!(matches!(
        mgr.acquire(&ParticipantId::new_random(), &ghost),
        Err(InvError::DataUnavailable(_))
    ));
    assert!(mgr.is_empty());
}

#[test]
fn live_snapshot_is_shared_with_the_running_host() {
    let host = TestHost::new();
    let (target, native) = host.online_v19("Steve", stocked());
    let mut mgr = host.manager("v1_9_R1");
    let a = ParticipantId::new_random();
    let b = ParticipantId::new_random();

    let ha = mgr.acquire(&a, &target).unwrap();
    let hb = mgr.acquire(&b, &target).unwrap();
    assert!(ha.snapshot().is_live());

    ha.set(5, Some(ItemStack::new("apple", 3))).unwrap();
    assert_eq!(hb.get(5).unwrap(), Some(ItemStack::new("apple", 3)));
    assert_eq!(
        native.lock().unwrap().items[5],
        Some(ItemStack::new("apple", 3))
    );

    // The participant moving items in-world is visible to both operators.
    native.lock().unwrap().items[6] = Some(ItemStack::new("bread", 2));
    assert_eq!(ha.get(6).unwrap(), Some(ItemStack::new("bread", 2)));
    assert_eq!(native.lock().unwrap().viewers(), &[a, b]);

    let _ = mgr.release(&a, &target.id).unwrap();
    expect_closed(mgr.release(&b, &target.id).unwrap())
        .run()
        .unwrap();
    assert!(native.lock().unwrap().viewers().is_empty());
    assert_eq!(host.data.write_count(&target.id), 0);
}

#[test]
fn dropped_teardown_still_flushes() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let op = ParticipantId::new_random();
    let handle = mgr.acquire(&op, &target).unwrap();
    handle.set(3, Some(ItemStack::new("coal", 8))).unwrap();

    let outcome = mgr.release(&op, &target.id).unwrap();
    drop(outcome);

    assert_eq!(host.data.write_count(&target.id), 1);
    assert!(handle.snapshot().is_closed());
    assert_eq!(
        host.stored_v19(&target.id).items[3],
        Some(ItemStack::new("coal", 8))
    );
}

#[test]
fn writes_after_close_are_refused() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let op = ParticipantId::new_random();
    let handle = mgr.acquire(&op, &target).unwrap();
    expect_closed(mgr.release(&op, &target.id).unwrap())
        .run()
        .unwrap();
    assert!(handle.set(0, None).is_err());
    assert_eq!(host.data.write_count(&target.id), 1);
}

#[test]
fn zero_amount_write_empties_the_slot() {
    let host = TestHost::new();
    let target = host.offline_v19("Alex", &stocked());
    let mut mgr = host.manager("v1_9_R1");
    let op = ParticipantId::new_random();
    let handle = mgr.acquire(&op, &target).unwrap();
    handle.set(0, Some(ItemStack::new("stone", 0))).unwrap();
    assert_eq!(handle.get(0).unwrap(), None);
    expect_closed(mgr.release(&op, &target.id).unwrap())
        .run()
        .unwrap();
    assert_eq!(host.stored_v19(&target.id).items[0], None);
}
