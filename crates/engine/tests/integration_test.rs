//! Integration tests for the transaction coordinator

use repdb_engine::{
    AbortReason, CommittedWrite, EngineConfig, Event, Instruction, LockMode, SiteId, Timestamp,
    TransactionCoordinator, TransactionId, TransactionStatus, VariableId, WaitTarget, WriteScope,
};

fn tx(id: u32) -> TransactionId {
    TransactionId::new(id)
}

fn x(index: u32) -> VariableId {
    VariableId::new(index)
}

fn site(id: u32) -> SiteId {
    SiteId::new(id)
}

fn coordinator() -> TransactionCoordinator {
    TransactionCoordinator::new(EngineConfig::default()).unwrap()
}

fn exec(tc: &mut TransactionCoordinator, instruction: Instruction) -> Vec<Event> {
    tc.execute(instruction).expect("valid instruction")
}

fn begin(tc: &mut TransactionCoordinator, id: u32) {
    exec(tc, Instruction::Begin { txn: tx(id) });
}

fn read(tc: &mut TransactionCoordinator, id: u32, var: u32) -> Vec<Event> {
    exec(tc, Instruction::Read { txn: tx(id), variable: x(var) })
}

fn write(tc: &mut TransactionCoordinator, id: u32, var: u32, value: i64) -> Vec<Event> {
    exec(tc, Instruction::Write { txn: tx(id), variable: x(var), value })
}

fn end(tc: &mut TransactionCoordinator, id: u32) -> Vec<Event> {
    exec(tc, Instruction::End { txn: tx(id) })
}

fn all_sites() -> Vec<SiteId> {
    (1..=10).map(site).collect()
}

// ============================================================================
// Basic read/write/commit
// ============================================================================

#[test]
fn test_replicated_write_commits_everywhere() {
    let mut tc = coordinator();
    begin(&mut tc, 1);

    let events = write(&mut tc, 1, 2, 99);
    assert_eq!(
        events,
        vec![Event::Wrote {
            txn: tx(1),
            variable: x(2),
            value: 99,
            scope: WriteScope::AllSites,
        }]
    );
    for s in all_sites() {
        assert_eq!(tc.site(s).unwrap().lock_mode(tx(1), x(2)), Some(LockMode::Exclusive));
    }

    let events = end(&mut tc, 1);
    assert_eq!(
        events,
        vec![Event::Committed {
            txn: tx(1),
            writes: vec![CommittedWrite {
                variable: x(2),
                value: 99,
                scope: WriteScope::AllSites,
                sites: all_sites(),
            }],
        }]
    );

    for s in all_sites() {
        let copy = tc.site(s).unwrap().variable(x(2)).unwrap();
        assert_eq!(copy.value(), 99);
        assert_eq!(copy.version_before(Timestamp::new(4)), Some((Timestamp::new(3), 99)));
        assert!(tc.site(s).unwrap().lock_table().is_empty());
    }
    assert_eq!(tc.transaction(tx(1)).unwrap().status(), TransactionStatus::Committed);
}

#[test]
fn test_single_copy_write_goes_to_owner() {
    let mut tc = coordinator();
    begin(&mut tc, 1);

    let events = write(&mut tc, 1, 1, 5);
    assert_eq!(
        events,
        vec![Event::Wrote {
            txn: tx(1),
            variable: x(1),
            value: 5,
            scope: WriteScope::Site(site(2)),
        }]
    );
    assert_eq!(tc.transaction(tx(1)).unwrap().presence_at(site(2)), 1);
    assert_eq!(tc.transaction(tx(1)).unwrap().presence_at(site(1)), 0);
}

#[test]
fn test_snapshot_ignores_later_commit() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    write(&mut tc, 1, 1, 5);
    exec(&mut tc, Instruction::BeginReadOnly { txn: tx(2) });

    assert_eq!(read(&mut tc, 2, 1), vec![Event::Read { txn: tx(2), variable: x(1), value: 10 }]);
    end(&mut tc, 1);
    assert_eq!(read(&mut tc, 2, 1), vec![Event::Read { txn: tx(2), variable: x(1), value: 10 }]);

    exec(&mut tc, Instruction::BeginReadOnly { txn: tx(3) });
    assert_eq!(read(&mut tc, 3, 1), vec![Event::Read { txn: tx(3), variable: x(1), value: 5 }]);

    // Read-only transactions never lock
    assert!(tc.site(site(2)).unwrap().lock_table().is_empty());
}

#[test]
fn test_read_only_transaction_is_not_blocked_by_writer() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    write(&mut tc, 1, 4, 1);
    exec(&mut tc, Instruction::BeginReadOnly { txn: tx(2) });

    assert_eq!(read(&mut tc, 2, 4), vec![Event::Read { txn: tx(2), variable: x(4), value: 40 }]);
    let events = end(&mut tc, 2);
    assert_eq!(events, vec![Event::Committed { txn: tx(2), writes: vec![] }]);
}

// ============================================================================
// Lock queues
// ============================================================================

#[test]
fn test_contiguous_readers_granted_together() {
    let mut tc = coordinator();
    for id in 1..=4 {
        begin(&mut tc, id);
    }
    write(&mut tc, 1, 2, 50);
    read(&mut tc, 2, 2);
    read(&mut tc, 3, 2);
    write(&mut tc, 4, 2, 60);
    assert_eq!(tc.lock_queue(x(2)), vec![tx(2), tx(3), tx(4)]);

    let events = end(&mut tc, 1);
    assert!(matches!(events[0], Event::Committed { .. }));
    assert_eq!(
        &events[1..],
        &[
            Event::Read { txn: tx(2), variable: x(2), value: 50 },
            Event::Read { txn: tx(3), variable: x(2), value: 50 },
        ]
    );
    assert_eq!(tc.lock_queue(x(2)), vec![tx(4)]);
    assert_eq!(tc.waits_for(tx(4)), vec![tx(2), tx(3)]);

    end(&mut tc, 2);
    assert_eq!(tc.lock_queue(x(2)), vec![tx(4)]);
    let events = end(&mut tc, 3);
    assert_eq!(
        events[1],
        Event::Wrote { txn: tx(4), variable: x(2), value: 60, scope: WriteScope::AllSites }
    );
}

#[test]
fn test_waiting_event_names_blockers() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    begin(&mut tc, 2);
    read(&mut tc, 1, 3);

    let events = write(&mut tc, 2, 3, 7);
    assert_eq!(
        events,
        vec![Event::Waiting {
            txn: tx(2),
            variable: x(3),
            on: WaitTarget::Lock { blockers: vec![tx(1)] },
        }]
    );
}

#[test]
fn test_lock_tables_stay_consistent() {
    let mut tc = coordinator();
    let script = [
        Instruction::Begin { txn: tx(1) },
        Instruction::Begin { txn: tx(2) },
        Instruction::Begin { txn: tx(3) },
        Instruction::Read { txn: tx(1), variable: x(2) },
        Instruction::Read { txn: tx(2), variable: x(2) },
        Instruction::Write { txn: tx(3), variable: x(2), value: 1 },
        Instruction::Write { txn: tx(1), variable: x(4), value: 2 },
        Instruction::Fail { site: site(3) },
        Instruction::Read { txn: tx(3), variable: x(4) },
        Instruction::Recover { site: site(3) },
        Instruction::End { txn: tx(2) },
        Instruction::End { txn: tx(3) },
    ];

    for instruction in script {
        exec(&mut tc, instruction);
        for s in tc.data().sites() {
            assert!(s.lock_table().all_consistent(), "site {} after {:?}", s.id(), instruction);
        }
    }
}

// ============================================================================
// Deadlock
// ============================================================================

#[test]
fn test_deadlock_aborts_requester_when_youngest() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    begin(&mut tc, 2);
    write(&mut tc, 1, 1, 1);
    write(&mut tc, 2, 2, 2);
    read(&mut tc, 1, 2);

    let events = read(&mut tc, 2, 1);
    assert_eq!(
        events,
        vec![
            Event::Aborted { txn: tx(2), reason: AbortReason::Deadlock { variable: x(1) } },
            Event::Read { txn: tx(1), variable: x(2), value: 20 },
        ]
    );
    assert_eq!(tc.transaction(tx(2)).unwrap().status(), TransactionStatus::Aborted);
    assert!(tc.waits_for(tx(1)).is_empty());
}

#[test]
fn test_deadlock_victim_is_youngest_not_requester() {
    let mut tc = coordinator();
    begin(&mut tc, 2);
    begin(&mut tc, 1);
    write(&mut tc, 1, 1, 1);
    write(&mut tc, 2, 2, 2);
    read(&mut tc, 1, 2);

    let events = read(&mut tc, 2, 1);
    assert_eq!(
        events,
        vec![
            Event::Aborted { txn: tx(1), reason: AbortReason::Deadlock { variable: x(2) } },
            Event::Read { txn: tx(2), variable: x(1), value: 10 },
        ]
    );
    assert!(tc.lock_queue(x(2)).is_empty());
}

#[test]
fn test_deadlock_through_queued_waiter() {
    let mut tc = coordinator();
    for id in 1..=3 {
        begin(&mut tc, id);
    }
    read(&mut tc, 3, 6);
    write(&mut tc, 1, 4, 1);
    write(&mut tc, 2, 4, 2);
    read(&mut tc, 3, 4);
    assert_eq!(tc.waits_for(tx(3)), vec![tx(1), tx(2)]);

    // T1 -> T3 closes T1 -> T3 -> T1; T3 started last
    let events = write(&mut tc, 1, 6, 3);
    assert_eq!(
        events,
        vec![
            Event::Aborted { txn: tx(3), reason: AbortReason::Deadlock { variable: x(4) } },
            Event::Wrote { txn: tx(1), variable: x(6), value: 3, scope: WriteScope::AllSites },
        ]
    );
    assert_eq!(tc.lock_queue(x(4)), vec![tx(2)]);
    assert_eq!(tc.waits_for(tx(2)), vec![tx(1)]);

    let events = end(&mut tc, 1);
    assert_eq!(
        events[1],
        Event::Wrote { txn: tx(2), variable: x(4), value: 2, scope: WriteScope::AllSites }
    );
}

// ============================================================================
// Termination
// ============================================================================

#[test]
fn test_aborted_transaction_is_inert() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    begin(&mut tc, 2);
    write(&mut tc, 1, 1, 1);
    write(&mut tc, 2, 2, 2);
    read(&mut tc, 1, 2);
    read(&mut tc, 2, 1);
    assert_eq!(tc.transaction(tx(2)).unwrap().status(), TransactionStatus::Aborted);

    assert!(write(&mut tc, 2, 8, 80).is_empty());
    assert!(read(&mut tc, 2, 8).is_empty());
    assert!(end(&mut tc, 2).is_empty());

    for s in tc.data().sites() {
        assert_eq!(s.lock_table().mode_held(tx(2), x(8)), None);
        assert_eq!(s.variable(x(2)).unwrap().version_count(), 1);
    }
}

#[test]
fn test_site_failure_aborts_lock_holders_only() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    begin(&mut tc, 2);
    read(&mut tc, 1, 3);
    write(&mut tc, 2, 5, 55);

    // x3 lives on site 4, x5 on site 6
    let events = exec(&mut tc, Instruction::Fail { site: site(6) });
    assert_eq!(
        events,
        vec![
            Event::SiteFailed { site: site(6) },
            Event::Aborted { txn: tx(2), reason: AbortReason::SiteFailure { site: site(6) } },
        ]
    );
    assert!(tc.transaction(tx(1)).unwrap().is_active());
}

#[test]
fn test_failure_hands_queued_reader_to_wait_queue() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    begin(&mut tc, 2);
    write(&mut tc, 1, 1, 5);
    read(&mut tc, 2, 1);

    let events = exec(&mut tc, Instruction::Fail { site: site(2) });
    assert_eq!(
        events,
        vec![
            Event::SiteFailed { site: site(2) },
            Event::Aborted { txn: tx(1), reason: AbortReason::SiteFailure { site: site(2) } },
            Event::Waiting { txn: tx(2), variable: x(1), on: WaitTarget::Sites { sites: vec![site(2)] } },
        ]
    );
    assert_eq!(tc.wait_queue(site(2)), vec![tx(2)]);

    let events = exec(&mut tc, Instruction::Recover { site: site(2) });
    assert_eq!(
        events,
        vec![
            Event::SiteRecovered { site: site(2) },
            Event::Read { txn: tx(2), variable: x(1), value: 10 },
        ]
    );
}

#[test]
fn test_events_serialize() {
    let mut tc = coordinator();
    begin(&mut tc, 1);
    let events = write(&mut tc, 1, 2, 3);

    let json = serde_json::to_string(&events).unwrap();
    let back: Vec<Event> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, events);
}
