use cadence_core::{ContextMonitor, with_db};
use cadence_testing::TestWorld;
use cadence_types::SessionPhase;

#[test]
fn context_used_always_equals_sample_sum() {
    let world = TestWorld::new()
        .with_session("sess-inv", "demo")
        .with_usage("sess-inv", &[1200, 800, 450]);

    let session = with_db(&world.db, |db| db.session("sess-inv"))
        .unwrap()
        .unwrap();
    let total = with_db(&world.db, |db| db.total_sample_tokens("sess-inv")).unwrap();

    assert_eq!(session.context_used, 2450);
    assert_eq!(session.context_used, total);
}

#[test]
fn monitor_tracking_preserves_the_ledger_equality() {
    let world = TestWorld::new().with_session("sess-mon", "demo");
    let monitor = ContextMonitor::new(world.db.clone(), world.observables.clone());

    for tokens in [500u64, 300, 700] {
        monitor
            .track_usage("sess-mon", SessionPhase::Implementation, tokens, "work")
            .unwrap();
    }

    let session = with_db(&world.db, |db| db.session("sess-mon"))
        .unwrap()
        .unwrap();
    let total = with_db(&world.db, |db| db.total_sample_tokens("sess-mon")).unwrap();
    assert_eq!(session.context_used, 1500);
    assert_eq!(total, 1500);
}

#[test]
fn checkpoint_numbers_stay_contiguous_from_zero() {
    let world = TestWorld::new().with_session("sess-cp", "demo");

    let numbers: Vec<u32> = with_db(&world.db, |db| db.checkpoints("sess-cp"))
        .unwrap()
        .iter()
        .map(|c| c.number)
        .collect();
    assert_eq!(numbers, vec![0]);
    assert_eq!(
        with_db(&world.db, |db| db.next_checkpoint_number("sess-cp")).unwrap(),
        1
    );
}
