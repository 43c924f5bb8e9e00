use classgold_adapters::FaultyStore;
use classgold_core::{
    Collection, Economy, EconomyError, MemoryStore, SeedData, SubmissionStatus, TransactionType,
};
use std::sync::Arc;

fn faulty_economy() -> (Arc<FaultyStore>, Economy) {
    let store = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new()), "disk full"));
    let economy = Economy::new(store.clone(), SeedData::default());
    (store, economy)
}

#[test]
fn failed_payout_leaves_submission_reviewable() {
    let (store, economy) = faulty_economy();
    let sub = economy.submit("q2", "s2", "Bob Jones", "tutored").unwrap();
    let id = sub.submission().id.clone();
    economy.transactions().unwrap();

    store.fail_writes(Collection::Transactions).unwrap();
    let err = economy.review(&id, true, "nice").unwrap_err();
    assert!(matches!(err, EconomyError::Store(_)));
    assert_eq!(economy.submissions().unwrap()[0].status, SubmissionStatus::Pending);
    assert_eq!(economy.user("s2").unwrap().current_gold, 50);

    store.heal().unwrap();
    economy.review(&id, true, "nice").unwrap();
    assert_eq!(economy.user("s2").unwrap().current_gold, 150);
    assert!(economy.audit_balances().unwrap().is_empty());
}

#[test]
fn failed_import_restores_previous_collections() {
    let source = Economy::in_memory();
    source
        .apply_transaction("s2", 40, TransactionType::Earn, "Recess monitor")
        .unwrap();
    let snapshot = source.export_snapshot().unwrap();

    let (store, target) = faulty_economy();
    let users_before = target.users().unwrap();
    let quests_before = target.quests().unwrap();
    target.transactions().unwrap();

    store.fail_writes(Collection::Transactions).unwrap();
    let err = target.import_snapshot(snapshot.clone()).unwrap_err();
    assert!(err.to_string().contains("disk full"));

    store.heal().unwrap();
    assert_eq!(target.users().unwrap(), users_before);
    assert_eq!(target.quests().unwrap(), quests_before);
    assert_eq!(target.user("s2").unwrap().current_gold, 50);
    assert!(target.transactions().unwrap().is_empty());
    assert!(target.audit_balances().unwrap().is_empty());

    target.import_snapshot(snapshot).unwrap();
    assert_eq!(target.user("s2").unwrap().current_gold, 90);
    assert_eq!(target.transactions().unwrap().len(), 1);
    assert!(target.audit_balances().unwrap().is_empty());
}

#[test]
fn failure_on_last_collection_still_rolls_back() {
    let mut seed = SeedData::default();
    seed.users[1].current_gold = 1;
    let source = Economy::new(Arc::new(MemoryStore::new()), seed);
    let snapshot = source.export_snapshot().unwrap();

    let (store, target) = faulty_economy();
    target.audit_balances().unwrap();

    store.fail_writes(Collection::OpeningBalances).unwrap();
    assert!(target.import_snapshot(snapshot).is_err());

    store.heal().unwrap();
    assert_eq!(target.user("s1").unwrap().current_gold, 120);
    assert!(target.audit_balances().unwrap().is_empty());
}
