use crate::error::{EconomyError, EntityKind};
use crate::repository::Repository;
use crate::types::{new_record_id, Transaction, TransactionType, User};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Balance mismatch between a user's stored gold and a replay of the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDrift {
    pub user_id: String,
    pub expected_current_gold: u64,
    pub actual_current_gold: u64,
    pub expected_total_earned_gold: u64,
    pub actual_total_earned_gold: u64,
}

/// Owner of user balances and the transaction log.
///
/// Nothing else writes `current_gold` or `total_earned_gold`; every change
/// here prepends exactly one transaction, so the log stays most-recent-first.
#[derive(Clone)]
pub struct Ledger {
    repo: Repository,
}

impl Ledger {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn users(&self) -> Result<Vec<User>, EconomyError> {
        self.repo.users()
    }

    pub fn user(&self, user_id: &str) -> Result<User, EconomyError> {
        self.repo
            .users()?
            .into_iter()
            .find(|user| user.id == user_id)
            .ok_or_else(|| EconomyError::not_found(EntityKind::User, user_id))
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>, EconomyError> {
        self.repo.transactions()
    }

    /// Credit or debit a user and log it.
    ///
    /// SPEND is clamped at zero rather than rejected. The user write is
    /// undone if the log write fails.
    pub fn apply_transaction(
        &self,
        user_id: &str,
        amount: u64,
        kind: TransactionType,
        reason: impl Into<String>,
    ) -> Result<Transaction, EconomyError> {
        if amount == 0 {
            return Err(EconomyError::InvalidRecord(
                "transaction amount must be > 0".to_string(),
            ));
        }

        let previous_users = self.repo.users()?;
        let mut transactions = self.repo.transactions()?;

        let mut users = previous_users.clone();
        let user = users
            .iter_mut()
            .find(|user| user.id == user_id)
            .ok_or_else(|| EconomyError::not_found(EntityKind::User, user_id))?;

        match kind {
            TransactionType::Earn => {
                user.current_gold = user.current_gold.saturating_add(amount);
                user.total_earned_gold = user.total_earned_gold.saturating_add(amount);
            }
            TransactionType::Spend => {
                if amount > user.current_gold {
                    debug!(
                        user_id,
                        amount,
                        current_gold = user.current_gold,
                        "Spend exceeds balance, clamping at zero"
                    );
                }
                user.current_gold = user.current_gold.saturating_sub(amount);
            }
        }
        let current_gold = user.current_gold;

        let transaction = Transaction {
            id: new_record_id(),
            user_id: user_id.to_string(),
            kind,
            amount,
            reason: reason.into(),
            date: Utc::now(),
        };

        self.repo.save_users(&users)?;

        transactions.insert(0, transaction.clone());
        if let Err(err) = self.repo.save_transactions(&transactions) {
            warn!(user_id, error = %err, "Transaction log write failed, restoring balances");
            if let Err(restore_err) = self.repo.save_users(&previous_users) {
                error!(user_id, error = %restore_err, "Balance restore failed after log write failure");
            }
            return Err(err);
        }

        debug!(
            user_id,
            transaction_id = %transaction.id,
            kind = ?kind,
            amount,
            current_gold,
            "Transaction applied"
        );
        Ok(transaction)
    }

    /// Replay the log oldest-first from the stored opening balances and
    /// report users whose stored balances disagree.
    ///
    /// Users without an opening balance start from zero.
    pub fn reconcile(&self) -> Result<Vec<BalanceDrift>, EconomyError> {
        let users = self.repo.users()?;
        let transactions = self.repo.transactions()?;
        let openings = self.repo.opening_balances()?;
        let baseline: HashMap<&str, (u64, u64)> = openings
            .iter()
            .map(|opening| {
                (
                    opening.user_id.as_str(),
                    (opening.current_gold, opening.total_earned_gold),
                )
            })
            .collect();

        let mut replayed: HashMap<&str, (u64, u64)> = users
            .iter()
            .map(|user| {
                let start = baseline.get(user.id.as_str()).copied().unwrap_or((0, 0));
                (user.id.as_str(), start)
            })
            .collect();

        for transaction in transactions.iter().rev() {
            let Some((current, total)) = replayed.get_mut(transaction.user_id.as_str()) else {
                continue;
            };
            match transaction.kind {
                TransactionType::Earn => {
                    *current = current.saturating_add(transaction.amount);
                    *total = total.saturating_add(transaction.amount);
                }
                TransactionType::Spend => {
                    *current = current.saturating_sub(transaction.amount);
                }
            }
        }

        let drifts = users
            .iter()
            .filter_map(|user| {
                let (expected_current, expected_total) = replayed[user.id.as_str()];
                if expected_current == user.current_gold && expected_total == user.total_earned_gold
                {
                    return None;
                }
                Some(BalanceDrift {
                    user_id: user.id.clone(),
                    expected_current_gold: expected_current,
                    actual_current_gold: user.current_gold,
                    expected_total_earned_gold: expected_total,
                    actual_total_earned_gold: user.total_earned_gold,
                })
            })
            .collect::<Vec<_>>();

        if !drifts.is_empty() {
            warn!(drifted_users = drifts.len(), "Balance replay found drift");
        }
        Ok(drifts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::SeedData;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ledger() -> Ledger {
        Ledger::new(Repository::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SeedData::default()),
        ))
    }

    #[test]
    fn earn_raises_current_and_lifetime_gold() {
        let ledger = ledger();
        ledger
            .apply_transaction("s2", 30, TransactionType::Earn, "Helping out")
            .unwrap();

        let bob = ledger.user("s2").unwrap();
        assert_eq!(bob.current_gold, 80);
        assert_eq!(bob.total_earned_gold, 80);
    }

    #[test]
    fn spend_is_clamped_at_zero() {
        let ledger = ledger();
        let tx = ledger
            .apply_transaction("s2", 75, TransactionType::Spend, "Penalty")
            .unwrap();

        let bob = ledger.user("s2").unwrap();
        assert_eq!(bob.current_gold, 0);
        assert_eq!(bob.total_earned_gold, 50);
        assert_eq!(tx.amount, 75);
    }

    #[test]
    fn log_is_most_recent_first() {
        let ledger = ledger();
        let first = ledger
            .apply_transaction("s1", 10, TransactionType::Earn, "first")
            .unwrap();
        let second = ledger
            .apply_transaction("s3", 5, TransactionType::Spend, "second")
            .unwrap();

        let log = ledger.transactions().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, second.id);
        assert_eq!(log[1].id, first.id);
    }

    #[test]
    fn unknown_user_is_not_found_and_logs_nothing() {
        let ledger = ledger();
        let err = ledger
            .apply_transaction("ghost", 10, TransactionType::Earn, "nope")
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(ledger.transactions().unwrap().is_empty());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let ledger = ledger();
        let err = ledger
            .apply_transaction("s1", 0, TransactionType::Earn, "nothing")
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidRecord(_)));
    }

    #[test]
    fn reconcile_matches_after_clamped_spend() {
        let ledger = ledger();
        ledger
            .apply_transaction("s2", 500, TransactionType::Spend, "Clamp")
            .unwrap();
        ledger
            .apply_transaction("s2", 20, TransactionType::Earn, "Refill")
            .unwrap();

        let drifts = ledger.reconcile().unwrap();
        assert!(drifts.is_empty());
    }

    #[test]
    fn reconcile_reports_tampered_balance() {
        let ledger = ledger();
        let mut users = ledger.users().unwrap();
        users[1].current_gold = 9_999;
        ledger.repo.save_users(&users).unwrap();

        let drifts = ledger.reconcile().unwrap();
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].user_id, "s1");
        assert_eq!(drifts[0].expected_current_gold, 120);
        assert_eq!(drifts[0].actual_current_gold, 9_999);
    }

    fn ledger_with(current_gold: u64, total_earned_gold: u64) -> Ledger {
        let mut seed = SeedData::empty();
        seed.users =
            vec![User::student("kid", "Kid", "202499").with_gold(current_gold, total_earned_gold)];
        Ledger::new(Repository::new(Arc::new(MemoryStore::new()), Arc::new(seed)))
    }

    fn kind(earn: bool) -> TransactionType {
        if earn {
            TransactionType::Earn
        } else {
            TransactionType::Spend
        }
    }

    proptest! {
        #[test]
        fn earn_is_exact_and_spend_is_clamped(
            current in 0u64..10_000,
            extra in 0u64..10_000,
            amount in 1u64..20_000,
            earn in any::<bool>(),
        ) {
            let ledger = ledger_with(current, current + extra);
            let tx = ledger.apply_transaction("kid", amount, kind(earn), "prop").unwrap();
            let kid = ledger.user("kid").unwrap();

            prop_assert_eq!(tx.amount, amount);
            if earn {
                prop_assert_eq!(kid.current_gold, current + amount);
                prop_assert_eq!(kid.total_earned_gold, current + extra + amount);
            } else {
                prop_assert_eq!(kid.current_gold, current - amount.min(current));
                prop_assert_eq!(kid.total_earned_gold, current + extra);
            }
        }

        #[test]
        fn every_call_prepends_one_entry(
            ops in proptest::collection::vec((any::<bool>(), 1u64..500), 1..16),
        ) {
            let ledger = ledger_with(100, 100);
            let mut ids = Vec::new();
            for (earn, amount) in &ops {
                let tx = ledger.apply_transaction("kid", *amount, kind(*earn), "prop").unwrap();
                ids.push(tx.id);
                prop_assert_eq!(ledger.transactions().unwrap().len(), ids.len());
            }

            ids.reverse();
            let logged: Vec<String> = ledger
                .transactions()
                .unwrap()
                .into_iter()
                .map(|tx| tx.id)
                .collect();
            prop_assert_eq!(logged, ids);
            prop_assert!(ledger.reconcile().unwrap().is_empty());
        }
    }
}
