use crate::error::EconomyError;
use crate::types::{OpeningBalance, Product, Quest, QuestSubmission, Transaction, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Full export of every collection, sealed with a BLAKE3 content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EconomySnapshot {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    pub quests: Vec<Quest>,
    pub submissions: Vec<QuestSubmission>,
    pub transactions: Vec<Transaction>,
    /// Replay baseline for the balance audit on the importing side.
    #[serde(default)]
    pub opening_balances: Vec<OpeningBalance>,
    pub exported_at: DateTime<Utc>,
    pub snapshot_hash: String,
}

impl EconomySnapshot {
    pub fn capture(
        users: Vec<User>,
        products: Vec<Product>,
        quests: Vec<Quest>,
        submissions: Vec<QuestSubmission>,
        transactions: Vec<Transaction>,
        opening_balances: Vec<OpeningBalance>,
    ) -> Result<Self, EconomyError> {
        let mut snapshot = Self {
            users,
            products,
            quests,
            submissions,
            transactions,
            opening_balances,
            exported_at: Utc::now(),
            snapshot_hash: String::new(),
        };
        snapshot.snapshot_hash = snapshot.compute_hash()?;
        Ok(snapshot)
    }

    /// Check the content hash and every cross-record invariant.
    pub fn verify(&self) -> Result<(), EconomyError> {
        let expected = self.compute_hash()?;
        if expected != self.snapshot_hash {
            return Err(EconomyError::Integrity(format!(
                "snapshot hash mismatch: expected {expected}, got {}",
                self.snapshot_hash
            )));
        }
        self.validate_records()
    }

    fn validate_records(&self) -> Result<(), EconomyError> {
        unique_ids("user", self.users.iter().map(|u| u.id.as_str()))?;
        unique_ids("product", self.products.iter().map(|p| p.id.as_str()))?;
        unique_ids("quest", self.quests.iter().map(|q| q.id.as_str()))?;
        unique_ids("submission", self.submissions.iter().map(|s| s.id.as_str()))?;
        unique_ids("transaction", self.transactions.iter().map(|t| t.id.as_str()))?;
        unique_ids(
            "opening balance user",
            self.opening_balances.iter().map(|o| o.user_id.as_str()),
        )?;

        for user in &self.users {
            user.validate().map_err(EconomyError::InvalidRecord)?;
        }

        if let Some(product) = self.products.iter().find(|p| p.price == 0) {
            return Err(EconomyError::InvalidRecord(format!(
                "product '{}' price must be > 0",
                product.id
            )));
        }
        for quest in &self.quests {
            quest.validate().map_err(EconomyError::InvalidRecord)?;
        }

        let mut pairs = HashSet::new();
        for submission in &self.submissions {
            if !pairs.insert((submission.quest_id.as_str(), submission.student_id.as_str())) {
                return Err(EconomyError::InvalidRecord(format!(
                    "more than one submission for quest '{}' by '{}'",
                    submission.quest_id, submission.student_id
                )));
            }
        }

        let user_ids: HashSet<&str> = self.users.iter().map(|u| u.id.as_str()).collect();
        for transaction in &self.transactions {
            if transaction.amount == 0 {
                return Err(EconomyError::InvalidRecord(format!(
                    "transaction '{}' amount must be > 0",
                    transaction.id
                )));
            }
            if !user_ids.contains(transaction.user_id.as_str()) {
                return Err(EconomyError::InvalidRecord(format!(
                    "transaction '{}' references unknown user '{}'",
                    transaction.id, transaction.user_id
                )));
            }
        }
        if let Some(opening) = self
            .opening_balances
            .iter()
            .find(|opening| !user_ids.contains(opening.user_id.as_str()))
        {
            return Err(EconomyError::InvalidRecord(format!(
                "opening balance references unknown user '{}'",
                opening.user_id
            )));
        }
        Ok(())
    }

    fn compute_hash(&self) -> Result<String, EconomyError> {
        let material = serde_json::json!({
            "users": self.users,
            "products": self.products,
            "quests": self.quests,
            "submissions": self.submissions,
            "transactions": self.transactions,
            "openingBalances": self.opening_balances,
        });
        let bytes =
            serde_json::to_vec(&material).map_err(|e| EconomyError::Serialization(e.to_string()))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<(), EconomyError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(EconomyError::InvalidRecord(format!("duplicate {kind} id '{id}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::SeedData;
    use crate::types::SubmissionStatus;

    fn seeded() -> EconomySnapshot {
        let seed = SeedData::default();
        let openings = seed.opening_balances();
        EconomySnapshot::capture(
            seed.users,
            seed.products,
            seed.quests,
            Vec::new(),
            Vec::new(),
            openings,
        )
        .unwrap()
    }

    #[test]
    fn captured_snapshot_verifies() {
        let snapshot = seeded();
        assert_eq!(snapshot.snapshot_hash.len(), 64);
        snapshot.verify().unwrap();
    }

    #[test]
    fn tampering_breaks_the_hash() {
        let mut snapshot = seeded();
        snapshot.users[1].current_gold = 1_000_000;
        assert!(matches!(snapshot.verify(), Err(EconomyError::Integrity(_))));
    }

    #[test]
    fn duplicate_submission_pairs_are_rejected() {
        let seed = SeedData::default();
        let submission = QuestSubmission {
            id: "sub-1".into(),
            quest_id: "q1".into(),
            student_id: "s1".into(),
            student_name: "Alice Smith".into(),
            content: "done".into(),
            evidence_link: None,
            submitted_at: Utc::now(),
            status: SubmissionStatus::Pending,
            feedback: None,
            reward_gold: Some(50),
            quest_title: None,
        };
        let mut twin = submission.clone();
        twin.id = "sub-2".into();

        let snapshot = EconomySnapshot::capture(
            seed.users,
            seed.products,
            seed.quests,
            vec![submission, twin],
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let err = snapshot.verify().unwrap_err();
        assert!(err.to_string().contains("more than one submission"));
    }

    #[test]
    fn student_id_must_follow_role() {
        let mut snapshot = seeded();
        snapshot.users[1].student_id = None;
        snapshot.snapshot_hash = snapshot.compute_hash().unwrap();
        let err = snapshot.verify().unwrap_err();
        assert!(err.to_string().contains("must carry a studentId"));

        let mut snapshot = seeded();
        snapshot.users[0].student_id = Some("999".into());
        snapshot.snapshot_hash = snapshot.compute_hash().unwrap();
        assert!(matches!(snapshot.verify(), Err(EconomyError::InvalidRecord(_))));
    }

    #[test]
    fn opening_balances_must_name_known_users() {
        let mut snapshot = seeded();
        snapshot.opening_balances.push(OpeningBalance {
            user_id: "ghost".into(),
            current_gold: 5,
            total_earned_gold: 5,
        });
        snapshot.snapshot_hash = snapshot.compute_hash().unwrap();
        let err = snapshot.verify().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
