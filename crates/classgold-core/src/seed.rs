use crate::error::EconomyError;
use crate::types::{OpeningBalance, Product, Quest, User};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Records written to an empty store and restored by `reset`.
///
/// Submissions and transactions always start empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    #[serde(default)]
    pub quests: Vec<Quest>,
}

impl SeedData {
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            products: Vec::new(),
            quests: Vec::new(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, EconomyError> {
        let seed: Self = serde_json::from_slice(bytes)
            .map_err(|e| EconomyError::Serialization(e.to_string()))?;
        seed.validate()?;
        Ok(seed)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EconomyError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            EconomyError::InvalidRecord(format!("seed file '{}': {e}", path.display()))
        })?;
        Self::from_json(&bytes)
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|user| user.id == user_id)
    }

    /// Starting point for replaying the transaction log of a fresh store.
    pub fn opening_balances(&self) -> Vec<OpeningBalance> {
        self.users.iter().map(OpeningBalance::from).collect()
    }

    pub fn validate(&self) -> Result<(), EconomyError> {
        let mut ids = HashSet::new();
        for user in &self.users {
            user.validate().map_err(EconomyError::InvalidRecord)?;
            if !ids.insert(user.id.as_str()) {
                return Err(EconomyError::InvalidRecord(format!(
                    "duplicate seed user '{}'",
                    user.id
                )));
            }
        }
        ids.clear();
        for product in &self.products {
            if product.price == 0 {
                return Err(EconomyError::InvalidRecord(format!(
                    "seed product '{}' price must be > 0",
                    product.id
                )));
            }
            if !ids.insert(product.id.as_str()) {
                return Err(EconomyError::InvalidRecord(format!(
                    "duplicate seed product '{}'",
                    product.id
                )));
            }
        }
        ids.clear();
        for quest in &self.quests {
            quest.validate().map_err(EconomyError::InvalidRecord)?;
            if !ids.insert(quest.id.as_str()) {
                return Err(EconomyError::InvalidRecord(format!(
                    "duplicate seed quest '{}'",
                    quest.id
                )));
            }
        }
        Ok(())
    }
}

impl Default for SeedData {
    /// The demo classroom: one teacher, three students, a small shop and two
    /// open quests.
    fn default() -> Self {
        Self {
            users: vec![
                User::teacher("t1", "Mr. Anderson"),
                User::student("s1", "Alice Smith", "202401").with_gold(120, 150),
                User::student("s2", "Bob Jones", "202402").with_gold(50, 50),
                User::student("s3", "Charlie Day", "202403").with_gold(200, 310),
            ],
            products: vec![
                Product::new("p1", "Homework Pass", 100, 10, "Skip one homework assignment."),
                Product::new("p2", "Sit with a Friend", 150, 5, "Change your seat for one day."),
                Product::new("p3", "Snack Pack", 50, 20, "A small bag of chips or cookies."),
            ],
            quests: vec![
                Quest::new(
                    "Clean the Classroom",
                    "Sweep the floor and organize the bookshelves.",
                    50,
                    2,
                    seed_date(2024, 12, 31),
                    "t1",
                )
                .with_id("q1"),
                Quest::new(
                    "Math Tutor",
                    "Help a classmate with fractions for 30 mins.",
                    100,
                    1,
                    seed_date(2024, 11, 20),
                    "t1",
                )
                .with_id("q2"),
            ],
        }
    }
}

fn seed_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_is_valid() {
        let seed = SeedData::default();
        seed.validate().unwrap();
        assert_eq!(seed.users.len(), 4);
        assert_eq!(seed.user("s1").map(|u| u.current_gold), Some(120));
    }

    #[test]
    fn rejects_duplicate_users() {
        let mut seed = SeedData::default();
        seed.users.push(User::teacher("t1", "Twin"));
        assert!(seed.validate().is_err());
    }

    #[test]
    fn rejects_student_id_mismatched_with_role() {
        let mut seed = SeedData::default();
        seed.users[2].student_id = None;
        let err = seed.validate().unwrap_err();
        assert!(err.to_string().contains("s2"));

        let mut seed = SeedData::default();
        seed.users[0].student_id = Some("999".into());
        assert!(matches!(seed.validate(), Err(EconomyError::InvalidRecord(_))));

        let raw = serde_json::json!({
            "users": [{"id": "s9", "name": "Dana", "role": "STUDENT",
                       "currentGold": 10, "totalEarnedGold": 10}],
            "products": []
        });
        assert!(SeedData::from_json(raw.to_string().as_bytes()).is_err());
    }

    #[test]
    fn parses_seed_json() {
        let raw = serde_json::json!({
            "users": [{"id": "s9", "name": "Dana", "role": "STUDENT", "studentId": "202409",
                       "currentGold": 10, "totalEarnedGold": 10}],
            "products": [{"id": "p9", "name": "Sticker", "price": 5, "stock": 3,
                          "description": "Shiny"}]
        });
        let seed = SeedData::from_json(raw.to_string().as_bytes()).unwrap();
        assert!(seed.quests.is_empty());
        assert_eq!(seed.products[0].stock, 3);
    }
}
