use crate::error::EconomyError;
use crate::seed::SeedData;
use crate::store::{Collection, RecordStore};
use crate::types::{OpeningBalance, Product, Quest, QuestSubmission, Transaction, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Typed access to the record store.
///
/// A collection that was never written is seeded on first read, so readers
/// always see either persisted records or the configured defaults.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn RecordStore>,
    seed: Arc<SeedData>,
}

impl Repository {
    pub fn new(store: Arc<dyn RecordStore>, seed: Arc<SeedData>) -> Self {
        Self { store, seed }
    }

    pub fn store_label(&self) -> &'static str {
        self.store.label()
    }

    pub fn seed(&self) -> &SeedData {
        &self.seed
    }

    pub fn users(&self) -> Result<Vec<User>, EconomyError> {
        self.load_or_seed(Collection::Users, &self.seed.users)
    }

    pub fn save_users(&self, users: &[User]) -> Result<(), EconomyError> {
        self.save(Collection::Users, users)
    }

    pub fn products(&self) -> Result<Vec<Product>, EconomyError> {
        self.load_or_seed(Collection::Products, &self.seed.products)
    }

    pub fn save_products(&self, products: &[Product]) -> Result<(), EconomyError> {
        self.save(Collection::Products, products)
    }

    pub fn quests(&self) -> Result<Vec<Quest>, EconomyError> {
        self.load_or_seed(Collection::Quests, &self.seed.quests)
    }

    pub fn save_quests(&self, quests: &[Quest]) -> Result<(), EconomyError> {
        self.save(Collection::Quests, quests)
    }

    pub fn submissions(&self) -> Result<Vec<QuestSubmission>, EconomyError> {
        self.load_or_seed(Collection::Submissions, &[])
    }

    pub fn save_submissions(&self, submissions: &[QuestSubmission]) -> Result<(), EconomyError> {
        self.save(Collection::Submissions, submissions)
    }

    /// Most-recent-first.
    pub fn transactions(&self) -> Result<Vec<Transaction>, EconomyError> {
        self.load_or_seed(Collection::Transactions, &[])
    }

    pub fn save_transactions(&self, transactions: &[Transaction]) -> Result<(), EconomyError> {
        self.save(Collection::Transactions, transactions)
    }

    /// Replay baseline for `reconcile`; starts from the seed users.
    pub fn opening_balances(&self) -> Result<Vec<OpeningBalance>, EconomyError> {
        self.load_or_seed(Collection::OpeningBalances, &self.seed.opening_balances())
    }

    pub fn save_opening_balances(&self, balances: &[OpeningBalance]) -> Result<(), EconomyError> {
        self.save(Collection::OpeningBalances, balances)
    }

    pub fn clear(&self) -> Result<(), EconomyError> {
        self.store.clear()?;
        Ok(())
    }

    fn load_or_seed<T>(&self, collection: Collection, seed: &[T]) -> Result<Vec<T>, EconomyError>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        match self.store.load(collection)? {
            Some(records) => records
                .into_iter()
                .map(|record| {
                    serde_json::from_value(record).map_err(|e| {
                        EconomyError::Serialization(format!("decode {collection} failed: {e}"))
                    })
                })
                .collect(),
            None => {
                self.save(collection, seed)?;
                Ok(seed.to_vec())
            }
        }
    }

    fn save<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<(), EconomyError> {
        let values = records
            .iter()
            .map(|record| {
                serde_json::to_value(record).map_err(|e| {
                    EconomyError::Serialization(format!("encode {collection} failed: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.store.save(collection, values)?;
        Ok(())
    }
}
