//! Classroom gold economy core.
//!
//! Keeps balances, shop stock and quest/submission state consistent: balances
//! never go negative, stock is never oversold, each student has at most one
//! submission per quest, and an approval pays out exactly once.

#![deny(unsafe_code)]

pub mod catalog;
pub mod economy;
pub mod error;
pub mod ledger;
pub mod quests;
pub mod repository;
pub mod seed;
pub mod snapshot;
pub mod store;
pub mod types;

pub use catalog::{Catalog, PurchaseOutcome};
pub use economy::Economy;
pub use error::{EconomyError, EntityKind};
pub use ledger::{BalanceDrift, Ledger};
pub use quests::{
    AcceptOutcome, QuestBoard, QuestProgressView, ReviewOutcome, SubmissionDraft, SubmitOutcome,
};
pub use repository::Repository;
pub use seed::SeedData;
pub use snapshot::EconomySnapshot;
pub use store::{Collection, MemoryStore, RecordStore, StoreError};
pub use types::{
    Level, OpeningBalance, Product, Quest, QuestProgress, QuestSubmission, SubmissionStatus,
    Transaction, TransactionType, User, UserRole,
};
