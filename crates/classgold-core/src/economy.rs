use crate::catalog::{Catalog, PurchaseOutcome};
use crate::error::EconomyError;
use crate::ledger::{BalanceDrift, Ledger};
use crate::quests::{
    AcceptOutcome, QuestBoard, QuestProgressView, ReviewOutcome, SubmissionDraft, SubmitOutcome,
};
use crate::repository::Repository;
use crate::seed::SeedData;
use crate::snapshot::EconomySnapshot;
use crate::store::{Collection, MemoryStore, RecordStore};
use crate::types::{
    OpeningBalance, Product, Quest, QuestSubmission, Transaction, TransactionType, User,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Single entry point for every economy operation.
///
/// Each entity group sits behind its own lock: quest board (quests and
/// submissions), catalog (products) and ledger (users and transactions).
/// Operations spanning groups lock in that order, so no two operations can
/// interleave inside a read-validate-write sequence.
pub struct Economy {
    repo: Repository,
    board: Mutex<QuestBoard>,
    catalog: Mutex<Catalog>,
    ledger: Mutex<Ledger>,
}

impl Economy {
    pub fn new(store: Arc<dyn RecordStore>, seed: SeedData) -> Self {
        let repo = Repository::new(store, Arc::new(seed));
        Self {
            board: Mutex::new(QuestBoard::new(repo.clone())),
            catalog: Mutex::new(Catalog::new(repo.clone())),
            ledger: Mutex::new(Ledger::new(repo.clone())),
            repo,
        }
    }

    /// In-memory economy with the demo classroom.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), SeedData::default())
    }

    pub fn store_label(&self) -> &'static str {
        self.repo.store_label()
    }

    pub fn seed(&self) -> &SeedData {
        self.repo.seed()
    }

    pub fn users(&self) -> Result<Vec<User>, EconomyError> {
        self.lock_ledger()?.users()
    }

    pub fn user(&self, user_id: &str) -> Result<User, EconomyError> {
        self.lock_ledger()?.user(user_id)
    }

    pub fn products(&self) -> Result<Vec<Product>, EconomyError> {
        self.lock_catalog()?.products()
    }

    pub fn quests(&self) -> Result<Vec<Quest>, EconomyError> {
        self.lock_board()?.quests()
    }

    pub fn submissions(&self) -> Result<Vec<QuestSubmission>, EconomyError> {
        self.lock_board()?.submissions()
    }

    /// Most-recent-first.
    pub fn transactions(&self) -> Result<Vec<Transaction>, EconomyError> {
        self.lock_ledger()?.transactions()
    }

    pub fn apply_transaction(
        &self,
        user_id: &str,
        amount: u64,
        kind: TransactionType,
        reason: impl Into<String>,
    ) -> Result<Transaction, EconomyError> {
        self.lock_ledger()?
            .apply_transaction(user_id, amount, kind, reason)
    }

    pub fn purchase(&self, user_id: &str, product_id: &str) -> Result<bool, EconomyError> {
        Ok(self.try_purchase(user_id, product_id)?.is_success())
    }

    pub fn try_purchase(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<PurchaseOutcome, EconomyError> {
        let catalog = self.lock_catalog()?;
        let ledger = self.lock_ledger()?;
        catalog.purchase(&ledger, user_id, product_id)
    }

    pub fn create_quest(&self, quest: Quest) -> Result<Quest, EconomyError> {
        self.lock_board()?.create_quest(quest)
    }

    pub fn delete_quest(&self, quest_id: &str) -> Result<bool, EconomyError> {
        self.lock_board()?.delete_quest(quest_id)
    }

    pub fn accept(&self, quest_id: &str, user_id: &str) -> Result<bool, EconomyError> {
        Ok(self.try_accept(quest_id, user_id)?.is_success())
    }

    pub fn try_accept(&self, quest_id: &str, user_id: &str) -> Result<AcceptOutcome, EconomyError> {
        self.lock_board()?.accept(quest_id, user_id)
    }

    pub fn submit(
        &self,
        quest_id: &str,
        user_id: &str,
        student_name: &str,
        content: &str,
    ) -> Result<SubmitOutcome, EconomyError> {
        self.submit_draft(SubmissionDraft::new(quest_id, user_id, student_name, content))
    }

    pub fn submit_draft(&self, draft: SubmissionDraft) -> Result<SubmitOutcome, EconomyError> {
        self.lock_board()?.submit(draft)
    }

    pub fn review(
        &self,
        submission_id: &str,
        approved: bool,
        feedback: impl Into<String>,
    ) -> Result<ReviewOutcome, EconomyError> {
        let board = self.lock_board()?;
        let ledger = self.lock_ledger()?;
        board.review(&ledger, submission_id, approved, feedback)
    }

    pub fn quest_progress(&self, user_id: &str) -> Result<Vec<QuestProgressView>, EconomyError> {
        // Unknown users get a NotFound rather than an all-open board.
        self.user(user_id)?;
        self.lock_board()?.progress(user_id)
    }

    /// Replay the transaction log against the stored opening balances.
    pub fn audit_balances(&self) -> Result<Vec<BalanceDrift>, EconomyError> {
        self.lock_ledger()?.reconcile()
    }

    /// Clear every collection and re-seed defaults.
    pub fn reset(&self) -> Result<(), EconomyError> {
        let (_board, _catalog, _ledger) = self.lock_all()?;
        self.repo.clear()?;
        self.seed_all()?;
        info!(store = self.store_label(), "Economy reset to seed data");
        Ok(())
    }

    pub fn export_snapshot(&self) -> Result<EconomySnapshot, EconomyError> {
        let (_board, _catalog, _ledger) = self.lock_all()?;
        let stored = StoredCollections::load(&self.repo)?;
        EconomySnapshot::capture(
            stored.users,
            stored.products,
            stored.quests,
            stored.submissions,
            stored.transactions,
            stored.opening_balances,
        )
    }

    /// Replace every collection with a verified snapshot.
    ///
    /// If a collection write fails, the collections already written are put
    /// back to their previous contents.
    pub fn import_snapshot(&self, snapshot: EconomySnapshot) -> Result<(), EconomyError> {
        snapshot.verify()?;
        let (_board, _catalog, _ledger) = self.lock_all()?;
        let previous = StoredCollections::load(&self.repo)?;
        let incoming = StoredCollections::from(snapshot);

        for (written, collection) in Collection::ALL.into_iter().enumerate() {
            if let Err(err) = incoming.save(&self.repo, collection) {
                warn!(collection = %collection, error = %err, "Snapshot import failed, restoring previous collections");
                for restored in Collection::ALL.into_iter().take(written) {
                    if let Err(restore_err) = previous.save(&self.repo, restored) {
                        error!(collection = %restored, error = %restore_err, "Collection restore failed after import failure");
                    }
                }
                return Err(err);
            }
        }

        info!(
            users = incoming.users.len(),
            transactions = incoming.transactions.len(),
            "Snapshot imported"
        );
        Ok(())
    }

    fn seed_all(&self) -> Result<(), EconomyError> {
        let seed = self.repo.seed();
        self.repo.save_users(&seed.users)?;
        self.repo.save_products(&seed.products)?;
        self.repo.save_quests(&seed.quests)?;
        self.repo.save_submissions(&[])?;
        self.repo.save_transactions(&[])?;
        self.repo.save_opening_balances(&seed.opening_balances())?;
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn lock_all(
        &self,
    ) -> Result<
        (
            MutexGuard<'_, QuestBoard>,
            MutexGuard<'_, Catalog>,
            MutexGuard<'_, Ledger>,
        ),
        EconomyError,
    > {
        let board = self.lock_board()?;
        let catalog = self.lock_catalog()?;
        let ledger = self.lock_ledger()?;
        Ok((board, catalog, ledger))
    }

    fn lock_board(&self) -> Result<MutexGuard<'_, QuestBoard>, EconomyError> {
        self.board
            .lock()
            .map_err(|_| EconomyError::LockPoisoned("quest board"))
    }

    fn lock_catalog(&self) -> Result<MutexGuard<'_, Catalog>, EconomyError> {
        self.catalog
            .lock()
            .map_err(|_| EconomyError::LockPoisoned("catalog"))
    }

    fn lock_ledger(&self) -> Result<MutexGuard<'_, Ledger>, EconomyError> {
        self.ledger
            .lock()
            .map_err(|_| EconomyError::LockPoisoned("ledger"))
    }
}

/// Every collection held in memory, keyed for per-collection writes.
struct StoredCollections {
    users: Vec<User>,
    products: Vec<Product>,
    quests: Vec<Quest>,
    submissions: Vec<QuestSubmission>,
    transactions: Vec<Transaction>,
    opening_balances: Vec<OpeningBalance>,
}

impl StoredCollections {
    fn load(repo: &Repository) -> Result<Self, EconomyError> {
        Ok(Self {
            users: repo.users()?,
            products: repo.products()?,
            quests: repo.quests()?,
            submissions: repo.submissions()?,
            transactions: repo.transactions()?,
            opening_balances: repo.opening_balances()?,
        })
    }

    fn save(&self, repo: &Repository, collection: Collection) -> Result<(), EconomyError> {
        match collection {
            Collection::Users => repo.save_users(&self.users),
            Collection::Products => repo.save_products(&self.products),
            Collection::Quests => repo.save_quests(&self.quests),
            Collection::Submissions => repo.save_submissions(&self.submissions),
            Collection::Transactions => repo.save_transactions(&self.transactions),
            Collection::OpeningBalances => repo.save_opening_balances(&self.opening_balances),
        }
    }
}

impl From<EconomySnapshot> for StoredCollections {
    fn from(snapshot: EconomySnapshot) -> Self {
        Self {
            users: snapshot.users,
            products: snapshot.products,
            quests: snapshot.quests,
            submissions: snapshot.submissions,
            transactions: snapshot.transactions,
            opening_balances: snapshot.opening_balances,
        }
    }
}
