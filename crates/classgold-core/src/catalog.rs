use crate::error::EconomyError;
use crate::ledger::Ledger;
use crate::repository::Repository;
use crate::types::{Product, Transaction, TransactionType};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Result of a purchase attempt. Everything except `Completed` left the
/// store untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Completed {
        product_id: String,
        remaining_stock: u32,
        transaction: Transaction,
    },
    UnknownUser,
    UnknownProduct,
    OutOfStock,
    InsufficientGold { price: u64, current_gold: u64 },
}

impl PurchaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Owner of product stock.
#[derive(Clone)]
pub struct Catalog {
    repo: Repository,
}

impl Catalog {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn products(&self) -> Result<Vec<Product>, EconomyError> {
        self.repo.products()
    }

    /// Buy one unit: stock and balance move together or not at all.
    ///
    /// The caller must hold both the catalog and ledger locks.
    pub fn purchase(
        &self,
        ledger: &Ledger,
        user_id: &str,
        product_id: &str,
    ) -> Result<PurchaseOutcome, EconomyError> {
        let previous_products = self.repo.products()?;
        let Some(index) = previous_products.iter().position(|p| p.id == product_id) else {
            return Ok(PurchaseOutcome::UnknownProduct);
        };
        let users = ledger.users()?;
        let Some(user) = users.iter().find(|user| user.id == user_id) else {
            return Ok(PurchaseOutcome::UnknownUser);
        };

        let product = &previous_products[index];
        if !product.in_stock() {
            return Ok(PurchaseOutcome::OutOfStock);
        }
        if user.current_gold < product.price {
            return Ok(PurchaseOutcome::InsufficientGold {
                price: product.price,
                current_gold: user.current_gold,
            });
        }

        let mut products = previous_products.clone();
        let product = &mut products[index];
        product.stock -= 1;
        let remaining_stock = product.stock;
        let price = product.price;
        let reason = format!("Purchased: {}", product.name);
        self.repo.save_products(&products)?;

        let transaction =
            match ledger.apply_transaction(user_id, price, TransactionType::Spend, reason) {
                Ok(transaction) => transaction,
                Err(err) => {
                    warn!(user_id, product_id, error = %err, "Purchase payment failed, restoring stock");
                    if let Err(restore_err) = self.repo.save_products(&previous_products) {
                        error!(product_id, error = %restore_err, "Stock restore failed after payment failure");
                    }
                    return Err(err);
                }
            };

        debug!(user_id, product_id, price, remaining_stock, "Purchase completed");
        Ok(PurchaseOutcome::Completed {
            product_id: product_id.to_string(),
            remaining_stock,
            transaction,
        })
    }
}
