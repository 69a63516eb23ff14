use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::types::{AccountType, TransactionId};

/// card and account collaborator the ledger charges and debits through
///
/// Implementations must be safe to call from concurrent payment handlers.
pub trait AccountGateway: Send + Sync {
    /// unused credit on a card
    fn available_credit(&self, card_id: &str) -> Result<Money>;

    /// put a purchase on the card's credit line
    fn charge_card(&self, card_id: &str, amount: Money, description: &str) -> Result<TransactionId>;

    /// take a payment from the paying account
    fn debit_account(
        &self,
        account_id: &str,
        account_type: AccountType,
        amount: Money,
        reference: &str,
    ) -> Result<TransactionId>;
}

/// one movement recorded by `InMemoryAccounts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMovement {
    pub transaction_id: TransactionId,
    pub account_id: String,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone)]
struct CreditLine {
    limit: Money,
    used: Money,
}

#[derive(Debug, Clone)]
struct Account {
    account_type: AccountType,
    balance: Money,
}

#[derive(Debug, Default)]
struct Books {
    cards: HashMap<String, CreditLine>,
    accounts: HashMap<String, Account>,
    movements: Vec<AccountMovement>,
}

/// in-process gateway for tests and demos
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    books: RwLock<Books>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_card(&self, card_id: &str, limit: Money) {
        self.books.write().cards.insert(
            card_id.to_string(),
            CreditLine {
                limit,
                used: Money::ZERO,
            },
        );
    }

    pub fn open_account(&self, account_id: &str, account_type: AccountType, balance: Money) {
        self.books.write().accounts.insert(
            account_id.to_string(),
            Account {
                account_type,
                balance,
            },
        );
    }

    pub fn used_credit(&self, card_id: &str) -> Option<Money> {
        self.books.read().cards.get(card_id).map(|c| c.used)
    }

    pub fn balance(&self, account_id: &str) -> Option<Money> {
        self.books.read().accounts.get(account_id).map(|a| a.balance)
    }

    pub fn movements(&self) -> Vec<AccountMovement> {
        self.books.read().movements.clone()
    }
}

impl AccountGateway for InMemoryAccounts {
    fn available_credit(&self, card_id: &str) -> Result<Money> {
        let books = self.books.read();
        let card = books.cards.get(card_id).ok_or_else(|| EngineError::Gateway {
            message: format!("unknown card {}", card_id),
        })?;
        Ok(card.limit.saturating_sub(card.used))
    }

    fn charge_card(&self, card_id: &str, amount: Money, description: &str) -> Result<TransactionId> {
        let mut books = self.books.write();
        let card = books.cards.get_mut(card_id).ok_or_else(|| EngineError::Gateway {
            message: format!("unknown card {}", card_id),
        })?;

        let available = card.limit.saturating_sub(card.used);
        if amount > available {
            warn!(card_id, requested = %amount, available = %available, "card charge declined");
            return Err(EngineError::InsufficientCredit {
                available,
                requested: amount,
            });
        }
        card.used += amount;

        let transaction_id = Uuid::new_v4();
        books.movements.push(AccountMovement {
            transaction_id,
            account_id: card_id.to_string(),
            amount,
            description: description.to_string(),
        });
        debug!(card_id, amount = %amount, transaction_id = %transaction_id, "card charged");
        Ok(transaction_id)
    }

    fn debit_account(
        &self,
        account_id: &str,
        account_type: AccountType,
        amount: Money,
        reference: &str,
    ) -> Result<TransactionId> {
        let mut books = self.books.write();
        let account = books.accounts.get_mut(account_id).ok_or_else(|| EngineError::Gateway {
            message: format!("unknown account {}", account_id),
        })?;
        if account.account_type != account_type {
            return Err(EngineError::validation(
                "account_type",
                format!("account {} is not a {:?} account", account_id, account_type),
            ));
        }
        if amount > account.balance {
            warn!(account_id, requested = %amount, balance = %account.balance, "account debit declined");
            return Err(EngineError::InsufficientFunds {
                available: account.balance,
                requested: amount,
            });
        }
        account.balance -= amount;

        let transaction_id = Uuid::new_v4();
        books.movements.push(AccountMovement {
            transaction_id,
            account_id: account_id.to_string(),
            amount: -amount,
            description: reference.to_string(),
        });
        debug!(account_id, amount = %amount, transaction_id = %transaction_id, "account debited");
        Ok(transaction_id)
    }
}
