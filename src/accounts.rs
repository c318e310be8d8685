//! Account lookup for request authentication.

use std::collections::{HashMap, HashSet};

use crate::config::AccountConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
}

/// Resolves credentials to an account and answers number ownership.
pub trait AccountDirectory: Send + Sync {
    fn authenticate(&self, username: &str, auth_id: &str) -> Option<Account>;

    fn owns_number(&self, account: &Account, number: &str) -> bool;
}

struct Record {
    auth_id: String,
    numbers: HashSet<String>,
}

/// Accounts fixed at startup from configuration.
pub struct StaticAccountDirectory {
    accounts: HashMap<String, Record>,
}

impl StaticAccountDirectory {
    pub fn new(accounts: &[AccountConfig]) -> Self {
        let accounts = accounts
            .iter()
            .map(|account| {
                (
                    account.username.clone(),
                    Record {
                        auth_id: account.auth_id.clone(),
                        numbers: account.numbers.iter().cloned().collect(),
                    },
                )
            })
            .collect();

        Self { accounts }
    }
}

impl AccountDirectory for StaticAccountDirectory {
    fn authenticate(&self, username: &str, auth_id: &str) -> Option<Account> {
        self.accounts
            .get(username)
            .filter(|record| record.auth_id == auth_id)
            .map(|_| Account {
                username: username.to_string(),
            })
    }

    fn owns_number(&self, account: &Account, number: &str) -> bool {
        self.accounts
            .get(&account.username)
            .is_some_and(|record| record.numbers.contains(number))
    }
}
