use async_trait::async_trait;
use core_types::Account;
use pay_engine::AccountStore;

use std::collections::HashMap;

/// Accounts listed in the settings file. Accounts without a domain belong
/// to the first served domain.
pub struct ConfigAccountStore {
    accounts: HashMap<(String, String), Account>,
}

impl ConfigAccountStore {
    pub fn new(accounts: Vec<Account>, default_domain: &str) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|mut account| {
                if account.domain.is_empty() {
                    account.domain = default_domain.to_string();
                }
                account.domain = account.domain.to_lowercase();
                ((account.name.to_lowercase(), account.domain.clone()), account)
            })
            .collect();
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for ConfigAccountStore {
    async fn get_account(&self, name: &str, domain: &str) -> Result<Option<Account>, String> {
        let key = (name.to_lowercase(), domain.to_lowercase());
        Ok(self.accounts.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_by_name_and_domain() {
        let store = ConfigAccountStore::new(
            vec![
                Account {
                    name: "alice".to_string(),
                    kind: "lnd".to_string(),
                    ..Default::default()
                },
                Account {
                    name: "bob".to_string(),
                    domain: "Other.org".to_string(),
                    kind: "lnbits".to_string(),
                    ..Default::default()
                },
            ],
            "example.com",
        );
        assert_eq!(store.len(), 2);

        let alice = store.get_account("Alice", "example.com").await.unwrap().unwrap();
        assert_eq!(alice.address(), "alice@example.com");
        assert!(store.get_account("bob", "example.com").await.unwrap().is_none());
        assert!(store.get_account("bob", "other.org").await.unwrap().is_some());
    }
}
