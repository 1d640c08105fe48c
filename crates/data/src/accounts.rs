use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tradegate_core::*;

/// Account store held in memory, typically filled from a config file.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<(TenantId, String), Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of accounts, rejecting duplicate stubs within a tenant.
    pub fn from_accounts(accounts: Vec<Account>) -> Result<Self, AccountError> {
        let store = Self::new();
        for account in accounts {
            if store.contains(account.tenant, &account.stub) {
                return Err(AccountError::Invalid {
                    stub: account.stub,
                    reason: "duplicate stub for tenant".to_string(),
                });
            }
            store.insert(account);
        }
        Ok(store)
    }

    pub fn insert(&self, account: Account) {
        let key = (account.tenant, account.stub.clone());
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, account);
    }

    pub fn contains(&self, tenant: TenantId, stub: &str) -> bool {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&(tenant, stub.to_string()))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn account(&self, tenant: TenantId, stub: &str) -> Result<Option<Account>, AccountError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(tenant, stub.to_string()))
            .cloned())
    }

    async fn accounts(&self, tenant: TenantId) -> Result<Vec<Account>, AccountError> {
        let mut accounts: Vec<Account> = self
            .accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|a| a.tenant == tenant)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.stub.cmp(&b.stub));
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn account(tenant: TenantId, stub: &str) -> Account {
        Account {
            tenant,
            stub: stub.to_string(),
            venue: "binance".to_string(),
            shortname: "main".to_string(),
            testnet: false,
            credentials: Credentials::default(),
        }
    }

    #[tokio::test]
    async fn test_lookup_by_tenant_and_stub() {
        let t = TenantId::new(Uuid::new_v4());
        let other = TenantId::new(Uuid::new_v4());
        let store = MemoryAccountStore::from_accounts(vec![account(t, "b1"), account(t, "a1")]).unwrap();

        assert!(store.account(t, "b1").await.unwrap().is_some());
        assert!(store.account(other, "b1").await.unwrap().is_none());

        let stubs: Vec<String> = store.accounts(t).await.unwrap().into_iter().map(|a| a.stub).collect();
        assert_eq!(stubs, vec!["a1", "b1"]);
    }

    #[test]
    fn test_duplicate_stub_rejected() {
        let t = TenantId::new(Uuid::new_v4());
        let result = MemoryAccountStore::from_accounts(vec![account(t, "x"), account(t, "x")]);
        assert!(matches!(result, Err(AccountError::Invalid { .. })));
    }
}
