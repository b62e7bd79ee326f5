//! Reconciliation steps shared by every handler
//!
//! A handler composes these in a fixed order: resolve local records, claim
//! the dedup marker, repair missing chain accounts, reconcile balances, then
//! build and broadcast its own operation. Nothing here retries; the first
//! failure ends the item.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::Store;
use crate::ledger::{
    generate_content_uuid, generate_key_pair, AccountInfo, LedgerPool, Operation,
    TransactionSigner,
};
use crate::namespace::{
    self, Namespace, FIELD_NAME, FIELD_OWNER, FIELD_PRIVATE_KEY, FIELD_PUBLIC_KEY, FIELD_UUID,
};
use crate::types::{RelayError, Result};

/// Privileged account that signs on the relay's behalf
#[derive(Clone)]
pub struct Creator {
    pub name: String,
    pub private_key: String,
}

impl std::fmt::Debug for Creator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Engagement contract the relay reports sign-ins and fake engagement to
#[derive(Debug, Clone)]
pub struct ContractSettings {
    pub deployer: String,
    pub name: String,
    pub comment_method: String,
    pub sign_in_method: String,
    pub like_method: String,
    pub gas: u64,
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Account creator per namespace
    pub creators: HashMap<Namespace, Creator>,
    /// Funds top-ups and receives refunds
    pub treasury: Creator,
    pub contract: ContractSettings,
    pub account_fee: u64,
    /// Balance granted to accounts found below it
    pub min_balance: u64,
    /// Surplus tolerated before a settlement refund
    pub refund_tolerance: u64,
}

/// Local store plus ledger access for one worker pool
pub struct Reconciler {
    store: Arc<dyn Store>,
    ledger: Arc<LedgerPool>,
    signer: Arc<dyn TransactionSigner>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<LedgerPool>,
        signer: Arc<dyn TransactionSigner>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            signer,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Chain account name recorded for an identity, if any
    pub async fn stored_name(&self, identity_key: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .hash_get(identity_key, FIELD_NAME)
            .await?
            .filter(|name| !name.is_empty()))
    }

    pub async fn resolve_name(&self, identity_key: &str) -> Result<String> {
        self.stored_name(identity_key)
            .await?
            .ok_or_else(|| RelayError::Inconsistent(format!("identity {} not found", identity_key)))
    }

    /// Owner identity key and uuid of a post or comment
    pub async fn content_owner(&self, content_key: &str) -> Result<(String, u64)> {
        let owner = self
            .store
            .hash_get(content_key, FIELD_OWNER)
            .await?
            .ok_or_else(|| RelayError::Inconsistent(format!("content {} not found", content_key)))?;
        let uuid = self
            .store
            .hash_get(content_key, FIELD_UUID)
            .await?
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or_else(|| {
                RelayError::Inconsistent(format!("content {} has no valid uuid", content_key))
            })?;
        Ok((owner, uuid))
    }

    pub async fn private_key(&self, identity_key: &str) -> Result<String> {
        self.store
            .hash_get(identity_key, FIELD_PRIVATE_KEY)
            .await?
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RelayError::Inconsistent(format!("identity {} has no private key", identity_key))
            })
    }

    /// Write a dedup marker; an existing marker means the item already ran
    pub async fn claim(&self, marker: &str) -> Result<()> {
        if self.store.set_if_absent(marker, "1").await? {
            Ok(())
        } else {
            Err(RelayError::Duplicate(format!("marker {} already present", marker)))
        }
    }

    /// Create a post or comment record; an existing record means the content
    /// id is taken, whoever owns it
    pub async fn record_content(&self, content_key: &str, fields: &[(&str, String)]) -> Result<()> {
        if self.store.hash_create(content_key, fields).await? {
            Ok(())
        } else {
            Err(RelayError::Duplicate(format!("content {} already recorded", content_key)))
        }
    }

    /// Consume a dedup marker; a missing marker means the undo already ran
    pub async fn release(&self, marker: &str) -> Result<()> {
        if self.store.delete(marker).await? {
            Ok(())
        } else {
            Err(RelayError::Duplicate(format!("marker {} not present", marker)))
        }
    }

    pub async fn lookup(&self, name: &str) -> Result<Option<AccountInfo>> {
        self.ledger.get_client().get_account_by_name(name).await
    }

    /// Provision the chain account if the ledger does not know it
    pub async fn ensure_account(
        &self,
        namespace: Namespace,
        identity_key: &str,
        name: &str,
    ) -> Result<()> {
        if self.lookup(name).await?.is_some() {
            return Ok(());
        }
        self.provision(namespace, identity_key, name).await
    }

    /// Generate keys, record the identity, and create the chain account with
    /// the namespace's creator key.
    pub async fn provision(&self, namespace: Namespace, identity_key: &str, name: &str) -> Result<()> {
        let creator = self.settings.creators.get(&namespace).ok_or_else(|| {
            RelayError::Config(format!("no account creator configured for {}", namespace))
        })?;

        let keys = generate_key_pair();
        self.store
            .hash_set(
                identity_key,
                &[
                    (FIELD_NAME, name.to_string()),
                    (FIELD_PUBLIC_KEY, keys.public_key.clone()),
                    (FIELD_PRIVATE_KEY, keys.private_key.to_string()),
                ],
            )
            .await?;
        self.store
            .set(&namespace::reverse_key(name), identity_key)
            .await?;

        info!(identity = identity_key, account = name, %namespace, "Provisioning chain account");

        self.submit(
            &creator.private_key,
            Operation::AccountCreate {
                fee: self.settings.account_fee,
                creator: creator.name.clone(),
                new_account_name: name.to_string(),
                owner: keys.public_key,
            },
        )
        .await
        .map(|_| ())
    }

    /// Stamp against the current head, sign, broadcast, and require success.
    ///
    /// Returns the transaction id.
    pub async fn submit(&self, private_key: &str, operation: Operation) -> Result<String> {
        let client = self.ledger.get_client();
        let kind = operation.kind();

        let state = client.get_chain_state().await?;
        let tx = self.signer.sign(private_key, &state, vec![operation])?;
        let id = tx.id()?;

        let receipt = client.broadcast_transaction(&tx).await?;
        if !receipt.is_success() {
            return Err(RelayError::Rejected {
                status: receipt.status,
                message: format!(
                    "{} {} via {}: {}",
                    kind,
                    id,
                    client.address(),
                    receipt.message
                ),
            });
        }

        info!(endpoint = %client.address(), kind, tx = %id, "Transaction accepted");
        Ok(id)
    }

    /// Grant the minimum balance to an account found below it
    pub async fn grant_minimum(&self, name: &str) -> Result<()> {
        let min = self.settings.min_balance;
        let balance = self.lookup(name).await?.map(|a| a.balance).unwrap_or(0);
        if balance >= min {
            debug!(account = name, balance, min, "Balance sufficient, no grant");
            return Ok(());
        }
        self.top_up(name, min).await
    }

    /// Treasury transfer to `name`
    pub async fn top_up(&self, name: &str, amount: u64) -> Result<()> {
        let treasury = &self.settings.treasury;
        self.submit(
            &treasury.private_key,
            Operation::Transfer {
                from: treasury.name.clone(),
                to: name.to_string(),
                amount,
                memo: String::new(),
            },
        )
        .await
        .map(|_| ())
    }

    /// Return surplus from an identity's account to the treasury
    pub async fn refund(&self, identity_key: &str, name: &str, amount: u64) -> Result<()> {
        let treasury = self.settings.treasury.name.clone();
        self.transfer(identity_key, name, &treasury, amount).await
    }

    /// Transfer signed with the identity's own key
    pub async fn transfer(&self, identity_key: &str, from: &str, to: &str, amount: u64) -> Result<()> {
        let key = self.private_key(identity_key).await?;
        self.submit(
            &key,
            Operation::Transfer {
                from: from.to_string(),
                to: to.to_string(),
                amount,
                memo: generate_content_uuid(from).to_string(),
            },
        )
        .await
        .map(|_| ())
    }

    /// Call a method of the engagement contract as `name`
    pub async fn call_contract(
        &self,
        identity_key: &str,
        name: &str,
        method: &str,
        params: String,
    ) -> Result<()> {
        let key = self.private_key(identity_key).await?;
        let contract = &self.settings.contract;
        self.submit(
            &key,
            Operation::ContractApply {
                caller: name.to_string(),
                owner: contract.deployer.clone(),
                amount: 0,
                gas: contract.gas,
                contract: contract.name.clone(),
                method: method.to_string(),
                params,
            },
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::MemoryStore;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::{Ed25519Signer, LedgerClient};
    use std::time::Duration;

    pub const TREASURY: &str = "treasury";

    pub fn settings() -> ReconcileSettings {
        let creators = Namespace::ALL
            .into_iter()
            .map(|ns| {
                (
                    ns,
                    Creator {
                        name: format!("creator{}", ns.tag()),
                        private_key: generate_key_pair().private_key.to_string(),
                    },
                )
            })
            .collect();

        ReconcileSettings {
            creators,
            treasury: Creator {
                name: TREASURY.into(),
                private_key: generate_key_pair().private_key.to_string(),
            },
            contract: ContractSettings {
                deployer: "deployer".into(),
                name: "engagement".into(),
                comment_method: "fakecomment".into(),
                sign_in_method: "checkincount".into(),
                like_method: "fakelike".into(),
                gas: 300_000,
            },
            account_fee: 1,
            min_balance: 300_000,
            refund_tolerance: 0,
        }
    }

    pub fn reconciler(store: Arc<MemoryStore>, ledger: Arc<MockLedger>) -> Reconciler {
        let client = Arc::new(LedgerClient::new(
            "mock",
            ledger,
            Duration::from_millis(200),
            Some(Duration::from_millis(500)),
        ));
        let pool = LedgerPool::new(vec![client], "deployer", Duration::from_millis(50)).unwrap();
        Reconciler::new(store, Arc::new(pool), Arc::new(Ed25519Signer), settings())
    }

    /// Store an identity with fresh keys, without touching the ledger
    pub async fn seed_identity(store: &MemoryStore, identity_key: &str, name: &str) {
        let keys = generate_key_pair();
        store
            .hash_set(
                identity_key,
                &[
                    (FIELD_NAME, name.to_string()),
                    (FIELD_PUBLIC_KEY, keys.public_key.clone()),
                    (FIELD_PRIVATE_KEY, keys.private_key.to_string()),
                ],
            )
            .await
            .unwrap();
        store
            .set(&namespace::reverse_key(name), identity_key)
            .await
            .unwrap();
    }
}
