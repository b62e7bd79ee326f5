//! Work item handlers
//!
//! Every handler resolves all local records before its dedup marker is
//! claimed, so a missing identity or post aborts the item with no store write
//! and no chain call.

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::messages::{
    CreateAccount, FakeComment, FakeLike, FollowUser, GameSettle, LikePost, Participant,
    PublishComment, PublishPost, SignIn, WorkItem,
};
use super::pool::WorkHandler;
use super::reconcile::Reconciler;
use super::settlement::{self, BalanceAdjustment};
use crate::ledger::{generate_content_uuid, Beneficiary, Operation};
use crate::namespace::{Namespace, FIELD_OWNER, FIELD_PARENT, FIELD_UUID, NO_PARENT};
use crate::types::{RelayError, Result};

/// Applies work items to the ledger
pub struct RelayHandler {
    reconciler: Arc<Reconciler>,
}

impl RelayHandler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    async fn create_account(&self, m: CreateAccount) -> Result<()> {
        let r = &self.reconciler;
        if r.store().exists(&m.identity_key).await? {
            return Err(RelayError::Duplicate(format!(
                "identity {} already exists",
                m.identity_key
            )));
        }
        r.provision(m.namespace, &m.identity_key, &m.account_name).await
    }

    async fn post(&self, m: PublishPost) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.identity_key).await?;

        let uuid = generate_content_uuid(&format!("{}{}", name, m.title));
        // Recorded before the broadcast so a failed post can be repaired later
        r.record_content(
            &m.post_key,
            &[
                (FIELD_UUID, uuid.to_string()),
                (FIELD_OWNER, m.identity_key.clone()),
                (FIELD_PARENT, NO_PARENT.to_string()),
            ],
        )
        .await?;

        r.ensure_account(m.namespace, &m.identity_key, &name).await?;
        let key = r.private_key(&m.identity_key).await?;
        r.submit(
            &key,
            Operation::Post {
                uuid,
                owner: name.clone(),
                title: m.title,
                content: m.content,
                tags: vec![m.tag],
                beneficiaries: vec![Beneficiary { name, weight: 1 }],
            },
        )
        .await
        .map(|_| ())
    }

    async fn like(&self, m: LikePost) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.identity_key).await?;
        let (owner_key, post_uuid) = r.content_owner(&m.post_key).await?;
        let owner_name = r.resolve_name(&owner_key).await?;

        r.claim(&m.marker).await?;

        r.ensure_account(m.namespace, &m.identity_key, &name).await?;
        r.ensure_account(m.namespace, &owner_key, &owner_name).await?;
        let key = r.private_key(&m.identity_key).await?;
        r.submit(
            &key,
            Operation::Vote {
                voter: name,
                idx: post_uuid,
            },
        )
        .await
        .map(|_| ())
    }

    async fn comment(&self, m: PublishComment) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.identity_key).await?;
        let (owner_key, parent_uuid) = r.content_owner(&m.post_key).await?;
        let owner_name = r.resolve_name(&owner_key).await?;

        let uuid = generate_content_uuid(&name);
        r.record_content(
            &m.comment_key,
            &[
                (FIELD_UUID, uuid.to_string()),
                (FIELD_OWNER, m.identity_key.clone()),
                (FIELD_PARENT, m.post_key.clone()),
            ],
        )
        .await?;

        r.ensure_account(m.namespace, &m.identity_key, &name).await?;
        r.ensure_account(m.namespace, &owner_key, &owner_name).await?;
        let key = r.private_key(&m.identity_key).await?;
        r.submit(
            &key,
            Operation::Reply {
                uuid,
                owner: name.clone(),
                content: m.content,
                parent_uuid,
                beneficiaries: vec![Beneficiary { name, weight: 1 }],
            },
        )
        .await
        .map(|_| ())
    }

    async fn follow(&self, m: FollowUser) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.uid_key).await?;
        let target = r.resolve_name(&m.fuid_key).await?;

        if m.cancel {
            r.release(&m.marker).await?;
        } else {
            r.claim(&m.marker).await?;
        }

        r.ensure_account(m.namespace, &m.uid_key, &name).await?;
        r.ensure_account(m.namespace, &m.fuid_key, &target).await?;
        let key = r.private_key(&m.uid_key).await?;
        r.submit(
            &key,
            Operation::Follow {
                account: name,
                f_account: target,
                cancel: m.cancel,
            },
        )
        .await
        .map(|_| ())
    }

    async fn sign_in(&self, m: SignIn) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.identity_key).await?;

        r.claim(&m.marker).await?;

        r.ensure_account(m.namespace, &m.identity_key, &name).await?;
        r.grant_minimum(&name).await?;
        let method = r.settings().contract.sign_in_method.clone();
        r.call_contract(&m.identity_key, &name, &method, json!([name]).to_string())
            .await
    }

    async fn fake_like(&self, m: FakeLike) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.identity_key).await?;

        r.ensure_account(m.namespace, &m.identity_key, &name).await?;
        r.grant_minimum(&name).await?;
        let nonce: u64 = rand::thread_rng().gen();
        let method = r.settings().contract.like_method.clone();
        r.call_contract(
            &m.identity_key,
            &name,
            &method,
            json!([name, nonce]).to_string(),
        )
        .await
    }

    async fn fake_comment(&self, m: FakeComment) -> Result<()> {
        let r = &self.reconciler;
        let name = r.resolve_name(&m.identity_key).await?;

        r.ensure_account(m.namespace, &m.identity_key, &name).await?;
        r.grant_minimum(&name).await?;
        let uuid = generate_content_uuid(&name);
        let nonce: u64 = rand::thread_rng().gen();
        let method = r.settings().contract.comment_method.clone();
        r.call_contract(
            &m.identity_key,
            &name,
            &method,
            json!([uuid, name, m.content, nonce]).to_string(),
        )
        .await
    }

    async fn game_settle(&self, m: GameSettle) -> Result<()> {
        let r = &self.reconciler;
        if m.winner.identity_key == m.loser.identity_key {
            return Err(RelayError::Inconsistent(format!(
                "{} cannot play against itself",
                m.winner.identity_key
            )));
        }
        let targets = settlement::targets(m.winner.balance, m.loser.balance, m.wager)?;

        let winner_name = r
            .stored_name(&m.winner.identity_key)
            .await?
            .unwrap_or_else(|| m.winner.reported_name.clone());
        let loser_name = r
            .stored_name(&m.loser.identity_key)
            .await?
            .unwrap_or_else(|| m.loser.reported_name.clone());

        r.claim(&m.marker).await?;

        self.settle_participant(m.namespace, &m.winner, &winner_name, targets.winner)
            .await?;
        self.settle_participant(m.namespace, &m.loser, &loser_name, targets.loser)
            .await?;

        r.transfer(&m.loser.identity_key, &loser_name, &winner_name, m.wager)
            .await
    }

    /// Bring one participant to the expected pre-match balance
    async fn settle_participant(
        &self,
        namespace: Namespace,
        participant: &Participant,
        name: &str,
        expected: u64,
    ) -> Result<()> {
        let r = &self.reconciler;
        let account = match r.lookup(name).await? {
            Some(account) => account,
            None => {
                r.provision(namespace, &participant.identity_key, name).await?;
                if participant.balance > 0 {
                    r.top_up(name, participant.balance).await?;
                }
                return Ok(());
            }
        };

        match settlement::adjustment(account.balance, expected, r.settings().refund_tolerance) {
            BalanceAdjustment::None => {
                debug!(account = name, balance = account.balance, "Balance matches report");
                Ok(())
            }
            BalanceAdjustment::TopUp(amount) => r.top_up(name, amount).await,
            BalanceAdjustment::Refund(amount) => {
                r.refund(&participant.identity_key, name, amount).await
            }
        }
    }
}

#[async_trait]
impl WorkHandler for RelayHandler {
    async fn handle(&self, shard: usize, item: WorkItem) -> Result<()> {
        debug!(shard, kind = item.kind(), "Handling work item");
        match item {
            WorkItem::CreateAccount(m) => self.create_account(m).await,
            WorkItem::Post(m) => self.post(m).await,
            WorkItem::Like(m) => self.like(m).await,
            WorkItem::Comment(m) => self.comment(m).await,
            WorkItem::Follow(m) => self.follow(m).await,
            WorkItem::SignIn(m) => self.sign_in(m).await,
            WorkItem::GameSettle(m) => self.game_settle(m).await,
            WorkItem::FakeLike(m) => self.fake_like(m).await,
            WorkItem::FakeComment(m) => self.fake_comment(m).await,
        }
    }
}
