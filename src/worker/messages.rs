//! Work items accepted by the worker pool
//!
//! Every payload carries the namespace it was issued under and fully
//! prefixed store keys, so handlers never rebuild keys from raw ids.

use serde::Serialize;

use crate::namespace::Namespace;

#[derive(Debug, Clone, Serialize)]
pub struct CreateAccount {
    pub namespace: Namespace,
    pub identity_key: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishPost {
    pub namespace: Namespace,
    pub identity_key: String,
    pub post_key: String,
    pub title: String,
    pub content: String,
    pub tag: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikePost {
    pub namespace: Namespace,
    pub identity_key: String,
    pub post_key: String,
    pub marker: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishComment {
    pub namespace: Namespace,
    pub identity_key: String,
    pub post_key: String,
    pub comment_key: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowUser {
    pub namespace: Namespace,
    pub uid_key: String,
    pub fuid_key: String,
    pub marker: String,
    /// Unfollow when set
    pub cancel: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub namespace: Namespace,
    pub identity_key: String,
    pub marker: String,
}

/// One side of a finished match, with the figures the game reported
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub identity_key: String,
    /// Account name to use when no identity is stored yet
    pub reported_name: String,
    /// Post-match balance reported by the game
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameSettle {
    pub namespace: Namespace,
    pub marker: String,
    pub winner: Participant,
    pub loser: Participant,
    pub wager: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FakeLike {
    pub namespace: Namespace,
    pub identity_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FakeComment {
    pub namespace: Namespace,
    pub identity_key: String,
    pub content: String,
}

/// A unit of chain-mutating work
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    CreateAccount(CreateAccount),
    Post(PublishPost),
    Like(LikePost),
    Comment(PublishComment),
    Follow(FollowUser),
    SignIn(SignIn),
    GameSettle(GameSettle),
    FakeLike(FakeLike),
    FakeComment(FakeComment),
}

impl WorkItem {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateAccount(_) => "create_account",
            Self::Post(_) => "post",
            Self::Like(_) => "like",
            Self::Comment(_) => "comment",
            Self::Follow(f) if f.cancel => "unfollow",
            Self::Follow(_) => "follow",
            Self::SignIn(_) => "sign_in",
            Self::GameSettle(_) => "game_settle",
            Self::FakeLike(_) => "fake_like",
            Self::FakeComment(_) => "fake_comment",
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            Self::CreateAccount(m) => m.namespace,
            Self::Post(m) => m.namespace,
            Self::Like(m) => m.namespace,
            Self::Comment(m) => m.namespace,
            Self::Follow(m) => m.namespace,
            Self::SignIn(m) => m.namespace,
            Self::GameSettle(m) => m.namespace,
            Self::FakeLike(m) => m.namespace,
            Self::FakeComment(m) => m.namespace,
        }
    }

    /// Identity the item acts for, used in log lines
    pub fn subject(&self) -> &str {
        match self {
            Self::CreateAccount(m) => &m.identity_key,
            Self::Post(m) => &m.identity_key,
            Self::Like(m) => &m.identity_key,
            Self::Comment(m) => &m.identity_key,
            Self::Follow(m) => &m.uid_key,
            Self::SignIn(m) => &m.identity_key,
            Self::GameSettle(m) => &m.loser.identity_key,
            Self::FakeLike(m) => &m.identity_key,
            Self::FakeComment(m) => &m.identity_key,
        }
    }
}
