//! Application event intake
//!
//! ## Routes
//!
//! - `POST /api/account` - create an identity and its chain account
//! - `POST /api/post`, `/api/like`, `/api/comment` - content and engagement
//! - `POST /api/follow`, `/api/unfollow`
//! - `POST /api/signin` - daily sign-in
//! - `POST /api/game2048` - settle a finished match
//! - `POST /api/actionlist` - last chain actions of a user
//! - `GET /api/getname` - chain account name of a user
//!
//! Requests are form encoded and always answer `200` with `{"ret": code}`.
//! The checks here are advisory: they give clients a precise code, while the
//! worker that applies the item owns the authoritative dedup marker.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{json_response, status_response};
use crate::namespace::{reverse_key, Namespace, FIELD_NAME};
use crate::server::AppState;
use crate::types::{RelayError, Result};
use crate::worker::messages::{
    CreateAccount, FakeComment, FakeLike, FollowUser, GameSettle, LikePost, Participant,
    PublishComment, PublishPost, SignIn,
};
use crate::worker::{settlement, WorkItem};

const MAX_FORM_BYTES: usize = 64 * 1024;

/// Number of entries in an action list reply
const ACTION_LIST_LEN: usize = 5;

/// Result codes carried in the `ret` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCode {
    Ok = 1000,
    ParamError = 2000,
    ServerError = 2001,
    IdDuplicate = 3000,
    IdNotExist = 3001,
    PostIdDuplicate = 3002,
    PostIdNotExist = 3003,
    CommentIdDuplicate = 3004,
    CommentIdNotExist = 3005,
    FuidNotExist = 3006,
    LikePostDuplicate = 3007,
    FollowDuplicate = 3008,
    FollowSelf = 3009,
    Signed = 3010,
    GameIdExist = 3011,
}

impl RetCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// One row of `/api/actionlist`; unused rows stay empty
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEntry {
    #[serde(rename = "TimeStamp")]
    pub time_stamp: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "TxHash")]
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiReply {
    pub ret: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<ActionEntry>>,
}

impl From<RetCode> for ApiReply {
    fn from(code: RetCode) -> Self {
        Self {
            ret: code.code(),
            name: None,
            list: None,
        }
    }
}

pub type Form = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Account,
    Post,
    Like,
    Comment,
    Follow,
    Unfollow,
    SignIn,
    Game2048,
    ActionList,
    GetName,
}

impl Endpoint {
    pub fn from_path(path: &str) -> Option<Self> {
        Some(match path {
            "/api/account" => Self::Account,
            "/api/post" => Self::Post,
            "/api/like" => Self::Like,
            "/api/comment" => Self::Comment,
            "/api/follow" => Self::Follow,
            "/api/unfollow" => Self::Unfollow,
            "/api/signin" => Self::SignIn,
            "/api/game2048" => Self::Game2048,
            "/api/actionlist" => Self::ActionList,
            "/api/getname" => Self::GetName,
            _ => return None,
        })
    }

    pub fn method(self) -> Method {
        match self {
            Self::GetName => Method::GET,
            _ => Method::POST,
        }
    }

    /// Lookups are not charged against the token bucket
    pub fn rate_limited(self) -> bool {
        self != Self::GetName
    }
}

/// Handle a request under `/api/`
pub async fn handle_api_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let started = Instant::now();
    let path = req.uri().path().to_string();

    let Some(endpoint) = Endpoint::from_path(&path) else {
        return json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "Not Found", "path": path }),
        );
    };

    if endpoint.rate_limited() && !state.limiter.try_acquire() {
        return status_response(StatusCode::TOO_MANY_REQUESTS);
    }
    if req.method() != endpoint.method() {
        return status_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let reply = match read_form(req).await {
        Ok(form) => dispatch(&state, endpoint, &form).await,
        Err(e) => {
            debug!(path = %path, error = %e, "Unparseable form");
            RetCode::ParamError.into()
        }
    };

    info!(
        path = %path,
        ret = reply.ret,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "API request"
    );
    json_response(StatusCode::OK, &reply)
}

pub fn parse_form(raw: &[u8]) -> Result<Form> {
    serde_urlencoded::from_bytes(raw)
        .map_err(|e| RelayError::BadRequest(format!("malformed form: {}", e)))
}

/// Query string merged with the form body; body values win
async fn read_form(req: Request<Incoming>) -> Result<Form> {
    let mut form = parse_form(req.uri().query().unwrap_or_default().as_bytes())?;
    let body = Limited::new(req.into_body(), MAX_FORM_BYTES)
        .collect()
        .await
        .map_err(|e| RelayError::BadRequest(format!("unreadable body: {}", e)))?
        .to_bytes();
    form.extend(parse_form(&body)?);
    Ok(form)
}

/// Run one endpoint against an already parsed form
pub async fn dispatch(state: &AppState, endpoint: Endpoint, form: &Form) -> ApiReply {
    let outcome = match endpoint {
        Endpoint::Account => create_account(state, form).await,
        Endpoint::Post => post(state, form).await,
        Endpoint::Like => like(state, form).await,
        Endpoint::Comment => comment(state, form).await,
        Endpoint::Follow => follow(state, form).await,
        Endpoint::Unfollow => unfollow(state, form).await,
        Endpoint::SignIn => sign_in(state, form).await,
        Endpoint::Game2048 => game2048(state, form).await,
        Endpoint::ActionList => action_list(state, form).await,
        Endpoint::GetName => get_name(state, form).await,
    };

    match outcome {
        Ok(reply) => reply,
        Err(RelayError::BadRequest(reason)) => {
            debug!(?endpoint, reason = %reason, "Rejected parameters");
            RetCode::ParamError.into()
        }
        Err(e) => {
            error!(?endpoint, error = %e, "API request failed");
            RetCode::ServerError.into()
        }
    }
}

fn field<'a>(form: &'a Form, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or("")
}

fn required<'a>(form: &'a Form, name: &str) -> Result<&'a str> {
    match field(form, name) {
        "" => Err(RelayError::BadRequest(format!("missing {}", name))),
        value => Ok(value),
    }
}

fn numeric(form: &Form, name: &str) -> Result<u64> {
    required(form, name)?
        .parse::<u64>()
        .map_err(|_| RelayError::BadRequest(format!("{} is not an unsigned integer", name)))
}

fn namespace(form: &Form) -> Result<Namespace> {
    required(form, "type")?
        .parse::<i64>()
        .ok()
        .and_then(Namespace::from_type)
        .ok_or_else(|| RelayError::BadRequest("unknown type".into()))
}

async fn stored_name(state: &AppState, identity_key: &str) -> Result<Option<String>> {
    Ok(state
        .store
        .hash_get(identity_key, FIELD_NAME)
        .await?
        .filter(|name| !name.is_empty()))
}

async fn create_account(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let user_name = required(form, "user_name")?;
    let ns = namespace(form)?;
    let partition = numeric(form, "id")?;

    let identity_key = ns.identity_key(id);
    let account_name = ns.account_name(user_name);

    if state.store.exists(&reverse_key(&account_name)).await? {
        warn!(account = %account_name, "Generated account name already taken");
        return Ok(RetCode::ServerError.into());
    }
    if state.store.exists(&identity_key).await? {
        return Ok(RetCode::IdDuplicate.into());
    }

    let item = WorkItem::CreateAccount(CreateAccount {
        namespace: ns,
        identity_key,
        account_name,
    });
    state.workers.put(partition, item).await?;
    Ok(RetCode::Ok.into())
}

async fn post(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let post_id = required(form, "post_id")?;
    let content = required(form, "content")?;
    let ns = namespace(form)?;
    numeric(form, "post_id")?;
    let partition = numeric(form, "id")?;

    let title = match field(form, "title") {
        "" => ns.tag(),
        title => title,
    };
    let tag = match field(form, "tag") {
        "" => ns.tag(),
        tag => tag,
    };

    let identity_key = ns.identity_key(id);
    let post_key = ns.post_key(post_id);

    if state.store.exists(&post_key).await? {
        return Ok(RetCode::PostIdDuplicate.into());
    }
    if !state.store.exists(&identity_key).await? {
        return Ok(RetCode::IdNotExist.into());
    }

    let item = WorkItem::Post(PublishPost {
        namespace: ns,
        identity_key,
        post_key,
        title: title.to_string(),
        content: content.to_string(),
        tag: tag.to_string(),
    });
    state.workers.put(partition, item).await?;
    Ok(RetCode::Ok.into())
}

async fn like(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let ns = namespace(form)?;
    let partition = numeric(form, "id")?;

    let identity_key = ns.identity_key(id);
    let post_key = ns.post_key(field(form, "post_id"));

    if !state.store.exists(&identity_key).await? {
        return Ok(RetCode::IdNotExist.into());
    }

    if !state.store.exists(&post_key).await? {
        if stored_name(state, &identity_key).await?.is_some() {
            let item = WorkItem::FakeLike(FakeLike {
                namespace: ns,
                identity_key,
            });
            state.workers.put(partition, item).await?;
        } else {
            warn!(identity = %identity_key, "Identity has no account name, fake like skipped");
        }
        return Ok(RetCode::PostIdNotExist.into());
    }

    let marker = ns.like_marker(&identity_key, &post_key);
    if state.store.exists(&marker).await? {
        return Ok(RetCode::LikePostDuplicate.into());
    }

    let item = WorkItem::Like(LikePost {
        namespace: ns,
        identity_key,
        post_key,
        marker,
    });
    state.workers.put(partition, item).await?;
    Ok(RetCode::Ok.into())
}

async fn comment(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let comment_id = required(form, "comment_id")?;
    let content = required(form, "comment_content")?;
    let ns = namespace(form)?;
    numeric(form, "comment_id")?;
    let partition = numeric(form, "id")?;

    let identity_key = ns.identity_key(id);
    let post_key = ns.post_key(field(form, "post_id"));
    let comment_key = ns.comment_key(comment_id);

    if state.store.exists(&comment_key).await? {
        return Ok(RetCode::CommentIdDuplicate.into());
    }
    if !state.store.exists(&identity_key).await? {
        return Ok(RetCode::IdNotExist.into());
    }

    if !state.store.exists(&post_key).await? {
        if stored_name(state, &identity_key).await?.is_some() {
            let item = WorkItem::FakeComment(FakeComment {
                namespace: ns,
                identity_key,
                content: content.to_string(),
            });
            state.workers.put(partition, item).await?;
        } else {
            warn!(identity = %identity_key, "Identity has no account name, fake comment skipped");
        }
        return Ok(RetCode::PostIdNotExist.into());
    }

    let item = WorkItem::Comment(PublishComment {
        namespace: ns,
        identity_key,
        post_key,
        comment_key,
        content: content.to_string(),
    });
    state.workers.put(partition, item).await?;
    Ok(RetCode::Ok.into())
}

/// Validated follow relation
struct FollowTarget {
    partition: u64,
    namespace: Namespace,
    uid_key: String,
    fuid_key: String,
}

/// Shared checks of follow and unfollow; `Err` carries the rejection code
async fn follow_target(
    state: &AppState,
    form: &Form,
) -> Result<std::result::Result<FollowTarget, RetCode>> {
    let uid = required(form, "uid")?;
    let fuid = required(form, "fuid")?;
    let ns = namespace(form)?;
    let partition = numeric(form, "uid")?;
    numeric(form, "fuid")?;

    let uid_key = ns.identity_key(uid);
    let fuid_key = ns.identity_key(fuid);

    if uid_key == fuid_key {
        return Ok(Err(RetCode::FollowSelf));
    }
    if !state.store.exists(&uid_key).await? {
        return Ok(Err(RetCode::IdNotExist));
    }
    if !state.store.exists(&fuid_key).await? {
        return Ok(Err(RetCode::FuidNotExist));
    }

    Ok(Ok(FollowTarget {
        partition,
        namespace: ns,
        uid_key,
        fuid_key,
    }))
}

async fn follow(state: &AppState, form: &Form) -> Result<ApiReply> {
    let target = match follow_target(state, form).await? {
        Ok(target) => target,
        Err(code) => return Ok(code.into()),
    };

    let marker = target
        .namespace
        .follow_marker(&target.uid_key, &target.fuid_key);
    if state.store.exists(&marker).await? {
        return Ok(RetCode::FollowDuplicate.into());
    }

    let item = WorkItem::Follow(FollowUser {
        namespace: target.namespace,
        uid_key: target.uid_key,
        fuid_key: target.fuid_key,
        marker,
        cancel: false,
    });
    state.workers.put(target.partition, item).await?;
    Ok(RetCode::Ok.into())
}

async fn unfollow(state: &AppState, form: &Form) -> Result<ApiReply> {
    let target = match follow_target(state, form).await? {
        Ok(target) => target,
        Err(code) => return Ok(code.into()),
    };

    let marker = target
        .namespace
        .follow_marker(&target.uid_key, &target.fuid_key);
    // Not following is already the requested state
    if !state.store.exists(&marker).await? {
        return Ok(RetCode::Ok.into());
    }

    let item = WorkItem::Follow(FollowUser {
        namespace: target.namespace,
        uid_key: target.uid_key,
        fuid_key: target.fuid_key,
        marker,
        cancel: true,
    });
    state.workers.put(target.partition, item).await?;
    Ok(RetCode::Ok.into())
}

async fn sign_in(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let date = required(form, "date")?;
    let ns = namespace(form)?;
    let partition = numeric(form, "id")?;

    let identity_key = ns.identity_key(id);
    if !state.store.exists(&identity_key).await? {
        return Ok(RetCode::IdNotExist.into());
    }

    let marker = ns.sign_in_marker(&identity_key, date);
    if state.store.exists(&marker).await? {
        return Ok(RetCode::Signed.into());
    }

    let item = WorkItem::SignIn(SignIn {
        namespace: ns,
        identity_key,
        marker,
    });
    state.workers.put(partition, item).await?;
    Ok(RetCode::Ok.into())
}

/// Settlements are partitioned by the loser, whose account pays the wager
async fn game2048(state: &AppState, form: &Form) -> Result<ApiReply> {
    let winner_id = required(form, "winnerId")?;
    let winner_name = required(form, "winnerName")?;
    let loser_id = required(form, "loserId")?;
    let loser_name = required(form, "loserName")?;
    let game_id = required(form, "gameId")?;
    let ns = namespace(form)?;

    let wager = numeric(form, "cos")?;
    let winner_balance = numeric(form, "winnerCos")?;
    let loser_balance = numeric(form, "loserCos")?;
    let partition = numeric(form, "loserId")?;

    if winner_id == loser_id {
        return Err(RelayError::BadRequest("winner and loser are the same player".into()));
    }
    settlement::targets(winner_balance, loser_balance, wager)
        .map_err(|e| RelayError::BadRequest(e.to_string()))?;

    let marker = ns.game_marker(game_id, loser_id);
    if state.store.exists(&marker).await? {
        return Ok(RetCode::GameIdExist.into());
    }

    let item = WorkItem::GameSettle(GameSettle {
        namespace: ns,
        marker,
        winner: Participant {
            identity_key: ns.identity_key(winner_id),
            reported_name: ns.account_name(winner_name),
            balance: winner_balance,
        },
        loser: Participant {
            identity_key: ns.identity_key(loser_id),
            reported_name: ns.account_name(loser_name),
            balance: loser_balance,
        },
        wager,
    });
    state.workers.put(partition, item).await?;
    Ok(RetCode::Ok.into())
}

async fn action_list(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let ns = namespace(form)?;
    numeric(form, "id")?;

    let identity_key = ns.identity_key(id);
    let Some(name) = stored_name(state, &identity_key).await? else {
        return Ok(RetCode::IdNotExist.into());
    };

    let mut list = vec![ActionEntry::default(); ACTION_LIST_LEN];
    match state
        .ledger
        .get_client()
        .get_user_action_history(&name, ACTION_LIST_LEN as u32)
        .await
    {
        Ok(records) => {
            for (slot, record) in list.iter_mut().zip(records) {
                slot.action = record.label().to_string();
                slot.time_stamp = record.block_time;
                slot.tx_hash = record.tx_hash;
            }
        }
        Err(e) => warn!(account = %name, error = %e, "Action history unavailable"),
    }

    Ok(ApiReply {
        list: Some(list),
        ..ApiReply::from(RetCode::Ok)
    })
}

async fn get_name(state: &AppState, form: &Form) -> Result<ApiReply> {
    let id = required(form, "id")?;
    let ns = namespace(form)?;
    numeric(form, "id")?;

    let identity_key = ns.identity_key(id);
    if !state.store.exists(&identity_key).await? {
        return Ok(RetCode::IdNotExist.into());
    }

    match stored_name(state, &identity_key).await? {
        Some(name) => Ok(ApiReply {
            name: Some(name),
            ..ApiReply::from(RetCode::Ok)
        }),
        None => Ok(RetCode::ServerError.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::ledger::ActionRecord;
    use crate::routes::testing::Harness;
    use crate::worker::reconcile::testing::seed_identity;

    fn form(pairs: &[(&str, &str)]) -> Form {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn call(h: &Harness, endpoint: Endpoint, pairs: &[(&str, &str)]) -> u32 {
        dispatch(&h.state, endpoint, &form(pairs)).await.ret
    }

    #[test]
    fn test_endpoint_table() {
        assert_eq!(Endpoint::from_path("/api/game2048"), Some(Endpoint::Game2048));
        assert_eq!(Endpoint::from_path("/api/nope"), None);
        assert_eq!(Endpoint::GetName.method(), Method::GET);
        assert_eq!(Endpoint::Follow.method(), Method::POST);
        assert!(!Endpoint::GetName.rate_limited());
    }

    #[test]
    fn test_reply_shape() {
        let body = serde_json::to_value(ApiReply::from(RetCode::PostIdNotExist)).unwrap();
        assert_eq!(body, serde_json::json!({ "ret": 3003 }));

        let parsed = parse_form(b"id=7&user_name=al%20ice&type=1").unwrap();
        assert_eq!(parsed["user_name"], "al ice");
    }

    #[tokio::test]
    async fn test_account_parameters() {
        let h = Harness::new(&[]);
        assert_eq!(call(&h, Endpoint::Account, &[("id", "7"), ("type", "1")]).await, 2000);
        assert_eq!(
            call(&h, Endpoint::Account, &[("id", "7"), ("user_name", "al"), ("type", "9")]).await,
            2000
        );
        assert_eq!(
            call(&h, Endpoint::Account, &[("id", "x"), ("user_name", "al"), ("type", "1")]).await,
            2000
        );
    }

    #[tokio::test]
    async fn test_account_enqueues_and_detects_duplicates() {
        let mut h = Harness::new(&[]);
        let ret = call(
            &h,
            Endpoint::Account,
            &[("id", "7"), ("user_name", "al-ice!"), ("type", "1")],
        )
        .await;
        assert_eq!(ret, 1000);

        match h.next_item().await {
            WorkItem::CreateAccount(m) => {
                assert_eq!(m.identity_key, "IPG7");
                assert!(m.account_name.starts_with("PGalice"));
                assert_eq!(m.account_name.len(), 15);
            }
            other => panic!("unexpected item: {:?}", other),
        }

        seed_identity(&h.store, "IPG7", "PGalice12345678").await;
        let ret = call(
            &h,
            Endpoint::Account,
            &[("id", "7"), ("user_name", "alice"), ("type", "1")],
        )
        .await;
        assert_eq!(ret, 3000);
    }

    #[tokio::test]
    async fn test_post_checks_and_defaults() {
        let mut h = Harness::new(&[]);
        let base = [("id", "3"), ("post_id", "11"), ("content", "hi"), ("type", "2")];

        assert_eq!(call(&h, Endpoint::Post, &base).await, 3001);

        seed_identity(&h.store, "ICT3", "writer").await;
        assert_eq!(call(&h, Endpoint::Post, &base).await, 1000);
        match h.next_item().await {
            WorkItem::Post(m) => {
                assert_eq!(m.post_key, "PCT11");
                assert_eq!(m.title, "CT");
                assert_eq!(m.tag, "CT");
            }
            other => panic!("unexpected item: {:?}", other),
        }

        h.store
            .hash_set("PCT11", &[("id", "ICT3".to_string())])
            .await
            .unwrap();
        assert_eq!(call(&h, Endpoint::Post, &base).await, 3002);

        let bad_post_id = [("id", "3"), ("post_id", "p1"), ("content", "hi"), ("type", "2")];
        assert_eq!(call(&h, Endpoint::Post, &bad_post_id).await, 2000);
    }

    #[tokio::test]
    async fn test_like_on_missing_post_sends_fake_like() {
        let mut h = Harness::new(&[]);
        seed_identity(&h.store, "IPG5", "fan").await;

        let ret = call(&h, Endpoint::Like, &[("id", "5"), ("post_id", "404"), ("type", "1")]).await;
        assert_eq!(ret, 3003);
        match h.next_item().await {
            WorkItem::FakeLike(m) => assert_eq!(m.identity_key, "IPG5"),
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_like_duplicate_marker() {
        let mut h = Harness::new(&[]);
        seed_identity(&h.store, "IPG5", "fan").await;
        h.store
            .hash_set("PPG9", &[("id", "IPG5".to_string())])
            .await
            .unwrap();
        h.store.set("LPGIPG5PPG9", "1").await.unwrap();

        let ret = call(&h, Endpoint::Like, &[("id", "5"), ("post_id", "9"), ("type", "1")]).await;
        assert_eq!(ret, 3007);
        assert!(h.nothing_enqueued().await);
    }

    #[tokio::test]
    async fn test_comment_checks() {
        let mut h = Harness::new(&[]);
        let pairs = [
            ("id", "5"),
            ("post_id", "9"),
            ("comment_id", "30"),
            ("comment_content", "nice"),
            ("type", "1"),
        ];
        assert_eq!(call(&h, Endpoint::Comment, &pairs).await, 3001);

        seed_identity(&h.store, "IPG5", "fan").await;
        assert_eq!(call(&h, Endpoint::Comment, &pairs).await, 3003);
        match h.next_item().await {
            WorkItem::FakeComment(m) => assert_eq!(m.content, "nice"),
            other => panic!("unexpected item: {:?}", other),
        }

        h.store
            .hash_set("PPG9", &[("id", "IPG5".to_string())])
            .await
            .unwrap();
        assert_eq!(call(&h, Endpoint::Comment, &pairs).await, 1000);
        match h.next_item().await {
            WorkItem::Comment(m) => assert_eq!(m.comment_key, "CPG30"),
            other => panic!("unexpected item: {:?}", other),
        }

        h.store
            .hash_set("CPG30", &[("id", "IPG5".to_string())])
            .await
            .unwrap();
        assert_eq!(call(&h, Endpoint::Comment, &pairs).await, 3004);
    }

    #[tokio::test]
    async fn test_follow_checks() {
        let mut h = Harness::new(&[]);
        let pairs = [("uid", "1"), ("fuid", "2"), ("type", "1")];

        assert_eq!(
            call(&h, Endpoint::Follow, &[("uid", "1"), ("fuid", "1"), ("type", "1")]).await,
            3009
        );
        assert_eq!(call(&h, Endpoint::Follow, &pairs).await, 3001);
        seed_identity(&h.store, "IPG1", "fan").await;
        assert_eq!(call(&h, Endpoint::Follow, &pairs).await, 3006);
        seed_identity(&h.store, "IPG2", "star").await;

        // Unfollow without a follow is a no-op success
        assert_eq!(call(&h, Endpoint::Unfollow, &pairs).await, 1000);
        assert!(h.nothing_enqueued().await);

        assert_eq!(call(&h, Endpoint::Follow, &pairs).await, 1000);
        match h.next_item().await {
            WorkItem::Follow(m) => {
                assert!(!m.cancel);
                assert_eq!(m.marker, "FPGIPG1IPG2");
            }
            other => panic!("unexpected item: {:?}", other),
        }

        h.store.set("FPGIPG1IPG2", "1").await.unwrap();
        assert_eq!(call(&h, Endpoint::Follow, &pairs).await, 3008);
        assert_eq!(call(&h, Endpoint::Unfollow, &pairs).await, 1000);
        match h.next_item().await {
            WorkItem::Follow(m) => assert!(m.cancel),
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_in_once_per_date() {
        let mut h = Harness::new(&[]);
        let pairs = [("id", "4"), ("date", "20240101"), ("type", "2")];
        assert_eq!(call(&h, Endpoint::SignIn, &pairs).await, 3001);

        seed_identity(&h.store, "ICT4", "daily").await;
        assert_eq!(call(&h, Endpoint::SignIn, &pairs).await, 1000);
        match h.next_item().await {
            WorkItem::SignIn(m) => assert_eq!(m.marker, "ICT4DCT20240101"),
            other => panic!("unexpected item: {:?}", other),
        }

        h.store.set("ICT4DCT20240101", "1").await.unwrap();
        assert_eq!(call(&h, Endpoint::SignIn, &pairs).await, 3010);
    }

    #[tokio::test]
    async fn test_game_settlement_intake() {
        let mut h = Harness::new(&[]);
        let pairs = [
            ("cos", "30"),
            ("type", "3"),
            ("gameId", "1000"),
            ("winnerId", "1"),
            ("winnerCos", "100"),
            ("winnerName", "win"),
            ("loserId", "6"),
            ("loserCos", "40"),
            ("loserName", "lose"),
        ];

        assert_eq!(call(&h, Endpoint::Game2048, &pairs).await, 1000);
        match h.next_item().await {
            WorkItem::GameSettle(m) => {
                assert_eq!(m.marker, "GG210006");
                assert_eq!(m.winner.identity_key, "IG21");
                assert!(m.winner.reported_name.starts_with("G2win"));
                assert_eq!(m.loser.balance, 40);
                assert_eq!(m.wager, 30);
            }
            other => panic!("unexpected item: {:?}", other),
        }

        h.store.set("GG210006", "1").await.unwrap();
        assert_eq!(call(&h, Endpoint::Game2048, &pairs).await, 3011);

        // Winner cannot end below the wager
        let mut impossible = pairs;
        impossible[4] = ("winnerCos", "10");
        assert_eq!(call(&h, Endpoint::Game2048, &impossible).await, 2000);

        let mut self_match = pairs;
        self_match[2] = ("gameId", "1001");
        self_match[6] = ("loserId", "1");
        assert_eq!(call(&h, Endpoint::Game2048, &self_match).await, 2000);
        assert!(h.nothing_enqueued().await);
    }

    #[tokio::test]
    async fn test_action_list_pads_to_five() {
        let h = Harness::new(&[]);
        assert_eq!(call(&h, Endpoint::ActionList, &[("id", "8"), ("type", "1")]).await, 3001);

        seed_identity(&h.store, "IPG8", "busy").await;
        h.ledger.set_history(
            "busy",
            vec![
                ActionRecord {
                    tx_hash: "aa".into(),
                    block_time: "2024-01-01T00:00:00".into(),
                    operation: "vote".into(),
                },
                ActionRecord {
                    tx_hash: "bb".into(),
                    block_time: "2024-01-02T00:00:00".into(),
                    operation: "transfer".into(),
                },
            ],
        );

        let reply = dispatch(&h.state, Endpoint::ActionList, &form(&[("id", "8"), ("type", "1")])).await;
        assert_eq!(reply.ret, 1000);
        let list = reply.list.unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list[0].action, "Like");
        assert_eq!(list[0].tx_hash, "aa");
        assert_eq!(list[1].action, "otherAction");
        assert_eq!(list[4], ActionEntry::default());
    }

    #[tokio::test]
    async fn test_get_name() {
        let h = Harness::new(&[]);
        let pairs = [("id", "8"), ("type", "1")];
        assert_eq!(call(&h, Endpoint::GetName, &pairs).await, 3001);

        seed_identity(&h.store, "IPG8", "PGbusy1234").await;
        let reply = dispatch(&h.state, Endpoint::GetName, &form(&pairs)).await;
        assert_eq!(reply.ret, 1000);
        assert_eq!(reply.name.as_deref(), Some("PGbusy1234"));
    }
}
