//! Namespace tags and store key scheme
//!
//! Three client applications share one store and one ledger. Every external
//! id is prefixed with a record kind letter and the application's namespace
//! tag so that, for example, user 42 of the photo app and user 42 of the game
//! never collide.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Hash field holding the chain account name of an identity
pub const FIELD_NAME: &str = "name";
/// Hash field holding the base58 public key of an identity
pub const FIELD_PUBLIC_KEY: &str = "public_key";
/// Hash field holding the base58 private key of an identity
pub const FIELD_PRIVATE_KEY: &str = "private_key";
/// Hash field accumulating credited block rewards
pub const FIELD_REWARD: &str = "vest";
/// Hash field holding the content uuid of a post or comment
pub const FIELD_UUID: &str = "uuid";
/// Hash field holding the owner identity key of a post or comment
pub const FIELD_OWNER: &str = "id";
/// Hash field holding the parent content key ("0" for top-level posts)
pub const FIELD_PARENT: &str = "parent_id";

/// Key of the persisted reward cursor
pub const BLOCK_HEIGHT_KEY: &str = "blockheight";

/// Parent value stored for top-level content
pub const NO_PARENT: &str = "0";

const ACCOUNT_NAME_STEM: usize = 8;
const ACCOUNT_NAME_SUFFIX: usize = 8;

/// Client application an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    PhotoGrid,
    Contentos,
    Game2048,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Self::PhotoGrid, Self::Contentos, Self::Game2048];

    /// Resolve the numeric `type` form parameter
    pub fn from_type(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::PhotoGrid),
            2 => Some(Self::Contentos),
            3 => Some(Self::Game2048),
            _ => None,
        }
    }

    /// Resolve a two-letter tag (used in creator configuration)
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.tag() == tag)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::PhotoGrid => "PG",
            Self::Contentos => "CT",
            Self::Game2048 => "G2",
        }
    }

    pub fn identity_key(&self, id: &str) -> String {
        format!("I{}{}", self.tag(), id)
    }

    pub fn post_key(&self, id: &str) -> String {
        format!("P{}{}", self.tag(), id)
    }

    pub fn comment_key(&self, id: &str) -> String {
        format!("C{}{}", self.tag(), id)
    }

    /// Marker for "identity liked post"; both arguments are full keys
    pub fn like_marker(&self, identity_key: &str, post_key: &str) -> String {
        format!("L{}{}{}", self.tag(), identity_key, post_key)
    }

    /// Marker for "uid follows fuid"; both arguments are full identity keys
    pub fn follow_marker(&self, uid_key: &str, fuid_key: &str) -> String {
        format!("F{}{}{}", self.tag(), uid_key, fuid_key)
    }

    pub fn sign_in_marker(&self, identity_key: &str, date: &str) -> String {
        format!("{}D{}{}", identity_key, self.tag(), date)
    }

    pub fn game_marker(&self, game_id: &str, loser_id: &str) -> String {
        format!("G{}{}{}", self.tag(), game_id, loser_id)
    }

    /// Chain account name derived from a user-supplied display name
    pub fn account_name(&self, requested: &str) -> String {
        generate_account_name(&format!("{}{}", self.tag(), requested))
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Key of the reverse mapping from chain account name to identity key
pub fn reverse_key(account_name: &str) -> String {
    format!("A:{}", account_name)
}

/// Keep only `[0-9A-Za-z]`
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Truncate the sanitized stem and append a random suffix.
///
/// When nothing valid remains, the name is 8 to 15 random characters.
pub fn generate_account_name(name: &str) -> String {
    let stem = sanitize_name(name);
    if stem.is_empty() {
        let len = rand::thread_rng().gen_range(8..16);
        return random_alphanumeric(len);
    }

    let mut out: String = stem.chars().take(ACCOUNT_NAME_STEM).collect();
    out.push_str(&random_alphanumeric(ACCOUNT_NAME_SUFFIX));
    out
}

pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_roundtrip() {
        assert_eq!(Namespace::from_type(1), Some(Namespace::PhotoGrid));
        assert_eq!(Namespace::from_type(3), Some(Namespace::Game2048));
        assert_eq!(Namespace::from_type(4), None);
        assert_eq!(Namespace::from_tag("CT"), Some(Namespace::Contentos));
        assert_eq!(Namespace::from_tag("XX"), None);
    }

    #[test]
    fn test_key_scheme() {
        let ns = Namespace::PhotoGrid;
        let uid = ns.identity_key("42");
        let post = ns.post_key("7");
        assert_eq!(uid, "IPG42");
        assert_eq!(post, "PPG7");
        assert_eq!(ns.comment_key("9"), "CPG9");
        assert_eq!(ns.like_marker(&uid, &post), "LPGIPG42PPG7");
        assert_eq!(ns.follow_marker(&uid, "IPG43"), "FPGIPG42IPG43");
        assert_eq!(ns.sign_in_marker(&uid, "20240101"), "IPG42DPG20240101");
        assert_eq!(Namespace::Game2048.game_marker("100", "5"), "GG21005");
        assert_eq!(reverse_key("alice"), "A:alice");
    }

    #[test]
    fn test_account_name_truncates_and_suffixes() {
        let name = Namespace::Contentos.account_name("al-ice_wonderland");
        assert_eq!(name.len(), 16);
        assert!(name.starts_with("CTalicew"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_account_name_short_stem() {
        let name = generate_account_name("bob");
        assert_eq!(name.len(), 11);
        assert!(name.starts_with("bob"));
    }

    #[test]
    fn test_account_name_all_invalid() {
        for _ in 0..20 {
            let name = generate_account_name("---");
            assert!((8..16).contains(&name.len()));
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
