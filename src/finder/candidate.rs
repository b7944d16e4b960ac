//! Candidate groups and the provider records they are built from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bot presence verdict for a candidate.
///
/// Serialized as `null` / `false` / `true` under `has_bots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum BotStatus {
    /// Not sampled, or sampling failed.
    #[default]
    Unknown,
    /// No bot seen in the sampled members.
    Clean,
    /// At least one sampled member is a bot.
    Contaminated,
}

impl From<Option<bool>> for BotStatus {
    fn from(has_bots: Option<bool>) -> Self {
        match has_bots {
            None => Self::Unknown,
            Some(false) => Self::Clean,
            Some(true) => Self::Contaminated,
        }
    }
}

impl From<BotStatus> for Option<bool> {
    fn from(status: BotStatus) -> Self {
        match status {
            BotStatus::Unknown => None,
            BotStatus::Clean => Some(false),
            BotStatus::Contaminated => Some(true),
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Clean => write!(f, "clean"),
            Self::Contaminated => write!(f, "contaminated"),
        }
    }
}

/// What kind of chat a search hit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// Legacy small group without a public handle.
    BasicGroup,
    /// Broadcast channel, members cannot post.
    Broadcast,
    /// Supergroup where every member can talk.
    Megagroup,
    /// Anything else the provider returns (forbidden chats, empties).
    Other,
}

/// A chat as returned by a directory search. Fields the provider may omit
/// are explicit options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub id: i64,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
    pub access_hash: Option<i64>,
    pub participants_count: Option<i32>,
}

/// A member returned by a participant listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: i64,
    /// `Some` for user accounts, `None` for entities without the flag.
    pub is_bot: Option<bool>,
}

impl MemberRecord {
    /// Returns true if the member is known to be an automated account.
    #[must_use]
    pub fn is_automated(&self) -> bool {
        self.is_bot == Some(true)
    }
}

/// Identity of a candidate within one run: chat id plus handle.
///
/// Handles are case-insensitive on Telegram, so the key stores them
/// lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    pub id: i64,
    pub handle: String,
}

impl CandidateKey {
    #[must_use]
    pub fn new(id: i64, handle: &str) -> Self {
        Self {
            id,
            handle: handle.to_lowercase(),
        }
    }
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.handle)
    }
}

/// A discovered public group considered for the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub title: String,
    pub username: String,
    #[serde(default)]
    pub access_hash: Option<i64>,
    #[serde(default)]
    pub participants_count: Option<i32>,
    #[serde(rename = "has_bots", default)]
    pub bot_status: BotStatus,
    #[serde(rename = "checked_participants", default)]
    pub participants_sampled: u32,
    /// Keyword that first produced this candidate.
    pub keyword: String,
}

/// Title used when the provider omits one.
pub const NO_TITLE: &str = "NO TITLE";

impl Candidate {
    /// Builds a candidate from a search hit.
    ///
    /// Returns `None` for anything that is not a supergroup with a public
    /// handle.
    #[must_use]
    pub fn from_record(record: &ChatRecord, keyword: &str) -> Option<Self> {
        if record.kind != ChatKind::Megagroup {
            return None;
        }
        let username = record.username.as_deref().filter(|u| !u.is_empty())?;

        Some(Self {
            id: record.id,
            title: record.title.clone().unwrap_or_else(|| NO_TITLE.to_owned()),
            username: username.to_owned(),
            access_hash: record.access_hash,
            participants_count: record.participants_count,
            bot_status: BotStatus::Unknown,
            participants_sampled: 0,
            keyword: keyword.to_owned(),
        })
    }

    #[must_use]
    pub fn key(&self) -> CandidateKey {
        CandidateKey::new(self.id, &self.username)
    }

    /// True once a verdict has been recorded.
    #[must_use]
    pub fn is_classified(&self) -> bool {
        self.bot_status != BotStatus::Unknown
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.bot_status == BotStatus::Clean
    }

    /// Records the outcome of sampling `sampled` members.
    ///
    /// An empty sample carries no information and leaves the status
    /// `Unknown`. Once classified the candidate is never reclassified.
    pub fn record_sample(&mut self, sampled: usize, found_bot: bool) {
        if self.is_classified() || sampled == 0 {
            return;
        }
        self.participants_sampled = u32::try_from(sampled).unwrap_or(u32::MAX);
        self.bot_status = if found_bot {
            BotStatus::Contaminated
        } else {
            BotStatus::Clean
        };
    }
}
