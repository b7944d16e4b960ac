//! Telegram user-account client backing the group directory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::client::{ClientConfiguration, LoginToken, NoRetries, PasswordToken};
use grammers_client::{sender, Client, InvocationError, SenderPool, SignInError};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::finder::{
    ChatKind, ChatRecord, DirectoryError, GroupDirectory, MemberRecord, ResolvedGroup,
};

/// Errors that can occur while connecting or signing in.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Could not read input: {0}")]
    Prompt(String),
}

/// RPC errors that mean a handle does not lead to a usable group.
const RESOLUTION_ERRORS: &[&str] = &[
    "USERNAME_INVALID",
    "USERNAME_NOT_OCCUPIED",
    "CHANNEL_INVALID",
    "CHANNEL_PRIVATE",
];

/// Maps a grammers error onto the directory error kinds.
///
/// `handle` is set when the call was about a specific group, so that a
/// dead handle is reported as a resolution failure.
fn directory_error(err: &InvocationError, handle: Option<&str>) -> DirectoryError {
    if let InvocationError::Rpc(rpc) = err {
        if rpc.name.ends_with("_WAIT")
            && let Some(seconds) = rpc.value
        {
            return DirectoryError::Cooldown(seconds);
        }
        if let Some(handle) = handle
            && RESOLUTION_ERRORS.contains(&rpc.name.as_str())
        {
            return DirectoryError::Resolution {
                handle: handle.to_owned(),
                reason: rpc.name.clone(),
            };
        }
    }

    let err_str = err.to_string();
    if let Some(seconds) = extract_flood_wait_seconds(&err_str) {
        return DirectoryError::Cooldown(seconds);
    }
    DirectoryError::Remote(err_str)
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["flood_wait_", "flood wait "];
    let lowered = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lowered.find(pattern) {
            let num_str: String = lowered[idx + pattern.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Converts a chat from a search result into a [`ChatRecord`].
fn chat_record(chat: tl::enums::Chat) -> ChatRecord {
    match chat {
        tl::enums::Chat::Channel(channel) => {
            ChatRecord {
                id: channel.id,
                kind: channel_kind(channel.megagroup, channel.broadcast),
                title: Some(channel.title),
                username: public_handle(channel.username, channel.usernames),
                access_hash: channel.access_hash,
                participants_count: channel.participants_count,
            }
        }
        tl::enums::Chat::Chat(group) => ChatRecord {
            id: group.id,
            kind: ChatKind::BasicGroup,
            title: Some(group.title),
            username: None,
            access_hash: None,
            participants_count: Some(group.participants_count),
        },
        tl::enums::Chat::Forbidden(group) => ChatRecord {
            id: group.id,
            kind: ChatKind::Other,
            title: Some(group.title),
            username: None,
            access_hash: None,
            participants_count: None,
        },
        tl::enums::Chat::ChannelForbidden(channel) => ChatRecord {
            id: channel.id,
            kind: ChatKind::Other,
            title: Some(channel.title),
            username: None,
            access_hash: Some(channel.access_hash),
            participants_count: None,
        },
        tl::enums::Chat::Empty(empty) => ChatRecord {
            id: empty.id,
            kind: ChatKind::Other,
            title: None,
            username: None,
            access_hash: None,
            participants_count: None,
        },
    }
}

/// Broadcast-capable discussion groups are flagged `megagroup`; plain
/// channels are flagged `broadcast`.
const fn channel_kind(megagroup: bool, broadcast: bool) -> ChatKind {
    if megagroup {
        ChatKind::Megagroup
    } else if broadcast {
        ChatKind::Broadcast
    } else {
        ChatKind::Other
    }
}

/// The primary handle, or the first active collectible one.
fn public_handle(
    username: Option<String>,
    usernames: Option<Vec<tl::enums::Username>>,
) -> Option<String> {
    username.or_else(|| {
        usernames?.into_iter().find_map(|name| match name {
            tl::enums::Username::Username(u) if u.active => Some(u.username),
            tl::enums::Username::Username(_) => None,
        })
    })
}

/// Builds member records from a participant page.
fn member_records(
    participants: Vec<tl::enums::ChannelParticipant>,
    users: Vec<tl::enums::User>,
) -> Vec<MemberRecord> {
    let bot_flags: HashMap<i64, Option<bool>> = users
        .into_iter()
        .map(|user| match user {
            tl::enums::User::User(u) => (u.id, Some(u.bot)),
            tl::enums::User::Empty(u) => (u.id, None),
        })
        .collect();

    flag_members(participants.into_iter().map(participant_peer), &bot_flags)
}

/// `Ok(user id)` for user participants, `Err(id)` for banned or departed
/// chats and channels.
fn participant_peer(participant: tl::enums::ChannelParticipant) -> Result<i64, i64> {
    use tl::enums::ChannelParticipant as P;

    match participant {
        P::Participant(p) => Ok(p.user_id),
        P::ParticipantSelf(p) => Ok(p.user_id),
        P::Creator(p) => Ok(p.user_id),
        P::Admin(p) => Ok(p.user_id),
        P::Banned(p) => peer_user_id(p.peer),
        P::Left(p) => peer_user_id(p.peer),
    }
}

/// Pairs participants with the bot flag of their user. Participants that
/// are not users carry no bot flag.
fn flag_members(
    peers: impl IntoIterator<Item = Result<i64, i64>>,
    bot_flags: &HashMap<i64, Option<bool>>,
) -> Vec<MemberRecord> {
    peers
        .into_iter()
        .map(|peer| match peer {
            Ok(user_id) => MemberRecord {
                id: user_id,
                is_bot: bot_flags.get(&user_id).copied().flatten(),
            },
            Err(other_id) => MemberRecord {
                id: other_id,
                is_bot: None,
            },
        })
        .collect()
}

/// `Ok(user id)` for user peers, `Err(id)` for chats and channels.
fn peer_user_id(peer: tl::enums::Peer) -> Result<i64, i64> {
    match peer {
        tl::enums::Peer::User(u) => Ok(u.user_id),
        tl::enums::Peer::Chat(c) => Err(c.chat_id),
        tl::enums::Peer::Channel(c) => Err(c.channel_id),
    }
}

/// High-level wrapper over the grammers client.
pub struct TelegramClient {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramClient {
    /// Connects to Telegram with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or the connection
    /// fails.
    pub async fn connect(config: &TelegramConfig) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        // Flood waits must surface as errors so RequestGate alone decides
        // whether to sleep.
        let client = Client::with_configuration(
            handle.clone(),
            ClientConfiguration {
                retry_policy: Box::new(NoRetries),
                ..Default::default()
            },
        );

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            handle: handle.thin,
            _pool_task: pool_task,
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(
        &self,
        phone: &str,
        api_hash: &str,
    ) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError::PasswordRequired`] if 2FA is enabled.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => Ok(()),
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(
        &self,
        password_token: PasswordToken,
        password: &str,
    ) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => Ok(()),
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl GroupDirectory for TelegramClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<ChatRecord>, DirectoryError> {
        let request = tl::functions::contacts::Search {
            broadcasts: false,
            bots: false,
            q: query.to_owned(),
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
        };

        let tl::enums::contacts::Found::Found(found) = self
            .client
            .invoke(&request)
            .await
            .map_err(|e| directory_error(&e, None))?;

        debug!("contacts.search \"{query}\": {} chats", found.chats.len());
        Ok(found.chats.into_iter().map(chat_record).collect())
    }

    async fn resolve_handle(&self, handle: &str) -> Result<ResolvedGroup, DirectoryError> {
        let request = tl::functions::contacts::ResolveUsername {
            username: handle.to_owned(),
            referer: None,
        };

        let tl::enums::contacts::ResolvedPeer::Peer(resolved) = self
            .client
            .invoke(&request)
            .await
            .map_err(|e| directory_error(&e, Some(handle)))?;

        let unresolvable = |reason: &str| DirectoryError::Resolution {
            handle: handle.to_owned(),
            reason: reason.to_owned(),
        };

        let tl::enums::Peer::Channel(peer) = resolved.peer else {
            return Err(unresolvable("handle does not belong to a group"));
        };

        resolved
            .chats
            .into_iter()
            .find_map(|chat| match chat {
                tl::enums::Chat::Channel(c) if c.id == peer.channel_id => {
                    c.access_hash.map(|access_hash| ResolvedGroup {
                        id: c.id,
                        access_hash,
                    })
                }
                _ => None,
            })
            .ok_or_else(|| unresolvable("group is not accessible"))
    }

    async fn list_members(
        &self,
        group: ResolvedGroup,
        limit: u32,
    ) -> Result<Vec<MemberRecord>, DirectoryError> {
        let request = tl::functions::channels::GetParticipants {
            channel: tl::enums::InputChannel::Channel(tl::types::InputChannel {
                channel_id: group.id,
                access_hash: group.access_hash,
            }),
            filter: tl::enums::ChannelParticipantsFilter::ChannelParticipantsRecent,
            offset: 0,
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
            hash: 0,
        };

        let response = self
            .client
            .invoke(&request)
            .await
            .map_err(|e| directory_error(&e, None))?;

        match response {
            tl::enums::channels::ChannelParticipants::Participants(page) => {
                Ok(member_records(page.participants, page.users))
            }
            tl::enums::channels::ChannelParticipants::NotModified => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}
