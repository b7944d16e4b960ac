//! Scripted in-memory directory for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ChatKind, ChatRecord, DirectoryError, GroupDirectory, MemberRecord, ResolvedGroup};

pub fn megagroup(id: i64, username: &str) -> ChatRecord {
    ChatRecord {
        id,
        kind: ChatKind::Megagroup,
        title: Some(format!("Group {username}")),
        username: Some(username.to_owned()),
        access_hash: Some(id * 31),
        participants_count: Some(500),
    }
}

/// `count` regular members, with a bot at `bot_at` if given.
pub fn members(count: usize, bot_at: Option<usize>) -> Vec<MemberRecord> {
    (0..count)
        .map(|i| MemberRecord {
            id: i64::try_from(i).unwrap_or_default() + 1000,
            is_bot: Some(bot_at == Some(i)),
        })
        .collect()
}

#[derive(Default)]
pub struct FakeDirectory {
    searches: HashMap<String, Result<Vec<ChatRecord>, DirectoryError>>,
    handles: Vec<String>,
    members: HashMap<String, Result<Vec<MemberRecord>, DirectoryError>>,
    cancel_on_members: Option<(String, CancellationToken)>,
    calls: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, keyword: &str, result: Result<Vec<ChatRecord>, DirectoryError>) -> Self {
        self.searches.insert(keyword.to_owned(), result);
        self
    }

    pub fn with_members(self, handle: &str, list: Vec<MemberRecord>) -> Self {
        self.with_member_result(handle, Ok(list))
    }

    pub fn with_member_result(
        mut self,
        handle: &str,
        result: Result<Vec<MemberRecord>, DirectoryError>,
    ) -> Self {
        self.handles.push(handle.to_lowercase());
        self.members.insert(handle.to_lowercase(), result);
        self
    }

    /// Cancels `token` as soon as members of `handle` are requested.
    pub fn cancel_when_listing(mut self, handle: &str, token: CancellationToken) -> Self {
        self.cancel_on_members = Some((handle.to_lowercase(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn member_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("members:")).count()
    }

    fn log(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl GroupDirectory for FakeDirectory {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<ChatRecord>, DirectoryError> {
        self.log(format!("search:{query}"));
        let mut found = self.searches.get(query).cloned().unwrap_or_else(|| Ok(Vec::new()))?;
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn resolve_handle(&self, handle: &str) -> Result<ResolvedGroup, DirectoryError> {
        self.log(format!("resolve:{handle}"));
        let position = self
            .handles
            .iter()
            .position(|h| *h == handle.to_lowercase())
            .ok_or_else(|| DirectoryError::Resolution {
                handle: handle.to_owned(),
                reason: "USERNAME_NOT_OCCUPIED".to_owned(),
            })?;
        Ok(ResolvedGroup {
            id: i64::try_from(position).unwrap_or_default(),
            access_hash: 0,
        })
    }

    async fn list_members(
        &self,
        group: ResolvedGroup,
        limit: u32,
    ) -> Result<Vec<MemberRecord>, DirectoryError> {
        let handle = usize::try_from(group.id)
            .ok()
            .and_then(|i| self.handles.get(i))
            .cloned()
            .unwrap_or_default();
        self.log(format!("members:{handle}"));

        if let Some((target, token)) = &self.cancel_on_members
            && *target == handle
        {
            token.cancel();
        }

        let mut list = self.members.get(&handle).cloned().unwrap_or_else(|| Ok(Vec::new()))?;
        list.truncate(limit as usize);
        Ok(list)
    }
}
