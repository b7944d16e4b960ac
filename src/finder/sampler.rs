//! Member sampling and bot classification.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Candidate, DirectoryError, GroupDirectory, MemberRecord, RequestGate};

/// Fetches a bounded member sample for a candidate and classifies it.
#[derive(Debug, Clone)]
pub struct ParticipantSampler {
    gate: RequestGate,
    max_members: u32,
}

impl ParticipantSampler {
    #[must_use]
    pub const fn new(gate: RequestGate, max_members: u32) -> Self {
        Self { gate, max_members }
    }

    /// Samples `candidate` and returns the updated copy.
    ///
    /// Already classified candidates are returned unchanged without any
    /// remote call. `participants_sampled` counts every member returned,
    /// while the bot scan stops at the first automated account.
    pub async fn sample(
        &self,
        directory: &dyn GroupDirectory,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> Result<Candidate, DirectoryError> {
        if candidate.is_classified() {
            debug!("@{} already classified as {}", candidate.username, candidate.bot_status);
            return Ok(candidate.clone());
        }

        let handle = candidate.username.as_str();
        let group = self
            .gate
            .execute("resolve", cancel, || directory.resolve_handle(handle))
            .await?;

        let members = self
            .gate
            .execute("participants", cancel, || directory.list_members(group, self.max_members))
            .await?;

        let mut updated = candidate.clone();
        updated.record_sample(members.len(), contains_bot(&members));

        info!(
            "@{}: {} of up to {} members checked, {}",
            updated.username,
            members.len(),
            self.max_members,
            updated.bot_status
        );

        Ok(updated)
    }
}

/// Scans members until the first automated account.
fn contains_bot(members: &[MemberRecord]) -> bool {
    members.iter().any(MemberRecord::is_automated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::testing::{FakeDirectory, members, megagroup};
    use crate::finder::{BotStatus, CandidateStore};

    fn candidate(directory_record: &crate::finder::ChatRecord) -> Candidate {
        let mut store = CandidateStore::new();
        store.insert(directory_record, "kw");
        store.snapshot().remove(0)
    }

    fn sampler() -> ParticipantSampler {
        ParticipantSampler::new(RequestGate::abort_on_cooldown(), 80)
    }

    #[tokio::test]
    async fn test_clean_group() {
        let record = megagroup(1, "clean");
        let directory = FakeDirectory::new().with_members("clean", members(5, None));

        let result = sampler().sample(&directory, &candidate(&record), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.bot_status, BotStatus::Clean);
        assert_eq!(result.participants_sampled, 5);
    }

    #[tokio::test]
    async fn test_bot_in_third_position_contaminates() {
        let record = megagroup(1, "botty");
        let directory = FakeDirectory::new().with_members("botty", members(10, Some(2)));

        let result = sampler().sample(&directory, &candidate(&record), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.bot_status, BotStatus::Contaminated);
        assert_eq!(result.participants_sampled, 10);
    }

    #[test]
    fn test_scan_ignores_members_without_flag() {
        let list = [
            MemberRecord { id: 1, is_bot: None },
            MemberRecord { id: 2, is_bot: Some(false) },
        ];
        assert!(!contains_bot(&list));
    }

    #[tokio::test]
    async fn test_member_limit_is_forwarded() {
        let record = megagroup(1, "big");
        let directory = FakeDirectory::new().with_members("big", members(200, None));

        let result = ParticipantSampler::new(RequestGate::abort_on_cooldown(), 30)
            .sample(&directory, &candidate(&record), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.participants_sampled, 30);
    }

    #[tokio::test]
    async fn test_empty_member_list_stays_unknown() {
        let record = megagroup(1, "empty");
        let directory = FakeDirectory::new().with_members("empty", Vec::new());

        let result = sampler().sample(&directory, &candidate(&record), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.bot_status, BotStatus::Unknown);
        assert_eq!(result.participants_sampled, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_handle_is_an_error() {
        let record = megagroup(1, "gone");
        let directory = FakeDirectory::new();

        let err = sampler().sample(&directory, &candidate(&record), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_classified_candidate_is_not_resampled() {
        let record = megagroup(1, "done");
        let directory = FakeDirectory::new().with_members("done", members(3, Some(0)));
        let mut already = candidate(&record);
        already.record_sample(4, false);

        let result = sampler().sample(&directory, &already, &CancellationToken::new()).await.unwrap();
        assert_eq!(result, already);
        assert_eq!(directory.member_calls(), 0);
    }
}
