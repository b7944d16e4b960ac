//! Screening pipeline.
//!
//! A run moves through these phases:
//! 1. `SearchingKeyword`: one gated search per keyword, in order.
//!    - cooldown → skip all remaining keywords, keep what was found and
//!      go on to sampling
//!    - other error → skip only that keyword
//! 2. `DiscoveringCandidates`: hits go into the [`CandidateStore`],
//!    duplicates collapse onto the first sighting.
//! 3. `SamplingCandidate`: candidates are sampled in discovery order with a
//!    fixed pause after each successful sample.
//!    - cooldown → stop sampling, the rest stay `Unknown`
//!    - other error → that candidate stays `Unknown`
//! 4. `Finalizing`: the result document is built and written once.
//!
//! Cancellation is checked between remote calls. A cancelled run writes
//! nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Candidate, CandidateStore, DirectoryError, GroupDirectory, ParticipantSampler, RequestGate,
};
use crate::config::SearchSettings;
use crate::results::{new_run_id, ResultDocument, ResultSink, SinkError};

/// Errors that end a run without a result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run cancelled before completion")]
    Cancelled,

    #[error(transparent)]
    Persist(#[from] SinkError),
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    SearchingKeyword,
    DiscoveringCandidates,
    SamplingCandidate,
    Finalizing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::SearchingKeyword => "search",
            Self::DiscoveringCandidates => "discovery",
            Self::SamplingCandidate => "sampling",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A flood wait that cut a phase short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownNotice {
    pub phase: RunPhase,
    pub seconds: u32,
    /// Keywords or candidates left unprocessed.
    pub skipped: usize,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ScreeningReport {
    /// The document that was persisted.
    pub document: ResultDocument,
    /// Keywords whose search failed with a non-cooldown error.
    pub failed_keywords: Vec<String>,
    /// Flood waits that stopped a phase early, at most one per phase.
    pub cooldowns: Vec<CooldownNotice>,
}

impl ScreeningReport {
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.document.found_candidates
    }

    #[must_use]
    pub fn good_groups(&self) -> &[Candidate] {
        &self.document.good_groups
    }
}

/// Runs keyword search, dedup, sampling and persistence, strictly one
/// remote call at a time.
pub struct ScreeningPipeline {
    directory: Arc<dyn GroupDirectory>,
    sink: Arc<ResultSink>,
    gate: RequestGate,
    sampler: ParticipantSampler,
    search_limit: u32,
    sample_delay: Duration,

    /// Serializes runs so the session is never shared between two of them.
    run_lock: Mutex<()>,
}

impl ScreeningPipeline {
    #[must_use]
    pub fn new(
        directory: Arc<dyn GroupDirectory>,
        sink: Arc<ResultSink>,
        settings: &SearchSettings,
    ) -> Self {
        let gate = RequestGate::new(
            settings.cooldown_policy,
            Duration::from_secs(u64::from(settings.max_cooldown_wait_secs)),
        );
        Self {
            directory,
            sink,
            sampler: ParticipantSampler::new(gate.clone(), settings.max_members),
            gate,
            search_limit: settings.search_limit,
            sample_delay: settings.sample_delay,
            run_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.sink
    }

    /// Runs the whole pipeline over `keywords`.
    pub async fn run(
        &self,
        keywords: &[String],
        cancel: &CancellationToken,
    ) -> Result<ScreeningReport, PipelineError> {
        let _guard = self.run_lock.lock().await;
        debug!("Phase: {}", RunPhase::Idle);

        let mut store = CandidateStore::new();
        let mut failed_keywords = Vec::new();

        let search_cooldown = self
            .search_all(keywords, cancel, &mut store, &mut failed_keywords)
            .await?;
        info!("Found {} candidates", store.len());

        let sample_cooldown = self.sample_all(cancel, &mut store).await?;
        let cooldowns = search_cooldown.into_iter().chain(sample_cooldown).collect();

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        debug!("Phase: {}", RunPhase::Finalizing);
        let document = ResultDocument::new(new_run_id(), keywords.to_vec(), store.snapshot());
        self.sink.persist(&document).await?;
        debug!("Phase: {}", RunPhase::Done);

        Ok(ScreeningReport {
            document,
            failed_keywords,
            cooldowns,
        })
    }

    async fn search_all(
        &self,
        keywords: &[String],
        cancel: &CancellationToken,
        store: &mut CandidateStore,
        failed_keywords: &mut Vec<String>,
    ) -> Result<Option<CooldownNotice>, PipelineError> {
        for (position, keyword) in keywords.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            debug!("Phase: {} \"{keyword}\"", RunPhase::SearchingKeyword);
            info!("Searching for \"{keyword}\"...");

            let records = match self
                .gate
                .execute("search", cancel, || self.directory.search(keyword, self.search_limit))
                .await
            {
                Ok(records) => records,
                Err(DirectoryError::Cooldown(seconds)) => {
                    let skipped = keywords.len() - position;
                    warn!("Flood wait of {seconds} seconds while searching, skipping {skipped} remaining keyword(s)");
                    return Ok(Some(CooldownNotice {
                        phase: RunPhase::SearchingKeyword,
                        seconds,
                        skipped,
                    }));
                }
                Err(e) => {
                    warn!("Search for \"{keyword}\" failed: {e}");
                    failed_keywords.push(keyword.clone());
                    continue;
                }
            };

            debug!("Phase: {}", RunPhase::DiscoveringCandidates);
            let mut added = 0;
            for record in &records {
                if store.insert(record, keyword) {
                    added += 1;
                }
            }
            debug!("\"{keyword}\": {} hits, {added} new candidates", records.len());
        }

        Ok(None)
    }

    async fn sample_all(
        &self,
        cancel: &CancellationToken,
        store: &mut CandidateStore,
    ) -> Result<Option<CooldownNotice>, PipelineError> {
        let queue = store.snapshot();
        let total = queue.len();

        for (position, candidate) in queue.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            debug!("Phase: {} @{}", RunPhase::SamplingCandidate, candidate.username);
            info!("Checking {} (@{})", candidate.title, candidate.username);

            match self.sampler.sample(self.directory.as_ref(), &candidate, cancel).await {
                Ok(updated) => {
                    store.update(updated);
                    if position + 1 < total {
                        self.pause(cancel).await?;
                    }
                }
                Err(DirectoryError::Cooldown(seconds)) => {
                    let skipped = total - position;
                    warn!("Flood wait of {seconds} seconds at @{}, leaving {skipped} candidate(s) unchecked", candidate.username);
                    return Ok(Some(CooldownNotice {
                        phase: RunPhase::SamplingCandidate,
                        seconds,
                        skipped,
                    }));
                }
                Err(e) => {
                    warn!("Could not check @{}: {e}", candidate.username);
                }
            }
        }

        Ok(None)
    }

    /// Waits out the inter-candidate delay unless cancelled first.
    async fn pause(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        if self.sample_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = cancel.cancelled() => Err(PipelineError::Cancelled),
            () = tokio::time::sleep(self.sample_delay) => Ok(()),
        }
    }
}

impl std::fmt::Debug for ScreeningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreeningPipeline")
            .field("gate", &self.gate)
            .field("search_limit", &self.search_limit)
            .field("sample_delay", &self.sample_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CooldownPolicy;
    use crate::finder::testing::{FakeDirectory, megagroup, members};
    use crate::finder::BotStatus;

    struct Harness {
        pipeline: ScreeningPipeline,
        directory: Arc<FakeDirectory>,
        _dir: tempfile::TempDir,
    }

    fn harness(directory: FakeDirectory) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let directory = Arc::new(directory);
        let sink = Arc::new(ResultSink::new(dir.path().join("results.json")));
        let settings = SearchSettings {
            sample_delay: Duration::ZERO,
            ..SearchSettings::default()
        };
        let pipeline = ScreeningPipeline::new(
            Arc::clone(&directory) as Arc<dyn GroupDirectory>,
            sink,
            &settings,
        );
        Harness {
            pipeline,
            directory,
            _dir: dir,
        }
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| (*k).to_owned()).collect()
    }

    fn status_of(report: &ScreeningReport, username: &str) -> BotStatus {
        report
            .candidates()
            .iter()
            .find(|c| c.username == username)
            .map(|c| c.bot_status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_single_keyword() {
        let mut first = megagroup(1, "alpha_chat");
        first.title = Some("Alpha Chat".to_owned());
        let mut second = megagroup(1, "alpha_chat");
        second.title = Some("ALPHA CHAT".to_owned());

        let h = harness(
            FakeDirectory::new()
                .with_search("alpha", Ok(vec![first, second]))
                .with_members("alpha_chat", members(5, None)),
        );

        let report = h.pipeline.run(&keywords(&["alpha"]), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.candidates().len(), 1);
        let candidate = &report.candidates()[0];
        assert_eq!(candidate.title, "Alpha Chat");
        assert_eq!(candidate.bot_status, BotStatus::Clean);
        assert_eq!(candidate.participants_sampled, 5);
        assert_eq!(report.good_groups(), std::slice::from_ref(candidate));
        assert!(report.cooldowns.is_empty());

        let saved = ResultDocument::load(h.pipeline.sink().path()).unwrap();
        assert_eq!(saved, report.document);
        assert_eq!(h.pipeline.sink().latest().await, report.good_groups());
    }

    #[tokio::test]
    async fn test_duplicates_across_keywords_keep_first_keyword() {
        let h = harness(
            FakeDirectory::new()
                .with_search("a", Ok(vec![megagroup(1, "shared")]))
                .with_search("b", Ok(vec![megagroup(1, "shared"), megagroup(2, "other")]))
                .with_members("shared", members(3, None))
                .with_members("other", members(3, None)),
        );

        let report = h.pipeline.run(&keywords(&["a", "b"]), &CancellationToken::new()).await.unwrap();

        let found: Vec<(&str, &str)> = report
            .candidates()
            .iter()
            .map(|c| (c.username.as_str(), c.keyword.as_str()))
            .collect();
        assert_eq!(found, vec![("shared", "a"), ("other", "b")]);
    }

    #[tokio::test]
    async fn test_search_cooldown_skips_remaining_keywords() {
        let h = harness(
            FakeDirectory::new()
                .with_search("A", Ok(vec![megagroup(1, "from_a")]))
                .with_search("B", Err(DirectoryError::Cooldown(120)))
                .with_search("C", Ok(vec![megagroup(3, "from_c")]))
                .with_members("from_a", members(4, None))
                .with_members("from_c", members(4, None)),
        );

        let report = h.pipeline.run(&keywords(&["A", "B", "C"]), &CancellationToken::new()).await.unwrap();

        let names: Vec<&str> = report.candidates().iter().map(|c| c.username.as_str()).collect();
        assert_eq!(names, vec!["from_a"]);
        assert_eq!(
            report.cooldowns,
            vec![CooldownNotice {
                phase: RunPhase::SearchingKeyword,
                seconds: 120,
                skipped: 2,
            }]
        );
        assert!(!h.directory.calls().contains(&"search:C".to_owned()));
        assert_eq!(status_of(&report, "from_a"), BotStatus::Clean);
        assert_eq!(report.good_groups().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_keyword_does_not_stop_search() {
        let h = harness(
            FakeDirectory::new()
                .with_search("bad", Err(DirectoryError::Remote("QUERY_TOO_SHORT".to_owned())))
                .with_search("good", Ok(vec![megagroup(1, "found")]))
                .with_members("found", members(2, None)),
        );

        let report = h.pipeline.run(&keywords(&["bad", "good"]), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.failed_keywords, vec!["bad"]);
        assert_eq!(report.candidates().len(), 1);
        assert_eq!(report.good_groups().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_candidate_is_isolated() {
        let h = harness(
            FakeDirectory::new()
                .with_search("kw", Ok(vec![megagroup(1, "x"), megagroup(2, "y"), megagroup(3, "z")]))
                .with_members("x", members(6, None))
                .with_member_result("y", Err(DirectoryError::Remote("CHAT_ADMIN_REQUIRED".to_owned())))
                .with_members("z", members(6, Some(4))),
        );

        let report = h.pipeline.run(&keywords(&["kw"]), &CancellationToken::new()).await.unwrap();

        assert_eq!(status_of(&report, "x"), BotStatus::Clean);
        assert_eq!(status_of(&report, "y"), BotStatus::Unknown);
        assert_eq!(status_of(&report, "z"), BotStatus::Contaminated);
        assert_eq!(report.good_groups().len(), 1);
        assert!(report.cooldowns.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_candidate_is_isolated() {
        let h = harness(
            FakeDirectory::new()
                .with_search("kw", Ok(vec![megagroup(1, "gone"), megagroup(2, "alive")]))
                .with_members("alive", members(2, None)),
        );

        let report = h.pipeline.run(&keywords(&["kw"]), &CancellationToken::new()).await.unwrap();

        assert_eq!(status_of(&report, "gone"), BotStatus::Unknown);
        assert_eq!(status_of(&report, "alive"), BotStatus::Clean);
    }

    #[tokio::test]
    async fn test_sampling_cooldown_leaves_rest_unknown() {
        let h = harness(
            FakeDirectory::new()
                .with_search("kw", Ok(vec![megagroup(1, "x"), megagroup(2, "y"), megagroup(3, "z")]))
                .with_members("x", members(6, None))
                .with_member_result("y", Err(DirectoryError::Cooldown(45)))
                .with_members("z", members(6, None)),
        );

        let report = h.pipeline.run(&keywords(&["kw"]), &CancellationToken::new()).await.unwrap();

        assert_eq!(status_of(&report, "x"), BotStatus::Clean);
        assert_eq!(status_of(&report, "y"), BotStatus::Unknown);
        assert_eq!(status_of(&report, "z"), BotStatus::Unknown);
        assert_eq!(
            report.cooldowns,
            vec![CooldownNotice {
                phase: RunPhase::SamplingCandidate,
                seconds: 45,
                skipped: 2,
            }]
        );
        assert!(!h.directory.calls().contains(&"resolve:z".to_owned()));
        assert!(h.pipeline.sink().path().exists());
    }

    #[tokio::test]
    async fn test_unknown_candidates_never_reach_good_groups() {
        let h = harness(
            FakeDirectory::new()
                .with_search("kw", Ok(vec![megagroup(1, "empty"), megagroup(2, "full")]))
                .with_members("empty", Vec::new())
                .with_members("full", members(3, None)),
        );

        let report = h.pipeline.run(&keywords(&["kw"]), &CancellationToken::new()).await.unwrap();

        for candidate in report.candidates() {
            if candidate.participants_sampled == 0 {
                assert_eq!(candidate.bot_status, BotStatus::Unknown);
            }
        }
        assert!(report.good_groups().iter().all(|g| g.is_clean() && g.participants_sampled > 0));
        assert_eq!(report.good_groups().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let cancel = CancellationToken::new();
        let h = harness(
            FakeDirectory::new()
                .with_search("kw", Ok(vec![megagroup(1, "x"), megagroup(2, "y")]))
                .with_members("x", members(3, None))
                .with_members("y", members(3, None))
                .cancel_when_listing("x", cancel.clone()),
        );

        let err = h.pipeline.run(&keywords(&["kw"]), &cancel).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(!h.pipeline.sink().path().exists());
        assert!(h.pipeline.sink().latest().await.is_empty());
        assert!(!h.directory.calls().contains(&"resolve:y".to_owned()));
    }

    #[tokio::test]
    async fn test_cancel_during_last_candidate_writes_nothing() {
        let cancel = CancellationToken::new();
        let h = harness(
            FakeDirectory::new()
                .with_search("kw", Ok(vec![megagroup(1, "x"), megagroup(2, "y")]))
                .with_members("x", members(3, None))
                .with_members("y", members(3, None))
                .cancel_when_listing("y", cancel.clone()),
        );

        let err = h.pipeline.run(&keywords(&["kw"]), &cancel).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(!h.pipeline.sink().path().exists());
        assert!(h.pipeline.sink().latest().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_cooldown_wait_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory::new()
            .with_search("kw", Err(DirectoryError::Cooldown(50)));
        let settings = SearchSettings {
            cooldown_policy: CooldownPolicy::RetryOnce,
            max_cooldown_wait_secs: 60,
            ..SearchSettings::default()
        };
        let pipeline = ScreeningPipeline::new(
            Arc::new(directory),
            Arc::new(ResultSink::new(dir.path().join("results.json"))),
            &settings,
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = pipeline.run(&keywords(&["kw"]), &cancel).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert!(!pipeline.sink().path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_successful_samples() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory::new()
            .with_search("kw", Ok(vec![megagroup(1, "x"), megagroup(2, "y"), megagroup(3, "z")]))
            .with_members("x", members(1, None))
            .with_members("y", members(1, None))
            .with_members("z", members(1, None));
        let settings = SearchSettings {
            sample_delay: Duration::from_secs(1),
            cooldown_policy: CooldownPolicy::Abort,
            ..SearchSettings::default()
        };
        let pipeline = ScreeningPipeline::new(
            Arc::new(directory),
            Arc::new(ResultSink::new(dir.path().join("results.json"))),
            &settings,
        );

        let started = tokio::time::Instant::now();
        pipeline.run(&keywords(&["kw"]), &CancellationToken::new()).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
