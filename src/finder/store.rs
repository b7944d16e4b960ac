//! Deduplicating candidate store.

use std::collections::HashMap;

use tracing::debug;

use super::{Candidate, CandidateKey, ChatRecord};

/// Candidates discovered during a run, in discovery order.
#[derive(Debug, Default)]
pub struct CandidateStore {
    candidates: Vec<Candidate>,
    index: HashMap<CandidateKey, usize>,
}

impl CandidateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a search hit found under `keyword`.
    ///
    /// Hits that are not public supergroups are ignored. A hit whose
    /// identity is already stored is a no-op: the first keyword and title
    /// win. Returns true if a new candidate was added.
    pub fn insert(&mut self, record: &ChatRecord, keyword: &str) -> bool {
        let Some(candidate) = Candidate::from_record(record, keyword) else {
            return false;
        };

        let key = candidate.key();
        if self.index.contains_key(&key) {
            debug!("Already seen {key}, keeping first discovery");
            return false;
        }

        self.index.insert(key, self.candidates.len());
        self.candidates.push(candidate);
        true
    }

    /// Replaces a stored candidate with its sampled version.
    pub fn update(&mut self, candidate: Candidate) {
        if let Some(&i) = self.index.get(&candidate.key()) {
            self.candidates[i] = candidate;
        }
    }

    /// All candidates in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Candidate> {
        self.candidates.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
