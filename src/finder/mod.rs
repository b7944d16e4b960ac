//! Group discovery and bot screening.
//!
//! Keywords are searched through a [`GroupDirectory`], discoveries are
//! deduplicated in a [`CandidateStore`], each candidate's members are
//! sampled by the [`ParticipantSampler`] and the [`ScreeningPipeline`]
//! ties it all together. Every remote call goes through a [`RequestGate`].

mod candidate;
mod directory;
mod gate;
mod pipeline;
mod sampler;
mod store;

pub use candidate::{BotStatus, Candidate, CandidateKey, ChatKind, ChatRecord, MemberRecord};
pub use directory::{DirectoryError, GroupDirectory, ResolvedGroup};
pub use gate::RequestGate;
pub use pipeline::{CooldownNotice, PipelineError, RunPhase, ScreeningPipeline, ScreeningReport};
pub use sampler::ParticipantSampler;
pub use store::CandidateStore;

#[cfg(test)]
pub(crate) mod testing;
