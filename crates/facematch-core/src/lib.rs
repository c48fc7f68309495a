//! facematch-core — pairwise face comparison model and decision logic.
//!
//! Holds the image-pair session, the match policy and the result
//! aggregator. Face analysis and persistence are collaborators reached
//! through the traits in [`provider`] and [`store`].

pub mod aggregator;
pub mod outcome;
pub mod pair;
pub mod policy;
pub mod provider;
pub mod report;
pub mod session;
pub mod store;
pub mod types;

pub use aggregator::Aggregator;
pub use outcome::{ComparisonOutcome, ScoredResult};
pub use pair::{ImageHandle, ImagePair, SessionError, Slot, SlotPosition};
pub use policy::{MatchPolicy, DEFAULT_MATCH_THRESHOLD};
pub use provider::{AnalyzerError, FaceAnalyzer, FaceJudge, JudgeError, Provider};
pub use report::Report;
pub use session::Session;
pub use store::{CaseFilter, CaseRecord, ComparisonStore, SaveAck, StoreError, StoredComparison};
pub use types::{Descriptor, FaceAnalysis, ImageInput, Judgment};
