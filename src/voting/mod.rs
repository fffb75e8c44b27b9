//! Election behaviour: lifecycle, vote admission, tallies and reports
//!
//! Each component is a plain struct over a shared [`EntityStore`](crate::store::EntityStore);
//! [`AssemblyService`](crate::service::AssemblyService) wires them together.

pub mod admission;
pub mod history;
pub mod lifecycle;
pub mod lock;
pub mod tally;

pub use admission::VoteAdmissionEngine;
pub use history::{CastVote, Page, Pagination, VoterHistory, VoterHistoryReporter};
pub use lifecycle::{Lifecycle, LifecycleController, NewPosition};
pub use lock::{AdmissionGuard, AdmissionKey, AdmissionLocks, GateGuard, GateKey, StatusGates};
pub use tally::{
    CandidateRanking, CandidateRoster, CandidateStanding, CandidateTotal, IssueSummary,
    IssueTally, PositionTally, TallyEngine, VoterWeight,
};
