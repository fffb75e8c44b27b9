//! Entity store: the persistence contract the election core relies on
//!
//! The core never talks to a database directly. It needs, per entity type, a
//! [`Repository`] offering save / find-by-id / find-by-predicate plus two
//! atomic primitives:
//!
//! - [`Repository::update`]: read-modify-write of one row, used for lifecycle
//!   transitions and attendance changes
//! - [`Repository::insert_checked`]: compare-and-insert, used wherever a
//!   uniqueness or ceiling rule must hold under concurrent inserts
//!
//! [`MemoryRepository`] is the bundled implementation. [`EntityStore`] groups
//! one repository per entity type.

mod memory;
#[cfg(test)]
pub(crate) mod intercept;

pub use memory::MemoryRepository;

use crate::types::{
    Candidate, CandidateAssignment, CandidateId, CandidateVote, Election, Issue, IssueVote,
    Position, PositionId, Voter,
};
use crate::{Error, Result};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A record with a stable identity
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Human-readable entity name used in error messages
    const KIND: &'static str;

    fn id(&self) -> Self::Id;
}

macro_rules! impl_entity {
    ($ty:ty, $id:ty, $kind:literal) => {
        impl Entity for $ty {
            type Id = $id;
            const KIND: &'static str = $kind;

            fn id(&self) -> Self::Id {
                self.id
            }
        }
    };
}

impl_entity!(Election, crate::types::ElectionId, "Election");
impl_entity!(Position, crate::types::PositionId, "Position");
impl_entity!(Candidate, crate::types::CandidateId, "Candidate");
impl_entity!(CandidateAssignment, crate::types::AssignmentId, "CandidateAssignment");
impl_entity!(Issue, crate::types::IssueId, "Issue");
impl_entity!(Voter, crate::types::VoterId, "Voter");
impl_entity!(CandidateVote, crate::types::CandidateVoteId, "CandidateVote");
impl_entity!(IssueVote, crate::types::IssueVoteId, "IssueVote");

/// Storage contract for one entity type
///
/// Rows are returned in insertion order. Implementations must make
/// [`update`](Repository::update) and
/// [`insert_checked`](Repository::insert_checked) atomic with respect to every
/// other write on the same repository.
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert a new row or replace the row with the same id
    fn save(&self, entity: T) -> Result<T>;

    fn find_by_id(&self, id: &T::Id) -> Result<Option<T>>;

    /// Every row matching `predicate`, read from one consistent snapshot
    fn find_all(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>>;

    fn count(&self, predicate: &dyn Fn(&T) -> bool) -> Result<usize> {
        Ok(self.find_all(predicate)?.len())
    }

    /// Atomically mutate one row. If `mutate` fails the stored row is untouched.
    fn update(&self, id: &T::Id, mutate: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<T>;

    /// Atomically insert `entity` after `check` accepts the rows selected by
    /// `scope`. No other write can interleave between the check and the insert.
    fn insert_checked(
        &self,
        entity: T,
        scope: &dyn Fn(&T) -> bool,
        check: &dyn Fn(&[&T]) -> Result<()>,
    ) -> Result<T>;
}

/// Fetch a row by id or fail with `NotFound`
pub fn fetch<T: Entity>(repo: &dyn Repository<T>, id: &T::Id) -> Result<T> {
    repo.find_by_id(id)?
        .ok_or_else(|| Error::not_found(T::KIND, id))
}

/// One repository per entity type
pub struct EntityStore {
    pub elections: Arc<dyn Repository<Election>>,
    pub positions: Arc<dyn Repository<Position>>,
    pub candidates: Arc<dyn Repository<Candidate>>,
    pub assignments: Arc<dyn Repository<CandidateAssignment>>,
    pub issues: Arc<dyn Repository<Issue>>,
    pub voters: Arc<dyn Repository<Voter>>,
    pub candidate_votes: Arc<dyn Repository<CandidateVote>>,
    pub issue_votes: Arc<dyn Repository<IssueVote>>,
}

impl EntityStore {
    /// A store backed entirely by [`MemoryRepository`]
    pub fn in_memory() -> Self {
        Self {
            elections: Arc::new(MemoryRepository::new()),
            positions: Arc::new(MemoryRepository::new()),
            candidates: Arc::new(MemoryRepository::new()),
            assignments: Arc::new(MemoryRepository::new()),
            issues: Arc::new(MemoryRepository::new()),
            voters: Arc::new(MemoryRepository::new()),
            candidate_votes: Arc::new(MemoryRepository::new()),
            issue_votes: Arc::new(MemoryRepository::new()),
        }
    }

    /// Resolve a voter by shareholder business key
    pub fn voter_by_shareholder_id(&self, shareholder_id: &str) -> Result<Voter> {
        self.voters
            .find_all(&|v: &Voter| v.shareholder_id == shareholder_id)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::VoterNotFound {
                shareholder_id: shareholder_id.to_string(),
            })
    }

    pub fn assignment_for(
        &self,
        candidate_id: CandidateId,
        position_id: PositionId,
    ) -> Result<Option<CandidateAssignment>> {
        Ok(self
            .assignments
            .find_all(&|a: &CandidateAssignment| {
                a.candidate_id == candidate_id && a.position_id == position_id
            })?
            .into_iter()
            .next())
    }

    /// Assignments of a position in assignment order
    pub fn assignments_for_position(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<CandidateAssignment>> {
        self.assignments
            .find_all(&|a: &CandidateAssignment| a.position_id == position_id)
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::types::{ElectionId, VoterId};
    use rust_decimal::Decimal;

    #[test]
    fn test_fetch_reports_kind_and_id() {
        let store = EntityStore::in_memory();
        let missing = PositionId::new();
        let err = fetch(&*store.positions, &missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("Position"));
        assert!(err.to_string().contains(&missing.to_string()));
    }

    #[test]
    fn test_voter_lookup_by_shareholder_id() {
        let store = EntityStore::in_memory();
        let voter = Voter::new("SH-100", "Meron Alemu", Decimal::new(2500, 0), true).unwrap();
        store.voters.save(voter.clone()).unwrap();

        assert_eq!(store.voter_by_shareholder_id("SH-100").unwrap().id, voter.id);
        let err = store.voter_by_shareholder_id("SH-404").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VoterNotFound);
        assert_ne!(voter.id, VoterId::new());
    }

    #[test]
    fn test_assignments_keep_insertion_order() {
        let store = EntityStore::in_memory();
        let position = Position::new(ElectionId::new(), "Board", "", Some(3), 1).unwrap();
        let first = CandidateAssignment::new(CandidateId::new(), &position);
        let second = CandidateAssignment::new(CandidateId::new(), &position);
        store.assignments.save(first.clone()).unwrap();
        store.assignments.save(second.clone()).unwrap();

        let found = store.assignments_for_position(position.id).unwrap();
        assert_eq!(found, vec![first.clone(), second]);
        assert_eq!(
            store.assignment_for(first.candidate_id, position.id).unwrap(),
            Some(first)
        );
    }
}
