//! Vote admission engine
//!
//! Validates and records single candidate or issue votes. Checks run in a
//! fixed order so that every rejection names the first rule violated:
//!
//! 1. voter exists (`VoterNotFound`)
//! 2. position / issue exists (`NotFound`)
//! 3. voter attended (`NotAttended`)
//! 4. target is OPEN (`NotOpen`)
//! 5. candidate assigned to the position (`NotAssigned`)
//! 6. no duplicate (`DuplicateVote`), then the per-position ceiling
//!    (`LimitReached`)
//!
//! The whole sequence holds the admission lock for (voter, target), and step 6
//! plus the insert are one compare-and-insert in the vote repository, so
//! concurrent requests cannot both slip under the ceiling. Steps 2 to 6 and the
//! insert also hold the target's status gate shared, so a close either lands
//! before the OPEN check or after the vote is stored.

use super::lock::{AdmissionKey, AdmissionLocks, GateKey, StatusGates};
use crate::audit::{AuditSink, record_best_effort};
use crate::store::{EntityStore, fetch};
use crate::types::{
    Caller, CandidateId, CandidateVote, CandidateVoteId, IssueId, IssueOption, IssueVote,
    IssueVoteId, PositionId, Status, Voter,
};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Records candidate and issue votes
pub struct VoteAdmissionEngine {
    store: Arc<EntityStore>,
    audit: Arc<dyn AuditSink>,
    locks: AdmissionLocks,
    gates: Arc<StatusGates>,
}

impl VoteAdmissionEngine {
    pub fn new(
        store: Arc<EntityStore>,
        audit: Arc<dyn AuditSink>,
        gates: Arc<StatusGates>,
    ) -> Self {
        Self {
            store,
            audit,
            locks: AdmissionLocks::new(),
            gates,
        }
    }

    /// Apply a voter's weight to one candidate within a position
    pub fn cast_candidate_vote(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        position_id: PositionId,
        candidate_id: CandidateId,
    ) -> Result<CandidateVote> {
        let result = self.admit_candidate_vote(caller, shareholder_id, position_id, candidate_id);
        match &result {
            Ok(vote) => {
                info!(
                    shareholder = shareholder_id,
                    position = %position_id,
                    candidate = %candidate_id,
                    vote = %vote.id,
                    "candidate vote accepted"
                );
                let action = format!(
                    "Recorded vote of {shareholder_id} for candidate {candidate_id} \
                     in position {position_id}"
                );
                record_best_effort(&*self.audit, caller.user_id, action);
            }
            Err(e) => warn!(
                shareholder = shareholder_id,
                position = %position_id,
                candidate = %candidate_id,
                kind = ?e.kind(),
                error = %e,
                "candidate vote rejected"
            ),
        }
        result
    }

    /// Record a voter's single choice on an issue
    pub fn cast_issue_vote(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        issue_id: IssueId,
        option: IssueOption,
    ) -> Result<IssueVote> {
        let result = self.admit_issue_vote(caller, shareholder_id, issue_id, option);
        match &result {
            Ok(vote) => {
                info!(
                    shareholder = shareholder_id,
                    issue = %issue_id,
                    %option,
                    vote = %vote.id,
                    "issue vote accepted"
                );
                record_best_effort(
                    &*self.audit,
                    caller.user_id,
                    format!("Recorded {option} vote of {shareholder_id} on issue {issue_id}"),
                );
            }
            Err(e) => warn!(
                shareholder = shareholder_id,
                issue = %issue_id,
                %option,
                kind = ?e.kind(),
                error = %e,
                "issue vote rejected"
            ),
        }
        result
    }

    /// Same as [`cast_issue_vote`](Self::cast_issue_vote) with a ballot-form
    /// option id (1 = YES, 2 = NO, 3 = ABSTAIN)
    pub fn cast_issue_vote_by_id(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        issue_id: IssueId,
        option_id: u8,
    ) -> Result<IssueVote> {
        let option = IssueOption::from_id(option_id)?;
        self.cast_issue_vote(caller, shareholder_id, issue_id, option)
    }

    fn admit_candidate_vote(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        position_id: PositionId,
        candidate_id: CandidateId,
    ) -> Result<CandidateVote> {
        caller.require_vote_entry("Casting a candidate vote")?;
        let _guard = self
            .locks
            .acquire(&AdmissionKey::position(shareholder_id, position_id))?;

        let voter = self.store.voter_by_shareholder_id(shareholder_id)?;
        let _gate = self.gates.shared(GateKey::Position(position_id))?;
        let position = fetch(&*self.store.positions, &position_id)?;
        fetch(&*self.store.candidates, &candidate_id)?;

        ensure_attended(&voter)?;
        if !position.status.is_open() {
            return Err(not_open("Position", position.id, position.status));
        }

        let assignment = self
            .store
            .assignment_for(candidate_id, position_id)?
            .ok_or_else(|| Error::NotAssigned {
                candidate_id: candidate_id.to_string(),
                position_id: position_id.to_string(),
            })?;

        let vote = CandidateVote {
            id: CandidateVoteId::new(),
            voter_id: voter.id,
            position_id,
            assignment_id: assignment.id,
            election_id: position.election_id,
            created_at: Utc::now(),
        };

        self.store.candidate_votes.insert_checked(
            vote,
            &|v: &CandidateVote| v.voter_id == voter.id && v.position_id == position_id,
            &|cast: &[&CandidateVote]| {
                if cast.iter().any(|v| v.assignment_id == assignment.id) {
                    return Err(Error::duplicate_vote(format!(
                        "Voter {} already voted for candidate {} in position {}",
                        voter.shareholder_id, candidate_id, position_id
                    )));
                }
                if cast.len() >= position.max_votes as usize {
                    return Err(Error::LimitReached {
                        shareholder_id: voter.shareholder_id.clone(),
                        position_id: position_id.to_string(),
                        max_votes: position.max_votes,
                    });
                }
                Ok(())
            },
        )
    }

    fn admit_issue_vote(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        issue_id: IssueId,
        option: IssueOption,
    ) -> Result<IssueVote> {
        caller.require_vote_entry("Casting an issue vote")?;
        let _guard = self
            .locks
            .acquire(&AdmissionKey::issue(shareholder_id, issue_id))?;

        let voter = self.store.voter_by_shareholder_id(shareholder_id)?;
        let _gate = self.gates.shared(GateKey::Issue(issue_id))?;
        let issue = fetch(&*self.store.issues, &issue_id)?;

        ensure_attended(&voter)?;
        if !issue.status.is_open() {
            return Err(not_open("Issue", issue.id, issue.status));
        }

        let vote = IssueVote {
            id: IssueVoteId::new(),
            voter_id: voter.id,
            issue_id,
            election_id: issue.election_id,
            option,
            created_at: Utc::now(),
        };

        self.store.issue_votes.insert_checked(
            vote,
            &|v: &IssueVote| v.voter_id == voter.id && v.issue_id == issue_id,
            &|cast: &[&IssueVote]| match cast.first() {
                Some(previous) => Err(Error::duplicate_vote(format!(
                    "Voter {} already voted {} on issue {}",
                    voter.shareholder_id, previous.option, issue_id
                ))),
                None => Ok(()),
            },
        )
    }
}

fn ensure_attended(voter: &Voter) -> Result<()> {
    if voter.attendance {
        Ok(())
    } else {
        Err(Error::NotAttended {
            shareholder_id: voter.shareholder_id.clone(),
        })
    }
}

fn not_open(entity: &'static str, id: impl ToString, status: Status) -> Error {
    Error::NotOpen {
        entity,
        id: id.to_string(),
        status: status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::audit::AuditTrail;
    use crate::store::intercept::InterceptedRepository;
    use crate::types::{Candidate, CandidateAssignment, ElectionId, Issue, Position};
    use crate::voting::LifecycleController;
    use rust_decimal::Decimal;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    struct Fixture {
        store: Arc<EntityStore>,
        trail: Arc<AuditTrail>,
        gates: Arc<StatusGates>,
        engine: VoteAdmissionEngine,
        position: Position,
        a: CandidateId,
        b: CandidateId,
    }

    fn fixture(max_votes: u32) -> Fixture {
        fixture_in(EntityStore::in_memory(), max_votes)
    }

    fn fixture_in(store: EntityStore, max_votes: u32) -> Fixture {
        let store = Arc::new(store);
        let trail = Arc::new(AuditTrail::new(100));
        let gates = Arc::new(StatusGates::new());
        let engine = VoteAdmissionEngine::new(store.clone(), trail.clone(), gates.clone());

        let mut position =
            Position::new(ElectionId::new(), "Board", "", Some(3), max_votes).unwrap();
        position.status = Status::Open;
        store.positions.save(position.clone()).unwrap();

        let mut ids = Vec::new();
        for name in ["Abebe Bikila", "Birtukan Mideksa"] {
            let candidate = store.candidates.save(Candidate::new(name, "", None).unwrap()).unwrap();
            store
                .assignments
                .save(CandidateAssignment::new(candidate.id, &position))
                .unwrap();
            ids.push(candidate.id);
        }

        store
            .voters
            .save(Voter::new("SH-1", "Genet Worku", Decimal::new(100, 0), true).unwrap())
            .unwrap();
        store
            .voters
            .save(Voter::new("SH-2", "Hailu Mekonnen", Decimal::new(50, 0), false).unwrap())
            .unwrap();

        Fixture {
            store,
            trail,
            gates,
            engine,
            position,
            a: ids[0],
            b: ids[1],
        }
    }

    #[test]
    fn test_duplicate_is_reported_before_ceiling() {
        let f = fixture(2);
        let clerk = Caller::clerk();
        f.engine.cast_candidate_vote(&clerk, "SH-1", f.position.id, f.a).unwrap();
        f.engine.cast_candidate_vote(&clerk, "SH-1", f.position.id, f.b).unwrap();

        let err = f
            .engine
            .cast_candidate_vote(&clerk, "SH-1", f.position.id, f.a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateVote);
        assert_eq!(f.store.candidate_votes.count(&|_| true).unwrap(), 2);
    }

    #[test]
    fn test_ceiling_counts_across_candidates() {
        let f = fixture(1);
        let clerk = Caller::clerk();
        f.engine.cast_candidate_vote(&clerk, "SH-1", f.position.id, f.a).unwrap();

        let err = f
            .engine
            .cast_candidate_vote(&clerk, "SH-1", f.position.id, f.b)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitReached);
        assert!(err.to_string().contains("maximum of 1"));
    }

    #[test]
    fn test_rejection_order() {
        let f = fixture(2);
        let clerk = Caller::clerk();

        let err = f
            .engine
            .cast_candidate_vote(&clerk, "SH-404", PositionId::new(), f.a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VoterNotFound);

        let err = f
            .engine
            .cast_candidate_vote(&clerk, "SH-1", PositionId::new(), f.a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = f
            .engine
            .cast_candidate_vote(&clerk, "SH-2", f.position.id, f.a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAttended);

        let stranger = f
            .store
            .candidates
            .save(Candidate::new("Unassigned", "", None).unwrap())
            .unwrap();
        let err = f
            .engine
            .cast_candidate_vote(&clerk, "SH-1", f.position.id, stranger.id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAssigned);
    }

    #[test]
    fn test_closed_position_rejects_votes() {
        let f = fixture(2);
        f.store
            .positions
            .update(&f.position.id, &mut |p: &mut Position| {
                p.status = Status::Closed;
                Ok(())
            })
            .unwrap();

        let err = f
            .engine
            .cast_candidate_vote(&Caller::admin(), "SH-1", f.position.id, f.a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotOpen);
        assert!(err.to_string().contains("CLOSED"));
    }

    #[test]
    fn test_observer_cannot_vote() {
        let f = fixture(2);
        let err = f
            .engine
            .cast_candidate_vote(&Caller::observer(), "SH-1", f.position.id, f.a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(f.store.candidate_votes.count(&|_| true).unwrap(), 0);
    }

    #[test]
    fn test_issue_vote_is_single_choice() {
        let f = fixture(1);
        let mut issue = Issue::new(ElectionId::new(), "Dividend", "").unwrap();
        issue.status = Status::Open;
        f.store.issues.save(issue.clone()).unwrap();
        let clerk = Caller::clerk();

        let vote = f.engine.cast_issue_vote_by_id(&clerk, "SH-1", issue.id, 1).unwrap();
        assert_eq!(vote.option, IssueOption::Yes);

        let err = f
            .engine
            .cast_issue_vote(&clerk, "SH-1", issue.id, IssueOption::No)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateVote);

        let err = f.engine.cast_issue_vote_by_id(&clerk, "SH-1", issue.id, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_accepted_votes_are_audited() {
        let f = fixture(2);
        let clerk = Caller::clerk();
        f.engine.cast_candidate_vote(&clerk, "SH-1", f.position.id, f.a).unwrap();
        let _ = f.engine.cast_candidate_vote(&clerk, "SH-2", f.position.id, f.a);

        let records = f.trail.records_by_actor(clerk.user_id).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].event.action.contains("SH-1"));
    }

    #[test]
    fn test_close_during_admission_waits_for_the_vote() {
        let positions = Arc::new(InterceptedRepository::<Position>::new());
        let store = EntityStore {
            positions: positions.clone(),
            ..EntityStore::in_memory()
        };
        let f = fixture_in(store, 2);
        let lifecycle = Arc::new(LifecycleController::new(
            f.store.clone(),
            f.trail.clone(),
            f.gates.clone(),
        ));

        // Close the position from another thread right after admission reads it.
        let (tx, rx) = mpsc::channel();
        let (store, position_id) = (f.store.clone(), f.position.id);
        positions.on_next_read(move || {
            thread::spawn(move || {
                let closed = lifecycle.close_position(&Caller::admin(), position_id);
                let votes_at_close = store.candidate_votes.count(&|_| true);
                tx.send((closed, votes_at_close)).unwrap();
            });
            thread::sleep(Duration::from_millis(50));
        });

        let vote = f
            .engine
            .cast_candidate_vote(&Caller::clerk(), "SH-1", f.position.id, f.a);
        assert!(vote.is_ok());

        let (closed, votes_at_close) = rx.recv().unwrap();
        assert_eq!(closed.unwrap().status, Status::Closed);
        assert_eq!(votes_at_close.unwrap(), 1);

        let err = f
            .engine
            .cast_candidate_vote(&Caller::clerk(), "SH-1", f.position.id, f.b)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotOpen);
        assert_eq!(f.gates.busy_count().unwrap(), 0);
    }

    #[test]
    fn test_issue_close_during_admission_waits_for_the_vote() {
        let issues = Arc::new(InterceptedRepository::<Issue>::new());
        let store = EntityStore {
            issues: issues.clone(),
            ..EntityStore::in_memory()
        };
        let f = fixture_in(store, 1);
        let lifecycle = Arc::new(LifecycleController::new(
            f.store.clone(),
            f.trail.clone(),
            f.gates.clone(),
        ));
        let mut issue = Issue::new(ElectionId::new(), "Dividend", "").unwrap();
        issue.status = Status::Open;
        let issue_id = f.store.issues.save(issue).unwrap().id;

        let (tx, rx) = mpsc::channel();
        let store = f.store.clone();
        issues.on_next_read(move || {
            thread::spawn(move || {
                let closed = lifecycle.close_issue(&Caller::admin(), issue_id);
                let votes_at_close = store.issue_votes.count(&|_| true);
                tx.send((closed, votes_at_close)).unwrap();
            });
            thread::sleep(Duration::from_millis(50));
        });

        f.engine
            .cast_issue_vote(&Caller::clerk(), "SH-1", issue_id, IssueOption::Abstain)
            .unwrap();

        let (closed, votes_at_close) = rx.recv().unwrap();
        assert_eq!(closed.unwrap().status, Status::Closed);
        assert_eq!(votes_at_close.unwrap(), 1);
    }
}
