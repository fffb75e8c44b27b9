//! Lifecycle controller
//!
//! Owns every structural mutation: creating elections, positions, issues and
//! candidates, assigning candidates to positions, and moving elections,
//! positions and issues through `DRAFT → OPEN → CLOSED`.
//!
//! Transitions are a single atomic read-modify-write on the repository, so
//! two concurrent `activate` calls cannot both succeed: the loser observes
//! `OPEN` and fails with `AlreadyActive`. Position and issue transitions also
//! hold the target's status gate exclusive, which orders them against vote
//! admission and candidate assignment.

use super::lock::{GateKey, StatusGates};
use crate::audit::{AuditSink, record_best_effort};
use crate::store::{Entity, EntityStore, Repository, fetch};
use crate::types::{
    Caller, Candidate, CandidateAssignment, CandidateId, CandidatePatch, Election, ElectionId,
    Issue, IssueId, Position, PositionId, Status, Transition, TransitionRejection, Voter,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

/// Records that move through the shared lifecycle state machine
pub trait Lifecycle: Entity {
    fn status(&self) -> Status;
    fn set_status(&mut self, status: Status);

    /// Gate that status-dependent work on this record holds, if any
    fn gate(id: Self::Id) -> Option<GateKey>;
}

macro_rules! impl_lifecycle {
    ($($ty:ty => $gate:expr),*) => {
        $(
            impl Lifecycle for $ty {
                fn status(&self) -> Status {
                    self.status
                }

                fn set_status(&mut self, status: Status) {
                    self.status = status;
                }

                fn gate(id: Self::Id) -> Option<GateKey> {
                    ($gate)(id)
                }
            }
        )*
    };
}

impl_lifecycle!(
    Election => |_| None,
    Position => |id| Some(GateKey::Position(id)),
    Issue => |id| Some(GateKey::Issue(id))
);

/// Parameters for a new position
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub name: String,
    pub description: String,
    /// Defaults to 1 when `None`
    pub max_candidates: Option<u32>,
    pub max_votes: u32,
}

/// Structural operations and the lifecycle state machine
pub struct LifecycleController {
    store: Arc<EntityStore>,
    audit: Arc<dyn AuditSink>,
    gates: Arc<StatusGates>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<EntityStore>,
        audit: Arc<dyn AuditSink>,
        gates: Arc<StatusGates>,
    ) -> Self {
        Self {
            store,
            audit,
            gates,
        }
    }

    // ---------------------------------------------------------------------
    // Elections
    // ---------------------------------------------------------------------

    /// Create an election in DRAFT
    pub fn create_election(
        &self,
        caller: &Caller,
        name: &str,
        election_day: NaiveDate,
    ) -> Result<Election> {
        self.insert_election(caller, name, election_day, Status::Draft)
    }

    /// Create an election that accepts votes immediately
    pub fn create_open_election(
        &self,
        caller: &Caller,
        name: &str,
        election_day: NaiveDate,
    ) -> Result<Election> {
        self.insert_election(caller, name, election_day, Status::Open)
    }

    fn insert_election(
        &self,
        caller: &Caller,
        name: &str,
        election_day: NaiveDate,
        status: Status,
    ) -> Result<Election> {
        caller.require_admin("Creating an election")?;
        let election = Election::new(name, election_day, caller.user_id, status)?;
        let election = self.store.elections.save(election)?;

        info!(election = %election.id, status = %election.status, "election created");
        self.audit(
            caller,
            format!("Created election with title: {} ({})", election.name, election.status),
        );
        Ok(election)
    }

    pub fn activate_election(&self, caller: &Caller, id: ElectionId) -> Result<Election> {
        self.transition(caller, &*self.store.elections, id, Transition::Activate)
    }

    pub fn close_election(&self, caller: &Caller, id: ElectionId) -> Result<Election> {
        self.transition(caller, &*self.store.elections, id, Transition::Close)
    }

    /// All elections, most recent election day first
    pub fn elections(&self) -> Result<Vec<Election>> {
        let mut elections = self.store.elections.find_all(&|_| true)?;
        elections.sort_by(|a, b| b.election_day.cmp(&a.election_day));
        Ok(elections)
    }

    // ---------------------------------------------------------------------
    // Positions
    // ---------------------------------------------------------------------

    /// Create a DRAFT position inside an election that is not closed
    pub fn create_position(
        &self,
        caller: &Caller,
        election_id: ElectionId,
        fields: NewPosition,
    ) -> Result<Position> {
        caller.require_admin("Creating a position")?;
        let election = self.open_for_structure(election_id)?;
        let position = Position::new(
            election.id,
            fields.name,
            fields.description,
            fields.max_candidates,
            fields.max_votes,
        )?;
        let position = self.store.positions.save(position)?;

        info!(
            position = %position.id,
            election = %election.id,
            max_votes = position.max_votes,
            max_candidates = position.max_candidates,
            "position created"
        );
        self.audit(caller, format!("Created position with name: {}", position.name));
        Ok(position)
    }

    /// Rename or re-describe a position while it is still DRAFT
    pub fn update_position(
        &self,
        caller: &Caller,
        id: PositionId,
        name: &str,
        description: &str,
    ) -> Result<Position> {
        caller.require_admin("Updating a position")?;
        let fields = Position::new(ElectionId::new(), name, description, None, 1)?;

        let position = self.store.positions.update(&id, &mut |position: &mut Position| {
            ensure_draft(position)?;
            position.name = fields.name.clone();
            position.description = fields.description.clone();
            Ok(())
        })?;

        self.audit(caller, format!("Updated position with id: {}", position.id));
        Ok(position)
    }

    pub fn activate_position(&self, caller: &Caller, id: PositionId) -> Result<Position> {
        self.transition(caller, &*self.store.positions, id, Transition::Activate)
    }

    pub fn close_position(&self, caller: &Caller, id: PositionId) -> Result<Position> {
        self.transition(caller, &*self.store.positions, id, Transition::Close)
    }

    pub fn positions_for_election(&self, election_id: ElectionId) -> Result<Vec<Position>> {
        fetch(&*self.store.elections, &election_id)?;
        self.store
            .positions
            .find_all(&|p: &Position| p.election_id == election_id)
    }

    /// Positions currently accepting votes
    pub fn active_positions(&self) -> Result<Vec<Position>> {
        self.store.positions.find_all(&|p: &Position| p.status.is_open())
    }

    // ---------------------------------------------------------------------
    // Issues
    // ---------------------------------------------------------------------

    /// Create a DRAFT issue; titles are unique across all elections
    pub fn create_issue(
        &self,
        caller: &Caller,
        election_id: ElectionId,
        title: &str,
        description: &str,
    ) -> Result<Issue> {
        caller.require_admin("Creating an issue")?;
        let election = self.open_for_structure(election_id)?;
        let issue = Issue::new(election.id, title, description)?;

        let _titles = self.gates.exclusive(GateKey::IssueTitles)?;
        let wanted = issue.title.clone();
        let issue = self.store.issues.insert_checked(
            issue,
            &|existing: &Issue| existing.title == wanted,
            &|taken: &[&Issue]| match taken.first() {
                Some(other) => Err(Error::conflict(format!(
                    "Issue title {:?} is already used by issue {}",
                    other.title, other.id
                ))),
                None => Ok(()),
            },
        )?;

        info!(issue = %issue.id, election = %election.id, "issue created");
        self.audit(caller, format!("Created issue with id: {}", issue.id));
        Ok(issue)
    }

    /// Retitle or re-describe an issue while it is still DRAFT
    pub fn update_issue(
        &self,
        caller: &Caller,
        id: IssueId,
        title: &str,
        description: &str,
    ) -> Result<Issue> {
        caller.require_admin("Updating an issue")?;
        let fields = Issue::new(ElectionId::new(), title, description)?;

        let _titles = self.gates.exclusive(GateKey::IssueTitles)?;
        let clash = self
            .store
            .issues
            .count(&|other: &Issue| other.id != id && other.title == fields.title)?;
        if clash > 0 {
            return Err(Error::conflict(format!(
                "Issue title {:?} is already in use",
                fields.title
            )));
        }

        let issue = self.store.issues.update(&id, &mut |issue: &mut Issue| {
            ensure_draft(issue)?;
            issue.title = fields.title.clone();
            issue.description = fields.description.clone();
            Ok(())
        })?;

        self.audit(caller, format!("Updated issue with id: {}", issue.id));
        Ok(issue)
    }

    pub fn activate_issue(&self, caller: &Caller, id: IssueId) -> Result<Issue> {
        self.transition(caller, &*self.store.issues, id, Transition::Activate)
    }

    pub fn close_issue(&self, caller: &Caller, id: IssueId) -> Result<Issue> {
        self.transition(caller, &*self.store.issues, id, Transition::Close)
    }

    pub fn issues_for_election(&self, election_id: ElectionId) -> Result<Vec<Issue>> {
        fetch(&*self.store.elections, &election_id)?;
        self.store
            .issues
            .find_all(&|i: &Issue| i.election_id == election_id)
    }

    /// Issues currently accepting votes
    pub fn active_issues(&self) -> Result<Vec<Issue>> {
        self.store.issues.find_all(&|i: &Issue| i.status.is_open())
    }

    // ---------------------------------------------------------------------
    // Candidates
    // ---------------------------------------------------------------------

    pub fn register_candidate(
        &self,
        caller: &Caller,
        full_name: &str,
        manifesto: &str,
        photo_url: Option<String>,
    ) -> Result<Candidate> {
        caller.require_admin("Registering a candidate")?;
        let candidate = self
            .store
            .candidates
            .save(Candidate::new(full_name, manifesto, photo_url)?)?;

        info!(candidate = %candidate.id, "candidate registered");
        self.audit(caller, format!("Registered candidate: {}", candidate.full_name));
        Ok(candidate)
    }

    pub fn update_candidate(
        &self,
        caller: &Caller,
        id: CandidateId,
        patch: CandidatePatch,
    ) -> Result<Candidate> {
        caller.require_admin("Updating a candidate")?;
        let candidate = self
            .store
            .candidates
            .update(&id, &mut |candidate: &mut Candidate| candidate.apply(patch.clone()))?;

        self.audit(caller, format!("Updated candidate: {}", candidate.full_name));
        Ok(candidate)
    }

    /// Authorize a candidate to receive votes in a DRAFT position
    ///
    /// Capacity and duplicate checks run atomically with the insert.
    pub fn assign_candidate(
        &self,
        caller: &Caller,
        candidate_id: CandidateId,
        position_id: PositionId,
    ) -> Result<CandidateAssignment> {
        caller.require_admin("Assigning a candidate")?;
        let candidate = fetch(&*self.store.candidates, &candidate_id)?;
        let _gate = self.gates.shared(GateKey::Position(position_id))?;
        let position = fetch(&*self.store.positions, &position_id)?;

        if !candidate.active {
            return Err(Error::validation(format!(
                "Candidate {} is inactive and cannot be assigned",
                candidate.id
            )));
        }
        ensure_draft(&position)?;

        let assignment = CandidateAssignment::new(candidate.id, &position);
        let result = self.store.assignments.insert_checked(
            assignment,
            &|a: &CandidateAssignment| a.position_id == position.id,
            &|assigned: &[&CandidateAssignment]| {
                if assigned.len() >= position.max_candidates as usize {
                    return Err(Error::CandidateLimitReached {
                        position_id: position.id.to_string(),
                        max_candidates: position.max_candidates,
                    });
                }
                if assigned.iter().any(|a| a.candidate_id == candidate.id) {
                    return Err(Error::conflict(format!(
                        "Candidate {} is already assigned to position {}",
                        candidate.id, position.id
                    )));
                }
                Ok(())
            },
        );

        let assignment = match result {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(
                    candidate = %candidate.id,
                    position = %position.id,
                    kind = ?e.kind(),
                    "assignment rejected"
                );
                return Err(e);
            }
        };

        info!(candidate = %candidate.id, position = %position.id, "candidate assigned");
        self.audit(
            caller,
            format!(
                "Assigned candidate: {} to position: {}",
                candidate.full_name, position.name
            ),
        );
        Ok(assignment)
    }

    /// Candidates assigned to a position, in assignment order
    pub fn candidates_for_position(&self, position_id: PositionId) -> Result<Vec<Candidate>> {
        fetch(&*self.store.positions, &position_id)?;
        self.store
            .assignments_for_position(position_id)?
            .iter()
            .map(|a| fetch(&*self.store.candidates, &a.candidate_id))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Voters
    // ---------------------------------------------------------------------

    /// Import a voter from the shareholder registry
    pub fn register_voter(&self, caller: &Caller, voter: Voter) -> Result<Voter> {
        caller.require_admin("Registering a voter")?;
        let shareholder_id = voter.shareholder_id.clone();
        let voter = self.store.voters.insert_checked(
            voter,
            &|existing: &Voter| existing.shareholder_id == shareholder_id,
            &|taken: &[&Voter]| {
                if taken.is_empty() {
                    Ok(())
                } else {
                    Err(Error::conflict(format!(
                        "Shareholder {shareholder_id} is already registered"
                    )))
                }
            },
        )?;

        self.audit(caller, format!("Registered voter: {}", voter.name));
        Ok(voter)
    }

    /// Record check-in (or check-out) of a shareholder
    pub fn set_attendance(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        attended: bool,
    ) -> Result<Voter> {
        caller.require_vote_entry("Recording attendance")?;
        let voter = self.store.voter_by_shareholder_id(shareholder_id)?;
        let voter = self
            .store
            .voters
            .update(&voter.id, &mut |v: &mut Voter| {
                v.attendance = attended;
                Ok(())
            })?;

        info!(shareholder = %voter.shareholder_id, attended, "attendance recorded");
        self.audit(
            caller,
            format!("Set attendance of {} to {}", voter.shareholder_id, attended),
        );
        Ok(voter)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn transition<T: Lifecycle>(
        &self,
        caller: &Caller,
        repo: &dyn Repository<T>,
        id: T::Id,
        transition: Transition,
    ) -> Result<T> {
        caller.require_admin(&format!("Changing {} status", T::KIND))?;
        let _gate = T::gate(id)
            .map(|key| self.gates.exclusive(key))
            .transpose()?;

        let result = repo.update(&id, &mut |entity: &mut T| {
            let from = entity.status();
            let next = from
                .apply(transition)
                .map_err(|rejection| rejection_error::<T>(&id, from, transition, rejection))?;
            entity.set_status(next);
            Ok(())
        });

        match result {
            Ok(entity) => {
                info!(
                    entity = T::KIND,
                    id = %id,
                    status = %entity.status(),
                    "lifecycle transition"
                );
                self.audit(caller, format!("{} {} with id: {}", transition.verb(), T::KIND, id));
                Ok(entity)
            }
            Err(e) => {
                warn!(
                    entity = T::KIND,
                    id = %id,
                    ?transition,
                    kind = ?e.kind(),
                    "lifecycle transition rejected"
                );
                Err(e)
            }
        }
    }

    fn open_for_structure(&self, election_id: ElectionId) -> Result<Election> {
        let election = fetch(&*self.store.elections, &election_id)?;
        if election.status.is_closed() {
            return Err(Error::InvalidTransition {
                entity: Election::KIND,
                id: election.id.to_string(),
                from: election.status.to_string(),
                to: "new content".to_string(),
            });
        }
        Ok(election)
    }

    fn audit(&self, caller: &Caller, action: String) {
        record_best_effort(&*self.audit, caller.user_id, action);
    }
}

fn ensure_draft<T: Lifecycle>(entity: &T) -> Result<()> {
    if entity.status().is_draft() {
        Ok(())
    } else {
        Err(Error::NotDraft {
            entity: T::KIND,
            id: entity.id().to_string(),
            status: entity.status().to_string(),
        })
    }
}

fn rejection_error<T: Lifecycle>(
    id: &T::Id,
    from: Status,
    transition: Transition,
    rejection: TransitionRejection,
) -> Error {
    let id = id.to_string();
    match rejection {
        TransitionRejection::AlreadyActive => Error::AlreadyActive { entity: T::KIND, id },
        TransitionRejection::AlreadyClosed => Error::AlreadyClosed { entity: T::KIND, id },
        TransitionRejection::Invalid => Error::InvalidTransition {
            entity: T::KIND,
            id,
            from: from.to_string(),
            to: transition.target().to_string(),
        },
    }
}
