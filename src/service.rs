//! Assembly service facade
//!
//! One object per running assembly. It owns the entity store, the audit sink
//! and the four election components, and is what callers hold (usually behind
//! an `Arc`, since every operation takes `&self`).

use crate::Result;
use crate::audit::{AuditSink, AuditTrail};
use crate::config::ElectionConfig;
use crate::store::EntityStore;
use crate::types::{
    Caller, Candidate, CandidateAssignment, CandidateId, CandidatePatch, CandidateVote, Election,
    ElectionId, Issue, IssueId, IssueOption, IssueVote, Position, PositionId, Voter,
};
use crate::voting::{
    CandidateRanking, CandidateRoster, CandidateStanding, IssueSummary, IssueTally,
    LifecycleController, NewPosition, Page, Pagination, PositionTally, StatusGates, TallyEngine,
    VoteAdmissionEngine, VoterHistory, VoterHistoryReporter,
};
use chrono::NaiveDate;
use std::sync::Arc;

pub struct AssemblyService {
    store: Arc<EntityStore>,
    lifecycle: LifecycleController,
    admission: VoteAdmissionEngine,
    tally: TallyEngine,
    history: VoterHistoryReporter,
}

impl AssemblyService {
    pub fn new(
        store: Arc<EntityStore>,
        audit: Arc<dyn AuditSink>,
        config: ElectionConfig,
    ) -> Self {
        tracing::debug!(?config, "assembly service created");
        let gates = Arc::new(StatusGates::new());
        Self {
            lifecycle: LifecycleController::new(store.clone(), audit.clone(), gates.clone()),
            admission: VoteAdmissionEngine::new(store.clone(), audit, gates),
            tally: TallyEngine::new(store.clone()),
            history: VoterHistoryReporter::new(store.clone(), config),
            store,
        }
    }

    /// Service over in-memory repositories with a hash-chained audit trail
    pub fn in_memory(config: ElectionConfig) -> (Self, Arc<AuditTrail>) {
        let trail = Arc::new(AuditTrail::new(config.audit_capacity));
        let service = Self::new(Arc::new(EntityStore::in_memory()), trail.clone(), config);
        (service, trail)
    }

    /// Direct access to the repositories, e.g. for registry synchronisation
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    // Elections

    pub fn create_election(
        &self,
        caller: &Caller,
        name: &str,
        election_day: NaiveDate,
    ) -> Result<Election> {
        self.lifecycle.create_election(caller, name, election_day)
    }

    pub fn create_open_election(
        &self,
        caller: &Caller,
        name: &str,
        election_day: NaiveDate,
    ) -> Result<Election> {
        self.lifecycle.create_open_election(caller, name, election_day)
    }

    pub fn activate_election(&self, caller: &Caller, id: ElectionId) -> Result<Election> {
        self.lifecycle.activate_election(caller, id)
    }

    pub fn close_election(&self, caller: &Caller, id: ElectionId) -> Result<Election> {
        self.lifecycle.close_election(caller, id)
    }

    pub fn elections(&self) -> Result<Vec<Election>> {
        self.lifecycle.elections()
    }

    // Positions

    pub fn create_position(
        &self,
        caller: &Caller,
        election_id: ElectionId,
        position: NewPosition,
    ) -> Result<Position> {
        self.lifecycle.create_position(caller, election_id, position)
    }

    pub fn update_position(
        &self,
        caller: &Caller,
        id: PositionId,
        name: &str,
        description: &str,
    ) -> Result<Position> {
        self.lifecycle.update_position(caller, id, name, description)
    }

    pub fn activate_position(&self, caller: &Caller, id: PositionId) -> Result<Position> {
        self.lifecycle.activate_position(caller, id)
    }

    pub fn close_position(&self, caller: &Caller, id: PositionId) -> Result<Position> {
        self.lifecycle.close_position(caller, id)
    }

    pub fn positions_for_election(&self, election_id: ElectionId) -> Result<Vec<Position>> {
        self.lifecycle.positions_for_election(election_id)
    }

    pub fn active_positions(&self) -> Result<Vec<Position>> {
        self.lifecycle.active_positions()
    }

    // Candidates

    pub fn register_candidate(
        &self,
        caller: &Caller,
        full_name: &str,
        manifesto: &str,
        photo_url: Option<String>,
    ) -> Result<Candidate> {
        self.lifecycle
            .register_candidate(caller, full_name, manifesto, photo_url)
    }

    pub fn update_candidate(
        &self,
        caller: &Caller,
        id: CandidateId,
        patch: CandidatePatch,
    ) -> Result<Candidate> {
        self.lifecycle.update_candidate(caller, id, patch)
    }

    pub fn assign_candidate(
        &self,
        caller: &Caller,
        candidate_id: CandidateId,
        position_id: PositionId,
    ) -> Result<CandidateAssignment> {
        self.lifecycle
            .assign_candidate(caller, candidate_id, position_id)
    }

    pub fn candidates_for_position(&self, position_id: PositionId) -> Result<Vec<Candidate>> {
        self.lifecycle.candidates_for_position(position_id)
    }

    // Issues

    pub fn create_issue(
        &self,
        caller: &Caller,
        election_id: ElectionId,
        title: &str,
        description: &str,
    ) -> Result<Issue> {
        self.lifecycle
            .create_issue(caller, election_id, title, description)
    }

    pub fn update_issue(
        &self,
        caller: &Caller,
        id: IssueId,
        title: &str,
        description: &str,
    ) -> Result<Issue> {
        self.lifecycle.update_issue(caller, id, title, description)
    }

    pub fn activate_issue(&self, caller: &Caller, id: IssueId) -> Result<Issue> {
        self.lifecycle.activate_issue(caller, id)
    }

    pub fn close_issue(&self, caller: &Caller, id: IssueId) -> Result<Issue> {
        self.lifecycle.close_issue(caller, id)
    }

    pub fn issues_for_election(&self, election_id: ElectionId) -> Result<Vec<Issue>> {
        self.lifecycle.issues_for_election(election_id)
    }

    pub fn active_issues(&self) -> Result<Vec<Issue>> {
        self.lifecycle.active_issues()
    }

    // Voters

    pub fn register_voter(&self, caller: &Caller, voter: Voter) -> Result<Voter> {
        self.lifecycle.register_voter(caller, voter)
    }

    pub fn set_attendance(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        attended: bool,
    ) -> Result<Voter> {
        self.lifecycle.set_attendance(caller, shareholder_id, attended)
    }

    // Voting

    pub fn cast_candidate_vote(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        position_id: PositionId,
        candidate_id: CandidateId,
    ) -> Result<CandidateVote> {
        self.admission
            .cast_candidate_vote(caller, shareholder_id, position_id, candidate_id)
    }

    pub fn cast_issue_vote(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        issue_id: IssueId,
        option: IssueOption,
    ) -> Result<IssueVote> {
        self.admission
            .cast_issue_vote(caller, shareholder_id, issue_id, option)
    }

    pub fn cast_issue_vote_by_id(
        &self,
        caller: &Caller,
        shareholder_id: &str,
        issue_id: IssueId,
        option_id: u8,
    ) -> Result<IssueVote> {
        self.admission
            .cast_issue_vote_by_id(caller, shareholder_id, issue_id, option_id)
    }

    // Tallies and reports

    pub fn tally_candidate_votes(&self, position_id: PositionId) -> Result<PositionTally> {
        self.tally.tally_candidate_votes(position_id)
    }

    pub fn tally_issue_votes(&self, issue_id: IssueId) -> Result<IssueTally> {
        self.tally.tally_issue_votes(issue_id)
    }

    pub fn candidate_rankings(&self, position_id: PositionId) -> Result<Vec<CandidateRanking>> {
        self.tally.candidate_rankings(position_id)
    }

    pub fn top_candidates(
        &self,
        position_id: PositionId,
        n: usize,
    ) -> Result<Vec<CandidateRanking>> {
        self.tally.top_candidates(position_id, n)
    }

    pub fn detailed_candidate_votes(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<CandidateRoster>> {
        self.tally.detailed_candidate_votes(position_id)
    }

    pub fn total_voters_for_position(&self, position_id: PositionId) -> Result<usize> {
        self.tally.total_voters_for_position(position_id)
    }

    pub fn candidate_standing(
        &self,
        candidate_id: CandidateId,
        position_id: PositionId,
    ) -> Result<CandidateStanding> {
        self.tally.candidate_standing(candidate_id, position_id)
    }

    pub fn issue_summary(&self, issue_id: IssueId) -> Result<IssueSummary> {
        self.tally.issue_summary(issue_id)
    }

    pub fn voter_history_by_position(&self, position_id: PositionId) -> Result<Vec<VoterHistory>> {
        self.history.voter_history_by_position(position_id)
    }

    pub fn voter_history_by_position_paginated(
        &self,
        position_id: PositionId,
        pagination: Pagination,
    ) -> Result<Page<VoterHistory>> {
        self.history
            .voter_history_by_position_paginated(position_id, pagination)
    }

    /// Page request using the configured default size when `page_size` is `None`
    pub fn pagination(&self, page_num: usize, page_size: Option<usize>) -> Result<Pagination> {
        self.history.pagination(page_num, page_size)
    }
}
