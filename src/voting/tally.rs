//! Tally and ranking engine
//!
//! Read-only aggregation over the vote log. Each tally reads the vote rows of
//! its position or issue in one repository snapshot and resolves voter weights
//! live, so a later correction of a shareholder's weight is reflected in the
//! next tally. Sums use exact decimal arithmetic.
//!
//! A voter who votes for several candidates in a multi-seat position adds
//! their full weight to each candidate; weight is never divided.

use crate::store::{EntityStore, fetch};
use crate::types::{
    CandidateId, CandidateVote, IssueId, IssueOption, IssueVote, PositionId, Status, Voter,
    VoterId,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Summed weight for one assigned candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTotal {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub total_weight: Decimal,
}

/// Zero-filled weight totals for every candidate assigned to a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTally {
    pub position_id: PositionId,
    /// One entry per assigned candidate, in assignment order
    pub totals: Vec<CandidateTotal>,
}

impl PositionTally {
    /// Total for the candidate with this full name
    pub fn get(&self, candidate_name: &str) -> Option<Decimal> {
        self.totals
            .iter()
            .find(|t| t.candidate_name == candidate_name)
            .map(|t| t.total_weight)
    }

    pub fn get_by_id(&self, candidate_id: CandidateId) -> Option<Decimal> {
        self.totals
            .iter()
            .find(|t| t.candidate_id == candidate_id)
            .map(|t| t.total_weight)
    }

    /// Sum over all candidates
    pub fn total_weight(&self) -> Decimal {
        self.totals.iter().map(|t| t.total_weight).sum()
    }
}

/// Weight totals for the three issue options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueTally {
    pub issue_id: IssueId,
    pub yes: Decimal,
    pub no: Decimal,
    pub abstain: Decimal,
}

impl IssueTally {
    fn zero(issue_id: IssueId) -> Self {
        Self {
            issue_id,
            yes: Decimal::ZERO,
            no: Decimal::ZERO,
            abstain: Decimal::ZERO,
        }
    }

    pub fn get(&self, option: IssueOption) -> Decimal {
        match option {
            IssueOption::Yes => self.yes,
            IssueOption::No => self.no,
            IssueOption::Abstain => self.abstain,
        }
    }

    fn bucket(&mut self, option: IssueOption) -> &mut Decimal {
        match option {
            IssueOption::Yes => &mut self.yes,
            IssueOption::No => &mut self.no,
            IssueOption::Abstain => &mut self.abstain,
        }
    }
}

/// One row of a position ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRanking {
    /// 1-based and sequential; ties do not share a rank
    pub rank: u32,
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub total_weight: Decimal,
}

/// A voter's weight as it stands right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterWeight {
    pub voter_name: String,
    pub shareholder_id: String,
    pub weight: Decimal,
}

/// Who voted for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRoster {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub voters: Vec<VoterWeight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStanding {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub number_of_voters: usize,
    pub election_day: NaiveDate,
    pub total_weight: Decimal,
    pub voters: Vec<VoterWeight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub issue_id: IssueId,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub results: IssueTally,
}

/// Computes tallies, rankings and rosters from the vote log
pub struct TallyEngine {
    store: Arc<EntityStore>,
}

impl TallyEngine {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    pub fn tally_candidate_votes(&self, position_id: PositionId) -> Result<PositionTally> {
        let rosters = self.detailed_candidate_votes(position_id)?;
        let totals = rosters
            .into_iter()
            .map(|roster| CandidateTotal {
                total_weight: roster.voters.iter().map(|v| v.weight).sum(),
                candidate_id: roster.candidate_id,
                candidate_name: roster.candidate_name,
            })
            .collect();

        Ok(PositionTally {
            position_id,
            totals,
        })
    }

    pub fn tally_issue_votes(&self, issue_id: IssueId) -> Result<IssueTally> {
        fetch(&*self.store.issues, &issue_id)?;
        let votes = self
            .store
            .issue_votes
            .find_all(&|v: &IssueVote| v.issue_id == issue_id)?;
        let voters = self.voter_index()?;

        let mut tally = IssueTally::zero(issue_id);
        for vote in &votes {
            *tally.bucket(vote.option) += voter_of(&voters, vote.voter_id)?.voting_weight;
        }

        debug!(issue = %issue_id, votes = votes.len(), "issue tallied");
        Ok(tally)
    }

    /// Candidates by descending weight; equal weights keep assignment order
    pub fn candidate_rankings(&self, position_id: PositionId) -> Result<Vec<CandidateRanking>> {
        let mut totals = self.tally_candidate_votes(position_id)?.totals;
        totals.sort_by(|a, b| b.total_weight.cmp(&a.total_weight));

        Ok(totals
            .into_iter()
            .zip(1u32..)
            .map(|(total, rank)| CandidateRanking {
                rank,
                candidate_id: total.candidate_id,
                candidate_name: total.candidate_name,
                total_weight: total.total_weight,
            })
            .collect())
    }

    pub fn top_candidates(
        &self,
        position_id: PositionId,
        n: usize,
    ) -> Result<Vec<CandidateRanking>> {
        let mut rankings = self.candidate_rankings(position_id)?;
        rankings.truncate(n);
        Ok(rankings)
    }

    /// Voters behind each assigned candidate, in assignment order
    pub fn detailed_candidate_votes(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<CandidateRoster>> {
        fetch(&*self.store.positions, &position_id)?;
        let assignments = self.store.assignments_for_position(position_id)?;
        let votes = self
            .store
            .candidate_votes
            .find_all(&|v: &CandidateVote| v.position_id == position_id)?;
        let voters = self.voter_index()?;

        let mut rosters = Vec::with_capacity(assignments.len());
        let mut slot_of = HashMap::with_capacity(assignments.len());
        for (slot, assignment) in assignments.iter().enumerate() {
            let candidate = fetch(&*self.store.candidates, &assignment.candidate_id)?;
            slot_of.insert(assignment.id, slot);
            rosters.push(CandidateRoster {
                candidate_id: candidate.id,
                candidate_name: candidate.full_name,
                voters: Vec::new(),
            });
        }

        for vote in &votes {
            let slot = *slot_of.get(&vote.assignment_id).ok_or_else(|| {
                Error::internal(format!(
                    "Vote {} references unknown assignment {}",
                    vote.id, vote.assignment_id
                ))
            })?;
            rosters[slot]
                .voters
                .push(voter_weight(voter_of(&voters, vote.voter_id)?));
        }

        debug!(
            position = %position_id,
            votes = votes.len(),
            candidates = rosters.len(),
            "position tallied"
        );
        Ok(rosters)
    }

    /// Distinct voters who cast at least one vote in the position
    pub fn total_voters_for_position(&self, position_id: PositionId) -> Result<usize> {
        fetch(&*self.store.positions, &position_id)?;
        let votes = self
            .store
            .candidate_votes
            .find_all(&|v: &CandidateVote| v.position_id == position_id)?;
        Ok(votes.iter().map(|v| v.voter_id).collect::<HashSet<_>>().len())
    }

    pub fn candidate_standing(
        &self,
        candidate_id: CandidateId,
        position_id: PositionId,
    ) -> Result<CandidateStanding> {
        let candidate = fetch(&*self.store.candidates, &candidate_id)?;
        let position = fetch(&*self.store.positions, &position_id)?;
        let election = fetch(&*self.store.elections, &position.election_id)?;
        let assignment = self
            .store
            .assignment_for(candidate_id, position_id)?
            .ok_or_else(|| Error::NotAssigned {
                candidate_id: candidate_id.to_string(),
                position_id: position_id.to_string(),
            })?;

        let votes = self
            .store
            .candidate_votes
            .find_all(&|v: &CandidateVote| v.assignment_id == assignment.id)?;
        let index = self.voter_index()?;
        let voters = votes
            .iter()
            .map(|v| voter_of(&index, v.voter_id).map(voter_weight))
            .collect::<Result<Vec<_>>>()?;

        Ok(CandidateStanding {
            candidate_id,
            candidate_name: candidate.full_name,
            number_of_voters: voters.len(),
            election_day: election.election_day,
            total_weight: voters.iter().map(|v| v.weight).sum(),
            voters,
        })
    }

    pub fn issue_summary(&self, issue_id: IssueId) -> Result<IssueSummary> {
        let issue = fetch(&*self.store.issues, &issue_id)?;
        let results = self.tally_issue_votes(issue_id)?;
        Ok(IssueSummary {
            issue_id,
            title: issue.title,
            description: issue.description,
            status: issue.status,
            results,
        })
    }

    fn voter_index(&self) -> Result<HashMap<VoterId, Voter>> {
        Ok(self
            .store
            .voters
            .find_all(&|_| true)?
            .into_iter()
            .map(|v| (v.id, v))
            .collect())
    }
}

fn voter_of(index: &HashMap<VoterId, Voter>, id: VoterId) -> Result<&Voter> {
    index.get(&id).ok_or_else(|| Error::not_found("Voter", id))
}

fn voter_weight(voter: &Voter) -> VoterWeight {
    VoterWeight {
        voter_name: voter.name.clone(),
        shareholder_id: voter.shareholder_id.clone(),
        weight: voter.voting_weight,
    }
}
