//! Voter-history reporter
//!
//! Voter-centric view of a position: every voter who cast at least one vote,
//! in order of their first vote, with the candidates they chose.

use crate::config::ElectionConfig;
use crate::store::{EntityStore, fetch};
use crate::types::{CandidateId, CandidateVote, PositionId, VoterId};
use crate::{Error, Result, validation_error};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A 1-based page request
///
/// Only constructible through [`Pagination::new`], so `page_size` is never zero.
/// Deserialization goes through the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PageRequest")]
pub struct Pagination {
    page_num: usize,
    page_size: usize,
}

#[derive(Deserialize)]
struct PageRequest {
    page_num: usize,
    page_size: usize,
}

impl TryFrom<PageRequest> for Pagination {
    type Error = Error;

    fn try_from(request: PageRequest) -> Result<Self> {
        Self::new(request.page_num, request.page_size)
    }
}

impl Pagination {
    pub fn new(page_num: usize, page_size: usize) -> Result<Self> {
        if page_num == 0 {
            return Err(validation_error!("page_num starts at 1"));
        }
        if page_size == 0 {
            return Err(validation_error!("page_size must be at least 1"));
        }
        Ok(Self {
            page_num,
            page_size,
        })
    }

    pub fn page_num(&self) -> usize {
        self.page_num
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn skip(&self) -> usize {
        (self.page_num - 1).saturating_mul(self.page_size)
    }

    fn clamp(self, max_page_size: usize) -> Self {
        Self {
            page_num: self.page_num,
            page_size: self.page_size.min(max_page_size.max(1)),
        }
    }

    /// Slice `all` down to this page
    pub fn result<T>(self, all: Vec<T>) -> Page<T> {
        let total = all.len();
        let items = all.into_iter().skip(self.skip()).take(self.page_size).collect();
        Page {
            items,
            page_num: self.page_num,
            page_size: self.page_size,
            total,
            total_pages: total.div_ceil(self.page_size),
        }
    }
}

/// One page of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_num: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// One candidate vote in a voter's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastVote {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub weight: Decimal,
    pub cast_at: DateTime<Utc>,
}

/// Everything one voter did in one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterHistory {
    pub voter_id: VoterId,
    pub shareholder_id: String,
    pub voter_name: String,
    pub voting_weight: Decimal,
    pub votes: Vec<CastVote>,
}

pub struct VoterHistoryReporter {
    store: Arc<EntityStore>,
    config: ElectionConfig,
}

impl VoterHistoryReporter {
    pub fn new(store: Arc<EntityStore>, config: ElectionConfig) -> Self {
        Self { store, config }
    }

    /// Build a page request, falling back to the configured default size and
    /// capping at the configured maximum
    pub fn pagination(&self, page_num: usize, page_size: Option<usize>) -> Result<Pagination> {
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        let pagination = Pagination::new(page_num, page_size)?;
        Ok(pagination.clamp(self.config.max_page_size))
    }

    pub fn voter_history_by_position(&self, position_id: PositionId) -> Result<Vec<VoterHistory>> {
        fetch(&*self.store.positions, &position_id)?;
        let votes = self
            .store
            .candidate_votes
            .find_all(&|v: &CandidateVote| v.position_id == position_id)?;

        let mut candidate_of = HashMap::new();
        for assignment in self.store.assignments_for_position(position_id)? {
            let candidate = fetch(&*self.store.candidates, &assignment.candidate_id)?;
            candidate_of.insert(assignment.id, candidate);
        }

        let mut histories: Vec<VoterHistory> = Vec::new();
        let mut slot_of: HashMap<VoterId, usize> = HashMap::new();

        for vote in &votes {
            let slot = match slot_of.get(&vote.voter_id) {
                Some(&slot) => slot,
                None => {
                    let voter = fetch(&*self.store.voters, &vote.voter_id)?;
                    histories.push(VoterHistory {
                        voter_id: voter.id,
                        shareholder_id: voter.shareholder_id.clone(),
                        voter_name: voter.name.clone(),
                        voting_weight: voter.voting_weight,
                        votes: Vec::new(),
                    });
                    slot_of.insert(vote.voter_id, histories.len() - 1);
                    histories.len() - 1
                }
            };

            let candidate = candidate_of.get(&vote.assignment_id).ok_or_else(|| {
                Error::internal(format!(
                    "Vote {} references unknown assignment {}",
                    vote.id, vote.assignment_id
                ))
            })?;
            let history = &mut histories[slot];
            history.votes.push(CastVote {
                candidate_id: candidate.id,
                candidate_name: candidate.full_name.clone(),
                weight: history.voting_weight,
                cast_at: vote.created_at,
            });
        }

        debug!(position = %position_id, voters = histories.len(), "voter history built");
        Ok(histories)
    }

    pub fn voter_history_by_position_paginated(
        &self,
        position_id: PositionId,
        pagination: Pagination,
    ) -> Result<Page<VoterHistory>> {
        let pagination = pagination.clamp(self.config.max_page_size);
        let all = self.voter_history_by_position(position_id)?;
        Ok(pagination.result(all))
    }
}
