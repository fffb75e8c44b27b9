//! # Core Types for the Shareholder Election Core
//!
//! This module defines the records the election core works with. Every record
//! is plain data with validating constructors; state changes go through the
//! lifecycle controller and vote admission engine.
//!
//! ## Type Categories
//!
//! ### Identifiers
//! Opaque UUID newtypes ([`ElectionId`], [`PositionId`], [`VoterId`], ...) so
//! that a position id can never be passed where an issue id is expected.
//!
//! ### Lifecycle
//! - [`Status`]: the shared DRAFT → OPEN → CLOSED state
//! - [`Transition`]: the two moves the state machine knows
//!
//! ### Core Entities
//! - [`Election`], [`Position`], [`Issue`]: the campaign structure
//! - [`Candidate`], [`CandidateAssignment`]: who may receive votes, and where
//! - [`Voter`]: a shareholder with an exact decimal voting weight
//! - [`CandidateVote`], [`IssueVote`]: immutable rows of the vote log
//!
//! ## Usage Examples
//!
//! ```rust
//! use assembly_vote::types::{Position, ElectionId};
//!
//! let position = Position::new(
//!     ElectionId::new(),
//!     "Board of Directors",
//!     "Three seats up for election",
//!     Some(5),
//!     3,
//! )
//! .unwrap();
//!
//! assert_eq!(position.max_candidates, 5);
//! assert_eq!(position.max_votes, 3);
//! assert!(position.status.is_draft());
//! ```

use crate::{Error, Result, validation_error};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Identifier of an [`Election`]
    ElectionId
);
entity_id!(
    /// Identifier of a [`Position`]
    PositionId
);
entity_id!(
    /// Identifier of a [`Candidate`]
    CandidateId
);
entity_id!(
    /// Identifier of a [`CandidateAssignment`]
    AssignmentId
);
entity_id!(
    /// Identifier of an [`Issue`]
    IssueId
);
entity_id!(
    /// Identifier of a [`Voter`] record (not the shareholder business key)
    VoterId
);
entity_id!(
    /// Identifier of a [`CandidateVote`]
    CandidateVoteId
);
entity_id!(
    /// Identifier of an [`IssueVote`]
    IssueVoteId
);
entity_id!(
    /// Identifier of an authenticated operator, supplied by the identity collaborator
    UserId
);

/// Lifecycle state shared by elections, positions and issues
///
/// The state machine is strictly linear: `Draft → Open → Closed`. There is no
/// way back and no way to skip `Open`.
///
/// - **Draft** accepts structural changes (assignments, renames)
/// - **Open** accepts votes
/// - **Closed** accepts neither
///
/// ```rust
/// use assembly_vote::types::{Status, Transition, TransitionRejection};
///
/// assert_eq!(Status::Draft.apply(Transition::Activate), Ok(Status::Open));
/// assert_eq!(Status::Open.apply(Transition::Close), Ok(Status::Closed));
/// assert_eq!(
///     Status::Draft.apply(Transition::Close),
///     Err(TransitionRejection::Invalid)
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Draft,
    Open,
    Closed,
}

/// A move in the lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Activate,
    Close,
}

/// Why a [`Transition`] was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    /// `Activate` on something already open
    AlreadyActive,
    /// `Close` on something already closed
    AlreadyClosed,
    /// Any other move outside the linear path
    Invalid,
}

impl Status {
    /// Apply a transition, returning the new state
    pub fn apply(self, transition: Transition) -> std::result::Result<Status, TransitionRejection> {
        match (self, transition) {
            (Status::Draft, Transition::Activate) => Ok(Status::Open),
            (Status::Open, Transition::Activate) => Err(TransitionRejection::AlreadyActive),
            (Status::Closed, Transition::Activate) => Err(TransitionRejection::Invalid),
            (Status::Open, Transition::Close) => Ok(Status::Closed),
            (Status::Closed, Transition::Close) => Err(TransitionRejection::AlreadyClosed),
            (Status::Draft, Transition::Close) => Err(TransitionRejection::Invalid),
        }
    }

    pub fn is_draft(self) -> bool {
        self == Status::Draft
    }

    pub fn is_open(self) -> bool {
        self == Status::Open
    }

    pub fn is_closed(self) -> bool {
        self == Status::Closed
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Draft => "DRAFT",
            Status::Open => "OPEN",
            Status::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

impl Transition {
    /// Target state of a successful transition
    pub fn target(self) -> Status {
        match self {
            Transition::Activate => Status::Open,
            Transition::Close => Status::Closed,
        }
    }

    /// Past-tense verb used in audit records
    pub fn verb(self) -> &'static str {
        match self {
            Transition::Activate => "Activated",
            Transition::Close => "Closed",
        }
    }
}

/// Role carried by an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Runs the assembly: lifecycle, registration, assignment
    Admin,
    /// Enters votes on behalf of attending shareholders
    Clerk,
    /// Read-only access to tallies and reports
    Observer,
}

/// Authenticated caller identity, trusted as supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin() -> Self {
        Self::new(UserId::new(), Role::Admin)
    }

    pub fn clerk() -> Self {
        Self::new(UserId::new(), Role::Clerk)
    }

    pub fn observer() -> Self {
        Self::new(UserId::new(), Role::Observer)
    }

    /// Lifecycle and registration operations
    pub fn require_admin(&self, action: &str) -> Result<()> {
        match self.role {
            Role::Admin => Ok(()),
            role => Err(Error::forbidden(format!(
                "{action} requires the admin role (caller {} is {role:?})",
                self.user_id
            ))),
        }
    }

    /// Vote entry operations
    pub fn require_vote_entry(&self, action: &str) -> Result<()> {
        match self.role {
            Role::Admin | Role::Clerk => Ok(()),
            role => Err(Error::forbidden(format!(
                "{action} requires the admin or clerk role (caller {} is {role:?})",
                self.user_id
            ))),
        }
    }
}

/// An election campaign grouping positions and issues
///
/// Elections are created once and never deleted. Their status moves only
/// through the lifecycle controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    pub status: Status,
    /// Date of the general assembly
    pub election_day: NaiveDate,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Election {
    pub fn new(
        name: impl Into<String>,
        election_day: NaiveDate,
        created_by: UserId,
        status: Status,
    ) -> Result<Self> {
        let name = required("election name", name.into())?;
        Ok(Self {
            id: ElectionId::new(),
            name,
            status,
            election_day,
            created_by,
            created_at: Utc::now(),
        })
    }
}

/// A candidate race inside an election
///
/// `max_votes` bounds how many candidate votes one voter may cast in this
/// position across all candidates combined; `max_candidates` bounds how many
/// candidates may be assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub election_id: ElectionId,
    pub name: String,
    pub description: String,
    pub max_candidates: u32,
    pub max_votes: u32,
    pub status: Status,
}

impl Position {
    /// Create a DRAFT position. `max_candidates` defaults to 1.
    pub fn new(
        election_id: ElectionId,
        name: impl Into<String>,
        description: impl Into<String>,
        max_candidates: Option<u32>,
        max_votes: u32,
    ) -> Result<Self> {
        let name = required("position name", name.into())?;
        let max_candidates = max_candidates.unwrap_or(1);
        if max_candidates == 0 {
            return Err(validation_error!("max_candidates must be at least 1"));
        }
        if max_votes == 0 {
            return Err(validation_error!("max_votes must be at least 1"));
        }
        Ok(Self {
            id: PositionId::new(),
            election_id,
            name,
            description: description.into(),
            max_candidates,
            max_votes,
            status: Status::Draft,
        })
    }
}

/// A person standing for election, independent of any position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: CandidateId,
    pub full_name: String,
    pub manifesto: String,
    pub photo_url: Option<String>,
    /// Inactive candidates cannot be assigned to new positions
    pub active: bool,
}

impl Candidate {
    pub fn new(
        full_name: impl Into<String>,
        manifesto: impl Into<String>,
        photo_url: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            id: CandidateId::new(),
            full_name: required("candidate full name", full_name.into())?,
            manifesto: manifesto.into(),
            photo_url,
            active: true,
        })
    }

    /// Apply a partial update; `None` fields keep their current value
    pub fn apply(&mut self, patch: CandidatePatch) -> Result<()> {
        if let Some(full_name) = patch.full_name {
            self.full_name = required("candidate full name", full_name)?;
        }
        if let Some(manifesto) = patch.manifesto {
            self.manifesto = manifesto;
        }
        if let Some(photo_url) = patch.photo_url {
            self.photo_url = Some(photo_url);
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        Ok(())
    }
}

/// Partial update for a [`Candidate`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatePatch {
    pub full_name: Option<String>,
    pub manifesto: Option<String>,
    pub photo_url: Option<String>,
    pub active: Option<bool>,
}

/// Authorization for a candidate to receive votes in a position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateAssignment {
    pub id: AssignmentId,
    pub candidate_id: CandidateId,
    pub position_id: PositionId,
    pub election_id: ElectionId,
    pub assigned_at: DateTime<Utc>,
}

impl CandidateAssignment {
    pub fn new(candidate_id: CandidateId, position: &Position) -> Self {
        Self {
            id: AssignmentId::new(),
            candidate_id,
            position_id: position.id,
            election_id: position.election_id,
            assigned_at: Utc::now(),
        }
    }
}

/// A yes/no/abstain resolution put to the assembly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: IssueId,
    pub election_id: ElectionId,
    /// Globally unique across all elections
    pub title: String,
    pub description: String,
    pub status: Status,
}

impl Issue {
    pub fn new(
        election_id: ElectionId,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            id: IssueId::new(),
            election_id,
            title: required("issue title", title.into())?,
            description: description.into(),
            status: Status::Draft,
        })
    }
}

/// The fixed choices on every issue
///
/// Numeric ids follow the ballot forms: 1 = YES, 2 = NO, 3 = ABSTAIN.
///
/// ```rust
/// use assembly_vote::types::IssueOption;
///
/// assert_eq!(IssueOption::from_id(2).unwrap(), IssueOption::No);
/// assert!(IssueOption::from_id(4).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueOption {
    Yes,
    No,
    Abstain,
}

impl IssueOption {
    /// Every option, in ballot order
    pub const ALL: [IssueOption; 3] = [IssueOption::Yes, IssueOption::No, IssueOption::Abstain];

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(IssueOption::Yes),
            2 => Ok(IssueOption::No),
            3 => Ok(IssueOption::Abstain),
            other => Err(validation_error!("Invalid option id: {}", other)),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            IssueOption::Yes => 1,
            IssueOption::No => 2,
            IssueOption::Abstain => 3,
        }
    }
}

impl fmt::Display for IssueOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueOption::Yes => "YES",
            IssueOption::No => "NO",
            IssueOption::Abstain => "ABSTAIN",
        };
        f.write_str(name)
    }
}

/// A shareholder entitled to vote
///
/// Voters come from the shareholder registry. The core only ever flips the
/// attendance flag; the weight is read live whenever a tally is computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voter {
    pub id: VoterId,
    /// External business key from the shareholder registry
    pub shareholder_id: String,
    pub name: String,
    /// Set by the check-in process; votes are refused while false
    pub attendance: bool,
    /// Subscribed voting capital
    pub voting_weight: Decimal,
}

impl Voter {
    pub fn new(
        shareholder_id: impl Into<String>,
        name: impl Into<String>,
        voting_weight: Decimal,
        attendance: bool,
    ) -> Result<Self> {
        if voting_weight < Decimal::ZERO {
            return Err(validation_error!("voting weight must not be negative"));
        }
        Ok(Self {
            id: VoterId::new(),
            shareholder_id: required("shareholder id", shareholder_id.into())?,
            name: name.into(),
            attendance,
            voting_weight,
        })
    }
}

/// One voter applying their weight to one candidate within one position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateVote {
    pub id: CandidateVoteId,
    pub voter_id: VoterId,
    pub position_id: PositionId,
    pub assignment_id: AssignmentId,
    pub election_id: ElectionId,
    pub created_at: DateTime<Utc>,
}

/// One voter's single choice on one issue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueVote {
    pub id: IssueVoteId,
    pub voter_id: VoterId,
    pub issue_id: IssueId,
    pub election_id: ElectionId,
    pub option: IssueOption,
    pub created_at: DateTime<Utc>,
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_error!("{} must not be empty", field));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use Status::*;
        use Transition::*;

        assert_eq!(Draft.apply(Activate), Ok(Open));
        assert_eq!(Open.apply(Activate), Err(TransitionRejection::AlreadyActive));
        assert_eq!(Closed.apply(Activate), Err(TransitionRejection::Invalid));
        assert_eq!(Open.apply(Close), Ok(Closed));
        assert_eq!(Closed.apply(Close), Err(TransitionRejection::AlreadyClosed));
        assert_eq!(Draft.apply(Close), Err(TransitionRejection::Invalid));
    }

    #[test]
    fn test_position_validation() {
        let election = ElectionId::new();
        assert!(Position::new(election, "Board", "", Some(2), 0).is_err());
        assert!(Position::new(election, "Board", "", Some(0), 1).is_err());
        assert!(Position::new(election, "   ", "", None, 1).is_err());

        let position = Position::new(election, " Board ", "", None, 1).unwrap();
        assert_eq!(position.name, "Board");
        assert_eq!(position.max_candidates, 1);
    }

    #[test]
    fn test_voter_weight_must_not_be_negative() {
        assert!(Voter::new("SH-1", "Abebe", Decimal::new(-1, 0), true).is_err());
        assert!(Voter::new("SH-1", "Abebe", Decimal::ZERO, true).is_ok());
        assert!(Voter::new("", "Abebe", Decimal::ONE, true).is_err());
    }

    #[test]
    fn test_issue_option_ids_round_trip() {
        for option in IssueOption::ALL {
            assert_eq!(IssueOption::from_id(option.id()).unwrap(), option);
        }
        assert!(IssueOption::from_id(0).is_err());
    }

    #[test]
    fn test_candidate_patch_keeps_missing_fields() {
        let mut candidate =
            Candidate::new("Hanna Tesfaye", "Grow the dividend", Some("a.png".into())).unwrap();
        candidate
            .apply(CandidatePatch {
                manifesto: Some("Digital banking".into()),
                ..CandidatePatch::default()
            })
            .unwrap();
        assert_eq!(candidate.full_name, "Hanna Tesfaye");
        assert_eq!(candidate.manifesto, "Digital banking");
        assert_eq!(candidate.photo_url.as_deref(), Some("a.png"));

        let blank = CandidatePatch {
            full_name: Some(" ".into()),
            ..CandidatePatch::default()
        };
        assert!(candidate.apply(blank).is_err());
    }

    #[test]
    fn test_role_checks() {
        assert!(Caller::admin().require_admin("close").is_ok());
        assert!(Caller::clerk().require_admin("close").is_err());
        assert!(Caller::clerk().require_vote_entry("vote").is_ok());
        let err = Caller::observer().require_vote_entry("vote").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&Status::Open).unwrap();
        assert_eq!(json, "\"OPEN\"");
        let json = serde_json::to_string(&IssueOption::Abstain).unwrap();
        assert_eq!(json, "\"ABSTAIN\"");
    }
}
