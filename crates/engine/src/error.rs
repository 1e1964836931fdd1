use thiserror::Error;
use warboard_protocol::{MarkerKind, MemberId, TeamKey};

/// Recoverable board failures. A failing operation leaves every collection
/// exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("{name} is already placed on the map")]
    AlreadyPlaced { member_id: MemberId, name: String },
    #[error("cannot place {what}: would exceed the maximum of {limit}")]
    CapacityExceeded { what: String, limit: usize },
    #[error("all players from {team} are already placed on the map")]
    NoEligibleMembers { team: TeamKey },
    #[error("group {group_id} only contains one team; nothing to split")]
    SingleTeamGroup { group_id: String },
    #[error("invalid board file: {reason}")]
    InvalidFormat { reason: String },
    #[error("no member with id {member_id}")]
    UnknownMember { member_id: MemberId },
    #[error("member {member_id} is not part of group {group_id}")]
    NotInGroup { group_id: String, member_id: MemberId },
    #[error("no group with id {group_id}")]
    UnknownGroup { group_id: String },
    #[error("no {kind} marker with id {id}")]
    UnknownMarker { kind: MarkerKind, id: String },
    #[error("invalid member: {reason}")]
    InvalidMember { reason: String },
    #[error("roster is full: maximum {limit} players allowed")]
    RosterFull { limit: usize },
}

impl BoardError {
    pub(crate) fn capacity(what: impl Into<String>, limit: usize) -> Self {
        Self::CapacityExceeded {
            what: what.into(),
            limit,
        }
    }

    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
