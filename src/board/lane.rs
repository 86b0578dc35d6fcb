use std::fmt;
use std::str::FromStr;

use claimboard_common::{Job, JobStatus};
use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

/// Board column. Derived from a job's status and assignment; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneId {
    Unassigned,
    InProgress,
    Review,
    Done,
}

impl LaneId {
    /// Left-to-right board order.
    pub const ALL: [LaneId; 4] = [
        LaneId::Unassigned,
        LaneId::InProgress,
        LaneId::Review,
        LaneId::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaneId {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unassigned" => Ok(Self::Unassigned),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            _ => Err(BoardError::UnknownLane(s.to_string())),
        }
    }
}

/// Lane for a `(status, assigned count)` pair. Rule order matters: closeout
/// and review win over assignment state.
pub fn lane_for(status: JobStatus, assigned: usize) -> LaneId {
    if status == JobStatus::Closeout {
        LaneId::Done
    } else if status == JobStatus::Review {
        LaneId::Review
    } else if assigned > 0 && status.is_field_work() {
        LaneId::InProgress
    } else {
        LaneId::Unassigned
    }
}

pub fn lane_of(job: &Job) -> LaneId {
    lane_for(job.status, job.assigned_user_ids.len())
}

/// Legal lane moves. Every lane may move to every other lane except out of
/// `Done`; staying put is always legal (a no-op).
pub fn is_legal(from: LaneId, to: LaneId) -> bool {
    from == to || from != LaneId::Done
}
