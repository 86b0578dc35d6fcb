//! Live document feed.
//!
//! Every committed write is published as a [`FeedEvent`] tagged with the
//! document id. Subscribers filter by their own scope; the feed itself does
//! not know about scopes.

use claimboard_common::{Department, Job, Office, User};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedEvent {
    JobChanged { job: Job },
    UserChanged { user: User },
    OfficeChanged { office: Office },
    DepartmentChanged { department: Department },
}

impl FeedEvent {
    pub fn collection(&self) -> &'static str {
        match self {
            Self::JobChanged { .. } => "jobs",
            Self::UserChanged { .. } => "users",
            Self::OfficeChanged { .. } => "offices",
            Self::DepartmentChanged { .. } => "departments",
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            Self::JobChanged { job } => job.id.as_str(),
            Self::UserChanged { user } => user.id.as_str(),
            Self::OfficeChanged { office } => office.id.as_str(),
            Self::DepartmentChanged { department } => department.id.as_str(),
        }
    }
}

#[derive(Clone)]
pub struct LiveFeed {
    tx: broadcast::Sender<FeedEvent>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Returns silently even if nobody is listening.
    pub fn publish(&self, event: FeedEvent) {
        tracing::trace!(
            collection = event.collection(),
            document_id = event.document_id(),
            "feed publish"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
