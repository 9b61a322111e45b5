//! JSON text frames exchanged over the push channel.

use firewatch_core::{EventDelta, EventRecord, QueryParams};
use serde::{Deserialize, Serialize};

/// Frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A record appeared.
    Created {
        /// New record.
        event: EventRecord,
    },
    /// A record changed.
    Updated {
        /// Replacement record.
        event: EventRecord,
    },
    /// A record ended.
    Resolved {
        /// Record being removed.
        event: EventRecord,
    },
    /// Answer to [`ClientMessage::GetCurrent`].
    Current {
        /// Current records for the requested scope.
        events: Vec<EventRecord>,
    },
}

impl ServerMessage {
    /// Delta carried by the frame, if it is one.
    #[must_use]
    pub fn into_delta(self) -> Option<EventDelta> {
        match self {
            Self::Created { event } => Some(EventDelta::Created(event)),
            Self::Updated { event } => Some(EventDelta::Updated(event)),
            Self::Resolved { event } => Some(EventDelta::Resolved(event)),
            Self::Current { .. } => None,
        }
    }
}

/// Frame sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Subscribe to deltas for a group.
    JoinGroup {
        /// Group key, see [`QueryParams::group_key`].
        key: String,
    },
    /// Unsubscribe from a group.
    LeaveGroup {
        /// Group key.
        key: String,
    },
    /// Request the current record set for a scope.
    GetCurrent {
        /// Requested scope.
        params: QueryParams,
    },
}
