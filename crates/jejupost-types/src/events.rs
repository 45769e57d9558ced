use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of the server-side send pipeline, as pushed over the per-postcard
/// status stream. Linear progression with a failure branch at any point:
///
/// translating → converting → generating → sending → completed
///                                                  ↘ failed
///
/// Closed set: an unrecognized status string fails deserialization and the
/// frame is dropped by the consumer instead of being passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Translating,
    Converting,
    Generating,
    Sending,
    Completed,
    Failed,
}

impl PipelineStatus {
    /// Terminal statuses end the stream; the consumer closes its connection
    /// as soon as one arrives.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Human-readable progress caption for UI rendering.
    pub fn caption(&self) -> &'static str {
        match self {
            Self::Translating => "Translating your message",
            Self::Converting => "Stylizing your photo",
            Self::Generating => "Composing the postcard",
            Self::Sending => "Sending",
            Self::Completed => "Delivered",
            Self::Failed => "Delivery failed",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Translating => "translating",
            Self::Converting => "converting",
            Self::Generating => "generating",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Payload of one status stream frame: `{"status": ..., "error": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: PipelineStatus,
    /// Error text accompanying a `failed` status.
    pub error: Option<String>,
}
