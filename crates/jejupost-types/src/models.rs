use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse lifecycle of a postcard, from draft to delivered.
///
/// `Cancelled` is legacy — the current backend deletes instead of cancelling,
/// but older records still carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Writing,
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

impl LifecycleStatus {
    /// Query-parameter value for the list endpoint's status filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Writing => "writing",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "writing" => Ok(Self::Writing),
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// One postcard record as returned by the server.
///
/// Most fields are optional: a blank postcard fresh out of `create` has only
/// an id, a template and a `writing` status. `sent_at` and `postcard_path`
/// are populated once the send pipeline has produced output; `scheduled_at`
/// is only meaningful before sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postcard {
    pub id: String,
    pub template_id: Option<String>,
    /// Message text after dialect translation.
    pub text: Option<String>,
    /// Message text as the user typed it.
    pub original_text: Option<String>,
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub status: LifecycleStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Path of the generated composite image.
    pub postcard_path: Option<String>,
    /// URL of the photo the user attached, if any.
    pub user_photo_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Postcard {
    /// Whether the send pipeline is currently running for this postcard,
    /// i.e. whether a live status stream is worth opening.
    pub fn is_processing(&self) -> bool {
        self.status == LifecycleStatus::Processing
    }
}
