use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Auth --

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

// -- Postcards --

/// Fields for the PATCH endpoint. Sent as a multipart form; `None` fields are
/// omitted so the server leaves them untouched. Only `writing` and `pending`
/// postcards accept updates.
#[derive(Debug, Clone, Default)]
pub struct UpdatePostcard {
    /// New message text; triggers dialect translation and image regeneration
    /// on the server.
    pub text: Option<String>,
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    /// New delivery time. The server treats a past time as "send now".
    pub scheduled_at: Option<DateTime<Utc>>,
    /// JPEG or PNG photo to place on the postcard.
    pub photo: Option<PhotoUpload>,
}

impl UpdatePostcard {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.recipient_email.is_none()
            && self.recipient_name.is_none()
            && self.sender_name.is_none()
            && self.scheduled_at.is_none()
            && self.photo.is_none()
    }
}

/// A photo attached to a postcard update.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    /// image/jpeg or image/png; anything else is rejected by the server.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Error body shape used by the backend: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
