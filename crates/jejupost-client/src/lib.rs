pub mod api;
pub mod auth;
pub mod error;

pub use api::{ApiClient, PostcardApi};
pub use auth::TokenStore;
pub use error::ClientError;
