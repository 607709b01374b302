#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod notes;
pub mod session;
pub mod traits;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "client")]
pub use api::ApiClient;
pub use app::NotesApp;
pub use auth::{AuthSession, AuthSnapshot, AuthState, RegistrationOutcome};
pub use config::ClientConfig;
pub use error::Error;
pub use notes::{NotesState, NotesViewModel};
pub use session::{FileSessionStore, MemorySessionStore};
pub use traits::{AccountApi, NotesApi, SessionEnded, SessionObserver, SessionStore};
pub use types::{
    AnalysisResult, Credentials, Note, NoteDraft, NoteId, Registration, Sentiment, SessionToken,
    Timestamp, TokenResponse, User, UserId, UserSummary,
};
