use std::future::Future;

use crate::error::Error;
use crate::types::{
    AnalysisResult, Credentials, Note, NoteDraft, NoteId, Registration, SessionToken,
    TokenResponse, User, UserSummary,
};

/// Holder of the (at most one) session token.
///
/// Pure storage: no validation of token shape or expiry. Expiry is only
/// detected when the service rejects a request.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for KeychainStore {
///     fn get(&self) -> Result<Option<SessionToken>, Error> {
///         self.keychain.find("smartnotes").map(|s| s.map(SessionToken::new))
///     }
///     fn set(&self, token: SessionToken) -> Result<(), Error> {
///         self.keychain.save("smartnotes", token.as_str())
///     }
///     fn clear(&self) -> Result<(), Error> {
///         self.keychain.delete("smartnotes")
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Current token, if any.
    fn get(&self) -> Result<Option<SessionToken>, Error>;

    /// Replace the stored token.
    fn set(&self, token: SessionToken) -> Result<(), Error>;

    /// Drop the stored token. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), Error>;
}

/// Note operations of the remote service.
pub trait NotesApi: Send + Sync + 'static {
    /// `GET /notes`
    fn fetch_notes(&self) -> impl Future<Output = Result<Vec<Note>, Error>> + Send;

    /// `POST /notes`
    fn create_note(&self, draft: &NoteDraft) -> impl Future<Output = Result<Note, Error>> + Send;

    /// `GET /notes/{id}/analyze`
    fn analyze_note(&self, id: NoteId)
    -> impl Future<Output = Result<AnalysisResult, Error>> + Send;
}

/// Account and session operations of the remote service.
pub trait AccountApi: Send + Sync + 'static {
    /// `POST /users/register`
    fn register_user(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<UserSummary, Error>> + Send;

    /// `POST /users/login`. Stores the returned token on success.
    fn login_user(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<TokenResponse, Error>> + Send;

    /// `GET /users/me`
    fn get_current_user(&self) -> impl Future<Output = Result<User, Error>> + Send;

    /// Forget the stored token.
    fn logout_user(&self);

    /// Whether a token is present. Says nothing about its validity.
    fn is_authenticated(&self) -> bool;
}

/// Receiver of the "session ended" signal raised when a note operation
/// learns that the token is no longer accepted.
pub trait SessionEnded: Send + Sync {
    fn session_ended(&self);
}

/// Notified by [`AuthSession`](crate::AuthSession) whenever the session is
/// dropped: logout, a rejected token, or a failed profile fetch.
pub trait SessionObserver: Send + Sync {
    fn session_cleared(&self);
}
