use std::sync::Arc;

use crate::auth::{AuthSession, AuthState, RegistrationOutcome};
use crate::error::Error;
use crate::notes::NotesViewModel;
use crate::traits::{AccountApi, NotesApi, SessionObserver};
use crate::types::{Credentials, Registration, User};

/// Wires the auth session and the notes view-model to one API.
///
/// A rejected token seen by a notes operation logs the session out. Whenever
/// the auth session is dropped, through [`logout`](Self::logout),
/// [`AuthSession::logout`] or a failed rehydration, the notes are cleared and
/// requests still in flight are discarded.
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use smartnotes_client::{ClientConfig, FileSessionStore, NotesApp};
///
/// let store = Arc::new(FileSessionStore::new("smartnotes.json"));
/// let app = NotesApp::connect(ClientConfig::from_env()?, store);
/// if app.start().await.is_authenticated() {
///     app.notes().add("Groceries", "Milk, eggs and bread").await?;
/// }
/// ```
pub struct NotesApp<A> {
    api: Arc<A>,
    auth: Arc<AuthSession<A>>,
    notes: Arc<NotesViewModel<A>>,
}

#[cfg(feature = "client")]
impl NotesApp<crate::api::ApiClient> {
    /// Build an app talking to the configured service.
    #[must_use]
    pub fn connect(
        config: crate::config::ClientConfig,
        store: Arc<dyn crate::traits::SessionStore>,
    ) -> Self {
        Self::new(Arc::new(crate::api::ApiClient::new(config, store)))
    }
}

impl<A: AccountApi + NotesApi> NotesApp<A> {
    #[must_use]
    pub fn new(api: Arc<A>) -> Self {
        let auth = Arc::new(AuthSession::new(api.clone()));
        let notes = Arc::new(NotesViewModel::new(api.clone(), auth.clone()));
        let observer: Arc<dyn SessionObserver> = notes.clone();
        auth.observe(Arc::downgrade(&observer));
        Self { api, auth, notes }
    }

    #[must_use]
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    #[must_use]
    pub fn auth(&self) -> &AuthSession<A> {
        &self.auth
    }

    #[must_use]
    pub fn notes(&self) -> &NotesViewModel<A> {
        &self.notes
    }

    /// Rehydrate the session and, if it holds, load the notes.
    pub async fn start(&self) -> AuthState {
        let state = self.auth.start().await;
        if state.is_authenticated() {
            // A failed load is published on the notes state.
            let _ = self.notes.load().await;
        }
        self.auth.state()
    }

    /// Log in, then load the notes of the new session.
    ///
    /// # Errors
    ///
    /// The login or profile error. A failing note load does not fail the login.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, Error> {
        let user = self.auth.login(credentials).await?;
        // A failed load is published on the notes state.
        let _ = self.notes.load().await;
        Ok(user)
    }

    /// # Errors
    ///
    /// See [`AuthSession::register`].
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<RegistrationOutcome, Error> {
        self.auth.register(registration).await
    }

    /// Same as [`AuthSession::logout`]; the notes go with the session.
    pub fn logout(&self) {
        self.auth.logout();
    }
}
