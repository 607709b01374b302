use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{Error, detail_message};
use crate::traits::{AccountApi, NotesApi, SessionStore};
use crate::types::{
    AnalysisResult, Credentials, Note, NoteDraft, NoteId, Registration, SessionToken,
    TokenResponse, User, UserSummary,
};

/// REST client for the Smart Notes service.
///
/// Every request carries `Authorization: Bearer <token>` while a token is
/// stored. A 401 from any endpoint clears the store and surfaces as
/// [`Error::Unauthorized`].
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    session: Arc<dyn SessionStore>,
}

impl ApiClient {
    /// Create a client that reads and writes its token through `session`.
    #[must_use]
    pub fn new(config: ClientConfig, session: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            session,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    /// Fetch every note visible to the current user, in server order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the session is no longer valid,
    /// [`Error::Http`] for other rejections, [`Error::Network`] if the
    /// service is unreachable.
    pub async fn fetch_notes(&self) -> Result<Vec<Note>, Error> {
        let request = self.http.get(self.config.endpoint("notes")?);
        self.send(request, "fetch notes").await
    }

    /// Create a note. The service assigns `id` and `created_at`.
    ///
    /// # Errors
    ///
    /// As [`fetch_notes`](Self::fetch_notes); server-side validation failures
    /// carry the service's `detail` message.
    pub async fn create_note(&self, draft: &NoteDraft) -> Result<Note, Error> {
        let request = self.http.post(self.config.endpoint("notes")?).json(draft);
        self.send(request, "create note").await
    }

    /// Ask the service for the sentiment of a note.
    ///
    /// # Errors
    ///
    /// As [`fetch_notes`](Self::fetch_notes).
    pub async fn analyze_note(&self, id: NoteId) -> Result<AnalysisResult, Error> {
        let url = self.config.endpoint(&format!("notes/{id}/analyze"))?;
        self.send(self.http.get(url), "analyze note").await
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// A duplicate username or email is reported as a 400 [`Error::Http`];
    /// see [`Error::is_already_registered`].
    pub async fn register_user(&self, registration: &Registration) -> Result<UserSummary, Error> {
        let request = self
            .http
            .post(self.config.endpoint("users/register")?)
            .json(registration);
        let user: UserSummary = self.send(request, "register").await?;
        tracing::info!(username = %user.username, "Registered new account");
        Ok(user)
    }

    /// Log in and store the returned token.
    ///
    /// # Errors
    ///
    /// Wrong credentials come back as [`Error::Unauthorized`] carrying the
    /// service's message.
    pub async fn login_user(&self, credentials: &Credentials) -> Result<TokenResponse, Error> {
        let request = self
            .http
            .post(self.config.endpoint("users/login")?)
            .json(credentials);
        let response: TokenResponse = self.send(request, "login").await?;
        self.session.set(response.access_token.clone())?;
        tracing::info!(username = credentials.username(), "Login succeeded, token stored");
        Ok(response)
    }

    /// Fetch the profile belonging to the stored token.
    ///
    /// # Errors
    ///
    /// As [`fetch_notes`](Self::fetch_notes).
    pub async fn get_current_user(&self) -> Result<User, Error> {
        let request = self.http.get(self.config.endpoint("users/me")?);
        self.send(request, "current user").await
    }

    /// Forget the stored token.
    pub fn logout_user(&self) {
        if let Err(e) = self.session.clear() {
            tracing::warn!(error = %e, "Failed to clear session token");
        }
    }

    /// Whether a token is stored. No validity check.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn token(&self) -> Option<SessionToken> {
        self.session.get().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read session token, treating as absent");
            None
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, Error> {
        let request = match self.token() {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        };

        let response = request.send().await.inspect_err(|e| {
            tracing::warn!(operation, error = %e, "Request failed before a response arrived");
        })?;
        let status = response.status();
        tracing::debug!(operation, status = status.as_u16(), "Response received");

        if status == StatusCode::UNAUTHORIZED {
            let body = response.bytes().await.unwrap_or_default();
            self.logout_user();
            tracing::warn!(operation, "Session rejected by service, token cleared");
            return Err(Error::Unauthorized {
                message: detail_message(status.as_u16(), &body),
            });
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: detail_message(status.as_u16(), &body),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(operation, error = %e, "Malformed response body");
            Error::Http {
                status: status.as_u16(),
                message: format!("Invalid response format from server ({operation}): {e}"),
            }
        })
    }
}

impl NotesApi for ApiClient {
    async fn fetch_notes(&self) -> Result<Vec<Note>, Error> {
        ApiClient::fetch_notes(self).await
    }

    async fn create_note(&self, draft: &NoteDraft) -> Result<Note, Error> {
        ApiClient::create_note(self, draft).await
    }

    async fn analyze_note(&self, id: NoteId) -> Result<AnalysisResult, Error> {
        ApiClient::analyze_note(self, id).await
    }
}

impl AccountApi for ApiClient {
    async fn register_user(&self, registration: &Registration) -> Result<UserSummary, Error> {
        ApiClient::register_user(self, registration).await
    }

    async fn login_user(&self, credentials: &Credentials) -> Result<TokenResponse, Error> {
        ApiClient::login_user(self, credentials).await
    }

    async fn get_current_user(&self) -> Result<User, Error> {
        ApiClient::get_current_user(self).await
    }

    fn logout_user(&self) {
        ApiClient::logout_user(self);
    }

    fn is_authenticated(&self) -> bool {
        ApiClient::is_authenticated(self)
    }
}
