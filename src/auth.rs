use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

use crate::error::Error;
use crate::traits::{AccountApi, SessionEnded, SessionObserver};
use crate::types::{Credentials, Registration, User, UserSummary};

/// Where the client stands with respect to authentication.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Startup, nothing determined yet.
    #[default]
    Unknown,
    /// A token is present and the profile fetch is in flight.
    Checking,
    Authenticated(User),
    Anonymous,
}

impl AuthState {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Published value of an [`AuthSession`]: the state plus the last
/// user-facing error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub error: Option<String>,
}

/// Result of a registration attempt that should lead to the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The account was created.
    Registered { user: UserSummary },
    /// The username or email is taken; the user probably wants to log in.
    AlreadyRegistered { username: String },
}

impl RegistrationOutcome {
    /// Username to prefill the login form with.
    #[must_use]
    pub fn login_username(&self) -> &str {
        match self {
            Self::Registered { user } => &user.username,
            Self::AlreadyRegistered { username } => username,
        }
    }
}

/// Tracks the current user for the token held by the session store.
///
/// State changes are published on a [`watch`] channel; see
/// [`subscribe`](Self::subscribe). A profile fetch that resolves after
/// [`logout`](Self::logout) is discarded. Every transition that drops the
/// session is also reported to the registered [`SessionObserver`]s.
pub struct AuthSession<A> {
    api: Arc<A>,
    snapshot: watch::Sender<AuthSnapshot>,
    epoch: AtomicU64,
    observers: Mutex<Vec<Weak<dyn SessionObserver>>>,
}

impl<A: AccountApi> AuthSession<A> {
    #[must_use]
    pub fn new(api: Arc<A>) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        Self {
            api,
            snapshot,
            epoch: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register `observer` to hear about every dropped session. Held weakly;
    /// dead observers are pruned on the next notification.
    pub fn observe(&self, observer: Weak<dyn SessionObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Receive every published [`AuthSnapshot`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.snapshot.borrow().state.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.snapshot.borrow().state.user().cloned()
    }

    /// A user is resolved for a stored token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().state.is_authenticated() && self.api.is_authenticated()
    }

    /// Rehydrate the session at startup.
    ///
    /// Without a token this goes straight to [`AuthState::Anonymous`] and makes
    /// no request. With one, the profile is fetched; any failure clears the
    /// token.
    pub async fn start(&self) -> AuthState {
        if !self.api.is_authenticated() {
            tracing::debug!("No session token, user is anonymous");
            self.publish(AuthState::Anonymous, None);
            return AuthState::Anonymous;
        }

        tracing::debug!("Session token found, loading profile");
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.publish(AuthState::Checking, None);
        // Failure is already published; the returned state carries the outcome.
        let _ = self.resolve_profile(epoch, "Failed to load user data").await;
        self.state()
    }

    /// Called once a token has been obtained and stored: loads the profile.
    ///
    /// # Errors
    ///
    /// Returns the profile fetch error. The token is cleared and the state
    /// becomes [`AuthState::Anonymous`].
    pub async fn login_success(&self) -> Result<User, Error> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.resolve_profile(epoch, "Failed to get user data after login")
            .await
    }

    /// Log in with credentials, then load the profile.
    ///
    /// # Errors
    ///
    /// Returns the login or profile error; its message is also published.
    /// A rejected login ends whatever session was current, since the service
    /// has already invalidated the stored token.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, Error> {
        if let Err(e) = self.api.login_user(credentials).await {
            tracing::warn!(username = credentials.username(), error = %e, "Login failed");
            if e.is_unauthorized() {
                self.end_session(Some(e.to_string()));
            } else {
                self.snapshot.send_modify(|s| s.error = Some(e.to_string()));
            }
            return Err(e);
        }
        self.login_success().await
    }

    /// Register an account.
    ///
    /// An "already registered" rejection is not an error: it yields
    /// [`RegistrationOutcome::AlreadyRegistered`] so the caller can switch to
    /// the login form.
    ///
    /// # Errors
    ///
    /// Any other failure of the registration request.
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<RegistrationOutcome, Error> {
        match self.api.register_user(registration).await {
            Ok(user) => Ok(RegistrationOutcome::Registered { user }),
            Err(e) if e.is_already_registered() => {
                tracing::info!(
                    username = registration.username(),
                    "Account already exists, redirecting to login"
                );
                Ok(RegistrationOutcome::AlreadyRegistered {
                    username: registration.username().to_owned(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// End the session, whatever the current state.
    pub fn logout(&self) {
        self.end_session(None);
        tracing::info!("Logged out");
    }

    /// Dismiss the published error.
    pub fn clear_error(&self) {
        self.snapshot.send_if_modified(|s| s.error.take().is_some());
    }

    async fn resolve_profile(&self, epoch: u64, failure: &str) -> Result<User, Error> {
        let result = self.api.get_current_user().await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::warn!("Session ended while the profile was loading, result discarded");
            return Err(Error::SessionEnded);
        }

        match result {
            Ok(user) => {
                tracing::info!(username = %user.username, "User authenticated");
                self.publish(AuthState::Authenticated(user.clone()), None);
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "{failure}");
                self.end_session(Some(failure.to_owned()));
                Err(e)
            }
        }
    }

    fn end_session(&self, error: Option<String>) {
        self.api.logout_user();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.publish(AuthState::Anonymous, error);

        let observers: Vec<_> = {
            let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.session_cleared();
        }
    }

    fn publish(&self, state: AuthState, error: Option<String>) {
        self.snapshot.send_replace(AuthSnapshot { state, error });
    }
}

impl<A: AccountApi> SessionEnded for AuthSession<A> {
    fn session_ended(&self) {
        tracing::warn!("Session expired, logging out");
        self.logout();
    }
}
