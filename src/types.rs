use std::fmt;
use std::str::FromStr;

use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::Error;

/// Minimum note body length accepted by the service.
pub const MIN_CONTENT_LEN: usize = 10;
/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;
/// Minimum username length accepted at registration.
pub const MIN_USERNAME_LEN: usize = 3;

/// Server-assigned note identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    FromStr, From, Into,
)]
#[serde(transparent)]
pub struct NoteId(pub i64);

/// Server-assigned user identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Sentiment label attached to a note by the remote analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point in time as reported by the service.
///
/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC, which is what the
/// service emits for naive datetimes). Always serialized as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    #[must_use]
    pub fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(dt: OffsetDateTime) -> Self {
        Self(dt)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OffsetDateTime::parse(s, &Rfc3339)
            .or_else(|_| PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).map(|p| p.assume_utc()))
            .map(Self)
            .map_err(|e| Error::Validation(format!("invalid timestamp '{s}': {e}")))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = self.0.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A note as stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
}

impl Note {
    /// Create a note without sentiment, as returned right after creation.
    #[must_use]
    pub fn new(
        id: NoteId,
        title: impl Into<String>,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
            created_at,
            updated_at: None,
            sentiment: None,
        }
    }

    /// Set the sentiment.
    #[must_use]
    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }
}

/// Response of `GET /notes/{id}/analyze`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AnalysisResult {
    #[serde(default)]
    pub id: Option<NoteId>,
    pub sentiment: Sentiment,
}

impl AnalysisResult {
    #[must_use]
    pub fn new(sentiment: Sentiment) -> Self {
        Self {
            id: None,
            sentiment,
        }
    }
}

/// Profile of the authenticated user (`GET /users/me`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl User {
    #[must_use]
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            is_active: None,
            created_at: None,
        }
    }
}

/// Account returned by registration; same schema as the profile.
pub type UserSummary = User;

/// Token response from `POST /users/login`.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: SessionToken,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".into()
}

/// Opaque bearer credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Validated input for `POST /notes`.
///
/// Holding a `NoteDraft` proves the title is not blank and the content has
/// at least [`MIN_CONTENT_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteDraft {
    title: String,
    content: String,
}

impl NoteDraft {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank title or short content.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Result<Self, Error> {
        let title = title.into();
        let content = content.into();
        if title.trim().is_empty() {
            return Err(Error::Validation("Please provide a title.".into()));
        }
        if content.chars().count() < MIN_CONTENT_LEN {
            return Err(Error::Validation(format!(
                "Content must be at least {MIN_CONTENT_LEN} characters long."
            )));
        }
        Ok(Self { title, content })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Validated login form.
#[derive(Clone, Serialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if either field is empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, Error> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return Err(Error::Validation(
                "Please enter both username and password".into(),
            ));
        }
        Ok(Self { username, password })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Validated registration form. The confirmation is checked, then dropped.
#[derive(Clone, Serialize)]
pub struct Registration {
    username: String,
    email: String,
    password: String,
}

impl Registration {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a field is missing, the username or
    /// password is too short, the email is malformed, or the passwords differ.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl AsRef<str>,
    ) -> Result<Self, Error> {
        let username = username.into();
        let email = email.into();
        let password = password.into();
        let confirm_password = confirm_password.as_ref();

        if username.is_empty() || email.is_empty() || password.is_empty() || confirm_password.is_empty()
        {
            return Err(Error::Validation("Please fill in all fields".into()));
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(Error::Validation(format!(
                "Username must be at least {MIN_USERNAME_LEN} characters long"
            )));
        }
        if !email.contains('@') {
            return Err(Error::Validation("Please enter a valid email address".into()));
        }
        if password != confirm_password {
            return Err(Error::Validation("Passwords do not match".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        Ok(Self {
            username,
            email,
            password,
        })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}
