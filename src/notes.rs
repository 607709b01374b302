//! Notes view-model: the note list, its loading indicator, the last error
//! and the set of notes awaiting sentiment analysis.
//!
//! Operations take `&self`, so a caller may have several in flight on one
//! task (for example two `analyze` calls for different notes). `load` and
//! `add` are not serialized: if both are in flight, whichever completes last
//! decides the final list. A `load` finishing after an `add` replaces the
//! list with the server's view, which already includes the new note.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::Error;
use crate::traits::{NotesApi, SessionEnded, SessionObserver};
use crate::types::{Note, NoteDraft, NoteId, Sentiment};

const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

/// Published state of a [`NotesViewModel`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesState {
    /// Newest-first after local additions; server order after a reload.
    pub notes: Vec<Note>,
    /// Last user-facing error. Never clears `notes`.
    pub error: Option<String>,
    /// Pending-analysis set.
    pub pending: HashSet<NoteId>,
    in_flight: usize,
}

impl NotesState {
    /// A `load` or `add` is in flight.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    #[must_use]
    pub fn is_pending(&self, id: NoteId) -> bool {
        self.pending.contains(&id)
    }

    #[must_use]
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }
}

/// Note list and per-note analysis state for the signed-in user.
pub struct NotesViewModel<N> {
    api: Arc<N>,
    session: Arc<dyn SessionEnded>,
    state: watch::Sender<NotesState>,
    epoch: AtomicU64,
}

impl<N: NotesApi> NotesViewModel<N> {
    /// `session` is told when an operation finds the token rejected.
    #[must_use]
    pub fn new(api: Arc<N>, session: Arc<dyn SessionEnded>) -> Self {
        let (state, _) = watch::channel(NotesState::default());
        Self {
            api,
            session,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotesState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> NotesState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn notes(&self) -> Vec<Note> {
        self.state.borrow().notes.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading()
    }

    #[must_use]
    pub fn is_pending(&self, id: NoteId) -> bool {
        self.state.borrow().is_pending(id)
    }

    /// Replace the list with the server's.
    ///
    /// On failure the previous notes stay and the error is published.
    ///
    /// # Errors
    ///
    /// The fetch error, or [`Error::SessionEnded`] if the view-model was reset
    /// while the request was in flight.
    pub async fn load(&self) -> Result<(), Error> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _loading = InFlight::start(self, epoch);

        let result = self.api.fetch_notes().await;
        self.ensure_current(epoch)?;

        match result {
            Ok(notes) => {
                tracing::debug!(count = notes.len(), "Notes loaded");
                self.state.send_modify(|s| {
                    s.notes = notes;
                    s.error = None;
                });
                Ok(())
            }
            Err(e) => {
                self.fail(&e, "Failed to load notes");
                Err(e)
            }
        }
    }

    /// Create a note and put it at the front of the list.
    ///
    /// Input is validated first; invalid input is rejected without a request.
    /// Callers should only reset their form on `Ok`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a blank title or content shorter than ten
    /// characters, otherwise the request error.
    pub async fn add(&self, title: &str, content: &str) -> Result<Note, Error> {
        let draft = match NoteDraft::new(title, content) {
            Ok(draft) => draft,
            Err(e) => {
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                return Err(e);
            }
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        let _loading = InFlight::start(self, epoch);

        let result = self.api.create_note(&draft).await;
        self.ensure_current(epoch)?;

        match result {
            Ok(note) => {
                tracing::debug!(id = %note.id, "Note created");
                self.state.send_modify(|s| s.notes.insert(0, note.clone()));
                Ok(note)
            }
            Err(e) => {
                self.fail(&e, "Failed to add note");
                Err(e)
            }
        }
    }

    /// Request the sentiment of a note and attach it in place.
    ///
    /// Nothing is requested when the note is unknown, already analyzed (its
    /// sentiment is returned as is), or already pending. Returns `None` on
    /// failure.
    pub async fn analyze(&self, id: NoteId) -> Option<Sentiment> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut existing = None;
        let admitted = self.state.send_if_modified(|s| {
            let Some(note) = s.note(id) else {
                return false;
            };
            if note.sentiment.is_some() {
                existing = note.sentiment;
                return false;
            }
            s.pending.insert(id)
        });
        if !admitted {
            tracing::debug!(%id, "Analysis skipped");
            return existing;
        }
        let _pending = Pending::new(self, epoch, id);

        let result = self.api.analyze_note(id).await;
        if self.ensure_current(epoch).is_err() {
            return None;
        }

        match result {
            Ok(analysis) => {
                let sentiment = analysis.sentiment;
                tracing::debug!(%id, %sentiment, "Note analyzed");
                self.state.send_modify(|s| {
                    if let Some(note) = s.notes.iter_mut().find(|n| n.id == id) {
                        note.sentiment = Some(sentiment);
                    }
                });
                Some(sentiment)
            }
            Err(e) => {
                self.fail(&e, "Failed to analyze note");
                None
            }
        }
    }

    /// Dismiss the published error.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Forget everything, as on logout. Results of requests still in flight
    /// will be discarded.
    pub fn reset(&self) {
        self.reset_with(None);
    }

    fn reset_with(&self, error: Option<String>) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(NotesState {
            error,
            ..NotesState::default()
        });
    }

    fn ensure_current(&self, epoch: u64) -> Result<(), Error> {
        if self.epoch.load(Ordering::SeqCst) == epoch {
            Ok(())
        } else {
            tracing::warn!("Session ended during a notes request, result discarded");
            Err(Error::SessionEnded)
        }
    }

    fn fail(&self, e: &Error, context: &str) {
        if e.is_unauthorized() {
            tracing::warn!(error = %e, "{context}: session rejected");
            // Ending the session may reset this view-model through its
            // observer hook, so the expiry message is published afterwards.
            self.session.session_ended();
            self.reset_with(Some(SESSION_EXPIRED.into()));
            return;
        }
        tracing::error!(error = %e, "{context}");
        let message = format!("{context}: {e}");
        self.state.send_modify(|s| s.error = Some(message));
    }
}

impl<N: NotesApi> SessionObserver for NotesViewModel<N> {
    fn session_cleared(&self) {
        tracing::debug!("Session cleared, dropping notes");
        self.reset();
    }
}

/// Holds the loading indicator up until dropped, whatever the outcome.
struct InFlight<'a> {
    state: &'a watch::Sender<NotesState>,
    epoch: &'a AtomicU64,
    started: u64,
}

impl<'a> InFlight<'a> {
    fn start<N>(vm: &'a NotesViewModel<N>, started: u64) -> Self {
        vm.state.send_modify(|s| s.in_flight += 1);
        Self {
            state: &vm.state,
            epoch: &vm.epoch,
            started,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // A reset already zeroed the counter.
        if self.epoch.load(Ordering::SeqCst) == self.started {
            self.state
                .send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
        }
    }
}

/// Removes a note from the pending-analysis set when dropped.
struct Pending<'a> {
    state: &'a watch::Sender<NotesState>,
    epoch: &'a AtomicU64,
    started: u64,
    id: NoteId,
}

impl<'a> Pending<'a> {
    fn new<N>(vm: &'a NotesViewModel<N>, started: u64, id: NoteId) -> Self {
        Self {
            state: &vm.state,
            epoch: &vm.epoch,
            started,
            id,
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.epoch.load(Ordering::SeqCst) == self.started {
            let id = self.id;
            self.state.send_if_modified(|s| s.pending.remove(&id));
        }
    }
}
