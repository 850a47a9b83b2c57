//! Passage session: the currently displayed passage and its commentary.
//!
//! A session owns one passage identity at a time. Every selection or refresh
//! takes a new monotonic token; a resolution only writes into session state
//! while its token is still current, so a result for a passage the user has
//! already moved away from is dropped instead of shown.

use std::sync::{Arc, Mutex};

use lectio_core::{CommentaryRecord, PassageAnchor};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::ResolveError;
use crate::resolver::{CommentaryResolver, Resolution, ResolutionPhase};

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading { phase: ResolutionPhase },
    Resolved(CommentaryRecord),
    /// A single user-facing error sentence.
    Errored(String),
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading { .. })
    }
}

/// How a `select` or `refresh` call ended for its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The record was written into session state.
    Applied(CommentaryRecord),
    /// The error message was written into session state.
    Failed(String),
    /// Another selection replaced this one; session state was not touched.
    Superseded,
}

struct Current {
    token: u64,
    anchor: Option<PassageAnchor>,
    cancel: CancellationToken,
}

/// Explicit holder of the current passage identity.
pub struct PassageSession {
    resolver: Arc<CommentaryResolver>,
    current: Mutex<Current>,
    state: watch::Sender<SessionState>,
}

impl PassageSession {
    pub fn new(resolver: Arc<CommentaryResolver>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            resolver,
            current: Mutex::new(Current {
                token: 0,
                anchor: None,
                cancel: CancellationToken::new(),
            }),
            state,
        }
    }

    /// Show `anchor`, replacing whatever was selected before.
    ///
    /// Selecting the passage that is already loading joins that resolution.
    pub async fn select(&self, anchor: PassageAnchor) -> SessionOutcome {
        let same_passage = self
            .current()
            .is_some_and(|current| current.identity() == anchor.identity());
        let joining = same_passage && self.state().is_loading();

        let (token, cancel) = if joining {
            let current = self.lock();
            tracing::debug!(token = current.token, passage = %anchor, "Joining current selection");
            (current.token, current.cancel.clone())
        } else {
            self.replace(Some(anchor.clone()))
        };

        let resolution = self.resolver.begin(&anchor);
        self.drive(token, cancel, resolution).await
    }

    /// Discard cached commentary for the current passage and resolve it again.
    pub async fn refresh(&self) -> SessionOutcome {
        let anchor = self.lock().anchor.clone();
        let Some(anchor) = anchor else {
            return SessionOutcome::Failed("Select a passage before refreshing.".to_string());
        };

        let (token, cancel) = self.replace(Some(anchor.clone()));
        let resolution = self.resolver.begin_refresh(&anchor);
        self.drive(token, cancel, resolution).await
    }

    /// Abandon any resolution in progress. A loading session returns to idle;
    /// a resolved or errored one keeps what it shows.
    pub fn cancel(&self) {
        let mut current = self.lock();
        current.cancel.cancel();
        current.cancel = CancellationToken::new();
        current.token += 1;
        self.state.send_if_modified(|state| {
            if state.is_loading() {
                *state = SessionState::Idle;
                true
            } else {
                false
            }
        });
        tracing::debug!(token = current.token, "Session cancelled");
    }

    /// The passage currently selected, if any.
    pub fn current(&self) -> Option<PassageAnchor> {
        self.lock().anchor.clone()
    }

    /// Identity token of the current selection.
    pub fn token(&self) -> u64 {
        self.lock().token
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Cancelled as soon as the current selection is replaced or cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.lock().cancel.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Current> {
        // Current holds plain data; a poisoned guard is still consistent
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a new token for `anchor` and cancel the previous one.
    fn replace(&self, anchor: Option<PassageAnchor>) -> (u64, CancellationToken) {
        let mut current = self.lock();
        current.cancel.cancel();
        current.cancel = CancellationToken::new();
        current.token += 1;
        current.anchor = anchor;
        self.state.send_replace(SessionState::Loading {
            phase: ResolutionPhase::Validating,
        });
        tracing::debug!(
            token = current.token,
            passage = ?current.anchor.as_ref().map(ToString::to_string),
            "Passage selected"
        );
        (current.token, current.cancel.clone())
    }

    async fn drive(
        &self,
        token: u64,
        cancel: CancellationToken,
        resolution: Result<Resolution, ResolveError>,
    ) -> SessionOutcome {
        let resolution = match resolution {
            Ok(resolution) => resolution,
            Err(err) => return self.apply(token, Err(err)),
        };

        let mut phases = resolution.phases();
        let outcome = resolution.outcome();
        tokio::pin!(outcome);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(token, "Selection superseded while loading");
                    return SessionOutcome::Superseded;
                }
                result = &mut outcome => return self.apply(token, result),
                changed = phases.changed() => {
                    if changed.is_err() {
                        // The walk has finished; only the outcome is left
                        return tokio::select! {
                            biased;
                            _ = cancel.cancelled() => SessionOutcome::Superseded,
                            result = &mut outcome => self.apply(token, result),
                        };
                    }
                    let phase = *phases.borrow_and_update();
                    if !phase.is_terminal() {
                        self.publish(token, SessionState::Loading { phase });
                    }
                }
            }
        }
    }

    /// Write a finished resolution into state if `token` is still current.
    fn apply(&self, token: u64, result: Result<CommentaryRecord, ResolveError>) -> SessionOutcome {
        let current = self.lock();
        if current.token != token {
            tracing::debug!(token, current = current.token, "Discarding stale resolution");
            return SessionOutcome::Superseded;
        }
        match result {
            Ok(record) => {
                self.state.send_replace(SessionState::Resolved(record.clone()));
                SessionOutcome::Applied(record)
            }
            Err(err) => {
                let message = err.user_message();
                self.state.send_replace(SessionState::Errored(message.clone()));
                SessionOutcome::Failed(message)
            }
        }
    }

    fn publish(&self, token: u64, state: SessionState) {
        let current = self.lock();
        if current.token == token {
            self.state.send_replace(state);
        }
    }
}

impl std::fmt::Debug for PassageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.lock();
        f.debug_struct("PassageSession")
            .field("token", &current.token)
            .field("anchor", &current.anchor)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
