//! Conversion session state machine.
//!
//! A [`ConversionSession`] tracks one user-driven attempt to select, convert and
//! save a single image:
//!
//! ```text
//! Idle --select--> ImageSelected --convert--> Converting --ok--> Converted
//!                        ^                        |                  |
//!                        |                        +--err--> Failed   |
//!                        +----------select (from any state)----------+
//! ```
//!
//! `Failed` may go straight back to `Converting`. Every `select_image` and every
//! started `convert` bumps a sequence number; a service response is applied only
//! if its request still carries the current number, so a slow stale response can
//! never overwrite newer state.

use crate::convert::ConversionService;
use crate::error::ErrorInfo;
use crate::models::{Format, ImageRef, SessionStatus};
use crate::persist::{PersistenceAdapter, SavedImage};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a finished `convert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    Converted(ImageRef),
    /// A newer selection or conversion replaced this request; nothing was applied.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedImage {
    pub image: ImageRef,
    /// Format captured when the conversion started.
    pub format: Format,
}

#[derive(Debug)]
struct SessionState {
    source_image: Option<ImageRef>,
    target_format: Format,
    status: SessionStatus,
    result: Option<ConvertedImage>,
    last_error: Option<ErrorInfo>,
    sequence: u64,
}

/// Read-only view of a session for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: SessionStatus,
    pub source_image: Option<ImageRef>,
    pub target_format: Format,
    pub result: Option<ConvertedImage>,
    pub last_error: Option<ErrorInfo>,
}

impl SessionSnapshot {
    /// Caption for the converted-image preview pane.
    pub fn preview_label(&self) -> String {
        match &self.result {
            Some(converted) => format!("Converted ({})", converted.format),
            None => format!(
                "Will be converted to {}",
                self.target_format.extension().to_uppercase()
            ),
        }
    }
}

pub struct ConversionSession {
    id: Uuid,
    service: Arc<dyn ConversionService>,
    persistence: Arc<dyn PersistenceAdapter>,
    state: Mutex<SessionState>,
}

/// Puts an abandoned request's session back to `ImageSelected` when the
/// `convert` future is dropped before the service answers.
struct InFlight<'a> {
    session: &'a ConversionSession,
    ticket: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.session.state();
        if state.sequence == self.ticket && state.status == SessionStatus::Converting {
            warn!(
                "[{}] Conversion request #{} dropped before completion",
                self.session.id, self.ticket
            );
            state.status = SessionStatus::ImageSelected;
        }
    }
}

impl ConversionSession {
    pub fn new(
        service: Arc<dyn ConversionService>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service,
            persistence,
            state: Mutex::new(SessionState {
                source_image: None,
                target_format: Format::default(),
                status: SessionStatus::Idle,
                result: None,
                last_error: None,
                sequence: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // State is only written in short non-panicking sections, so a poisoned
        // lock still holds consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    pub fn source_image(&self) -> Option<ImageRef> {
        self.state().source_image.clone()
    }

    pub fn target_format(&self) -> Format {
        self.state().target_format
    }

    pub fn result_image(&self) -> Option<ImageRef> {
        self.state().result.as_ref().map(|r| r.image.clone())
    }

    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.state().last_error.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            id: self.id,
            status: state.status,
            source_image: state.source_image.clone(),
            target_format: state.target_format,
            result: state.result.clone(),
            last_error: state.last_error.clone(),
        }
    }

    /// Starts over with `image`, dropping any result, error or pending request.
    pub fn select_image(&self, image: impl Into<ImageRef>) {
        let image = image.into();
        let mut state = self.state();

        if state.status == SessionStatus::Converting {
            warn!(
                "[{}] New image selected while request #{} is pending; its result will be discarded",
                self.id, state.sequence
            );
        }

        info!("[{}] Image selected: {}", self.id, image);
        state.sequence += 1;
        state.source_image = Some(image);
        state.result = None;
        state.last_error = None;
        state.status = SessionStatus::ImageSelected;
    }

    /// Changes the format used by the next `convert`; a pending request keeps its own.
    pub fn set_target_format(&self, format: Format) {
        self.state().target_format = format;
    }

    pub async fn convert(&self) -> Result<ConvertOutcome> {
        let (ticket, source, format) = {
            let mut state = self.state();
            match state.status {
                SessionStatus::ImageSelected | SessionStatus::Failed => {}
                other => {
                    return Err(Error::InvalidState(format!(
                        "Cannot convert while session is {}",
                        other
                    )))
                }
            }
            let source = state.source_image.clone().ok_or_else(|| {
                Error::Invariant("Session has a selected status but no source image".to_string())
            })?;

            state.sequence += 1;
            state.status = SessionStatus::Converting;
            state.last_error = None;
            (state.sequence, source, state.target_format)
        };

        info!(
            "[{}] Starting conversion #{} of {} to {}",
            self.id, ticket, source, format
        );

        let mut in_flight = InFlight {
            session: self,
            ticket,
            settled: false,
        };
        let result = self.service.convert(&source, format).await;
        in_flight.settled = true;

        let mut state = self.state();
        if state.sequence != ticket {
            warn!(
                "[{}] Discarding stale response for request #{} (current #{})",
                self.id, ticket, state.sequence
            );
            return Ok(ConvertOutcome::Superseded);
        }

        match result {
            Ok(image) => {
                info!("[{}] Conversion complete. Result: {}", self.id, image);
                state.result = Some(ConvertedImage {
                    image: image.clone(),
                    format,
                });
                state.status = SessionStatus::Converted;
                Ok(ConvertOutcome::Converted(image))
            }
            Err(e) => {
                tracing::error!("[{}] Conversion failed: {}", self.id, e);
                state.last_error = Some(ErrorInfo::from(&e));
                state.status = SessionStatus::Failed;
                Err(e)
            }
        }
    }

    /// Saves the converted image. The session stays `Converted` either way.
    pub async fn download(&self, filename_hint: &str) -> Result<SavedImage> {
        let converted = {
            let state = self.state();
            match (&state.status, &state.result) {
                (SessionStatus::Converted, Some(converted)) => converted.clone(),
                (status, _) => {
                    return Err(Error::InvalidState(format!(
                        "Cannot download while session is {}",
                        status
                    )))
                }
            }
        };

        info!(
            "[{}] Attempting to download image in {} format",
            self.id, converted.format
        );

        self.persistence
            .persist(&converted.image, converted.format, filename_hint)
            .await
            .map_err(|e| {
                warn!("[{}] Download failed: {}", self.id, e);
                e
            })
    }
}
