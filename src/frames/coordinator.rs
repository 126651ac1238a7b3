//! Cross-frame coordinator
//!
//! Requests (show window, show icon, dismiss) and notifications (outside
//! click) flow from nested frames to the top frame. The top frame is the only
//! frame that ever touches the UI surface. Delivery is fire-and-forget: a
//! lost message leaves stale UI until the next qualifying event.

use crate::config::FramesConfig;
use crate::error::TransportError;
use crate::frames::envelope::{
    CrossFrameEnvelope, CrossFrameKind, CrossFrameMessage, DismissRequest, IconRequest,
    OutsideClick, Point, WindowRequest,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Page-side messaging primitive.
pub trait FrameTransport: Send + Sync {
    /// Whether this document is the top (non-iframe) frame.
    fn is_top_frame(&self) -> bool;

    /// Post a serialized envelope to the top frame.
    fn post_to_top(&self, message: Value) -> Result<(), TransportError>;
}

/// Shared translation UI, present only in the top frame.
pub trait TopFrameUi: Send + Sync {
    fn is_visible(&self) -> bool;

    /// A pinned window survives outside clicks.
    fn is_pinned(&self) -> bool {
        false
    }

    fn show_window(&self, request: WindowRequest);

    fn show_icon(&self, request: IconRequest);

    fn dismiss(&self, reason: DismissReason);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DismissReason {
    OutsideClick,
    Requested(Option<String>),
}

/// Where an inbound envelope came from, as resolved by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameSource {
    /// Top-left corner of the sending iframe in the top-frame viewport, when
    /// the host could match the message source to an iframe element.
    pub offset: Option<Point>,
}

/// Result of handing an inbound envelope to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Handled(CrossFrameKind),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotTopFrame,
    Malformed(String),
    OwnMessage,
    NoUiOwner,
    NothingToDismiss,
    OutsideClickDismissDisabled,
}

pub struct CrossFrameCoordinator {
    frame_id: String,
    is_top: bool,
    transport: Arc<dyn FrameTransport>,
    ui: Option<Arc<dyn TopFrameUi>>,
    config: FramesConfig,
}

impl CrossFrameCoordinator {
    /// Build the coordinator for one document.
    ///
    /// The frame role is read once from the transport and fixed for the
    /// document's lifetime. A UI surface passed to a nested frame is dropped.
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        ui: Option<Arc<dyn TopFrameUi>>,
        config: FramesConfig,
    ) -> Self {
        let is_top = transport.is_top_frame();
        let frame_id = format!("frame-{}", uuid::Uuid::new_v4().simple());
        let ui = if is_top {
            ui
        } else {
            if ui.is_some() {
                warn!(frame_id = %frame_id, "Nested frame cannot own the shared UI, ignoring surface");
            }
            None
        };
        debug!(frame_id = %frame_id, is_top, "Cross-frame coordinator ready");
        Self {
            frame_id,
            is_top,
            transport,
            ui,
            config,
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn is_top_frame(&self) -> bool {
        self.is_top
    }

    /// Open the translation window at `request.position` (this frame's
    /// viewport coordinates).
    pub fn request_window(&self, request: WindowRequest) {
        if self.is_top {
            match &self.ui {
                Some(ui) => ui.show_window(request),
                None => debug!("No UI owner registered, window request dropped"),
            }
        } else {
            self.post(CrossFrameMessage::WindowRequest(request));
        }
    }

    pub fn request_icon(&self, request: IconRequest) {
        if self.is_top {
            match &self.ui {
                Some(ui) => ui.show_icon(request),
                None => debug!("No UI owner registered, icon request dropped"),
            }
        } else {
            self.post(CrossFrameMessage::IconRequest(request));
        }
    }

    /// Report a click outside any tracked UI.
    pub fn notify_outside_click(&self, position: Option<Point>) {
        if self.is_top {
            self.handle_outside_click();
        } else {
            self.post(CrossFrameMessage::OutsideClick(OutsideClick { position }));
        }
    }

    pub fn request_dismiss(&self, reason: Option<String>) {
        if self.is_top {
            self.handle_dismiss(reason);
        } else {
            self.post(CrossFrameMessage::DismissRequest(DismissRequest { reason }));
        }
    }

    /// Handle an inbound envelope from any frame. Untrusted input.
    pub fn receive(&self, raw: &Value, source: FrameSource) -> Delivery {
        if !self.is_top {
            return Delivery::Ignored(IgnoreReason::NotTopFrame);
        }
        let envelope = match CrossFrameEnvelope::from_value(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                trace!(error = %err, "Ignoring foreign or malformed frame message");
                return Delivery::Ignored(IgnoreReason::Malformed(err.to_string()));
            }
        };
        if envelope.frame_id == self.frame_id {
            return Delivery::Ignored(IgnoreReason::OwnMessage);
        }
        let message = match envelope.decode() {
            Ok(message) => message,
            Err(err) => {
                debug!(
                    from_frame = %envelope.frame_id,
                    error = %err,
                    "Rejected cross-frame payload"
                );
                return Delivery::Ignored(IgnoreReason::Malformed(err.to_string()));
            }
        };
        debug!(
            from_frame = %envelope.frame_id,
            kind = %message.kind(),
            "Received cross-frame message"
        );

        let offset = source.offset.unwrap_or_default();
        match message {
            CrossFrameMessage::WindowRequest(mut request) => {
                let Some(ui) = &self.ui else {
                    return Delivery::Ignored(IgnoreReason::NoUiOwner);
                };
                request.position = request.position.translated(offset);
                ui.show_window(request);
                Delivery::Handled(CrossFrameKind::WindowRequest)
            }
            CrossFrameMessage::IconRequest(mut request) => {
                let Some(ui) = &self.ui else {
                    return Delivery::Ignored(IgnoreReason::NoUiOwner);
                };
                request.position = request.position.translated(offset);
                ui.show_icon(request);
                Delivery::Handled(CrossFrameKind::IconRequest)
            }
            CrossFrameMessage::OutsideClick(_) => self.handle_outside_click(),
            CrossFrameMessage::DismissRequest(request) => self.handle_dismiss(request.reason),
        }
    }

    /// The notification is only a hint: dismissal is re-derived from the
    /// UI's own visibility state.
    fn handle_outside_click(&self) -> Delivery {
        if !self.config.dismiss_on_outside_click {
            return Delivery::Ignored(IgnoreReason::OutsideClickDismissDisabled);
        }
        let Some(ui) = &self.ui else {
            return Delivery::Ignored(IgnoreReason::NoUiOwner);
        };
        if ui.is_visible() && !ui.is_pinned() {
            ui.dismiss(DismissReason::OutsideClick);
            Delivery::Handled(CrossFrameKind::OutsideClick)
        } else {
            Delivery::Ignored(IgnoreReason::NothingToDismiss)
        }
    }

    fn handle_dismiss(&self, reason: Option<String>) -> Delivery {
        let Some(ui) = &self.ui else {
            return Delivery::Ignored(IgnoreReason::NoUiOwner);
        };
        if ui.is_visible() {
            ui.dismiss(DismissReason::Requested(reason));
            Delivery::Handled(CrossFrameKind::DismissRequest)
        } else {
            Delivery::Ignored(IgnoreReason::NothingToDismiss)
        }
    }

    fn post(&self, message: CrossFrameMessage) {
        let kind = message.kind();
        let result = CrossFrameEnvelope::wrap(&message, &self.frame_id)
            .map_err(TransportError::from)
            .and_then(|envelope| envelope.to_value().map_err(TransportError::from))
            .and_then(|value| self.transport.post_to_top(value));
        if let Err(err) = result {
            debug!(kind = %kind, error = %err, "Cross-frame post failed, dropping message");
        }
    }
}

impl std::fmt::Debug for CrossFrameCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossFrameCoordinator")
            .field("frame_id", &self.frame_id)
            .field("is_top", &self.is_top)
            .field("has_ui", &self.ui.is_some())
            .finish()
    }
}
