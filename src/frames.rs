//! Cross-frame coordination.
//!
//! The top frame owns the shared translation UI. Nested frames have no shared
//! memory with it and reach it only through serialized envelopes posted via
//! the page's cross-document messaging primitive.

pub mod coordinator;
pub mod envelope;

pub use coordinator::{
    CrossFrameCoordinator, Delivery, DismissReason, FrameSource, FrameTransport, IgnoreReason,
    TopFrameUi,
};
pub use envelope::{
    CrossFrameEnvelope, CrossFrameKind, CrossFrameMessage, DismissRequest, IconRequest,
    OutsideClick, Point, WindowRequest,
};
