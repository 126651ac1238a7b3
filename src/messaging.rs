//! Cross-context command dispatch.
//!
//! Envelopes from the background, popup or other contexts carry an action
//! name on the wire; the router parses it into the closed [`MessageAction`]
//! set and dispatches to the one registered handler.

pub mod action;
pub mod envelope;
pub mod router;

pub use action::{MessageAction, MessageContext};
pub use envelope::{MessageEnvelope, MessageSender, ResponseEnvelope};
pub use router::{handler_fn, HandlerResult, MessageHandler, MessageRouter};
