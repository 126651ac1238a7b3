//! Integration tests for the page feature orchestrator

mod context_guard;
mod feature_manager;
mod message_router;
mod test_utils;
