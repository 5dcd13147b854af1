//! Wellbeing companion core — the streaming assistant session controller.
//!
//! Sends caregiver messages and check-in driven synthetic turns to the wellbeing agent
//! backend, decodes its SSE-style stream into a live assistant message, and supersedes
//! in-flight turns when a newer one starts.

pub mod backend;
pub mod checkin;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod scheduler;
pub mod session;
pub mod stream;
pub mod suggest;

pub use controller::{spawn_session, CompanionHandle, CompanionView, ControllerError};
