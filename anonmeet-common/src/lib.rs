//! # anonmeet Common Library
//!
//! Shared code for the anonmeet services:
//! - Error type
//! - Configuration loading and resolution
//! - Event types (AnonMeetEvent enum) and the EventBus
//! - Server-Sent Events helpers
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
