//! # heardlive Common Library
//!
//! Shared code for the heardlive service:
//! - Domain models (profiles, artists, experiences, sessions)
//! - Handle rules (typing filter and validation)
//! - Country names for profile display
//! - Error taxonomy with user-facing messages
//! - Session-change event bus
//! - Configuration loading

pub mod config;
pub mod country;
pub mod error;
pub mod events;
pub mod handle;
pub mod models;

pub use error::{Error, ExternalService, Result};
