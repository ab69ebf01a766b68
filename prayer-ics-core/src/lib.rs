//! Prayer ICS Core Library
//!
//! This library resolves a place name, aggregates a full year of daily prayer
//! times from a remote schedule provider and turns them into an ICS calendar.

pub mod aggregator;
pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod ics;
pub mod location;
pub mod normalize;
pub mod providers;
pub mod service;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        aggregator::*, artifact::*, cache::*, config::*, ics::*, location::*, normalize::*,
        providers::*, service::*, types::*,
    };
}
