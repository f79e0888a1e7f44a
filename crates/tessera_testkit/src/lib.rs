//! # Tessera Testkit
//!
//! Test utilities for Tessera.
//!
//! This crate provides:
//! - A versioned [`Note`] fixture entity
//! - [`FakeBackend`], an in-memory REST-shaped backend with fault injection
//! - Store helpers for in-memory and temporary file stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_testkit::prelude::*;
//!
//! let backend = Arc::new(FakeBackend::new());
//! backend.fail_next(1, Fault::Offline);
//! let repo = RemoteRepository::new(backend.clone(), "notes", note_codec());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use backend::*;
pub use fixtures::*;
pub use generators::*;
