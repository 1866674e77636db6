//! taskhand — a natural-language front door to a fixed set of file and
//! data operations.
//!
//! A free-text task description goes through the intent classifier
//! ([`classify`]), which produces a [`classify::StructuredCall`] either via a
//! remote function-calling model or via a deterministic keyword fallback.
//! The dispatcher ([`dispatch`]) decodes the call into a closed
//! [`dispatch::Operation`] enum and runs the matching handler from [`ops`].
//! The [`server`] module exposes the whole pipeline over HTTP.

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod embeddings;
pub mod ops;
pub mod schema;
pub mod server;

pub use classify::{Classifier, StructuredCall};
pub use config::Config;
pub use dispatch::{Operation, RunContext, TaskError};
