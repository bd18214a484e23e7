//! Core types and collaborator contracts for the Casefile field client.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! engine talks to storage, cache and the remote system only through the
//! traits defined here. Trait methods return `impl Future + Send` so the
//! engine can drive them from spawned tasks; implementors write `async fn`.

pub mod answer;
pub mod beneficiary;
pub mod cache;
pub mod error;
pub mod form;
pub mod gateway;
pub mod store;

pub use error::{Error, Result, ValidationError};
