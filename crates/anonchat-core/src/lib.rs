//! Core state-synchronization logic for the anonchat client.
//!
//! This crate is intentionally transport-agnostic. The HTTP backend lives
//! behind the `ChatGateway` port implemented in the adapter crate; everything
//! here (session, message feed, invitations) talks to that trait only.

pub mod app;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod invites;
pub mod logging;
pub mod session;
pub mod sync;

pub use errors::{Error, Result};
