//! # Longform Core
//!
//! Domain types, traits, and error definitions for the Longform generator.
//! This crate has **no HTTP or runtime framework dependencies** — it defines
//! the domain model that the provider, generator, and CLI crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! The completion backend is a trait here; implementations live in
//! `longform-providers`. The generator only ever sees `dyn Provider`, which
//! keeps it testable with scripted mock providers.

pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GenerationError, ProviderError, Result};
pub use message::{Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StopReason, StreamChunk, Usage};
