//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `system`: Tokio-backed clock, std I/O transport, log/no-op telemetry,
//!   and an `embedded-hal` pin adapter (requires `embedded-hal` feature)
//! - `mock`: Test implementations for desktop development

pub mod mock;
pub mod system;

pub use mock::*;
pub use system::*;
