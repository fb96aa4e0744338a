//! Trait definitions for hardware abstraction and telemetry.
//!
//! This module defines the core abstractions that allow rs-hydronic to:
//! - Run against real boards (serial, I2C expanders) or desktop mocks
//! - Drive any relay or pin through a single output seam
//! - Report usage to an external metrics exporter
//!
//! # Submodules
//!
//! - `hardware`: Clock, transport, input bus, and output driver
//! - `telemetry`: Gauge and counter sink
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`Clock`]: Monotonic time source, substitutable in tests
//! - [`Transport`]: Byte stream to a microcontroller board
//! - [`InputBus`]: Port reads from a digital input expander
//! - [`OutputDriver`]: One physical relay or pin

pub mod hardware;
pub mod telemetry;

pub use hardware::*;
pub use telemetry::*;
