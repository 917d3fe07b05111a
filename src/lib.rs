// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) TCP repeater
//! based on [tokio](https://tokio.rs).
//!
//! Requests of many concurrent Modbus TCP clients are repeated onto a single
//! shared field link, either a Modbus RTU serial line or a parameter bus of
//! indexed float values. Repeated reads within one second are answered from
//! a response cache without touching the link.
//!
//! Only the register functions 0x03 (read holding registers), 0x04 (read
//! input registers) and 0x10 (write multiple registers) are repeated.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use mbs_repeater::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::new(LinkConfig::Serial(
//!         SerialConfig::new("/dev/ttyUSB0").timeout(Duration::from_millis(500)),
//!     ));
//!     let backend = config.open_backend().await?;
//!     let server = Server::bind(config.listen)?;
//!     server.serve(Gateway::from_shared(backend)).await?;
//!     Ok(())
//! }
//! ```

// Re-export the bytes crate
//
// Needed to prevent version conflicts with types that are exposed by this crate
pub use bytes;

pub mod prelude;

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod frame;
pub mod server;

mod error;
pub use self::error::{Error, FrameError, LinkError};

/// Result of a fallible repeater operation.
pub type Result<T> = std::result::Result<T, Error>;
