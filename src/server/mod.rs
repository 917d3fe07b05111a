// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server side of the repeater

pub mod tcp;

mod service;
pub use self::service::{Gateway, Service};

/// Cause for termination of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminated {
    /// The server has finished processing.
    Finished,

    /// The server has been aborted.
    Aborted,
}
