// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

use crate::frame::Quantity;

/// An unparsable request received from a TCP client.
///
/// Always fatal for the connection that sent it.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid protocol id: {0}")]
    InvalidProtocolId(u16),

    /// The MBAP length field cannot hold a unit id and a function code.
    #[error("invalid length: {0}")]
    InvalidLength(u16),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(Quantity),

    #[error("byte count {byte_count} does not match quantity {quantity}")]
    ByteCountMismatch { quantity: Quantity, byte_count: u8 },

    /// The PDU is shorter than its function code requires.
    #[error("truncated request")]
    Truncated,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A failed exchange on the physical field link.
///
/// Reads treat it as a miss, writes report it as a partial acknowledgement.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link timeout")]
    Timeout,

    #[error("short reply: expected {expected} bytes, received {received}")]
    ShortReply { expected: usize, received: usize },

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// Error reported by a parameter-bus driver.
    #[error("parameter bus: {0}")]
    Bus(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The field link could not be opened.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(io::Error),

    /// The TCP listening endpoint could not be opened.
    #[error("failed to bind listener: {0}")]
    Bind(io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}
