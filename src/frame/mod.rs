// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod tcp;

use std::fmt::{self, Display};

use crate::bytes::Bytes;

/// A Modbus function code.
///
/// Only the register functions repeated onto the field link are modelled
/// explicitly, everything else is carried as [`FunctionCode::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 03 (0x03) Read Holding Registers
    ReadHoldingRegisters,

    /// 04 (0x04) Read Input Registers
    ReadInputRegisters,

    /// 16 (0x10) Write Multiple Registers
    WriteMultipleRegisters,

    /// Any other function code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x10 => Self::WriteMultipleRegisters,
            code => Self::Custom(code),
        }
    }

    /// Gets the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteMultipleRegisters => 0x10,
            Self::Custom(code) => code,
        }
    }
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *register address*
/// entered by users is often 1-based.
pub type Address = u16;

/// Number of items to process.
pub type Quantity = u16;

/// A single byte for addressing a field device behind the repeater.
pub type UnitId = u8;

/// The two readable register tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Holding,
    Input,
}

impl RegisterKind {
    #[must_use]
    pub const fn function_code(self) -> FunctionCode {
        match self {
            Self::Holding => FunctionCode::ReadHoldingRegisters,
            Self::Input => FunctionCode::ReadInputRegisters,
        }
    }
}

/// A request represents a message from a TCP client to the repeater.
///
/// Register data is kept in its raw big-endian wire layout, because the
/// repeater forwards it without interpreting individual words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A request to read multiple holding registers.
    /// The first parameter is the address of the first holding register to read.
    /// The second parameter is the number of holding registers to read.
    ReadHoldingRegisters(Address, Quantity),

    /// A request to read multiple input registers.
    /// The first parameter is the address of the first input register to read.
    /// The second parameter is the number of input registers to read.
    ReadInputRegisters(Address, Quantity),

    /// A request to write multiple registers.
    /// The first parameter is the address of the first register to write.
    /// The second parameter is the number of registers to write.
    /// The third parameter is the raw register data (`2 * quantity` bytes).
    WriteMultipleRegisters(Address, Quantity, Bytes),
}

impl Request {
    /// Get the [`FunctionCode`] of the [`Request`].
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadHoldingRegisters(_, _) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_, _) => FunctionCode::ReadInputRegisters,
            Self::WriteMultipleRegisters(_, _, _) => FunctionCode::WriteMultipleRegisters,
        }
    }
}

/// A [`Request`] addressed to a single unit on the shared link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRequest {
    pub unit: UnitId,
    pub request: Request,
}

/// The response to a [`Request`], sent back to the TCP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Raw register data of a holding register read.
    ReadHoldingRegisters(Bytes),

    /// Raw register data of an input register read.
    ReadInputRegisters(Bytes),

    /// Acknowledgement of a register write.
    ///
    /// `address` and `quantity` are what the backend reports as written,
    /// `requested` is the quantity of the originating request. The latter
    /// only determines the announced MBAP length of the reply.
    WriteMultipleRegisters {
        address: Address,
        quantity: Quantity,
        requested: Quantity,
    },
}

impl Response {
    /// Get the [`FunctionCode`] of the [`Response`].
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }
}
