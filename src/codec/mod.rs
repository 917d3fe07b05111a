// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt as _};

use crate::{
    bytes::Bytes,
    error::FrameError,
    frame::{FunctionCode, Quantity, Request},
};

pub mod rtu;
pub mod tcp;

/// Maximum request/response PDU size.
///
/// Identical for Modbus RTU and TCP.
const MAX_PDU_SIZE: usize = 253;

/// Maximum number of registers a single read may request.
pub(crate) const MAX_READ_QUANTITY: Quantity = 125;

#[allow(clippy::cast_possible_truncation)]
fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

fn read_u16_be(reader: &mut impl io::Read) -> Result<u16, FrameError> {
    reader
        .read_u16::<BigEndian>()
        .map_err(|_| FrameError::Truncated)
}

/// Decode the body following the function code of a request PDU.
///
/// Yields `None` for function codes the repeater does not forward.
fn decode_request_body(
    function: FunctionCode,
    body: Bytes,
) -> Result<Option<Request>, FrameError> {
    let rdr = &mut Cursor::new(&body);
    let request = match function {
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let address = read_u16_be(rdr)?;
            let quantity = read_u16_be(rdr)?;
            if quantity == 0 || quantity > MAX_READ_QUANTITY {
                return Err(FrameError::InvalidQuantity(quantity));
            }
            if function == FunctionCode::ReadHoldingRegisters {
                Request::ReadHoldingRegisters(address, quantity)
            } else {
                Request::ReadInputRegisters(address, quantity)
            }
        }
        FunctionCode::WriteMultipleRegisters => {
            let address = read_u16_be(rdr)?;
            let quantity = read_u16_be(rdr)?;
            let byte_count = rdr.read_u8().map_err(|_| FrameError::Truncated)?;
            if quantity == 0 {
                return Err(FrameError::InvalidQuantity(quantity));
            }
            if usize::from(quantity) * 2 != usize::from(byte_count) {
                return Err(FrameError::ByteCountMismatch {
                    quantity,
                    byte_count,
                });
            }
            let data_len = usize::from(byte_count);
            if body.len() < 5 + data_len {
                return Err(FrameError::Truncated);
            }
            Request::WriteMultipleRegisters(address, quantity, body.slice(5..5 + data_len))
        }
        FunctionCode::Custom(_) => return Ok(None),
    };
    Ok(Some(request))
}
