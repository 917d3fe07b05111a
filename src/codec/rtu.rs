// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU framing of the serial side.

use byteorder::{BigEndian, ByteOrder as _};

use crate::{
    bytes::{BufMut as _, BytesMut},
    error::LinkError,
    frame::{Address, FunctionCode, Quantity, UnitId},
};

use super::u8_len;

/// Unit id, function code and byte count of a read reply.
pub const READ_REPLY_HEADER_LEN: usize = 3;

/// Unit id, function code, address, quantity and CRC of a write reply.
pub const WRITE_REPLY_LEN: usize = 8;

pub(crate) const CRC_LEN: usize = 2;

/// Modbus CRC16 with its two bytes swapped, ready to be appended big-endian.
#[must_use]
pub fn calc_crc(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc.rotate_left(8)
}

fn put_crc(buf: &mut BytesMut, start: usize) {
    let crc = calc_crc(&buf[start..]);
    buf.put_u16(crc);
}

/// Append `unit, function, address, quantity, crc`.
pub fn encode_read_request(
    buf: &mut BytesMut,
    unit: UnitId,
    function: FunctionCode,
    address: Address,
    quantity: Quantity,
) {
    let start = buf.len();
    buf.reserve(6 + CRC_LEN);
    buf.put_u8(unit);
    buf.put_u8(function.value());
    buf.put_u16(address);
    buf.put_u16(quantity);
    put_crc(buf, start);
}

/// Append `unit, 0x10, address, quantity, byte count, data, crc`.
///
/// The byte count is always `2 * quantity`.
pub fn encode_write_request(
    buf: &mut BytesMut,
    unit: UnitId,
    address: Address,
    quantity: Quantity,
    data: &[u8],
) {
    let start = buf.len();
    buf.reserve(7 + data.len() + CRC_LEN);
    buf.put_u8(unit);
    buf.put_u8(FunctionCode::WriteMultipleRegisters.value());
    buf.put_u16(address);
    buf.put_u16(quantity);
    buf.put_u8(u8_len(usize::from(quantity) * 2));
    buf.put_slice(data);
    put_crc(buf, start);
}

/// Number of bytes read back for a read of `quantity` registers.
///
/// Covers unit id, function code, byte count and data, but not the CRC.
#[must_use]
pub fn read_reply_len(quantity: Quantity) -> usize {
    READ_REPLY_HEADER_LEN + usize::from(quantity) * 2
}

/// Check unit id and function code of a reply against its request.
pub fn verify_reply_header(
    reply: &[u8],
    unit: UnitId,
    function: FunctionCode,
) -> Result<(), LinkError> {
    if reply.len() < 2 {
        return Err(LinkError::ShortReply {
            expected: 2,
            received: reply.len(),
        });
    }
    if reply[0] != unit {
        return Err(LinkError::MalformedReply(format!(
            "unit id mismatch: expected {unit}, received {}",
            reply[0]
        )));
    }
    if reply[1] != function.value() {
        return Err(LinkError::MalformedReply(format!(
            "function code mismatch: expected {function}, received {}",
            reply[1]
        )));
    }
    Ok(())
}

/// Check the trailing CRC of a complete RTU frame.
pub fn verify_crc(frame: &[u8]) -> Result<(), LinkError> {
    if frame.len() < CRC_LEN {
        return Err(LinkError::ShortReply {
            expected: CRC_LEN,
            received: frame.len(),
        });
    }
    let (adu, crc) = frame.split_at(frame.len() - CRC_LEN);
    let crc = BigEndian::read_u16(crc);
    let expected_crc = calc_crc(adu);
    if expected_crc != crc {
        return Err(LinkError::MalformedReply(format!(
            "CRC is not correct: {crc:#06X} instead of {expected_crc:#06X}"
        )));
    }
    Ok(())
}

/// Extract the `(address, quantity)` acknowledged to TCP clients.
///
/// Both words are taken from byte 4 on, so clients see the echoed quantity
/// followed by the reply CRC.
pub fn decode_write_reply(reply: &[u8]) -> Result<(Address, Quantity), LinkError> {
    if reply.len() < WRITE_REPLY_LEN {
        return Err(LinkError::ShortReply {
            expected: WRITE_REPLY_LEN,
            received: reply.len(),
        });
    }
    let address = BigEndian::read_u16(&reply[4..6]);
    let quantity = BigEndian::read_u16(&reply[6..8]);
    Ok((address, quantity))
}

/// Expected length of the complete read reply frame including CRC.
#[must_use]
pub fn read_frame_len(quantity: Quantity) -> usize {
    read_reply_len(quantity) + CRC_LEN
}
