// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP framing of the TCP side.

use byteorder::{BigEndian, ByteOrder as _};
use log::debug;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    bytes::{BufMut as _, BytesMut},
    error::FrameError,
    frame::{tcp::*, *},
};

use super::{decode_request_body, u16_len, u8_len, MAX_PDU_SIZE};

/// MBAP prefix preceding the bytes counted by the length field.
const HEADER_LEN: usize = 6;

/// MBAP prefix, unit id and function code.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 2;

const PROTOCOL_ID: u16 = 0x0000;

/// All fields of a request up to and including the function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Number of bytes following the length field.
    pub length: u16,
    pub unit_id: UnitId,
    pub function: FunctionCode,
}

impl MbapHeader {
    /// The fields that are echoed in the reply.
    #[must_use]
    pub const fn echo(&self) -> Header {
        Header {
            transaction_id: self.transaction_id,
            protocol_id: self.protocol_id,
            unit_id: self.unit_id,
        }
    }
}

/// Decode the first [`MIN_FRAME_LEN`] bytes of a TCP request.
pub fn decode_header(buf: &[u8]) -> Result<MbapHeader, FrameError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(FrameError::Truncated);
    }
    let transaction_id = BigEndian::read_u16(&buf[0..2]);
    let protocol_id = BigEndian::read_u16(&buf[2..4]);
    let length = BigEndian::read_u16(&buf[4..6]);

    if protocol_id != PROTOCOL_ID {
        return Err(FrameError::InvalidProtocolId(protocol_id));
    }
    // len = bytes of PDU + one byte (unit ID)
    if length < 2 || usize::from(length) > MAX_PDU_SIZE + 1 {
        return Err(FrameError::InvalidLength(length));
    }

    Ok(MbapHeader {
        transaction_id,
        protocol_id,
        length,
        unit_id: buf[6],
        function: FunctionCode::new(buf[7]),
    })
}

/// Append a read reply: echoed header, `length = data.len() + 3`, unit id,
/// function code, byte count and the raw register data.
pub fn encode_read_reply(buf: &mut BytesMut, hdr: Header, function: FunctionCode, data: &[u8]) {
    buf.reserve(MIN_FRAME_LEN + 1 + data.len());
    buf.put_u16(hdr.transaction_id);
    buf.put_u16(hdr.protocol_id);
    buf.put_u16(u16_len(data.len() + 3));
    buf.put_u8(hdr.unit_id);
    buf.put_u8(function.value());
    buf.put_u8(u8_len(data.len()));
    buf.put_slice(data);
}

/// Append a write reply: echoed header, unit id, function code and the
/// written address and quantity.
///
/// The announced length is `2 * requested + 3`, not the 6 bytes that follow.
/// Existing clients depend on this exact byte sequence.
pub fn encode_write_reply(
    buf: &mut BytesMut,
    hdr: Header,
    function: FunctionCode,
    requested: Quantity,
    address: Address,
    quantity: Quantity,
) {
    buf.reserve(MIN_FRAME_LEN + 4);
    buf.put_u16(hdr.transaction_id);
    buf.put_u16(hdr.protocol_id);
    buf.put_u16(u16_len(usize::from(requested) * 2 + 3));
    buf.put_u8(hdr.unit_id);
    buf.put_u8(function.value());
    buf.put_u16(address);
    buf.put_u16(quantity);
}

#[derive(Debug, Default)]
pub(crate) struct ServerCodec;

impl Decoder for ServerCodec {
    type Item = RequestAdu;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu>, FrameError> {
        loop {
            if buf.len() < MIN_FRAME_LEN {
                return Ok(None);
            }
            let header = decode_header(buf)?;
            let frame_len = HEADER_LEN + usize::from(header.length);
            if buf.len() < frame_len {
                buf.reserve(frame_len - buf.len());
                return Ok(None);
            }

            let body = buf.split_to(frame_len).split_off(MIN_FRAME_LEN).freeze();
            match decode_request_body(header.function, body)? {
                Some(pdu) => {
                    return Ok(Some(RequestAdu {
                        hdr: header.echo(),
                        pdu,
                    }))
                }
                None => {
                    debug!(
                        "Skipping request {} with unsupported function code {}",
                        header.transaction_id, header.function
                    );
                }
            }
        }
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = FrameError;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<(), FrameError> {
        let ResponseAdu { hdr, pdu } = adu;
        let function = pdu.function_code();
        match pdu {
            Response::ReadHoldingRegisters(data) | Response::ReadInputRegisters(data) => {
                encode_read_reply(buf, hdr, function, &data);
            }
            Response::WriteMultipleRegisters {
                address,
                quantity,
                requested,
            } => {
                encode_write_reply(buf, hdr, function, requested, address, quantity);
            }
        }
        Ok(())
    }
}
