// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field link backends.
//!
//! A [`Backend`] performs register reads and writes on the single physical
//! link that all TCP connections share. Register data always uses the raw
//! big-endian layout of Modbus TCP, regardless of what the link speaks.
//!
//! Two variants exist:
//!
//! - [`rtu::RtuBackend`] repeats requests as Modbus RTU frames onto a serial
//!   line (or any other byte [`Transport`]).
//! - [`param::ParamBackend`] maps registers onto the indexed float
//!   parameters of a [`param::ParameterBus`].
//!
//! Both serve repeated reads from a [`ResponseCache`](crate::cache::ResponseCache)
//! and serialize all link access.

use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use futures_util::FutureExt as _;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite};

use crate::{
    bytes::Bytes,
    error::LinkError,
    frame::{Address, Quantity, RegisterKind, UnitId},
};

pub mod param;
pub mod rtu;

/// Register access on the shared field link.
#[async_trait]
pub trait Backend: fmt::Debug + Send + Sync {
    /// Read `quantity` registers starting at `address`.
    ///
    /// Any [`LinkError`] means that neither the cache nor the link could
    /// provide the registers.
    async fn read_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        kind: RegisterKind,
    ) -> Result<Bytes, LinkError>;

    async fn read_holding_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
    ) -> Result<Bytes, LinkError> {
        self.read_registers(unit, address, quantity, RegisterKind::Holding)
            .await
    }

    async fn read_input_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
    ) -> Result<Bytes, LinkError> {
        self.read_registers(unit, address, quantity, RegisterKind::Input)
            .await
    }

    /// Write the raw register `data` and return the acknowledged
    /// `(address, quantity)`.
    ///
    /// Link failures are not reported as errors: a quantity smaller than
    /// requested signals a partial write.
    async fn write_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        data: Bytes,
    ) -> (Address, Quantity);
}

#[async_trait]
impl<B> Backend for Arc<B>
where
    B: Backend + ?Sized,
{
    async fn read_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        kind: RegisterKind,
    ) -> Result<Bytes, LinkError> {
        (**self).read_registers(unit, address, quantity, kind).await
    }

    async fn write_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        data: Bytes,
    ) -> (Address, Quantity) {
        (**self).write_registers(unit, address, quantity, data).await
    }
}

/// A byte stream carrying Modbus RTU frames.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {
    /// Discard whatever the driver still buffers in either direction.
    fn clear_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "serial")]
impl Transport for tokio_serial::SerialStream {
    fn clear_buffers(&mut self) -> io::Result<()> {
        use tokio_serial::SerialPort as _;
        self.clear(tokio_serial::ClearBuffer::All)
            .map_err(Into::into)
    }
}

impl Transport for tokio::net::TcpStream {}

impl Transport for tokio::io::DuplexStream {}

/// Drop input that is already available without waiting for more.
///
/// Returns the number of discarded bytes.
pub(crate) fn discard_pending_input<T>(transport: &mut T) -> usize
where
    T: AsyncRead + Unpin,
{
    let mut scratch = [0; 64];
    let mut discarded = 0;
    while let Some(Ok(n)) = transport.read(&mut scratch).now_or_never() {
        if n == 0 {
            break;
        }
        discarded += n;
    }
    discarded
}
