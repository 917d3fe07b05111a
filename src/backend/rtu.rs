// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU backend

use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    sync::Mutex,
};

use crate::{
    bytes::{Bytes, BytesMut},
    cache::{Fingerprint, ResponseCache},
    codec::rtu::{
        decode_write_reply, encode_read_request, encode_write_request, read_frame_len,
        read_reply_len, verify_crc, verify_reply_header, CRC_LEN, READ_REPLY_HEADER_LEN,
        WRITE_REPLY_LEN,
    },
    error::{Error, LinkError},
    frame::{Address, FunctionCode, Quantity, RegisterKind, UnitId},
};

use super::{discard_pending_input, Backend, Transport};

/// Default upper bound for a single request/reply exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for the CRC of a reply that was accepted without it.
const CRC_DRAIN_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuOptions {
    /// Upper bound for a single request/reply exchange.
    pub timeout: Duration,

    /// Check CRC, unit id and function code of every reply.
    ///
    /// Disabled by default: the reply is then accepted as soon as the
    /// expected number of bytes arrived.
    pub verify_crc: bool,
}

impl Default for RtuOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            verify_crc: false,
        }
    }
}

impl RtuOptions {
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn verify_crc(mut self, verify_crc: bool) -> Self {
        self.verify_crc = verify_crc;
        self
    }
}

/// Repeats register requests as Modbus RTU frames.
#[derive(Debug)]
pub struct RtuBackend<T> {
    link: Mutex<T>,
    cache: ResponseCache,
    options: RtuOptions,
}

impl<T> RtuBackend<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, RtuOptions::default())
    }

    #[must_use]
    pub fn with_options(transport: T, options: RtuOptions) -> Self {
        Self {
            link: Mutex::new(transport),
            cache: ResponseCache::default(),
            options,
        }
    }

    /// Replace the default cache, e.g. to change its TTL.
    #[must_use]
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[must_use]
    pub fn options(&self) -> RtuOptions {
        self.options
    }

    /// Send `request` and receive exactly `reply_len` bytes.
    ///
    /// Must be called with the link lock held.
    async fn exchange(
        &self,
        link: &mut T,
        request: &[u8],
        reply_len: usize,
    ) -> Result<BytesMut, LinkError> {
        link.clear_buffers()?;
        let discarded = discard_pending_input(link);
        if discarded > 0 {
            debug!("Discarded {discarded} stale byte(s) from the link");
        }

        let exchange = async {
            link.write_all(request).await?;
            link.flush().await?;
            let mut reply = BytesMut::zeroed(reply_len);
            let mut received = 0;
            while received < reply_len {
                let n = link.read(&mut reply[received..]).await?;
                if n == 0 {
                    return Err(LinkError::ShortReply {
                        expected: reply_len,
                        received,
                    });
                }
                received += n;
            }
            Ok::<_, LinkError>(reply)
        };
        tokio::time::timeout(self.options.timeout, exchange)
            .await
            .map_err(|_| LinkError::Timeout)?
    }

    /// Consume the CRC trailing an accepted read reply.
    ///
    /// Must be called with the link lock held, so that late CRC bytes never
    /// end up in the reply of the next exchange. A missing CRC is ignored.
    async fn drain_crc(&self, link: &mut T) {
        let mut crc = [0; CRC_LEN];
        let mut received = 0;
        let drain = async {
            while received < CRC_LEN {
                match link.read(&mut crc[received..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received += n,
                }
            }
        };
        let wait = CRC_DRAIN_TIMEOUT.min(self.options.timeout);
        if tokio::time::timeout(wait, drain).await.is_err() {
            trace!("Reply CRC incomplete after {wait:?}: {received} byte(s)");
        }
    }

    fn verify_reply(
        &self,
        reply: &[u8],
        unit: UnitId,
        function: FunctionCode,
    ) -> Result<(), LinkError> {
        if self.options.verify_crc {
            verify_reply_header(reply, unit, function)?;
            verify_crc(reply)?;
        }
        Ok(())
    }

    async fn read_from_link(
        &self,
        fingerprint: Fingerprint,
    ) -> Result<Bytes, LinkError> {
        let Fingerprint {
            unit,
            address,
            quantity,
            function,
        } = fingerprint;

        let mut link = self.link.lock().await;
        // An exchange for the same request may have completed while waiting
        // for the lock.
        if let Some(response) = self.cache.lookup(&fingerprint) {
            trace!("Cache hit after link lock for {fingerprint:?}");
            return Ok(response);
        }

        let mut request = BytesMut::new();
        encode_read_request(&mut request, unit, function, address, quantity);
        let reply_len = if self.options.verify_crc {
            read_frame_len(quantity)
        } else {
            read_reply_len(quantity)
        };
        let reply = self.exchange(&mut link, &request, reply_len).await?;
        if !self.options.verify_crc {
            self.drain_crc(&mut link).await;
        }
        self.verify_reply(&reply, unit, function)?;

        let data = reply
            .freeze()
            .slice(READ_REPLY_HEADER_LEN..read_reply_len(quantity));
        self.cache.store(fingerprint, data.clone());
        Ok(data)
    }

    async fn write_to_link(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        data: &[u8],
    ) -> Result<(Address, Quantity), LinkError> {
        let mut link = self.link.lock().await;
        let mut request = BytesMut::new();
        encode_write_request(&mut request, unit, address, quantity, data);
        let reply = self.exchange(&mut link, &request, WRITE_REPLY_LEN).await?;
        self.verify_reply(&reply, unit, FunctionCode::WriteMultipleRegisters)?;
        decode_write_reply(&reply)
    }
}

#[cfg(feature = "serial")]
impl RtuBackend<tokio_serial::SerialStream> {
    /// Open the serial port described by `config`.
    pub fn open_serial(
        config: &crate::config::SerialConfig,
        options: RtuOptions,
    ) -> Result<Self, Error> {
        let serial = tokio_serial::SerialStream::open(&config.to_builder())
            .map_err(|err| Error::BackendUnavailable(err.into()))?;
        Ok(Self::with_options(serial, options))
    }
}

impl RtuBackend<tokio::net::TcpStream> {
    /// Connect to a device server that forwards RTU frames verbatim.
    pub async fn connect_tcp(addr: SocketAddr, options: RtuOptions) -> Result<Self, Error> {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(Error::BackendUnavailable)?;
        stream.set_nodelay(true).map_err(Error::BackendUnavailable)?;
        Ok(Self::with_options(stream, options))
    }
}

#[async_trait]
impl<T> Backend for RtuBackend<T>
where
    T: Transport,
{
    async fn read_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        kind: RegisterKind,
    ) -> Result<Bytes, LinkError> {
        let fingerprint = Fingerprint::new(unit, address, quantity, kind.function_code());
        if let Some(response) = self.cache.lookup(&fingerprint) {
            trace!("Cache hit for {fingerprint:?}");
            return Ok(response);
        }
        self.read_from_link(fingerprint).await.map_err(|err| {
            warn!("Reading {quantity} register(s) at {address} from unit {unit} failed: {err}");
            err
        })
    }

    async fn write_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        data: Bytes,
    ) -> (Address, Quantity) {
        match self.write_to_link(unit, address, quantity, &data).await {
            Ok(ack) => ack,
            Err(err) => {
                warn!("Writing {quantity} register(s) at {address} to unit {unit} failed: {err}");
                (0, 0)
            }
        }
    }
}
