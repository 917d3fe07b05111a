// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration of the field link and the TCP endpoint.

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use thiserror::Error;

use crate::{
    backend::{
        rtu::{RtuBackend, RtuOptions, DEFAULT_TIMEOUT},
        Backend,
    },
    cache::{ResponseCache, CACHE_TTL},
};

/// The well-known Modbus TCP port.
pub const DEFAULT_TCP_PORT: u16 = 502;

pub const DEFAULT_BAUD_RATE: u32 = 38400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    None,
    Odd,
    #[default]
    Even,
}

#[derive(Debug, Error)]
#[error("invalid parity: {0} (expected N, E or O)")]
pub struct InvalidParity(String);

impl FromStr for Parity {
    type Err = InvalidParity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N" | "n" => Ok(Self::None),
            "E" | "e" => Ok(Self::Even),
            "O" | "o" => Ok(Self::Odd),
            other => Err(InvalidParity(other.to_owned())),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "N",
            Self::Odd => "O",
            Self::Even => "E",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Settings of a serial field link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,

    /// Upper bound for a single request/reply exchange.
    pub timeout: Duration,
}

impl SerialConfig {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    #[must_use]
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(feature = "serial")]
    #[must_use]
    pub fn to_builder(&self) -> tokio_serial::SerialPortBuilder {
        let data_bits = match self.data_bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        };
        let parity = match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        };
        tokio_serial::new(self.path.as_str(), self.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(self.timeout)
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data_bits = match self.data_bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(
            f,
            "{} {} {data_bits}{}{stop_bits}",
            self.path, self.baud_rate, self.parity
        )
    }
}

/// The physical link that all requests are repeated onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkConfig {
    Serial(SerialConfig),

    /// RTU frames forwarded verbatim over TCP, e.g. to a terminal server.
    RtuOverTcp { addr: SocketAddr, timeout: Duration },
}

impl LinkConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Serial(serial) => serial.timeout,
            Self::RtuOverTcp { timeout, .. } => *timeout,
        }
    }
}

impl fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(serial) => write!(f, "serial {serial}"),
            Self::RtuOverTcp { addr, .. } => write!(f, "RTU over TCP {addr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub link: LinkConfig,
    pub cache_ttl: Duration,

    /// Check CRC and header echo of RTU replies.
    pub verify_crc: bool,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(link: LinkConfig) -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_TCP_PORT)),
            link,
            cache_ttl: CACHE_TTL,
            verify_crc: false,
        }
    }

    #[must_use]
    pub fn listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    #[must_use]
    pub fn verify_crc(mut self, verify_crc: bool) -> Self {
        self.verify_crc = verify_crc;
        self
    }

    #[must_use]
    pub fn rtu_options(&self) -> RtuOptions {
        RtuOptions::default()
            .timeout(self.link.timeout())
            .verify_crc(self.verify_crc)
    }

    /// Open the configured link as a shared RTU backend.
    pub async fn open_backend(&self) -> crate::Result<Arc<dyn Backend>> {
        let cache = ResponseCache::with_ttl(self.cache_ttl);
        let options = self.rtu_options();
        let backend: Arc<dyn Backend> = match &self.link {
            #[cfg(feature = "serial")]
            LinkConfig::Serial(serial) => {
                Arc::new(RtuBackend::open_serial(serial, options)?.with_cache(cache))
            }
            #[cfg(not(feature = "serial"))]
            LinkConfig::Serial(serial) => {
                return Err(crate::Error::BackendUnavailable(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    format!("serial link {} requires the `serial` feature", serial.path),
                )));
            }
            LinkConfig::RtuOverTcp { addr, .. } => Arc::new(
                RtuBackend::connect_tcp(*addr, options)
                    .await?
                    .with_cache(cache),
            ),
        };
        Ok(backend)
    }
}
