// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parameter-bus backend
//!
//! Field devices on a parameter bus expose numbered float parameters instead
//! of registers. Parameter `n` (1-based) occupies registers `2n - 2` and
//! `2n - 1`.
//!
//! Reading holding registers returns each parameter truncated to an unsigned
//! integer and repeated in both of its registers. Reading input registers
//! returns the parameters as big-endian IEEE-754 floats. Writes always
//! transfer whole floats.

use std::{fmt, ops::Range, time::Duration};

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder as _};
use log::{trace, warn};
use tokio::sync::Mutex;

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    cache::{Fingerprint, ResponseCache},
    error::LinkError,
    frame::{Address, Quantity, RegisterKind, UnitId},
};

use super::Backend;

/// 1-based index of a float parameter.
pub type ParameterIndex = u32;

/// Default upper bound for a single parameter bus call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Driver of a parameter bus.
#[async_trait]
pub trait ParameterBus: fmt::Debug + Send {
    /// Read the parameters `indices` of `unit`, in order.
    async fn get_parameters(
        &mut self,
        unit: UnitId,
        indices: Range<ParameterIndex>,
    ) -> Result<Vec<f32>, LinkError>;

    /// Write a single parameter.
    async fn set_parameter(
        &mut self,
        unit: UnitId,
        index: ParameterIndex,
        value: f32,
    ) -> Result<(), LinkError>;
}

/// The parameter holding register `address`.
#[must_use]
pub fn parameter_index(address: Address) -> ParameterIndex {
    ParameterIndex::from(address) / 2 + 1
}

/// The parameters covering `quantity` registers starting at `address`.
#[must_use]
pub fn parameter_range(address: Address, quantity: Quantity) -> Range<ParameterIndex> {
    let end = (ParameterIndex::from(address) + ParameterIndex::from(quantity)) / 2 + 1;
    parameter_index(address)..end
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pack_registers(
    values: &[f32],
    quantity: Quantity,
    kind: RegisterKind,
) -> Result<Bytes, LinkError> {
    let quantity = usize::from(quantity);
    let mut data = BytesMut::with_capacity(quantity * 2);
    match kind {
        RegisterKind::Holding => {
            if values.len() * 2 != quantity {
                return Err(LinkError::MalformedReply(format!(
                    "{} parameter(s) cannot fill {quantity} holding register(s)",
                    values.len()
                )));
            }
            for value in values {
                // Saturating truncation towards zero
                let word = *value as u16;
                data.put_u16(word);
                data.put_u16(word);
            }
        }
        RegisterKind::Input => {
            if values.len() != quantity / 2 {
                return Err(LinkError::MalformedReply(format!(
                    "{} parameter(s) cannot fill {quantity} input register(s)",
                    values.len()
                )));
            }
            for value in values {
                data.put_f32(*value);
            }
        }
    }
    Ok(data.freeze())
}

/// Maps register requests onto a [`ParameterBus`].
#[derive(Debug)]
pub struct ParamBackend<B> {
    bus: Mutex<B>,
    cache: ResponseCache,
    timeout: Duration,
}

impl<B> ParamBackend<B>
where
    B: ParameterBus,
{
    #[must_use]
    pub fn new(bus: B) -> Self {
        Self::with_timeout(bus, DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(bus: B, timeout: Duration) -> Self {
        Self {
            bus: Mutex::new(bus),
            cache: ResponseCache::default(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    async fn read_from_bus(
        &self,
        fingerprint: Fingerprint,
        kind: RegisterKind,
    ) -> Result<Bytes, LinkError> {
        let Fingerprint {
            unit,
            address,
            quantity,
            ..
        } = fingerprint;

        let mut bus = self.bus.lock().await;
        if let Some(response) = self.cache.lookup(&fingerprint) {
            trace!("Cache hit after bus lock for {fingerprint:?}");
            return Ok(response);
        }

        let indices = parameter_range(address, quantity);
        let values = tokio::time::timeout(self.timeout, bus.get_parameters(unit, indices))
            .await
            .map_err(|_| LinkError::Timeout)??;
        if values.is_empty() {
            return Err(LinkError::MalformedReply("no parameters".to_owned()));
        }
        let data = pack_registers(&values, quantity, kind)?;
        self.cache.store(fingerprint, data.clone());
        Ok(data)
    }
}

#[async_trait]
impl<B> Backend for ParamBackend<B>
where
    B: ParameterBus,
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
        self.read_from_bus(fingerprint, kind).await.map_err(|err| {
            warn!("Reading {quantity} register(s) at {address} from unit {unit} failed: {err}");
            err
        })
    }

    /// Writes one parameter per 4 bytes of `data` and stops at the first
    /// failure.
    async fn write_registers(
        &self,
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        data: Bytes,
    ) -> (Address, Quantity) {
        let mut bus = self.bus.lock().await;
        let mut index = parameter_index(address);
        let mut written: Quantity = 0;
        let mut offset = 0;
        while written < quantity {
            let Some(chunk) = data.get(offset..offset + 4) else {
                warn!("Incomplete float at register {address} + {written} for unit {unit}");
                break;
            };
            let value = BigEndian::read_f32(chunk);
            let result = tokio::time::timeout(self.timeout, bus.set_parameter(unit, index, value))
                .await
                .map_err(|_| LinkError::Timeout)
                .and_then(|res| res);
            if let Err(err) = result {
                warn!("Writing parameter {index} of unit {unit} failed: {err}");
                break;
            }
            index += 1;
            written += 2;
            offset += 4;
        }
        (address, written)
    }
}
