// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-lived cache of raw register replies.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::{
    bytes::Bytes,
    frame::{Address, FunctionCode, Quantity, UnitId},
};

/// Default validity of a cached reply.
pub const CACHE_TTL: Duration = Duration::from_secs(1);

/// Identifies a read request independent of the connection that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub unit: UnitId,
    pub address: Address,
    pub quantity: Quantity,
    pub function: FunctionCode,
}

impl Fingerprint {
    #[must_use]
    pub const fn new(
        unit: UnitId,
        address: Address,
        quantity: Quantity,
        function: FunctionCode,
    ) -> Self {
        Self {
            unit,
            address,
            quantity,
            function,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    response: Bytes,
    recorded_at: Instant,
}

/// Replies are overwritten by the next successful read and never evicted.
///
/// Safe for concurrent use without any outer lock.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_ttl(CACHE_TTL)
    }
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached reply if it was recorded less than `ttl` ago.
    #[must_use]
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Bytes> {
        let entry = self.entries.get(fingerprint)?;
        if entry.recorded_at.elapsed() < self.ttl {
            Some(entry.response.clone())
        } else {
            None
        }
    }

    pub fn store(&self, fingerprint: Fingerprint, response: Bytes) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                response,
                recorded_at: Instant::now(),
            },
        );
    }

    /// Number of entries, including stale ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
