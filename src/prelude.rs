// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::{
    backend::{
        param::{ParamBackend, ParameterIndex},
        rtu::{RtuBackend, RtuOptions},
    },
    cache::ResponseCache,
    config::{GatewayConfig, LinkConfig, Parity, SerialConfig},
    frame::{Address, FunctionCode, Quantity, Request, Response, UnitId, UnitRequest},
    server::{tcp::Server, Gateway, Terminated},
    Error, FrameError, LinkError,
};

///////////////////////////////////////////////////////////////////
/// Traits
///////////////////////////////////////////////////////////////////
pub use crate::{
    backend::{param::ParameterBus, Backend, Transport},
    server::Service,
};
