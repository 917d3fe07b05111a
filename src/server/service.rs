// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{future::Future, ops::Deref, pin::Pin, sync::Arc};

use log::{debug, trace};

use crate::{
    backend::Backend,
    error::LinkError,
    frame::{Request, Response, UnitRequest},
};

/// A Modbus server service.
pub trait Service {
    /// Requests handled by the service.
    type Request;

    /// Responses sent by the service.
    type Response;

    /// Failures that terminate the connection of the request.
    type Exception;

    /// The future response value.
    type Future: Future<Output = Result<Self::Response, Self::Exception>> + Send;

    /// Process the request and return the response asynchronously.
    fn call(&self, req: Self::Request) -> Self::Future;
}

impl<D> Service for D
where
    D: Deref + ?Sized,
    D::Target: Service,
{
    type Request = <D::Target as Service>::Request;
    type Response = <D::Target as Service>::Response;
    type Exception = <D::Target as Service>::Exception;
    type Future = <D::Target as Service>::Future;

    /// A forwarding blanket impl to support smart pointers around [`Service`].
    fn call(&self, req: Self::Request) -> Self::Future {
        self.deref().call(req)
    }
}

/// Dispatches decoded TCP requests onto the shared [`Backend`].
///
/// Cloning is cheap, all clones share the same backend.
#[derive(Debug)]
pub struct Gateway<B: ?Sized> {
    backend: Arc<B>,
}

impl<B: ?Sized> Clone for Gateway<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B> Gateway<B>
where
    B: Backend + 'static,
{
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::from_shared(Arc::new(backend))
    }
}

impl<B> Gateway<B>
where
    B: Backend + ?Sized + 'static,
{
    #[must_use]
    pub fn from_shared(backend: Arc<B>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    async fn dispatch(backend: Arc<B>, req: UnitRequest) -> Result<Response, LinkError> {
        let UnitRequest { unit, request } = req;
        trace!("Dispatching {request:?} to unit {unit}");
        match request {
            Request::ReadHoldingRegisters(address, quantity) => {
                let data = backend
                    .read_holding_registers(unit, address, quantity)
                    .await?;
                debug!("Unit {unit} holding registers at {address}: {:02X?}", &data[..]);
                Ok(Response::ReadHoldingRegisters(data))
            }
            Request::ReadInputRegisters(address, quantity) => {
                let data = backend
                    .read_input_registers(unit, address, quantity)
                    .await?;
                debug!("Unit {unit} input registers at {address}: {:02X?}", &data[..]);
                Ok(Response::ReadInputRegisters(data))
            }
            Request::WriteMultipleRegisters(address, requested, data) => {
                debug!("Unit {unit} write at {address}: {:02X?}", &data[..]);
                let (address, quantity) = backend
                    .write_registers(unit, address, requested, data)
                    .await;
                Ok(Response::WriteMultipleRegisters {
                    address,
                    quantity,
                    requested,
                })
            }
        }
    }
}

impl<B> Service for Gateway<B>
where
    B: Backend + ?Sized + 'static,
{
    type Request = UnitRequest;
    type Response = Response;
    type Exception = LinkError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, LinkError>> + Send>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        Box::pin(Self::dispatch(Arc::clone(&self.backend), req))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::{
        bytes::Bytes,
        frame::{Address, Quantity, RegisterKind, UnitId},
    };

    use super::*;

    #[derive(Debug, Default)]
    struct MockBackend {
        reads: Mutex<Vec<(UnitId, Address, Quantity, RegisterKind)>>,
        writes: Mutex<Vec<(UnitId, Address, Quantity, Bytes)>>,
        fail_reads: bool,
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn read_registers(
            &self,
            unit: UnitId,
            address: Address,
            quantity: Quantity,
            kind: RegisterKind,
        ) -> Result<Bytes, LinkError> {
            self.reads
                .lock()
                .unwrap()
                .push((unit, address, quantity, kind));
            if self.fail_reads {
                return Err(LinkError::Timeout);
            }
            Ok(Bytes::from(vec![0xAB; usize::from(quantity) * 2]))
        }

        async fn write_registers(
            &self,
            unit: UnitId,
            address: Address,
            quantity: Quantity,
            data: Bytes,
        ) -> (Address, Quantity) {
            self.writes
                .lock()
                .unwrap()
                .push((unit, address, quantity, data));
            (address, quantity - 1)
        }
    }

    #[tokio::test]
    async fn dispatch_reads_by_register_kind() {
        let gateway = Gateway::new(MockBackend::default());
        let rsp = gateway
            .call(UnitRequest {
                unit: 3,
                request: Request::ReadInputRegisters(8, 2),
            })
            .await
            .unwrap();
        assert_eq!(
            rsp,
            Response::ReadInputRegisters(Bytes::from_static(&[0xAB; 4]))
        );
        let rsp = gateway
            .call(UnitRequest {
                unit: 3,
                request: Request::ReadHoldingRegisters(8, 1),
            })
            .await
            .unwrap();
        assert_eq!(
            rsp,
            Response::ReadHoldingRegisters(Bytes::from_static(&[0xAB; 2]))
        );
        assert_eq!(
            *gateway.backend().reads.lock().unwrap(),
            vec![(3, 8, 2, RegisterKind::Input), (3, 8, 1, RegisterKind::Holding)]
        );
    }

    #[tokio::test]
    async fn read_failure_is_an_exception() {
        let gateway = Gateway::new(MockBackend {
            fail_reads: true,
            ..Default::default()
        });
        let err = gateway
            .call(UnitRequest {
                unit: 1,
                request: Request::ReadHoldingRegisters(0, 1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Timeout));
    }

    #[tokio::test]
    async fn write_reports_backend_ack_and_requested_quantity() {
        let gateway = Gateway::new(MockBackend::default());
        let data = Bytes::from_static(&[0x00, 0x01, 0x00, 0x02]);
        let rsp = gateway
            .call(UnitRequest {
                unit: 2,
                request: Request::WriteMultipleRegisters(5, 2, data.clone()),
            })
            .await
            .unwrap();
        assert_eq!(
            rsp,
            Response::WriteMultipleRegisters {
                address: 5,
                quantity: 1,
                requested: 2,
            }
        );
        assert_eq!(*gateway.backend().writes.lock().unwrap(), vec![(2, 5, 2, data)]);
    }
}
