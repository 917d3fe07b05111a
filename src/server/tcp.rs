// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server skeleton

use std::{fmt, future::Future, io, net::SocketAddr};

use futures_util::{SinkExt as _, StreamExt as _};
use log::{debug, error, trace};
use socket2::{Domain, Socket, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task::JoinSet,
};
use tokio_util::codec::Framed;

use crate::{
    codec::tcp::ServerCodec,
    frame::{
        tcp::{RequestAdu, ResponseAdu},
        Response, UnitRequest,
    },
    Error,
};

use super::{Service, Terminated};

/// Accepts Modbus TCP connections and runs one worker per connection.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Attach the server to a TCP listener.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// Open a reusable listening socket on `addr`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn bind(addr: SocketAddr) -> crate::Result<Self> {
        listener(addr).map(Self::new).map_err(Error::Bind)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until accepting a connection fails.
    pub async fn serve<S>(&self, service: S) -> io::Result<Terminated>
    where
        S: Service<Request = UnitRequest, Response = Response> + Clone + Send + Sync + 'static,
        S::Exception: Into<Error> + Send,
    {
        self.serve_until(service, std::future::pending()).await
    }

    /// Serve requests until `abort_signal` resolves.
    ///
    /// All open connections are closed on abort.
    pub async fn serve_until<S, X>(&self, service: S, abort_signal: X) -> io::Result<Terminated>
    where
        S: Service<Request = UnitRequest, Response = Response> + Clone + Send + Sync + 'static,
        S::Exception: Into<Error> + Send,
        X: Future<Output = ()>,
    {
        let mut workers = JoinSet::new();
        let terminated = tokio::select! {
            res = self.accept_loop(&service, &mut workers) => res,
            () = abort_signal => {
                debug!("Aborting server with {} open connection(s)", workers.len());
                Ok(Terminated::Aborted)
            }
        };
        workers.shutdown().await;
        terminated
    }

    async fn accept_loop<S>(
        &self,
        service: &S,
        workers: &mut JoinSet<()>,
    ) -> io::Result<Terminated>
    where
        S: Service<Request = UnitRequest, Response = Response> + Clone + Send + Sync + 'static,
        S::Exception: Into<Error> + Send,
    {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, socket_addr) = accepted.map_err(|err| {
                        error!("Failed to accept connection: {err}");
                        err
                    })?;
                    debug!("Accepted connection from {socket_addr}");
                    let framed = Framed::new(stream, ServerCodec::default());
                    let service = service.clone();
                    workers.spawn(async move {
                        if let Err(err) = process(framed, service).await {
                            debug!("Closing connection from {socket_addr}: {err}");
                        } else {
                            debug!("Connection from {socket_addr} closed");
                        }
                    });
                }
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
            }
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.listener.local_addr() {
            Ok(addr) => write!(f, "Modbus TCP server on {addr}"),
            Err(_) => f.write_str("Modbus TCP server"),
        }
    }
}

/// The request-response loop spawned by `serve_until` for each client.
async fn process<T, S>(mut framed: Framed<T, ServerCodec>, service: S) -> Result<(), Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: Service<Request = UnitRequest, Response = Response>,
    S::Exception: Into<Error>,
{
    loop {
        let Some(request) = framed.next().await else {
            // TCP socket closed
            break;
        };
        let request: RequestAdu = request?;
        trace!("Received {request:?}");
        let hdr = request.hdr;
        let pdu = service.call(request.into()).await.map_err(Into::into)?;
        framed.send(ResponseAdu { hdr, pdu }).await?;
    }
    Ok(())
}

/// Start TCP listener - configure and open TCP socket
fn listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}
