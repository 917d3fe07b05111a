// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test to demonstrate that TCP server properly disconnects clients when cancelled

#[allow(unused)]
mod mock;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};

use mbs_repeater::server::{tcp::Server, Gateway, Terminated};

use crate::mock::{exchange, expect_closed, TestBackend};

const READ_INPUT_REGISTER: [u8; 12] = [
    0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01,
];

#[tokio::test]
async fn test_server_shutdown_disconnects_clients() -> anyhow::Result<()> {
    let socket_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let listener = TcpListener::bind(socket_addr).await?;
    let server_addr = listener.local_addr()?;

    let server = Server::new(listener);
    let (abort_tx, abort_rx) = tokio::sync::oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        let abort_signal = async move {
            abort_rx.await.ok();
        };
        server
            .serve_until(Gateway::new(TestBackend::default()), abort_signal)
            .await
    });

    let mut client = TcpStream::connect(server_addr).await?;
    let reply = exchange(&mut client, &READ_INPUT_REGISTER, 11).await?;
    assert_eq!(reply[..6], [0x00, 0x01, 0x00, 0x00, 0x00, 0x05]);

    abort_tx.send(()).unwrap();

    let result = timeout(Duration::from_secs(2), server_task).await??;
    assert!(matches!(result, Ok(Terminated::Aborted)));

    // The worker of the open connection has been aborted.
    expect_closed(&mut client).await?;
    Ok(())
}

#[tokio::test]
async fn test_bound_server_stops_accepting_after_shutdown() -> anyhow::Result<()> {
    let server = Server::bind("127.0.0.1:0".parse()?)?;
    let server_addr = server.local_addr()?;
    let backend = Arc::new(TestBackend::default());

    let (abort_tx, abort_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server
            .serve_until(Gateway::from_shared(backend), async move {
                abort_rx.await.ok();
            })
            .await
    });

    let mut client = TcpStream::connect(server_addr).await?;
    exchange(&mut client, &READ_INPUT_REGISTER, 11).await?;

    abort_tx.send(()).unwrap();
    timeout(Duration::from_secs(2), server_task).await???;

    assert!(TcpStream::connect(server_addr).await.is_err());
    Ok(())
}
