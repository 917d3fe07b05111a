// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Many TCP clients sharing one simulated RTU link.

#[allow(unused)]
mod mock;

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use tokio::{net::TcpStream, task::JoinSet};

use mbs_repeater::backend::rtu::RtuBackend;

use crate::mock::{exchange, spawn_rtu_device, start_server};

fn read_holding_request(transaction_id: u16, unit: u8, address: u16, quantity: u16) -> Vec<u8> {
    let mut request = Vec::with_capacity(12);
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request.extend_from_slice(&[0x00, 0x00, 0x00, 0x06, unit, 0x03]);
    request.extend_from_slice(&address.to_be_bytes());
    request.extend_from_slice(&quantity.to_be_bytes());
    request
}

#[tokio::test]
async fn identical_concurrent_reads_use_the_link_once() -> anyhow::Result<()> {
    let (link, device) = tokio::io::duplex(1024);
    let requests = spawn_rtu_device(device, Duration::from_millis(50));
    let (server_addr, _server) = start_server(Arc::new(RtuBackend::new(link))).await?;

    let mut clients = JoinSet::new();
    for transaction_id in 0..8u16 {
        clients.spawn(async move {
            let mut stream = TcpStream::connect(server_addr).await?;
            let request = read_holding_request(transaction_id, 0x02, 0x0010, 2);
            let reply = exchange(&mut stream, &request, 13).await?;
            anyhow::Ok((transaction_id, reply))
        });
    }
    while let Some(res) = clients.join_next().await {
        let (transaction_id, reply) = res??;
        assert_eq!(reply[..2], transaction_id.to_be_bytes());
        assert_eq!(
            reply[2..],
            [0x00, 0x00, 0x00, 0x07, 0x02, 0x03, 0x04, 0x02, 0x10, 0x02, 0x11]
        );
    }
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn distinct_concurrent_reads_are_serialized() -> anyhow::Result<()> {
    let (link, device) = tokio::io::duplex(1024);
    let requests = spawn_rtu_device(device, Duration::from_millis(5));
    let (server_addr, _server) = start_server(Arc::new(RtuBackend::new(link))).await?;

    let mut clients = JoinSet::new();
    for unit in 1..=6u8 {
        clients.spawn(async move {
            let mut stream = TcpStream::connect(server_addr).await?;
            let request = read_holding_request(u16::from(unit), unit, 0x0000, 1);
            let reply = exchange(&mut stream, &request, 11).await?;
            anyhow::Ok((unit, reply))
        });
    }
    while let Some(res) = clients.join_next().await {
        let (unit, reply) = res??;
        // No bytes of another exchange leak into the reply.
        assert_eq!(reply[6..], [unit, 0x03, 0x02, unit, 0x00]);
    }
    assert_eq!(requests.load(Ordering::SeqCst), 6);
    Ok(())
}

#[tokio::test]
async fn cached_reply_expires() -> anyhow::Result<()> {
    let (link, device) = tokio::io::duplex(1024);
    let requests = spawn_rtu_device(device, Duration::ZERO);
    let backend = RtuBackend::new(link)
        .with_cache(mbs_repeater::cache::ResponseCache::with_ttl(Duration::from_millis(100)));
    let (server_addr, _server) = start_server(Arc::new(backend)).await?;
    let mut stream = TcpStream::connect(server_addr).await?;

    let request = read_holding_request(1, 0x01, 0x0005, 1);
    exchange(&mut stream, &request, 11).await?;
    exchange(&mut stream, &request, 11).await?;
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    exchange(&mut stream, &request, 11).await?;
    assert_eq!(requests.load(Ordering::SeqCst), 2);
    Ok(())
}
