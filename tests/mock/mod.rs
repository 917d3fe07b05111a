// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _, DuplexStream},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use mbs_repeater::{
    backend::Backend,
    bytes::Bytes,
    codec::rtu::calc_crc,
    frame::{Address, Quantity, RegisterKind, UnitId},
    server::{tcp::Server, Gateway, Terminated},
    LinkError,
};

pub const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers every read with the register addresses as values.
#[derive(Debug, Default)]
pub struct TestBackend {
    pub fail_reads: bool,
    pub reads: AtomicUsize,
    pub writes: Mutex<Vec<(UnitId, Address, Quantity, Bytes)>>,
}

#[async_trait]
impl Backend for TestBackend {
    async fn read_registers(
        &self,
        _unit: UnitId,
        address: Address,
        quantity: Quantity,
        _kind: RegisterKind,
    ) -> Result<Bytes, LinkError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(LinkError::Timeout);
        }
        let data: Vec<u8> = (address..address + quantity)
            .flat_map(u16::to_be_bytes)
            .collect();
        Ok(data.into())
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
        (address, quantity)
    }
}

/// Serve `backend` on an ephemeral local port.
pub async fn start_server<B>(backend: Arc<B>) -> anyhow::Result<(SocketAddr, JoinHandle<io::Result<Terminated>>)>
where
    B: Backend + 'static,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let server_addr = listener.local_addr()?;
    let server = Server::new(listener);
    let task = tokio::spawn(async move { server.serve(Gateway::from_shared(backend)).await });
    Ok((server_addr, task))
}

/// Send a raw request frame and receive a reply of `reply_len` bytes.
pub async fn exchange(
    stream: &mut TcpStream,
    request: &[u8],
    reply_len: usize,
) -> anyhow::Result<Vec<u8>> {
    stream.write_all(request).await?;
    let mut reply = vec![0; reply_len];
    tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut reply)).await??;
    Ok(reply)
}

/// Wait until the peer closes `stream`, failing if it sends anything.
pub async fn expect_closed(stream: &mut TcpStream) -> anyhow::Result<()> {
    let mut rest = Vec::new();
    let n = tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut rest)).await??;
    anyhow::ensure!(n == 0, "unexpected reply {rest:02X?}");
    Ok(())
}

/// A simulated RTU field device answering register reads.
///
/// Every register holds `unit * 0x100 + address`. Returns the number of
/// requests the device has received.
pub fn spawn_rtu_device(mut device: DuplexStream, delay: Duration) -> Arc<AtomicUsize> {
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    tokio::spawn(async move {
        let mut request = [0; 8];
        while device.read_exact(&mut request).await.is_ok() {
            counter.fetch_add(1, Ordering::SeqCst);
            let unit = request[0];
            let function = request[1];
            let address = u16::from_be_bytes([request[2], request[3]]);
            let quantity = u16::from_be_bytes([request[4], request[5]]);
            let mut reply = vec![unit, function, (quantity * 2) as u8];
            for register in address..address + quantity {
                let value = u16::from(unit) * 0x100 + register;
                reply.extend_from_slice(&value.to_be_bytes());
            }
            let crc = calc_crc(&reply);
            reply.extend_from_slice(&crc.to_be_bytes());
            tokio::time::sleep(delay).await;
            if device.write_all(&reply).await.is_err() {
                break;
            }
        }
    });
    requests
}
