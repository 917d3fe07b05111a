// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP to Modbus RTU repeater

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context as _;
use clap::Parser;

use mbs_repeater::{
    config::{GatewayConfig, LinkConfig, Parity, SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT},
    server::{tcp::Server, Gateway, Terminated},
};

/// Repeat Modbus TCP requests onto a shared Modbus RTU link
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TCP port to listen on
    #[arg(short = 'l', long, default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,

    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    listen_host: IpAddr,

    /// Serial port of the field link
    #[arg(short = 'c', long, default_value = "COM1")]
    port: String,

    /// Serial baud rate
    #[arg(short = 'b', long, default_value_t = DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// Serial parity (N, E or O)
    #[arg(short = 'p', long, default_value_t = Parity::Even)]
    parity: Parity,

    /// Link timeout per request in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Forward RTU frames to this TCP address instead of a serial port
    #[arg(long, value_name = "ADDR")]
    rtu_tcp: Option<SocketAddr>,

    /// Verify CRC and header of every RTU reply
    #[arg(long)]
    verify_crc: bool,

    /// Print debug information
    #[arg(short = 'd', long)]
    debug: bool,
}

impl Args {
    fn gateway_config(&self) -> GatewayConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        let link = match self.rtu_tcp {
            Some(addr) => LinkConfig::RtuOverTcp { addr, timeout },
            None => LinkConfig::Serial(
                SerialConfig::new(&self.port)
                    .baud_rate(self.baudrate)
                    .parity(self.parity)
                    .timeout(timeout),
            ),
        };
        GatewayConfig::new(link)
            .listen(SocketAddr::new(self.listen_host, self.tcp_port))
            .verify_crc(self.verify_crc)
    }
}

const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn start_time<Tz>(now: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    now.format(START_TIME_FORMAT).to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, default_filter),
    );

    let config = args.gateway_config();
    log::info!("Modbus TCP to serial repeater");
    log::info!("listen on tcp: {}", config.listen);
    log::info!("field link:    {}", config.link);
    log::info!("verify crc:    {}", config.verify_crc);
    log::info!("start time:    {}", start_time(chrono::Local::now()));

    let backend = config
        .open_backend()
        .await
        .with_context(|| format!("Failed to open {}", config.link))?;
    let server = Server::bind(config.listen)
        .with_context(|| format!("Failed to listen on {}", config.listen))?;
    log::info!("press Ctrl+C to exit");

    let abort_signal = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };
    match server
        .serve_until(Gateway::from_shared(backend), abort_signal)
        .await?
    {
        Terminated::Aborted => log::info!("Shutting down"),
        Terminated::Finished => log::info!("Server finished"),
    }
    Ok(())
}
