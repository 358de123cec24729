// UDP datagram streamer
//
// Binds a UDP socket and decodes each datagram with the parser registered for
// the configured encoding. Datagrams that fail to parse are counted as
// notifications and otherwise ignored.

use crate::streaming::args::parse_args;
use crate::streaming::parser::{MessageParser, ParserOptions};
use crate::streaming::streamer::{DataStreamer, StreamerBase, StreamerContext};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

pub const UDP_STREAMER: &str = "udp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UdpConfig {
    pub bind_addr: String,
    /// Parser encoding used for every datagram
    pub encoding: String,
    /// Channel name prefix and group
    pub prefix: String,
    /// Message field holding the timestamp; receive time is used otherwise
    pub timestamp_field: Option<String>,
    pub buffer_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9870".to_string(),
            encoding: "json".to_string(),
            prefix: "udp".to_string(),
            timestamp_field: None,
            buffer_size: 65_535,
        }
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

async fn produce(
    socket: UdpSocket,
    mut parser: Box<dyn MessageParser>,
    buffer_size: usize,
    ctx: StreamerContext,
) -> StreamResult<()> {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancelled() => {
                return Ok(());
            }

            received = socket.recv(&mut buffer) => {
                let len = received
                    .map_err(|e| StreamError::Network(format!("UDP receive failed: {}", e)))?;
                let payload = &buffer[..len];
                let timestamp = now_secs();

                match ctx.try_write_batch(|map| parser.parse_message(payload, timestamp, map)) {
                    None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Failed to parse UDP datagram: {}", e);
                        ctx.record_parse_error();
                    }
                }
            }
        }
    }
}

pub struct UdpStreamer {
    base: StreamerBase,
    local_addr: Option<SocketAddr>,
}

impl UdpStreamer {
    pub fn new() -> Self {
        Self {
            base: StreamerBase::new(UDP_STREAMER).with_notification_label("Parse errors"),
            local_addr: None,
        }
    }

    /// Address the socket is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn open(&self, args: &[String]) -> StreamResult<(UdpSocket, Box<dyn MessageParser>, usize)> {
        let config: UdpConfig = parse_args(args)?;
        if config.buffer_size == 0 {
            return Err(StreamError::InvalidConfig(
                "buffer_size must be positive".to_string(),
            ));
        }

        let parsers = self
            .base
            .available_parsers()
            .ok_or_else(|| StreamError::NoParser(config.encoding.clone()))?;
        let mut options = ParserOptions::new(config.prefix.clone());
        options.timestamp_field = config.timestamp_field.clone();
        let parser = parsers.create(&config.encoding, &options)?;

        log::info!("Binding UDP socket: {}", config.bind_addr);
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| StreamError::Network(format!("UDP bind failed: {}", e)))?;

        Ok((socket, parser, config.buffer_size))
    }
}

impl Default for UdpStreamer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStreamer for UdpStreamer {
    fn base(&self) -> &StreamerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StreamerBase {
        &mut self.base
    }

    async fn start(&mut self, args: &[String]) -> StreamResult<()> {
        self.base.begin_start()?;

        let (socket, parser, buffer_size) = match self.open(args).await {
            Ok(opened) => opened,
            Err(e) => {
                self.base.abort_start(&e);
                return Err(e);
            }
        };

        self.local_addr = socket.local_addr().ok();
        log::info!("UDP streamer listening on {:?}", self.local_addr);

        let ctx = self.base.context();
        self.base.launch(produce(socket, parser, buffer_size, ctx));
        Ok(())
    }

    async fn shutdown(&mut self) -> StreamResult<()> {
        self.base.shutdown_task().await?;
        self.local_addr = None;
        Ok(())
    }
}
