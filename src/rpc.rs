//! Blocking request/response transport.
//!
//! One packet each way per connection: the client writes its request and closes
//! its write side, the server reads until EOF, answers, and closes. There is no
//! framing beyond the packet header.

use crate::codec::CodecError;
use crate::packet::BluePacket;
use crate::registry::Registry;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5900;
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Empty response")]
    EmptyResponse,
    #[error("Null request")]
    NullRequest,
    #[error("No handler for packet {0}")]
    NoHandler(String),
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

type Handler = Box<dyn Fn(Box<dyn BluePacket>) -> anyhow::Result<Option<Box<dyn BluePacket>>> + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&RpcError) -> Option<Box<dyn BluePacket>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// `host:port`
    pub address: String,
    pub read_timeout: Option<Duration>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            address: format!("127.0.0.1:{}", DEFAULT_PORT),
            read_timeout: None,
        }
    }
}

impl RpcConfig {
    pub fn new(address: impl Into<String>) -> Self {
        RpcConfig {
            address: address.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    config: RpcConfig,
    registry: Arc<Registry>,
}

impl RpcClient {
    pub fn new(config: RpcConfig, registry: Arc<Registry>) -> Self {
        RpcClient { config, registry }
    }

    /// Connect, write `request`, half-close, read the response until EOF.
    /// A response with header 0 is `None`.
    pub fn send(&self, request: &dyn BluePacket) -> Result<Option<Box<dyn BluePacket>>, RpcError> {
        let bytes = request.serialize()?;
        let mut stream = TcpStream::connect(&self.config.address)?;
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.write_all(&bytes)?;
        stream.shutdown(Shutdown::Write)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        if response.is_empty() {
            return Err(RpcError::EmptyResponse);
        }
        debug!("{} -> {} response bytes", request.type_name(), response.len());
        Ok(self.registry.deserialize(&response)?)
    }
}

/// Dispatches decoded requests to handlers keyed by packet hash.
pub struct RpcServer {
    registry: Arc<Registry>,
    handlers: HashMap<i64, Handler>,
    on_error: Option<ErrorHandler>,
}

impl RpcServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        RpcServer {
            registry,
            handlers: HashMap::new(),
            on_error: None,
        }
    }

    pub fn on_receive<F>(&mut self, packet_hash: i64, handler: F) -> &mut Self
    where
        F: Fn(Box<dyn BluePacket>) -> anyhow::Result<Option<Box<dyn BluePacket>>> + Send + Sync + 'static,
    {
        self.handlers.insert(packet_hash, Box::new(handler));
        self
    }

    /// Turn a failure into a response packet; without it failures only get logged.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&RpcError) -> Option<Box<dyn BluePacket>> + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Decode a request and run its handler.
    pub fn execute(&self, request: &[u8]) -> Result<Option<Box<dyn BluePacket>>, RpcError> {
        let packet = self.registry.deserialize(request)?.ok_or(RpcError::NullRequest)?;
        let handler = self
            .handlers
            .get(&packet.packet_hash())
            .ok_or_else(|| RpcError::NoHandler(packet.type_name().to_string()))?;
        debug!("execute {}", packet.to_debug_string());
        Ok(handler(packet)?)
    }

    /// Serve one connection: read until EOF, answer, close.
    pub fn handle_connection(&self, mut stream: TcpStream) -> Result<(), RpcError> {
        let mut request = Vec::new();
        stream.read_to_end(&mut request)?;
        let response = match self.execute(&request) {
            Ok(r) => r,
            Err(e) => {
                warn!("request failed: {}", e);
                self.on_error.as_ref().and_then(|h| h(&e))
            }
        };
        if let Some(packet) = response {
            stream.write_all(&packet.serialize()?)?;
        }
        stream.shutdown(Shutdown::Both)?;
        Ok(())
    }

    /// Accept connections with a pool of `workers` threads. Stops after
    /// `max_connections` accepted connections when given, otherwise runs until
    /// the listener fails.
    pub fn run(&self, listener: &TcpListener, workers: usize, max_connections: Option<usize>) -> Result<(), RpcError> {
        info!("listening on {}", listener.local_addr()?);
        let (tx, rx) = mpsc::channel::<TcpStream>();
        let rx = Mutex::new(rx);
        std::thread::scope(|scope| {
            for _ in 0..workers.max(1) {
                scope.spawn(|| loop {
                    let next = match rx.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => return,
                    };
                    let Ok(stream) = next else { return };
                    if let Err(e) = self.handle_connection(stream) {
                        warn!("connection failed: {}", e);
                    }
                });
            }
            let mut accepted = 0usize;
            let result = loop {
                if max_connections.map_or(false, |max| accepted >= max) {
                    break Ok(());
                }
                match listener.accept() {
                    Ok((stream, peer)) => {
                        debug!("connection from {}", peer);
                        accepted += 1;
                        if tx.send(stream).is_err() {
                            break Ok(());
                        }
                    }
                    Err(e) => break Err(RpcError::Io(e)),
                }
            };
            drop(tx);
            result
        })
    }
}

/// Bind a listener on `address`.
pub fn bind(address: impl ToSocketAddrs) -> Result<TcpListener, RpcError> {
    Ok(TcpListener::bind(address)?)
}
