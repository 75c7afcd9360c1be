//! # Connections and the Connection Provider
//!
//! Purpose: Hand a pipeline a live, authenticated connection for a named
//! configuration, and send a whole batch over it in one round trip.
//!
//! ## Design Principles
//! 1. **Injected Registry**: `ConnectionRegistry` is a plain value passed to
//!    `Pipeline::new`; there is no process-wide connection map.
//! 2. **Trait Seams**: `Transport` and `ConnectionProvider` let tests swap in
//!    fakes without a socket.
//! 3. **Broken Means Reconnect**: A connection whose round trip failed is
//!    never reused as-is; the next round trip dials again.
//! 4. **Buffer Reuse**: Each connection keeps its own reply line buffer.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};

use bytes::BytesMut;
use tracing::{debug, info, warn};

use cachepipe_common::{
    ClientError, ClientResult, ConnectionConfig, StoreConfig, DEFAULT_CONNECTION,
};

use crate::batch::Batch;
use crate::resp::{encode_command, read_response, RespValue};

/// Batch primitive of the store client: send everything, read every reply.
pub trait Transport: Send {
    /// Writes the whole batch and returns exactly `batch.len()` replies in
    /// command order. Error replies are returned as values, not errors.
    fn round_trip(&mut self, batch: &Batch) -> ClientResult<Vec<RespValue>>;
}

/// Source of live connections keyed by configuration name.
pub trait ConnectionProvider {
    /// Name used when the caller does not pick one.
    fn default_connection(&self) -> &str {
        DEFAULT_CONNECTION
    }

    /// Returns a ready-to-pipeline connection, or an error if the name is not
    /// configured or the store is unreachable.
    fn get_connection(&self, name: &str) -> ClientResult<Box<dyn Transport>>;
}

/// Provider backed by TCP connections built from a `StoreConfig`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    config: StoreConfig,
}

impl ConnectionRegistry {
    pub fn new(config: StoreConfig) -> Self {
        ConnectionRegistry { config }
    }
}

impl ConnectionProvider for ConnectionRegistry {
    fn default_connection(&self) -> &str {
        &self.config.default_connection
    }

    fn get_connection(&self, name: &str) -> ClientResult<Box<dyn Transport>> {
        let config = self
            .config
            .connection(name)
            .ok_or_else(|| ClientError::UnknownConnection {
                name: name.to_string(),
            })?;
        let conn = TcpConnection::connect(config.clone())?;
        info!(connection = name, addr = %config.addr, "opened store connection");
        Ok(Box::new(conn))
    }
}

/// Single TCP connection with a reusable reply buffer.
pub struct TcpConnection {
    config: ConnectionConfig,
    // None after a failed round trip; redialed lazily.
    reader: Option<BufReader<TcpStream>>,
    line_buf: Vec<u8>,
}

impl TcpConnection {
    /// Dials the store and performs AUTH/SELECT as configured.
    pub fn connect(config: ConnectionConfig) -> ClientResult<Self> {
        let mut line_buf = Vec::with_capacity(128);
        let reader = open(&config, &mut line_buf)?;
        Ok(TcpConnection {
            config,
            reader: Some(reader),
            line_buf,
        })
    }

    fn send_and_read(&mut self, batch: &Batch) -> ClientResult<Vec<RespValue>> {
        if self.reader.is_none() {
            debug!(addr = %self.config.addr, "redialing broken connection");
            self.reader = Some(open(&self.config, &mut self.line_buf)?);
        }
        let reader = self.reader.as_mut().ok_or(ClientError::Protocol)?;

        let stream = reader.get_mut();
        stream.write_all(batch.as_bytes())?;
        stream.flush()?;

        let mut replies = Vec::with_capacity(batch.len());
        for _ in 0..batch.len() {
            replies.push(read_response(reader, &mut self.line_buf)?);
        }
        Ok(replies)
    }
}

impl Transport for TcpConnection {
    fn round_trip(&mut self, batch: &Batch) -> ClientResult<Vec<RespValue>> {
        let result = self.send_and_read(batch);
        if let Err(err) = &result {
            // Replies may be half-consumed; drop the stream.
            warn!(addr = %self.config.addr, error = %err, "round trip failed, dropping connection");
            self.reader = None;
        }
        result
    }
}

fn open(config: &ConnectionConfig, line_buf: &mut Vec<u8>) -> ClientResult<BufReader<TcpStream>> {
    let stream = connect_stream(config)?;
    if let Some(timeout) = config.read_timeout() {
        stream.set_read_timeout(Some(timeout))?;
    }
    if let Some(timeout) = config.write_timeout() {
        stream.set_write_timeout(Some(timeout))?;
    }
    // Disable Nagle; a batch is written in one go anyway.
    stream.set_nodelay(true)?;

    let mut reader = BufReader::new(stream);
    if let Some(password) = config.password.as_deref() {
        exec_ok(&mut reader, line_buf, &[b"AUTH".as_slice(), password.as_bytes()])?;
    }
    if config.db != 0 {
        let db = config.db.to_string();
        exec_ok(&mut reader, line_buf, &[b"SELECT".as_slice(), db.as_bytes()])?;
    }
    Ok(reader)
}

// Runs one handshake command that must answer +OK.
fn exec_ok(
    reader: &mut BufReader<TcpStream>,
    line_buf: &mut Vec<u8>,
    args: &[&[u8]],
) -> ClientResult<()> {
    let mut out = BytesMut::new();
    encode_command(args, &mut out);
    let stream = reader.get_mut();
    stream.write_all(&out)?;
    stream.flush()?;

    match read_response(reader, line_buf)? {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn connect_stream(config: &ConnectionConfig) -> ClientResult<TcpStream> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|_| ClientError::InvalidAddress {
            addr: config.addr.clone(),
        })?;
    let stream = match config.connect_timeout() {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}
