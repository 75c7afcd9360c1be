//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode pipelined commands into one contiguous buffer and parse
//! the replies that come back for them.
//!
//! ## Design Principles
//! 1. **Append-Only Encoding**: Commands are appended to a `BytesMut` so a
//!    whole batch goes out with a single write.
//! 2. **Top-Down Parsing**: Replies are parsed recursively with one reusable
//!    line buffer.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::BufRead;

use bytes::{BufMut, BytesMut};

use cachepipe_common::{ClientError, ClientResult};

/// Largest bulk string accepted, matching the store's `proto-max-bulk-len`.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Upper bound on array slots reserved before the elements arrive.
const MAX_PREALLOC: usize = 1024;

/// RESP reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays, with None for a null array.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Returns the error text when this is an error reply.
    pub fn as_error(&self) -> Option<String> {
        match self {
            RespValue::Error(message) => Some(String::from_utf8_lossy(message).into_owned()),
            _ => None,
        }
    }
}

/// Appends a RESP2 array command to `out`.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A], out: &mut BytesMut) {
    out.put_u8(b'*');
    put_decimal(out, args.len());
    out.put_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        out.put_u8(b'$');
        put_decimal(out, arg.len());
        out.put_slice(b"\r\n");
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_line(reader, line_buf)?;
    let (&prefix, rest) = line_buf.split_first().ok_or(ClientError::Protocol)?;

    match prefix {
        b'+' => Ok(RespValue::Simple(rest.to_vec())),
        b'-' => Ok(RespValue::Error(rest.to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            read_array(reader, len, line_buf)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol);
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != *b"\r\n" {
        return Err(ClientError::Protocol);
    }

    line_buf.clear();
    Ok(RespValue::Bulk(Some(data)))
}

fn read_array<R: BufRead>(reader: &mut R, len: i64, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Array(None));
    }

    let mut items = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
    for _ in 0..len {
        items.push(read_response(reader, line_buf)?);
    }
    Ok(RespValue::Array(Some(items)))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Err(ClientError::Protocol);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::Protocol)
}

fn put_decimal(out: &mut BytesMut, value: usize) {
    // itoa-style stack buffer, no heap formatting.
    let mut buf = [0u8; 20];
    let mut pos = buf.len();
    let mut value = value;
    loop {
        pos -= 1;
        buf[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    out.put_slice(&buf[pos..]);
}
