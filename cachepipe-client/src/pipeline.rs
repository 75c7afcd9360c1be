//! # Command Pipeline
//!
//! Purpose: Buffer heterogeneous store commands against one connection, send
//! them in a single round trip, and hand each result back in a typed form.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Pipeline` hides the batch buffer, the transport,
//!    and reply shaping behind one method per store operation.
//! 2. **Validate Before Buffering**: Bad input is rejected at append time and
//!    never reaches the store.
//! 3. **Single Shot**: One successful `execute` per pipeline; later calls are
//!    no-ops and later appends are rejected.
//! 4. **FIFO per Family**: Results are read back per result family in the
//!    order their commands were appended. There is no cross-family ordering;
//!    callers read each family in its own append order.
//!
//! ## Structure Overview
//!
//! ```text
//! Pipeline
//!   ├── batch: Batch                 encoded commands, seq = append index
//!   ├── queues[ResultFamily]: VecDeque<seq>
//!   └── results: Vec<Option<RespValue>>   filled by execute, taken once
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use cachepipe_client::{ConnectionRegistry, Pipeline, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConnectionRegistry::new(StoreConfig::from_path("store.json")?);
//! let mut pipe = Pipeline::new(&registry, None)?;
//! pipe.hash_multi_set("employee:1", [("name", "Ann"), ("gender", "f")])?;
//! pipe.expire("employee:1", Duration::from_secs(3600))?;
//! pipe.execute()?;
//! assert_eq!(pipe.take_hash_multi_set(), "OK");
//! assert!(pipe.take_expire());
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use cachepipe_common::{
    ClientError, PipelineError, PipelineResult, ResultFamily, ResultTag, StoreValue,
};

use crate::batch::Batch;
use crate::connection::{ConnectionProvider, Transport};
use crate::resp::RespValue;

/// Buffered, single-shot batch of store commands bound to one connection.
///
/// Not safe for concurrent use; every mutating call takes `&mut self`.
/// `Pipeline::default()` is an unbound pipeline that rejects every append.
#[derive(Default)]
pub struct Pipeline {
    connection_name: String,
    connection: Option<Box<dyn Transport>>,
    batch: Batch,
    executed: bool,
    command_count: usize,
    queues: [VecDeque<usize>; ResultFamily::COUNT],
    results: Vec<Option<RespValue>>,
}

impl Pipeline {
    /// Acquires a connection from `provider` and returns an empty pipeline.
    ///
    /// `None` selects the provider's default connection name.
    pub fn new<P>(provider: &P, connection_name: Option<&str>) -> PipelineResult<Self>
    where
        P: ConnectionProvider + ?Sized,
    {
        let name = connection_name
            .unwrap_or_else(|| provider.default_connection())
            .to_string();
        let connection = provider
            .get_connection(&name)
            .map_err(|source| PipelineError::Connection {
                name: name.clone(),
                source,
            })?;

        Ok(Pipeline {
            connection_name: name,
            connection: Some(connection),
            ..Pipeline::default()
        })
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Total commands appended so far.
    pub fn command_count(&self) -> usize {
        self.command_count
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Results still waiting to be taken for `family`.
    pub fn pending(&self, family: ResultFamily) -> usize {
        self.queues[family.index()].len()
    }

    // ---------------------------------------------------------------------
    // Append operations
    // ---------------------------------------------------------------------

    /// Queues `MGET keys...`.
    pub fn multi_get(&mut self, keys: &[&str]) -> PipelineResult<()> {
        let tag = ResultTag::MultiGet;
        self.guard(tag)?;
        require(tag, !keys.is_empty(), "no key is specified")?;
        require(tag, keys.iter().all(|key| !key.is_empty()), "empty key")?;

        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"MGET");
        args.extend(keys.iter().map(|key| key.as_bytes()));
        self.enqueue(tag, &args);
        Ok(())
    }

    /// Queues `MSET k1 v1 k2 v2 ...` from a flat key/value list.
    pub fn multi_set<A: AsRef<[u8]>>(&mut self, pairs: &[A]) -> PipelineResult<()> {
        let tag = ResultTag::MultiSet;
        self.guard(tag)?;
        require(tag, !pairs.is_empty(), "no key/value pair is specified")?;
        require(tag, pairs.len() % 2 == 0, "unbalanced key/value pairs")?;
        require(
            tag,
            pairs.iter().step_by(2).all(|key| !key.as_ref().is_empty()),
            "empty key",
        )?;

        let mut args: Vec<&[u8]> = Vec::with_capacity(pairs.len() + 1);
        args.push(b"MSET");
        args.extend(pairs.iter().map(AsRef::as_ref));
        self.enqueue(tag, &args);
        Ok(())
    }

    /// Queues `HMGET key fields...`; read back with `take_hash_multi_get`.
    pub fn hash_multi_get(&mut self, key: &str, fields: &[&str]) -> PipelineResult<()> {
        let tag = ResultTag::HashMultiGet;
        self.guard(tag)?;
        require_key(tag, key)?;
        require(tag, !fields.is_empty(), "no field is specified")?;

        let mut args: Vec<&[u8]> = Vec::with_capacity(fields.len() + 2);
        args.push(b"HMGET");
        args.push(key.as_bytes());
        args.extend(fields.iter().map(|field| field.as_bytes()));
        self.enqueue(tag, &args);
        Ok(())
    }

    /// Queues `HMSET key f1 v1 ...`. Accepts any iterator of field/value
    /// pairs, including `&HashMap<String, String>`.
    pub fn hash_multi_set<I, F, V>(&mut self, key: &str, entries: I) -> PipelineResult<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let tag = ResultTag::HashMultiSet;
        self.guard(tag)?;
        require_key(tag, key)?;
        let entries: Vec<(F, V)> = entries.into_iter().collect();
        require(tag, !entries.is_empty(), "no field is specified")?;

        let mut args: Vec<&[u8]> = Vec::with_capacity(entries.len() * 2 + 2);
        args.push(b"HMSET");
        args.push(key.as_bytes());
        for (field, value) in &entries {
            args.push(field.as_ref());
            args.push(value.as_ref());
        }
        self.enqueue(tag, &args);
        Ok(())
    }

    /// Queues `HDEL key fields...`.
    pub fn hash_delete(&mut self, key: &str, fields: &[&str]) -> PipelineResult<()> {
        let tag = ResultTag::HashDelete;
        self.guard(tag)?;
        require_key(tag, key)?;
        require(tag, !fields.is_empty(), "no field is specified")?;

        let mut args: Vec<&[u8]> = Vec::with_capacity(fields.len() + 2);
        args.push(b"HDEL");
        args.push(key.as_bytes());
        args.extend(fields.iter().map(|field| field.as_bytes()));
        self.enqueue(tag, &args);
        Ok(())
    }

    /// Queues `LRANGE key start stop`. Use `0, -1` for the whole list.
    pub fn list_range(&mut self, key: &str, start: i64, stop: i64) -> PipelineResult<()> {
        let tag = ResultTag::ListRange;
        self.guard(tag)?;
        require_key(tag, key)?;

        let start = start.to_string();
        let stop = stop.to_string();
        self.enqueue(tag, &[b"LRANGE", key.as_bytes(), start.as_bytes(), stop.as_bytes()]);
        Ok(())
    }

    /// Queues `RPUSH key values...`.
    pub fn list_push<A: AsRef<[u8]>>(&mut self, key: &str, values: &[A]) -> PipelineResult<()> {
        self.keyed_values(ResultTag::ListPush, key, values)
    }

    /// Queues `SADD key members...`.
    pub fn set_add<A: AsRef<[u8]>>(&mut self, key: &str, members: &[A]) -> PipelineResult<()> {
        self.keyed_values(ResultTag::SetAdd, key, members)
    }

    /// Queues `SREM key members...`.
    pub fn set_remove<A: AsRef<[u8]>>(&mut self, key: &str, members: &[A]) -> PipelineResult<()> {
        self.keyed_values(ResultTag::SetRemove, key, members)
    }

    /// Queues `DEL key`.
    pub fn delete(&mut self, key: &str) -> PipelineResult<()> {
        let tag = ResultTag::Delete;
        self.guard(tag)?;
        require_key(tag, key)?;

        self.enqueue(tag, &[b"DEL", key.as_bytes()]);
        Ok(())
    }

    /// Queues an expiry on `key`; sub-second TTLs use `PEXPIRE`.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> PipelineResult<()> {
        let tag = ResultTag::Expire;
        self.guard(tag)?;
        require_key(tag, key)?;

        let (precise, amount) = ttl_amount(ttl);
        let command: &[u8] = if precise { b"PEXPIRE" } else { b"EXPIRE" };
        self.enqueue(tag, &[command, key.as_bytes(), amount.as_bytes()]);
        Ok(())
    }

    /// Queues `HGETALL key`.
    pub fn hash_get_all(&mut self, key: &str) -> PipelineResult<()> {
        let tag = ResultTag::HashGetAll;
        self.guard(tag)?;
        require_key(tag, key)?;

        self.enqueue(tag, &[b"HGETALL", key.as_bytes()]);
        Ok(())
    }

    /// Queues `SET key value [EX s | PX ms]`. A zero TTL means no expiry.
    pub fn set(&mut self, key: &str, value: &str, ttl: Duration) -> PipelineResult<()> {
        let tag = ResultTag::Set;
        self.guard(tag)?;
        require_key(tag, key)?;
        require(tag, !value.is_empty(), "no value is specified")?;

        if ttl.is_zero() {
            self.enqueue(tag, &[b"SET", key.as_bytes(), value.as_bytes()]);
            return Ok(());
        }
        let (precise, amount) = ttl_amount(ttl);
        let unit: &[u8] = if precise { b"PX" } else { b"EX" };
        self.enqueue(
            tag,
            &[b"SET", key.as_bytes(), value.as_bytes(), unit, amount.as_bytes()],
        );
        Ok(())
    }

    /// Queues `HSETNX key field value`. An empty value is allowed.
    pub fn hash_set_if_absent(&mut self, key: &str, field: &str, value: &str) -> PipelineResult<()> {
        let tag = ResultTag::HashSetIfAbsent;
        self.guard(tag)?;
        require_key(tag, key)?;
        require(tag, !field.is_empty(), "no field is specified")?;

        self.enqueue(
            tag,
            &[b"HSETNX", key.as_bytes(), field.as_bytes(), value.as_bytes()],
        );
        Ok(())
    }

    fn keyed_values<A: AsRef<[u8]>>(
        &mut self,
        tag: ResultTag,
        key: &str,
        values: &[A],
    ) -> PipelineResult<()> {
        self.guard(tag)?;
        require_key(tag, key)?;
        require(tag, !values.is_empty(), "no value is specified")?;

        let mut args: Vec<&[u8]> = Vec::with_capacity(values.len() + 2);
        args.push(tag.command().as_bytes());
        args.push(key.as_bytes());
        args.extend(values.iter().map(AsRef::as_ref));
        self.enqueue(tag, &args);
        Ok(())
    }

    fn guard(&self, tag: ResultTag) -> PipelineResult<()> {
        if self.connection_name.is_empty() || self.connection.is_none() {
            return Err(PipelineError::Uninitialized { op: tag.command() });
        }
        if self.executed {
            return Err(PipelineError::AlreadyExecuted { op: tag.command() });
        }
        Ok(())
    }

    fn enqueue(&mut self, tag: ResultTag, args: &[&[u8]]) {
        let seq = self.command_count;
        self.batch.push(args);
        self.queues[tag.family().index()].push_back(seq);
        self.command_count += 1;
        debug!(
            command = tag.command(),
            family = %tag.family(),
            queued = self.command_count,
            "queued pipeline command"
        );
    }

    // ---------------------------------------------------------------------
    // Execute
    // ---------------------------------------------------------------------

    /// Sends every buffered command in one round trip.
    ///
    /// A no-op when already executed or when nothing was appended. On failure
    /// the pipeline stays unexecuted, so calling this again re-sends the whole
    /// batch; commands the store already applied are not deduplicated.
    pub fn execute(&mut self) -> PipelineResult<()> {
        if self.executed || self.command_count == 0 {
            return Ok(());
        }

        let commands = self.command_count;
        let connection = self
            .connection
            .as_mut()
            .ok_or(PipelineError::Uninitialized { op: "EXEC" })?;

        let started = Instant::now();
        let replies = connection.round_trip(&self.batch).map_err(|source| {
            warn!(
                connection = %self.connection_name,
                commands,
                error = %source,
                "pipeline execution failed"
            );
            PipelineError::Execution { commands, source }
        })?;
        if replies.len() != commands {
            return Err(PipelineError::Execution {
                commands,
                source: ClientError::UnexpectedResponse,
            });
        }

        self.results = replies.into_iter().map(Some).collect();
        self.executed = true;
        info!(
            connection = %self.connection_name,
            commands,
            elapsed_us = started.elapsed().as_micros() as u64,
            "executed pipeline"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Retrieval
    // ---------------------------------------------------------------------

    /// Dequeues the oldest result of `tag`'s family as a tagged value.
    ///
    /// Returns `StoreValue::Nil` when the family queue is empty, and the
    /// family's zero value when the command was never executed or the store
    /// answered it with an error.
    pub fn take(&mut self, tag: ResultTag) -> StoreValue {
        let family = tag.family();
        let Some(seq) = self.queues[family.index()].pop_front() else {
            debug!(command = tag.command(), family = %family, "no pending result");
            return StoreValue::Nil;
        };
        let reply = self.results.get_mut(seq).and_then(Option::take);
        shape_reply(tag, reply)
    }

    /// Result of the oldest pending `multi_get`; `None` marks absent keys.
    pub fn take_multi_get(&mut self) -> Vec<Option<String>> {
        optional_strings(self.take(ResultTag::MultiGet))
    }

    /// Result of the oldest pending `hash_multi_get`; `None` marks absent fields.
    pub fn take_hash_multi_get(&mut self) -> Vec<Option<String>> {
        optional_strings(self.take(ResultTag::HashMultiGet))
    }

    pub fn take_list_range(&mut self) -> Vec<String> {
        match self.take(ResultTag::ListRange) {
            StoreValue::Strings(items) => items,
            _ => Vec::new(),
        }
    }

    pub fn take_multi_set(&mut self) -> String {
        status(self.take(ResultTag::MultiSet))
    }

    pub fn take_hash_multi_set(&mut self) -> String {
        status(self.take(ResultTag::HashMultiSet))
    }

    pub fn take_set(&mut self) -> String {
        status(self.take(ResultTag::Set))
    }

    /// Number of fields removed.
    pub fn take_hash_delete(&mut self) -> i64 {
        integer(self.take(ResultTag::HashDelete))
    }

    /// Length of the list after the push.
    pub fn take_list_push(&mut self) -> i64 {
        integer(self.take(ResultTag::ListPush))
    }

    pub fn take_set_add(&mut self) -> i64 {
        integer(self.take(ResultTag::SetAdd))
    }

    pub fn take_set_remove(&mut self) -> i64 {
        integer(self.take(ResultTag::SetRemove))
    }

    pub fn take_delete(&mut self) -> i64 {
        integer(self.take(ResultTag::Delete))
    }

    /// Whether the timeout was set (false when the key does not exist).
    pub fn take_expire(&mut self) -> bool {
        boolean(self.take(ResultTag::Expire))
    }

    /// Whether the field was written (false when it already existed).
    pub fn take_hash_set_if_absent(&mut self) -> bool {
        boolean(self.take(ResultTag::HashSetIfAbsent))
    }

    pub fn take_hash_get_all(&mut self) -> HashMap<String, String> {
        match self.take(ResultTag::HashGetAll) {
            StoreValue::Map(map) => map,
            _ => HashMap::new(),
        }
    }
}

fn require(tag: ResultTag, ok: bool, reason: &'static str) -> PipelineResult<()> {
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Validation {
            op: tag.command(),
            reason,
        })
    }
}

fn require_key(tag: ResultTag, key: &str) -> PipelineResult<()> {
    require(tag, !key.is_empty(), "no key is specified")
}

// Whole seconds go out as seconds, anything finer as milliseconds with a 1ms floor.
fn ttl_amount(ttl: Duration) -> (bool, String) {
    if ttl.subsec_nanos() == 0 {
        (false, ttl.as_secs().to_string())
    } else {
        (true, ttl.as_millis().max(1).to_string())
    }
}

// Converts a raw reply into its family's tagged shape.
fn shape_reply(tag: ResultTag, reply: Option<RespValue>) -> StoreValue {
    let family = tag.family();
    let reply = match reply {
        Some(reply) => reply,
        None => return family.zero_value(),
    };

    if let Some(message) = reply.as_error() {
        warn!(command = tag.command(), error = %message, "store rejected pipelined command");
        return family.zero_value();
    }

    let shaped = match (family, reply) {
        (ResultFamily::PositionalSequence, RespValue::Array(Some(items))) => {
            Some(StoreValue::Sequence(items.into_iter().map(scalar).collect()))
        }
        (ResultFamily::StringSequence, RespValue::Array(Some(items))) => Some(StoreValue::Strings(
            items
                .into_iter()
                .filter_map(|item| match scalar(item) {
                    StoreValue::Str(text) => Some(text),
                    _ => None,
                })
                .collect(),
        )),
        (ResultFamily::Status, RespValue::Simple(text)) => Some(StoreValue::Status(lossy(text))),
        (ResultFamily::Integer, RespValue::Integer(value)) => Some(StoreValue::Int(value)),
        (ResultFamily::Boolean, RespValue::Integer(value)) => Some(StoreValue::Bool(value == 1)),
        (ResultFamily::StringMap, RespValue::Array(Some(items))) => field_pairs(items).map(StoreValue::Map),
        (ResultFamily::PositionalSequence | ResultFamily::StringSequence, RespValue::Array(None)) => {
            Some(family.zero_value())
        }
        _ => None,
    };

    shaped.unwrap_or_else(|| {
        warn!(command = tag.command(), family = %family, "unexpected reply shape");
        family.zero_value()
    })
}

fn scalar(item: RespValue) -> StoreValue {
    match item {
        RespValue::Bulk(Some(data)) | RespValue::Simple(data) => StoreValue::Str(lossy(data)),
        RespValue::Integer(value) => StoreValue::Str(value.to_string()),
        _ => StoreValue::Nil,
    }
}

// HGETALL replies are a flat field, value, field, value... array.
fn field_pairs(items: Vec<RespValue>) -> Option<HashMap<String, String>> {
    if items.len() % 2 != 0 {
        return None;
    }
    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        match (scalar(field), scalar(value)) {
            (StoreValue::Str(field), StoreValue::Str(value)) => {
                map.insert(field, value);
            }
            _ => return None,
        }
    }
    Some(map)
}

fn lossy(data: Vec<u8>) -> String {
    String::from_utf8(data).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

fn optional_strings(value: StoreValue) -> Vec<Option<String>> {
    match value {
        StoreValue::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                StoreValue::Str(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn status(value: StoreValue) -> String {
    match value {
        StoreValue::Status(text) => text,
        _ => String::new(),
    }
}

fn integer(value: StoreValue) -> i64 {
    match value {
        StoreValue::Int(value) => value,
        _ => 0,
    }
}

fn boolean(value: StoreValue) -> bool {
    matches!(value, StoreValue::Bool(true))
}
