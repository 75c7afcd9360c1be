//! # CachePipe Client
//!
//! Purpose: Queue many heterogeneous store commands against one connection,
//! flush them in a single round trip, and read every result back in a typed
//! form.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Pipeline` hides batching, transport, and reply
//!    shaping behind one method per store operation.
//! 2. **Dependency Injection**: Connections come from a `ConnectionProvider`
//!    value, so tests can run against fakes.
//! 3. **Explicit Tags**: Replies are tagged `StoreValue`s; the coercers in
//!    `coerce` pattern-match on them.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod batch;
pub mod coerce;
mod connection;
mod pipeline;
mod resp;

pub use batch::Batch;
pub use connection::{ConnectionProvider, ConnectionRegistry, TcpConnection, Transport};
pub use pipeline::Pipeline;
pub use resp::RespValue;

pub use cachepipe_common::{
    ClientError, ClientResult, ConnectionConfig, MissingFields, PipelineError, PipelineResult,
    ResultFamily, ResultTag, StoreConfig, StoreValue,
};
