//! # Result Families and Tagged Store Values
//!
//! Shared vocabulary between the pipeline and the result coercers.
//!
//! ## Design Principles
//!
//! 1. **Explicit Tags**: Every reply is carried as a `StoreValue` variant, so
//!    coercion is a pattern match rather than runtime shape inspection.
//! 2. **One Queue per Shape**: Operations returning the same reply shape share
//!    one `ResultFamily` and therefore one FIFO queue.
//! 3. **Logical vs Physical**: `ResultTag` names the logical operation a caller
//!    is reading back; several tags may map onto the same family.
//!
//! ## Family Overview
//!
//! ```text
//! PositionalSequence <- MultiGet, HashMultiGet
//! StringSequence     <- ListRange
//! Status             <- MultiSet, HashMultiSet, Set
//! Integer            <- HashDelete, ListPush, SetAdd, SetRemove, Delete
//! Boolean            <- Expire, HashSetIfAbsent
//! StringMap          <- HashGetAll
//! ```

use std::collections::HashMap;
use std::fmt;

/// Reply shape shared by a group of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultFamily {
    /// Ordered values with gaps for absent entries (MGET, HMGET).
    PositionalSequence,
    /// Ordered strings (LRANGE).
    StringSequence,
    /// Status line such as `OK`.
    Status,
    /// Integer reply.
    Integer,
    /// Integer reply interpreted as a flag.
    Boolean,
    /// Field/value pairs (HGETALL).
    StringMap,
}

impl ResultFamily {
    /// Number of families; sizes per-family storage.
    pub const COUNT: usize = 6;

    /// All families in declaration order.
    pub const ALL: [ResultFamily; ResultFamily::COUNT] = [
        ResultFamily::PositionalSequence,
        ResultFamily::StringSequence,
        ResultFamily::Status,
        ResultFamily::Integer,
        ResultFamily::Boolean,
        ResultFamily::StringMap,
    ];

    /// Dense index used for array-backed queues.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            ResultFamily::PositionalSequence => 0,
            ResultFamily::StringSequence => 1,
            ResultFamily::Status => 2,
            ResultFamily::Integer => 3,
            ResultFamily::Boolean => 4,
            ResultFamily::StringMap => 5,
        }
    }

    /// Value returned when a result is absent or the store replied with an error.
    pub fn zero_value(self) -> StoreValue {
        match self {
            ResultFamily::PositionalSequence => StoreValue::Sequence(Vec::new()),
            ResultFamily::StringSequence => StoreValue::Strings(Vec::new()),
            ResultFamily::Status => StoreValue::Status(String::new()),
            ResultFamily::Integer => StoreValue::Int(0),
            ResultFamily::Boolean => StoreValue::Bool(false),
            ResultFamily::StringMap => StoreValue::Map(HashMap::new()),
        }
    }
}

impl fmt::Display for ResultFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultFamily::PositionalSequence => "positional-sequence",
            ResultFamily::StringSequence => "string-sequence",
            ResultFamily::Status => "status",
            ResultFamily::Integer => "integer",
            ResultFamily::Boolean => "boolean",
            ResultFamily::StringMap => "string-map",
        };
        f.write_str(name)
    }
}

/// Logical operation a caller reads back from an executed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultTag {
    MultiGet,
    HashMultiGet,
    ListRange,
    MultiSet,
    HashMultiSet,
    Set,
    HashDelete,
    ListPush,
    SetAdd,
    SetRemove,
    Delete,
    Expire,
    HashSetIfAbsent,
    HashGetAll,
}

impl ResultTag {
    /// Family whose queue holds results for this tag.
    pub const fn family(self) -> ResultFamily {
        match self {
            ResultTag::MultiGet | ResultTag::HashMultiGet => ResultFamily::PositionalSequence,
            ResultTag::ListRange => ResultFamily::StringSequence,
            ResultTag::MultiSet | ResultTag::HashMultiSet | ResultTag::Set => ResultFamily::Status,
            ResultTag::HashDelete
            | ResultTag::ListPush
            | ResultTag::SetAdd
            | ResultTag::SetRemove
            | ResultTag::Delete => ResultFamily::Integer,
            ResultTag::Expire | ResultTag::HashSetIfAbsent => ResultFamily::Boolean,
            ResultTag::HashGetAll => ResultFamily::StringMap,
        }
    }

    /// Store command name, used for logging and error context.
    pub const fn command(self) -> &'static str {
        match self {
            ResultTag::MultiGet => "MGET",
            ResultTag::HashMultiGet => "HMGET",
            ResultTag::ListRange => "LRANGE",
            ResultTag::MultiSet => "MSET",
            ResultTag::HashMultiSet => "HMSET",
            ResultTag::Set => "SET",
            ResultTag::HashDelete => "HDEL",
            ResultTag::ListPush => "RPUSH",
            ResultTag::SetAdd => "SADD",
            ResultTag::SetRemove => "SREM",
            ResultTag::Delete => "DEL",
            ResultTag::Expire => "EXPIRE",
            ResultTag::HashSetIfAbsent => "HSETNX",
            ResultTag::HashGetAll => "HGETALL",
        }
    }
}

/// Tagged result handed to the coercers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    /// No result (absent value or nothing to dequeue).
    Nil,
    /// Status line such as `OK`.
    Status(String),
    /// Single string value.
    Str(String),
    Int(i64),
    Bool(bool),
    /// Ordered values; elements may be `Nil`.
    Sequence(Vec<StoreValue>),
    /// Ordered strings without gaps.
    Strings(Vec<String>),
    /// Field/value mapping.
    Map(HashMap<String, String>),
}

impl StoreValue {
    /// Short name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreValue::Nil => "nil",
            StoreValue::Status(_) => "status",
            StoreValue::Str(_) => "string",
            StoreValue::Int(_) => "integer",
            StoreValue::Bool(_) => "boolean",
            StoreValue::Sequence(_) => "sequence",
            StoreValue::Strings(_) => "string sequence",
            StoreValue::Map(_) => "map",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, StoreValue::Nil)
    }
}

impl fmt::Display for StoreValue {
    /// Textual form of scalars; containers render as debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Nil => Ok(()),
            StoreValue::Status(text) | StoreValue::Str(text) => f.write_str(text),
            StoreValue::Int(value) => write!(f, "{}", value),
            StoreValue::Bool(value) => write!(f, "{}", value),
            StoreValue::Sequence(items) => write!(f, "{:?}", items),
            StoreValue::Strings(items) => write!(f, "{:?}", items),
            StoreValue::Map(map) => write!(f, "{:?}", map),
        }
    }
}
