//! # Table Error Types
//!
//! Every fallible table or codec operation returns one of these. Lookups never
//! do: a miss is reported through the `INVALID_PORT` / `NO_ROUTE` sentinels so
//! the per-packet path stays free of error handling.

use std::io;

/// Errors returned by the forwarding tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Backing storage for a table or its extension-block pool could not be
    /// obtained.
    #[error("failed to allocate table storage: {0}")]
    AllocationFailure(#[source] io::Error),

    /// The table already holds its configured maximum of entries, rules or
    /// extension blocks.
    #[error("table is full")]
    TableFull,

    /// The key passed to a delete is not present.
    #[error("entry not found")]
    NotFound,

    /// A prefix depth exceeds the key width of the table.
    #[error("invalid prefix depth {depth}, maximum is {max}")]
    InvalidDepth { depth: u8, max: u8 },

    /// The value is the reserved miss sentinel and cannot be stored.
    #[error("value {0:#x} is reserved")]
    ReservedValue(u32),

    /// Malformed address text.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Errors returned by the address codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed MAC address {0:?}")]
    Mac(String),

    #[error("malformed IPv4 address or prefix {0:?}")]
    Ipv4(String),

    #[error("malformed IPv6 address or prefix {0:?}")]
    Ipv6(String),

    #[error("prefix depth out of range in {0:?}")]
    Depth(String),

    #[error("expected ADDRESS/DEPTH, got {0:?}")]
    Format(String),
}

impl TableError {
    pub(crate) fn alloc(msg: impl Into<String>) -> Self {
        TableError::AllocationFailure(io::Error::other(msg.into()))
    }
}
