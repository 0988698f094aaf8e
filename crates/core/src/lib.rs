//! Core types for the dockv document engine
//!
//! This crate defines the foundational types used throughout the system:
//! - SubKey: order-preserving encoded key components
//! - DocKey / SubDocKey / DocPath: document addressing
//! - SubDocument: materialized document trees
//! - Value / PrimitiveValue / ContainerKind: stored record shapes
//! - HybridTime / ReadHybridTime / Ttl / UserTimestamp: versioning and expiry
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod doc_key;
pub mod encoding;
pub mod error;
pub mod subdocument;
pub mod time;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use doc_key::{hash_code_for, upper_bound_for_prefix, DocKey, DocPath, SubDocKey};
pub use encoding::{prefix_successor, ColumnId, SubKey, SystemColumnId, GROUP_END, HASH_CODE_TAG};
pub use error::{Error, Result};
pub use subdocument::SubDocument;
pub use time::{HybridTime, ReadHybridTime, RestartReadHt, Ttl, UserTimestamp};
pub use types::{IsolationLevel, QueryId};
pub use value::{ContainerKind, PrimitiveValue, Value, ValueBody, ValueKind};
