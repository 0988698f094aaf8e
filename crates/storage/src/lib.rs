//! Storage layer for the dockv document engine
//!
//! This crate maps the document model onto a flat, ordered, multi-versioned
//! key-value store:
//! - `store`: the [`DocStore`] trait and flat write ops
//! - `mem`: the in-memory [`MemDocStore`]
//! - `batch`: [`DocWriteBatch`], turning document mutations into flat writes
//! - `reader`: [`get_sub_document`], materializing subdocument trees

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod mem;
pub mod reader;
pub mod store;

pub use batch::{DocWriteBatch, ListExtendOrder};
pub use mem::MemDocStore;
pub use reader::{get_sub_document, SubDocReadRequest};
pub use store::{DocStore, VersionedValue, WriteOp};
