//! Arrow-level pieces of GPU result materialization.
//!
//! This crate knows nothing about shared memory or devices; it works on byte
//! buffers that have already been copied to the host, and on offsets into
//! buffers that have not.
//!
//! # Layout contract
//!
//! The schema stream and the device buffer are produced separately. The
//! schema's field order is the physical column order of the device buffer:
//!
//! ```text
//! schema stream:  [ Schema | dict(f1) | dict(f3) | ... ]
//! device buffer:  [ prefix | RecordBatch metadata | body: f0 f1 f2 f3 ... ]
//! ```
//!
//! Nothing in either buffer cross-checks that order; producer and consumer
//! agree on it out of band.

pub mod column_buffer;
pub mod dictionary_recovery;
pub mod error;
pub mod ipc_message;
pub mod null_sentinels;
pub mod record_batch_convert;
pub mod row_decode;
pub mod schema_utils;
pub mod temporal;

pub use column_buffer::{plan_columns, BufferSpan, DeviceColumn, ValueLayout};
pub use dictionary_recovery::{recover_schema, DictionaryMemo, RecoveryOutcome, SchemaRecovery};
pub use error::{InteropError, Result};
pub use ipc_message::{MessagePrefix, MessageReader};
pub use null_sentinels::{NullSentinel, TypeMapping, WireSlot};
pub use record_batch_convert::{
    columns_to_record_batch, device_column_to_array, dictionary_column, SpanReader,
};
pub use schema_utils::SchemaExt;
pub use temporal::TemporalPrecision;
