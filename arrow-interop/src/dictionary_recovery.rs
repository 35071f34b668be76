//! Schema and dictionary recovery from a columnar-IPC stream.
//!
//! The stream holds a schema message followed by one batch per
//! dictionary-encoded field, in field order. Each batch carries a single
//! column: that field's distinct values. The stock stream reader folds these
//! batches into its own state and never hands them back, so they are decoded
//! here message by message.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::ArrayRef;
use arrow_buffer::Buffer;
use arrow_ipc::convert::fb_to_schema;
use arrow_ipc::reader::read_record_batch;
use arrow_ipc::MessageHeader;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use tracing::debug;

use crate::error::{InteropError, Result};
use crate::ipc_message::MessageReader;
use crate::schema_utils::{index_field, SchemaExt};

/// Recovered dictionary values, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct DictionaryMemo {
    values: HashMap<String, ArrayRef>,
}

impl DictionaryMemo {
    pub fn get(&self, field: &str) -> Option<&ArrayRef> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayRef)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, field: String, values: ArrayRef) {
        self.values.insert(field, values);
    }
}

/// How dictionary recovery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Every dictionary-encoded field (possibly none) got its values.
    Complete,
    /// The stream could not be read far enough; it is treated as carrying no
    /// dictionary batches and the memo is empty.
    NoDictionaries { reason: String },
}

#[derive(Debug, Clone)]
pub struct SchemaRecovery {
    /// Field order matches the physical column order of the device buffer.
    /// Recovered dictionary fields carry their index type.
    pub schema: SchemaRef,
    pub memo: DictionaryMemo,
    pub outcome: RecoveryOutcome,
}

impl SchemaRecovery {
    pub fn is_complete(&self) -> bool {
        self.outcome == RecoveryOutcome::Complete
    }

    fn without_dictionaries(schema: SchemaRef, err: InteropError) -> Self {
        debug!("dictionary recovery fell back: {}", err);
        Self {
            schema,
            memo: DictionaryMemo::default(),
            outcome: RecoveryOutcome::NoDictionaries { reason: err.to_string() },
        }
    }
}

/// Parse the schema in `bytes` and recover the values of every
/// dictionary-encoded field.
///
/// Never fails: an unreadable schema header yields an empty schema, and an
/// unreadable dictionary batch yields the schema as declared. Both report
/// [`RecoveryOutcome::NoDictionaries`].
pub fn recover_schema(bytes: &[u8]) -> SchemaRecovery {
    let mut reader = MessageReader::new(Buffer::from_slice_ref(bytes));

    let schema = match read_schema(&mut reader) {
        Ok(schema) => Arc::new(schema),
        Err(e) => return SchemaRecovery::without_dictionaries(Arc::new(Schema::empty()), e),
    };

    if !schema.has_dictionaries() {
        return SchemaRecovery {
            schema,
            memo: DictionaryMemo::default(),
            outcome: RecoveryOutcome::Complete,
        };
    }

    debug!("Recovering dictionaries for {:?}", schema.dictionary_field_names());
    match read_dictionaries(&mut reader, &schema) {
        Ok((rewritten, memo)) => SchemaRecovery {
            schema: Arc::new(rewritten),
            memo,
            outcome: RecoveryOutcome::Complete,
        },
        Err(e) => SchemaRecovery::without_dictionaries(schema, e),
    }
}

fn read_schema(reader: &mut MessageReader) -> Result<Schema> {
    let framed = reader
        .next_message()?
        .ok_or_else(|| InteropError::SchemaFormat("stream holds no messages".into()))?;
    let message = framed.message()?;
    let fb = message.header_as_schema().ok_or_else(|| {
        InteropError::SchemaFormat(format!(
            "expected a schema message, found {:?}",
            message.header_type()
        ))
    })?;
    Ok(fb_to_schema(fb))
}

fn read_dictionaries(reader: &mut MessageReader, schema: &Schema) -> Result<(Schema, DictionaryMemo)> {
    let mut memo = DictionaryMemo::default();
    let mut fields = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        match (field.data_type(), index_field(field)) {
            (DataType::Dictionary(_, value_type), Some(index)) => {
                let values = read_dictionary_values(reader, field.name(), value_type)?;
                debug!(
                    "Recovered dictionary for '{}': {} values of {:?}",
                    field.name(),
                    values.len(),
                    value_type
                );
                memo.insert(field.name().clone(), values);
                fields.push(index);
            }
            _ => fields.push(field.as_ref().clone()),
        }
    }

    Ok((Schema::new_with_metadata(fields, schema.metadata().clone()), memo))
}

fn read_dictionary_values(
    reader: &mut MessageReader,
    name: &str,
    value_type: &DataType,
) -> Result<ArrayRef> {
    let framed = reader.next_message()?.ok_or_else(|| {
        InteropError::SchemaFormat(format!("stream ended before the dictionary for '{name}'"))
    })?;
    let message = framed.message()?;

    let batch = match message.header_type() {
        MessageHeader::DictionaryBatch => {
            message.header_as_dictionary_batch().and_then(|d| d.data())
        }
        MessageHeader::RecordBatch => message.header_as_record_batch(),
        other => {
            return Err(InteropError::SchemaFormat(format!(
                "expected a dictionary batch for '{name}', found {other:?}"
            )))
        }
    }
    .ok_or_else(|| InteropError::SchemaFormat(format!("empty dictionary batch for '{name}'")))?;

    let values_schema = Arc::new(Schema::new(vec![Field::new(name, value_type.clone(), true)]));
    let decoded = read_record_batch(
        &framed.body,
        batch,
        values_schema,
        &HashMap::new(),
        None,
        &message.version(),
    )?;
    Ok(Arc::clone(decoded.column(0)))
}
