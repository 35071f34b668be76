//! Binds a recovered schema to a raw device buffer.

use arrow_interop::{plan_columns, BufferSpan, DeviceColumn, InteropError, MessagePrefix, SpanReader};
use arrow_schema::Schema;
use gpu_memory_manager::DeviceArray;
use tracing::debug;

use crate::error::{MaterializeError, Result};

/// Slices a device buffer into typed columns, one per schema field.
#[derive(Debug)]
pub struct DeviceReader {
    array: DeviceArray,
    columns: Vec<DeviceColumn>,
}

impl DeviceReader {
    /// Read the record-batch metadata at the head of `array` and lay out the
    /// columns of `schema` over it. An empty schema binds no columns and
    /// leaves the buffer untouched.
    pub fn bind(schema: &Schema, array: DeviceArray) -> Result<Self> {
        if schema.fields().is_empty() {
            debug!("Empty schema; binding no device columns");
            return Ok(Self { array, columns: Vec::new() });
        }

        let head = array.read(0, array.len().min(8))?;
        let prefix = MessagePrefix::parse(&head)?;
        if prefix.is_end_of_stream() {
            return Err(InteropError::Layout("device buffer holds no record batch".into()).into());
        }

        let metadata = array.read(prefix.prefix_len, prefix.metadata_len)?;
        let body_offset = prefix.prefix_len + prefix.metadata_len;
        let columns = plan_columns(schema, &metadata, body_offset, array.len())?;

        for column in &columns {
            debug!(
                "Column '{}': {:?} x {} at offset {} (stride {})",
                column.name,
                column.data_type,
                column.len,
                column.byte_offset(),
                column.byte_stride()
            );
        }

        Ok(Self { array, columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len)
    }

    pub fn columns(&self) -> &[DeviceColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&DeviceColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn into_parts(self) -> (DeviceArray, Vec<DeviceColumn>) {
        (self.array, self.columns)
    }
}

/// Reads column buffers off the device.
pub(crate) struct DeviceBytes<'a>(pub &'a DeviceArray);

impl SpanReader for DeviceBytes<'_> {
    type Error = MaterializeError;

    fn read_span(&self, span: BufferSpan) -> Result<Vec<u8>> {
        Ok(self.0.read(span.offset, span.len)?)
    }
}
