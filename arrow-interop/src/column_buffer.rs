//! Typed column views over a raw device buffer.
//!
//! The device buffer holds one encapsulated record-batch message: a length
//! prefix, flatbuffer metadata, then the body. The metadata lists one field
//! node per column and the byte ranges of each column's buffers relative to
//! the body. Walking those ranges in schema order gives every column's
//! position without touching the body itself.

use arrow_schema::{DataType, Schema};

use crate::error::{InteropError, Result};
use crate::ipc_message::decode_message;
use crate::schema_utils::physical_type;

/// Absolute byte range inside the device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpan {
    pub offset: usize,
    pub len: usize,
}

impl BufferSpan {
    /// One past the last byte, or `None` if the range overflows.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.len)
    }
}

/// How a physical type lays its values out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLayout {
    /// `n` bytes per element.
    FixedWidth(usize),
    /// One bit per element.
    Bitmap,
    /// Offsets of the given width into a byte array.
    Variable { offset_width: usize },
}

impl ValueLayout {
    pub fn of(dt: &DataType) -> Result<Self> {
        match dt {
            DataType::Boolean => Ok(Self::Bitmap),
            DataType::Utf8 | DataType::Binary => Ok(Self::Variable { offset_width: 4 }),
            DataType::LargeUtf8 | DataType::LargeBinary => Ok(Self::Variable { offset_width: 8 }),
            other => other
                .primitive_width()
                .map(Self::FixedWidth)
                .ok_or_else(|| InteropError::Layout(format!("unsupported column type {other:?}"))),
        }
    }
}

/// A typed view over a contiguous range of the device buffer. Never owns
/// device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceColumn {
    pub name: String,
    /// Physical element type. Dictionary fields report their index type.
    pub data_type: DataType,
    pub len: usize,
    pub null_count: usize,
    pub validity: Option<BufferSpan>,
    /// Present for variable-width columns only.
    pub offsets: Option<BufferSpan>,
    pub values: BufferSpan,
}

impl DeviceColumn {
    pub fn byte_offset(&self) -> usize {
        self.values.offset
    }

    /// Bytes between consecutive elements. Zero for bit-packed columns; the
    /// offset width for variable-width columns.
    pub fn byte_stride(&self) -> usize {
        match ValueLayout::of(&self.data_type) {
            Ok(ValueLayout::FixedWidth(w)) => w,
            Ok(ValueLayout::Variable { offset_width }) => offset_width,
            Ok(ValueLayout::Bitmap) | Err(_) => 0,
        }
    }
}

/// Column views for every field of `schema`, in field order.
///
/// `metadata` is the record-batch flatbuffer copied off the device, `body_offset`
/// is where the body starts in the device buffer and `device_len` its total size.
pub fn plan_columns(
    schema: &Schema,
    metadata: &[u8],
    body_offset: usize,
    device_len: usize,
) -> Result<Vec<DeviceColumn>> {
    let message = decode_message(metadata)?;
    let batch = message.header_as_record_batch().ok_or_else(|| {
        InteropError::Layout(format!(
            "device buffer holds a {:?} message, expected a record batch",
            message.header_type()
        ))
    })?;
    if batch.compression().is_some() {
        return Err(InteropError::Layout("compressed record batches are not supported".into()));
    }

    let nodes = batch
        .nodes()
        .ok_or_else(|| InteropError::Layout("record batch lists no field nodes".into()))?;
    let buffers = batch
        .buffers()
        .ok_or_else(|| InteropError::Layout("record batch lists no buffers".into()))?;
    if nodes.len() != schema.fields().len() {
        return Err(InteropError::Layout(format!(
            "schema has {} fields but the record batch has {} field nodes",
            schema.fields().len(),
            nodes.len()
        )));
    }

    let mut next_buffer = {
        let mut idx = 0usize;
        move |field: &str| -> Result<BufferSpan> {
            if idx >= buffers.len() {
                return Err(InteropError::Layout(format!("ran out of buffers at field '{field}'")));
            }
            let b = buffers.get(idx);
            idx += 1;
            let (offset, len) = (usize::try_from(b.offset()), usize::try_from(b.length()));
            let span = match (offset, len) {
                (Ok(offset), Ok(len)) => BufferSpan {
                    offset: body_offset.checked_add(offset).ok_or_else(|| {
                        InteropError::Layout(format!("buffer offset overflows at field '{field}'"))
                    })?,
                    len,
                },
                _ => return Err(InteropError::Layout(format!("negative buffer range at field '{field}'"))),
            };
            if span.end().map_or(true, |end| end > device_len) {
                return Err(InteropError::Layout(format!(
                    "buffer {:?} of field '{field}' ends past the device buffer ({device_len} bytes)",
                    span
                )));
            }
            Ok(span)
        }
    };

    let mut columns = Vec::with_capacity(nodes.len());
    for (i, field) in schema.fields().iter().enumerate() {
        let node = nodes.get(i);
        let name = field.name().as_str();
        let data_type = physical_type(field.data_type()).clone();
        let layout = ValueLayout::of(&data_type)?;

        let len = usize::try_from(node.length())
            .map_err(|_| InteropError::Layout(format!("negative length for field '{name}'")))?;
        let null_count = usize::try_from(node.null_count())
            .map_err(|_| InteropError::Layout(format!("negative null count for field '{name}'")))?;

        let validity = next_buffer(name)?;
        let offsets = match layout {
            ValueLayout::Variable { .. } => Some(next_buffer(name)?),
            _ => None,
        };
        let values = next_buffer(name)?;

        let needed = match layout {
            ValueLayout::FixedWidth(w) => len.checked_mul(w).ok_or_else(|| {
                InteropError::Layout(format!("row count {len} of field '{name}' overflows its byte size"))
            })?,
            ValueLayout::Bitmap => len.div_ceil(8),
            ValueLayout::Variable { .. } => 0,
        };
        if values.len < needed {
            return Err(InteropError::Layout(format!(
                "field '{name}' needs {needed} value bytes for {len} rows, buffer has {}",
                values.len
            )));
        }

        if null_count > len {
            return Err(InteropError::Layout(format!(
                "field '{name}' reports {null_count} nulls for {len} rows"
            )));
        }
        if null_count > 0 && validity.len < len.div_ceil(8) {
            return Err(InteropError::Layout(format!(
                "field '{name}' has {null_count} nulls but a {} byte validity bitmap",
                validity.len
            )));
        }

        columns.push(DeviceColumn {
            name: name.to_string(),
            data_type,
            len,
            null_count,
            validity: (null_count > 0).then_some(validity),
            offsets,
            values,
        });
    }

    Ok(columns)
}
