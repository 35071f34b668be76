//! Device column views → host Arrow arrays.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{make_array, ArrayRef, DictionaryArray, RecordBatch};
use arrow_buffer::Buffer;
use arrow_data::ArrayData;
use arrow_schema::{DataType, SchemaRef};

use crate::column_buffer::{BufferSpan, DeviceColumn};
use crate::error::InteropError;

/// Source of the bytes behind a [`BufferSpan`], usually a device mapping.
pub trait SpanReader {
    type Error: From<InteropError>;

    fn read_span(&self, span: BufferSpan) -> Result<Vec<u8>, Self::Error>;
}

/// Copy one device column to the host as an Arrow array of its physical type.
pub fn device_column_to_array<R: SpanReader>(
    column: &DeviceColumn,
    reader: &R,
) -> Result<ArrayRef, R::Error> {
    let mut builder = ArrayData::builder(column.data_type.clone()).len(column.len);

    if let Some(validity) = column.validity {
        builder = builder.null_bit_buffer(Some(Buffer::from_vec(reader.read_span(validity)?)));
    }
    if let Some(offsets) = column.offsets {
        builder = builder.add_buffer(Buffer::from_vec(reader.read_span(offsets)?));
    }
    builder = builder.add_buffer(Buffer::from_vec(reader.read_span(column.values)?));

    let data = builder
        .build_aligned()
        .map_err(|e| R::Error::from(InteropError::from(e)))?;
    Ok(make_array(data))
}

/// Pair an index array with its distinct values as one dictionary array.
///
/// Out-of-range indices are rejected by the dictionary array itself; null
/// indices stay null.
pub fn dictionary_column(keys: &ArrayRef, values: ArrayRef) -> Result<ArrayRef, InteropError> {
    macro_rules! dictionary {
        ($key:ty) => {
            Arc::new(DictionaryArray::<$key>::try_new(
                keys.as_primitive::<$key>().clone(),
                values,
            )?) as ArrayRef
        };
    }

    Ok(match keys.data_type() {
        DataType::Int8 => dictionary!(Int8Type),
        DataType::Int16 => dictionary!(Int16Type),
        DataType::Int32 => dictionary!(Int32Type),
        DataType::Int64 => dictionary!(Int64Type),
        DataType::UInt8 => dictionary!(UInt8Type),
        DataType::UInt16 => dictionary!(UInt16Type),
        DataType::UInt32 => dictionary!(UInt32Type),
        DataType::UInt64 => dictionary!(UInt64Type),
        other => {
            return Err(InteropError::Layout(format!(
                "{other:?} cannot index a dictionary"
            )))
        }
    })
}

/// Build a record batch whose schema is derived from the arrays themselves,
/// so dictionary columns keep their dictionary type.
pub fn columns_to_record_batch(
    columns: Vec<(String, ArrayRef)>,
) -> Result<RecordBatch, InteropError> {
    if columns.is_empty() {
        let schema: SchemaRef = Arc::new(arrow_schema::Schema::empty());
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_from_iter(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Array, Int32Array, StringArray};

    struct HostBytes(Vec<u8>);

    impl SpanReader for HostBytes {
        type Error = InteropError;

        fn read_span(&self, span: BufferSpan) -> Result<Vec<u8>, InteropError> {
            span.end()
                .and_then(|end| self.0.get(span.offset..end))
                .map(<[u8]>::to_vec)
                .ok_or_else(|| InteropError::Layout("span out of range".into()))
        }
    }

    #[test]
    fn copies_fixed_width_column() {
        let mut bytes = vec![0u8; 4];
        for v in [7i32, -1, 9] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let column = DeviceColumn {
            name: "a".into(),
            data_type: DataType::Int32,
            len: 3,
            null_count: 0,
            validity: None,
            offsets: None,
            values: BufferSpan { offset: 4, len: 12 },
        };
        let array = device_column_to_array(&column, &HostBytes(bytes)).unwrap();
        assert_eq!(array.as_primitive::<Int32Type>().values().to_vec(), vec![7, -1, 9]);
    }

    #[test]
    fn honours_validity_bitmap() {
        let mut bytes = vec![0b0000_0101u8, 0, 0, 0, 0, 0, 0, 0];
        for v in [1i64, 0, 3] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let column = DeviceColumn {
            name: "a".into(),
            data_type: DataType::Int64,
            len: 3,
            null_count: 1,
            validity: Some(BufferSpan { offset: 0, len: 1 }),
            offsets: None,
            values: BufferSpan { offset: 8, len: 24 },
        };
        let array = device_column_to_array(&column, &HostBytes(bytes)).unwrap();
        assert_eq!(array.null_count(), 1);
        assert!(array.is_null(1));
    }

    #[test]
    fn dictionary_from_indices() {
        let keys: ArrayRef = Arc::new(Int32Array::from(vec![Some(2), Some(0), None]));
        let values: ArrayRef = Arc::new(StringArray::from(vec!["a", "b", "c"]));
        let dict = dictionary_column(&keys, values).unwrap();
        assert_eq!(
            dict.data_type(),
            &DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
        );
        assert!(dict.is_null(2));
    }

    #[test]
    fn dictionary_rejects_out_of_range_index() {
        let keys: ArrayRef = Arc::new(Int32Array::from(vec![5]));
        let values: ArrayRef = Arc::new(StringArray::from(vec!["a"]));
        assert!(dictionary_column(&keys, values).is_err());
    }

    #[test]
    fn float_cannot_index() {
        let keys: ArrayRef = Arc::new(arrow_array::Float32Array::from(vec![1.0]));
        let values: ArrayRef = Arc::new(StringArray::from(vec!["a"]));
        assert!(matches!(dictionary_column(&keys, values), Err(InteropError::Layout(_))));
    }
}
