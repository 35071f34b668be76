//! Decoding of row-wise wire records.
//!
//! Each cell arrives as a [`WireDatum`] with an integer, a real and a string
//! slot. The column's type name selects the slot, and either the explicit
//! `is_null` flag or the type's null sentinel in that slot marks a missing
//! value.

use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, RecordBatch, StringArray, Time32SecondArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{InteropError, Result};
use crate::null_sentinels::{self, TypeMapping, WireSlot};
use crate::temporal::{self, TemporalPrecision};

const SECONDS_PER_DAY: i64 = 86_400;

/// One cell of a row-wise result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireDatum {
    pub int_val: i64,
    pub real_val: f64,
    pub str_val: String,
    pub is_null: bool,
}

impl WireDatum {
    pub fn int(v: i64) -> Self {
        Self { int_val: v, ..Default::default() }
    }

    pub fn real(v: f64) -> Self {
        Self { real_val: v, ..Default::default() }
    }

    pub fn str(v: impl Into<String>) -> Self {
        Self { str_val: v.into(), ..Default::default() }
    }

    pub fn null() -> Self {
        Self { is_null: true, ..Default::default() }
    }
}

/// Column descriptor of a row-wise result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireColumn {
    pub name: String,
    pub type_name: String,
    /// Timestamp precision code, or decimal precision for DECIMAL.
    pub precision: i32,
    /// Decimal scale; ignored for other types.
    pub scale: i32,
}

impl WireColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into(), precision: 0, scale: 0 }
    }

    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    fn upper_type(&self) -> String {
        self.type_name.trim().to_ascii_uppercase()
    }

    /// Arrow type this column decodes into.
    pub fn arrow_type(&self) -> Result<DataType> {
        Ok(match self.upper_type().as_str() {
            "BOOL" | "BOOLEAN" => DataType::Boolean,
            "TINYINT" => DataType::Int8,
            "SMALLINT" => DataType::Int16,
            "INT" | "INTEGER" => DataType::Int32,
            "BIGINT" => DataType::Int64,
            "FLOAT" => DataType::Float32,
            "DOUBLE" => DataType::Float64,
            "DECIMAL" => DataType::Decimal128(
                decimal_precision(self.precision)?,
                i8::try_from(self.scale).map_err(|_| {
                    InteropError::InvalidInput(format!("decimal scale {} out of range", self.scale))
                })?,
            ),
            "TIMESTAMP" => {
                DataType::Timestamp(TemporalPrecision::from_code(self.precision)?.time_unit(), None)
            }
            "DATE" => DataType::Date32,
            "TIME" => DataType::Time32(TimeUnit::Second),
            "STR" | "POINT" | "LINESTRING" | "POLYGON" | "MULTIPOLYGON" | "GEOMETRY"
            | "GEOGRAPHY" => DataType::Utf8,
            _ => return Err(InteropError::UnknownType(self.type_name.clone())),
        })
    }
}

/// Narrow a wire integer to the column's width, rejecting values that do not fit.
fn narrow<T: TryFrom<i64>>(v: i64, column: &WireColumn) -> Result<T> {
    T::try_from(v).map_err(|_| {
        InteropError::InvalidInput(format!(
            "value {v} out of range for {} column '{}'",
            column.type_name, column.name
        ))
    })
}

fn decimal_precision(p: i32) -> Result<u8> {
    u8::try_from(p)
        .ok()
        .filter(|p| (1..=38).contains(p))
        .ok_or_else(|| InteropError::InvalidInput(format!("decimal precision {p} out of range")))
}

/// Decoded scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Decimal { unscaled: i64, scale: i32 },
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
}

fn is_null(mapping: &TypeMapping, datum: &WireDatum) -> bool {
    datum.is_null
        || match mapping.slot {
            WireSlot::IntCol => mapping.sentinel.matches_int(datum.int_val),
            WireSlot::RealCol => mapping.sentinel.matches_real(datum.real_val),
            WireSlot::StrCol => mapping.sentinel.matches_str(&datum.str_val),
        }
}

/// Decode one cell of `column`.
pub fn decode_datum(column: &WireColumn, datum: &WireDatum) -> Result<Value> {
    let mapping = null_sentinels::lookup(&column.type_name)?;
    if is_null(&mapping, datum) {
        return Ok(Value::Null);
    }

    let v = datum.int_val;
    Ok(match column.upper_type().as_str() {
        "BOOL" | "BOOLEAN" => Value::Bool(v != 0),
        "TINYINT" => Value::Int(narrow::<i8>(v, column)?.into()),
        "SMALLINT" => Value::Int(narrow::<i16>(v, column)?.into()),
        "INT" | "INTEGER" => Value::Int(narrow::<i32>(v, column)?.into()),
        "BIGINT" => Value::Int(v),
        "FLOAT" | "DOUBLE" => Value::Real(datum.real_val),
        "DECIMAL" => Value::Decimal { unscaled: v, scale: column.scale },
        "TIMESTAMP" => Value::Timestamp(temporal::decode_epoch(v, column.precision)?),
        "DATE" => Value::Date(
            DateTime::from_timestamp(v, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| InteropError::InvalidInput(format!("date {v} out of range")))?,
        ),
        "TIME" => Value::Time(temporal::seconds_to_time(v)),
        _ => Value::Text(datum.str_val.clone()),
    })
}

/// Decode a row-wise result into one record batch.
pub fn decode_rows(columns: &[WireColumn], rows: &[Vec<WireDatum>]) -> Result<RecordBatch> {
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
        return Err(InteropError::InvalidInput(format!(
            "row {i} has {} cells, expected {}",
            row.len(),
            columns.len()
        )));
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (c, column) in columns.iter().enumerate() {
        let data_type = column.arrow_type()?;
        let cells = rows
            .iter()
            .map(|row| decode_datum(column, &row[c]))
            .collect::<Result<Vec<_>>>()?;
        arrays.push(values_to_array(column, &data_type, &cells)?);
        fields.push(Field::new(&column.name, data_type, true));
    }

    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}

fn values_to_array(column: &WireColumn, data_type: &DataType, cells: &[Value]) -> Result<ArrayRef> {
    let ints = || -> Vec<Option<i64>> {
        cells
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i),
                Value::Decimal { unscaled, .. } => Some(*unscaled),
                _ => None,
            })
            .collect()
    };
    let reals = || -> Vec<Option<f64>> {
        cells.iter().map(|v| if let Value::Real(r) = v { Some(*r) } else { None }).collect()
    };

    let array: ArrayRef = match data_type {
        DataType::Boolean => Arc::new(
            cells
                .iter()
                .map(|v| if let Value::Bool(b) = v { Some(*b) } else { None })
                .collect::<BooleanArray>(),
        ),
        DataType::Int8 => Arc::new(
            ints()
                .into_iter()
                .map(|v| v.map(|v| narrow::<i8>(v, column)).transpose())
                .collect::<Result<Int8Array>>()?,
        ),
        DataType::Int16 => Arc::new(
            ints()
                .into_iter()
                .map(|v| v.map(|v| narrow::<i16>(v, column)).transpose())
                .collect::<Result<Int16Array>>()?,
        ),
        DataType::Int32 => Arc::new(
            ints()
                .into_iter()
                .map(|v| v.map(|v| narrow::<i32>(v, column)).transpose())
                .collect::<Result<Int32Array>>()?,
        ),
        DataType::Int64 => Arc::new(Int64Array::from(ints())),
        DataType::Float32 => Arc::new(reals().into_iter().map(|v| v.map(|v| v as f32)).collect::<Float32Array>()),
        DataType::Float64 => Arc::new(Float64Array::from(reals())),
        DataType::Decimal128(p, s) => Arc::new(
            ints()
                .into_iter()
                .map(|v| v.map(i128::from))
                .collect::<Decimal128Array>()
                .with_precision_and_scale(*p, *s)?,
        ),
        DataType::Timestamp(_, _) => {
            let precision = TemporalPrecision::from_code(column.precision)?;
            let epochs = cells
                .iter()
                .map(|v| match v {
                    Value::Timestamp(ts) => temporal::encode_epoch(*ts, precision).map(Some),
                    _ => Ok(None),
                })
                .collect::<Result<Vec<_>>>()?;
            match precision {
                TemporalPrecision::Seconds => Arc::new(TimestampSecondArray::from(epochs)),
                TemporalPrecision::Milliseconds => Arc::new(TimestampMillisecondArray::from(epochs)),
                TemporalPrecision::Microseconds => Arc::new(TimestampMicrosecondArray::from(epochs)),
                TemporalPrecision::Nanoseconds => Arc::new(TimestampNanosecondArray::from(epochs)),
            }
        }
        DataType::Date32 => Arc::new(
            cells
                .iter()
                .map(|v| match v {
                    Value::Date(d) => {
                        narrow::<i32>(temporal::date_to_seconds(*d).div_euclid(SECONDS_PER_DAY), column)
                            .map(Some)
                    }
                    _ => Ok(None),
                })
                .collect::<Result<Date32Array>>()?,
        ),
        DataType::Time32(_) => Arc::new(
            cells
                .iter()
                .map(|v| match v {
                    Value::Time(t) => temporal::time_to_seconds(Some(*t))
                        .and_then(|s| narrow::<i32>(s, column))
                        .map(Some),
                    _ => Ok(None),
                })
                .collect::<Result<Time32SecondArray>>()?,
        ),
        DataType::Utf8 => Arc::new(
            cells
                .iter()
                .map(|v| if let Value::Text(s) = v { Some(s.as_str()) } else { None })
                .collect::<StringArray>(),
        ),
        other => return Err(InteropError::TypeMismatch(other.clone())),
    };
    Ok(array)
}
