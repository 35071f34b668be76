//! Conversions between wall-clock values and epoch integers.
//!
//! Timestamps travel as integers paired with a precision code: `0` (seconds),
//! `3` (milliseconds), `6` (microseconds) or `9` (nanoseconds). Times of day
//! travel as seconds since midnight and dates as seconds since the UNIX epoch.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use arrow_array::{Array, ArrayRef, Int64Array};
use arrow_schema::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{InteropError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// Fixed precision of an epoch integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalPrecision {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TemporalPrecision {
    pub const ALL: [TemporalPrecision; 4] = [
        Self::Seconds,
        Self::Milliseconds,
        Self::Microseconds,
        Self::Nanoseconds,
    ];

    /// Wire code: the number of decimal digits after the second.
    pub fn code(self) -> i32 {
        match self {
            Self::Seconds => 0,
            Self::Milliseconds => 3,
            Self::Microseconds => 6,
            Self::Nanoseconds => 9,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Seconds),
            3 => Ok(Self::Milliseconds),
            6 => Ok(Self::Microseconds),
            9 => Ok(Self::Nanoseconds),
            other => Err(InteropError::InvalidPrecision(other)),
        }
    }

    /// Nanoseconds in one unit of this precision.
    pub fn nanos_per_unit(self) -> i64 {
        match self {
            Self::Seconds => 1_000_000_000,
            Self::Milliseconds => 1_000_000,
            Self::Microseconds => 1_000,
            Self::Nanoseconds => 1,
        }
    }

    /// Units of this precision in one second.
    pub fn units_per_second(self) -> i64 {
        1_000_000_000 / self.nanos_per_unit()
    }

    pub fn time_unit(self) -> TimeUnit {
        match self {
            Self::Seconds => TimeUnit::Second,
            Self::Milliseconds => TimeUnit::Millisecond,
            Self::Microseconds => TimeUnit::Microsecond,
            Self::Nanoseconds => TimeUnit::Nanosecond,
        }
    }
}

impl TryFrom<i32> for TemporalPrecision {
    type Error = InteropError;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code)
    }
}

/// Seconds since midnight. Sub-second components are dropped.
///
/// Absence is an error; callers that allow nulls must short-circuit first.
pub fn time_to_seconds(time: Option<NaiveTime>) -> Result<i64> {
    let time = time.ok_or_else(|| InteropError::InvalidInput("time value is absent".into()))?;
    Ok(3600 * i64::from(time.hour()) + 60 * i64::from(time.minute()) + i64::from(time.second()))
}

/// Inverse of [`time_to_seconds`].
///
/// Inputs outside a single day wrap around midnight; the result for such
/// inputs is implementation-defined but never panics.
pub fn seconds_to_time(seconds: i64) -> NaiveTime {
    let seconds = seconds.rem_euclid(SECONDS_PER_DAY);
    let (minutes, s) = (seconds.div_euclid(60), seconds.rem_euclid(60));
    let (h, m) = (minutes.div_euclid(60), minutes.rem_euclid(60));
    NaiveTime::from_hms_opt(h as u32, m as u32, s as u32).unwrap_or(NaiveTime::MIN)
}

/// Seconds since the UNIX epoch at midnight of `date`.
pub fn date_to_seconds(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Convert an epoch integer at `precision` back into a wall-clock value.
pub fn decode_epoch(epoch: i64, precision: i32) -> Result<NaiveDateTime> {
    let precision = TemporalPrecision::from_code(precision)?;
    let per_second = precision.units_per_second();
    let secs = epoch.div_euclid(per_second);
    let nanos = epoch.rem_euclid(per_second) * precision.nanos_per_unit();
    DateTime::from_timestamp(secs, nanos as u32)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| InteropError::InvalidInput(format!("epoch {epoch} out of range")))
}

/// Encode a wall-clock value as an epoch integer at `precision`.
///
/// Finer components than `precision` are truncated toward negative infinity.
pub fn encode_epoch(value: NaiveDateTime, precision: TemporalPrecision) -> Result<i64> {
    let nanos = value
        .and_utc()
        .timestamp_nanos_opt()
        .ok_or_else(|| InteropError::InvalidInput(format!("{value} outside nanosecond range")))?;
    Ok(nanos.div_euclid(precision.nanos_per_unit()))
}

/// Encode a column of datetimes as epoch integers at `precision`.
///
/// * `Int64` input is treated as already-epoch and returned unchanged.
/// * `Timestamp(Nanosecond, None)` is divided directly.
/// * Strings and timezone-aware timestamps are normalized to UTC first.
///
/// Any other dtype is a [`InteropError::TypeMismatch`].
pub fn encode_column_to_epoch(values: &ArrayRef, precision: i32) -> Result<ArrayRef> {
    let precision = TemporalPrecision::from_code(precision)?;
    let divisor = precision.nanos_per_unit();

    let nanos: Int64Array = match values.data_type() {
        DataType::Int64 => return Ok(Arc::clone(values)),
        DataType::Timestamp(TimeUnit::Nanosecond, None) => values
            .as_primitive::<TimestampNanosecondType>()
            .unary(|v| v),
        DataType::Timestamp(unit, Some(_)) => zoned_to_utc_nanos(values.as_ref(), *unit)?,
        DataType::Utf8 => strings_to_utc_nanos(values.as_string::<i32>().iter())?,
        DataType::LargeUtf8 => strings_to_utc_nanos(values.as_string::<i64>().iter())?,
        other => return Err(InteropError::TypeMismatch(other.clone())),
    };

    Ok(Arc::new(nanos.unary::<_, arrow_array::types::Int64Type>(|v| {
        v.div_euclid(divisor)
    })))
}

fn zoned_to_utc_nanos(values: &dyn Array, unit: TimeUnit) -> Result<Int64Array> {
    // Arrow stores zoned timestamps as UTC instants already; only the unit differs.
    let (raw, factor): (Vec<Option<i64>>, i64) = match unit {
        TimeUnit::Second => (
            values.as_primitive::<TimestampSecondType>().iter().collect(),
            1_000_000_000,
        ),
        TimeUnit::Millisecond => (
            values.as_primitive::<TimestampMillisecondType>().iter().collect(),
            1_000_000,
        ),
        TimeUnit::Microsecond => (
            values.as_primitive::<TimestampMicrosecondType>().iter().collect(),
            1_000,
        ),
        TimeUnit::Nanosecond => (
            values.as_primitive::<TimestampNanosecondType>().iter().collect(),
            1,
        ),
    };
    raw.into_iter()
        .map(|v| {
            v.map(|v| {
                v.checked_mul(factor).ok_or_else(|| {
                    InteropError::InvalidInput(format!("timestamp {v} overflows nanoseconds"))
                })
            })
            .transpose()
        })
        .collect()
}

fn strings_to_utc_nanos<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Result<Int64Array> {
    values
        .map(|v| v.map(parse_utc_nanos).transpose())
        .collect::<Result<Int64Array>>()
}

/// Parse a datetime string to UTC nanoseconds. Strings without an offset are
/// taken to be UTC already.
fn parse_utc_nanos(s: &str) -> Result<i64> {
    let s = s.trim();
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.naive_utc()
    } else if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        dt.naive_utc()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        naive
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        naive
    } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        date.and_time(NaiveTime::MIN)
    } else {
        return Err(InteropError::InvalidInput(format!("cannot parse '{s}' as a datetime")));
    };
    encode_epoch(utc, TemporalPrecision::Nanoseconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, StringArray, TimestampNanosecondArray, TimestampSecondArray};
    use proptest::prelude::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn precision_codes() {
        for p in TemporalPrecision::ALL {
            assert_eq!(TemporalPrecision::from_code(p.code()).unwrap(), p);
        }
        assert!(matches!(
            TemporalPrecision::from_code(4),
            Err(InteropError::InvalidPrecision(4))
        ));
    }

    #[test]
    fn time_round_trip() {
        let t = NaiveTime::from_hms_opt(13, 45, 7).unwrap();
        let secs = time_to_seconds(Some(t)).unwrap();
        assert_eq!(secs, 13 * 3600 + 45 * 60 + 7);
        assert_eq!(seconds_to_time(secs), t);
    }

    #[test]
    fn absent_time_is_invalid_input() {
        assert!(matches!(time_to_seconds(None), Err(InteropError::InvalidInput(_))));
    }

    #[test]
    fn out_of_range_seconds_do_not_panic() {
        assert_eq!(seconds_to_time(86_400), NaiveTime::MIN);
        assert_eq!(seconds_to_time(-1), NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        let _ = seconds_to_time(i64::MIN);
    }

    #[test]
    fn date_seconds() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(date_to_seconds(d), 86_400);
    }

    #[test]
    fn decode_each_precision() {
        let expected = dt("2021-03-04 05:06:07.123456789");
        assert_eq!(decode_epoch(1_614_834_367, 0).unwrap(), dt("2021-03-04 05:06:07"));
        assert_eq!(decode_epoch(1_614_834_367_123, 3).unwrap(), dt("2021-03-04 05:06:07.123"));
        assert_eq!(
            decode_epoch(1_614_834_367_123_456, 6).unwrap(),
            dt("2021-03-04 05:06:07.123456")
        );
        assert_eq!(decode_epoch(1_614_834_367_123_456_789, 9).unwrap(), expected);
    }

    #[test]
    fn decode_before_epoch_floors() {
        assert_eq!(decode_epoch(-1, 3).unwrap(), dt("1969-12-31 23:59:59.999"));
    }

    #[test]
    fn decode_rejects_unknown_precision() {
        assert!(matches!(decode_epoch(0, 2), Err(InteropError::InvalidPrecision(2))));
    }

    #[test]
    fn seconds_precision_drops_subsecond() {
        let v = dt("2020-01-01 00:00:01.750");
        let epoch = encode_epoch(v, TemporalPrecision::Seconds).unwrap();
        let back = decode_epoch(epoch, 0).unwrap();
        assert_ne!(back, v);
        assert_eq!(back, dt("2020-01-01 00:00:01"));
    }

    #[test]
    fn integer_column_passes_through() {
        let input: ArrayRef = Arc::new(Int64Array::from(vec![Some(5), None, Some(-3)]));
        let out = encode_column_to_epoch(&input, 3).unwrap();
        assert!(Arc::ptr_eq(&input, &out));
    }

    #[test]
    fn nanosecond_column_divides_directly() {
        let input: ArrayRef = Arc::new(TimestampNanosecondArray::from(vec![
            Some(1_500_000_000),
            None,
        ]));
        let out = encode_column_to_epoch(&input, 0).unwrap();
        let out = out.as_primitive::<arrow_array::types::Int64Type>();
        assert_eq!(out.value(0), 1);
        assert!(out.is_null(1));
    }

    #[test]
    fn zoned_column_normalizes_unit() {
        let input: ArrayRef =
            Arc::new(TimestampSecondArray::from(vec![10]).with_timezone("+02:00"));
        let out = encode_column_to_epoch(&input, 3).unwrap();
        assert_eq!(out.as_primitive::<arrow_array::types::Int64Type>().value(0), 10_000);
    }

    #[test]
    fn string_column_normalizes_to_utc() {
        let input: ArrayRef = Arc::new(StringArray::from(vec![
            Some("1970-01-01T01:00:00+01:00"),
            Some("1970-01-01 00:00:02"),
            None,
        ]));
        let out = encode_column_to_epoch(&input, 0).unwrap();
        let out = out.as_primitive::<arrow_array::types::Int64Type>();
        assert_eq!(out.value(0), 0);
        assert_eq!(out.value(1), 2);
        assert!(out.is_null(2));
    }

    #[test]
    fn bad_string_is_invalid_input() {
        let input: ArrayRef = Arc::new(StringArray::from(vec!["yesterday"]));
        assert!(matches!(
            encode_column_to_epoch(&input, 0),
            Err(InteropError::InvalidInput(_))
        ));
    }

    #[test]
    fn float_column_is_type_mismatch() {
        let input: ArrayRef = Arc::new(Float64Array::from(vec![1.0]));
        assert!(matches!(
            encode_column_to_epoch(&input, 0),
            Err(InteropError::TypeMismatch(DataType::Float64))
        ));
    }

    proptest! {
        #[test]
        fn int64_identity(values in proptest::collection::vec(any::<i64>(), 0..64)) {
            let input: ArrayRef = Arc::new(Int64Array::from(values.clone()));
            for p in TemporalPrecision::ALL {
                let out = encode_column_to_epoch(&input, p.code()).unwrap();
                let out = out.as_primitive::<arrow_array::types::Int64Type>();
                prop_assert_eq!(out.values().to_vec(), values.clone());
            }
        }

        #[test]
        fn round_trip_truncates_to_precision(nanos in -4_000_000_000_000_000_000i64..4_000_000_000_000_000_000i64) {
            let value = decode_epoch(nanos, 9).unwrap();
            for p in TemporalPrecision::ALL {
                let epoch = encode_epoch(value, p).unwrap();
                let back = decode_epoch(epoch, p.code()).unwrap();
                let expected = nanos.div_euclid(p.nanos_per_unit()) * p.nanos_per_unit();
                prop_assert_eq!(back.and_utc().timestamp_nanos_opt().unwrap(), expected);
            }
        }
    }
}
