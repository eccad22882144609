//! Conversions between driver wire values and [`RowValues`].
//!
//! Pure and stateless. Column-driven conversions use the catalog metadata reported for the
//! executed statement; parameters are converted from the value alone unless the caller names the
//! declared type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

use crate::driver::WireValue;
use crate::error::SqlMiddlewareDbError;
use crate::types::{ColumnMetadata, Decimal, RowValues, SqlType};

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamps go out at microsecond scale.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const TIMESTAMP_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    // DB2 external form: 2024-01-31-13.45.00.000000
    "%Y-%m-%d-%H.%M.%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp in any of the accepted text forms. A bare date means midnight.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date()))
}

fn conversion_error(column: &ColumnMetadata, raw: &WireValue) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::ConversionError(format!(
        "column {} ({}): cannot convert {raw:?}",
        column.name, column.type_name
    ))
}

/// Convert one raw column value into its native form.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ConversionError`] if the raw value does not fit the column's
/// declared type (for example a `DATE` column holding `not-a-date`).
pub fn to_native(column: &ColumnMetadata, raw: WireValue) -> Result<RowValues, SqlMiddlewareDbError> {
    if raw == WireValue::Null {
        return Ok(RowValues::Null);
    }
    match column.sql_type() {
        SqlType::Decimal => decimal_to_native(column, raw),
        SqlType::Integer => match raw {
            WireValue::Integer(i) => Ok(RowValues::Int(i)),
            #[allow(clippy::cast_possible_truncation)]
            WireValue::Real(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(RowValues::Int(f as i64)),
            WireValue::Text(ref s) => s
                .trim()
                .parse()
                .map(RowValues::Int)
                .map_err(|_| conversion_error(column, &raw)),
            _ => Err(conversion_error(column, &raw)),
        },
        SqlType::Float => match raw {
            WireValue::Real(f) => Ok(RowValues::Float(f)),
            #[allow(clippy::cast_precision_loss)]
            WireValue::Integer(i) => Ok(RowValues::Float(i as f64)),
            WireValue::Text(ref s) => s
                .trim()
                .parse()
                .map(RowValues::Float)
                .map_err(|_| conversion_error(column, &raw)),
            _ => Err(conversion_error(column, &raw)),
        },
        SqlType::Char | SqlType::VarChar | SqlType::Time => match raw {
            WireValue::Text(s) => Ok(RowValues::Text(s)),
            WireValue::Integer(i) => Ok(RowValues::Text(i.to_string())),
            WireValue::Real(f) => Ok(RowValues::Text(f.to_string())),
            WireValue::Blob(_) | WireValue::Null => Err(conversion_error(column, &raw)),
        },
        SqlType::Date => match raw {
            WireValue::Text(ref s) => parse_date(s)
                .map(RowValues::Date)
                .ok_or_else(|| conversion_error(column, &raw)),
            _ => Err(conversion_error(column, &raw)),
        },
        SqlType::Timestamp => match raw {
            WireValue::Text(ref s) => parse_timestamp(s)
                .map(RowValues::Timestamp)
                .ok_or_else(|| conversion_error(column, &raw)),
            WireValue::Integer(secs) => DateTime::from_timestamp(secs, 0)
                .map(|dt| RowValues::Timestamp(dt.naive_utc()))
                .ok_or_else(|| conversion_error(column, &raw)),
            _ => Err(conversion_error(column, &raw)),
        },
        SqlType::Binary => match raw {
            WireValue::Blob(b) => Ok(RowValues::Blob(b)),
            WireValue::Text(s) => Ok(RowValues::Blob(s.into_bytes())),
            _ => Err(conversion_error(column, &raw)),
        },
        SqlType::Boolean => match raw {
            WireValue::Integer(i) => Ok(RowValues::Bool(i != 0)),
            WireValue::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "y" => Ok(RowValues::Bool(true)),
                "0" | "false" | "n" => Ok(RowValues::Bool(false)),
                _ => Err(conversion_error(column, &raw)),
            },
            _ => Err(conversion_error(column, &raw)),
        },
        SqlType::Other => Ok(untyped_to_native(raw)),
    }
}

fn decimal_to_native(
    column: &ColumnMetadata,
    raw: WireValue,
) -> Result<RowValues, SqlMiddlewareDbError> {
    let scale = column.scale;
    let value = match raw {
        WireValue::Integer(i) => Decimal::from_i64(i),
        // Engines that hand decimals back as doubles are re-quantised at the declared scale.
        WireValue::Real(f) => {
            Decimal::from_f64_at_scale(f, scale).ok_or_else(|| conversion_error(column, &raw))?
        }
        WireValue::Text(ref s) => s.parse().map_err(|_| conversion_error(column, &raw))?,
        WireValue::Blob(_) | WireValue::Null => return Err(conversion_error(column, &raw)),
    };
    Ok(RowValues::Decimal(value.rescale(scale).unwrap_or(value)))
}

/// Convert a value whose column type is unknown, following the wire representation.
#[must_use]
pub fn untyped_to_native(raw: WireValue) -> RowValues {
    match raw {
        WireValue::Null => RowValues::Null,
        WireValue::Integer(i) => RowValues::Int(i),
        WireValue::Real(f) => RowValues::Float(f),
        WireValue::Text(s) => RowValues::Text(s),
        WireValue::Blob(b) => RowValues::Blob(b),
    }
}

/// Convert a generated identity value. Keys never pass through floating point.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ConversionError`] if the key is not an exact number.
pub fn key_to_native(raw: WireValue) -> Result<RowValues, SqlMiddlewareDbError> {
    match raw {
        WireValue::Integer(i) => Ok(RowValues::Int(i)),
        WireValue::Text(ref s) => {
            let key: Decimal = s.parse()?;
            Ok(key.to_i64().map_or(RowValues::Decimal(key), RowValues::Int))
        }
        other => Err(SqlMiddlewareDbError::ConversionError(format!(
            "generated key {other:?} is not an exact number"
        ))),
    }
}

/// Convert a fetched row, column by column.
///
/// With `trim` set, fixed-width `CHAR` values lose their blank padding.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ConversionError`] if the row width does not match the column
/// descriptors or a value fails to convert.
pub fn row_to_native(
    columns: &[ColumnMetadata],
    raw: Vec<WireValue>,
    trim: bool,
) -> Result<Vec<RowValues>, SqlMiddlewareDbError> {
    if raw.len() != columns.len() {
        return Err(SqlMiddlewareDbError::ConversionError(format!(
            "row has {} values but {} columns were described",
            raw.len(),
            columns.len()
        )));
    }
    columns
        .iter()
        .zip(raw)
        .map(|(column, value)| {
            let native = to_native(column, value)?;
            Ok(match native {
                RowValues::Text(s) if trim && column.sql_type() == SqlType::Char => {
                    RowValues::Text(s.trim_end_matches(' ').to_owned())
                }
                other => other,
            })
        })
        .collect()
}

/// Convert one parameter for the wire.
///
/// `declared` is the parameter's declared type when known; `None` converts from the value alone.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ParameterError`] if a text value declared as `DATE` is not an
/// ISO calendar date.
pub fn to_remote(
    declared: Option<SqlType>,
    value: &RowValues,
) -> Result<WireValue, SqlMiddlewareDbError> {
    Ok(match value {
        RowValues::Null => WireValue::Null,
        RowValues::Int(i) => WireValue::Integer(*i),
        RowValues::Float(f) => WireValue::Real(*f),
        RowValues::Decimal(d) => match d.to_i64() {
            Some(i) => WireValue::Integer(i),
            None => WireValue::Text(d.to_string()),
        },
        RowValues::Text(s) => {
            if declared == Some(SqlType::Date) {
                let date = NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| {
                    SqlMiddlewareDbError::ParameterError(format!("'{s}' is not an ISO date"))
                })?;
                WireValue::Text(date.format(DATE_FORMAT).to_string())
            } else {
                WireValue::Text(s.clone())
            }
        }
        RowValues::Bool(b) => WireValue::Integer(i64::from(*b)),
        RowValues::Date(d) => WireValue::Text(d.format(DATE_FORMAT).to_string()),
        RowValues::Timestamp(ts) => WireValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        RowValues::Blob(b) => WireValue::Blob(b.clone()),
    })
}

/// Convert a parameter tuple with no declared types.
///
/// # Errors
/// Propagates [`to_remote`] failures.
pub fn params_to_remote(params: &[RowValues]) -> Result<Vec<WireValue>, SqlMiddlewareDbError> {
    params.iter().map(|p| to_remote(None, p)).collect()
}

impl RowValues {
    /// JSON form used by serialized row streams.
    ///
    /// Decimals become JSON numbers only when they are integers that fit an `i64`; any other
    /// decimal is emitted as its exact string so no digits are lost.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Null => JsonValue::Null,
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Decimal(d) => d
                .to_i64()
                .map_or_else(|| JsonValue::String(d.to_string()), JsonValue::from),
            RowValues::Text(s) => JsonValue::String(s.clone()),
            RowValues::Bool(b) => JsonValue::Bool(*b),
            RowValues::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
            RowValues::Timestamp(ts) => JsonValue::String(ts.format(TIMESTAMP_FORMAT).to_string()),
            RowValues::Blob(bytes) => {
                JsonValue::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
            }
        }
    }
}
