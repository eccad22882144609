//! Fixed-layout packing of program-call records.
//!
//! Fields are laid out back to back in schema order, each exactly `byte_size` bytes:
//! - character fields: UTF-8, left-justified, blank padded
//! - numeric fields: the value times `10^decimal_count` as a big-endian two's-complement integer

use super::{ProgramField, ProgramRecord, ProgramSchema};
use crate::error::SqlMiddlewareDbError;
use crate::types::{Decimal, RowValues};

/// Widest numeric field, the size of an `i128`.
pub const MAX_NUMERIC_BYTES: usize = 16;

fn program_error(schema: &ProgramSchema, field: &ProgramField, detail: &str) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::ProgramError(format!(
        "{}.{}: {detail}",
        schema.program_name, field.name
    ))
}

/// Reject layouts that cannot be packed.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ProgramError`] for zero-width fields, numeric fields wider
/// than 16 bytes, or duplicate field names.
pub fn validate(schema: &ProgramSchema) -> Result<(), SqlMiddlewareDbError> {
    let mut seen = std::collections::HashSet::new();
    for field in &schema.fields {
        if field.byte_size == 0 {
            return Err(program_error(schema, field, "byte size must be at least 1"));
        }
        if field.decimal_count.is_some() && field.byte_size > MAX_NUMERIC_BYTES {
            return Err(program_error(
                schema,
                field,
                &format!("numeric fields are at most {MAX_NUMERIC_BYTES} bytes"),
            ));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(program_error(schema, field, "duplicate field name"));
        }
    }
    Ok(())
}

/// Pack `input` into the call buffer. Fields missing from `input` pack as blanks or zero.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ProgramError`] if a value does not fit its field.
pub fn pack(schema: &ProgramSchema, input: &ProgramRecord) -> Result<Vec<u8>, SqlMiddlewareDbError> {
    validate(schema)?;
    let mut buffer = Vec::with_capacity(schema.buffer_len());
    for field in &schema.fields {
        let value = input.get(&field.name).unwrap_or(&RowValues::Null);
        match field.decimal_count {
            None => pack_text(schema, field, value, &mut buffer)?,
            Some(scale) => pack_numeric(schema, field, scale, value, &mut buffer)?,
        }
    }
    Ok(buffer)
}

fn pack_text(
    schema: &ProgramSchema,
    field: &ProgramField,
    value: &RowValues,
    buffer: &mut Vec<u8>,
) -> Result<(), SqlMiddlewareDbError> {
    let text = match value {
        RowValues::Null => String::new(),
        RowValues::Text(s) => s.clone(),
        RowValues::Int(i) => i.to_string(),
        RowValues::Decimal(d) => d.to_string(),
        RowValues::Bool(b) => (if *b { "1" } else { "0" }).to_owned(),
        other => match other.to_json() {
            serde_json::Value::String(s) => s,
            json => json.to_string(),
        },
    };
    let bytes = text.as_bytes();
    if bytes.len() > field.byte_size {
        return Err(program_error(
            schema,
            field,
            &format!(
                "value '{text}' is {} bytes, wider than the field's {}",
                bytes.len(),
                field.byte_size
            ),
        ));
    }
    buffer.extend_from_slice(bytes);
    buffer.resize(buffer.len() + field.byte_size - bytes.len(), b' ');
    Ok(())
}

fn pack_numeric(
    schema: &ProgramSchema,
    field: &ProgramField,
    scale: u32,
    value: &RowValues,
    buffer: &mut Vec<u8>,
) -> Result<(), SqlMiddlewareDbError> {
    let decimal = match value {
        RowValues::Null => Decimal::new(0, scale),
        RowValues::Int(i) => Decimal::from_i64(*i),
        RowValues::Decimal(d) => *d,
        RowValues::Float(f) => Decimal::from_f64_at_scale(*f, scale)
            .ok_or_else(|| program_error(schema, field, "value is not a finite number"))?,
        RowValues::Text(s) if s.trim().is_empty() => Decimal::new(0, scale),
        RowValues::Text(s) => s
            .parse()
            .map_err(|_| program_error(schema, field, &format!("'{s}' is not numeric")))?,
        other => {
            return Err(program_error(
                schema,
                field,
                &format!("{other:?} is not numeric"),
            ));
        }
    };
    let scaled = decimal.rescale(scale).ok_or_else(|| {
        program_error(
            schema,
            field,
            &format!("{decimal} has more than {scale} fractional digits"),
        )
    })?;
    let mantissa = scaled.mantissa();
    if !fits(mantissa, field.byte_size) {
        return Err(program_error(
            schema,
            field,
            &format!("{decimal} does not fit in {} bytes", field.byte_size),
        ));
    }
    let bytes = mantissa.to_be_bytes();
    buffer.extend_from_slice(&bytes[bytes.len() - field.byte_size..]);
    Ok(())
}

fn fits(value: i128, byte_size: usize) -> bool {
    if byte_size >= MAX_NUMERIC_BYTES {
        return true;
    }
    let bits = u32::try_from(byte_size * 8).unwrap_or(u32::MAX);
    let max = (1_i128 << (bits - 1)) - 1;
    let min = -(1_i128 << (bits - 1));
    (min..=max).contains(&value)
}

/// Unpack a result buffer laid out by `schema`.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::ProgramError`] if the buffer length does not match the layout
/// or a character field is not valid UTF-8.
pub fn unpack(schema: &ProgramSchema, buffer: &[u8]) -> Result<ProgramRecord, SqlMiddlewareDbError> {
    validate(schema)?;
    let expected = schema.buffer_len();
    if buffer.len() != expected {
        return Err(SqlMiddlewareDbError::ProgramError(format!(
            "{}: result buffer is {} bytes, layout needs {expected}",
            schema.program_name,
            buffer.len()
        )));
    }
    let mut record = ProgramRecord::new();
    let mut offset = 0;
    for field in &schema.fields {
        let raw = &buffer[offset..offset + field.byte_size];
        offset += field.byte_size;
        let value = match field.decimal_count {
            None => {
                let text = std::str::from_utf8(raw)
                    .map_err(|_| program_error(schema, field, "result is not valid UTF-8"))?;
                RowValues::Text(text.trim_end_matches(' ').to_owned())
            }
            Some(scale) => RowValues::Decimal(Decimal::new(sign_extend(raw), scale)),
        };
        record.insert(field.name.clone(), value);
    }
    Ok(record)
}

fn sign_extend(raw: &[u8]) -> i128 {
    let negative = raw.first().is_some_and(|b| b & 0x80 != 0);
    let mut bytes = if negative { [0xff_u8; 16] } else { [0_u8; 16] };
    bytes[16 - raw.len()..].copy_from_slice(raw);
    i128::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ProgramSchema {
        ProgramSchema::new(
            "ORDPGM",
            vec![
                ProgramField::text("CUSTNO", 8),
                ProgramField::decimal("AMOUNT", 4, 2),
                ProgramField::decimal("QTY", 2, 0),
            ],
        )
    }

    #[test]
    fn packs_fields_in_schema_order() {
        let mut input = ProgramRecord::new();
        input.insert("QTY".into(), RowValues::Int(-2));
        input.insert("CUSTNO".into(), RowValues::Text("C42".into()));
        input.insert("AMOUNT".into(), RowValues::Decimal("12.5".parse().unwrap()));

        let packed = pack(&schema(), &input).unwrap();
        assert_eq!(packed.len(), 14);
        assert_eq!(&packed[..8], b"C42     ");
        // 12.50 at scale 2 is 1250 = 0x04E2
        assert_eq!(&packed[8..12], &[0, 0, 0x04, 0xE2]);
        assert_eq!(&packed[12..], &[0xFF, 0xFE]);

        let unpacked = unpack(&schema(), &packed).unwrap();
        assert_eq!(unpacked["CUSTNO"], RowValues::Text("C42".into()));
        assert_eq!(unpacked["AMOUNT"].as_decimal().unwrap().to_string(), "12.50");
        assert_eq!(unpacked["QTY"].as_int(), Some(-2));
    }

    #[test]
    fn missing_fields_pack_as_blank_and_zero() {
        let packed = pack(&schema(), &ProgramRecord::new()).unwrap();
        assert_eq!(&packed[..8], b"        ");
        assert!(packed[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn rejects_values_wider_than_their_field() {
        let mut input = ProgramRecord::new();
        input.insert("CUSTNO".into(), RowValues::Text("TOO-LONG-ID".into()));
        let err = pack(&schema(), &input).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Programming);

        let mut input = ProgramRecord::new();
        input.insert("QTY".into(), RowValues::Int(40_000));
        assert!(pack(&schema(), &input).is_err());

        let mut input = ProgramRecord::new();
        input.insert("AMOUNT".into(), RowValues::Decimal("1.005".parse().unwrap()));
        assert!(pack(&schema(), &input).is_err());

        let mut input = ProgramRecord::new();
        input.insert("AMOUNT".into(), RowValues::Text("abc".into()));
        assert!(pack(&schema(), &input).is_err());
    }

    #[test]
    fn rejects_bad_layouts_and_buffers() {
        let bad = ProgramSchema::new("X", vec![ProgramField::decimal("N", 17, 0)]);
        assert!(validate(&bad).is_err());
        let bad = ProgramSchema::new("X", vec![ProgramField::text("T", 0)]);
        assert!(validate(&bad).is_err());
        assert!(unpack(&schema(), &[0; 3]).is_err());
    }

    #[test]
    fn sixteen_byte_fields_use_the_full_range() {
        let wide = ProgramSchema::new("X", vec![ProgramField::decimal("N", 16, 0)]);
        let mut input = ProgramRecord::new();
        let big: Decimal = "-99999999999999999999999999999999999999".parse().unwrap();
        input.insert("N".into(), RowValues::Decimal(big));
        let packed = pack(&wide, &input).unwrap();
        assert_eq!(unpack(&wide, &packed).unwrap()["N"], RowValues::Decimal(big));
    }
}
