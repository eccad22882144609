use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

use crate::driver::WireValue;

impl ToSql for WireValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            WireValue::Null => ToSqlOutput::Owned(Value::Null),
            WireValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            WireValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            WireValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            WireValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Copy a column value out of a SQLite row.
pub(super) fn wire_from_ref(value: ValueRef<'_>) -> WireValue {
    match value {
        ValueRef::Null => WireValue::Null,
        ValueRef::Integer(i) => WireValue::Integer(i),
        ValueRef::Real(f) => WireValue::Real(f),
        ValueRef::Text(bytes) => WireValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => WireValue::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_and_reads_back_every_wire_kind() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let values = [
            WireValue::Null,
            WireValue::Integer(-7),
            WireValue::Real(2.5),
            WireValue::Text("héllo".into()),
            WireValue::Blob(vec![0, 255]),
        ];
        for value in values {
            let back = conn
                .query_row("SELECT ?1", [&value], |row| Ok(wire_from_ref(row.get_ref(0)?)))
                .unwrap();
            assert_eq!(back, value);
        }
    }
}
