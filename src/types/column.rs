use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref DECLARED_TYPE: Regex = Regex::new(
        r"^\s*([A-Za-z][A-Za-z0-9_ ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$"
    )
    .expect("declared type pattern is valid");
}

/// Coarse type family of a remote column, derived from its catalog type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Decimal,
    Integer,
    Float,
    /// Fixed-width character (blank padded by the engine)
    Char,
    VarChar,
    Date,
    Timestamp,
    Time,
    Binary,
    Boolean,
    Other,
}

impl SqlType {
    /// Map a remote type name (`DECIMAL`, `VARCHAR`, `TIMESTAMP`, ...) to its family.
    #[must_use]
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "DECIMAL" | "NUMERIC" | "DEC" | "NUMBER" => SqlType::Decimal,
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" => {
                SqlType::Integer
            }
            "REAL" | "DOUBLE" | "FLOAT" | "DOUBLE PRECISION" | "DECFLOAT" => SqlType::Float,
            "CHAR" | "CHARACTER" | "GRAPHIC" | "NCHAR" => SqlType::Char,
            "VARCHAR" | "CHARACTER VARYING" | "TEXT" | "CLOB" | "NVARCHAR" | "VARGRAPHIC"
            | "LONG VARCHAR" => SqlType::VarChar,
            "DATE" => SqlType::Date,
            "TIMESTAMP" | "DATETIME" => SqlType::Timestamp,
            "TIME" => SqlType::Time,
            "BLOB" | "BINARY" | "VARBINARY" => SqlType::Binary,
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            _ => SqlType::Other,
        }
    }
}

/// Column descriptor reported by the remote catalog once a statement has executed.
///
/// Precision and scale come from the catalog, never from the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "typeName")]
    pub type_name: String,
    pub precision: u32,
    pub scale: u32,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, precision: u32, scale: u32) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            precision,
            scale,
        }
    }

    /// Build from a declared column type such as `DECIMAL(15, 2)` or `VARCHAR(300)`.
    #[must_use]
    pub fn from_declared(name: impl Into<String>, declared: Option<&str>) -> Self {
        let (type_name, precision, scale) = declared
            .map(parse_declared_type)
            .unwrap_or_else(|| ("UNKNOWN".to_string(), 0, 0));
        Self::new(name, type_name, precision, scale)
    }

    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        SqlType::from_type_name(&self.type_name)
    }
}

/// Split a declared type into `(TYPE NAME, precision, scale)`.
///
/// Unparseable declarations are returned upper-cased with zero precision and scale.
#[must_use]
pub fn parse_declared_type(declared: &str) -> (String, u32, u32) {
    match DECLARED_TYPE.captures(declared) {
        Some(caps) => {
            let base = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
            let precision = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let scale = caps
                .get(3)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            (base.to_ascii_uppercase(), precision, scale)
        }
        None => (declared.trim().to_ascii_uppercase(), 0, 0),
    }
}
