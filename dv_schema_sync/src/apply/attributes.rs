//! SQL column type to Dataverse attribute mapping

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::remote::{AttributeKind, NewAttribute};
use crate::schema::SqlColumn;
use crate::utils::naming::{logical_name, schema_name};

pub const DEFAULT_DECIMAL_PRECISION: u32 = 18;
pub const DEFAULT_DECIMAL_SCALE: u32 = 2;
pub const DEFAULT_STRING_LENGTH: u32 = 255;
pub const MAX_STRING_LENGTH: u32 = 4000;
pub const MEMO_LENGTH: u32 = 1_048_576;

/// Base type name followed by an optional `(length)` or `(precision, scale)`
static TYPE_PATTERN: Lazy<std::result::Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<base>[a-z]+)(?:\s+[a-z]+)*\s*(?:\(\s*(?P<first>\d+)\s*(?:,\s*(?P<second>\d+)\s*)?\))?")
});

struct SqlType {
    base: String,
    first: Option<u32>,
    second: Option<u32>,
}

fn parse_type(data_type: &str) -> Result<SqlType> {
    let pattern = TYPE_PATTERN
        .as_ref()
        .map_err(|e| Error::Config(format!("Invalid type pattern: {}", e)))?;
    let lowered = data_type.to_lowercase();
    let captures = pattern
        .captures(&lowered)
        .ok_or_else(|| Error::UnsupportedType(data_type.to_string()))?;

    let number = |name: &str| captures.name(name).and_then(|m| m.as_str().parse().ok());
    Ok(SqlType {
        base: captures
            .name("base")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        first: number("first"),
        second: number("second"),
    })
}

/// Attribute kind for a SQL data type such as `varchar(120)` or `decimal(12,2)`
pub fn attribute_kind(data_type: &str) -> Result<AttributeKind> {
    let sql_type = parse_type(data_type)?;

    let kind = match sql_type.base.as_str() {
        "tinyint" if sql_type.first == Some(1) => AttributeKind::Boolean,
        "bit" | "bool" | "boolean" => AttributeKind::Boolean,
        "bigint" => AttributeKind::BigInt,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" => AttributeKind::Integer,
        "decimal" | "numeric" | "dec" | "fixed" => {
            let (precision, scale) = match (sql_type.first, sql_type.second) {
                (Some(precision), Some(scale)) => (precision, scale),
                (Some(precision), None) => (precision, 0),
                _ => (DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE),
            };
            AttributeKind::Decimal { precision, scale }
        }
        "float" | "double" | "real" => AttributeKind::Double,
        "money" => AttributeKind::Money,
        "datetime" | "timestamp" => AttributeKind::DateTime,
        "date" => AttributeKind::DateOnly,
        "text" | "tinytext" | "mediumtext" | "longtext" => AttributeKind::Memo {
            max_length: MEMO_LENGTH,
        },
        "char" | "varchar" | "nchar" | "nvarchar" => AttributeKind::String {
            max_length: sql_type
                .first
                .unwrap_or(DEFAULT_STRING_LENGTH)
                .min(MAX_STRING_LENGTH),
        },
        _ => return Err(Error::UnsupportedType(data_type.to_string())),
    };

    Ok(kind)
}

/// Attribute definition for a SQL column on an entity with customization `prefix`
pub fn new_attribute(column: &SqlColumn, prefix: &str) -> Result<NewAttribute> {
    Ok(NewAttribute {
        logical_name: logical_name(prefix, &column.name),
        schema_name: schema_name(prefix, &column.name),
        display_name: column.name.clone(),
        required: !column.nullable,
        kind: attribute_kind(&column.data_type)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("tinyint(1)", AttributeKind::Boolean)]
    #[case("BIT", AttributeKind::Boolean)]
    #[case("boolean", AttributeKind::Boolean)]
    #[case("tinyint(4)", AttributeKind::Integer)]
    #[case("int unsigned", AttributeKind::Integer)]
    #[case("bigint(20)", AttributeKind::BigInt)]
    #[case("decimal(12,2)", AttributeKind::Decimal { precision: 12, scale: 2 })]
    #[case("DECIMAL( 10 , 4 )", AttributeKind::Decimal { precision: 10, scale: 4 })]
    #[case("numeric", AttributeKind::Decimal { precision: 18, scale: 2 })]
    #[case("decimal(8)", AttributeKind::Decimal { precision: 8, scale: 0 })]
    #[case("double precision", AttributeKind::Double)]
    #[case("float", AttributeKind::Double)]
    #[case("money", AttributeKind::Money)]
    #[case("datetime(6)", AttributeKind::DateTime)]
    #[case("timestamp", AttributeKind::DateTime)]
    #[case("date", AttributeKind::DateOnly)]
    #[case("longtext", AttributeKind::Memo { max_length: MEMO_LENGTH })]
    #[case("varchar(120)", AttributeKind::String { max_length: 120 })]
    #[case("varchar(10000)", AttributeKind::String { max_length: MAX_STRING_LENGTH })]
    #[case("char", AttributeKind::String { max_length: DEFAULT_STRING_LENGTH })]
    fn maps_sql_types(#[case] data_type: &str, #[case] expected: AttributeKind) {
        assert_eq!(attribute_kind(data_type).unwrap(), expected);
    }

    #[rstest]
    #[case("json")]
    #[case("blob")]
    #[case("enum('a','b')")]
    #[case("point")]
    fn rejects_unsupported_types(#[case] data_type: &str) {
        let err = attribute_kind(data_type).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(ref t) if t == data_type));
    }

    #[test]
    fn builds_prefixed_names() {
        let column = SqlColumn::new("Due_Date", "date").nullable(false);
        let attribute = new_attribute(&column, "cr8a1").unwrap();
        assert_eq!(attribute.logical_name, "cr8a1_duedate");
        assert_eq!(attribute.schema_name, "cr8a1_DueDate");
        assert_eq!(attribute.display_name, "Due_Date");
        assert!(attribute.required);
        assert_eq!(attribute.kind, AttributeKind::DateOnly);
    }
}
