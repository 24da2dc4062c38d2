// crates/entitycore-store-postgres/src/value.rs
// ============================================================================
// Module: Postgres Values
// Description: Wire encoding of bound values and decoding of result rows.
// Purpose: Let the dialect-neutral query layer run on the postgres driver.
// Dependencies: bytes, entitycore-query, postgres, postgres-types
// ============================================================================

//! ## Overview
//! Placeholders are typed by the server from their context, so one
//! [`SqlValue::Int`] may have to travel as `int2`, `int4`, or `int8`.
//! [`PgValue`] accepts every parameter type and encodes by the type the
//! server asked for.

use std::error::Error;

use bytes::BytesMut;
use entitycore_core::StoreError;
use entitycore_query::Row;
use entitycore_query::SqlValue;
use postgres_types::IsNull;
use postgres_types::ToSql;
use postgres_types::Type;
use postgres_types::to_sql_checked;

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Borrowed [`SqlValue`] encoded for the server-inferred parameter type.
#[derive(Debug, Clone, Copy)]
pub struct PgValue<'a>(pub &'a SqlValue);

/// Returns true for the text-like types a value may be sent as.
fn is_text(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

impl ToSql for PgValue<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => value.to_sql(ty, out),
            SqlValue::Int(value) => match *ty {
                Type::INT2 => i16::try_from(*value)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*value)?.to_sql(ty, out),
                ref text if is_text(text) => value.to_string().to_sql(ty, out),
                _ => value.to_sql(ty, out),
            },
            SqlValue::Text(value) => value.as_str().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Converts a driver row into a query-layer [`Row`].
///
/// # Errors
///
/// Returns [`StoreError::Db`] for column types outside booleans, integers,
/// and text.
pub fn decode_row(row: &postgres::Row) -> Result<Row, StoreError> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let failed = |err: postgres::Error| StoreError::Db(format!("column {name}: {err}"));
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(index).map_err(failed)?.map(SqlValue::Bool)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(index)
                .map_err(failed)?
                .map(|value| SqlValue::Int(i64::from(value)))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(index)
                .map_err(failed)?
                .map(|value| SqlValue::Int(i64::from(value)))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(index).map_err(failed)?.map(SqlValue::Int)
        } else if is_text(ty) {
            row.try_get::<_, Option<String>>(index).map_err(failed)?.map(SqlValue::Text)
        } else {
            return Err(StoreError::Db(format!("column {name} has unsupported type {ty}")));
        };
        columns.push((name.to_string(), value.unwrap_or(SqlValue::Null)));
    }
    Ok(Row::new(columns))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    fn encode(
        value: &SqlValue,
        ty: &Type,
    ) -> Result<(IsNull, Vec<u8>), Box<dyn Error + Sync + Send>> {
        let mut out = BytesMut::new();
        let is_null = PgValue(value).to_sql_checked(ty, &mut out)?;
        Ok((is_null, out.to_vec()))
    }

    #[test]
    fn integers_follow_the_requested_width() {
        let value = SqlValue::Int(7);
        assert_eq!(encode(&value, &Type::INT2).unwrap().1, 7_i16.to_be_bytes().to_vec());
        assert_eq!(encode(&value, &Type::INT4).unwrap().1, 7_i32.to_be_bytes().to_vec());
        assert_eq!(encode(&value, &Type::INT8).unwrap().1, 7_i64.to_be_bytes().to_vec());
        assert_eq!(encode(&value, &Type::TEXT).unwrap().1, b"7".to_vec());
    }

    #[test]
    fn narrowing_overflow_is_an_error() {
        assert!(encode(&SqlValue::Int(i64::from(i32::MAX) + 1), &Type::INT4).is_err());
        assert!(encode(&SqlValue::Int(70_000), &Type::INT2).is_err());
    }

    #[test]
    fn nulls_and_text_encode() {
        assert!(matches!(encode(&SqlValue::Null, &Type::INT8).unwrap().0, IsNull::Yes));
        assert_eq!(encode(&SqlValue::from("p1"), &Type::TEXT).unwrap().1, b"p1".to_vec());
        assert_eq!(encode(&SqlValue::Bool(true), &Type::BOOL).unwrap().1, vec![1]);
    }
}
