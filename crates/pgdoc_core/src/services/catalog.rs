//! Catalog query execution.
//!
//! Runs a [`CatalogQuery`] and converts its rows into a [`CatalogTable`] of
//! typed cells. Column names come from the prepared statement, so empty
//! results still carry a header.

use std::error::Error;
use std::time::Instant;

use async_trait::async_trait;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::Row;
use tracing::debug;

use crate::error::PgDocError;
use crate::models::{CatalogQuery, CatalogTable, CellValue};
use crate::services::connection::Engine;

/// Something that can run catalog queries.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Run the query and return all rows with column names in result order.
    async fn fetch(&self, query: &CatalogQuery) -> Result<CatalogTable, PgDocError>;
}

#[async_trait]
impl CatalogSource for Engine {
    async fn fetch(&self, query: &CatalogQuery) -> Result<CatalogTable, PgDocError> {
        let catalog = query.name.as_str();
        let start = Instant::now();
        let client = self.pool().get().await.map_err(|e| {
            PgDocError::query_with_source(catalog, "Failed to acquire connection", e)
        })?;

        let run = async {
            let statement = client.prepare(&query.sql).await?;
            let rows = client.query(&statement, &[]).await?;
            Ok::<_, tokio_postgres::Error>((statement, rows))
        };

        let (statement, rows) = match self.query_timeout() {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                PgDocError::query(
                    catalog,
                    format!("Query timed out after {}s", limit.as_secs()),
                )
            })?,
            None => run.await,
        }
        .map_err(|e| PgDocError::from_postgres(catalog, e))?;

        let mut table = CatalogTable::new(statement.columns().iter().map(|c| c.name()));
        for row in &rows {
            table.push_row(decode_row(row).map_err(|e| PgDocError::from_postgres(catalog, e))?)?;
        }

        debug!(
            catalog,
            rows = table.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Catalog query complete"
        );

        Ok(table)
    }
}

/// Decode every cell of a row.
pub fn decode_row(row: &Row) -> Result<Vec<CellValue>, tokio_postgres::Error> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn decode_cell(row: &Row, idx: usize) -> Result<CellValue, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_();

    let cell: CellValue = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(i64::from).into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(CellValue::Null, |v| CellValue::Float(f64::from(v))),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(CellValue::Null, CellValue::Float),
        Type::CHAR => row
            .try_get::<_, Option<i8>>(idx)?
            .map(|c| char::from(c as u8).to_string())
            .into(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map_or(CellValue::Null, CellValue::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map_or(CellValue::Null, CellValue::TimestampTz),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map_or(CellValue::Null, CellValue::Date),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map_or(CellValue::Null, CellValue::Uuid),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map_or(CellValue::Null, CellValue::Json),
        _ if is_text(ty) => row.try_get::<_, Option<String>>(idx)?.into(),
        _ if RawText::accepts(ty) => row.try_get::<_, Option<RawText>>(idx)?.map(|t| t.0).into(),
        _ => CellValue::Unsupported(ty.name().to_string()),
    };

    Ok(cell)
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

/// Enum labels and text domains, read as their UTF-8 wire bytes.
struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawText(std::str::from_utf8(raw)?.to_owned()))
    }

    fn accepts(ty: &Type) -> bool {
        match ty.kind() {
            Kind::Enum(_) => true,
            Kind::Domain(base) => is_text(base) || Self::accepts(base),
            _ => false,
        }
    }
}
