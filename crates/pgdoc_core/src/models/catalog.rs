//! Catalog query and result-set models.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PgDocError;

/// A validated snake_case catalog identifier (e.g. `schema_catalog`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CatalogName(String);

impl CatalogName {
    /// Validate and wrap a catalog name.
    pub fn new(name: impl Into<String>) -> Result<Self, PgDocError> {
        let name = name.into();
        let mut chars = name.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
        let valid_chars =
            name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !starts_with_letter
            || !valid_chars
            || name.ends_with('_')
            || name.contains("__")
        {
            return Err(PgDocError::config(format!(
                "Invalid catalog name '{name}': expected snake_case like 'table_catalog'"
            )));
        }
        Ok(Self(name))
    }

    /// The raw name, also used as the link target.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display title (`table_catalog` -> `Table Catalog`).
    pub fn title(&self) -> String {
        crate::services::markdown::title_case(&self.0)
    }

    /// Output file name (`<name>.md`).
    pub fn file_name(&self) -> String {
        format!("{}.md", self.0)
    }
}

impl fmt::Display for CatalogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CatalogName {
    type Error = PgDocError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CatalogName> for String {
    fn from(name: CatalogName) -> Self {
        name.0
    }
}

/// How a catalog's rows are laid out in its document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Layout {
    /// One table with every row.
    #[default]
    Flat,
    /// A heading and table per run of rows sharing the key columns.
    Grouped {
        /// Columns whose values form the group heading
        keys: Vec<String>,
        /// Columns shown once per group as `**Name:** value` lines
        details: Vec<String>,
    },
}

/// A named introspection query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Catalog name
    pub name: CatalogName,
    /// Parameter-free SQL text
    pub sql: String,
    /// Document layout
    pub layout: Layout,
}

impl CatalogQuery {
    /// Create a flat-layout catalog query.
    pub fn new(name: CatalogName, sql: impl Into<String>) -> Self {
        Self { name, sql: sql.into(), layout: Layout::Flat }
    }

    /// Group rows under headings built from `keys`.
    pub fn grouped_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layout = Layout::Grouped {
            keys: keys.into_iter().map(Into::into).collect(),
            details: Vec::new(),
        };
        self
    }

    /// Show these columns once under each group heading.
    ///
    /// Has no effect on a flat layout.
    pub fn with_group_details<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Layout::Grouped { details, .. } = &mut self.layout {
            details.extend(columns.into_iter().map(Into::into));
        }
        self
    }
}

/// Ordered, duplicate-free set of catalog queries.
///
/// Insertion order is documentation order.
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    queries: Vec<CatalogQuery>,
}

impl CatalogSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The four fixed PostgreSQL catalogs.
    pub fn postgres_default() -> Self {
        crate::queries::postgres_catalogs()
    }

    /// Append the per-table column catalog.
    pub fn with_column_details(mut self) -> Self {
        // the built-in name can't collide unless a caller already added it
        if !self.contains(crate::queries::COLUMN_CATALOG) {
            self.queries.push(crate::queries::column_catalog());
        }
        self
    }

    /// Append a query, rejecting duplicate names.
    pub fn push(&mut self, query: CatalogQuery) -> Result<(), PgDocError> {
        if self.contains(query.name.as_str()) {
            return Err(PgDocError::config(format!("Duplicate catalog name '{}'", query.name)));
        }
        self.queries.push(query);
        Ok(())
    }

    /// Check whether a catalog with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.queries.iter().any(|q| q.name.as_str() == name)
    }

    /// Look up a query by name.
    pub fn get(&self, name: &str) -> Option<&CatalogQuery> {
        self.queries.iter().find(|q| q.name.as_str() == name)
    }

    /// Iterate in documentation order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogQuery> {
        self.queries.iter()
    }

    /// Catalog names in documentation order.
    pub fn names(&self) -> Vec<&CatalogName> {
        self.queries.iter().map(|q| &q.name).collect()
    }

    /// Number of catalogs.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl TryFrom<Vec<CatalogQuery>> for CatalogSet {
    type Error = PgDocError;

    fn try_from(queries: Vec<CatalogQuery>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for query in queries {
            set.push(query)?;
        }
        Ok(set)
    }
}

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellValue {
    /// SQL NULL
    Null,
    /// boolean
    Bool(bool),
    /// int2 / int4 / int8 / oid
    Int(i64),
    /// float4 / float8
    Float(f64),
    /// text-like types, including domains over text
    Text(String),
    /// timestamp without time zone
    Timestamp(NaiveDateTime),
    /// timestamp with time zone
    TimestampTz(DateTime<Utc>),
    /// date
    Date(NaiveDate),
    /// uuid
    Uuid(Uuid),
    /// json / jsonb
    Json(serde_json::Value),
    /// A type the decoder does not handle; carries the type name.
    Unsupported(String),
}

impl CellValue {
    /// Check if the cell is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::TimestampTz(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
            Self::Unsupported(type_name) => write!(f, "<{type_name}>"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Rectangular result of one catalog query.
///
/// Row order is the database's result order; rendering relies on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl CatalogTable {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Append a row. Its width must match the column count.
    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<(), PgDocError> {
        if row.len() != self.columns.len() {
            return Err(PgDocError::internal(format!(
                "Row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder-style row append for literals in tests and fixtures.
    pub fn with_row<I, V>(mut self, row: I) -> Result<Self, PgDocError>
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        self.push_row(row.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in result order.
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Index of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_name_validation() {
        assert!(CatalogName::new("schema_catalog").is_ok());
        assert!(CatalogName::new("catalog2").is_ok());
        assert!(CatalogName::new("").is_err());
        assert!(CatalogName::new("Schema").is_err());
        assert!(CatalogName::new("_hidden").is_err());
        assert!(CatalogName::new("trailing_").is_err());
        assert!(CatalogName::new("double__underscore").is_err());
        assert!(CatalogName::new("has space").is_err());
        assert!(CatalogName::new("../escape").is_err());
    }

    #[test]
    fn test_catalog_name_title_and_file() {
        let name = CatalogName::new("function_catalog").unwrap();
        assert_eq!(name.title(), "Function Catalog");
        assert_eq!(name.file_name(), "function_catalog.md");
        assert_eq!(name.to_string(), "function_catalog");
    }

    #[test]
    fn test_catalog_set_rejects_duplicates() {
        let name = CatalogName::new("table_catalog").unwrap();
        let mut set = CatalogSet::new();
        set.push(CatalogQuery::new(name.clone(), "select 1")).unwrap();
        let err = set.push(CatalogQuery::new(name, "select 2")).unwrap_err();
        assert!(matches!(err, PgDocError::Config { .. }));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_default_set_order() {
        let set = CatalogSet::postgres_default();
        let names: Vec<&str> = set.names().into_iter().map(CatalogName::as_str).collect();
        assert_eq!(names, ["schema_catalog", "table_catalog", "view_catalog", "function_catalog"]);
        assert!(set.iter().all(|q| q.layout == Layout::Flat));
    }

    #[test]
    fn test_with_column_details_is_idempotent() {
        let set = CatalogSet::postgres_default().with_column_details().with_column_details();
        assert_eq!(set.len(), 5);
        let columns = set.get("column_catalog").unwrap();
        assert!(matches!(columns.layout, Layout::Grouped { .. }));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Null.to_string(), "");
        assert_eq!(CellValue::Bool(true).to_string(), "true");
        assert_eq!(CellValue::Int(42).to_string(), "42");
        assert_eq!(CellValue::from("public").to_string(), "public");
        assert_eq!(CellValue::Unsupported("numeric".into()).to_string(), "<numeric>");
        assert_eq!(CellValue::from(None::<String>), CellValue::Null);
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = CatalogTable::new(["schema", "table_name"]);
        assert!(table.push_row(vec![CellValue::from("public")]).is_err());
        assert!(table.push_row(vec!["public".into(), "orders".into()]).is_ok());
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column_index("table_name"), Some(1));
    }
}
