//! Markdown rendering of catalog result sets.
//!
//! Rendering is purely driven by the table's row order; nothing here sorts.
//! Grouped layouts start a new section whenever the key values change between
//! consecutive rows, so unsorted input shows repeated headings.

use crate::error::PgDocError;
use crate::models::{
    CatalogName, CatalogQuery, CatalogTable, CellValue, Document, Layout, HOME_DOCUMENT,
};

/// Column whose values hold multi-line SQL source.
const DEFINITION_COLUMN: &str = "definition";

const HOME_PREAMBLE: &str = "# Data Catalog Documentation

Welcome to the Data Catalog! This wiki contains automatically generated documentation about our data warehouse objects.

## Available Documentation

";

const HOME_FOOTER: &str = "
## Documentation Updates
This documentation is automatically generated and updated whenever changes are pushed to the main branch.
";

/// Title-case each `_`-separated word and join with spaces.
///
/// Within a word, a letter is uppercased when it follows a non-letter and
/// lowercased otherwise, so `has_indexes` becomes `Has Indexes` and applying
/// the function twice gives the same result.
pub fn title_case(text: &str) -> String {
    text.split('_').map(title_word).collect::<Vec<_>>().join(" ")
}

fn title_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_is_letter = false;
    for c in word.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Escape a SQL definition for a single table cell.
///
/// Newlines become `<br>`, pipes become `\|`, and the whole value is wrapped
/// in `<pre>`.
pub fn escape_definition(value: &str) -> String {
    let escaped = value
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>")
        .replace('|', "\\|");
    format!("<pre>{escaped}</pre>")
}

/// Render the index page linking every catalog in order.
pub fn render_home<'a, I>(catalog_names: I) -> Document
where
    I: IntoIterator<Item = &'a CatalogName>,
{
    let mut body = String::from(HOME_PREAMBLE);
    for name in catalog_names {
        body.push_str(&format!("* [{}]({})\n", name.title(), name.as_str()));
    }
    body.push_str(HOME_FOOTER);
    Document::new(HOME_DOCUMENT, body)
}

/// Render a catalog as a single Markdown table.
pub fn render_catalog(table: &CatalogTable, catalog: &CatalogName) -> Document {
    let mut body = format!("# {}\n\n", catalog.title());
    let all: Vec<usize> = (0..table.columns().len()).collect();
    write_table(&mut body, table, &all, table.rows().iter());
    Document::new(catalog.as_str(), body)
}

/// Render a catalog using its configured layout.
pub fn render_query_result(
    table: &CatalogTable,
    query: &CatalogQuery,
) -> Result<Document, PgDocError> {
    match &query.layout {
        Layout::Flat => Ok(render_catalog(table, &query.name)),
        Layout::Grouped { keys, details } => {
            render_grouped_catalog(table, &query.name, keys, details)
        }
    }
}

/// Render a catalog with one `##` section per run of rows sharing `keys`.
///
/// `details` columns are printed once per section as `**Title:** value`;
/// neither key nor detail columns appear in the section tables.
pub fn render_grouped_catalog(
    table: &CatalogTable,
    catalog: &CatalogName,
    keys: &[String],
    details: &[String],
) -> Result<Document, PgDocError> {
    if keys.is_empty() {
        return Err(PgDocError::render(catalog.as_str(), "Grouped layout needs at least one key"));
    }
    let key_idx = resolve_columns(table, catalog, keys)?;
    let detail_idx = resolve_columns(table, catalog, details)?;
    let body_idx: Vec<usize> = (0..table.columns().len())
        .filter(|i| !key_idx.contains(i) && !detail_idx.contains(i))
        .collect();

    let mut body = format!("# {}\n", catalog.title());

    let rows = table.rows();
    let mut start = 0;
    while start < rows.len() {
        let group_key = pick(&rows[start], &key_idx);
        let end = rows[start..]
            .iter()
            .position(|row| pick(row, &key_idx) != group_key)
            .map_or(rows.len(), |offset| start + offset);

        let heading: Vec<String> = group_key.iter().map(|v| v.to_string()).collect();
        body.push_str(&format!("\n## {}\n\n", heading.join(".")));
        for &i in &detail_idx {
            body.push_str(&format!(
                "**{}:** {}\n\n",
                title_case(&table.columns()[i]),
                rows[start][i]
            ));
        }
        write_table(&mut body, table, &body_idx, rows[start..end].iter());
        start = end;
    }

    Ok(Document::new(catalog.as_str(), body))
}

fn resolve_columns(
    table: &CatalogTable,
    catalog: &CatalogName,
    names: &[String],
) -> Result<Vec<usize>, PgDocError> {
    names
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                PgDocError::render(
                    catalog.as_str(),
                    format!("Expected column '{name}' is missing from the result"),
                )
            })
        })
        .collect()
}

fn pick<'a>(row: &'a [CellValue], indices: &[usize]) -> Vec<&'a CellValue> {
    indices.iter().map(|&i| &row[i]).collect()
}

/// Header row, separator row, then one line per row, restricted to `columns`.
fn write_table<'a>(
    out: &mut String,
    table: &CatalogTable,
    columns: &[usize],
    rows: impl Iterator<Item = &'a Vec<CellValue>>,
) {
    let names: Vec<&str> = columns.iter().map(|&i| table.columns()[i].as_str()).collect();
    let header: Vec<String> = names.iter().map(|name| title_case(name)).collect();
    // dash runs follow the raw column name length; cosmetic only
    let separator: Vec<String> = names.iter().map(|name| "-".repeat(name.len())).collect();

    out.push_str(&table_line(&header, " | "));
    out.push_str(&table_line(&separator, "|"));

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|&i| render_cell(&table.columns()[i], &row[i]))
            .collect();
        out.push_str(&table_line(&cells, " | "));
    }
}

fn table_line(cells: &[String], separator: &str) -> String {
    format!("| {} |\n", cells.join(separator))
}

fn render_cell(column: &str, value: &CellValue) -> String {
    if column.eq_ignore_ascii_case(DEFINITION_COLUMN) {
        escape_definition(&value.to_string())
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> CatalogName {
        CatalogName::new(s).unwrap()
    }

    fn table_lines(body: &str) -> Vec<&str> {
        body.lines().filter(|l| l.starts_with('|')).collect()
    }

    fn table_catalog() -> CatalogTable {
        CatalogTable::new(["schema", "table_name", "owner", "has_indexes", "has_triggers"])
            .with_row([
                CellValue::from("public"),
                "orders".into(),
                "postgres".into(),
                true.into(),
                false.into(),
            ])
            .unwrap()
            .with_row([
                CellValue::from("public"),
                "users".into(),
                "postgres".into(),
                true.into(),
                false.into(),
            ])
            .unwrap()
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("table_catalog"), "Table Catalog");
        assert_eq!(title_case("has_indexes"), "Has Indexes");
        assert_eq!(title_case("schema"), "Schema");
        assert_eq!(title_case("pg_stat2x"), "Pg Stat2X");
        assert_eq!(title_case("ALL_CAPS"), "All Caps");
    }

    #[test]
    fn test_title_case_is_idempotent() {
        for input in ["schema_catalog", "function_catalog", "a_b_c", "view2_catalog", "x"] {
            let once = title_case(input);
            assert_eq!(title_case(&once), once, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_render_table_catalog_scenario() {
        let doc = render_catalog(&table_catalog(), &name("table_catalog"));
        assert_eq!(doc.name, "table_catalog");
        assert_eq!(doc.file_name(), "table_catalog.md");
        assert!(doc.body.starts_with("# Table Catalog\n\n"));

        let lines = table_lines(&doc.body);
        assert_eq!(lines[0], "| Schema | Table Name | Owner | Has Indexes | Has Triggers |");
        assert_eq!(lines[1], "| ------|----------|-----|-----------|------------ |");
        assert_eq!(lines[2], "| public | orders | postgres | true | false |");
        assert_eq!(lines[3], "| public | users | postgres | true | false |");
    }

    #[test]
    fn test_table_line_format() {
        let cells = vec!["Schema".to_string(), "Owner".to_string()];
        assert_eq!(table_line(&cells, " | "), "| Schema | Owner |\n");
        assert_eq!(table_line(&["--".to_string(), "---".to_string()], "|"), "| --|--- |\n");
    }

    #[test]
    fn test_table_line_count_is_rows_plus_two() {
        let mut table = CatalogTable::new(["schema_name", "owner"]);
        for i in 0..7 {
            table.push_row(vec![format!("s{i}").into(), "postgres".into()]).unwrap();
        }
        let doc = render_catalog(&table, &name("schema_catalog"));
        assert_eq!(table_lines(&doc.body).len(), table.row_count() + 2);
    }

    #[test]
    fn test_definition_escaping() {
        assert_eq!(escape_definition("select 1 | 2\nselect 3"), "<pre>select 1 \\| 2<br>select 3</pre>");
        assert_eq!(escape_definition("a\r\nb\rc"), "<pre>a<br>b<br>c</pre>");
    }

    #[test]
    fn test_definition_cell_has_no_raw_newlines_or_pipes() {
        let table = CatalogTable::new(["view_name", "Definition"])
            .with_row(["v_orders", " SELECT a || b\n   FROM t\n  WHERE x | y;"])
            .unwrap();
        let doc = render_catalog(&table, &name("view_catalog"));
        let lines = table_lines(&doc.body);
        assert_eq!(lines.len(), 3);

        let row = lines[2];
        let cell = row.split(" | ").nth(1).unwrap().trim_end_matches(" |");
        assert!(!cell.contains('\n'));
        let unescaped = cell.match_indices('|').filter(|(i, _)| !cell[..*i].ends_with('\\')).count();
        assert_eq!(unescaped, 0, "unescaped pipe in {cell}");
        assert!(cell.starts_with("<pre>") && cell.ends_with("</pre>"));
    }

    #[test]
    fn test_null_definition_renders_empty_block() {
        let table = CatalogTable::new(["function_name", "definition"])
            .with_row([CellValue::from("sum_agg"), CellValue::Null])
            .unwrap();
        let doc = render_catalog(&table, &name("function_catalog"));
        assert!(doc.body.contains("| sum_agg | <pre></pre> |"));
    }

    #[test]
    fn test_null_plain_cell_renders_empty() {
        let table = CatalogTable::new(["column_name", "column_default"])
            .with_row([CellValue::from("id"), CellValue::Null])
            .unwrap();
        let doc = render_catalog(&table, &name("column_catalog"));
        assert!(doc.body.contains("| id |  |"));
    }

    #[test]
    fn test_render_home_links_in_order() {
        let names = [name("schema_catalog"), name("table_catalog"), name("view_catalog")];
        let doc = render_home(&names);
        assert_eq!(doc.name, "Home");
        assert!(doc.is_home());

        let links: Vec<&str> = doc.body.lines().filter(|l| l.starts_with("* [")).collect();
        assert_eq!(
            links,
            [
                "* [Schema Catalog](schema_catalog)",
                "* [Table Catalog](table_catalog)",
                "* [View Catalog](view_catalog)",
            ]
        );
        assert!(doc.body.starts_with("# Data Catalog Documentation"));
        assert!(doc.body.contains("## Documentation Updates"));
    }

    #[test]
    fn test_render_home_empty() {
        let doc = render_home(std::iter::empty());
        assert_eq!(doc.body.lines().filter(|l| l.starts_with("* [")).count(), 0);
    }

    fn column_table(rows: &[(&str, &str, &str)]) -> CatalogTable {
        let mut table = CatalogTable::new(["schema", "table_name", "owner", "column_name"]);
        for (schema, table_name, column) in rows {
            table
                .push_row(vec![
                    (*schema).into(),
                    (*table_name).into(),
                    "postgres".into(),
                    (*column).into(),
                ])
                .unwrap();
        }
        table
    }

    #[test]
    fn test_grouped_layout_sections() {
        let table = column_table(&[
            ("public", "orders", "id"),
            ("public", "orders", "total"),
            ("public", "users", "id"),
        ]);
        let keys = vec!["schema".to_string(), "table_name".to_string()];
        let details = vec!["owner".to_string()];
        let doc = render_grouped_catalog(&table, &name("column_catalog"), &keys, &details).unwrap();

        let headings: Vec<&str> = doc.body.lines().filter(|l| l.starts_with("## ")).collect();
        assert_eq!(headings, ["## public.orders", "## public.users"]);
        assert_eq!(doc.body.matches("**Owner:** postgres").count(), 2);
        assert_eq!(doc.body.matches("| Column Name |").count(), 2);
        // 2 sections * (header + separator) + 3 rows
        assert_eq!(table_lines(&doc.body).len(), 7);
        assert!(!doc.body.contains("| public |"));
    }

    #[test]
    fn test_grouped_layout_follows_input_order() {
        let table = column_table(&[
            ("public", "orders", "id"),
            ("public", "users", "id"),
            ("public", "orders", "total"),
        ]);
        let keys = vec!["schema".to_string(), "table_name".to_string()];
        let doc = render_grouped_catalog(&table, &name("column_catalog"), &keys, &[]).unwrap();
        let headings: Vec<&str> = doc.body.lines().filter(|l| l.starts_with("## ")).collect();
        assert_eq!(headings, ["## public.orders", "## public.users", "## public.orders"]);
    }

    #[test]
    fn test_grouped_layout_missing_key_is_render_error() {
        let table = column_table(&[("public", "orders", "id")]);
        let keys = vec!["table_schema".to_string()];
        let err = render_grouped_catalog(&table, &name("column_catalog"), &keys, &[]).unwrap_err();
        assert!(matches!(err, PgDocError::Render { .. }));
        assert_eq!(err.catalog(), Some("column_catalog"));
        assert!(err.to_string().contains("table_schema"));
    }

    #[test]
    fn test_render_query_result_dispatches_on_layout() {
        let flat = CatalogQuery::new(name("table_catalog"), "select 1");
        let doc = render_query_result(&table_catalog(), &flat).unwrap();
        assert_eq!(table_lines(&doc.body).len(), 4);

        let grouped = flat.grouped_by(["schema"]);
        let doc = render_query_result(&table_catalog(), &grouped).unwrap();
        assert!(doc.body.contains("## public"));
    }
}
