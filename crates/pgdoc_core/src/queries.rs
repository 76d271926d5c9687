//! Built-in PostgreSQL introspection queries.
//!
//! Every query is read-only, parameter-free, and sorted so that rows for the
//! same schema (and table) arrive consecutively.

use crate::models::{CatalogName, CatalogQuery, CatalogSet};

/// Schemas with their owners and object counts.
pub const SCHEMA_CATALOG: &str = "schema_catalog";
/// Tables per schema.
pub const TABLE_CATALOG: &str = "table_catalog";
/// Views and materialized views with their definitions.
pub const VIEW_CATALOG: &str = "view_catalog";
/// User functions and procedures with their definitions.
pub const FUNCTION_CATALOG: &str = "function_catalog";
/// Columns of every table, grouped by table.
pub const COLUMN_CATALOG: &str = "column_catalog";

// Excludes system, temporary and TOAST schemas
const SCHEMA_SQL: &str = r#"
select
    n.nspname as schema_name,
    r.rolname as owner,
    count(distinct t.tablename) as table_count,
    count(distinct v.viewname) as view_count,
    count(distinct p.proname) as function_count
from pg_catalog.pg_namespace n
left join pg_catalog.pg_roles r
    on n.nspowner = r.oid
left join pg_catalog.pg_tables t
    on t.schemaname = n.nspname
left join pg_catalog.pg_views v
    on v.schemaname = n.nspname
left join pg_catalog.pg_proc p
    on p.pronamespace = n.oid
where
    n.nspname not in ('pg_catalog', 'information_schema')
    and n.nspname !~ '^pg_temp'
    and n.nspname !~ '^pg_toast'
group by n.nspname, r.rolname
order by n.nspname
"#;

const TABLE_SQL: &str = r#"
select
    schemaname as schema,
    tablename as table_name,
    tableowner as owner,
    hasindexes as has_indexes,
    hasrules as has_rules,
    hastriggers as has_triggers
from pg_catalog.pg_tables
where schemaname not in ('pg_catalog', 'information_schema')
order by schemaname, tablename
"#;

// pg_views does not list materialized views, so union them in from pg_matviews
const VIEW_SQL: &str = r#"
select schema, view_name, owner, view_type, definition
from (
    select
        v.schemaname as schema,
        v.viewname as view_name,
        v.viewowner as owner,
        'View' as view_type,
        v.definition
    from pg_catalog.pg_views v
    where v.schemaname not in ('pg_catalog', 'information_schema')
    union all
    select
        m.schemaname as schema,
        m.matviewname as view_name,
        m.matviewowner as owner,
        'Materialized View' as view_type,
        m.definition
    from pg_catalog.pg_matviews m
    where m.schemaname not in ('pg_catalog', 'information_schema')
) views
order by schema, view_name
"#;

// Aggregates have no function body; extension-owned functions are skipped
const FUNCTION_SQL: &str = r#"
select
    n.nspname as schema,
    p.proname as function_name,
    r.rolname as owner,
    case p.prokind
        when 'f' then 'function'
        when 'p' then 'procedure'
        when 'a' then 'aggregate'
        when 'w' then 'window'
    end as function_type,
    pg_get_function_arguments(p.oid) as arguments,
    pg_get_function_result(p.oid) as return_type,
    case
        when p.prokind = 'a' then null
        else pg_get_functiondef(p.oid)
    end as definition
from pg_catalog.pg_proc p
join pg_catalog.pg_namespace n
    on p.pronamespace = n.oid
join pg_catalog.pg_roles r
    on p.proowner = r.oid
left join pg_catalog.pg_extension e
    on p.pronamespace = e.extnamespace
where
    n.nspname not in ('pg_catalog', 'information_schema')
    and e.extname is null
order by n.nspname, p.proname
"#;

const COLUMN_SQL: &str = r#"
select
    t.schemaname as schema,
    t.tablename as table_name,
    t.tableowner as owner,
    c.column_name::text as column_name,
    c.data_type::text as data_type,
    c.is_nullable::text as is_nullable,
    c.column_default::text as column_default,
    c.ordinal_position::int as ordinal_position
from pg_catalog.pg_tables t
join information_schema.columns c
    on t.schemaname = c.table_schema
    and t.tablename = c.table_name
where t.schemaname not in ('pg_catalog', 'information_schema')
order by
    t.schemaname,
    t.tablename,
    c.ordinal_position
"#;

fn builtin(name: &str, sql: &str) -> CatalogQuery {
    // built-in names are snake_case literals
    let name = CatalogName::new(name).unwrap_or_else(|e| unreachable!("{e}"));
    CatalogQuery::new(name, sql.trim())
}

/// The four fixed catalogs in documentation order.
pub fn postgres_catalogs() -> CatalogSet {
    let mut set = CatalogSet::new();
    for (name, sql) in [
        (SCHEMA_CATALOG, SCHEMA_SQL),
        (TABLE_CATALOG, TABLE_SQL),
        (VIEW_CATALOG, VIEW_SQL),
        (FUNCTION_CATALOG, FUNCTION_SQL),
    ] {
        if let Err(e) = set.push(builtin(name, sql)) {
            unreachable!("built-in catalogs are distinct: {e}");
        }
    }
    set
}

/// Column listing grouped under `## schema.table` headings with the table owner.
pub fn column_catalog() -> CatalogQuery {
    builtin(COLUMN_CATALOG, COLUMN_SQL)
        .grouped_by(["schema", "table_name"])
        .with_group_details(["owner"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_are_read_only_and_sorted() {
        let mut set = postgres_catalogs();
        set.push(column_catalog()).unwrap();
        for query in set.iter() {
            let sql = query.sql.to_lowercase();
            assert!(sql.starts_with("select"), "{} is not a select", query.name);
            assert!(sql.contains("order by"), "{} is unsorted", query.name);
            assert!(!sql.contains('$'), "{} takes parameters", query.name);
        }
    }

    #[test]
    fn test_schema_catalog_columns() {
        let set = postgres_catalogs();
        let sql = &set.get(SCHEMA_CATALOG).unwrap().sql;
        for column in ["schema_name", "owner", "table_count", "view_count", "function_count"] {
            assert!(sql.contains(&format!("as {column}")));
        }
    }
}
