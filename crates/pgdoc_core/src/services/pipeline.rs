//! The documentation run: query, render and write each catalog in order.

use std::path::PathBuf;

use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::PgDocError;
use crate::models::{CatalogQuery, CatalogSet};
use crate::services::catalog::CatalogSource;
use crate::services::markdown;
use crate::services::writer::DocumentWriter;

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files written, catalogs first and `Home.md` last.
    pub written: Vec<PathBuf>,
    /// Rows fetched across all catalogs.
    pub total_rows: usize,
}

/// Runs every catalog in a set through fetch, render and write.
///
/// Catalogs are processed one at a time in set order. The first failure
/// aborts the run; documents already written are left in place and the home
/// page is only written once every catalog has succeeded.
pub struct CatalogPipeline;

impl CatalogPipeline {
    pub async fn run<S>(
        source: &S,
        catalogs: &CatalogSet,
        writer: &DocumentWriter,
    ) -> Result<RunSummary, PgDocError>
    where
        S: CatalogSource + ?Sized,
    {
        let span = info_span!(
            "catalog_run",
            run_id = %Uuid::new_v4(),
            output_dir = %writer.directory().display()
        );

        async {
            info!(catalogs = catalogs.len(), "Starting catalog run");
            let mut summary = RunSummary::default();

            for query in catalogs.iter() {
                let (path, rows) = Self::process(source, query, writer)
                    .instrument(info_span!("catalog", catalog = %query.name))
                    .await?;
                summary.written.push(path);
                summary.total_rows += rows;
            }

            let home = markdown::render_home(catalogs.names());
            let path = writer.write(&home).await.inspect_err(|e| {
                error!(document = %home.name, error = %e, "Failed to write home page");
            })?;
            summary.written.push(path);

            info!(
                documents = summary.written.len(),
                total_rows = summary.total_rows,
                "Catalog run complete"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn process<S>(
        source: &S,
        query: &CatalogQuery,
        writer: &DocumentWriter,
    ) -> Result<(PathBuf, usize), PgDocError>
    where
        S: CatalogSource + ?Sized,
    {
        let result: Result<(PathBuf, usize), PgDocError> = async {
            let table = source.fetch(query).await?;
            let document = markdown::render_query_result(&table, query)?;
            let path = writer.write(&document).await?;
            Ok((path, table.row_count()))
        }
        .await;

        match &result {
            Ok((path, rows)) => info!(rows, path = %path.display(), "Catalog documented"),
            Err(e) => error!(
                category = e.category(),
                error = %e,
                "Catalog failed, aborting run"
            ),
        }
        result
    }
}
