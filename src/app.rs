use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::airr::Cell;
use crate::container::{AirrContainer, ContainerSummary, DatabaseMetadata};
use crate::domain::Source;
use crate::error::KiraError;
use crate::iedb::{self, IedbClient};
use crate::store::Store;
use crate::table::SourceTable;
use crate::vdjdb::{self, VdjdbClient};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub cached: bool,
    pub cache_path: Option<Utf8PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            cached: true,
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadAction {
    Cache,
    Download,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub source: Source,
    pub action: LoadAction,
    pub cache_path: String,
    pub summary: ContainerSummary,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<V: VdjdbClient, I: IedbClient> {
    store: Store,
    vdjdb: V,
    iedb: I,
}

impl<V: VdjdbClient, I: IedbClient> App<V, I> {
    pub fn new(store: Store, vdjdb: V, iedb: I) -> Self {
        Self { store, vdjdb, iedb }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn load(
        &self,
        source: Source,
        options: &LoadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<(AirrContainer, LoadAction), KiraError> {
        let cache_path = self.resolve_cache_path(source, options);

        if options.cached {
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; reading cache {cache_path}"),
                elapsed: None,
            });
            if let Some(container) = Store::read_container(&cache_path) {
                tracing::info!(%source, path = %cache_path, "using cached container");
                return Ok((container, LoadAction::Cache));
            }
        }

        tracing::info!(%source, "downloading latest version of {}", source.db_name());
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {}.request", source),
            elapsed: None,
        });
        let start = Instant::now();
        let table = match source {
            Source::Vdjdb => self.vdjdb.fetch_table()?,
            Source::Iedb => self.iedb.fetch_table()?,
        };
        sink.event(ProgressEvent {
            message: format!("{}.response rows={}", source, table.len()),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: format!("phase=Normalize; processing {} entries", source.db_name()),
            elapsed: None,
        });
        let start = Instant::now();
        let cells = normalize_table(source, table)?;
        sink.event(ProgressEvent {
            message: format!("normalized cells={}", cells.len()),
            elapsed: Some(start.elapsed()),
        });

        tracing::info!("converting to container");
        let mut container =
            AirrContainer::from_cells(cells).with_metadata(DatabaseMetadata::now(source));
        container.index_chains();

        sink.event(ProgressEvent {
            message: format!("phase=Store; writing {cache_path}"),
            elapsed: None,
        });
        Store::write_container(&cache_path, &container)?;

        Ok((container, LoadAction::Download))
    }

    pub fn load_summary(
        &self,
        source: Source,
        options: &LoadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<LoadResult, KiraError> {
        let (container, action) = self.load(source, options, sink)?;
        Ok(LoadResult {
            source,
            action,
            cache_path: self.resolve_cache_path(source, options).to_string(),
            summary: container.summary(),
        })
    }

    pub fn info(&self, source: Source, options: &LoadOptions) -> Result<LoadResult, KiraError> {
        let cache_path = self.resolve_cache_path(source, options);
        let container = Store::read_container(&cache_path)
            .ok_or_else(|| KiraError::DatasetNotFound(format!("{source} at {cache_path}")))?;
        Ok(LoadResult {
            source,
            action: LoadAction::Cache,
            cache_path: cache_path.to_string(),
            summary: container.summary(),
        })
    }

    fn resolve_cache_path(&self, source: Source, options: &LoadOptions) -> Utf8PathBuf {
        options
            .cache_path
            .clone()
            .unwrap_or_else(|| self.store.cache_path(source))
    }
}

pub fn normalize_table(source: Source, mut table: SourceTable) -> Result<Vec<Cell>, KiraError> {
    match source {
        Source::Vdjdb => vdjdb::normalize(&table),
        Source::Iedb => {
            iedb::preprocess(&mut table)?;
            iedb::normalize(&table)
        }
    }
}
