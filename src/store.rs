use std::fs;
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::container::AirrContainer;
use crate::domain::Source;
use crate::error::KiraError;

pub const DATA_DIR_ENV: &str = "KIRA_AIRR_DATA_DIR";

#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
}

impl Store {
    pub fn new(configured: Option<&Utf8Path>) -> Result<Self, KiraError> {
        if let Ok(value) = std::env::var(DATA_DIR_ENV) {
            if !value.trim().is_empty() {
                return Ok(Self::new_with_path(Utf8PathBuf::from(value.trim())));
            }
        }
        if let Some(path) = configured {
            return Ok(Self::new_with_path(path.to_path_buf()));
        }

        let data_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-airr")).ok()
            })
            .ok_or_else(|| {
                KiraError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { data_root })
    }

    pub fn new_with_path(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn cache_path(&self, source: Source) -> Utf8PathBuf {
        self.data_root.join(source.cache_file_name())
    }

    pub fn datasets_dir(&self) -> Utf8PathBuf {
        self.data_root.join("datasets")
    }

    pub fn dataset_path(&self, file_name: &str) -> Utf8PathBuf {
        self.datasets_dir().join(file_name)
    }

    /// Reads a cached container. Every failure mode (absent, unreadable,
    /// truncated, different schema) comes back as `None`.
    pub fn read_container(path: &Utf8Path) -> Option<AirrContainer> {
        match Self::try_read_container(path) {
            Ok(container) => Some(container),
            Err(err) => {
                tracing::debug!(path = %path, error = %err, "cache miss");
                None
            }
        }
    }

    pub fn try_read_container(path: &Utf8Path) -> Result<AirrContainer, KiraError> {
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("open {path}: {err}")))?;
        let reader = BufReader::new(GzDecoder::new(file));
        serde_json::from_reader(reader).map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    /// Writes a container through a temp file in the destination directory and
    /// renames it into place, so readers never observe a partial file and the
    /// last concurrent writer wins.
    pub fn write_container(path: &Utf8Path, container: &AirrContainer) -> Result<(), KiraError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        let temp = tempfile::Builder::new()
            .prefix("kira-airr-cache")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        {
            let mut encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
            serde_json::to_writer(&mut encoder, container)
                .map_err(|err| KiraError::ContainerEncode(err.to_string()))?;
            let mut writer = encoder
                .finish()
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            writer
                .flush()
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airr::{CellBuilder, ChainBuilder, Scalar};
    use crate::container::DatabaseMetadata;
    use crate::domain::Locus;
    use crate::table::SourceTable;

    fn sample() -> AirrContainer {
        let mut cell = CellBuilder::new("0");
        cell.add_chain(ChainBuilder::new(Locus::Tra).junction_aa(Some("CAVSF")).build());
        let mut container = AirrContainer::from_cells(vec![cell.build()]).with_metadata(
            DatabaseMetadata {
                name: "VDJDB".to_string(),
                date_downloaded: "2024-01-01T00:00:00+00:00".to_string(),
            },
        );
        container.index_chains();
        container
    }

    #[test]
    fn layout_paths() {
        let store = Store::new_with_path(Utf8PathBuf::from("/data/airr"));
        assert_eq!(
            store.cache_path(Source::Vdjdb),
            Utf8PathBuf::from("/data/airr/vdjdb.json.gz")
        );
        assert!(store.cache_path(Source::Iedb).ends_with("iedb.json.gz"));
        assert_eq!(
            store.dataset_path("wu2020.h5mu"),
            Utf8PathBuf::from("/data/airr/datasets/wu2020.h5mu")
        );
    }

    #[test]
    fn write_then_read_container() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/dir/vdjdb.json.gz")).unwrap();
        let container = sample();

        Store::write_container(&path, &container).unwrap();
        assert_eq!(Store::read_container(&path), Some(container));
    }

    #[test]
    fn unreadable_cache_is_a_miss() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("iedb.json.gz")).unwrap();
        assert_eq!(Store::read_container(&path), None);

        fs::write(path.as_std_path(), b"not gzip").unwrap();
        assert_eq!(Store::read_container(&path), None);
    }

    #[test]
    fn non_finite_metadata_survives_cache() {
        let table = SourceTable::from_reader("vdjdb.score\ninf\n".as_bytes(), b'\t').unwrap();
        let kind = table.column_kind("vdjdb.score");
        let row = table.rows().next().unwrap();
        let mut cell = CellBuilder::new("0");
        cell.set("vdjdb.score", row.scalar("vdjdb.score", kind));
        let container = AirrContainer::from_cells(vec![cell.build()]);

        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("vdjdb.json.gz")).unwrap();
        Store::write_container(&path, &container).unwrap();

        let cached = Store::read_container(&path).unwrap();
        assert_eq!(cached, container);
        assert_eq!(
            cached.cells()[0].get("vdjdb.score"),
            Some(&Scalar::Str("inf".to_string()))
        );
    }
}
