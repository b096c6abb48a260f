use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::app::{LoadAction, ProgressEvent, ProgressSink};
use crate::error::KiraError;
use crate::http;
use crate::store::Store;

// doi:10.6084/m9.figshare.22249894.v1
pub const FIGSHARE_ARTICLE_URL: &str = "https://api.figshare.com/v2/articles/22249894/versions/1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetEntry {
    pub name: &'static str,
    pub file_name: &'static str,
    pub md5: &'static str,
}

pub const REGISTRY: [DatasetEntry; 3] = [
    DatasetEntry {
        name: "wu2020",
        file_name: "wu2020.h5mu",
        md5: "ed30d9c1c44cae544f4c080a2451118b",
    },
    DatasetEntry {
        name: "wu2020_3k",
        file_name: "wu2020_3k.h5mu",
        md5: "12c57c790f8a403751304c9de5a18cbf",
    },
    DatasetEntry {
        name: "maynard2020",
        file_name: "maynard2020.h5mu",
        md5: "da64ac62e3e92c80eaf0e8eef6537ac7",
    },
];

pub fn lookup(name: &str) -> Result<&'static DatasetEntry, KiraError> {
    REGISTRY
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| KiraError::UnknownDataset(name.to_string()))
}

pub trait DatasetClient: Send + Sync {
    fn download(&self, entry: &DatasetEntry, destination: &Path) -> Result<u64, KiraError>;
}

#[derive(Debug, Deserialize)]
struct FigshareArticle {
    files: Vec<FigshareFile>,
}

#[derive(Debug, Deserialize)]
struct FigshareFile {
    name: String,
    download_url: String,
}

#[derive(Clone)]
pub struct FigshareHttpClient {
    client: Client,
    article_url: String,
}

impl FigshareHttpClient {
    pub fn new(article_url: impl Into<String>) -> Result<Self, KiraError> {
        let client = http::build_client(Duration::from_secs(600))
            .map_err(|err| KiraError::DatasetHttp(err.to_string()))?;
        Ok(Self {
            client,
            article_url: article_url.into(),
        })
    }

    fn download_url(&self, file_name: &str) -> Result<String, KiraError> {
        let response = http::send_with_retries(|| self.client.get(&self.article_url))
            .map_err(|err| KiraError::DatasetHttp(err.to_string()))?;
        let response = http::check_status(response)
            .map_err(|(status, message)| KiraError::DatasetStatus { status, message })?;
        let article: FigshareArticle = response
            .json()
            .map_err(|err| KiraError::DatasetHttp(err.to_string()))?;
        article
            .files
            .into_iter()
            .find(|file| file.name == file_name)
            .map(|file| file.download_url)
            .ok_or_else(|| {
                KiraError::DatasetHttp(format!("{file_name} is not listed in {}", self.article_url))
            })
    }
}

impl DatasetClient for FigshareHttpClient {
    fn download(&self, entry: &DatasetEntry, destination: &Path) -> Result<u64, KiraError> {
        let url = self.download_url(entry.file_name)?;
        tracing::info!(dataset = entry.name, %url, "downloading dataset");
        let response = http::send_with_retries(|| self.client.get(&url))
            .map_err(|err| KiraError::DatasetHttp(err.to_string()))?;
        let response = http::check_status(response)
            .map_err(|(status, message)| KiraError::DatasetStatus { status, message })?;
        http::write_response_to_file(response, destination)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetFetch {
    pub name: String,
    pub path: String,
    pub md5: String,
    pub action: LoadAction,
}

pub struct DatasetFetcher<C: DatasetClient> {
    store: Store,
    client: C,
}

impl<C: DatasetClient> DatasetFetcher<C> {
    pub fn new(store: Store, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn fetch(&self, name: &str, sink: &dyn ProgressSink) -> Result<DatasetFetch, KiraError> {
        self.fetch_entry(lookup(name)?, sink)
    }

    /// A stored file with the registered checksum is reused; anything else is
    /// downloaded again and only kept once its checksum matches.
    pub fn fetch_entry(
        &self,
        entry: &DatasetEntry,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetFetch, KiraError> {
        let path = self.store.dataset_path(entry.file_name);
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; dataset {}", entry.name),
            elapsed: None,
        });

        if path.as_std_path().exists() {
            match file_md5(path.as_std_path()) {
                Ok(digest) if digest == entry.md5 => {
                    sink.event(ProgressEvent {
                        message: "phase=Store; using cached dataset".to_string(),
                        elapsed: None,
                    });
                    return Ok(DatasetFetch {
                        name: entry.name.to_string(),
                        path: path.to_string(),
                        md5: digest,
                        action: LoadAction::Cache,
                    });
                }
                Ok(digest) => {
                    tracing::warn!(
                        dataset = entry.name,
                        expected = entry.md5,
                        actual = %digest,
                        "stored dataset checksum differs; downloading again"
                    );
                }
                Err(err) => {
                    tracing::warn!(dataset = entry.name, error = %err, "stored dataset unreadable");
                }
            }
        }

        let parent = self.store.datasets_dir();
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kira-airr-dataset")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {}.request", entry.name),
            elapsed: None,
        });
        let start = Instant::now();
        let bytes = self.client.download(entry, temp.path())?;
        sink.event(ProgressEvent {
            message: format!("{}.response bytes={bytes}", entry.name),
            elapsed: Some(start.elapsed()),
        });

        let digest = file_md5(temp.path())?;
        if digest != entry.md5 {
            return Err(KiraError::ChecksumMismatch {
                file: entry.file_name.to_string(),
                expected: entry.md5.to_string(),
                actual: digest,
            });
        }
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        Ok(DatasetFetch {
            name: entry.name.to_string(),
            path: path.to_string(),
            md5: digest,
            action: LoadAction::Download,
        })
    }
}

pub fn file_md5(path: &Path) -> Result<String, KiraError> {
    let mut file = File::open(path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
