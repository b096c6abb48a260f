use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_airr::app::LoadAction;
use kira_airr::datasets::{DatasetClient, DatasetEntry, DatasetFetcher};
use kira_airr::error::KiraError;
use kira_airr::output::JsonOutput;
use kira_airr::store::Store;

const PAYLOAD: &[u8] = b"kira-airr dataset payload";

const ENTRY: DatasetEntry = DatasetEntry {
    name: "demo",
    file_name: "demo.h5mu",
    md5: "7fa7a589f06be5f2311924220f1ca4c2",
};

struct MockDatasets {
    payload: &'static [u8],
    calls: Arc<Mutex<usize>>,
}

impl DatasetClient for MockDatasets {
    fn download(&self, _entry: &DatasetEntry, destination: &Path) -> Result<u64, KiraError> {
        *self.calls.lock().unwrap() += 1;
        fs::write(destination, self.payload).unwrap();
        Ok(self.payload.len() as u64)
    }
}

fn fetcher(
    root: &tempfile::TempDir,
    payload: &'static [u8],
) -> (DatasetFetcher<MockDatasets>, Arc<Mutex<usize>>) {
    let root = Utf8PathBuf::from_path_buf(root.path().join("data")).unwrap();
    let calls = Arc::new(Mutex::new(0));
    let client = MockDatasets {
        payload,
        calls: Arc::clone(&calls),
    };
    (DatasetFetcher::new(Store::new_with_path(root), client), calls)
}

#[test]
fn verified_dataset_is_reused_without_download() {
    let temp = tempfile::tempdir().unwrap();
    let (fetcher, calls) = fetcher(&temp, PAYLOAD);

    let first = fetcher.fetch_entry(&ENTRY, &JsonOutput).unwrap();
    assert_eq!(first.action, LoadAction::Download);
    assert_eq!(first.md5, ENTRY.md5);
    let stored = fetcher.store().dataset_path("demo.h5mu");
    assert_eq!(first.path, stored.to_string());
    assert_eq!(fs::read(stored.as_std_path()).unwrap(), PAYLOAD);

    let second = fetcher.fetch_entry(&ENTRY, &JsonOutput).unwrap();
    assert_eq!(second.action, LoadAction::Cache);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn tampered_file_is_downloaded_again() {
    let temp = tempfile::tempdir().unwrap();
    let (fetcher, calls) = fetcher(&temp, PAYLOAD);
    let stored = fetcher.store().dataset_path("demo.h5mu");
    fs::create_dir_all(stored.parent().unwrap().as_std_path()).unwrap();
    fs::write(stored.as_std_path(), b"tampered payload").unwrap();

    let result = fetcher.fetch_entry(&ENTRY, &JsonOutput).unwrap();
    assert_eq!(result.action, LoadAction::Download);
    assert_eq!(fs::read(stored.as_std_path()).unwrap(), PAYLOAD);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn checksum_mismatch_keeps_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let (fetcher, calls) = fetcher(&temp, b"tampered payload");

    let err = fetcher.fetch_entry(&ENTRY, &JsonOutput).unwrap_err();
    assert_matches!(
        err,
        KiraError::ChecksumMismatch { ref actual, .. } if actual == "6051a819970516d2636b03d71d940205"
    );
    assert!(!fetcher.store().dataset_path("demo.h5mu").as_std_path().exists());
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn unknown_dataset_name_never_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let (fetcher, calls) = fetcher(&temp, PAYLOAD);

    let err = fetcher.fetch("not-a-dataset", &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::UnknownDataset(_));
    assert_eq!(*calls.lock().unwrap(), 0);
}
