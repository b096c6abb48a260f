use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::KiraError;

pub fn extract_zip_entry<F>(
    zip_path: &Path,
    target_dir: &Path,
    description: &str,
    matches: F,
) -> Result<PathBuf, KiraError>
where
    F: Fn(&str) -> bool,
{
    let file = fs::File::open(zip_path)
        .map_err(|err| KiraError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| KiraError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(KiraError::Filesystem(
                "zip entry path traversal detected".to_string(),
            ));
        };
        let Some(file_name) = enclosed.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !matches(file_name) {
            continue;
        }

        let entry_path = target_dir.join(file_name);
        fs::create_dir_all(target_dir).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        return Ok(entry_path);
    }

    Err(KiraError::ArchiveEntryMissing {
        archive: zip_path.display().to_string(),
        entry: description.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_nested_entry_flat() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("vdjdb.zip");
        write_zip(
            &zip_path,
            &[
                ("vdjdb-2024/vdjdb.txt", "slim"),
                ("vdjdb-2024/vdjdb_full.txt", "full"),
            ],
        );

        let out = temp.path().join("out");
        let path = extract_zip_entry(&zip_path, &out, "vdjdb_full.txt", |name| {
            name == "vdjdb_full.txt"
        })
        .unwrap();
        assert_eq!(path, out.join("vdjdb_full.txt"));
        assert_eq!(fs::read_to_string(path).unwrap(), "full");
    }

    #[test]
    fn missing_entry_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("export.zip");
        write_zip(&zip_path, &[("readme.txt", "hi")]);

        let err = extract_zip_entry(&zip_path, temp.path(), "*.csv", |name| {
            name.ends_with(".csv")
        })
        .unwrap_err();
        assert_matches!(err, KiraError::ArchiveEntryMissing { .. });
    }
}
