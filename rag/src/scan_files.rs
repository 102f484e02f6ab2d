use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// A file handed to ingestion: display name plus raw bytes.
#[derive(Clone, Debug)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), bytes: bytes.into() }
    }
}

/// Reads a single file, or every regular file under a directory, as uploads.
/// Files found under a directory are named by their `/`-separated path
/// relative to it. Format checks happen later, so unsupported files are
/// returned too.
pub fn scan_files(path: &Path) -> Result<Vec<Upload>> {
    if path.is_file() {
        let name = path.file_name().map(Path::new).unwrap_or(path);
        return Ok(vec![read_upload(path, name)?]);
    }

    let mut results = Vec::new();
    let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0 || !name.starts_with('.')
    });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        results.push(read_upload(entry.path(), relative)?);
    }
    Ok(results)
}

fn read_upload(path: &Path, name: &Path) -> Result<Upload> {
    let bytes = fs::read(path)?;
    let filename = name
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(Upload { filename, bytes })
}
