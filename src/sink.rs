use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::error::SinkError;

/// Where the bundle goes; `None` means the user backed out and nothing is written.
pub trait DestinationChooser {
    fn choose(&self, result_count: usize) -> Option<PathBuf>;
}

/// A destination decided up front, e.g. from a command line flag.
#[derive(Debug, Clone, Default)]
pub struct FixedDestination(pub Option<PathBuf>);

impl DestinationChooser for FixedDestination {
    fn choose(&self, _result_count: usize) -> Option<PathBuf> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedOutput {
    SourceFile { path: String },
    Archive { path: String, entries: usize },
}

/// Writes `results` to `destination`.
///
/// A single result is written verbatim as one source file. Anything else becomes a
/// zip archive with one `<name>.java` entry per result, in iteration order. A
/// failure part way through leaves whatever was already written in place.
pub fn save<'a, I>(results: I, destination: &Path) -> Result<SavedOutput, SinkError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let results: Vec<(&str, &str)> = results.into_iter().collect();
    create_parent(destination)?;

    if let [(_, source)] = results.as_slice() {
        std::fs::write(destination, source.as_bytes()).map_err(|source| io_error(destination, source))?;
        return Ok(SavedOutput::SourceFile {
            path: destination.to_string_lossy().to_string(),
        });
    }

    write_archive(&results, destination)?;
    Ok(SavedOutput::Archive {
        path: destination.to_string_lossy().to_string(),
        entries: results.len(),
    })
}

fn write_archive(results: &[(&str, &str)], destination: &Path) -> Result<(), SinkError> {
    let file = File::create(destination).map_err(|source| io_error(destination, source))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, source) in results {
        zip.start_file(format!("{name}.java"), options)
            .map_err(|source| archive_error(destination, source))?;
        zip.write_all(source.as_bytes())
            .map_err(|source| io_error(destination, source))?;
    }

    let mut writer = zip
        .finish()
        .map_err(|source| archive_error(destination, source))?;
    writer.flush().map_err(|source| io_error(destination, source))?;
    Ok(())
}

fn create_parent(destination: &Path) -> Result<(), SinkError> {
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn archive_error(path: &Path, source: zip::result::ZipError) -> SinkError {
    SinkError::Archive {
        path: path.to_path_buf(),
        source,
    }
}
