//! [`Archiver`] writing `.zip` (deflate) or `.tar` archives in memory.

use std::io::{Cursor, Write};
use std::path::{Component, PathBuf};

use async_trait::async_trait;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ArchiveOptions;
use crate::contract::{Archiver, FileRecord, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
}

impl ArchiveFormat {
    /// `.tar` names get a tarball, everything else a zip.
    pub fn from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".tar") {
            ArchiveFormat::Tar
        } else {
            ArchiveFormat::Zip
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileArchiver;

impl FileArchiver {
    pub fn new() -> Self {
        Self
    }
}

/// Entries must stay inside the archive root.
fn entry_name(file: &FileRecord) -> Result<String, PipelineError> {
    let relative = file.relative();
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(PipelineError::Archive(format!(
            "{} is outside the archive base {}",
            file.path.display(),
            file.base.display()
        )));
    }
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

fn write_zip(files: &[FileRecord], options: &ArchiveOptions) -> Result<Vec<u8>, PipelineError> {
    let method = if options.compress {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    let entry_options = FileOptions::default().compression_method(method);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for file in files {
        writer
            .start_file(entry_name(file)?, entry_options)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        writer
            .write_all(&file.contents)
            .map_err(|e| PipelineError::io(&file.path, e))?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| PipelineError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn write_tar(files: &[FileRecord]) -> Result<Vec<u8>, PipelineError> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder
            .append_data(&mut header, entry_name(file)?, file.contents.as_slice())
            .map_err(|e| PipelineError::io(&file.path, e))?;
    }
    builder
        .into_inner()
        .map_err(|e| PipelineError::Archive(e.to_string()))
}

#[async_trait]
impl Archiver for FileArchiver {
    async fn archive(
        &self,
        files: &[FileRecord],
        name: &str,
        options: &ArchiveOptions,
    ) -> Result<FileRecord, PipelineError> {
        let format = ArchiveFormat::from_name(name);
        let contents = match format {
            ArchiveFormat::Zip => write_zip(files, options)?,
            ArchiveFormat::Tar => write_tar(files)?,
        };
        info!(
            archive = name,
            ?format,
            entries = files.len(),
            size = contents.len(),
            "Packed archive"
        );
        Ok(FileRecord::new(PathBuf::new(), PathBuf::from(name), contents))
    }
}
