use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::BatchError;
use crate::record::Record;

const STAGE_PREFIX: &str = "subfinder";

/// Root directory that receives one published file per record.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Creates `root` and its parents if needed.
    pub fn prepare(root: &Path) -> Result<Self, BatchError> {
        fs::create_dir_all(root).map_err(|source| BatchError::CreateOutputDir {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn destination(&self, record: &Record) -> Result<PathBuf, BatchError> {
        record.check_name()?;
        Ok(self.root.join(&record.name))
    }

    /// Copies the staged bytes to the record's destination, overwriting any
    /// previous file there.
    pub async fn publish(
        &self,
        record: &Record,
        staged: &StagedOutput,
    ) -> Result<PathBuf, BatchError> {
        let destination = self.destination(record)?;
        let publish_err = |source: std::io::Error| BatchError::Publish {
            name: record.name.clone(),
            path: destination.clone(),
            source,
        };

        let mut src = tokio::fs::File::from_std(staged.file.reopen().map_err(publish_err)?);
        let mut dst = tokio::fs::File::create(&destination)
            .await
            .map_err(publish_err)?;
        let copied = tokio::io::copy(&mut src, &mut dst)
            .await
            .map_err(publish_err)?;
        dst.flush().await.map_err(publish_err)?;

        debug!("Copied {} bytes to {}", copied, destination.display());
        Ok(destination)
    }
}

/// Scratch file a single invocation writes to. The file is removed when this
/// value is dropped, whichever way the record's processing ends.
#[derive(Debug)]
pub struct StagedOutput {
    file: NamedTempFile,
}

impl StagedOutput {
    pub fn create(record: &Record, scratch_dir: Option<&Path>) -> Result<Self, BatchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGE_PREFIX);
        let file = match scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|source| BatchError::Stage {
            name: record.name.clone(),
            source,
        })?;
        debug!("Staging {} at {}", record.name, file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
