use std::ops::ControlFlow;
use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::BatchError;
use crate::invoker::ToolInvoker;
use crate::output::{OutputDir, StagedOutput};
use crate::record::{drive, Record, RecordHandler, RecordStream};

/// Counts for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    pub published: usize,
    pub skipped: usize,
}

/// Handles one record at a time: stage, invoke, publish.
pub struct BatchRunner<'a, I> {
    output: OutputDir,
    invoker: &'a I,
    scratch_dir: Option<PathBuf>,
    summary: RunSummary,
}

impl<'a, I: ToolInvoker> BatchRunner<'a, I> {
    pub fn new(output: OutputDir, invoker: &'a I, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            output,
            invoker,
            scratch_dir,
            summary: RunSummary::default(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    async fn process(&mut self, record: &Record) -> Result<PathBuf, BatchError> {
        // Reject unsafe names before the tool spends any time on them.
        self.output.destination(record)?;

        let staged = StagedOutput::create(record, self.scratch_dir.as_deref())?;
        self.invoker.invoke(record, staged.path()).await?;
        self.output.publish(record, &staged).await
    }
}

impl<I: ToolInvoker> RecordHandler for BatchRunner<'_, I> {
    async fn handle(&mut self, record: Record) -> Result<ControlFlow<()>, BatchError> {
        self.summary.records += 1;

        if record.domains.is_empty() {
            info!(record = %record.name, "Skipping record with no domains");
            self.summary.skipped += 1;
            return Ok(ControlFlow::Continue(()));
        }

        info!(
            record = %record.name,
            "Enumerating {} domains: {}",
            record.domains.len(),
            record.domain_list()
        );
        let path = self.process(&record).await?;
        info!(record = %record.name, "Wrote {}", path.display());
        self.summary.published += 1;
        Ok(ControlFlow::Continue(()))
    }
}

/// Drains the configured input through `invoker`, stopping at the first error.
pub async fn run_batch<I: ToolInvoker>(config: &Config, invoker: &I) -> Result<RunSummary, BatchError> {
    let output = OutputDir::prepare(&config.output_dir)?;
    let stream = RecordStream::open(&config.input)?;
    info!(
        "Processing {} into {}",
        config.input.display(),
        output.root().display()
    );

    let mut runner = BatchRunner::new(output, invoker, config.scratch_dir.clone());
    drive(stream, &mut runner).await?;
    Ok(runner.summary())
}
