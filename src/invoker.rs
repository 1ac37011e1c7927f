use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::BatchError;
use crate::invocation::{Invocation, ToolFlags};
use crate::record::Record;
use crate::scanner::{ScannerConfig, SubdomainScanner};

/// Runs the discovery tool for one record. On `Ok`, the complete result set
/// is at `staged`.
#[allow(async_fn_in_trait)]
pub trait ToolInvoker {
    async fn invoke(&self, record: &Record, staged: &Path) -> Result<(), BatchError>;
}

/// Runs an external binary with inherited stdout/stderr.
#[derive(Debug, Clone)]
pub struct SubprocessInvoker {
    binary: PathBuf,
    flags: ToolFlags,
    extra_args: Vec<String>,
}

impl SubprocessInvoker {
    pub fn new(binary: PathBuf, flags: ToolFlags, extra_args: Vec<String>) -> Self {
        Self {
            binary,
            flags,
            extra_args,
        }
    }

    pub fn invocation(&self, record: &Record, staged: &Path) -> Invocation {
        Invocation::build(&self.binary, &self.flags, record, staged, &self.extra_args)
    }
}

impl ToolInvoker for SubprocessInvoker {
    async fn invoke(&self, record: &Record, staged: &Path) -> Result<(), BatchError> {
        let invocation = self.invocation(record, staged);
        debug!(record = %record.name, "Running {} {:?}", invocation.program.display(), invocation.args);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let spawn_err = |source: io::Error| BatchError::Spawn {
            binary: invocation.program.clone(),
            name: record.name.clone(),
            source,
        };
        let mut child = spawn_with_retry(&mut command).map_err(spawn_err)?;
        let status = child.wait().await.map_err(spawn_err)?;

        if !status.success() {
            return Err(BatchError::ToolFailed {
                name: record.name.clone(),
                status,
            });
        }
        Ok(())
    }
}

/// A freshly written executable can briefly report ETXTBSY; retry a few times
/// before giving up.
fn spawn_with_retry(command: &mut Command) -> io::Result<Child> {
    let mut backoff = Duration::from_millis(2);
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(err) => {
                let is_busy = matches!(err.kind(), io::ErrorKind::ExecutableFileBusy)
                    || err.raw_os_error() == Some(26);
                if !is_busy || attempt >= 4 {
                    return Err(err);
                }
                attempt += 1;
                std::thread::sleep(backoff);
                backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
            }
        }
    }
}

/// Runs the built-in DNS brute-force engine in this process.
#[derive(Debug)]
pub struct InProcessInvoker {
    scanner: SubdomainScanner,
    extra_args: Vec<String>,
    warned: AtomicBool,
}

impl InProcessInvoker {
    pub fn new(config: ScannerConfig, extra_args: Vec<String>) -> Self {
        Self {
            scanner: SubdomainScanner::new(config),
            extra_args,
            warned: AtomicBool::new(false),
        }
    }
}

impl ToolInvoker for InProcessInvoker {
    async fn invoke(&self, record: &Record, staged: &Path) -> Result<(), BatchError> {
        if !self.extra_args.is_empty() && !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                "Ignoring {} passthrough arguments: the built-in engine takes no tool flags",
                self.extra_args.len()
            );
        }

        let found = self
            .scanner
            .enumerate(&record.domains, staged)
            .await
            .map_err(|source| BatchError::Engine {
                name: record.name.clone(),
                source,
            })?;
        info!(record = %record.name, "Built-in engine found {} hosts", found);
        Ok(())
    }
}
