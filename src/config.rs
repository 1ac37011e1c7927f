use std::path::PathBuf;

use crate::invocation::ToolFlags;
use crate::scanner::ScannerConfig;

pub const DEFAULT_OUTPUT_DIR: &str = "/output";
pub const DEFAULT_TOOL: &str = "subfinder";

/// Process-wide settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Where staged outputs are created; the system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
    pub tool: ToolSelection,
    /// Forwarded verbatim after the fixed flags.
    pub extra_args: Vec<String>,
}

/// Which invocation strategy drives the discovery engine.
#[derive(Debug, Clone)]
pub enum ToolSelection {
    Subprocess { binary: PathBuf, flags: ToolFlags },
    InProcess(ScannerConfig),
}

impl Default for ToolSelection {
    fn default() -> Self {
        ToolSelection::Subprocess {
            binary: PathBuf::from(DEFAULT_TOOL),
            flags: ToolFlags::default(),
        }
    }
}
