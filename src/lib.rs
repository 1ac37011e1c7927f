pub mod cli;
pub mod config;
pub mod error;
pub mod invocation;
pub mod invoker;
pub mod output;
pub mod record;
pub mod runner;
pub mod scanner;

pub use config::{Config, ToolSelection};
pub use error::BatchError;
pub use invoker::{InProcessInvoker, SubprocessInvoker, ToolInvoker};
pub use record::Record;
pub use runner::{run_batch, RunSummary};

/// Runs the whole batch with the invocation strategy chosen in `config`.
pub async fn run(config: &Config) -> Result<RunSummary, BatchError> {
    match &config.tool {
        ToolSelection::Subprocess { binary, flags } => {
            let invoker =
                SubprocessInvoker::new(binary.clone(), flags.clone(), config.extra_args.clone());
            run_batch(config, &invoker).await
        }
        ToolSelection::InProcess(scanner) => {
            let invoker = InProcessInvoker::new(scanner.clone(), config.extra_args.clone());
            run_batch(config, &invoker).await
        }
    }
}
