use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info, warn, Level};

use crate::config::{Config, ToolSelection, DEFAULT_OUTPUT_DIR, DEFAULT_TOOL};
use crate::invocation::ToolFlags;
use crate::scanner::ScannerConfig;

#[derive(Parser, Debug)]
#[command(name = "subbatch")]
#[command(version, about = "Run subdomain discovery for every named group in a JSON record stream", long_about = None)]
pub struct Cli {
    /// JSON records of the form {"name": ..., "domains": [...]}, one after another
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory receiving one result file per record
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Discovery engine: an external binary or the built-in DNS brute-forcer
    #[arg(long, default_value = "subprocess", value_name = "ENGINE")]
    pub engine: EngineKind,

    /// Discovery tool binary (looked up on PATH when not a path)
    #[arg(short, long, default_value = DEFAULT_TOOL, value_name = "PATH")]
    pub tool: PathBuf,

    /// Tool flag requesting JSON output
    #[arg(long, default_value = "-json", allow_hyphen_values = true, value_name = "FLAG")]
    pub json_flag: String,

    /// Tool flag naming the output file
    #[arg(long, default_value = "-o", allow_hyphen_values = true, value_name = "FLAG")]
    pub output_flag: String,

    /// Tool flag taking the comma-separated domain list
    #[arg(long, default_value = "-d", allow_hyphen_values = true, value_name = "FLAG")]
    pub domain_flag: String,

    /// Tool flag disabling its update check
    #[arg(long, default_value = "-duc", allow_hyphen_values = true, value_name = "FLAG")]
    pub update_flag: String,

    /// Let the tool check for updates (omit the update flag)
    #[arg(long)]
    pub allow_update_check: bool,

    /// Directory for staged output files (system temp dir if not specified)
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// File containing DNS resolvers, one per line (built-in engine)
    #[arg(short, long, value_name = "FILE")]
    pub resolvers: Option<PathBuf>,

    /// File containing subdomain labels, one per line (built-in engine)
    #[arg(short, long, value_name = "FILE")]
    pub wordlist: Option<PathBuf>,

    /// Query timeout in seconds (built-in engine)
    #[arg(long, default_value = "2", value_name = "SECS")]
    pub timeout: u64,

    /// Concurrent lookups (built-in engine)
    #[arg(long, default_value_t = num_cpus::get(), value_name = "N")]
    pub concurrency: usize,

    /// Show verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(long, conflicts_with = "verbose")]
    pub silent: bool,

    /// Disable colors in log output
    #[arg(long)]
    pub no_color: bool,

    /// Extra flags passed to the tool unchanged
    #[arg(last = true, value_name = "TOOL_ARGS")]
    pub tool_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Subprocess,
    Builtin,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subprocess" => Ok(EngineKind::Subprocess),
            "builtin" => Ok(EngineKind::Builtin),
            _ => Err(format!("Unknown engine: {}", s)),
        }
    }
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.silent {
            Level::ERROR
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn init_tracing(&self) {
        tracing_subscriber::fmt()
            .with_max_level(self.log_level())
            .with_ansi(!self.no_color)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn to_config(&self) -> anyhow::Result<Config> {
        let tool = match self.engine {
            EngineKind::Subprocess => ToolSelection::Subprocess {
                binary: self.tool.clone(),
                flags: self.tool_flags(),
            },
            EngineKind::Builtin => ToolSelection::InProcess(self.scanner_config()?),
        };

        Ok(Config {
            input: self.input.clone(),
            output_dir: self.output_dir.clone(),
            scratch_dir: self.temp_dir.clone(),
            tool,
            extra_args: self.tool_args.clone(),
        })
    }

    fn tool_flags(&self) -> ToolFlags {
        let flags = ToolFlags {
            json: self.json_flag.clone(),
            output: self.output_flag.clone(),
            domains: self.domain_flag.clone(),
            skip_update_check: (!self.allow_update_check && !self.update_flag.is_empty())
                .then(|| self.update_flag.clone()),
        };
        debug!("Tool flags: {:?}", flags);
        flags
    }

    fn scanner_config(&self) -> anyhow::Result<ScannerConfig> {
        let Some(resolvers) = &self.resolvers else {
            anyhow::bail!("--resolvers is required with --engine builtin");
        };
        let Some(wordlist) = &self.wordlist else {
            anyhow::bail!("--wordlist is required with --engine builtin");
        };
        if self.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }

        Ok(ScannerConfig {
            resolvers: load_resolvers(resolvers)?,
            wordlist: load_wordlist(wordlist)?,
            timeout: Duration::from_secs(self.timeout),
            concurrency: self.concurrency,
        })
    }
}

/// Reads one entry per line, skipping blanks and `#` comments. Lines that
/// `parse` rejects are logged and counted; an empty result is an error.
fn load_lines<T>(
    path: &Path,
    what: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> anyhow::Result<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Cannot open {} file {}: {}", what, path.display(), e))?;
    let mut entries = Vec::new();
    let mut rejected = 0usize;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        match parse(entry) {
            Ok(value) => entries.push(value),
            Err(reason) => {
                rejected += 1;
                warn!("{}:{}: skipping {} '{}' ({})", path.display(), idx + 1, what, entry, reason);
            }
        }
    }

    if entries.is_empty() {
        anyhow::bail!("{} has no usable {} entries ({} rejected)", path.display(), what, rejected);
    }
    info!("{} {} entries from {} ({} rejected)", entries.len(), what, path.display(), rejected);
    Ok(entries)
}

fn load_resolvers(path: &Path) -> anyhow::Result<Vec<SocketAddr>> {
    load_lines(path, "resolver", |entry| {
        let addr = if entry.contains(':') {
            entry.to_string()
        } else {
            format!("{}:53", entry)
        };
        addr.to_socket_addrs()
            .map_err(|e| e.to_string())?
            .next()
            .ok_or_else(|| "no address".to_string())
    })
}

fn load_wordlist(path: &Path) -> anyhow::Result<Vec<String>> {
    load_lines(path, "label", |entry| {
        if is_valid_label(entry) {
            Ok(entry.to_lowercase())
        } else {
            Err("not a DNS label".to_string())
        }
    })
}

/// Dot-separated labels of 1..=63 characters from `[A-Za-z0-9_-]`, prefixed
/// onto a root domain.
fn is_valid_label(name: &str) -> bool {
    name.len() <= 253
        && name.split('.').all(|label| {
            (1..=63).contains(&label.len())
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("subbatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["targets.json"]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.input, PathBuf::from("targets.json"));
        assert_eq!(config.output_dir, PathBuf::from("/output"));
        assert_eq!(config.scratch_dir, None);
        assert!(config.extra_args.is_empty());
        match config.tool {
            ToolSelection::Subprocess { binary, flags } => {
                assert_eq!(binary, PathBuf::from("subfinder"));
                assert_eq!(flags, ToolFlags::default());
            }
            other => panic!("expected subprocess tool, got {:?}", other),
        }
        assert_eq!(cli.log_level(), Level::INFO);
    }

    #[test]
    fn test_passthrough_and_custom_flags() {
        let cli = parse(&[
            "-o",
            "/tmp/results",
            "--tool",
            "/opt/subfinder",
            "--domain-flag",
            "--domain",
            "--allow-update-check",
            "-v",
            "targets.json",
            "--",
            "-all",
            "-timeout",
            "10",
        ]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/results"));
        assert_eq!(config.extra_args, vec!["-all", "-timeout", "10"]);
        match config.tool {
            ToolSelection::Subprocess { binary, flags } => {
                assert_eq!(binary, PathBuf::from("/opt/subfinder"));
                assert_eq!(flags.domains, "--domain");
                assert_eq!(flags.skip_update_check, None);
            }
            other => panic!("expected subprocess tool, got {:?}", other),
        }
        assert_eq!(cli.log_level(), Level::DEBUG);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        assert!(Cli::try_parse_from(["subbatch", "-o", "/tmp/out"]).is_err());
    }

    #[test]
    fn test_builtin_requires_resolvers_and_wordlist() {
        let cli = parse(&["--engine", "builtin", "targets.json"]);
        assert!(cli.to_config().is_err());
    }

    #[test]
    fn test_builtin_engine_config() {
        let mut resolvers = NamedTempFile::new().unwrap();
        writeln!(resolvers, "1.1.1.1").unwrap();
        writeln!(resolvers, "8.8.8.8:53").unwrap();
        writeln!(resolvers, "# Comment").unwrap();
        writeln!(resolvers, "").unwrap();
        writeln!(resolvers, "invalid.resolver").unwrap();

        let mut wordlist = NamedTempFile::new().unwrap();
        writeln!(wordlist, "www").unwrap();
        writeln!(wordlist, "API.dev").unwrap();
        writeln!(wordlist, "# Comment").unwrap();
        writeln!(wordlist, "bad..label").unwrap();

        let cli = parse(&[
            "--engine",
            "builtin",
            "-r",
            resolvers.path().to_str().unwrap(),
            "-w",
            wordlist.path().to_str().unwrap(),
            "--concurrency",
            "8",
            "targets.json",
        ]);
        let config = cli.to_config().unwrap();

        match config.tool {
            ToolSelection::InProcess(scanner) => {
                assert_eq!(scanner.resolvers.len(), 2);
                assert_eq!(scanner.resolvers[0].port(), 53);
                assert_eq!(scanner.wordlist, vec!["www", "api.dev"]);
                assert_eq!(scanner.concurrency, 8);
                assert_eq!(scanner.timeout, Duration::from_secs(2));
            }
            other => panic!("expected built-in engine, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("Builtin".parse::<EngineKind>().unwrap(), EngineKind::Builtin);
        assert!("nmap".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_is_valid_label() {
        assert!(is_valid_label("www"));
        assert!(is_valid_label("api.dev"));
        assert!(is_valid_label("_dmarc"));
        assert!(!is_valid_label(".www"));
        assert!(!is_valid_label("a..b"));
        assert!(!is_valid_label("sp ace"));
        assert!(!is_valid_label(&"a".repeat(64)));
        assert!(!is_valid_label("www."));
        assert!(!is_valid_label(""));
    }

    #[test]
    fn test_load_lines_skips_comments_and_rejects() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# ports").unwrap();
        writeln!(file, "  80 ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "http").unwrap();
        writeln!(file, "443").unwrap();

        let ports = load_lines(file.path(), "port", |e| e.parse::<u16>().map_err(|e| e.to_string()))
            .unwrap();
        assert_eq!(ports, vec![80, 443]);
    }

    #[test]
    fn test_load_lines_fails_when_nothing_usable() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# only a comment").unwrap();
        writeln!(file, "bad..label").unwrap();

        let err = load_wordlist(file.path()).unwrap_err();
        assert!(err.to_string().contains("no usable label entries (1 rejected)"));
        assert!(load_wordlist(&file.path().with_extension("missing")).is_err());
    }
}
