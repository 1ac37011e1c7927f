use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::record::Record;

/// Flag spellings understood by the discovery tool. Defaults match subfinder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFlags {
    pub json: String,
    pub output: String,
    pub domains: String,
    /// Disables the tool's own update check; omitted when `None`.
    pub skip_update_check: Option<String>,
}

impl Default for ToolFlags {
    fn default() -> Self {
        Self {
            json: "-json".to_string(),
            output: "-o".to_string(),
            domains: "-d".to_string(),
            skip_update_check: Some("-duc".to_string()),
        }
    }
}

/// A single tool run for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Fixed flags come first, then the domain flag, then `extra_args` so the
    /// tool's own parser settles any collision.
    pub fn build(
        program: &Path,
        flags: &ToolFlags,
        record: &Record,
        staged: &Path,
        extra_args: &[String],
    ) -> Self {
        let mut args: Vec<OsString> = Vec::with_capacity(6 + extra_args.len());
        args.push(flags.json.clone().into());
        args.push(flags.output.clone().into());
        args.push(staged.as_os_str().to_os_string());
        if let Some(flag) = &flags.skip_update_check {
            args.push(flag.clone().into());
        }
        args.push(flags.domains.clone().into());
        args.push(record.domain_list().into());
        args.extend(extra_args.iter().map(OsString::from));

        Self {
            program: program.to_path_buf(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            name: "acme".to_string(),
            domains: vec!["acme.com".to_string(), "acme.io".to_string(), "acme.com".to_string()],
        }
    }

    fn args(invocation: &Invocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_default_flag_order() {
        let invocation = Invocation::build(
            Path::new("subfinder"),
            &ToolFlags::default(),
            &record(),
            Path::new("/tmp/subfinder123"),
            &["-all".to_string(), "-timeout".to_string(), "5".to_string()],
        );

        assert_eq!(invocation.program, PathBuf::from("subfinder"));
        assert_eq!(
            args(&invocation),
            vec![
                "-json",
                "-o",
                "/tmp/subfinder123",
                "-duc",
                "-d",
                "acme.com,acme.io,acme.com",
                "-all",
                "-timeout",
                "5"
            ]
        );
    }

    #[test]
    fn test_custom_flags_without_update_check() {
        let flags = ToolFlags {
            json: "--json".to_string(),
            output: "--output".to_string(),
            domains: "--domain".to_string(),
            skip_update_check: None,
        };
        let invocation = Invocation::build(
            Path::new("/opt/tool"),
            &flags,
            &record(),
            Path::new("out.tmp"),
            &[],
        );

        assert_eq!(
            args(&invocation),
            vec!["--json", "--output", "out.tmp", "--domain", "acme.com,acme.io,acme.com"]
        );
    }

    #[test]
    fn test_extra_args_may_repeat_fixed_flags() {
        let invocation = Invocation::build(
            Path::new("subfinder"),
            &ToolFlags::default(),
            &record(),
            Path::new("staged"),
            &["-o".to_string(), "elsewhere".to_string()],
        );

        let args = args(&invocation);
        assert_eq!(&args[args.len() - 2..], ["-o", "elsewhere"]);
        assert_eq!(args.iter().filter(|a| *a == "-o").count(), 2);
    }
}
