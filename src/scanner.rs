use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{self, JoinSet};

use hickory_client::client::{Client, ClientHandle};
use hickory_client::proto::rr::{DNSClass, Name, RecordType};
use hickory_client::proto::runtime::TokioRuntimeProvider;
use hickory_client::proto::udp::UdpClientStream;
use tracing::{debug, info, trace};

pub const SOURCE: &str = "dns-bruteforce";

/// Settings for the built-in brute-force engine.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub resolvers: Vec<SocketAddr>,
    pub wordlist: Vec<String>,
    pub timeout: Duration,
    pub concurrency: usize,
}

/// One resolved host, serialized as a JSON line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Finding {
    pub host: String,
    pub input: String,
    pub source: &'static str,
    pub timestamp: String,
}

impl Finding {
    pub fn new(host: String, input: &str) -> Self {
        Self {
            host,
            input: input.to_string(),
            source: SOURCE,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubdomainScanner {
    config: Arc<ScannerConfig>,
}

impl SubdomainScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Queries every resolver at once and returns as soon as any of them
    /// answers; the remaining lookups are aborted.
    async fn try_resolvers(config: Arc<ScannerConfig>, full_domain: String) -> Option<String> {
        let name = Name::from_str(&format!("{}.", full_domain)).ok()?;
        let mut lookups = JoinSet::new();
        for resolver in config.resolvers.iter().copied() {
            lookups.spawn(has_a_record(resolver, name.clone(), config.timeout));
        }

        while let Some(joined) = lookups.join_next().await {
            if let Ok(true) = joined {
                return Some(full_domain);
            }
        }
        None
    }

    /// Resolves every wordlist label under `domain`, returning the hosts that
    /// answered in completion order.
    pub async fn scan(&self, domain: &str) -> Vec<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        for label in self.config.wordlist.iter().cloned() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let config = self.config.clone();
            let full_domain = format!("{}.{}", label, domain);

            task::spawn(async move {
                let _permit = permit;
                if let Some(found) = SubdomainScanner::try_resolvers(config, full_domain).await {
                    let _ = tx.send(found);
                }
            });
        }

        drop(tx);

        let mut found_domains = Vec::new();
        while let Some(found) = rx.recv().await {
            debug!("Resolved {}", found);
            found_domains.push(found);
        }
        found_domains
    }

    /// Enumerates all `domains` and writes the findings to `output` as JSON
    /// lines. The file is written only after every domain has been scanned.
    pub async fn enumerate(&self, domains: &[String], output: &Path) -> io::Result<usize> {
        let mut findings = Vec::new();
        for domain in domains {
            let hosts = self.scan(domain).await;
            info!(
                "{} subdomains found for {} ({} labels tried)",
                hosts.len(),
                domain,
                self.config.wordlist.len()
            );
            findings.extend(hosts.into_iter().map(|host| Finding::new(host, domain)));
        }

        let mut writer = BufWriter::new(File::create(output)?);
        write_findings(&mut writer, &findings)?;
        writer.flush()?;
        Ok(findings.len())
    }
}

async fn has_a_record(resolver: SocketAddr, name: Name, timeout: Duration) -> bool {
    let conn = UdpClientStream::builder(resolver, TokioRuntimeProvider::default())
        .with_timeout(Some(timeout))
        .build();
    let Ok((mut client, bg)) = Client::connect(conn).await else {
        return false;
    };
    tokio::spawn(bg);
    match client.query(name.clone(), DNSClass::IN, RecordType::A).await {
        Ok(resp) => !resp.answers().is_empty(),
        Err(e) => {
            trace!("{} via {}: {}", name, resolver, e);
            false
        }
    }
}

pub fn write_findings<W: Write>(writer: &mut W, findings: &[Finding]) -> io::Result<()> {
    for finding in findings {
        serde_json::to_writer(&mut *writer, finding)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
