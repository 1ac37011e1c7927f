use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::Path;

use serde::de::value::MapAccessDeserializer;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;
use tracing::debug;

use crate::error::BatchError;

/// One named group of root domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub domains: Vec<String>,
}

#[derive(Deserialize)]
struct RecordFields {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Domains", default, deserialize_with = "null_as_empty")]
    domains: Vec<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a record object with `name` and `domains`")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Record, A::Error> {
        let fields = RecordFields::deserialize(MapAccessDeserializer::new(map))?;
        Ok(Record {
            name: fields.name,
            domains: fields.domains,
        })
    }
}

// Objects only: the derived impl would also take `["name", [...]]`.
impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

impl Record {
    /// Checks that `name` can be joined onto the output directory without
    /// escaping it.
    pub fn check_name(&self) -> Result<(), BatchError> {
        let reason = if self.name.is_empty() {
            Some("empty")
        } else if self.name == "." || self.name == ".." {
            Some("refers to a directory")
        } else if self.name.contains(['/', '\\']) {
            Some("contains a path separator")
        } else if self.name.contains('\0') {
            Some("contains a NUL byte")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BatchError::UnsafeRecordName {
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Comma-joined domain list, order preserved.
    pub fn domain_list(&self) -> String {
        self.domains.join(",")
    }
}

/// Lazily decodes consecutive JSON records from a byte stream.
///
/// The first decoding error is reported with the 1-based position of the
/// offending record; callers are expected to stop there.
pub struct RecordStream<R: Read> {
    inner: StreamDeserializer<'static, IoRead<R>, Record>,
    position: usize,
}

impl RecordStream<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, BatchError> {
        let file = File::open(path).map_err(|source| BatchError::OpenInput {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Reading records from {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: serde_json::Deserializer::from_reader(reader).into_iter(),
            position: 0,
        }
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<Record, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        self.position += 1;
        let position = self.position;
        Some(item.map_err(|source| BatchError::MalformedRecord { position, source }))
    }
}

/// Receives records one at a time from [`drive`].
#[allow(async_fn_in_trait)]
pub trait RecordHandler {
    async fn handle(&mut self, record: Record) -> Result<ControlFlow<()>, BatchError>;
}

/// Feeds every record to `handler` until the stream ends, the handler asks to
/// stop, or an error occurs. Returns how many records were handled.
pub async fn drive<R, H>(stream: RecordStream<R>, handler: &mut H) -> Result<usize, BatchError>
where
    R: Read,
    H: RecordHandler,
{
    let mut handled = 0;
    for record in stream {
        let record = record?;
        handled += 1;
        if handler.handle(record).await?.is_break() {
            debug!("Handler stopped the stream after {} records", handled);
            break;
        }
    }
    Ok(handled)
}
