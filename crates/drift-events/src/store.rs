use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_stream::stream;
use async_trait::async_trait;
use drift_protocol::{
    ActivityEnvelope, EnvelopeSink, EnvelopeSource, EnvelopeStream, ProtocolError,
    ProtocolResult, SessionId, SourcedEnvelope, UnreadableRecord,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, instrument};

const LOG_DIR: &str = "activities";
const LOG_EXTENSION: &str = "jsonl";

/// One JSON envelope per line, one file per session.
///
/// Appends for a session are serialized through a per-session lock; the log
/// has a single writer.
#[derive(Debug)]
pub struct FileEnvelopeStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileEnvelopeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session ids may contain path separators, so file stems are hex-encoded.
    pub(crate) fn file_path(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(LOG_DIR).join(format!(
            "{}.{LOG_EXTENSION}",
            hex::encode(session_id.as_str())
        ))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create activity dir {parent:?}"))?;
        }
        Ok(())
    }

    fn lock_for(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.write_locks.lock();
        guard
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn parse_record(line_no: usize, line: &str) -> SourcedEnvelope {
        serde_json::from_str::<ActivityEnvelope>(line)
            .map(|envelope| (line_no, envelope))
            .map_err(|err| UnreadableRecord {
                line: line_no,
                message: err.to_string(),
            })
    }

    /// One physical line, with or without its terminator. Blank lines yield nothing.
    fn record_from_bytes(line_no: usize, raw: &[u8]) -> Option<SourcedEnvelope> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        match std::str::from_utf8(raw) {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(Self::parse_record(line_no, line)),
            Err(err) => Some(Err(UnreadableRecord {
                line: line_no,
                message: format!("record is not valid UTF-8: {err}"),
            })),
        }
    }

    #[instrument(skip(self, envelope), fields(session_id = %session_id, type_tag = %envelope.type_tag))]
    pub async fn append(&self, session_id: &SessionId, envelope: &ActivityEnvelope) -> Result<()> {
        if !envelope.is_well_formed() {
            bail!("refusing to append envelope {} with an empty typeTag", envelope.id);
        }

        let path = self.file_path(session_id);
        Self::ensure_parent(&path).await?;

        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed opening activity log {path:?}"))?;

        let mut line = serde_json::to_string(envelope).context("failed serializing envelope")?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!("envelope appended to log");
        Ok(())
    }

    /// Stream the records of a session in file order.
    ///
    /// A missing log is an empty stream. Each line is parsed independently; a
    /// line that is not UTF-8 or not a valid envelope is yielded as an
    /// [`UnreadableRecord`] and reading continues with the next line. Only a
    /// failing read of the file itself ends the stream early.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn stream(&self, session_id: &SessionId) -> Result<EnvelopeStream> {
        let path = self.file_path(session_id);
        let exists = fs::try_exists(&path)
            .await
            .with_context(|| format!("failed checking activity log {path:?}"))?;
        if !exists {
            return Ok(futures_util::stream::empty().boxed());
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .await
            .with_context(|| format!("failed opening activity log {path:?}"))?;

        let records = stream! {
            let mut reader = BufReader::new(file);
            let mut buf = Vec::new();
            let mut line_no = 0_usize;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        line_no += 1;
                        if let Some(record) = Self::record_from_bytes(line_no, &buf) {
                            yield record;
                        }
                    }
                    Err(err) => {
                        yield Err(UnreadableRecord {
                            line: line_no + 1,
                            message: err.to_string(),
                        });
                        break;
                    }
                }
            }
        };
        Ok(records.boxed())
    }

    /// Read every record of a session into memory.
    pub async fn read_records(&self, session_id: &SessionId) -> Result<Vec<SourcedEnvelope>> {
        let records = self.stream(session_id).await?;
        Ok(records.collect().await)
    }

    /// Sessions that have a log under this root, sorted by id.
    pub async fn session_ids(&self) -> Result<Vec<SessionId>> {
        let dir = self.root.join(LOG_DIR);
        let exists = fs::try_exists(&dir)
            .await
            .with_context(|| format!("failed checking activity dir {dir:?}"))?;
        if !exists {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed listing activity dir {dir:?}"))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Ok(bytes) = hex::decode(stem) else {
                continue;
            };
            if let Ok(raw) = String::from_utf8(bytes)
                && let Ok(id) = SessionId::parse(raw)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn io_error(err: anyhow::Error) -> ProtocolError {
    ProtocolError::Io(format!("{err:#}"))
}

#[async_trait]
impl EnvelopeSource for FileEnvelopeStore {
    async fn stream_envelopes(&self, session_id: &SessionId) -> ProtocolResult<EnvelopeStream> {
        self.stream(session_id).await.map_err(io_error)
    }
}

#[async_trait]
impl EnvelopeSink for FileEnvelopeStore {
    async fn append_envelope(
        &self,
        session_id: &SessionId,
        envelope: &ActivityEnvelope,
    ) -> ProtocolResult<()> {
        self.append(session_id, envelope).await.map_err(io_error)
    }
}
