use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::requests::ProgressEvent;

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log for one video job.
///
/// Every line carries `type`, `job_id` and `ts`; the caller's payload is merged
/// last and wins on key collisions. The file is opened on first use and kept
/// open for the writer's lifetime.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventLog>,
}

#[derive(Debug)]
struct EventLog {
    path: PathBuf,
    job_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, job_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLog {
                path: path.into(),
                job_id: job_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = EventPayload::from_iter([
            ("type".to_string(), Value::from(event_type)),
            ("job_id".to_string(), Value::from(self.inner.job_id.as_str())),
            ("ts".to_string(), Value::from(now_utc_iso())),
        ]);
        event.extend(payload);

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let mut file = self
            .inner
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if file.is_none() {
            *file = Some(self.inner.open()?);
        }
        let Some(file) = file.as_mut() else {
            return Err(anyhow!("event log {} is not open", self.inner.path.display()));
        };
        file.write_all(&line)
            .with_context(|| format!("failed appending to {}", self.inner.path.display()))?;

        Ok(Value::Object(event))
    }

    /// Records one progress notification as a `progress` event.
    pub fn emit_progress(&self, progress: &ProgressEvent) -> anyhow::Result<Value> {
        let payload = EventPayload::from_iter([
            ("phase".to_string(), Value::from(progress.phase.as_str())),
            ("message".to_string(), Value::from(progress.message.as_str())),
        ]);
        self.emit("progress", payload)
    }
}

impl EventLog {
    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening {}", self.path.display()))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
