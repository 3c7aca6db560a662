//! # NDJSON Feeder
//!
//! Reads one broker record per line and passes it to the inbox:
//!
//! ```json
//! {"topic": "orders", "partition": 0, "offset": 42, "key": "o-1",
//!  "headers": {"source": "web"},
//!  "message": {"type": "OrderPlaced", "id": "evt-1", "body": {"order": {"id": "o-1"}}}}
//! ```
//!
//! `topic` defaults to the message type, `offset` to the line number. Blank
//! lines are skipped; malformed lines are logged and counted as rejected.

use crate::message::JsonMessage;
use sequencer_core::{
    Acknowledgment, HandleOutcome, InboundRecord, MessageHandler, RecordHeader, SequencingApi,
    SequencingError,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct FeedLine {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    partition: i32,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    trace_context: Option<String>,
    message: JsonMessage,
}

impl FeedLine {
    fn into_record(self, line_number: i64) -> Result<(InboundRecord, JsonMessage), serde_json::Error> {
        let value = serde_json::to_vec(&self.message)?;
        let topic = self
            .topic
            .unwrap_or_else(|| self.message.message_type.clone());
        let key = self.key.unwrap_or_else(|| self.message.id.clone());

        let mut record = InboundRecord::new(topic, self.partition, self.offset.unwrap_or(line_number))
            .with_key(key.into_bytes())
            .with_value(value);
        for (name, value) in self.headers {
            record = record.with_header(RecordHeader::new(name, value.into_bytes()));
        }
        if let Some(trace_context) = self.trace_context {
            record = record.with_trace_context(trace_context);
        }
        Ok((record, self.message))
    }
}

/// Acknowledgment for a single line.
#[derive(Default)]
struct LineAck {
    acked: AtomicBool,
}

impl Acknowledgment for LineAck {
    fn acknowledge(&self) {
        self.acked.store(true, Ordering::SeqCst);
    }
}

/// Totals of one feed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub processed: usize,
    pub buffered: usize,
    pub duplicates: usize,
    pub bypassed: usize,
    /// Lines that could not be parsed or whose type is not configured.
    pub rejected: usize,
    /// Handler or store failures; the line was not acknowledged.
    pub failed: usize,
    pub acknowledged: usize,
}

impl FeedSummary {
    fn count(&mut self, outcome: HandleOutcome) {
        match outcome {
            HandleOutcome::Processed => self.processed += 1,
            HandleOutcome::Buffered => self.buffered += 1,
            HandleOutcome::Duplicate => self.duplicates += 1,
            HandleOutcome::Bypassed => self.bypassed += 1,
        }
    }
}

/// Feed every line of `reader` into `inbox` until EOF.
pub async fn feed<R>(
    reader: R,
    inbox: &dyn SequencingApi<JsonMessage>,
    handler: &dyn MessageHandler<JsonMessage>,
) -> std::io::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = FeedSummary::default();
    let mut line_number: i64 = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let parsed = serde_json::from_str::<FeedLine>(&line)
            .and_then(|feed_line| feed_line.into_record(line_number));
        let (record, message) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(line = line_number, error = %e, "Skipping malformed record");
                summary.rejected += 1;
                continue;
            }
        };

        let ack = LineAck::default();
        match inbox.handle(&record, &message, handler, &ack).await {
            Ok(outcome) => summary.count(outcome),
            Err(SequencingError::UnconfiguredType(qualified_name)) => {
                warn!(
                    line = line_number,
                    qualified_name = %qualified_name,
                    "Skipping record of unconfigured type"
                );
                summary.rejected += 1;
            }
            Err(SequencingError::Handler(e)) => {
                warn!(
                    line = line_number,
                    message_type = %message.message_type,
                    idempotence_id = %message.id,
                    error = %e,
                    "Handler failed; redeliver to retry"
                );
                summary.failed += 1;
            }
            Err(e) => {
                error!(line = line_number, message_id = %record.message_id(), error = %e, "Record failed");
                summary.failed += 1;
            }
        }
        if ack.acked.load(Ordering::SeqCst) {
            summary.acknowledged += 1;
        }
    }

    info!(
        processed = summary.processed,
        buffered = summary.buffered,
        duplicates = summary.duplicates,
        bypassed = summary.bypassed,
        rejected = summary.rejected,
        failed = summary.failed,
        "Input exhausted"
    );
    Ok(summary)
}
