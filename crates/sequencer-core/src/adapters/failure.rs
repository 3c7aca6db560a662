use crate::domain::entities::{BufferedMessage, SequencedMessage};
use crate::ports::outbound::FailureReporter;
use async_trait::async_trait;
use tracing::warn;

/// Reports release failures to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFailureReporter;

#[async_trait]
impl FailureReporter for LoggingFailureReporter {
    async fn report(
        &self,
        message: &SequencedMessage,
        buffered: Option<&BufferedMessage>,
        cause: &str,
    ) {
        warn!(
            message_id = %message.id,
            instance_id = %message.sequence_instance_id,
            qualified_name = %message.qualified_name,
            idempotence_id = %message.idempotence_id,
            source = %message.sequenced_message_id,
            payload_bytes = buffered.map_or(0, |b| b.value.len()),
            cause,
            "Sequenced message failed"
        );
    }
}
