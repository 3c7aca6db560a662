//! # Runtime Feed
//!
//! NDJSON records through the runtime container: JSON-pointer capabilities,
//! subtype resolution and the release sink's output order.

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use sequencer_core::SequencingDocument;
    use sequencer_runtime::{feed, JsonMessage, ReleaseSink, RuntimeConfig, SequencerContainer};
    use std::io::Write;
    use std::sync::Arc;

    const ORDERS: &str = r#"{
        "default_cluster": "primary",
        "sequences": [ { "name": "orders", "retention_period": "60m",
            "message_types": [
                { "type": "OrderPlaced", "context_id_extractor": "/order/id" },
                { "type": "Payment.CARD", "context_id_extractor": "/order/id",
                  "release_condition": { "predecessor": "OrderPlaced" } },
                { "type": "Payment.WIRE", "context_id_extractor": "/order/id",
                  "release_condition": { "predecessor": "OrderPlaced" } },
                { "type": "OrderShipped", "topic": "shipping", "context_id_extractor": "/order/id",
                  "release_condition": { "and": [ { "predecessor": "Payment.CARD" },
                                                  { "predecessor": "Payment.WIRE" } ] } }
            ] } ],
        "subtype_resolvers": { "Payment": { "resolver": "/method", "subtypes": ["CARD", "WIRE"] } }
    }"#;

    /// Writer whose contents stay readable after being moved into the sink.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn released(&self) -> Vec<JsonMessage> {
            let bytes = self.0.lock().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn line(kind: &str, id: &str, order: &str, method: Option<&str>) -> String {
        let mut body = serde_json::json!({ "order": { "id": order } });
        if let Some(method) = method {
            body["method"] = serde_json::json!(method);
        }
        serde_json::json!({ "message": { "type": kind, "id": id, "body": body } }).to_string()
    }

    #[tokio::test]
    async fn test_out_of_order_feed_is_released_in_order() {
        let output = SharedBuffer::default();
        let document = SequencingDocument::from_json_str(ORDERS).unwrap();
        let container = SequencerContainer::from_document(
            RuntimeConfig::default(),
            &document,
            Arc::new(ReleaseSink::new(output.clone())),
        )
        .unwrap();

        let input = [
            line("OrderShipped", "ship-1", "o-1", None),
            line("Payment", "pay-wire", "o-1", Some("WIRE")),
            line("OrderPlaced", "placed-2", "o-2", None),
            line("Payment", "pay-card", "o-1", Some("CARD")),
            line("OrderPlaced", "placed-1", "o-1", None),
        ]
        .join("\n");

        let summary = feed(
            input.as_bytes(),
            container.service.inbox().as_ref(),
            container.sink.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(summary.buffered, 3);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.acknowledged, 5);

        let order_one: Vec<String> = output
            .released()
            .into_iter()
            .filter(|m| m.body.pointer("/order/id").and_then(|v| v.as_str()) == Some("o-1"))
            .map(|m| m.id)
            .collect();
        assert_eq!(order_one, vec!["placed-1", "pay-wire", "pay-card", "ship-1"]);
    }
}
