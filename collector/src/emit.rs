use crate::checkpoint::CheckpointStore;
use crate::model::{Event, Message};
use async_trait::async_trait;
use collector_core::Result;
use futures::{Stream, TryStreamExt};
use std::io::Write;
use tracing::instrument;

/// Downstream transport for collected events. The host process decides what
/// "durably recorded" means; the emitter only cares that a write either
/// succeeded or failed.
#[async_trait]
pub trait EventSink: Send {
    async fn write_event(&mut self, event: &Event) -> Result<()>;
}

/// NDJSON on stdout, one event per line. This is the transport when the
/// collector runs under a host that tails its output.
pub struct StdoutSink;

#[async_trait]
impl EventSink for StdoutSink {
    async fn write_event(&mut self, event: &Event) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer(&mut stdout, event)?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Drains a message stream into a sink, advancing the checkpoint after
/// every written event.
pub struct Emitter {
    checkpoints: CheckpointStore,
}

impl Emitter {
    pub fn new(checkpoints: CheckpointStore) -> Self {
        Self { checkpoints }
    }

    /// Write each record to the sink tagged with its input and its own
    /// `date`, then persist that `date` as the new checkpoint. Checkpointing
    /// per record (not per page or per run) bounds duplicate re-delivery
    /// after a crash to the single record whose checkpoint write was lost.
    #[instrument(skip(self, messages, sink))]
    pub async fn emit<S>(
        &self,
        messages: S,
        input_identity: &str,
        sink: &mut dyn EventSink,
    ) -> Result<u64>
    where
        S: Stream<Item = Result<Message>>,
    {
        futures::pin_mut!(messages);
        let mut emitted = 0u64;

        while let Some(message) = messages.try_next().await? {
            let logical_time = message.logical_time()?;
            let event = Event::from_message(input_identity, &message)?;

            sink.write_event(&event).await?;
            self.checkpoints.write(input_identity, logical_time)?;

            metrics::counter!("collector_events_emitted").increment(1);
            emitted += 1;
        }

        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use collector_core::Error;
    use pretty_assertions::assert_eq;

    pub(crate) struct VecSink {
        pub events: Vec<Event>,
        pub fail_after: Option<usize>,
    }

    impl VecSink {
        pub fn new() -> Self {
            Self {
                events: Vec::new(),
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl EventSink for VecSink {
        async fn write_event(&mut self, event: &Event) -> Result<()> {
            if let Some(limit) = self.fail_after {
                if self.events.len() >= limit {
                    return Err(Error::Internal("sink closed".into()));
                }
            }
            self.events.push(event.clone());
            Ok(())
        }
    }

    fn msg(date: &str) -> Message {
        serde_json::from_value(serde_json::json!({ "date": date, "kind": "phish" })).unwrap()
    }

    fn fixture() -> (tempfile::TempDir, Emitter, CheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        (dir, Emitter::new(store.clone()), store)
    }

    #[tokio::test]
    async fn writes_events_and_advances_checkpoint() {
        let (_dir, emitter, store) = fixture();
        let mut sink = VecSink::new();
        let messages = futures::stream::iter(vec![
            Ok(msg("2023-01-01T00:05:00+00:00")),
            Ok(msg("2023-01-01T00:06:00+00:00")),
        ]);

        let emitted = emitter
            .emit(messages, "cisco_phishing://prod", &mut sink)
            .await
            .unwrap();

        assert_eq!(emitted, 2);
        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0].source, "cisco_phishing://prod");
        assert_eq!(sink.events[0].time, "2023-01-01T00:05:00+00:00");
        assert_eq!(sink.events[1].data["kind"], "phish");
        assert_eq!(
            store.read("cisco_phishing://prod").unwrap(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 6, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn empty_stream_leaves_checkpoint_untouched() {
        let (_dir, emitter, store) = fixture();
        let mut sink = VecSink::new();
        let messages = futures::stream::iter(Vec::<Result<Message>>::new());

        let emitted = emitter
            .emit(messages, "cisco_phishing://prod", &mut sink)
            .await
            .unwrap();

        assert_eq!(emitted, 0);
        assert_eq!(store.read("cisco_phishing://prod").unwrap(), None);
    }

    #[tokio::test]
    async fn sink_failure_keeps_checkpoint_at_last_written_event() {
        let (_dir, emitter, store) = fixture();
        let mut sink = VecSink::new();
        sink.fail_after = Some(1);
        let messages = futures::stream::iter(vec![
            Ok(msg("2023-01-01T00:05:00+00:00")),
            Ok(msg("2023-01-01T00:06:00+00:00")),
        ]);

        let result = emitter
            .emit(messages, "cisco_phishing://prod", &mut sink)
            .await;

        assert!(result.is_err());
        assert_eq!(sink.events.len(), 1);
        // The failed record was never checkpointed; next run re-fetches it.
        assert_eq!(
            store.read("cisco_phishing://prod").unwrap(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 5, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn stream_error_stops_emission_after_checkpointed_prefix() {
        let (_dir, emitter, store) = fixture();
        let mut sink = VecSink::new();
        let messages = futures::stream::iter(vec![
            Ok(msg("2023-01-01T00:05:00+00:00")),
            Err(Error::Service {
                status: 503,
                details: "remote gone".into(),
            }),
        ]);

        let result = emitter
            .emit(messages, "cisco_phishing://prod", &mut sink)
            .await;

        assert!(matches!(result, Err(Error::Service { status: 503, .. })));
        assert_eq!(sink.events.len(), 1);
        assert_eq!(
            store.read("cisco_phishing://prod").unwrap(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 5, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn unparsable_record_date_fails_before_the_sink_write() {
        let (_dir, emitter, store) = fixture();
        let mut sink = VecSink::new();
        let messages = futures::stream::iter(vec![Ok(msg("not-a-date"))]);

        let result = emitter
            .emit(messages, "cisco_phishing://prod", &mut sink)
            .await;

        assert!(result.is_err());
        assert!(sink.events.is_empty());
        assert_eq!(store.read("cisco_phishing://prod").unwrap(), None);
    }
}
