//! Scripted transport for tests and offline replay.

use futures::stream;

use super::{FinishReason, TransportError, TransportEvent, TransportStream};

/// A transport that replays a pre-scripted event sequence.
///
/// Events are yielded in the order they were added. Nothing stops a
/// script from containing several terminal signals; that is the point,
/// since the dedup machinery downstream is what has to cope.
///
/// # Examples
///
/// ```
/// use axon_core::transport::{FinishReason, ScriptedTransport, TransportEvent};
/// use futures::StreamExt;
///
/// # async fn example() {
/// let mut stream = ScriptedTransport::new()
///     .with_chunk("Hello ")
///     .with_chunk("world")
///     .with_finish(FinishReason::Stop)
///     .into_stream();
///
/// let first = stream.next().await.unwrap().unwrap();
/// assert_eq!(first, TransportEvent::Chunk("Hello ".to_string()));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    events: Vec<Result<TransportEvent, TransportError>>,
}

impl ScriptedTransport {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text delta.
    #[must_use]
    pub fn with_chunk(mut self, text: impl Into<String>) -> Self {
        self.events.push(Ok(TransportEvent::Chunk(text.into())));
        self
    }

    /// Append a finish-reason signal.
    #[must_use]
    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.events.push(Ok(TransportEvent::Finish(reason)));
        self
    }

    /// Append an end-of-stream sentinel.
    #[must_use]
    pub fn with_eos(mut self) -> Self {
        self.events.push(Ok(TransportEvent::Eos));
        self
    }

    /// Append a transport failure.
    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.events
            .push(Err(TransportError::Connection(message.into())));
        self
    }

    /// Consume the script as a transport stream.
    pub fn into_stream(self) -> TransportStream {
        Box::pin(stream::iter(self.events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_replayed_in_order() {
        let got: Vec<_> = ScriptedTransport::new()
            .with_chunk("a")
            .with_chunk("b")
            .with_finish(FinishReason::Stop)
            .with_eos()
            .into_stream()
            .collect()
            .await;

        assert_eq!(got.len(), 4);
        assert_eq!(
            got[0].as_ref().unwrap(),
            &TransportEvent::Chunk("a".to_string())
        );
        assert_eq!(
            got[2].as_ref().unwrap(),
            &TransportEvent::Finish(FinishReason::Stop)
        );
        assert_eq!(got[3].as_ref().unwrap(), &TransportEvent::Eos);
    }

    #[tokio::test]
    async fn test_failure_yields_error_item() {
        let got: Vec<_> = ScriptedTransport::new()
            .with_failure("connection reset")
            .into_stream()
            .collect()
            .await;

        assert_eq!(got.len(), 1);
        assert!(matches!(
            &got[0],
            Err(TransportError::Connection(msg)) if msg == "connection reset"
        ));
    }

    #[tokio::test]
    async fn test_empty_script_ends_immediately() {
        let got: Vec<_> = ScriptedTransport::new().into_stream().collect().await;
        assert!(got.is_empty());
    }
}
