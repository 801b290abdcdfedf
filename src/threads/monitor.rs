//! Live monitoring of one thread over a conversation's update stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio_stream::Stream;

use super::correlate::{DecoratedMessage, ThreadCorrelator};
use crate::protocol::thread_id::ThreadIdentifier;
use crate::transport::MessageStream;

/// Cooperative cancellation flag for a [`ThreadMonitor`].
///
/// Checked once per received event, never preemptively: an event already
/// being processed completes before the monitor ends.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Lazy, unbounded, non-restartable sequence of decorated messages for one
/// thread. Non-matching and undecodable events are skipped without surfacing
/// an error.
pub struct ThreadMonitor {
    thread_id: ThreadIdentifier,
    correlator: ThreadCorrelator,
    source: MessageStream,
    token: CancelToken,
}

impl ThreadMonitor {
    pub fn new(
        thread_id: ThreadIdentifier,
        correlator: ThreadCorrelator,
        source: MessageStream,
        token: CancelToken,
    ) -> Self {
        Self {
            thread_id,
            correlator,
            source,
            token,
        }
    }
}

impl Stream for ThreadMonitor {
    type Item = DecoratedMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.token.is_cancelled() {
                return Poll::Ready(None);
            }
            match this.source.as_mut().poll_next(cx) {
                Poll::Ready(Some(raw)) => {
                    if let Some(decorated) = this.correlator.decorate(&raw) {
                        if decorated.data.thread_id.matches(&this.thread_id) {
                            return Poll::Ready(Some(decorated));
                        }
                    }
                    // Non-match: keep draining until the source suspends.
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::ContentCodec;
    use crate::protocol::envelope::MessageEnvelope;
    use crate::transport::{DeliveryStatus, TransportMessage};
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_stream::StreamExt;

    fn raw(envelope: &MessageEnvelope, codec: &ContentCodec) -> TransportMessage {
        let encoded = codec.encode(envelope).unwrap();
        TransportMessage {
            id: "msg-1".into(),
            sender_inbox_id: "inbox-peer".into(),
            recipient_inbox_id: "inbox-self".into(),
            sent_at: Utc::now(),
            delivery_status: DeliveryStatus::Published,
            content_type: encoded.content_type,
            content: encoded.content,
            fallback: encoded.fallback,
        }
    }

    fn monitor_over_channel(
        thread_id: ThreadIdentifier,
    ) -> (mpsc::Sender<TransportMessage>, ThreadMonitor) {
        let (tx, rx) = mpsc::channel(16);
        let monitor = ThreadMonitor::new(
            thread_id,
            ThreadCorrelator::new("mainnet-0xabc"),
            Box::pin(ReceiverStream::new(rx)),
            CancelToken::new(),
        );
        (tx, monitor)
    }

    #[tokio::test]
    async fn test_yields_only_matching_thread_events() {
        let codec = ContentCodec::new("mainnet-0xabc");
        let wanted = ThreadIdentifier::new("27", "8", "4");
        let other = ThreadIdentifier::new("28", "8", "4");
        let (tx, mut monitor) = monitor_over_channel(wanted.clone());

        tx.send(raw(&MessageEnvelope::string(other, "skip"), &codec))
            .await
            .unwrap();
        tx.send(raw(&MessageEnvelope::string(wanted.clone(), "match"), &codec))
            .await
            .unwrap();
        drop(tx);

        let first = monitor.next().await.expect("one matching event");
        assert_eq!(first.data, MessageEnvelope::string(wanted, "match"));
        assert!(monitor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_events_are_skipped() {
        let codec = ContentCodec::new("mainnet-0xabc");
        let wanted = ThreadIdentifier::new("27", "8", "4");
        let (tx, mut monitor) = monitor_over_channel(wanted.clone());

        let mut corrupt = raw(&MessageEnvelope::string(wanted.clone(), "x"), &codec);
        corrupt.content = b"garbage".to_vec();
        tx.send(corrupt).await.unwrap();
        tx.send(raw(&MessageEnvelope::string(wanted.clone(), "ok"), &codec))
            .await
            .unwrap();
        drop(tx);

        let event = monitor.next().await.expect("corrupt event skipped");
        assert_eq!(event.data, MessageEnvelope::string(wanted, "ok"));
    }

    #[tokio::test]
    async fn test_cancellation_ends_the_sequence() {
        let codec = ContentCodec::new("mainnet-0xabc");
        let wanted = ThreadIdentifier::new("27", "8", "4");
        let (tx, rx) = mpsc::channel(16);
        let token = CancelToken::new();
        let mut monitor = ThreadMonitor::new(
            wanted.clone(),
            ThreadCorrelator::new("mainnet-0xabc"),
            Box::pin(ReceiverStream::new(rx)),
            token.clone(),
        );

        tx.send(raw(&MessageEnvelope::string(wanted.clone(), "before"), &codec))
            .await
            .unwrap();
        assert!(monitor.next().await.is_some());

        token.cancel();
        tx.send(raw(&MessageEnvelope::string(wanted, "after"), &codec))
            .await
            .unwrap();
        assert!(monitor.next().await.is_none());
    }
}
