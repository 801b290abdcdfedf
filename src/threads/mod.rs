//! Thread correlation engine and thread-level domain operations.

pub mod correlate;
pub mod monitor;

pub use correlate::{DecoratedMessage, Thread, ThreadCorrelator};
pub use monitor::{CancelToken, ThreadMonitor};

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::envelope::MessageEnvelope;
use crate::protocol::thread_id::ThreadIdentifier;
use crate::transport::{Conversation, MessageQuery, TransportClient};

/// Resolve the DM conversation with a counterparty identifier, if any.
async fn find_dm(
    client: &dyn TransportClient,
    counterparty: &str,
) -> Result<Option<Arc<dyn Conversation>>> {
    let Some(inbox_id) = client.inbox_id_by_identifier(counterparty).await? else {
        return Ok(None);
    };
    client.dm_by_inbox_id(&inbox_id).await
}

/// Build all threads across the given counterparties.
///
/// Counterparties without a DM conversation contribute no threads; they are
/// not an error for a listing call.
pub async fn list_threads(
    client: &dyn TransportClient,
    correlator: &ThreadCorrelator,
    counterparties: &[String],
    query: &MessageQuery,
) -> Result<Vec<Thread>> {
    let mut threads = Vec::new();
    for counterparty in counterparties {
        let Some(dm) = find_dm(client, counterparty).await? else {
            tracing::debug!(counterparty = %counterparty, "no dm conversation, skipping");
            continue;
        };
        let history = dm.messages(query).await?;
        threads.extend(correlator.build_threads(counterparty, &history));
    }
    Ok(threads)
}

/// Fetch one thread by identifier from one counterparty's history.
pub async fn get_thread(
    client: &dyn TransportClient,
    correlator: &ThreadCorrelator,
    thread_id: &ThreadIdentifier,
    counterparty: &str,
    query: &MessageQuery,
) -> Result<Thread> {
    let dm = find_dm(client, counterparty).await?.ok_or_else(|| {
        Error::NotFound(format!("no conversation with counterparty {counterparty}"))
    })?;
    let history = dm.messages(query).await?;
    correlator
        .get_thread(thread_id, counterparty, &history)
        .ok_or_else(|| Error::NotFound(format!("no thread for {thread_id}")))
}

/// Validate, encode, and send one envelope to a recipient identifier.
///
/// Malformed payloads fail fast with field-qualified messages before any
/// transport traffic happens.
pub async fn send_message(
    client: &dyn TransportClient,
    correlator: &ThreadCorrelator,
    envelope: &MessageEnvelope,
    recipient: &str,
) -> Result<String> {
    let encoded = correlator.codec().encode(envelope)?;

    let reachable = client.can_message(&[recipient.to_string()]).await?;
    if !reachable.get(recipient).copied().unwrap_or(false) {
        return Err(Error::Transport(format!(
            "recipient {recipient} is not reachable on this transport"
        )));
    }

    let dm = match find_dm(client, recipient).await? {
        Some(dm) => dm,
        None => client.new_dm_with_identifier(recipient).await?,
    };
    let message_id = dm.send(encoded).await?;
    tracing::info!(
        message_id = %message_id,
        thread = %envelope.thread_id,
        kind = envelope.content.kind(),
        "message sent"
    );
    Ok(message_id)
}

/// Subscribe to live updates for one thread with a counterparty.
pub async fn monitor_thread(
    client: &dyn TransportClient,
    protocol_env: &str,
    thread_id: ThreadIdentifier,
    counterparty: &str,
    token: CancelToken,
) -> Result<ThreadMonitor> {
    let dm = find_dm(client, counterparty).await?.ok_or_else(|| {
        Error::NotFound(format!("no conversation with counterparty {counterparty}"))
    })?;
    let source = dm.stream().await?;
    Ok(ThreadMonitor::new(
        thread_id,
        ThreadCorrelator::new(protocol_env),
        source,
        token,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportEnv;
    use crate::transport::memory::{identifier_for, MemoryNetwork};
    use crate::transport::{SignerMaterial, TransportFactory};
    use tokio_stream::StreamExt;

    const ENV: &str = "mainnet-0xabc";

    async fn setup() -> (
        Arc<dyn TransportClient>,
        Arc<dyn TransportClient>,
        String,
        String,
    ) {
        let network = MemoryNetwork::new();
        let buyer_signer = SignerMaterial::new("0x01");
        let seller_signer = SignerMaterial::new("0x02");
        let buyer = network
            .create_client(&buyer_signer, ENV, TransportEnv::Local)
            .await
            .unwrap();
        let seller = network
            .create_client(&seller_signer, ENV, TransportEnv::Local)
            .await
            .unwrap();
        (
            buyer,
            seller,
            identifier_for(&buyer_signer),
            identifier_for(&seller_signer),
        )
    }

    #[tokio::test]
    async fn test_send_then_list_and_get() {
        let (buyer, seller, buyer_id, seller_id) = setup().await;
        let correlator = ThreadCorrelator::new(ENV);
        let thread_a = ThreadIdentifier::new("27", "8", "4");
        let thread_b = ThreadIdentifier::new("28", "8", "4");

        send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(thread_a.clone(), "hi"),
            &seller_id,
        )
        .await
        .unwrap();
        send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(thread_b, "other thread"),
            &seller_id,
        )
        .await
        .unwrap();

        let threads = list_threads(
            seller.as_ref(),
            &correlator,
            &[buyer_id.clone()],
            &MessageQuery::default(),
        )
        .await
        .unwrap();
        assert_eq!(threads.len(), 2);

        let thread = get_thread(
            seller.as_ref(),
            &correlator,
            &thread_a,
            &buyer_id,
            &MessageQuery::default(),
        )
        .await
        .unwrap();
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(
            thread.messages[0].data,
            MessageEnvelope::string(thread_a, "hi")
        );
    }

    #[tokio::test]
    async fn test_get_thread_not_found_is_normal() {
        let (buyer, _seller, _buyer_id, seller_id) = setup().await;
        let correlator = ThreadCorrelator::new(ENV);

        let err = get_thread(
            buyer.as_ref(),
            &correlator,
            &ThreadIdentifier::new("27", "8", "4"),
            &seller_id,
            &MessageQuery::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_send_rejects_unreachable_recipient() {
        let (buyer, _seller, _buyer_id, _seller_id) = setup().await;
        let correlator = ThreadCorrelator::new(ENV);

        let err = send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(ThreadIdentifier::new("27", "8", "4"), "hi"),
            "0xnobody",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_fails_fast_on_invalid_payload() {
        let (buyer, _seller, _buyer_id, seller_id) = setup().await;
        let correlator = ThreadCorrelator::new(ENV);

        let err = send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(ThreadIdentifier::new("", "8", "4"), "hi"),
            &seller_id,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("threadId.exchangeId"));
    }

    #[tokio::test]
    async fn test_monitor_thread_streams_matching_messages() {
        let (buyer, seller, buyer_id, seller_id) = setup().await;
        let correlator = ThreadCorrelator::new(ENV);
        let thread_id = ThreadIdentifier::new("27", "8", "4");

        // Establish the conversation before subscribing.
        send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(thread_id.clone(), "opening"),
            &seller_id,
        )
        .await
        .unwrap();

        let token = CancelToken::new();
        let mut monitor = monitor_thread(
            seller.as_ref(),
            ENV,
            thread_id.clone(),
            &buyer_id,
            token.clone(),
        )
        .await
        .unwrap();

        send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(ThreadIdentifier::new("99", "8", "4"), "noise"),
            &seller_id,
        )
        .await
        .unwrap();
        send_message(
            buyer.as_ref(),
            &correlator,
            &MessageEnvelope::string(thread_id.clone(), "live"),
            &seller_id,
        )
        .await
        .unwrap();

        let event = monitor.next().await.expect("live event");
        assert_eq!(event.data, MessageEnvelope::string(thread_id, "live"));

        token.cancel();
        assert!(monitor.next().await.is_none());
    }
}
