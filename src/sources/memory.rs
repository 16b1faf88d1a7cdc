//! Process-local request source backed by an unbounded flume channel.
//!
//! At-most-once: receiving removes the message, so a consumer crash loses
//! it. Restarts lose everything. Suitable for the synchronous deployment
//! mode and for tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::request::VectorizationRequest;

use super::{ReceivedRequest, RequestSource, SourceError};

struct QueuedMessage {
    message_id: String,
    request: VectorizationRequest,
}

/// Memory-backed [`RequestSource`].
pub struct MemoryRequestSource {
    name: String,
    tx: flume::Sender<QueuedMessage>,
    rx: flume::Receiver<QueuedMessage>,
}

impl MemoryRequestSource {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            name: name.into(),
            tx,
            rx,
        }
    }

    fn send(&self, message: QueuedMessage) -> Result<(), SourceError> {
        self.tx.send(message).map_err(|_| SourceError::Backend {
            source_name: self.name.clone(),
            message: "channel disconnected".to_string(),
        })
    }
}

#[async_trait]
impl RequestSource for MemoryRequestSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn has_requests(&self) -> Result<bool, SourceError> {
        Ok(!self.rx.is_empty())
    }

    async fn receive_requests(&self, count: usize) -> Result<Vec<ReceivedRequest>, SourceError> {
        let mut received = Vec::new();
        while received.len() < count {
            match self.rx.try_recv() {
                Ok(message) => received.push(ReceivedRequest {
                    request: message.request,
                    message_id: message.message_id,
                    // Receiving already removed the message; the receipt is
                    // only meaningful for durable sources.
                    pop_receipt: Uuid::new_v4().to_string(),
                    dequeue_count: 1,
                }),
                Err(_) => break,
            }
        }
        Ok(received)
    }

    async fn delete_request(
        &self,
        _message_id: &str,
        _pop_receipt: &str,
    ) -> Result<(), SourceError> {
        // At-most-once: the message left the queue at receive time.
        Ok(())
    }

    async fn submit_request(&self, request: &VectorizationRequest) -> Result<(), SourceError> {
        self.send(QueuedMessage {
            message_id: Uuid::new_v4().to_string(),
            request: request.clone(),
        })
    }

    async fn update_request(
        &self,
        message_id: &str,
        _pop_receipt: &str,
        request: &VectorizationRequest,
    ) -> Result<String, SourceError> {
        // Re-enqueue the updated request under the same message id so it is
        // delivered again.
        self.send(QueuedMessage {
            message_id: message_id.to_string(),
            request: request.clone(),
        })?;
        Ok(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ContentIdentifier;
    use crate::request::VectorizationStep;
    use crate::types::{ProcessingType, StepKind};

    fn request(tag: &str) -> VectorizationRequest {
        VectorizationRequest::new(
            ContentIdentifier::new("docs", vec![tag.to_string()], tag),
            ProcessingType::Asynchronous,
            vec![VectorizationStep::new(StepKind::Extract)],
        )
    }

    #[tokio::test]
    async fn fifo_and_short_receive() {
        let source = MemoryRequestSource::new("extract");
        for i in 0..5 {
            source.submit_request(&request(&format!("doc-{i}"))).await.unwrap();
        }

        let first = source.receive_requests(3).await.unwrap();
        assert_eq!(first.len(), 3);
        let ids: Vec<_> = first
            .iter()
            .map(|r| r.request.content_identifier.canonical_id.clone())
            .collect();
        assert_eq!(ids, vec!["doc-0", "doc-1", "doc-2"]);
        assert!(source.has_requests().await.unwrap());

        let rest = source.receive_requests(10).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(!source.has_requests().await.unwrap());
    }

    #[tokio::test]
    async fn at_most_once_without_delete() {
        let source = MemoryRequestSource::new("extract");
        source.submit_request(&request("doc")).await.unwrap();
        let received = source.receive_requests(1).await.unwrap();
        assert_eq!(received.len(), 1);
        // Never deleted, yet gone.
        assert!(!source.has_requests().await.unwrap());
        assert!(source.receive_requests(1).await.unwrap().is_empty());
    }
}
