//! Change streams.
//!
//! An attached stream compiles its schema once into a prepared per-row
//! filter query (`WHERE id = $1 AND <filter>`) that is re-run for every
//! change notification, so attachment cost is paid once and per-change cost
//! is a single indexed lookup. The write path calls [`PostgresStreamer::notify`]
//! after each insert/update.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use pactdb_storage::{
    Change, ChangeStream, ChangeStreamer, ChangeType, Database, QueryOptions, StorageError,
};

use crate::backend::{postprocess_payload, PostgresBackend};

struct Attachment {
    /// Prepared per-row query, parameterized by the changed row's id.
    row_query: String,
    sender: mpsc::UnboundedSender<Change>,
}

/// Dispatches contract changes to attached streams.
pub struct PostgresStreamer {
    backend: Arc<PostgresBackend>,
    attachments: Arc<Mutex<Vec<Attachment>>>,
}

impl PostgresStreamer {
    pub fn new(backend: Arc<PostgresBackend>) -> Self {
        Self {
            backend,
            attachments: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Evaluate a change against every attachment and emit it where the
    /// changed row satisfies the attachment's filter.
    pub async fn notify(
        &self,
        before: Option<Value>,
        id: Uuid,
        change_type: ChangeType,
    ) -> Result<(), StorageError> {
        let mut attachments = self.attachments.lock().await;
        let mut matched = 0usize;
        for attachment in attachments.iter() {
            let rows = self
                .backend
                .any(&attachment.row_query, &[json!(id.to_string())])
                .await?;
            let Some(row) = rows.into_iter().next() else {
                continue;
            };
            let Some(mut after) = row.get("payload").cloned() else {
                continue;
            };
            postprocess_payload(&mut after);
            let change = Change {
                change_type,
                before: before.clone(),
                after,
            };
            // A closed receiver just means the stream went away.
            if attachment.sender.send(change).is_ok() {
                matched += 1;
            }
        }
        attachments.retain(|attachment| !attachment.sender.is_closed());
        debug!(%id, matched, "change dispatched");
        Ok(())
    }
}

#[async_trait]
impl ChangeStreamer for PostgresStreamer {
    async fn attach(
        &self,
        select: Value,
        schema: Value,
        _options: QueryOptions,
    ) -> Result<Box<dyn ChangeStream>, StorageError> {
        let row_query = pactdb_query::compile_row_query(&select, &schema)
            .map_err(|e| StorageError::internal(e.to_string()))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.attachments
            .lock()
            .await
            .push(Attachment { row_query, sender });
        Ok(Box::new(PostgresStream {
            receiver: Some(receiver),
        }))
    }

    async fn close(&self) {
        self.attachments.lock().await.clear();
    }
}

/// One attached stream; changes arrive in notification order.
pub struct PostgresStream {
    receiver: Option<mpsc::UnboundedReceiver<Change>>,
}

#[async_trait]
impl ChangeStream for PostgresStream {
    async fn next_change(&mut self) -> Option<Change> {
        self.receiver.as_mut()?.recv().await
    }

    async fn close(&mut self) {
        self.receiver = None;
    }
}
