use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;

use crate::context::{CallContext, DEFAULT_CALL_BUDGET};
use crate::error::PublishError;
use crate::gateway::EventPublisher;

/// Publishes JSON payloads over Redis pub/sub. Delivery is at-most-once:
/// subscribers that are not connected when the message is sent miss it.
pub struct RedisPublisher {
    client: redis::Client,
    call_budget: Duration,
}

impl RedisPublisher {
    pub fn new(connection_url: &str) -> Result<Self, PublishError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| PublishError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            call_budget: DEFAULT_CALL_BUDGET,
        })
    }

    pub fn with_call_budget(mut self, budget: Duration) -> Self {
        self.call_budget = budget;
        self
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(
        &self,
        ctx: &CallContext,
        channel: &str,
        payload: Value,
    ) -> Result<(), PublishError> {
        let body =
            serde_json::to_string(&payload).map_err(|e| PublishError::Serialization(e.to_string()))?;

        ctx.run(self.call_budget, async {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| PublishError::Connection(e.to_string()))?;
            let receivers: i64 = conn
                .publish(channel, body)
                .await
                .map_err(|e| PublishError::Connection(e.to_string()))?;
            tracing::trace!(channel, receivers, "event published");
            Ok::<(), PublishError>(())
        })
        .await
        .map_err(|_| PublishError::Timeout)?
    }
}
