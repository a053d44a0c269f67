use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::context::{CallContext, DEFAULT_CALL_BUDGET};
use crate::error::CacheError;
use crate::gateway::CacheGateway;

/// Redis-backed cache gateway.
pub struct RedisCache {
    client: redis::Client,
    call_budget: Duration,
}

impl RedisCache {
    pub fn new(connection_url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(connection_url).map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            call_budget: DEFAULT_CALL_BUDGET,
        })
    }

    pub fn with_call_budget(mut self, budget: Duration) -> Self {
        self.call_budget = budget;
        self
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CacheGateway for RedisCache {
    async fn get(&self, ctx: &CallContext, key: &str) -> Result<Option<String>, CacheError> {
        ctx.run(self.call_budget, async {
            let mut conn = self.connection().await?;
            conn.get::<_, Option<String>>(key)
                .await
                .map_err(|e| CacheError::Connection(e.to_string()))
        })
        .await
        .map_err(|_| CacheError::Timeout)?
    }

    async fn set(
        &self,
        ctx: &CallContext,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        ctx.run(self.call_budget, async {
            let mut conn = self.connection().await?;
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| CacheError::Connection(e.to_string()))
        })
        .await
        .map_err(|_| CacheError::Timeout)?
    }

    async fn delete(&self, ctx: &CallContext, key: &str) -> Result<(), CacheError> {
        ctx.run(self.call_budget, async {
            let mut conn = self.connection().await?;
            conn.del::<_, ()>(key)
                .await
                .map_err(|e| CacheError::Connection(e.to_string()))
        })
        .await
        .map_err(|_| CacheError::Timeout)?
    }
}
