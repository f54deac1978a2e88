// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared Redis counter using atomic INCR + EXPIRE per window key

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::backend::{BackendError, CounterBackend};
use super::window::Window;

/// Counter shared by every gateway instance pointed at the same Redis
pub struct RedisCounter {
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
    timeout: Duration,
}

impl RedisCounter {
    /// Parse the connection string. No connection is opened until first use.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        info!(timeout_ms = timeout.as_millis() as u64, "Redis rate-limit backend configured");
        Ok(Self {
            client,
            connection: RwLock::new(None),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, BackendError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        debug!("Opening Redis connection");
        let conn = tokio::time::timeout(self.timeout, self.client.get_connection_manager())
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))??;
        *guard = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl CounterBackend for RedisCounter {
    async fn increment(&self, identity: &str, window: Window) -> Result<u64, BackendError> {
        let key = window.key(identity);
        let ttl = window.seconds;

        let request = async {
            let mut conn = self.connection().await?;
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .cmd("INCR")
                .arg(&key)
                .cmd("EXPIRE")
                .arg(&key)
                .arg(ttl)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok::<u64, BackendError>(count)
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }

    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let request = async {
            let mut conn = self.connection().await?;
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<(), BackendError>(())
        };
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }
}
