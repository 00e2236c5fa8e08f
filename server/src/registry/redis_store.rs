//! Redis-backed registry store and its connectivity supervisor.
//!
//! The multiplexed connection does not heal itself once the socket drops, so a
//! supervisor task owns the link: it connects with a bounded number of
//! attempts, watches for loss (periodic `PING`, or a command reporting a dropped
//! connection) and reconnects. When every attempt fails it returns the fatal
//! error and the process is expected to exit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, FromRedisValue, RedisConnectionInfo};
use tokio::sync::{watch, Notify};

use super::store::{RegistryStore, ScanPage, StoreStatus};
use crate::error::RegistryError;

/// Bounded-retry policy for (re)establishing the store connection.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub health_check_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(1),
            health_check_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
enum Link {
    Up(MultiplexedConnection),
    Down,
}

pub struct RedisStore {
    client: Client,
    link: watch::Sender<Link>,
    lost: Notify,
    call_timeout: Duration,
}

impl RedisStore {
    /// Build a store for `host:port`. No connection is made until [`connect`](Self::connect).
    pub fn new(
        host: &str,
        port: u16,
        password: Option<String>,
        call_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo {
                db: 0,
                username: None,
                password,
            },
        };
        let client = Client::open(info)?;
        let (link, _) = watch::channel(Link::Down);

        Ok(Self {
            client,
            link,
            lost: Notify::new(),
            call_timeout,
        })
    }

    /// Establish the link, trying at most `policy.max_attempts` times with
    /// `policy.delay` between attempts.
    pub async fn connect(&self, policy: &ReconnectPolicy) -> Result<(), RegistryError> {
        for attempt in 1..=policy.max_attempts {
            tracing::info!(
                attempt,
                max_attempts = policy.max_attempts,
                "Connecting to registry store"
            );

            match self.open_connection().await {
                Ok(conn) => {
                    self.link.send_replace(Link::Up(conn));
                    tracing::info!(attempt, "Connected to registry store");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Registry store connection attempt failed");
                }
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(RegistryError::Unavailable {
            attempts: policy.max_attempts,
        })
    }

    /// Watch the link and reconnect whenever it is lost.
    ///
    /// Only returns once a reconnect has exhausted its attempts; the returned
    /// error is terminal for the process.
    pub async fn supervise(self: Arc<Self>, policy: ReconnectPolicy) -> RegistryError {
        loop {
            tokio::select! {
                _ = self.lost.notified() => {}
                _ = tokio::time::sleep(policy.health_check_interval) => {
                    match self.ping().await {
                        Ok(()) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "Registry store health check failed");
                        }
                    }
                }
            }

            self.link.send_replace(Link::Down);
            tracing::warn!("Connection to registry store closed, reconnecting");

            if let Err(e) = self.connect(&policy).await {
                tracing::error!(
                    max_attempts = policy.max_attempts,
                    "Maximum registry store reconnect attempts reached"
                );
                return e;
            }
        }
    }

    async fn open_connection(&self) -> Result<MultiplexedConnection, RegistryError> {
        let mut conn = tokio::time::timeout(
            self.call_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| RegistryError::Timeout(self.call_timeout))??;

        // A fresh socket is only usable once the server answers (AUTH included)
        tokio::time::timeout(
            self.call_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        .map_err(|_| RegistryError::Timeout(self.call_timeout))??;

        Ok(conn)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        let _: String = self.run(redis::cmd("PING")).await?;
        Ok(())
    }

    fn connection(&self) -> Result<MultiplexedConnection, RegistryError> {
        match &*self.link.borrow() {
            Link::Up(conn) => Ok(conn.clone()),
            Link::Down => Err(RegistryError::Disconnected),
        }
    }

    /// Run one command against the current link, bounded by the call timeout.
    async fn run<T: FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T, RegistryError> {
        let mut conn = self.connection()?;

        match tokio::time::timeout(self.call_timeout, cmd.query_async::<_, T>(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = RegistryError::from(e);
                if err.is_connection_lost() {
                    self.lost.notify_one();
                }
                Err(err)
            }
            Err(_) => Err(RegistryError::Timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl RegistryStore for RedisStore {
    async fn add_member(&self, key: &str, member: &str) -> Result<(), RegistryError> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), RegistryError> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(member);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>, RegistryError> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, RegistryError> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor.unwrap_or("0"))
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);
        let (next, keys): (String, Vec<String>) = self.run(cmd).await?;

        Ok(ScanPage {
            keys,
            next: (next != "0").then_some(next),
        })
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, RegistryError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.run(cmd).await
    }

    fn status(&self) -> StoreStatus {
        match &*self.link.borrow() {
            Link::Up(_) => StoreStatus::Connected,
            Link::Down => StoreStatus::Reconnecting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_store() -> RedisStore {
        // Port 1 on loopback refuses connections immediately
        RedisStore::new("127.0.0.1", 1, None, Duration::from_millis(200)).unwrap()
    }

    #[tokio::test]
    async fn test_commands_fail_fast_while_disconnected() {
        let store = unreachable_store();
        assert_eq!(store.status(), StoreStatus::Reconnecting);

        let result = store.add_member("wsid_1", "c1").await;
        assert!(matches!(result, Err(RegistryError::Disconnected)));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_bounded_attempts() {
        let store = unreachable_store();
        let policy = ReconnectPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
            health_check_interval: Duration::from_millis(10),
        };

        let result = store.connect(&policy).await;
        assert!(matches!(
            result,
            Err(RegistryError::Unavailable { attempts: 3 })
        ));
        assert_eq!(store.status(), StoreStatus::Reconnecting);
    }

    #[tokio::test]
    async fn test_supervisor_reports_fatal_loss() {
        let store = Arc::new(unreachable_store());
        let policy = ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
            health_check_interval: Duration::from_millis(10),
        };

        let fatal = tokio::time::timeout(Duration::from_secs(5), store.supervise(policy))
            .await
            .expect("supervisor should give up");
        assert!(matches!(fatal, RegistryError::Unavailable { attempts: 2 }));
    }
}
