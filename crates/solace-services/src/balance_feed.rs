//! Live balance feed
//!
//! Bridges committed wallet snapshots (published to Redis by the settlement
//! and crediting paths) into per-session `watch` channels. A chat session
//! subscribes so that depletion by another session or device terminates it
//! within a bounded delay.

use solace_core::models::Wallet;
use solace_cache::RedisCache;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// How often the feed polls for a fresh snapshot
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Live balance feed over the cache fan-out
pub struct BalanceFeed {
    cache: RedisCache,
    watchers: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl BalanceFeed {
    /// Create a new feed
    pub fn new(cache: RedisCache) -> Self {
        Self {
            cache,
            watchers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start watching a user's balance
    ///
    /// The receiver starts at `initial` and is updated with every observed
    /// snapshot. The watcher task stops itself once every receiver is
    /// dropped.
    pub async fn start_watch(&self, user_id: &str, initial: Wallet) -> watch::Receiver<Wallet> {
        let (tx, rx) = watch::channel(initial);
        let cache = self.cache.clone();
        let user = user_id.to_string();

        info!("Starting balance watch for user {}", user);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;

                if tx.is_closed() {
                    debug!("Balance watch for {} has no receivers, stopping", user);
                    break;
                }

                match cache.wallet_snapshot(&user).await {
                    Ok(Some(wallet)) => {
                        if tx.send(wallet).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Cache trouble must not kill a live session.
                        warn!("Balance watch poll failed for {}: {}", user, e);
                    }
                }
            }
        });

        let mut watchers = self.watchers.write().await;
        if let Some(old) = watchers.insert(user_id.to_string(), handle) {
            old.abort();
        }

        rx
    }

    /// Stop watching a user's balance
    pub async fn stop_watch(&self, user_id: &str) {
        let mut watchers = self.watchers.write().await;
        if let Some(handle) = watchers.remove(user_id) {
            handle.abort();
            info!("Stopped balance watch for user {}", user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use solace_cache::keys;

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_feed_observes_published_snapshot() {
        let cache = RedisCache::new("redis://127.0.0.1:6379").await.unwrap();
        let feed = BalanceFeed::new(cache.clone());

        let initial = Wallet::new("feed-user".to_string(), 5);
        let mut rx = feed.start_watch("feed-user", initial).await;

        let mut depleted = Wallet::new("feed-user".to_string(), 5);
        depleted.tokens = dec!(1.5);
        cache
            .set(&keys::wallet_key("feed-user"), &depleted, 60)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.borrow().tokens, dec!(1.5));

        feed.stop_watch("feed-user").await;
    }
}
