use core_types::DEFAULT_RELAYS;
use nostr_sdk::prelude::Event;
use serde::{Deserialize, Serialize};
use slog as log;
use slog::Logger;
use tokio::time::Instant;
use xerror::nostr::RelayError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::relay::{RelayConnection, RelayConnector};

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_pause_ms() -> u64 {
    3000
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_quarantine_secs() -> u64 {
    5 * 60
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RelayPublisherSettings {
    /// Merged into every relay set. Empty means the built in bootstrap list.
    #[serde(default)]
    pub default_relays: Vec<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_quarantine_secs")]
    pub quarantine_secs: u64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Used for `.onion` relays only.
    #[serde(default)]
    pub tor_proxy_url: Option<String>,
}

impl Default for RelayPublisherSettings {
    fn default() -> Self {
        Self {
            default_relays: Vec::new(),
            max_attempts: default_max_attempts(),
            retry_pause_ms: default_retry_pause_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            quarantine_secs: default_quarantine_secs(),
            ack_timeout_ms: default_ack_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            tor_proxy_url: None,
        }
    }
}

impl RelayPublisherSettings {
    pub fn default_relays(&self) -> Vec<String> {
        if self.default_relays.is_empty() {
            return DEFAULT_RELAYS.iter().map(|relay| relay.to_string()).collect();
        }
        self.default_relays.clone()
    }
}

/// Strips trailing slashes, drops blanks and duplicates, then appends the
/// defaults not already present. First occurrence wins.
pub fn normalize_relays(relays: &[String], defaults: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for relay in relays.iter().chain(defaults) {
        let relay = relay.trim().trim_end_matches('/');
        if relay.is_empty() || normalized.iter().any(|known| known == relay) {
            continue;
        }
        normalized.push(relay.to_string());
    }
    normalized
}

/// Where one publish call ended up, per relay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    /// Quarantined relays that were not contacted.
    pub skipped: Vec<String>,
}

struct PooledConnection {
    connection: Arc<dyn RelayConnection>,
    last_used: Instant,
    in_flight: usize,
    generation: u64,
}

struct Lease {
    connection: Arc<dyn RelayConnection>,
    generation: u64,
}

enum Checkout {
    Reuse(Lease),
    Stale(PooledConnection),
    Missing,
}

enum Pooled {
    Existing(Lease),
    /// The replaced entry, if any, was idle.
    Inserted(u64, Option<PooledConnection>),
}

enum Reap {
    Closed(PooledConnection),
    Busy(Duration),
    Gone,
}

struct Inner {
    settings: RelayPublisherSettings,
    default_relays: Vec<String>,
    connector: Arc<dyn RelayConnector>,
    pool: Mutex<HashMap<String, PooledConnection>>,
    ignored: Mutex<HashMap<String, Instant>>,
    next_generation: AtomicU64,
    logger: Logger,
}

/// Broadcasts signed events to relays over pooled connections. Clones share
/// the pool and the ignore list.
#[derive(Clone)]
pub struct RelayPublisher {
    inner: Arc<Inner>,
}

impl RelayPublisher {
    pub fn new(settings: RelayPublisherSettings, connector: Arc<dyn RelayConnector>, logger: Logger) -> Self {
        let default_relays = settings.default_relays();
        Self {
            inner: Arc::new(Inner {
                settings,
                default_relays,
                connector,
                pool: Mutex::new(HashMap::new()),
                ignored: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                logger,
            }),
        }
    }

    pub fn normalize_relays(&self, relays: &[String]) -> Vec<String> {
        normalize_relays(relays, &self.inner.default_relays)
    }

    pub fn is_ignored(&self, relay: &str) -> bool {
        self.inner.is_ignored(relay)
    }

    /// Publishes `event` to every relay concurrently and waits for all of
    /// them. Failures are logged and reported, never returned.
    pub async fn publish(&self, event: &Event, relays: &[String]) -> PublishReport {
        let relays = self.normalize_relays(relays);
        let tasks = relays
            .into_iter()
            .map(|relay| {
                let inner = self.inner.clone();
                let event = event.clone();
                let target = relay.clone();
                let task = tokio::spawn(async move { inner.publish_to(&target, &event).await });
                (relay, task)
            })
            .collect::<Vec<_>>();

        let mut report = PublishReport::default();
        for (relay, task) in tasks {
            match task.await {
                Ok(Ok(())) => report.delivered.push(relay),
                Ok(Err(RelayError::Ignored(_))) => report.skipped.push(relay),
                Ok(Err(_)) => report.failed.push(relay),
                Err(err) => {
                    log::error!(self.inner.logger, "Publish task for {} failed: {}", relay, err);
                    report.failed.push(relay);
                }
            }
        }
        log::info!(
            self.inner.logger,
            "Published event {}: {} delivered, {} failed, {} skipped",
            event.id.to_hex(),
            report.delivered.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }
}

impl Inner {
    fn lock_pool(&self) -> MutexGuard<'_, HashMap<String, PooledConnection>> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_ignored(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.ignored.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.idle_timeout_secs)
    }

    fn is_ignored(&self, relay: &str) -> bool {
        let mut ignored = self.lock_ignored();
        let until = ignored.get(relay).copied();
        match until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                ignored.remove(relay);
                false
            }
            None => false,
        }
    }

    fn quarantine(&self, relay: &str) {
        let quarantine = Duration::from_secs(self.settings.quarantine_secs);
        self.lock_ignored().insert(relay.to_string(), Instant::now() + quarantine);
        log::warn!(self.logger, "Ignoring relay {} for {}s", relay, quarantine.as_secs());
    }

    async fn publish_to(self: &Arc<Self>, relay: &str, event: &Event) -> Result<(), RelayError> {
        if self.is_ignored(relay) {
            log::debug!(self.logger, "Skipping ignored relay {}", relay);
            return Err(RelayError::Ignored(relay.to_string()));
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(self.settings.retry_pause_ms)).await;
            }

            let lease = match self.acquire(relay).await {
                Ok(lease) => lease,
                Err(err) => {
                    log::warn!(self.logger, "{}", err);
                    self.quarantine(relay);
                    return Err(err);
                }
            };

            match lease.connection.publish(event).await {
                Ok(()) => {
                    self.release(relay, lease.generation);
                    log::debug!(self.logger, "Event {} accepted by {}", event.id.to_hex(), relay);
                    return Ok(());
                }
                Err(err @ RelayError::Rejected(_, _)) => {
                    self.release(relay, lease.generation);
                    log::warn!(self.logger, "{}", err);
                    return Err(err);
                }
                Err(err) => {
                    log::warn!(
                        self.logger,
                        "Attempt {}/{} to publish on {} failed: {}",
                        attempt,
                        max_attempts,
                        relay,
                        err
                    );
                    if err.is_transient() {
                        self.evict(relay, lease.generation).await;
                    } else {
                        self.release(relay, lease.generation);
                    }
                    last_error = Some(err);
                }
            }
        }

        self.quarantine(relay);
        Err(last_error.unwrap_or_else(|| RelayError::PublishFailed(relay.to_string(), "no attempt made".to_string())))
    }

    async fn acquire(self: &Arc<Self>, relay: &str) -> Result<Lease, RelayError> {
        match self.checkout(relay, Instant::now()) {
            Checkout::Reuse(lease) => return Ok(lease),
            Checkout::Stale(stale) => {
                log::debug!(self.logger, "Closing idle connection to {}", relay);
                stale.connection.close().await;
            }
            Checkout::Missing => {}
        }

        let connection = self.connector.connect(relay).await?;

        // Another publish may have pooled a connection to this relay while
        // this one was connecting. Only one of them stays in the pool.
        let pooled = {
            let mut pool = self.lock_pool();
            match self.reuse(&mut pool, relay, Instant::now()) {
                Some(lease) => Pooled::Existing(lease),
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let replaced = pool.insert(
                        relay.to_string(),
                        PooledConnection {
                            connection: connection.clone(),
                            last_used: Instant::now(),
                            in_flight: 1,
                            generation,
                        },
                    );
                    Pooled::Inserted(generation, replaced)
                }
            }
        };

        match pooled {
            Pooled::Existing(lease) => {
                log::debug!(self.logger, "Dropping duplicate connection to {}", relay);
                connection.close().await;
                Ok(lease)
            }
            Pooled::Inserted(generation, replaced) => {
                if let Some(replaced) = replaced {
                    replaced.connection.close().await;
                }
                self.spawn_reaper(relay.to_string(), generation);
                Ok(Lease { connection, generation })
            }
        }
    }

    /// Leases the pooled connection to `relay` if it is in use or has not
    /// been idle for the idle timeout.
    fn reuse(&self, pool: &mut HashMap<String, PooledConnection>, relay: &str, now: Instant) -> Option<Lease> {
        let entry = pool.get_mut(relay)?;
        if entry.in_flight == 0 && now.duration_since(entry.last_used) >= self.idle_timeout() {
            return None;
        }
        entry.in_flight += 1;
        entry.last_used = now;
        Some(Lease {
            connection: entry.connection.clone(),
            generation: entry.generation,
        })
    }

    fn checkout(&self, relay: &str, now: Instant) -> Checkout {
        let mut pool = self.lock_pool();
        if let Some(lease) = self.reuse(&mut pool, relay, now) {
            return Checkout::Reuse(lease);
        }
        pool.remove(relay).map_or(Checkout::Missing, Checkout::Stale)
    }

    fn release(&self, relay: &str, generation: u64) {
        let mut pool = self.lock_pool();
        if let Some(entry) = pool.get_mut(relay) {
            if entry.generation == generation {
                entry.in_flight = entry.in_flight.saturating_sub(1);
                entry.last_used = Instant::now();
            }
        }
    }

    async fn evict(&self, relay: &str, generation: u64) {
        let evicted = {
            let mut pool = self.lock_pool();
            match pool.get(relay) {
                Some(entry) if entry.generation == generation => pool.remove(relay),
                _ => None,
            }
        };
        if let Some(evicted) = evicted {
            log::debug!(self.logger, "Dropping broken connection to {}", relay);
            evicted.connection.close().await;
        }
    }

    fn reap(&self, relay: &str, generation: u64) -> Reap {
        let idle_timeout = self.idle_timeout();
        let mut pool = self.lock_pool();
        let remaining = match pool.get(relay) {
            Some(entry) if entry.generation != generation => return Reap::Gone,
            Some(entry) if entry.in_flight > 0 => return Reap::Busy(idle_timeout),
            Some(entry) => idle_timeout.saturating_sub(entry.last_used.elapsed()),
            None => return Reap::Gone,
        };
        if !remaining.is_zero() {
            return Reap::Busy(remaining);
        }
        pool.remove(relay).map_or(Reap::Gone, Reap::Closed)
    }

    /// Closes the connection once it sat unused for the idle timeout.
    fn spawn_reaper(self: &Arc<Self>, relay: String, generation: u64) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let mut wait = self.idle_timeout();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(wait).await;
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => return,
                };
                match inner.reap(&relay, generation) {
                    Reap::Closed(entry) => {
                        log::debug!(inner.logger, "Closing idle connection to {}", relay);
                        entry.connection.close().await;
                        return;
                    }
                    Reap::Busy(remaining) => wait = remaining,
                    Reap::Gone => return,
                }
            }
        });
    }
}
