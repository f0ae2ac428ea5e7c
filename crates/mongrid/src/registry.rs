//! Connection registry: one pool per `host:port`, initialized exactly once.
//!
//! Each key moves through a small state machine:
//!
//! ```text
//!                 acquire (first caller)
//!  Uninitialized ───────────────────────► Initializing ──ok──► Ready
//!        ▲                                   │                  │
//!        │ release                           └──err──► Failed   │
//!        └──────────────────────────────────────────────┴────────┘
//!                          (Failed: next acquire starts a new generation)
//! ```
//!
//! Only the caller that moves a key out of Uninitialized/Failed starts the
//! initializer. Everyone else arriving while it runs subscribes to the same
//! generation's completion channel and receives the same outcome. The
//! initializer runs in its own task, so dropping the caller that started it
//! does not strand the waiters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mongrid_core::{MongoConfig, PoolKey};
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connector::{ConnectOptions, Connector, MongoConnector};
use crate::error::{PoolError, PoolResult};
use crate::handle::Handle;

/// Observable state of one key's initialization guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    /// Never acquired, or released since.
    Uninitialized,
    /// An initializer is connecting and pinging.
    Initializing,
    /// A handle is cached.
    Ready,
    /// The last initialization failed; the next acquire retries.
    Failed,
}

type Outcome<P> = Result<Arc<Handle<P>>, PoolError>;

enum Slot<P> {
    Initializing {
        generation: u64,
        done: watch::Receiver<Option<Outcome<P>>>,
    },
    Ready(Arc<Handle<P>>),
    Failed {
        generation: u64,
        error: PoolError,
    },
}

impl<P> Slot<P> {
    fn state(&self) -> KeyState {
        match self {
            Slot::Initializing { .. } => KeyState::Initializing,
            Slot::Ready(_) => KeyState::Ready,
            Slot::Failed { .. } => KeyState::Failed,
        }
    }

    fn is_generation(&self, generation: u64) -> bool {
        matches!(self, Slot::Initializing { generation: g, .. } if *g == generation)
    }
}

struct Inner<C: Connector> {
    connector: C,
    slots: Mutex<HashMap<PoolKey, Slot<C::Pool>>>,
    next_generation: AtomicU64,
}

/// Registry of ready pools keyed by endpoint.
///
/// Cheap to clone; clones share the same entries. Construct one per
/// application (or per test) and pass it to whoever needs a handle.
pub struct ConnectionRegistry<C: Connector = MongoConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionRegistry<MongoConnector> {
    /// Registry backed by the MongoDB driver.
    pub fn mongo() -> Self {
        Self::new(MongoConnector::new())
    }
}

impl Default for ConnectionRegistry<MongoConnector> {
    fn default() -> Self {
        Self::mongo()
    }
}

impl<C: Connector> ConnectionRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Return the handle for `config`'s endpoint, establishing the pool on first use.
    ///
    /// Configurations that share `host:port` share the pool; the first one to
    /// initialize decides its tuning. Callers racing on an uninitialized key
    /// all wait for a single initializer and observe its outcome.
    pub async fn acquire(&self, config: &MongoConfig) -> PoolResult<Arc<Handle<C::Pool>>> {
        config.validate()?;
        let key = config.key();

        let (generation, done) = {
            let mut slots = self.inner.slots.lock().await;
            match slots.get(&key) {
                Some(Slot::Ready(handle)) => {
                    debug!(key = %key, handle = handle.id(), "reusing cached handle");
                    return Ok(Arc::clone(handle));
                }
                Some(Slot::Initializing { generation, done }) => {
                    debug!(key = %key, generation, "joining in-flight initialization");
                    (*generation, done.clone())
                }
                Some(Slot::Failed { .. }) | None => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    slots.insert(
                        key.clone(),
                        Slot::Initializing {
                            generation,
                            done: rx.clone(),
                        },
                    );
                    debug!(key = %key, generation, "starting initialization");
                    self.spawn_initializer(key.clone(), generation, config.clone(), tx);
                    (generation, rx)
                }
            }
        };

        self.wait(&key, generation, done).await
    }

    /// Disconnect and forget the pool for `host:port`.
    ///
    /// Idempotent. Disconnect failures are swallowed. The next acquire for
    /// the key initializes from scratch. If an initialization is in flight,
    /// its waiters still get its result, but the pool is not cached and is
    /// disconnected as soon as it is built.
    pub async fn release(&self, host: &str, port: u16) {
        let key = PoolKey::new(host, port);
        let removed = self.inner.slots.lock().await.remove(&key);
        match removed {
            Some(Slot::Ready(handle)) => {
                self.inner.disconnect(&handle).await;
                info!(key = %key, handle = handle.id(), "pool released");
            }
            Some(Slot::Initializing { generation, .. }) => {
                debug!(key = %key, generation, "guard reset during initialization");
            }
            Some(Slot::Failed { generation, .. }) => {
                debug!(key = %key, generation, "failed guard cleared");
            }
            None => {}
        }
    }

    /// Release every key. Returns the number of pools disconnected.
    pub async fn release_all(&self) -> usize {
        let drained: Vec<(PoolKey, Slot<C::Pool>)> =
            self.inner.slots.lock().await.drain().collect();

        let mut closed = 0;
        for (key, slot) in drained {
            if let Slot::Ready(handle) = slot {
                self.inner.disconnect(&handle).await;
                debug!(key = %key, handle = handle.id(), "pool released");
                closed += 1;
            }
        }
        info!(closed, "all pools released");
        closed
    }

    pub async fn state(&self, host: &str, port: u16) -> KeyState {
        self.inner
            .slots
            .lock()
            .await
            .get(&PoolKey::new(host, port))
            .map_or(KeyState::Uninitialized, Slot::state)
    }

    /// The cached handle for `host:port`, without initializing anything.
    pub async fn cached(&self, host: &str, port: u16) -> Option<Arc<Handle<C::Pool>>> {
        match self.inner.slots.lock().await.get(&PoolKey::new(host, port)) {
            Some(Slot::Ready(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// The error left by the last failed initialization of `host:port`, if any.
    pub async fn last_failure(&self, host: &str, port: u16) -> Option<PoolError> {
        match self.inner.slots.lock().await.get(&PoolKey::new(host, port)) {
            Some(Slot::Failed { error, .. }) => Some(error.clone()),
            _ => None,
        }
    }

    /// Number of ready pools.
    pub async fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn spawn_initializer(
        &self,
        key: PoolKey,
        generation: u64,
        config: MongoConfig,
        tx: watch::Sender<Option<Outcome<C::Pool>>>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.initialize(&key, &config).await.map(Arc::new);
            inner.publish(&key, generation, &outcome).await;
            tx.send_replace(Some(outcome));
        });
    }

    async fn wait(
        &self,
        key: &PoolKey,
        generation: u64,
        mut done: watch::Receiver<Option<Outcome<C::Pool>>>,
    ) -> PoolResult<Arc<Handle<C::Pool>>> {
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        if let Some(outcome) = outcome {
            return outcome;
        }

        // The initializer task went away without reporting (panicked or the
        // runtime is shutting down). Make the key retryable.
        let error = PoolError::Connection(format!(
            "initialization of {key} aborted before completing"
        ));
        let mut slots = self.inner.slots.lock().await;
        if slots.get(key).is_some_and(|slot| slot.is_generation(generation)) {
            slots.insert(
                key.clone(),
                Slot::Failed {
                    generation,
                    error: error.clone(),
                },
            );
        }
        Err(error)
    }
}

impl<C: Connector> Inner<C> {
    /// Connect, ping, and wrap the pool in a handle. Nothing is cached here.
    async fn initialize(&self, key: &PoolKey, config: &MongoConfig) -> PoolResult<Handle<C::Pool>> {
        let options = ConnectOptions::from_config(config);
        let deadline = options.connect_timeout;

        let pool = match timeout(deadline, self.connector.connect(&options)).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(cause)) => {
                return Err(PoolError::Connection(format!(
                    "failed to connect to {key}: {cause}"
                )));
            }
            Err(_) => {
                return Err(PoolError::Connection(format!(
                    "connecting to {key} timed out after {deadline:?}"
                )));
            }
        };

        let ping_failure = match timeout(deadline, self.connector.ping(&pool)).await {
            Ok(Ok(())) => None,
            Ok(Err(cause)) => Some(format!("liveness ping to {key} failed: {cause}")),
            Err(_) => Some(format!("liveness ping to {key} timed out after {deadline:?}")),
        };
        if let Some(message) = ping_failure {
            let _ = timeout(deadline, self.connector.disconnect(&pool)).await;
            return Err(PoolError::Connection(message));
        }

        Ok(Handle::new(
            key.clone(),
            pool,
            config.read_timeout_or_default(),
            config.write_timeout_or_default(),
        ))
    }

    /// Record the outcome, unless the key was released while we worked.
    ///
    /// A pool built for a released key is disconnected before its waiters
    /// see it, the same state a handle is left in by an ordinary release.
    async fn publish(&self, key: &PoolKey, generation: u64, outcome: &Outcome<C::Pool>) {
        let mut slots = self.slots.lock().await;
        if !slots.get(key).is_some_and(|slot| slot.is_generation(generation)) {
            drop(slots);
            warn!(key = %key, generation, "key released during initialization, result not cached");
            if let Ok(handle) = outcome {
                self.disconnect(handle).await;
                info!(key = %key, handle = handle.id(), "orphaned pool released");
            }
            return;
        }

        match outcome {
            Ok(handle) => {
                info!(
                    key = %key,
                    handle = handle.id(),
                    read_timeout = ?handle.read_timeout(),
                    write_timeout = ?handle.write_timeout(),
                    "pool established"
                );
                slots.insert(key.clone(), Slot::Ready(Arc::clone(handle)));
            }
            Err(error) => {
                warn!(key = %key, generation, error = %error, "pool initialization failed");
                slots.insert(
                    key.clone(),
                    Slot::Failed {
                        generation,
                        error: error.clone(),
                    },
                );
            }
        }
    }

    async fn disconnect(&self, handle: &Handle<C::Pool>) {
        let deadline = handle.write_timeout();
        if timeout(deadline, self.connector.disconnect(handle.pool()))
            .await
            .is_err()
        {
            warn!(
                key = %handle.key(),
                handle = handle.id(),
                "disconnect timed out after {deadline:?}, pool abandoned"
            );
        }
    }
}

// ── Debug impl (cannot auto-derive due to generic connector) ────────

impl<C: Connector> fmt::Debug for ConnectionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field(
                "next_generation",
                &self.inner.next_generation.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
