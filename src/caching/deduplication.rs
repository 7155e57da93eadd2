//! # Miss Coalescing
//!
//! Registry of in-flight producer runs keyed by cache key. When several requests miss
//! the same key at once, the first one starts the producer and every other caller waits
//! for that single result instead of starting its own upstream fetch.
//!
//! The producer runs on its own task, so it finishes (and its result is published)
//! even if the caller that started it goes away. The slot for a key is removed when
//! that task ends, whether it succeeded, failed or panicked.

use crate::core::error::{GatewayError, GatewayResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

type Outcome = Option<GatewayResult<Vec<u8>>>;
type Slot = watch::Receiver<Outcome>;

/// Result of [`InFlightRegistry::run`]
#[derive(Debug)]
pub struct Coalesced {
    /// Serialized producer output, or the producer's error
    pub result: GatewayResult<Vec<u8>>,
    /// `true` if this caller started the producer
    pub led: bool,
}

/// Tracks producer runs that are currently in flight
#[derive(Default)]
pub struct InFlightRegistry {
    in_flight: Arc<DashMap<String, Slot>>,
}

enum Role {
    Leader(JoinHandle<GatewayResult<Vec<u8>>>),
    Follower(Slot),
}

/// Removes the slot it was created for once the producer task ends
struct SlotGuard {
    in_flight: Arc<DashMap<String, Slot>>,
    key: String,
    slot: Slot,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.key, |_, current| current.same_channel(&self.slot));
    }
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key`, or join the run already in flight for it
    pub async fn run<F, Fut>(&self, key: &str, producer: F) -> Coalesced
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = GatewayResult<Vec<u8>>> + Send + 'static,
    {
        // Decide the role first so no map guard is alive across an await
        let role = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(existing) => Role::Follower(existing.get().clone()),
            Entry::Vacant(vacant) => {
                let (sender, receiver) = watch::channel(None);
                vacant.insert(receiver.clone());

                let guard = SlotGuard {
                    in_flight: self.in_flight.clone(),
                    key: key.to_string(),
                    slot: receiver,
                };
                Role::Leader(tokio::spawn(async move {
                    let _guard = guard;
                    let result = producer().await;
                    sender.send_replace(Some(result.clone()));
                    result
                }))
            }
        };

        match role {
            Role::Leader(task) => {
                let result = task
                    .await
                    .unwrap_or_else(|e| Err(GatewayError::internal(format!("Producer task failed: {}", e))));
                Coalesced { result, led: true }
            }
            Role::Follower(mut slot) => {
                debug!("Joined in-flight producer for key: {}", key);
                let result = match slot.wait_for(|outcome| outcome.is_some()).await {
                    Ok(outcome) => outcome
                        .clone()
                        .unwrap_or_else(|| Err(GatewayError::internal("Producer finished without a result"))),
                    Err(_) => Err(GatewayError::internal("Producer task ended without a result")),
                };
                Coalesced { result, led: false }
            }
        }
    }

    /// Number of keys with a producer currently registered
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
