//! Runtime for user conversations
//!
//! Every user with activity gets a task that applies that user's events
//! strictly in arrival order. Different users run concurrently and never share
//! a lock; job completions re-enter through the same per-user channel as chat
//! events. A task retires once its user is back in Idle with nothing queued,
//! and the next event starts a fresh one.

mod executor;


use executor::UserRuntime;

use crate::catalog::StyleCatalog;
use crate::jobs::JobRunner;
use crate::session::SessionStore;
use crate::state_machine::{ChatId, Event, UserId};
use crate::transport::ChatTransport;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Per-user inbox depth; senders wait when it is full
const USER_QUEUE_DEPTH: usize = 32;

/// Registered runtimes by user
type Registry = Arc<RwLock<HashMap<UserId, UserSlot>>>;

/// A live user runtime as seen by the dispatcher
struct UserSlot {
    tx: mpsc::Sender<Inbound>,
    /// Dispatches holding `tx` that have not finished sending
    in_flight: Arc<AtomicUsize>,
}

/// Held for the duration of one dispatch; the runtime does not retire while any exist
struct DispatchGuard(Arc<AtomicUsize>);

impl DispatchGuard {
    fn new(in_flight: &Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self(in_flight.clone())
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An event addressed to one user, tagged with the chat it concerns
#[derive(Debug, Clone)]
pub struct Inbound {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub event: Event,
}

impl Inbound {
    pub fn new(user_id: UserId, chat_id: ChatId, event: Event) -> Self {
        Self {
            user_id,
            chat_id,
            event,
        }
    }
}

/// Shared collaborators handed to every user runtime
pub struct RuntimeDeps<S, T> {
    pub store: Arc<S>,
    pub transport: Arc<T>,
    pub runner: JobRunner,
    pub catalog: Arc<StyleCatalog>,
    pub work_dir: PathBuf,
}

impl<S, T> Clone for RuntimeDeps<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: self.transport.clone(),
            runner: self.runner.clone(),
            catalog: self.catalog.clone(),
            work_dir: self.work_dir.clone(),
        }
    }
}

/// Routes events to per-user runtimes, starting them on demand
pub struct RuntimeManager<S, T> {
    deps: RuntimeDeps<S, T>,
    runtimes: Registry,
    shutdown: CancellationToken,
}

impl<S, T> RuntimeManager<S, T>
where
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    pub fn new(deps: RuntimeDeps<S, T>) -> Self {
        Self {
            deps,
            runtimes: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Deliver an event to its user's runtime
    pub async fn dispatch(&self, inbound: Inbound) -> Result<(), String> {
        if self.shutdown.is_cancelled() {
            return Err("Shutting down".to_string());
        }
        let user_id = inbound.user_id;
        let (tx, _guard) = self.sender_for(user_id).await;
        if let Err(e) = tx.send(inbound).await {
            // Runtime stopped underneath us; forget it so the next event restarts it
            let mut runtimes = self.runtimes.write().await;
            if runtimes
                .get(&user_id)
                .is_some_and(|slot| slot.tx.same_channel(&tx))
            {
                runtimes.remove(&user_id);
            }
            return Err(format!("Failed to send event: {e}"));
        }
        Ok(())
    }

    /// The user's inbox, started if needed. The guard is taken under the
    /// registry lock so the runtime cannot retire before the send lands.
    async fn sender_for(&self, user_id: UserId) -> (mpsc::Sender<Inbound>, DispatchGuard) {
        {
            let runtimes = self.runtimes.read().await;
            if let Some(slot) = runtimes.get(&user_id).filter(|slot| !slot.tx.is_closed()) {
                return (slot.tx.clone(), DispatchGuard::new(&slot.in_flight));
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another dispatch may have started it while we waited for the lock
        if let Some(slot) = runtimes.get(&user_id).filter(|slot| !slot.tx.is_closed()) {
            return (slot.tx.clone(), DispatchGuard::new(&slot.in_flight));
        }

        let (event_tx, event_rx) = mpsc::channel(USER_QUEUE_DEPTH);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let guard = DispatchGuard::new(&in_flight);
        let runtime = UserRuntime::new(
            user_id,
            self.deps.clone(),
            event_rx,
            event_tx.clone(),
            self.runtimes.clone(),
            in_flight.clone(),
            self.shutdown.child_token(),
        );
        tokio::spawn(async move {
            runtime.run().await;
            tracing::debug!(user_id, "User runtime finished");
        });

        runtimes.insert(
            user_id,
            UserSlot {
                tx: event_tx.clone(),
                in_flight,
            },
        );
        (event_tx, guard)
    }

    /// Stop all user runtimes; in-flight jobs finish but are not delivered
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn active_users(&self) -> usize {
        self.runtimes.read().await.len()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.deps.store
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.deps.transport
    }
}
