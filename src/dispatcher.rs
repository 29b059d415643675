//! Dispatcher Module
//!
//! Fans reconciled events out to observers, each delivery on its own task.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::Event;

/// Something that wants to hear about reconciled events
#[async_trait]
pub trait Observer: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare to receive events; observers returning false are not activated
    async fn start(&self) -> bool {
        true
    }

    async fn stop(&self) {}

    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Delivers each event to every active observer.
///
/// Deliveries are independent: a slow or failing observer delays nobody
/// else, and no ordering between observers is promised.
pub struct EventDispatcher {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl EventDispatcher {
    /// `concurrency` bounds how many deliveries run at once
    pub fn new(concurrency: usize) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Start an observer and, if it comes up, add it to the active set
    pub async fn activate(&self, observer: Arc<dyn Observer>) -> bool {
        if !observer.start().await {
            warn!("Observer {} did not start", observer.name());
            return false;
        }

        info!("Observer {} active", observer.name());
        lock(&self.observers).push(observer);
        true
    }

    pub fn active_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Schedule delivery of `event` to every active observer and return
    /// immediately. Returns the number of deliveries scheduled.
    pub fn dispatch(&self, event: Event) -> usize {
        let observers = lock(&self.observers).clone();
        if observers.is_empty() {
            return 0;
        }

        let event = Arc::new(event);
        let mut tasks = lock(&self.tasks);
        while tasks.try_join_next().is_some() {}

        for observer in &observers {
            let observer = observer.clone();
            let event = event.clone();
            let semaphore = self.semaphore.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Err(e) = observer.handle(&event).await {
                    warn!(
                        observer = observer.name(),
                        event = event.name(),
                        "Observer failed to handle event: {:#}",
                        e
                    );
                }
            });
        }

        debug!(event = event.name(), observers = observers.len(), "Dispatched event");
        observers.len()
    }

    /// Wait for every delivery scheduled so far
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!("Observer task panicked");
                }
            }
        }
    }

    /// Drain outstanding deliveries, then stop and deactivate every observer
    pub async fn stop_all(&self) {
        self.drain().await;

        let observers = std::mem::take(&mut *lock(&self.observers));
        for observer in observers {
            observer.stop().await;
            info!("Observer {} stopped", observer.name());
        }
    }
}

/// Writes each event to the log
#[derive(Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl Observer for LoggingObserver {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let json = serde_json::to_string(event)?;
        info!(target: "events", event = event.name(), "{}", json);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
