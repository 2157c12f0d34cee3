//! The change-notification bus.
//!
//! A single listener connection subscribes to the `page_edit` and
//! `page_delete` channels, translates each storage notification into a
//! `WikiEvent` and broadcasts it. Consumers run in their own tasks, so one
//! slow or failing handler never blocks another. Notifications lost across a
//! reconnect are not replayed; consumers tolerate the gap.

use std::sync::Arc;
use std::time::Duration;

use guildwiki_shared::error::WikiError;
use guildwiki_shared::events::{WikiEvent, PAGE_DELETE_CHANNEL, PAGE_EDIT_CHANNEL};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

#[async_trait::async_trait]
pub trait EventConsumer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle_event(&self, event: WikiEvent) -> Result<(), WikiError>;
}

/// Fan-out point between the storage listener and the consumer tasks.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WikiEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WikiEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many consumers received it.
    pub fn emit(&self, event: WikiEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

/// Own the singleton listener connection until shutdown. Runs until the
/// shutdown channel flips; connection drops are logged and retried.
pub async fn run_listener(
    pool: PgPool,
    bus: EventBus,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen_all([PAGE_EDIT_CHANNEL, PAGE_DELETE_CHANNEL]).await?;
    tracing::info!("storage notification listener started");

    loop {
        tokio::select! {
            notification = listener.recv() => match notification {
                Ok(notification) => {
                    match WikiEvent::parse(notification.channel(), notification.payload()) {
                        Ok(event) => {
                            let delivered = bus.emit(event);
                            if delivered == 0 {
                                tracing::warn!("storage notification had no consumers");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "unparseable storage notification");
                        }
                    }
                }
                Err(e) => {
                    // recv reconnects on its own; notifications sent in the
                    // gap are gone, which consumers are built to tolerate
                    tracing::warn!(error = %e, "notification stream error, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
            _ = shutdown.changed() => {
                tracing::info!("storage notification listener shutting down");
                return Ok(());
            }
        }
    }
}

/// Run one consumer against the bus until shutdown. Handler errors are
/// logged and never propagate to the command that caused the event.
pub fn spawn_consumer(
    consumer: Arc<dyn EventConsumer>,
    mut events: broadcast::Receiver<WikiEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = consumer.handle_event(event).await {
                            tracing::error!(
                                consumer = consumer.name(),
                                error = %e,
                                "event handler failed"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(consumer = consumer.name(), missed, "event consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!(consumer = consumer.name(), "event consumer stopped");
    })
}
