//! Delivery engine: one task that owns the pending table and the connection registry.
//!
//! Deliveries, acknowledgments, connection changes and scheduler ticks are all
//! processed by this task one at a time, so no two of them ever touch the same
//! entry concurrently. Callers talk to it through a cloneable [`DeliveryHandle`].
//!
//! Any scheduler tick that has come due is run before the next command is
//! handled, so a command always observes every tick scheduled before it.
//! A panic inside one tick or command is logged and the loop keeps running.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use linkcast_common::config::DeliveryConfig;
use linkcast_common::types::DeliveryId;

use crate::ack;
use crate::error::EngineError;
use crate::pending::{PendingDelivery, PendingTable};
use crate::registry::{ConnectionId, ConnectionRegistry, FrameReceiver, FrameSender};
use crate::scheduler::{RetryScheduler, panic_message};
use crate::service::{self, DeliveryRequest};

const COMMAND_QUEUE_CAPACITY: usize = 1024;

enum Command {
    Register {
        connection_id: ConnectionId,
        sender: FrameSender,
    },
    Unregister {
        connection_id: ConnectionId,
    },
    Deliver {
        request: DeliveryRequest,
        reply: oneshot::Sender<DeliveryId>,
    },
    Acknowledge {
        delivery_id: DeliveryId,
        reply: oneshot::Sender<bool>,
    },
    Pending {
        delivery_id: DeliveryId,
        reply: oneshot::Sender<Option<PendingDelivery>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
    Shutdown,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub pending: usize,
    pub connections: usize,
}

/// Cloneable entry point into a running [`DeliveryEngine`].
#[derive(Clone)]
pub struct DeliveryHandle {
    commands: mpsc::Sender<Command>,
    connection_buffer: usize,
}

impl DeliveryHandle {
    /// Record a short URL as ready and broadcast it to every open connection.
    ///
    /// Returns after the first broadcast, without waiting for acknowledgment.
    /// Having no connections open is not an error.
    pub async fn deliver(
        &self,
        short_url: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Result<DeliveryId, EngineError> {
        let request = DeliveryRequest::new(short_url, original_url)?;
        self.request(|reply| Command::Deliver { request, reply }).await
    }

    /// Remove the pending delivery with this id. Returns `false` if there was none.
    pub async fn acknowledge(&self, delivery_id: DeliveryId) -> Result<bool, EngineError> {
        self.request(|reply| Command::Acknowledge { delivery_id, reply }).await
    }

    /// Open a new push connection and return its id and the frames queued for it.
    pub async fn connect(&self) -> Result<(ConnectionId, FrameReceiver), EngineError> {
        let (sender, receiver) = mpsc::channel(self.connection_buffer);
        let connection_id = ConnectionId::new();
        self.register(connection_id, sender).await?;
        Ok((connection_id, receiver))
    }

    pub async fn register(
        &self,
        connection_id: ConnectionId,
        sender: FrameSender,
    ) -> Result<(), EngineError> {
        self.send(Command::Register {
            connection_id,
            sender,
        })
        .await
    }

    /// Unregister a connection. Unknown ids are ignored.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), EngineError> {
        self.send(Command::Unregister { connection_id }).await
    }

    /// Look up a pending delivery. Entries past their expiry are never returned.
    pub async fn pending(
        &self,
        delivery_id: &DeliveryId,
    ) -> Result<Option<PendingDelivery>, EngineError> {
        let delivery_id = delivery_id.clone();
        self.request(|reply| Command::Pending { delivery_id, reply }).await
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Ask the engine to stop. Commands queued behind this one are dropped.
    pub async fn close(&self) -> Result<(), EngineError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        response.await.map_err(|_| EngineError::Closed)
    }
}

/// A running delivery engine and its background task.
pub struct DeliveryEngine {
    handle: DeliveryHandle,
    task: JoinHandle<()>,
}

impl DeliveryEngine {
    /// Spawn the engine task on the current Tokio runtime.
    pub fn start(config: &DeliveryConfig) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let scheduler = RetryScheduler::from_config(config);

        let engine_task = EngineTask {
            table: PendingTable::new(),
            registry: ConnectionRegistry::new(),
            scheduler,
            next_tick: Instant::now() + scheduler.interval(),
        };
        let task = tokio::spawn(engine_task.run(receiver));

        Self {
            handle: DeliveryHandle {
                commands,
                connection_buffer: config.connection_buffer.max(1),
            },
            task,
        }
    }

    pub fn handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    /// Stop the scheduler, release every connection, and wait for the task to finish.
    pub async fn shutdown(self) {
        // Already closed when a handle asked first.
        let _ = self.handle.close().await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Delivery engine task failed");
        }
    }
}

struct EngineTask {
    table: PendingTable,
    registry: ConnectionRegistry,
    scheduler: RetryScheduler,
    next_tick: Instant,
}

impl EngineTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!(
            retry_interval_ms = self.scheduler.interval().as_millis() as u64,
            "Delivery engine started"
        );

        loop {
            tokio::select! {
                command = commands.recv() => {
                    self.contained("tick", |task| task.catch_up(Instant::now()));
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.contained("command", |task| task.handle(command)),
                    }
                }
                _ = time::sleep_until(self.next_tick) => {
                    self.contained("tick", |task| task.catch_up(Instant::now()));
                }
            }
        }

        let released = self.registry.release_all();
        tracing::info!(
            pending = self.table.len(),
            released_connections = released,
            "Delivery engine stopped"
        );
    }

    /// Run one unit of work, logging a panic instead of unwinding out of the loop.
    fn contained(&mut self, step: &'static str, work: impl FnOnce(&mut Self)) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work(self))) {
            tracing::error!(
                step,
                panic = panic_message(payload.as_ref()),
                "Delivery engine step failed, continuing"
            );
        }
    }

    /// Move the deadline past `now` and run the scheduler if a tick was due.
    fn catch_up(&mut self, now: Instant) {
        if now < self.next_tick {
            return;
        }

        let period = self.scheduler.interval().max(Duration::from_millis(1));
        self.next_tick += period;
        while self.next_tick <= now {
            self.next_tick += period;
        }

        self.scheduler.tick(&mut self.table, &self.registry, now);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                connection_id,
                sender,
            } => self.registry.register(connection_id, sender),
            Command::Unregister { connection_id } => {
                self.registry.unregister(&connection_id);
            }
            Command::Deliver { request, reply } => {
                let delivery_id =
                    service::deliver(&mut self.table, &self.registry, request, Instant::now());
                let _ = reply.send(delivery_id);
            }
            Command::Acknowledge { delivery_id, reply } => {
                let removed = ack::acknowledge(&mut self.table, &delivery_id);
                let _ = reply.send(removed);
            }
            Command::Pending { delivery_id, reply } => {
                self.scheduler.expire(&mut self.table, Instant::now());
                let _ = reply.send(self.table.get(&delivery_id).cloned());
            }
            Command::Stats { reply } => {
                self.scheduler.expire(&mut self.table, Instant::now());
                let _ = reply.send(EngineStats {
                    pending: self.table.len(),
                    connections: self.registry.len(),
                });
            }
            Command::Shutdown => {}
        }
    }
}
