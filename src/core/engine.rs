use crate::core::broadcast::{Broadcaster, EventSender};
use crate::core::presence::PresenceTracker;
use crate::core::protocol::{parse_estimate, ClientCommand, ServerEvent};
use crate::core::session::{Phase, SessionStateMachine};
use crate::domain::model::{ConnectionId, ParticipantId, SessionSnapshot, UpsertOutcome};
use crate::utils::error::{AppraisalError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Everything the engine reacts to, in one queue so that it has a single total order.
#[derive(Debug)]
pub enum EngineCommand {
    Connect {
        connection: ConnectionId,
        sender: EventSender,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Client {
        connection: ConnectionId,
        command: ClientCommand,
    },
    ResetDailyCounter,
    Snapshot {
        reply: oneshot::Sender<Result<SessionSnapshot>>,
    },
}

/// Cloneable front door to the engine task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<EngineCommand>,
    next_connection: Arc<AtomicU64>,
}

impl SessionHandle {
    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AppraisalError::EngineStopped)
    }

    /// Registers an observer; the engine answers with a snapshot before any later event.
    pub async fn connect(&self, sender: EventSender) -> Result<ConnectionId> {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        self.send(EngineCommand::Connect { connection, sender }).await?;
        Ok(connection)
    }

    pub async fn disconnect(&self, connection: ConnectionId) -> Result<()> {
        self.send(EngineCommand::Disconnect { connection }).await
    }

    pub async fn dispatch(&self, connection: ConnectionId, command: ClientCommand) -> Result<()> {
        self.send(EngineCommand::Client {
            connection,
            command,
        })
        .await
    }

    pub async fn reset_daily_counter(&self) -> Result<()> {
        self.send(EngineCommand::ResetDailyCounter).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| AppraisalError::EngineStopped)?
    }
}

/// Single owner of the session, presence map and observers.
///
/// Runs as one task and handles commands strictly one after another, so no
/// two transitions ever interleave.
pub struct SessionEngine {
    session: SessionStateMachine,
    presence: PresenceTracker,
    broadcaster: Broadcaster,
    refusal: Option<String>,
    rx: mpsc::Receiver<EngineCommand>,
}

impl SessionEngine {
    pub fn new(session: SessionStateMachine) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let engine = Self {
            session,
            presence: PresenceTracker::new(),
            broadcaster: Broadcaster::new(),
            refusal: None,
            rx,
        };
        let handle = SessionHandle {
            tx,
            next_connection: Arc::new(AtomicU64::new(1)),
        };
        (engine, handle)
    }

    /// Puts the engine into read-only mode: mutating commands get `StorageUnavailable`.
    pub fn refuse_mutations(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!("❌ Refusing mutating commands: {}", reason);
        self.refusal = Some(reason);
    }

    pub fn is_accepting(&self) -> bool {
        self.refusal.is_none()
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Session engine started (ledger: {}, accepting: {})",
            self.session.ledger_backend(),
            self.is_accepting()
        );
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        tracing::info!("Session engine stopped");
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Connect { connection, sender } => self.on_connect(connection, sender).await,
            EngineCommand::Disconnect { connection } => self.on_disconnect(connection).await,
            EngineCommand::Client {
                connection,
                command,
            } => self.on_client(connection, command).await,
            EngineCommand::ResetDailyCounter => {
                self.session.reset_daily();
                self.broadcaster.publish(ServerEvent::CounterReset {
                    daily_counter: self.session.daily_counter(),
                });
            }
            EngineCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot().await);
            }
        }
    }

    async fn on_connect(&mut self, connection: ConnectionId, sender: EventSender) {
        self.broadcaster.register(connection, sender);
        tracing::debug!(
            "{} connected ({} observer(s))",
            connection,
            self.broadcaster.observer_count()
        );
        self.send_snapshot(connection).await;
    }

    async fn on_disconnect(&mut self, connection: ConnectionId) {
        self.broadcaster.unregister(connection);
        let Some(presence) = self.presence.unbind(connection) else {
            tracing::debug!("{} disconnected", connection);
            return;
        };

        let current_round = self.session.current_round();
        if current_round.is_none() || presence.round_id != current_round {
            tracing::debug!("{} ({}) disconnected", connection, presence.participant_id);
            return;
        }

        // 斷線即撤回估價
        match self.session.retract(&presence.participant_id).await {
            Ok(Some(_)) => {
                tracing::info!(
                    "🔌 {} disconnected, estimate withdrawn",
                    presence.participant_id
                );
                self.broadcaster.publish(ServerEvent::SubmissionRetracted {
                    participant_id: presence.participant_id,
                });
            }
            Ok(None) => {
                tracing::debug!("{} ({}) disconnected", connection, presence.participant_id);
            }
            Err(e) => tracing::error!(
                "❌ Could not withdraw estimate of {} after disconnect: {}",
                presence.participant_id,
                e
            ),
        }
    }

    async fn on_client(&mut self, connection: ConnectionId, command: ClientCommand) {
        let name = command.name();
        tracing::debug!("{} -> {}", connection, name);

        let refusal = self.refusal.clone().filter(|_| command.is_mutating());
        let result = match refusal {
            Some(reason) => Err(AppraisalError::storage_unavailable(reason)),
            None => self.apply(connection, command).await,
        };

        if let Err(e) = result {
            tracing::warn!("⚠️ {} from {} rejected: {} ({})", name, connection, e, e.kind());
            self.broadcaster.send_to(connection, ServerEvent::error(&e));
        }
    }

    async fn apply(&mut self, connection: ConnectionId, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::RegisterItem { name, category } => {
                let outcome = self.session.register_item(&name, &category).await?;
                if let Some(closed) = outcome.closed {
                    self.broadcaster.publish(ServerEvent::RoundClosed(closed));
                }
                self.broadcaster
                    .publish(ServerEvent::ItemRegistered { item: outcome.item });
            }
            ClientCommand::OpenRound => {
                let outcome = self.session.open_round().await?;
                if let Some(closed) = outcome.closed {
                    self.broadcaster.publish(ServerEvent::RoundClosed(closed));
                }
                if let Err(e) = outcome.round {
                    // 前一輪已關閉但新一輪沒開成，讓所有人同步目前狀態
                    self.publish_snapshot().await;
                    return Err(e);
                }
                self.broadcaster
                    .publish(ServerEvent::RoundOpened { item: outcome.item });
            }
            ClientCommand::Submit {
                participant_id,
                value,
            } => {
                if self.session.phase() != Phase::RoundOpen {
                    return Err(AppraisalError::RoundNotOpen);
                }
                let value = parse_estimate(&value)?;
                let (submission, outcome) = self.session.submit(&participant_id, value).await?;
                self.presence.bind(
                    connection,
                    submission.participant_id.clone(),
                    self.session.current_round(),
                );
                self.broadcaster.publish(ServerEvent::SubmissionReceived {
                    submission,
                    replaced: outcome == UpsertOutcome::Replaced,
                });
            }
            ClientCommand::CloseRound => {
                let result = self.session.close_round().await?;
                self.broadcaster.publish(ServerEvent::RoundClosed(result));
            }
            ClientCommand::RequestSnapshot => {
                self.send_snapshot(connection).await;
            }
            ClientCommand::Identify { participant_id } => {
                let participant_id = ParticipantId::parse(&participant_id)?;
                tracing::debug!("{} identified as {}", connection, participant_id);
                self.presence
                    .bind(connection, participant_id, self.session.current_round());
            }
            ClientCommand::Retract { participant_id } => {
                let participant_id = ParticipantId::parse(&participant_id)?;
                if self.session.retract(&participant_id).await?.is_some() {
                    self.broadcaster
                        .publish(ServerEvent::SubmissionRetracted { participant_id });
                }
            }
        }
        Ok(())
    }

    async fn publish_snapshot(&mut self) {
        match self.session.snapshot().await {
            Ok(snapshot) => {
                self.broadcaster.publish(ServerEvent::Snapshot { snapshot });
            }
            Err(e) => tracing::error!("❌ Could not build snapshot for observers: {}", e),
        }
    }

    async fn send_snapshot(&mut self, connection: ConnectionId) {
        let event = match self.session.snapshot().await {
            Ok(snapshot) => ServerEvent::Snapshot { snapshot },
            Err(e) => ServerEvent::error(&e),
        };
        self.broadcaster.send_to(connection, event);
    }
}
