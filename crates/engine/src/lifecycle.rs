use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use common::{EngineCommand, EngineState, Result};
use strategy::Strategy;

use crate::manager::{Schedule, StrategyManager};
use crate::scheduler::{self, Tasks};

/// Cloneable handle passed to other crates (Telegram).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    manager: Arc<StrategyManager>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub fn manager(&self) -> &Arc<StrategyManager> {
        &self.manager
    }

    /// Register a strategy and, if the engine is already started, have it
    /// scheduled straight away.
    pub async fn register(
        &self,
        strategy: Box<dyn Strategy>,
        schedule: Schedule,
        symbols: Vec<String>,
    ) -> Result<()> {
        let id = strategy.id().to_string();
        self.manager.register(strategy, schedule, symbols).await?;
        self.send(EngineCommand::Register(id)).await;
        Ok(())
    }

    /// Unregister a strategy and stop its schedule loop.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.manager.remove(id).await?;
        self.send(EngineCommand::Remove(id.to_string())).await;
        Ok(())
    }
}

/// Owns the scheduler tasks and applies lifecycle commands.
pub struct Engine {
    manager: Arc<StrategyManager>,
    state: Arc<RwLock<EngineState>>,
    status_interval: Duration,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(manager: Arc<StrategyManager>, status_interval: Duration) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = manager.state();

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            manager: manager.clone(),
        };

        let engine = Engine {
            manager,
            state,
            status_interval,
            command_rx,
        };

        (engine, handle)
    }

    /// Run the command loop until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Engine initialized in Stopped state. Waiting for Start command.");

        let mut tasks = Tasks::default();

        while let Some(cmd) = self.command_rx.recv().await {
            self.apply(cmd, &mut tasks).await;
        }

        warn!("Engine command channel closed, shutting down");
        tasks.abort_all();
    }

    async fn apply(&mut self, cmd: EngineCommand, tasks: &mut Tasks) {
        let current = *self.state.read().await;
        match cmd {
            EngineCommand::Start => {
                if current != EngineState::Stopped {
                    info!(state = %current, "Engine already started");
                    return;
                }
                *self.state.write().await = EngineState::Running;
                *tasks = scheduler::spawn_all(self.manager.clone(), self.status_interval).await;
                info!(tasks = tasks.len(), "Engine running");
            }
            EngineCommand::Stop => {
                info!("Engine stopping, aborting strategy loops");
                *self.state.write().await = EngineState::Stopped;
                tasks.abort_all();
            }
            EngineCommand::Pause => {
                if current == EngineState::Running {
                    info!("Engine paused, cycles skipped until resume");
                    *self.state.write().await = EngineState::Paused;
                }
            }
            EngineCommand::Resume => {
                if current == EngineState::Paused {
                    info!("Engine resumed");
                    *self.state.write().await = EngineState::Running;
                }
            }
            EngineCommand::Register(id) => {
                // a stopped engine picks the strategy up on the next Start
                if current == EngineState::Stopped {
                    return;
                }
                match tasks.spawn_strategy(&self.manager, &id).await {
                    Ok(()) => info!(strategy = %id, "Strategy scheduled"),
                    Err(e) => warn!(strategy = %id, error = %e, "Cannot schedule strategy"),
                }
            }
            EngineCommand::Remove(id) => {
                if tasks.abort(&id) {
                    info!(strategy = %id, "Strategy loop stopped");
                }
            }
        }
    }
}
