//! Command channel into a running engine

use cuecannon_core::Production;
use tokio::sync::{mpsc, oneshot};

use crate::engine::EngineSnapshot;
use crate::error::{AppError, Result};

pub(crate) enum Command {
    MakeInvite {
        title: String,
        reply: oneshot::Sender<Result<Production>>,
    },
    AcceptInvite {
        production: Production,
        name: String,
        reply: oneshot::Sender<Result<String>>,
    },
    BeginShow,
    CueNextActor,
    SetManualCast {
        part: String,
        actor: String,
    },
    ClearManualCast {
        part: String,
    },
    ToggleAutoCast,
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
}

/// Cloneable handle for driving an engine from another task
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AppError::EngineStopped)
    }

    /// Open and announce a production of `title`
    pub async fn make_invite(&self, title: String) -> Result<Production> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::MakeInvite { title, reply }).await?;
        rx.await.map_err(|_| AppError::EngineStopped)?
    }

    /// Join `production`; returns the local actor identity
    pub async fn accept_invite(&self, production: Production, name: String) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AcceptInvite {
            production,
            name,
            reply,
        })
        .await?;
        rx.await.map_err(|_| AppError::EngineStopped)?
    }

    pub async fn begin_show(&self) -> Result<()> {
        self.send(Command::BeginShow).await
    }

    pub async fn cue_next_actor(&self) -> Result<()> {
        self.send(Command::CueNextActor).await
    }

    pub async fn set_manual_cast(&self, part: String, actor: String) -> Result<()> {
        self.send(Command::SetManualCast { part, actor }).await
    }

    pub async fn clear_manual_cast(&self, part: String) -> Result<()> {
        self.send(Command::ClearManualCast { part }).await
    }

    pub async fn toggle_auto_cast(&self) -> Result<()> {
        self.send(Command::ToggleAutoCast).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| AppError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stopped_engine() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EngineHandle::new(tx);

        assert!(matches!(handle.begin_show().await, Err(AppError::EngineStopped)));
        assert!(matches!(
            handle.make_invite("Macbeth".to_string()).await,
            Err(AppError::EngineStopped)
        ));
    }

    #[tokio::test]
    async fn test_dropped_reply() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = EngineHandle::new(tx);

        tokio::spawn(async move {
            // Drop the reply sender without answering
            let _ = rx.recv().await;
        });
        assert!(matches!(handle.snapshot().await, Err(AppError::EngineStopped)));
    }
}
