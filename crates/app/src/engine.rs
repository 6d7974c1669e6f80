//! Production protocol engine
//!
//! One engine per peer. It owns the show session, the registry of announced
//! productions and the overlay handle, and is the only thing that mutates
//! them. Intents arrive from the front-end, protocol messages from the
//! overlay; both are handled one at a time on the engine task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cuecannon_core::{
    Actor, ActorsByPart, Casting, CueAdvance, CueView, PartId, Production, Role, ShowSession,
    Stage,
};
use cuecannon_net::{Message, Overlay, OverlayEvent, OverlayEvents, LOBBY_TOPIC};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::canon::ScriptRepository;
use crate::error::{AppError, Result};
use crate::handle::{Command, EngineHandle};
use crate::observer::ShowObserver;

/// Default wait before re-announcing to a newly connected peer
pub const DEFAULT_REANNOUNCE_DELAY: Duration = Duration::from_secs(5);

/// Protocol state of the local peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// No production yet
    Idle,
    /// Director is publishing a new production
    Announcing,
    /// Actor accepted an invite and waits for the show to begin
    Joining,
    /// Director is collecting actors
    Casting,
    /// Cues are being tracked
    Running,
    /// Cue pointer ran past the last line
    Ended,
}

/// Deferred work scheduled by the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timer {
    Reannounce,
}

/// Point-in-time view of the engine for front-ends
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub identity: Option<String>,
    pub state: ProtocolState,
    pub stage: Stage,
    pub role: Option<Role>,
    pub production: Option<Production>,
    pub productions: Vec<Production>,
    pub actors: Vec<Actor>,
    pub casting: Casting,
    pub actors_by_part: ActorsByPart,
    pub auto_cast: bool,
    pub cue: Option<CueView>,
    pub upcoming_parts: Vec<PartId>,
    pub uncast_actors: Vec<Actor>,
    pub uncast_parts: Vec<PartId>,
    pub last_sync: Option<DateTime<Utc>>,
}

pub struct ProductionEngine<O, R, V> {
    overlay: O,
    repository: Arc<R>,
    observer: V,
    session: ShowSession,
    state: ProtocolState,
    /// Every production seen on the lobby, by id
    registry: BTreeMap<String, Production>,
    started: bool,
    reannounce_delay: Duration,
    timer_tx: mpsc::UnboundedSender<Timer>,
    timer_rx: Option<mpsc::UnboundedReceiver<Timer>>,
    last_sync: Option<DateTime<Utc>>,
}

impl<O, R, V> ProductionEngine<O, R, V>
where
    O: Overlay,
    R: ScriptRepository,
    V: ShowObserver,
{
    pub fn new(overlay: O, repository: Arc<R>, observer: V) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            overlay,
            repository,
            observer,
            session: ShowSession::new(),
            state: ProtocolState::Idle,
            registry: BTreeMap::new(),
            started: false,
            reannounce_delay: DEFAULT_REANNOUNCE_DELAY,
            timer_tx,
            timer_rx: Some(timer_rx),
            last_sync: None,
        }
    }

    pub fn with_reannounce_delay(mut self, delay: Duration) -> Self {
        self.reannounce_delay = delay;
        self
    }

    // Accessors

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn session(&self) -> &ShowSession {
        &self.session
    }

    pub fn productions(&self) -> impl Iterator<Item = &Production> {
        self.registry.values()
    }

    /// When the last valid protocol message arrived
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let session = self.session();
        EngineSnapshot {
            identity: session.identity().map(str::to_string),
            state: self.state(),
            stage: session.stage(),
            role: session.role(),
            production: session.production().cloned(),
            productions: self.productions().cloned().collect(),
            actors: session.actors().to_vec(),
            casting: session.casting().clone(),
            actors_by_part: session.actors_by_part().clone(),
            auto_cast: session.auto_cast(),
            cue: session.cue_view(),
            upcoming_parts: session.upcoming_parts(),
            uncast_actors: session.uncast_actors().into_iter().cloned().collect(),
            uncast_parts: session.uncast_parts(),
            last_sync: self.last_sync(),
        }
    }

    // Lifecycle

    /// Subscribe to the lobby and adopt the overlay identity
    pub async fn init(&mut self) -> Result<()> {
        self.overlay.subscribe(LOBBY_TOPIC).await?;

        let identity = self.overlay.local_identity().to_string();
        info!(peer = %identity, topic = LOBBY_TOPIC, "Engine started");
        self.session.set_identity(identity);
        self.session.browse();
        self.started = true;
        Ok(())
    }

    /// Run the engine on its own task
    pub fn spawn(self, events: OverlayEvents) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(self.run(events, rx));
        (EngineHandle::new(tx), task)
    }

    /// Process overlay events, commands and timers until the command side closes
    pub async fn run(mut self, mut events: OverlayEvents, mut commands: mpsc::Receiver<Command>) {
        if !self.started {
            if let Err(e) = self.init().await {
                error!(error = %e, "Engine failed to start");
                return;
            }
        }

        let Some(mut timers) = self.timer_rx.take() else {
            error!("Engine already running");
            return;
        };

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_overlay_event(event).await,
                    None => {
                        warn!("Overlay closed, stopping engine");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All handles dropped, stopping engine");
                        break;
                    }
                },
                Some(timer) = timers.recv() => self.handle_timer(timer).await,
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::MakeInvite { title, reply } => {
                let _ = reply.send(self.make_invite(&title).await);
            }
            Command::AcceptInvite {
                production,
                name,
                reply,
            } => {
                let _ = reply.send(self.accept_invite(production, &name).await);
            }
            Command::BeginShow => self.begin_show().await,
            Command::CueNextActor => self.cue_next_actor().await,
            Command::SetManualCast { part, actor } => self.set_manual_cast(&part, &actor),
            Command::ClearManualCast { part } => self.clear_manual_cast(&part),
            Command::ToggleAutoCast => self.toggle_auto_cast(),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Reannounce => self.on_reannounce_due().await,
        }
    }

    // Intents

    /// Director: open a production of `title` and announce it
    pub async fn make_invite(&mut self, title: &str) -> Result<Production> {
        self.ensure_started()?;
        if matches!(self.state, ProtocolState::Joining | ProtocolState::Running) {
            return Err(AppError::Core(cuecannon_core::Error::InvalidOperation(
                "cannot direct while a show is in progress".into(),
            )));
        }

        let script = self.repository.fetch_script(title).await?;
        let production = Production::new(title);

        self.state = ProtocolState::Announcing;
        self.session.open_casting(production.clone(), script);
        self.registry
            .insert(production.id.clone(), production.clone());

        self.publish(&Self::announcement(&production)).await;
        info!(production_id = %production.id, title, "Production announced");

        self.state = ProtocolState::Casting;
        self.observer.on_casting_changed(self.session.casting());
        Ok(production)
    }

    /// Actor: join `production` under `name`; returns the local casting key
    pub async fn accept_invite(&mut self, production: Production, name: &str) -> Result<String> {
        self.ensure_started()?;
        if matches!(self.state, ProtocolState::Casting | ProtocolState::Running) {
            return Err(AppError::Core(cuecannon_core::Error::InvalidOperation(
                "cannot join while a show is in progress".into(),
            )));
        }

        let script = self.repository.fetch_script(&production.title).await?;
        let identity = self.overlay.local_identity().to_string();

        info!(production_id = %production.id, name, "Accepting invite");
        self.session.join(production, script);
        self.state = ProtocolState::Joining;

        self.publish(&Message::AcceptInvite {
            identity: identity.clone(),
            name: name.to_string(),
        })
        .await;
        Ok(identity)
    }

    /// Director: freeze casting and start cueing. While running this
    /// restarts every peer from the first line with the frozen casting.
    pub async fn begin_show(&mut self) {
        if self.session.role() != Some(Role::Director) {
            warn!(state = ?self.state, "Only the director can begin the show");
            return;
        }

        let actors_by_part = match self.state {
            ProtocolState::Casting => self.session.casting().broadcast_form(),
            ProtocolState::Running | ProtocolState::Ended => self.session.actors_by_part().clone(),
            _ => {
                warn!(state = ?self.state, "Cannot begin show without an active production");
                return;
            }
        };

        self.publish(&Message::BeginShow {
            actors_by_part: actors_by_part.clone(),
        })
        .await;
        self.start_show(actors_by_part);
    }

    /// Any peer: advance the shared cue pointer
    pub async fn cue_next_actor(&mut self) {
        if self.state != ProtocolState::Running {
            warn!(state = ?self.state, "Cannot cue outside a running show");
            return;
        }

        self.publish(&Message::CueNextActor).await;
        self.advance_cue();
    }

    pub fn set_manual_cast(&mut self, part: &str, actor: &str) {
        if !self.ensure_director_casting() {
            return;
        }
        match self.session.set_manual_cast(part, actor) {
            Ok(()) => {
                info!(part, actor, "Part cast manually");
                self.observer.on_casting_changed(self.session.casting());
            }
            Err(e) => warn!(part, error = %e, "Manual cast rejected"),
        }
    }

    pub fn clear_manual_cast(&mut self, part: &str) {
        if !self.ensure_director_casting() {
            return;
        }
        match self.session.clear_manual_cast(part) {
            Ok(true) => self.observer.on_casting_changed(self.session.casting()),
            Ok(false) => debug!(part, "No manual cast to clear"),
            Err(e) => warn!(part, error = %e, "Clearing manual cast rejected"),
        }
    }

    pub fn toggle_auto_cast(&mut self) {
        if !self.ensure_director_casting() {
            return;
        }
        match self.session.toggle_auto_cast() {
            Ok(enabled) => {
                info!(enabled, "Auto-cast toggled");
                self.observer.on_casting_changed(self.session.casting());
            }
            Err(e) => warn!(error = %e, "Toggling auto-cast rejected"),
        }
    }

    // Inbound

    pub async fn handle_overlay_event(&mut self, event: OverlayEvent) {
        match event {
            OverlayEvent::PeerConnected(peer) => {
                debug!(peer = %peer.short(), "Peer connected");
                self.schedule_reannounce();
            }
            OverlayEvent::PeerDisconnected(peer) => {
                debug!(peer = %peer.short(), "Peer disconnected");
            }
            OverlayEvent::Message { topic, from, data } => {
                if !self.started {
                    warn!(peer = %from.short(), "Message before engine start, dropping");
                    return;
                }
                if topic != LOBBY_TOPIC {
                    debug!(topic, "Message on unknown topic, dropping");
                    return;
                }

                match Message::decode(&data) {
                    Ok(message) => {
                        self.last_sync = Some(Utc::now());
                        debug!(peer = %from.short(), kind = message.kind(), "Received message");
                        self.dispatch(message);
                    }
                    Err(e) => warn!(peer = %from.short(), error = %e, "Undecodable message, dropping"),
                }
            }
        }
    }

    fn dispatch(&mut self, message: Message) {
        match message {
            Message::ShareProduction { title, id } => self.on_share_production(title, id),
            Message::AcceptInvite { identity, name } => self.on_accept_invite(identity, name),
            Message::BeginShow { actors_by_part } => self.on_begin_show(actors_by_part),
            Message::CueNextActor => self.on_cue_next_actor(),
        }
    }

    fn on_share_production(&mut self, title: String, id: String) {
        if self.registry.contains_key(&id) {
            debug!(production_id = %id, "Production already known");
            return;
        }

        let production = Production::with_id(id, title);
        info!(production_id = %production.id, title = %production.title, "Production known");
        self.registry
            .insert(production.id.clone(), production.clone());
        self.observer.on_production_known(&production);
    }

    fn on_accept_invite(&mut self, identity: String, name: String) {
        if self.session.role() != Some(Role::Director) || self.state != ProtocolState::Casting {
            debug!(identity, state = ?self.state, "Not casting, ignoring invite acceptance");
            return;
        }

        let actor = Actor::new(identity, name);
        if self.session.add_actor(actor.clone()) {
            info!(identity = %actor.identity, name = %actor.name, "Actor joined");
            self.observer.on_actor_joined(&actor);
            self.observer.on_casting_changed(self.session.casting());
        }
    }

    fn on_begin_show(&mut self, actors_by_part: ActorsByPart) {
        if self.session.production().is_none() {
            debug!("No production, ignoring show start");
            return;
        }
        self.start_show(actors_by_part);
    }

    fn on_cue_next_actor(&mut self) {
        if self.state != ProtocolState::Running {
            debug!(state = ?self.state, "Not running, ignoring cue");
            return;
        }
        self.advance_cue();
    }

    // Transitions

    fn start_show(&mut self, actors_by_part: ActorsByPart) {
        if let Err(e) = self.session.begin(actors_by_part) {
            warn!(error = %e, "Show could not begin");
            return;
        }

        self.state = ProtocolState::Running;
        info!(parts = self.session.actors_by_part().len(), "Show begun");
        self.observer.on_show_begun(self.session.actors_by_part());

        match self.session.cue_view() {
            Some(cue) => self.observer.on_cue_advanced(&cue),
            None => self.end_show(),
        }
    }

    fn advance_cue(&mut self) {
        match self.session.advance_cue() {
            Ok(CueAdvance::Cue(cue)) => {
                debug!(line = cue.line_number, part = %cue.part, "Cue advanced");
                self.observer.on_cue_advanced(&cue);
            }
            Ok(CueAdvance::Ended) => self.end_show(),
            Err(e) => warn!(error = %e, "Cue could not advance"),
        }
    }

    fn end_show(&mut self) {
        if self.state == ProtocolState::Ended {
            return;
        }
        self.state = ProtocolState::Ended;
        info!("Show ended");
        self.observer.on_show_ended();
    }

    // Re-announce

    fn schedule_reannounce(&self) {
        let tx = self.timer_tx.clone();
        let delay = self.reannounce_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Timer::Reannounce);
        });
    }

    /// Republish the active production if still casting
    pub async fn on_reannounce_due(&mut self) {
        if self.session.role() != Some(Role::Director) || self.state != ProtocolState::Casting {
            debug!(state = ?self.state, "Not casting, skipping re-announce");
            return;
        }
        let Some(production) = self.session.production().cloned() else {
            return;
        };

        debug!(production_id = %production.id, "Re-announcing production");
        self.publish(&Self::announcement(&production)).await;
    }

    // Helpers

    fn announcement(production: &Production) -> Message {
        Message::ShareProduction {
            title: production.title.clone(),
            id: production.id.clone(),
        }
    }

    /// Publish on the lobby; failures are logged and local state still moves
    async fn publish(&mut self, message: &Message) {
        if let Err(e) = self.overlay.publish(LOBBY_TOPIC, message.encode()).await {
            warn!(kind = message.kind(), error = %e, "Failed to publish message");
        }
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(AppError::NotStarted)
        }
    }

    fn ensure_director_casting(&self) -> bool {
        if self.session.role() == Some(Role::Director) && self.state == ProtocolState::Casting {
            true
        } else {
            warn!(state = ?self.state, "Casting is only editable by the director before the show");
            false
        }
    }
}
