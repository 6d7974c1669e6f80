//! Observer interface between the engine and a front-end
//!
//! Callbacks run on the engine task and must not block. Every method has an
//! empty default so observers only implement what they display.

use cuecannon_core::{Actor, ActorsByPart, Casting, CueView, Production};
use tokio::sync::mpsc;

pub trait ShowObserver: Send + Sync + 'static {
    /// A production was announced on the lobby for the first time
    fn on_production_known(&mut self, _production: &Production) {}

    /// Director side: an actor joined the roster
    fn on_actor_joined(&mut self, _actor: &Actor) {}

    /// Director side: casting was recomputed
    fn on_casting_changed(&mut self, _casting: &Casting) {}

    fn on_show_begun(&mut self, _actors_by_part: &ActorsByPart) {}

    /// The current cue changed, including the opening cue
    fn on_cue_advanced(&mut self, _cue: &CueView) {}

    /// The cue pointer ran past the last line
    fn on_show_ended(&mut self) {}
}

/// Observer notifications as values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowEvent {
    ProductionKnown(Production),
    ActorJoined(Actor),
    CastingChanged(Casting),
    ShowBegun(ActorsByPart),
    CueAdvanced(CueView),
    ShowEnded,
}

/// Forwards every notification onto a channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ShowEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ShowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ShowEvent) {
        // Receiver gone means nobody is watching
        let _ = self.tx.send(event);
    }
}

impl ShowObserver for ChannelObserver {
    fn on_production_known(&mut self, production: &Production) {
        self.send(ShowEvent::ProductionKnown(production.clone()));
    }

    fn on_actor_joined(&mut self, actor: &Actor) {
        self.send(ShowEvent::ActorJoined(actor.clone()));
    }

    fn on_casting_changed(&mut self, casting: &Casting) {
        self.send(ShowEvent::CastingChanged(casting.clone()));
    }

    fn on_show_begun(&mut self, actors_by_part: &ActorsByPart) {
        self.send(ShowEvent::ShowBegun(actors_by_part.clone()));
    }

    fn on_cue_advanced(&mut self, cue: &CueView) {
        self.send(ShowEvent::CueAdvanced(cue.clone()));
    }

    fn on_show_ended(&mut self) {
        self.send(ShowEvent::ShowEnded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards() {
        let (mut observer, mut rx) = ChannelObserver::new();
        observer.on_actor_joined(&Actor::new("peer-1", "Tessa"));
        observer.on_show_ended();

        assert_eq!(
            rx.try_recv().unwrap(),
            ShowEvent::ActorJoined(Actor::new("peer-1", "Tessa"))
        );
        assert_eq!(rx.try_recv().unwrap(), ShowEvent::ShowEnded);
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (mut observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_show_ended();
    }
}
