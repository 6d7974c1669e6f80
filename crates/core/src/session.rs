//! Show session state
//!
//! The in-memory model each peer keeps for the current production. All
//! mutation goes through the named transitions below so the state machine can
//! be driven and checked without any transport.

use std::collections::BTreeMap;

use tracing::debug;

use crate::casting::{cast, ActorsByPart, Casting};
use crate::error::{Error, Result};
use crate::models::{Actor, ActorIdentity, PartId, Production, Script};

/// Where the local user is in the show lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading the script index and starting the transport
    Starting,
    /// Director is choosing a script
    Browsing,
    /// Director has an active production and is collecting actors
    Casting,
    /// Actor accepted an invite and is waiting for the show to begin
    Naming,
    /// Show is running and cues are being tracked
    Cueing,
}

/// Which role this peer plays in the current production
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Director,
    Actor,
}

/// The current cue as seen by the local peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueView {
    pub line_number: usize,
    pub part: PartId,
    pub scene_ref: String,
    /// Only revealed when the local peer plays `part`
    pub text: Option<String>,
}

/// Outcome of advancing the cue pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CueAdvance {
    Cue(CueView),
    /// The pointer moved past the last line
    Ended,
}

/// Per-peer show state
#[derive(Debug, Clone)]
pub struct ShowSession {
    identity: Option<ActorIdentity>,
    stage: Stage,
    role: Option<Role>,
    production: Option<Production>,
    script: Script,
    actors: Vec<Actor>,
    manually_cast: BTreeMap<PartId, ActorIdentity>,
    auto_cast: bool,
    casting: Casting,
    actors_by_part: ActorsByPart,
    cue_line_number: usize,
    begun: bool,
}

impl Default for ShowSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ShowSession {
    pub fn new() -> Self {
        Self {
            identity: None,
            stage: Stage::Starting,
            role: None,
            production: None,
            script: Script::default(),
            actors: Vec::new(),
            manually_cast: BTreeMap::new(),
            auto_cast: true,
            casting: Casting::default(),
            actors_by_part: ActorsByPart::new(),
            cue_line_number: 0,
            begun: false,
        }
    }

    // Accessors

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn production(&self) -> Option<&Production> {
        self.production.as_ref()
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn manually_cast(&self) -> &BTreeMap<PartId, ActorIdentity> {
        &self.manually_cast
    }

    pub fn auto_cast(&self) -> bool {
        self.auto_cast
    }

    pub fn casting(&self) -> &Casting {
        &self.casting
    }

    pub fn actors_by_part(&self) -> &ActorsByPart {
        &self.actors_by_part
    }

    pub fn cue_line_number(&self) -> usize {
        self.cue_line_number
    }

    pub fn begun(&self) -> bool {
        self.begun
    }

    /// Part speaking at the cue pointer
    pub fn current_part(&self) -> Option<&str> {
        self.script
            .line(self.cue_line_number)
            .map(|l| l.speaker.as_str())
    }

    /// Text of the current cue, revealed only to the actor playing it
    pub fn current_cue_text(&self) -> Option<&str> {
        let line = self.script.line(self.cue_line_number)?;
        let actor = self.actors_by_part.get(&line.speaker)?;
        if Some(actor.as_str()) == self.identity() {
            Some(line.text.as_str())
        } else {
            None
        }
    }

    pub fn cue_view(&self) -> Option<CueView> {
        if !self.begun {
            return None;
        }
        let line = self.script.line(self.cue_line_number)?;
        Some(CueView {
            line_number: self.cue_line_number,
            part: line.speaker.clone(),
            scene_ref: line.scene_ref.clone(),
            text: self.current_cue_text().map(str::to_string),
        })
    }

    // Transitions

    /// Record the local transport identity
    pub fn set_identity(&mut self, identity: impl Into<ActorIdentity>) {
        self.identity = Some(identity.into());
    }

    /// Script index loaded; the director can pick a play
    pub fn browse(&mut self) {
        self.stage = Stage::Browsing;
    }

    /// Director selected a play. Any previous production is discarded.
    pub fn open_casting(&mut self, production: Production, script: Script) {
        self.reset_show();
        self.production = Some(production);
        self.script = script;
        self.role = Some(Role::Director);
        self.stage = Stage::Casting;
        self.recast();
    }

    /// Actor accepted an invite to `production`
    pub fn join(&mut self, production: Production, script: Script) {
        self.reset_show();
        self.production = Some(production);
        self.script = script;
        self.role = Some(Role::Actor);
        self.stage = Stage::Naming;
    }

    /// Add an actor to the director's roster.
    ///
    /// Returns `false` when the roster is frozen, the session is not casting,
    /// or the identity is already on the roster.
    pub fn add_actor(&mut self, actor: Actor) -> bool {
        if self.begun || self.stage != Stage::Casting {
            debug!(identity = %actor.identity, "Roster closed, ignoring actor");
            return false;
        }
        if self.actors.iter().any(|a| a.identity == actor.identity) {
            debug!(identity = %actor.identity, "Actor already on roster");
            return false;
        }

        self.actors.push(actor);
        self.recast();
        true
    }

    /// Pin `part` to `actor` regardless of automatic balancing
    pub fn set_manual_cast(&mut self, part: &str, actor: &str) -> Result<()> {
        self.ensure_casting_open()?;
        if !self.script.has_part(part) {
            return Err(Error::NotFound(format!("part '{}'", part)));
        }

        self.manually_cast
            .insert(part.to_string(), actor.to_string());
        self.recast();
        Ok(())
    }

    /// Drop a manual override; returns whether one existed
    pub fn clear_manual_cast(&mut self, part: &str) -> Result<bool> {
        self.ensure_casting_open()?;
        let removed = self.manually_cast.remove(part).is_some();
        if removed {
            self.recast();
        }
        Ok(removed)
    }

    /// Flip automatic casting and return the new setting
    pub fn toggle_auto_cast(&mut self) -> Result<bool> {
        self.ensure_casting_open()?;
        self.auto_cast = !self.auto_cast;
        self.recast();
        Ok(self.auto_cast)
    }

    /// Adopt `actors_by_part` as authoritative and start cueing from line 0.
    ///
    /// Freezes the roster. Calling it again restarts the show.
    pub fn begin(&mut self, actors_by_part: ActorsByPart) -> Result<()> {
        if self.production.is_none() {
            return Err(Error::InvalidOperation("no active production".into()));
        }

        self.actors_by_part = actors_by_part;
        self.cue_line_number = 0;
        self.begun = true;
        self.stage = Stage::Cueing;
        Ok(())
    }

    /// Move the cue pointer forward by one line
    pub fn advance_cue(&mut self) -> Result<CueAdvance> {
        if !self.begun {
            return Err(Error::InvalidOperation("show has not begun".into()));
        }

        if self.cue_line_number < self.script.len() {
            self.cue_line_number += 1;
        }

        match self.cue_view() {
            Some(view) => Ok(CueAdvance::Cue(view)),
            None => Ok(CueAdvance::Ended),
        }
    }

    pub fn has_ended(&self) -> bool {
        self.begun && self.cue_line_number >= self.script.len()
    }

    // Derived views

    /// Roster members holding no parts
    pub fn uncast_actors(&self) -> Vec<&Actor> {
        self.actors
            .iter()
            .filter(|a| self.casting.parts_for(&a.identity).is_empty())
            .collect()
    }

    pub fn uncast_parts(&self) -> Vec<PartId> {
        self.casting.uncast_parts()
    }

    /// Local actor's parts, ordered by who speaks next from the cue pointer
    pub fn upcoming_parts(&self) -> Vec<PartId> {
        let Some(identity) = self.identity() else {
            return Vec::new();
        };

        let mut mine: Vec<PartId> = self
            .actors_by_part
            .iter()
            .filter(|(_, actor)| actor.as_str() == identity)
            .map(|(part, _)| part.clone())
            .collect();

        let lines = self.script.lines();
        let start = self.cue_line_number.min(lines.len());
        let next_to_speak: Vec<&str> = lines[start..]
            .iter()
            .chain(lines[..start].iter())
            .map(|l| l.speaker.as_str())
            .collect();

        mine.sort_by_key(|part| {
            next_to_speak
                .iter()
                .position(|s| *s == part.as_str())
                .unwrap_or(usize::MAX)
        });
        mine
    }

    fn ensure_casting_open(&self) -> Result<()> {
        if self.stage != Stage::Casting || self.begun {
            return Err(Error::InvalidOperation("casting is closed".into()));
        }
        Ok(())
    }

    fn recast(&mut self) {
        self.casting = cast(
            &self.script,
            &self.actors,
            &self.manually_cast,
            self.auto_cast,
        );
    }

    fn reset_show(&mut self) {
        self.actors.clear();
        self.manually_cast.clear();
        self.auto_cast = true;
        self.casting = Casting::default();
        self.actors_by_part.clear();
        self.cue_line_number = 0;
        self.begun = false;
    }
}
