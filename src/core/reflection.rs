/// Reflection lifecycle — edge-triggered generation state for one module
/// visit.
///
/// Generation fires exactly once per visit to the terminal reflection card,
/// guarded by an explicit "requested this epoch" state rather than by
/// render timing. Results from a superseded arm (a retry or reset issued
/// in the meantime) are discarded by epoch comparison.

use rustc_hash::FxHashMap;

/// Generated reflection text keyed by inflection key.
pub type ReflectionMap = FxHashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionPhase {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Handed out on every arm; pins the generation epoch the result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationTicket {
    epoch: u64,
}

#[derive(Debug)]
pub struct ReflectionLifecycle {
    phase: ReflectionPhase,
    reflections: Option<ReflectionMap>,
    epoch: u64,
}

impl Default for ReflectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ReflectionLifecycle {
    pub fn new() -> ReflectionLifecycle {
        ReflectionLifecycle {
            phase: ReflectionPhase::Idle,
            reflections: None,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> ReflectionPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == ReflectionPhase::Loading
    }

    pub fn has_error(&self) -> bool {
        self.phase == ReflectionPhase::Error
    }

    pub fn reflections(&self) -> Option<&ReflectionMap> {
        self.reflections.as_ref()
    }

    /// Edge-triggered arm: transitions `Idle → Loading` only when the
    /// current card is the reflection card and nothing has been requested
    /// this visit. Re-invoking while loading, ready, or errored returns
    /// `None`, so redundant calls cannot refire generation.
    pub fn arm(&mut self, on_reflection_card: bool) -> Option<GenerationTicket> {
        if !on_reflection_card || self.phase != ReflectionPhase::Idle {
            return None;
        }
        self.begin()
    }

    /// Explicit user-initiated retry; only legal from the error state.
    pub fn retry(&mut self) -> Option<GenerationTicket> {
        if self.phase != ReflectionPhase::Error {
            return None;
        }
        self.begin()
    }

    fn begin(&mut self) -> Option<GenerationTicket> {
        self.epoch += 1;
        self.phase = ReflectionPhase::Loading;
        Some(GenerationTicket { epoch: self.epoch })
    }

    /// Apply a successful generation. Stale tickets are discarded.
    pub fn complete(&mut self, ticket: GenerationTicket, reflections: ReflectionMap) -> bool {
        if ticket.epoch != self.epoch || self.phase != ReflectionPhase::Loading {
            return false;
        }
        self.reflections = Some(reflections);
        self.phase = ReflectionPhase::Ready;
        true
    }

    /// Record an outright generation failure. Stale tickets are discarded.
    pub fn fail(&mut self, ticket: GenerationTicket) -> bool {
        if ticket.epoch != self.epoch || self.phase != ReflectionPhase::Loading {
            return false;
        }
        self.phase = ReflectionPhase::Error;
        true
    }

    /// Back to idle with cleared data; invalidates outstanding tickets.
    /// Fired when the active module changes.
    pub fn reset(&mut self) {
        self.phase = ReflectionPhase::Idle;
        self.reflections = None;
        self.epoch += 1;
    }
}
