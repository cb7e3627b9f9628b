/// Card navigation state machine — permission-checked transitions with a
/// deferred, cancellable index commit.

use std::time::Duration;

/// How long the presentation layer should animate before committing a
/// transition. The library never sleeps itself; callers wait this long and
/// then call [`Navigator::commit`].
pub const TRANSITION_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// The navigator's current phase. `Animating` is a transient sub-state used
/// purely to signal the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Animating(Direction),
}

/// A granted transition waiting for its deferred commit. Carries the epoch
/// at grant time so a commit that arrives after a reset is discarded.
#[derive(Debug, Clone, Copy)]
pub struct PendingCommit {
    direction: Direction,
    epoch: u64,
}

impl PendingCommit {
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Tracks the current card position and transition phase for one module.
#[derive(Debug)]
pub struct Navigator {
    index: usize,
    total: usize,
    phase: Phase,
    epoch: u64,
}

impl Navigator {
    /// `total` must be at least 1 (modules are validated as non-empty).
    pub fn new(total: usize) -> Navigator {
        Navigator {
            index: 0,
            total,
            phase: Phase::Idle,
            epoch: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.phase, Phase::Animating(_))
    }

    /// Whether a forward request would be granted right now. `can_advance`
    /// is the caller-supplied gate for the current card (an inflection card
    /// must have a stored response).
    pub fn can_go_forward(&self, can_advance: impl FnOnce(usize) -> bool) -> bool {
        self.index + 1 < self.total && can_advance(self.index)
    }

    pub fn can_go_backward(&self) -> bool {
        self.index > 0
    }

    /// Request a transition. Returns a [`PendingCommit`] when granted; the
    /// caller commits it after [`TRANSITION_DELAY`]. Requests while already
    /// animating, or that fail the permission check, are silently ignored.
    pub fn request_transition(
        &mut self,
        direction: Direction,
        can_advance: impl FnOnce(usize) -> bool,
    ) -> Option<PendingCommit> {
        if self.is_animating() {
            return None;
        }

        let permitted = match direction {
            Direction::Forward => self.can_go_forward(can_advance),
            Direction::Backward => self.can_go_backward(),
        };
        if !permitted {
            return None;
        }

        self.epoch += 1;
        self.phase = Phase::Animating(direction);
        Some(PendingCommit {
            direction,
            epoch: self.epoch,
        })
    }

    /// Apply a previously granted transition. Returns false and changes
    /// nothing when the commit is stale (the navigator was reset since the
    /// grant).
    pub fn commit(&mut self, pending: PendingCommit) -> bool {
        if pending.epoch != self.epoch {
            return false;
        }
        match self.phase {
            Phase::Animating(direction) if direction == pending.direction => {
                match direction {
                    Direction::Forward => self.index += 1,
                    Direction::Backward => self.index -= 1,
                }
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }

    /// Return to the first card and invalidate any pending commit. Used on
    /// module teardown so a stale deferred commit cannot land on a new
    /// module.
    pub fn reset(&mut self, total: usize) {
        self.index = 0;
        self.total = total;
        self.phase = Phase::Idle;
        self.epoch += 1;
    }
}
