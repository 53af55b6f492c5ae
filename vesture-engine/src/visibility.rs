//! Visibility gating and edge-triggered visibility reporting.
//!
//! Pure state machine, no I/O: the session controller feeds it proximity
//! each tick and performs the reports it asks for. This mirrors how the
//! engine keeps I/O in the orchestrator.

use std::time::Duration;
use tokio::time::Instant;

/// Gate state. Gated suppresses visible=true reporting and new downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Gated,
    Open,
}

/// Tracks zone/cutscene context and decides when visibility transitions
/// should be reported.
#[derive(Debug)]
pub struct VisibilityGate {
    state: GateState,
    grace_window: Duration,
    grace_until: Option<Instant>,
    reaffirmed_in_grace: bool,
    last_reported: Option<bool>,
    cutscene_active: bool,
}

impl VisibilityGate {
    /// Creates an open gate.
    pub fn new(grace_window: Duration) -> Self {
        Self {
            state: GateState::Open,
            grace_window,
            grace_until: None,
            reaffirmed_in_grace: false,
            last_reported: None,
            cutscene_active: false,
        }
    }

    /// Current gate state.
    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    /// The visibility last reported, if any.
    #[must_use]
    pub fn last_reported(&self) -> Option<bool> {
        self.last_reported
    }

    /// Zone transition started: gate. In-flight downloads are cancelled by
    /// the caller.
    pub fn note_zone_change(&mut self) {
        self.state = GateState::Gated;
        self.grace_until = None;
    }

    /// Zone load finished: reopen unless a cutscene still holds the gate.
    pub fn note_zone_loaded(&mut self) {
        if !self.cutscene_active {
            self.reopen();
        }
    }

    /// Cutscene started/ended.
    pub fn note_cutscene(&mut self, active: bool) {
        self.cutscene_active = active;
        if active {
            self.state = GateState::Gated;
            self.grace_until = None;
        } else {
            self.reopen();
        }
    }

    fn reopen(&mut self) {
        if self.state == GateState::Gated {
            self.state = GateState::Open;
            self.grace_until = Some(Instant::now() + self.grace_window);
            self.reaffirmed_in_grace = false;
        }
    }

    /// Marks the peer not-visible immediately (target entity invalidated).
    /// Returns true when a visible=false edge should be reported.
    pub fn force_not_visible(&mut self) -> bool {
        let was_visible = self.last_reported == Some(true);
        self.last_reported = Some(false);
        was_visible
    }

    /// Evaluates one tick. `proximate` is the caller's combined
    /// distance-and-screen-projection check. Returns the visibility value
    /// to report, or `None` when nothing should be reported.
    ///
    /// While gated, visible=true is never returned; visible=false edges
    /// still are. During the grace window after reopening, a steady-state
    /// true is reaffirmed exactly once.
    pub fn evaluate(&mut self, proximate: bool) -> Option<bool> {
        let visible = proximate && self.state == GateState::Open;

        if self.state == GateState::Gated {
            // Only downward edges escape the gate.
            if self.last_reported == Some(true) {
                self.last_reported = Some(false);
                return Some(false);
            }
            return None;
        }

        if let Some(until) = self.grace_until {
            if Instant::now() < until {
                if visible && !self.reaffirmed_in_grace {
                    self.reaffirmed_in_grace = true;
                    self.last_reported = Some(true);
                    return Some(true);
                }
            } else {
                self.grace_until = None;
            }
        }

        if self.last_reported != Some(visible) {
            self.last_reported = Some(visible);
            return Some(visible);
        }
        None
    }
}
