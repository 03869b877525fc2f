// SPDX-License-Identifier: GPL-3.0-only
//! Lifecycle shared by every media activity
//!
//! Image capture, video capture and streaming all move through the same
//! Idle/Init/Run/Error states. The legal edges live in one table keyed by
//! `(state, event)`; anything not in the table is rejected and leaves the
//! state untouched. Error is reachable from anywhere through a fault and is
//! drained only by `uninit`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, error, warn};

use crate::errors::{MediaError, MediaResult};

/// Lifecycle state of a media activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityState {
    Idle,
    Init,
    Run,
    Error,
}

/// Request applied to an activity's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    Init,
    Start,
    Stop,
    Uninit,
    Fault,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityState::Idle => "Idle",
            ActivityState::Init => "Init",
            ActivityState::Run => "Run",
            ActivityState::Error => "Error",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityEvent::Init => "init",
            ActivityEvent::Start => "start",
            ActivityEvent::Stop => "stop",
            ActivityEvent::Uninit => "uninit",
            ActivityEvent::Fault => "fault",
        };
        f.write_str(name)
    }
}

use ActivityEvent as E;
use ActivityState as S;

/// Legal edges other than faults
const TRANSITIONS: &[(ActivityState, ActivityEvent, ActivityState)] = &[
    (S::Idle, E::Init, S::Init),
    (S::Init, E::Start, S::Run),
    (S::Run, E::Stop, S::Init),
    // stop releases resources but Error only drains through uninit
    (S::Error, E::Stop, S::Error),
    (S::Init, E::Uninit, S::Idle),
    (S::Error, E::Uninit, S::Idle),
];

/// Look up the target state for `event` applied in `state`
pub fn next_state(state: ActivityState, event: ActivityEvent) -> Option<ActivityState> {
    if event == ActivityEvent::Fault {
        return Some(ActivityState::Error);
    }

    TRANSITIONS
        .iter()
        .find(|(from, ev, _)| *from == state && *ev == event)
        .map(|(_, _, to)| *to)
}

/// Table-driven state machine guarded by a mutex
///
/// Activities share one instance with their worker threads through an `Arc`
/// when a worker needs to complete a run on its own.
#[derive(Debug)]
pub struct StateMachine {
    name: &'static str,
    state: Mutex<ActivityState>,
}

impl StateMachine {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(ActivityState::Idle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ActivityState {
        *self.lock()
    }

    /// Validate `event` without applying it
    pub fn check(&self, event: ActivityEvent) -> MediaResult<ActivityState> {
        let state = self.state();
        self.resolve(state, event)
    }

    /// Apply `event`, returning the new state
    pub fn apply(&self, event: ActivityEvent) -> MediaResult<ActivityState> {
        let mut state = self.lock();
        let next = self.resolve(*state, event)?;
        debug!(activity = self.name, from = %*state, to = %next, "State transition");
        *state = next;
        Ok(next)
    }

    /// Move to Error from whatever state the activity is in
    pub fn fault(&self, reason: &str) {
        let mut state = self.lock();
        warn!(activity = self.name, from = %*state, reason, "Activity faulted");
        *state = ActivityState::Error;
    }

    /// Run to Init for workers that finish on their own; no-op in any other state
    pub fn complete_run(&self) -> bool {
        let mut state = self.lock();
        if *state == ActivityState::Run {
            debug!(activity = self.name, "Run completed");
            *state = ActivityState::Init;
            true
        } else {
            false
        }
    }

    fn resolve(&self, state: ActivityState, event: ActivityEvent) -> MediaResult<ActivityState> {
        next_state(state, event).ok_or_else(|| {
            error!(activity = self.name, state = %state, event = %event, "Invalid state");
            MediaError::InvalidState { from: state, event }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
