//! Tracks whether the interviewer is producing speech.
//!
//! Every [`SpeakingCoordinator::begin`] hands out a [`SpeakingTurn`]. The turn
//! emits its "finished" signal exactly once: explicitly through
//! [`SpeakingTurn::finish`], or with [`FinishReason::Cancelled`] when dropped.
//! Listeners can therefore never be left waiting on a start without an end.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeakingState {
    Idle,
    Speaking,
    JustFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    PlaybackEnded,
    SynthesisFailed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingSignal {
    Started { turn: u64 },
    Finished { turn: u64, reason: FinishReason },
}

struct Inner {
    state: watch::Sender<SpeakingState>,
    signals: broadcast::Sender<SpeakingSignal>,
    next_turn: AtomicU64,
    active: AtomicUsize,
}

#[derive(Clone)]
pub struct SpeakingCoordinator {
    inner: Arc<Inner>,
}

impl Default for SpeakingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakingCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SpeakingState::Idle);
        let (signals, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                state,
                signals,
                next_turn: AtomicU64::new(1),
                active: AtomicUsize::new(0),
            }),
        }
    }

    pub fn state(&self) -> SpeakingState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeakingSignal> {
        self.inner.signals.subscribe()
    }

    /// Interviewer starts synthesising speech.
    pub fn begin(&self) -> SpeakingTurn {
        let turn = self.inner.next_turn.fetch_add(1, Ordering::SeqCst);
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_replace(SpeakingState::Speaking);
        tracing::debug!(turn, "interviewer starts speaking");
        let _ = self.inner.signals.send(SpeakingSignal::Started { turn });
        SpeakingTurn {
            coordinator: self.clone(),
            turn,
            finished: false,
        }
    }

    /// The listener has handled the last finish; back to idle.
    pub fn acknowledge(&self) {
        self.inner.state.send_if_modified(|state| {
            if *state == SpeakingState::JustFinished {
                *state = SpeakingState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn end(&self, turn: u64, reason: FinishReason) {
        let remaining = self.inner.active.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.inner.state.send_replace(SpeakingState::JustFinished);
        }
        tracing::debug!(turn, ?reason, "interviewer finished speaking");
        let _ = self.inner.signals.send(SpeakingSignal::Finished { turn, reason });
    }
}

/// One start/finish pair.
#[must_use = "dropping a turn immediately finishes it as cancelled"]
pub struct SpeakingTurn {
    coordinator: SpeakingCoordinator,
    turn: u64,
    finished: bool,
}

impl SpeakingTurn {
    pub fn id(&self) -> u64 {
        self.turn
    }

    pub fn finish(mut self, reason: FinishReason) {
        self.finished = true;
        self.coordinator.end(self.turn, reason);
    }
}

impl Drop for SpeakingTurn {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.end(self.turn, FinishReason::Cancelled);
        }
    }
}
