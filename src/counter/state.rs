//! Counter state as published to observers.

use serde::{Deserialize, Serialize};

/// Where the counter is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterPhase {
    /// No count available: no scope, or none obtained for it yet
    Idle,
    /// A count is being fetched
    Loading,
    /// The displayed value is the last successful count
    Ready,
}

impl CounterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterPhase::Idle => "idle",
            CounterPhase::Loading => "loading",
            CounterPhase::Ready => "ready",
        }
    }
}

/// Snapshot of a live counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub value: u64,
    pub loading: bool,
    pub phase: CounterPhase,
}

impl CounterState {
    /// `{0, false}` with no scope
    pub fn idle() -> Self {
        Self {
            value: 0,
            loading: false,
            phase: CounterPhase::Idle,
        }
    }

    /// Fetch pending; `value` is what stays displayed meanwhile
    pub fn loading(value: u64) -> Self {
        Self {
            value,
            loading: true,
            phase: CounterPhase::Loading,
        }
    }

    pub fn ready(value: u64) -> Self {
        Self {
            value,
            loading: false,
            phase: CounterPhase::Ready,
        }
    }

    /// Same value with loading cleared
    pub fn settled(self) -> Self {
        Self::ready(self.value)
    }
}

impl Default for CounterState {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert_eq!(CounterState::default(), CounterState::idle());

        let loading = CounterState::loading(4);
        assert!(loading.loading);
        assert_eq!(loading.phase, CounterPhase::Loading);

        let settled = loading.settled();
        assert_eq!(settled, CounterState::ready(4));
    }

    #[test]
    fn test_serialized_shape() {
        let wire = serde_json::to_value(CounterState::ready(2)).unwrap();
        assert_eq!(wire["phase"], "ready");
        assert_eq!(wire["value"], 2);
        assert_eq!(wire["loading"], false);
    }
}
