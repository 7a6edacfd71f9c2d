//! Controller phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One state of the controller's state machine.
///
/// ```text
/// Initializing ──warm-up──▶ Searching ──click──▶ Collecting
///                              ▲                    │
///                              └────not moving──────┘
/// ```
///
/// `Attacking` is reserved and has no transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Initializing,
    Searching,
    Attacking,
    Collecting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initializing => write!(f, "initializing"),
            Phase::Searching => write!(f, "searching"),
            Phase::Attacking => write!(f, "attacking"),
            Phase::Collecting => write!(f, "collecting"),
        }
    }
}
