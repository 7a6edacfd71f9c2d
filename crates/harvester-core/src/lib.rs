//! Core types and logic for harvester.
//!
//! This crate holds the pure parts of the deposit-collecting bot: geometry,
//! target ordering, phase and configuration types, motion fingerprinting, and
//! the JSON-line protocol spoken between detection producers and the daemon.
//! Nothing here touches the screen, the pointer, or the clock.
//!
//! # Modules
//!
//! - [`geometry`]: Points, rectangles, and window-to-screen translation
//! - [`selector`]: Nearest-first target ordering with an ignore radius
//! - [`phase`]: Controller state machine phases
//! - [`config`]: Controller timings and validation
//! - [`motion`]: Change detection on the coordinate readout region
//! - [`snapshot`]: Controller status and content hashing
//! - [`protocol`]: JSON-line request/response protocol
//! - [`error`]: API error types with recovery suggestions
//!
//! # Target Selection
//!
//! The player is always drawn at the centre of the game window. Targets are
//! visited nearest first, skipping any within the ignore radius:
//!
//! | Distance from centre | Treatment |
//! |----------------------|-----------|
//! | `<= ignore_radius` | Dropped (likely the deposit just collected) |
//! | `> ignore_radius` | Kept, ascending by distance, ties in input order |

pub mod config;
pub mod error;
pub mod geometry;
pub mod motion;
pub mod phase;
pub mod protocol;
pub mod selector;
pub mod snapshot;
