//! Alerting System
//!
//! Turns per-frame face metrics into discrete alert events:
//! - Eye closure and yawn debounce over consecutive frames
//! - Head-down detection over a continuous hold time
//! - One cooldown shared by every alert kind
//! - Sinks that receive each emitted event

mod logic;
mod sink;

pub use logic::{AlertConfig, AlertKind, AlertLogic, AlertLogicState};
pub use sink::{AlertSink, LogAlertSink, RecordingSink};
