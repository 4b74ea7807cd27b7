#![forbid(unsafe_code)]

pub mod error;
pub mod flags;
pub mod ledger;
pub mod model;
pub mod policy;
pub mod session_clock;
pub mod time;

pub use error::Error;
pub use flags::ReviewFlagRegistry;
pub use ledger::AnswerLedger;
pub use policy::{Capabilities, ExamModePolicy};
pub use session_clock::{ClockError, SessionClock, TimeUrgency, format_clock};
pub use time::Clock;
