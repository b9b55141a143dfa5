//! # branchmesh-client: customer sessions
//!
//! A [`CustomerSession`] drives one customer's event list against the
//! replica set and records what it observed:
//!
//! - a [`TraceEntry`] per event, the JSON shape written to output files
//! - a [`SessionRecord`] per event, the full history used by
//!   [`check_session`] to test session guarantees

mod error;
pub mod guarantees;
mod session;
mod trace;

pub use error::{SessionError, SessionResult};
pub use guarantees::{Guarantee, GuaranteeResult, check_session};
pub use session::{CustomerSession, ReplicaClient, SessionEvent};
pub use trace::{EventStatus, Outcome, SessionRecord, TraceEntry};
