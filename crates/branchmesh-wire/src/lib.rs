//! # branchmesh-wire: Binary wire protocol for `branchmesh`
//!
//! Every replica exposes two request/response surfaces on a single listener:
//!
//! - the **client surface** (`Query`, `Deposit`, `Withdraw`), used by
//!   customer sessions;
//! - the **peer surface** (`PropagateDeposit`, `PropagateWithdraw`), used by
//!   other replicas during broadcast.
//!
//! ## Framing
//!
//! ```text
//! ┌─────────┬──────────┬──────────────┬──────────────────────────┐
//! │ version │ reserved │ length (BE)  │ payload (postcard)       │
//! │ 1 byte  │ 3 bytes  │ 4 bytes      │ `length` bytes           │
//! └─────────┴──────────┴──────────────┴──────────────────────────┘
//! ```
//!
//! Payloads are [`Request`] or [`Response`] envelopes serialized with
//! `postcard`. A response carries the id of the request it answers.

mod error;
mod frame;
mod message;

pub use error::{WireError, WireResult};
pub use frame::{FRAME_HEADER_SIZE, Frame, MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use message::{
    AckResponse, BalanceResponse, ErrorCode, ErrorResponse, Request, RequestId, RequestPayload,
    Response, ResponsePayload, Surface,
};
