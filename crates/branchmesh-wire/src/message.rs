//! Request and response envelopes for both replica surfaces.

use std::fmt::{self, Display};

use branchmesh_types::{Operation, PropagationKind, PropagationMessage, ReplicaId};
use serde::{Deserialize, Serialize};

use crate::error::WireResult;
use crate::frame::Frame;

/// Correlates a response with the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two replica surfaces a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Customer-facing operations.
    Client,
    /// Replica-to-replica propagation.
    Peer,
}

impl Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Peer => f.write_str("peer"),
        }
    }
}

/// A request sent to a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub payload: RequestPayload,
}

/// Operation-specific request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPayload {
    Query,
    Deposit { amount: i64 },
    Withdraw { amount: i64 },
    PropagateDeposit { origin: ReplicaId, amount: i64 },
    PropagateWithdraw { origin: ReplicaId, amount: i64 },
}

impl RequestPayload {
    pub fn surface(&self) -> Surface {
        match self {
            Self::Query | Self::Deposit { .. } | Self::Withdraw { .. } => Surface::Client,
            Self::PropagateDeposit { .. } | Self::PropagateWithdraw { .. } => Surface::Peer,
        }
    }

    /// Short operation name, used as a tracing field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::PropagateDeposit { .. } => "propagate_deposit",
            Self::PropagateWithdraw { .. } => "propagate_withdraw",
        }
    }
}

impl From<Operation> for RequestPayload {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Query => Self::Query,
            Operation::Deposit { amount } => Self::Deposit { amount },
            Operation::Withdraw { amount } => Self::Withdraw { amount },
        }
    }
}

impl From<PropagationMessage> for RequestPayload {
    fn from(msg: PropagationMessage) -> Self {
        match msg.kind {
            PropagationKind::Deposit => Self::PropagateDeposit {
                origin: msg.origin,
                amount: msg.amount,
            },
            PropagationKind::Withdraw => Self::PropagateWithdraw {
                origin: msg.origin,
                amount: msg.amount,
            },
        }
    }
}

impl Request {
    pub fn new(id: RequestId, payload: impl Into<RequestPayload>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn to_frame(&self) -> WireResult<Frame> {
        Ok(Frame::new(postcard::to_allocvec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        Ok(postcard::from_bytes(&frame.payload)?)
    }
}

/// A response from a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub payload: ResponsePayload,
}

/// Operation-specific response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Answer to a client-surface operation.
    Balance(BalanceResponse),
    /// Answer to a peer-surface operation.
    Ack(AckResponse),
    /// The operation failed.
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// A failed operation.
///
/// `balance` is set when the replica still reports its balance alongside the
/// failure (an insufficient-funds withdraw does).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub balance: Option<i64>,
}

/// Machine-readable failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Business-rule rejection: the balance does not cover the amount.
    InsufficientFunds,
    /// A peer could not be reached during broadcast.
    RemoteUnavailable,
    /// A peer answered a propagation with a failure.
    PeerRejected,
    /// Amount was zero or negative.
    InvalidAmount,
    /// Applying the amount would overflow the balance.
    BalanceOverflow,
    /// Request could not be decoded or is not valid on this surface.
    InvalidRequest,
    /// Frame carried an unknown protocol version.
    UnsupportedVersion,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InsufficientFunds => "insufficient funds",
            Self::RemoteUnavailable => "remote unavailable",
            Self::PeerRejected => "peer rejected",
            Self::InvalidAmount => "invalid amount",
            Self::BalanceOverflow => "balance overflow",
            Self::InvalidRequest => "invalid request",
            Self::UnsupportedVersion => "unsupported version",
        };
        f.write_str(name)
    }
}

impl Response {
    pub fn new(id: RequestId, payload: ResponsePayload) -> Self {
        Self { id, payload }
    }

    pub fn balance(id: RequestId, balance: i64) -> Self {
        Self::new(
            id,
            ResponsePayload::Balance(BalanceResponse {
                balance,
                success: true,
            }),
        )
    }

    pub fn ack(id: RequestId) -> Self {
        Self::new(id, ResponsePayload::Ack(AckResponse { success: true }))
    }

    pub fn error(id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::error_with_balance(id, code, message, None)
    }

    pub fn error_with_balance(
        id: RequestId,
        code: ErrorCode,
        message: impl Into<String>,
        balance: Option<i64>,
    ) -> Self {
        Self::new(
            id,
            ResponsePayload::Error(ErrorResponse {
                code,
                message: message.into(),
                balance,
            }),
        )
    }

    pub fn to_frame(&self) -> WireResult<Frame> {
        Ok(Frame::new(postcard::to_allocvec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        Ok(postcard::from_bytes(&frame.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use test_case::test_case;

    use super::*;

    #[test_case(RequestPayload::Query, Surface::Client)]
    #[test_case(RequestPayload::Withdraw { amount: 3 }, Surface::Client)]
    #[test_case(RequestPayload::PropagateDeposit { origin: ReplicaId::new(1), amount: 3 }, Surface::Peer)]
    #[test_case(RequestPayload::PropagateWithdraw { origin: ReplicaId::new(1), amount: 3 }, Surface::Peer)]
    fn payload_surface(payload: RequestPayload, surface: Surface) {
        assert_eq!(payload.surface(), surface);
    }

    #[test]
    fn surface_names_match_log_fields() {
        assert_eq!(Surface::Client.to_string(), "client");
        assert_eq!(Surface::Peer.to_string(), "peer");
    }

    #[test]
    fn propagation_message_maps_to_peer_payload() {
        let payload = RequestPayload::from(PropagationMessage::withdraw(ReplicaId::new(2), 40));
        assert_eq!(
            payload,
            RequestPayload::PropagateWithdraw {
                origin: ReplicaId::new(2),
                amount: 40
            }
        );
    }

    #[test]
    fn request_survives_framing() {
        let request = Request::new(RequestId(7), Operation::Deposit { amount: 10 });

        let mut buf = BytesMut::new();
        request.to_frame().unwrap().encode(&mut buf);
        let frame = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(Request::from_frame(&frame).unwrap(), request);
    }

    #[test]
    fn insufficient_funds_response_keeps_balance() {
        let response = Response::error_with_balance(
            RequestId(1),
            ErrorCode::InsufficientFunds,
            "insufficient funds",
            Some(5),
        );
        let decoded = Response::from_frame(&response.to_frame().unwrap()).unwrap();

        match decoded.payload {
            ResponsePayload::Error(err) => {
                assert_eq!(err.code, ErrorCode::InsufficientFunds);
                assert_eq!(err.balance, Some(5));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn garbage_payload_is_a_serialization_error() {
        let frame = Frame::new(vec![0xff, 0xff, 0xff]);
        assert!(Request::from_frame(&frame).is_err());
    }
}
