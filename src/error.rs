// region:    --- Imports
use crate::auction::model::{AllotmentId, AuctionId, QuestionId, SessionId, SessionPhase, UserId};
use crate::scheduler::model::ScheduledStatus;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
// endregion: --- Imports

pub type EngineResult<T> = Result<T, EngineError>;

/// 오류 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 잘못된 요청. 상태는 변하지 않는다.
    Validation,
    /// 현재 상태와 충돌하는 요청
    Conflict,
    NotFound,
    Unauthorized,
    /// 저장소 등 내부 오류. 작업 전체가 적용되지 않는다.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session {session_id} already has an active {phase} phase")]
    RoundAlreadyActive {
        session_id: SessionId,
        phase: SessionPhase,
    },
    #[error("session {0} is already coding")]
    CodingAlreadyActive(SessionId),
    #[error("session {0} is completed")]
    SessionClosed(SessionId),
    #[error("question {question_id} was already allotted in session {session_id}")]
    QuestionAlreadyAllotted {
        session_id: SessionId,
        question_id: QuestionId,
    },
    #[error("question {question_id} is still in play in session {session_id}")]
    QuestionInUse {
        session_id: SessionId,
        question_id: QuestionId,
    },
    #[error("no bidding round is active in session {0}")]
    RoundNotActive(SessionId),
    #[error("bid amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("insufficient funds: wallet {wallet}, requested {amount}")]
    InsufficientFunds { wallet: i64, amount: i64 },
    #[error("bid {amount} must be higher than current bid {current}")]
    BidTooLow { amount: i64, current: i64 },
    #[error("user {user_id} is not a participant of session {session_id}")]
    NotParticipant {
        user_id: UserId,
        session_id: SessionId,
    },
    #[error("user {0} is deactivated")]
    UserInactive(UserId),
    #[error("allotted question {0} was already submitted")]
    AlreadySubmitted(AllotmentId),
    #[error("coding phase is not active in session {0}")]
    CodingNotActive(SessionId),
    #[error("coding phase of session {0} still has running queues")]
    CodingNotFinished(SessionId),
    #[error("auction {auction_id} is {status} and cannot be joined")]
    NotJoinable {
        auction_id: AuctionId,
        status: ScheduledStatus,
    },
    #[error("auction {auction_id} is {status} and cannot be left")]
    NotLeavable {
        auction_id: AuctionId,
        status: ScheduledStatus,
    },
    #[error("auction {0} is full")]
    AuctionFull(AuctionId),
    #[error("auction {auction_id} cannot move from {from} to {to}")]
    InvalidTransition {
        auction_id: AuctionId,
        from: ScheduledStatus,
        to: ScheduledStatus,
    },
    #[error("auction {0} can no longer be modified")]
    AuctionLocked(AuctionId),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("confirmation token is unknown or expired")]
    InvalidToken,
    #[error("{0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoundNotActive(_)
            | Self::InvalidAmount(_)
            | Self::InsufficientFunds { .. }
            | Self::BidTooLow { .. }
            | Self::NotParticipant { .. }
            | Self::UserInactive(_)
            | Self::AlreadySubmitted(_)
            | Self::CodingNotActive(_)
            | Self::InvalidToken
            | Self::Validation(_) => ErrorKind::Validation,
            Self::RoundAlreadyActive { .. }
            | Self::CodingAlreadyActive(_)
            | Self::SessionClosed(_)
            | Self::QuestionAlreadyAllotted { .. }
            | Self::QuestionInUse { .. }
            | Self::CodingNotFinished(_)
            | Self::NotJoinable { .. }
            | Self::NotLeavable { .. }
            | Self::AuctionFull(_)
            | Self::InvalidTransition { .. }
            | Self::AuctionLocked(_) => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// 응답 본문의 code 필드
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoundAlreadyActive { .. } => "ROUND_ALREADY_ACTIVE",
            Self::CodingAlreadyActive(_) => "CODING_ALREADY_ACTIVE",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::QuestionAlreadyAllotted { .. } => "QUESTION_ALREADY_ALLOTTED",
            Self::QuestionInUse { .. } => "QUESTION_IN_USE",
            Self::RoundNotActive(_) => "ROUND_NOT_ACTIVE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::BidTooLow { .. } => "LOW_BID",
            Self::NotParticipant { .. } => "NOT_PARTICIPANT",
            Self::UserInactive(_) => "USER_INACTIVE",
            Self::AlreadySubmitted(_) => "ALREADY_SUBMITTED",
            Self::CodingNotActive(_) => "CODING_NOT_ACTIVE",
            Self::CodingNotFinished(_) => "CODING_NOT_FINISHED",
            Self::NotJoinable { .. } => "NOT_JOINABLE",
            Self::NotLeavable { .. } => "NOT_LEAVABLE",
            Self::AuctionFull(_) => "AUCTION_FULL",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AuctionLocked(_) => "AUCTION_LOCKED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Validation(_) => "VALIDATION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::InsufficientFunds { wallet, amount, .. } => {
                Self::InsufficientFunds { wallet, amount }
            }
            StoreError::Duplicate(what) => Self::Validation(format!("duplicate {what}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{:<12} --> 내부 오류: {}", "Error", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
