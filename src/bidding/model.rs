use crate::auction::model::{QuestionId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 입찰 모델 (append-only)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: i64,
    pub session_id: SessionId,
    pub round_question_id: QuestionId,
    pub user_id: UserId,
    pub amount: i64,
    pub accepted_at: DateTime<Utc>,
}

// 저장 전 입찰
#[derive(Debug, Clone)]
pub struct NewBid {
    pub session_id: SessionId,
    pub round_question_id: QuestionId,
    pub user_id: UserId,
    pub amount: i64,
    pub accepted_at: DateTime<Utc>,
}

// 현재 라운드 최고 입찰
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBid {
    pub amount: i64,
    pub user_id: UserId,
    pub username: String,
    pub team_name: String,
}

// 입찰 접수 결과
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub bid_id: i64,
    pub amount: i64,
    pub time_remaining: u64,
}
