use crate::allocation::model::CodingQuestion;
use crate::auction::model::{
    AllotmentId, AuctionId, QuestionId, QuestionView, SessionId, SessionPhase, UserId,
};
use crate::coding::ranking::UserResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 라운드 낙찰자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub user_id: UserId,
    pub username: String,
    pub team_name: String,
    pub amount: i64,
    pub allotted_question_id: AllotmentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AuctionEvent {
    // 라운드 시작 (문제 공개)
    QuestionPushed {
        session_id: SessionId,
        auction_id: Option<AuctionId>,
        question: QuestionView,
        time_remaining: u64,
    },
    // 입찰 이벤트
    NewBid {
        session_id: SessionId,
        auction_id: Option<AuctionId>,
        amount: i64,
        bidder_id: UserId,
        bidder_username: String,
        bidder_team: String,
        time_remaining: u64,
        timestamp: DateTime<Utc>,
    },
    // 타이머
    TimerUpdate {
        session_id: SessionId,
        auction_id: Option<AuctionId>,
        phase: SessionPhase,
        time_remaining: u64,
    },
    // 라운드 종료
    AuctionEnded {
        session_id: SessionId,
        auction_id: Option<AuctionId>,
        question_id: QuestionId,
        winner: Option<Winner>,
    },
    // 사용자별 코딩 시작
    CodingStarted {
        session_id: SessionId,
        auction_id: Option<AuctionId>,
        user_id: UserId,
        questions: Vec<CodingQuestion>,
        time_remaining: u64,
    },
    SubmissionEvaluated {
        session_id: SessionId,
        user_id: UserId,
        allotted_question_id: AllotmentId,
        score: i32,
        test_cases_passed: i32,
        total_test_cases: i32,
        judge_failed: bool,
        forced: bool,
    },
    // 코딩 종료 및 결과
    CodingEnded {
        session_id: SessionId,
        auction_id: Option<AuctionId>,
        results: Vec<UserResult>,
        top_performers: Vec<UserResult>,
    },
    AuctionCompleted {
        auction_id: AuctionId,
        session_id: SessionId,
        results: Vec<UserResult>,
    },
    // 예약 경매 이벤트
    #[serde(rename = "scheduled-auction-started")]
    ScheduledStarted {
        auction_id: AuctionId,
        session_id: SessionId,
        title: String,
    },
    #[serde(rename = "scheduled-auction-ready")]
    QuorumReached {
        auction_id: AuctionId,
        title: String,
        joined: usize,
    },
    #[serde(rename = "user-joined-scheduled")]
    UserJoined {
        auction_id: AuctionId,
        user_id: UserId,
        joined: usize,
    },
    #[serde(rename = "user-left-scheduled")]
    UserLeft {
        auction_id: AuctionId,
        user_id: UserId,
        joined: usize,
    },
    #[serde(rename = "scheduled-auction-cancelled")]
    ScheduledCancelled {
        auction_id: AuctionId,
        title: String,
        notified: Vec<UserId>,
    },
}

impl AuctionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::QuestionPushed { .. } => "question-pushed",
            Self::NewBid { .. } => "new-bid",
            Self::TimerUpdate { .. } => "timer-update",
            Self::AuctionEnded { .. } => "auction-ended",
            Self::CodingStarted { .. } => "coding-started",
            Self::SubmissionEvaluated { .. } => "submission-evaluated",
            Self::CodingEnded { .. } => "coding-ended",
            Self::AuctionCompleted { .. } => "auction-completed",
            Self::ScheduledStarted { .. } => "scheduled-auction-started",
            Self::QuorumReached { .. } => "scheduled-auction-ready",
            Self::UserJoined { .. } => "user-joined-scheduled",
            Self::UserLeft { .. } => "user-left-scheduled",
            Self::ScheduledCancelled { .. } => "scheduled-auction-cancelled",
        }
    }

    /// 이벤트가 속한 세션. 예약 경매 대기열 이벤트는 세션이 없다.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::QuestionPushed { session_id, .. }
            | Self::NewBid { session_id, .. }
            | Self::TimerUpdate { session_id, .. }
            | Self::AuctionEnded { session_id, .. }
            | Self::CodingStarted { session_id, .. }
            | Self::SubmissionEvaluated { session_id, .. }
            | Self::CodingEnded { session_id, .. }
            | Self::AuctionCompleted { session_id, .. }
            | Self::ScheduledStarted { session_id, .. } => Some(*session_id),
            Self::QuorumReached { .. }
            | Self::UserJoined { .. }
            | Self::UserLeft { .. }
            | Self::ScheduledCancelled { .. } => None,
        }
    }

    pub fn auction_id(&self) -> Option<AuctionId> {
        match self {
            Self::QuestionPushed { auction_id, .. }
            | Self::NewBid { auction_id, .. }
            | Self::TimerUpdate { auction_id, .. }
            | Self::AuctionEnded { auction_id, .. }
            | Self::CodingStarted { auction_id, .. }
            | Self::CodingEnded { auction_id, .. } => *auction_id,
            Self::AuctionCompleted { auction_id, .. }
            | Self::ScheduledStarted { auction_id, .. }
            | Self::QuorumReached { auction_id, .. }
            | Self::UserJoined { auction_id, .. }
            | Self::UserLeft { auction_id, .. }
            | Self::ScheduledCancelled { auction_id, .. } => Some(*auction_id),
            Self::SubmissionEvaluated { .. } => None,
        }
    }

    /// 특정 사용자에게만 전달되는 이벤트의 대상
    pub fn target_user(&self) -> Option<UserId> {
        match self {
            Self::CodingStarted { user_id, .. } | Self::SubmissionEvaluated { user_id, .. } => {
                Some(*user_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag_and_camel_case_fields() {
        let event = AuctionEvent::NewBid {
            session_id: 1,
            auction_id: None,
            amount: 80,
            bidder_id: 7,
            bidder_username: "kim".to_string(),
            bidder_team: "red".to_string(),
            time_remaining: 42,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "new-bid");
        assert_eq!(value["bidderUsername"], "kim");
        assert_eq!(value["timeRemaining"], 42);
        assert_eq!(event.event_type(), "new-bid");

        let cancelled = AuctionEvent::ScheduledCancelled {
            auction_id: 3,
            title: "Weekly".to_string(),
            notified: vec![1, 2],
        };
        let value = serde_json::to_value(&cancelled).unwrap();
        assert_eq!(value["type"], "scheduled-auction-cancelled");
        assert_eq!(value["auctionId"], 3);
        assert_eq!(cancelled.session_id(), None);
    }
}
