use crate::auction::model::{AuctionId, QuestionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 예약 경매 상태
/// scheduled -> waiting -> in-progress -> completed, scheduled|waiting -> cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduledStatus {
    Scheduled,
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl ScheduledStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "waiting" => Some(Self::Waiting),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, to: ScheduledStatus) -> bool {
        use ScheduledStatus::*;
        matches!(
            (self, to),
            (Scheduled, Waiting)
                | (Waiting, InProgress)
                | (InProgress, Completed)
                | (Scheduled, Cancelled)
                | (Waiting, Cancelled)
        )
    }

    /// 참가/탈퇴가 가능한 상태
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Waiting)
    }
}

impl std::fmt::Display for ScheduledStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 예약 경매 모델
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledAuction {
    pub id: AuctionId,
    pub title: String,
    pub description: String,
    pub scheduled_time: DateTime<Utc>,
    pub questions: Vec<QuestionId>,
    pub min_users: u32,
    pub max_users: Option<u32>,
    pub auction_duration: u64,
    pub coding_duration: u64,
    pub joined_users: BTreeSet<UserId>,
    pub status: ScheduledStatus,
    pub created_at: DateTime<Utc>,
}

impl ScheduledAuction {
    /// 상태 전이. 허용되지 않은 전이는 (from, to) 를 돌려준다.
    pub fn transition(
        &mut self,
        to: ScheduledStatus,
    ) -> Result<(), (ScheduledStatus, ScheduledStatus)> {
        if self.status.can_transition_to(to) {
            self.status = to;
            Ok(())
        } else {
            Err((self.status, to))
        }
    }

    pub fn is_full(&self) -> bool {
        self.max_users
            .is_some_and(|max| self.joined_users.len() >= max as usize)
    }

    pub fn has_quorum(&self) -> bool {
        self.joined_users.len() >= self.min_users as usize
    }
}

/// 예약 경매 생성/수정 입력
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledAuctionDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scheduled_time: DateTime<Utc>,
    pub questions: Vec<QuestionId>,
    pub min_users: u32,
    #[serde(default)]
    pub max_users: Option<u32>,
    pub auction_duration: u64,
    pub coding_duration: u64,
}

impl ScheduledAuctionDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.questions.is_empty() {
            return Err("at least one question is required".to_string());
        }
        if self.min_users == 0 {
            return Err("minUsers must be at least 1".to_string());
        }
        if let Some(max) = self.max_users {
            if max < self.min_users {
                return Err("maxUsers must not be less than minUsers".to_string());
            }
        }
        if self.auction_duration == 0 || self.coding_duration == 0 {
            return Err("durations must be positive".to_string());
        }
        Ok(())
    }
}
