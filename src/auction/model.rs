use crate::bidding::model::CurrentBid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type QuestionId = i64;
pub type SessionId = i64;
pub type AllotmentId = i64;
pub type AuctionId = i64;

// region:    --- User
/// 참가자 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub team_name: String,
    pub wallet: i64,
    pub active: bool,
}

/// 참가자 등록 입력
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub team_name: String,
    #[serde(default)]
    pub wallet: Option<i64>,
}
// endregion: --- User

// region:    --- Question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Easy" => Some(Self::Easy),
            "Medium" => Some(Self::Medium),
            "Hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// 문제 모델
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub starter_code: String,
    pub tags: Vec<String>,
    pub test_cases: Vec<TestCase>,
}

/// 문제 생성/수정 입력
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub test_cases: Vec<TestCase>,
}

impl QuestionDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.test_cases.is_empty() {
            return Err("at least one test case is required".to_string());
        }
        Ok(())
    }
}

/// 입찰자에게 공개되는 문제 정보. 테스트 케이스 내용은 숨긴다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: QuestionId,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub starter_code: String,
    pub tags: Vec<String>,
    pub total_test_cases: usize,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            title: q.title.clone(),
            difficulty: q.difficulty,
            description: q.description.clone(),
            starter_code: q.starter_code.clone(),
            tags: q.tags.clone(),
            total_test_cases: q.test_cases.len(),
        }
    }
}
// endregion: --- Question

// region:    --- Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionKind {
    Live,
    #[serde(rename_all = "camelCase")]
    Scheduled { auction_id: AuctionId },
}

impl SessionKind {
    pub fn auction_id(&self) -> Option<AuctionId> {
        match self {
            Self::Live => None,
            Self::Scheduled { auction_id } => Some(*auction_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Bidding,
    Coding,
    Completed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Bidding => "bidding",
            Self::Coding => "coding",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "bidding" => Some(Self::Bidding),
            "coding" => Some(Self::Coding),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 경매 세션 스냅샷 (저장 및 조회용)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSession {
    pub id: SessionId,
    pub kind: SessionKind,
    pub phase: SessionPhase,
    pub current_question_id: Option<QuestionId>,
    pub current_bid: Option<CurrentBid>,
    pub deadline: Option<DateTime<Utc>>,
}
// endregion: --- Session
