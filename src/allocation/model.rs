use crate::auction::model::{AllotmentId, QuestionId, QuestionView, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// 할당 문제 상태. allotted -> coding -> submitted -> evaluated 순서로만 진행한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllotmentStatus {
    Allotted,
    Coding,
    Submitted,
    Evaluated,
}

impl AllotmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allotted => "allotted",
            Self::Coding => "coding",
            Self::Submitted => "submitted",
            Self::Evaluated => "evaluated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allotted" => Some(Self::Allotted),
            "coding" => Some(Self::Coding),
            "submitted" => Some(Self::Submitted),
            "evaluated" => Some(Self::Evaluated),
            _ => None,
        }
    }

    /// 바로 다음 상태
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Allotted => Some(Self::Coding),
            Self::Coding => Some(Self::Submitted),
            Self::Submitted => Some(Self::Evaluated),
            Self::Evaluated => None,
        }
    }
}

/// 낙찰된 문제 할당 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllottedQuestion {
    pub id: AllotmentId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub bid_amount: i64,
    pub status: AllotmentStatus,
    pub score: Option<i32>,
    pub test_cases_passed: i32,
    pub total_test_cases: i32,
    pub judge_failed: bool,
}

impl AllottedQuestion {
    /// 상태를 한 단계 전진시킨다. 건너뛰기는 허용하지 않는다.
    pub fn advance_to(&mut self, status: AllotmentStatus) -> bool {
        if self.status.next() == Some(status) {
            self.status = status;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAllotment {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub bid_amount: i64,
    pub total_test_cases: i32,
}

/// allocate 결과. created == false 이면 이미 처리된 라운드다.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub allotment: AllottedQuestion,
    pub created: bool,
    pub wallet_after: i64,
}

/// 코딩 단계에서 사용자에게 전달되는 문제
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingQuestion {
    pub allotted_question_id: AllotmentId,
    pub status: AllotmentStatus,
    pub question: QuestionView,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allotment(status: AllotmentStatus) -> AllottedQuestion {
        AllottedQuestion {
            id: 1,
            session_id: 1,
            user_id: 1,
            question_id: 1,
            bid_amount: 10,
            status,
            score: None,
            test_cases_passed: 0,
            total_test_cases: 3,
            judge_failed: false,
        }
    }

    #[test]
    fn advance_moves_one_step_only() {
        let mut aq = allotment(AllotmentStatus::Allotted);
        assert!(!aq.advance_to(AllotmentStatus::Submitted));
        assert!(aq.advance_to(AllotmentStatus::Coding));
        assert!(aq.advance_to(AllotmentStatus::Submitted));
        assert!(aq.advance_to(AllotmentStatus::Evaluated));
        assert!(!aq.advance_to(AllotmentStatus::Allotted));
        assert_eq!(aq.status, AllotmentStatus::Evaluated);
    }
}
