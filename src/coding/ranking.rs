//! 결과 집계와 순위 정책

// region:    --- Imports
use crate::allocation::model::{AllotmentStatus, AllottedQuestion};
use crate::auction::model::{User, UserId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
// endregion: --- Imports

/// 사용자별 집계 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResult {
    pub user_id: UserId,
    pub username: String,
    pub team_name: String,
    pub total_score: i64,
    pub questions_evaluated: usize,
    pub total_bid: i64,
    pub rank: usize,
}

// region:    --- Ranking Policy
/// 동점자 처리 규칙. 총점 내림차순 정렬 뒤에 적용된다.
pub trait RankingPolicy: Send + Sync {
    fn tie_break(&self, a: &UserResult, b: &UserResult) -> Ordering;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// 사용자 id 오름차순
    #[default]
    UserId,
    /// 지출 포인트가 적은 쪽이 앞
    LowerSpend,
    /// 평가된 문제가 많은 쪽이 앞
    MoreSolved,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user-id" => Ok(Self::UserId),
            "lower-spend" => Ok(Self::LowerSpend),
            "more-solved" => Ok(Self::MoreSolved),
            other => Err(format!("unknown tie-break policy: {other}")),
        }
    }
}

impl RankingPolicy for TieBreak {
    fn tie_break(&self, a: &UserResult, b: &UserResult) -> Ordering {
        match self {
            Self::UserId => Ordering::Equal,
            Self::LowerSpend => a.total_bid.cmp(&b.total_bid),
            Self::MoreSolved => b.questions_evaluated.cmp(&a.questions_evaluated),
        }
    }
}
// endregion: --- Ranking Policy

// region:    --- Aggregation
/// 평가된 점수를 사용자별로 합산한다.
/// include_idle 이면 할당이 없는 사용자도 0점으로 포함한다 (전체 리더보드).
pub fn aggregate(
    users: &[User],
    allotments: &[AllottedQuestion],
    include_idle: bool,
) -> Vec<UserResult> {
    let mut by_user: BTreeMap<UserId, UserResult> = BTreeMap::new();

    if include_idle {
        for user in users {
            by_user.insert(user.id, empty_result(user.id, users));
        }
    }

    for aq in allotments {
        let entry = by_user
            .entry(aq.user_id)
            .or_insert_with(|| empty_result(aq.user_id, users));
        entry.total_bid += aq.bid_amount;
        if aq.status == AllotmentStatus::Evaluated {
            entry.total_score += i64::from(aq.score.unwrap_or(0));
            entry.questions_evaluated += 1;
        }
    }

    by_user.into_values().collect()
}

fn empty_result(user_id: UserId, users: &[User]) -> UserResult {
    let user = users.iter().find(|u| u.id == user_id);
    UserResult {
        user_id,
        username: user.map(|u| u.username.clone()).unwrap_or_default(),
        team_name: user.map(|u| u.team_name.clone()).unwrap_or_default(),
        total_score: 0,
        questions_evaluated: 0,
        total_bid: 0,
        rank: 0,
    }
}

/// 총점 내림차순, 정책, 사용자 id 순으로 정렬하고 1부터 순위를 매긴다.
pub fn rank(policy: &dyn RankingPolicy, mut results: Vec<UserResult>) -> Vec<UserResult> {
    results.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| policy.tie_break(a, b))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    for (idx, result) in results.iter_mut().enumerate() {
        result.rank = idx + 1;
    }
    results
}

pub fn top_n(ranked: &[UserResult], n: usize) -> Vec<UserResult> {
    ranked.iter().take(n).cloned().collect()
}
// endregion: --- Aggregation

#[cfg(test)]
mod tests {
    use super::*;

    fn result(user_id: UserId, score: i64, evaluated: usize, bid: i64) -> UserResult {
        UserResult {
            user_id,
            username: format!("u{user_id}"),
            team_name: "t".to_string(),
            total_score: score,
            questions_evaluated: evaluated,
            total_bid: bid,
            rank: 0,
        }
    }

    #[test]
    fn ties_follow_policy() {
        let results = vec![result(3, 100, 1, 50), result(1, 100, 2, 90), result(2, 40, 1, 10)];

        let ranked = rank(&TieBreak::UserId, results.clone());
        let order: Vec<_> = ranked.iter().map(|r| r.user_id).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);

        let ranked = rank(&TieBreak::LowerSpend, results.clone());
        assert_eq!(ranked[0].user_id, 3);

        let ranked = rank(&TieBreak::MoreSolved, results);
        assert_eq!(ranked[0].user_id, 1);
        assert_eq!(top_n(&ranked, 2).len(), 2);
    }

    #[test]
    fn aggregate_counts_only_evaluated_scores() {
        let users = vec![User {
            id: 1,
            username: "kim".to_string(),
            team_name: "red".to_string(),
            wallet: 0,
            active: true,
        }];
        let mk = |status, score| AllottedQuestion {
            id: 0,
            session_id: 1,
            user_id: 1,
            question_id: 0,
            bid_amount: 30,
            status,
            score,
            test_cases_passed: 0,
            total_test_cases: 4,
            judge_failed: false,
        };
        let rows = vec![
            mk(AllotmentStatus::Evaluated, Some(75)),
            mk(AllotmentStatus::Allotted, None),
        ];

        let results = aggregate(&users, &rows, false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total_score, 75);
        assert_eq!(results[0].questions_evaluated, 1);
        assert_eq!(results[0].total_bid, 60);
        assert_eq!(results[0].username, "kim");
    }

    #[test]
    fn tie_break_parses_from_config() {
        assert_eq!("lower-spend".parse::<TieBreak>(), Ok(TieBreak::LowerSpend));
        assert!("coin-flip".parse::<TieBreak>().is_err());
    }
}
