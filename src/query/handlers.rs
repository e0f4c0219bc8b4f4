// region:    --- Imports
use crate::allocation::model::{AllotmentStatus, AllottedQuestion};
use crate::auction::model::{QuestionView, SessionId, UserId};
use crate::bidding::model::Bid;
use crate::coding::ranking::{aggregate, rank, RankingPolicy, UserResult};
use crate::store::{AuctionStore, StoreResult};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

// endregion: --- Imports

// region:    --- Views
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub user_id: UserId,
    pub wallet: i64,
}

/// 할당 문제와 문제 정보
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllottedQuestionDetail {
    #[serde(flatten)]
    pub allotment: AllottedQuestion,
    pub question: QuestionView,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStats {
    pub team_name: String,
    pub members: usize,
    pub questions_won: usize,
    pub points_spent: i64,
    pub total_score: i64,
}
// endregion: --- Views

// region:    --- Query Handlers

/// 지갑 잔액 조회
pub async fn get_wallet(store: &dyn AuctionStore, user_id: UserId) -> StoreResult<WalletView> {
    info!("{:<12} --> 지갑 조회 id: {}", "Query", user_id);
    let user = store.get_user(user_id).await?;
    Ok(WalletView {
        user_id,
        wallet: user.wallet,
    })
}

/// 사용자의 할당 문제 조회
pub async fn get_user_allotments(
    store: &dyn AuctionStore,
    user_id: UserId,
) -> StoreResult<Vec<AllottedQuestionDetail>> {
    info!("{:<12} --> 할당 문제 조회 user: {}", "Query", user_id);
    let mut details = Vec::new();
    for allotment in store.list_user_allotments(user_id).await? {
        let question = store.get_question(allotment.question_id).await?;
        details.push(AllottedQuestionDetail {
            allotment,
            question: QuestionView::from(&question),
        });
    }
    Ok(details)
}

/// 한 세션에서 사용자가 낙찰받은 문제. 할당 순서대로.
pub async fn get_session_allotments(
    store: &dyn AuctionStore,
    user_id: UserId,
    session_id: SessionId,
) -> StoreResult<Vec<AllottedQuestionDetail>> {
    let mut details: Vec<_> = get_user_allotments(store, user_id)
        .await?
        .into_iter()
        .filter(|d| d.allotment.session_id == session_id)
        .collect();
    details.sort_by_key(|d| d.allotment.id);
    Ok(details)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCount {
    pub total: usize,
    pub active: usize,
}

pub async fn get_user_count(store: &dyn AuctionStore) -> StoreResult<UserCount> {
    let users = store.list_users().await?;
    Ok(UserCount {
        total: users.len(),
        active: users.iter().filter(|u| u.active).count(),
    })
}

/// 전체 리더보드. 모든 세션의 평가 점수 합산.
pub async fn get_leaderboard(
    store: &dyn AuctionStore,
    policy: &dyn RankingPolicy,
) -> StoreResult<Vec<UserResult>> {
    info!("{:<12} --> 리더보드 조회", "Query");
    let users = store.list_users().await?;
    let allotments = store.list_allotments().await?;
    Ok(rank(policy, aggregate(&users, &allotments, true)))
}

/// 팀별 통계
pub async fn get_team_stats(store: &dyn AuctionStore) -> StoreResult<Vec<TeamStats>> {
    info!("{:<12} --> 팀 통계 조회", "Query");
    let users = store.list_users().await?;
    let allotments = store.list_allotments().await?;

    let mut teams: BTreeMap<String, TeamStats> = BTreeMap::new();
    let mut team_of = BTreeMap::new();
    for user in &users {
        let stats = teams
            .entry(user.team_name.clone())
            .or_insert_with(|| TeamStats {
                team_name: user.team_name.clone(),
                ..TeamStats::default()
            });
        stats.members += 1;
        team_of.insert(user.id, user.team_name.clone());
    }

    for aq in &allotments {
        let Some(team) = team_of.get(&aq.user_id) else {
            continue;
        };
        if let Some(stats) = teams.get_mut(team) {
            stats.questions_won += 1;
            stats.points_spent += aq.bid_amount;
            if aq.status == AllotmentStatus::Evaluated {
                stats.total_score += i64::from(aq.score.unwrap_or(0));
            }
        }
    }

    Ok(teams.into_values().collect())
}

/// 세션 입찰 이력 조회
pub async fn get_bid_history(
    store: &dyn AuctionStore,
    session_id: SessionId,
) -> StoreResult<Vec<Bid>> {
    info!("{:<12} --> 입찰 이력 조회 session: {}", "Query", session_id);
    store.list_bids(session_id).await
}

// endregion: --- Query Handlers

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::model::NewAllotment;
    use crate::auction::model::{Difficulty, NewUser, QuestionDraft, SessionKind, TestCase};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn team_stats_sum_members_and_spend() {
        let store = MemoryStore::new();
        let kim = store
            .create_user(
                NewUser {
                    username: "kim".to_string(),
                    team_name: "red".to_string(),
                    wallet: None,
                },
                200,
            )
            .await
            .unwrap();
        store
            .create_user(
                NewUser {
                    username: "lee".to_string(),
                    team_name: "red".to_string(),
                    wallet: None,
                },
                200,
            )
            .await
            .unwrap();
        let question = store
            .create_question(QuestionDraft {
                title: "Two Sum".to_string(),
                difficulty: Difficulty::Easy,
                description: String::new(),
                starter_code: String::new(),
                tags: vec![],
                test_cases: vec![TestCase {
                    input: "1 2".to_string(),
                    expected_output: "3".to_string(),
                }],
            })
            .await
            .unwrap();
        let session = store.create_session(SessionKind::Live).await.unwrap();
        store
            .allocate(NewAllotment {
                session_id: session.id,
                user_id: kim.id,
                question_id: question.id,
                bid_amount: 40,
                total_test_cases: 1,
            })
            .await
            .unwrap();

        let stats = get_team_stats(&store).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].members, 2);
        assert_eq!(stats[0].questions_won, 1);
        assert_eq!(stats[0].points_spent, 40);

        let wallet = get_wallet(&store, kim.id).await.unwrap();
        assert_eq!(wallet.wallet, 160);

        let details = get_user_allotments(&store, kim.id).await.unwrap();
        assert_eq!(details[0].question.title, "Two Sum");

        let mine = get_session_allotments(&store, kim.id, session.id)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        let other = store.create_session(SessionKind::Live).await.unwrap();
        assert!(get_session_allotments(&store, kim.id, other.id)
            .await
            .unwrap()
            .is_empty());

        store.set_user_active(kim.id, false).await.unwrap();
        let count = get_user_count(&store).await.unwrap();
        assert_eq!((count.total, count.active), (2, 1));
    }
}
