// region:    --- Imports
use super::{AuctionStore, StoreError, StoreResult};
use crate::allocation::model::{AllotmentStatus, AllottedQuestion, Allocation, NewAllotment};
use crate::auction::model::{
    AllotmentId, AuctionId, AuctionSession, NewUser, Question, QuestionDraft, QuestionId,
    SessionId, SessionKind, SessionPhase, User, UserId,
};
use crate::bidding::model::{Bid, NewBid};
use crate::scheduler::model::{ScheduledAuction, ScheduledAuctionDraft, ScheduledStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
// endregion: --- Imports

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    questions: BTreeMap<QuestionId, Question>,
    sessions: BTreeMap<SessionId, AuctionSession>,
    bids: Vec<Bid>,
    allotments: BTreeMap<AllotmentId, AllottedQuestion>,
    scheduled: BTreeMap<AuctionId, ScheduledAuction>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 메모리 저장소. 모든 테이블을 하나의 뮤텍스로 보호하므로
/// 지갑 차감과 할당 생성이 자연스럽게 원자적이다.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(entity: &'static str, id: i64) -> StoreError {
    StoreError::NotFound { entity, id }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn create_user(&self, user: NewUser, initial_wallet: i64) -> StoreResult<User> {
        let mut t = self.tables();
        if t.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate(format!("username {}", user.username)));
        }
        let id = t.next_id();
        let created = User {
            id,
            username: user.username,
            team_name: user.team_name,
            wallet: user.wallet.unwrap_or(initial_wallet).max(0),
            active: true,
        };
        t.users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.tables()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("user", id))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables().users.values().cloned().collect())
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        let mut t = self.tables();
        let user = t.users.get_mut(&id).ok_or_else(|| not_found("user", id))?;
        user.active = active;
        Ok(user.clone())
    }

    async fn create_question(&self, draft: QuestionDraft) -> StoreResult<Question> {
        let mut t = self.tables();
        let id = t.next_id();
        let question = Question {
            id,
            title: draft.title,
            difficulty: draft.difficulty,
            description: draft.description,
            starter_code: draft.starter_code,
            tags: draft.tags,
            test_cases: draft.test_cases,
        };
        t.questions.insert(id, question.clone());
        Ok(question)
    }

    async fn update_question(
        &self,
        id: QuestionId,
        draft: QuestionDraft,
    ) -> StoreResult<Question> {
        let mut t = self.tables();
        let question = t
            .questions
            .get_mut(&id)
            .ok_or_else(|| not_found("question", id))?;
        question.title = draft.title;
        question.difficulty = draft.difficulty;
        question.description = draft.description;
        question.starter_code = draft.starter_code;
        question.tags = draft.tags;
        question.test_cases = draft.test_cases;
        Ok(question.clone())
    }

    async fn delete_question(&self, id: QuestionId) -> StoreResult<()> {
        self.tables()
            .questions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("question", id))
    }

    async fn get_question(&self, id: QuestionId) -> StoreResult<Question> {
        self.tables()
            .questions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("question", id))
    }

    async fn list_questions(&self) -> StoreResult<Vec<Question>> {
        Ok(self.tables().questions.values().cloned().collect())
    }

    async fn create_session(&self, kind: SessionKind) -> StoreResult<AuctionSession> {
        let mut t = self.tables();
        let id = t.next_id();
        let session = AuctionSession {
            id,
            kind,
            phase: SessionPhase::Idle,
            current_question_id: None,
            current_bid: None,
            deadline: None,
        };
        t.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn save_session(&self, session: &AuctionSession) -> StoreResult<()> {
        let mut t = self.tables();
        match t.sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(not_found("session", session.id)),
        }
    }

    async fn get_session(&self, id: SessionId) -> StoreResult<AuctionSession> {
        self.tables()
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("session", id))
    }

    async fn append_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        let mut t = self.tables();
        let id = t.next_id();
        let bid = Bid {
            id,
            session_id: bid.session_id,
            round_question_id: bid.round_question_id,
            user_id: bid.user_id,
            amount: bid.amount,
            accepted_at: bid.accepted_at,
        };
        t.bids.push(bid.clone());
        Ok(bid)
    }

    async fn list_bids(&self, session_id: SessionId) -> StoreResult<Vec<Bid>> {
        Ok(self
            .tables()
            .bids
            .iter()
            .filter(|b| b.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn allocate(&self, new: NewAllotment) -> StoreResult<Allocation> {
        let mut t = self.tables();

        // 이미 처리된 라운드
        if let Some(existing) = t.allotments.values().find(|a| {
            a.session_id == new.session_id
                && a.user_id == new.user_id
                && a.question_id == new.question_id
        }) {
            let existing = existing.clone();
            let wallet_after = t.users.get(&new.user_id).map(|u| u.wallet).unwrap_or(0);
            return Ok(Allocation {
                allotment: existing,
                created: false,
                wallet_after,
            });
        }

        let user = t
            .users
            .get(&new.user_id)
            .ok_or_else(|| not_found("user", new.user_id))?;
        if user.wallet < new.bid_amount {
            return Err(StoreError::InsufficientFunds {
                user_id: new.user_id,
                wallet: user.wallet,
                amount: new.bid_amount,
            });
        }

        let id = t.next_id();
        let allotment = AllottedQuestion {
            id,
            session_id: new.session_id,
            user_id: new.user_id,
            question_id: new.question_id,
            bid_amount: new.bid_amount,
            status: AllotmentStatus::Allotted,
            score: None,
            test_cases_passed: 0,
            total_test_cases: new.total_test_cases,
            judge_failed: false,
        };

        // 검증이 끝난 뒤에만 변경한다
        let wallet_after = match t.users.get_mut(&new.user_id) {
            Some(user) => {
                user.wallet -= new.bid_amount;
                user.wallet
            }
            None => return Err(not_found("user", new.user_id)),
        };
        t.allotments.insert(id, allotment.clone());

        Ok(Allocation {
            allotment,
            created: true,
            wallet_after,
        })
    }

    async fn get_allotment(&self, id: AllotmentId) -> StoreResult<AllottedQuestion> {
        self.tables()
            .allotments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("allotted question", id))
    }

    async fn find_allotment_for_question(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> StoreResult<Option<AllottedQuestion>> {
        Ok(self
            .tables()
            .allotments
            .values()
            .find(|a| a.session_id == session_id && a.question_id == question_id)
            .cloned())
    }

    async fn update_allotment(&self, allotment: &AllottedQuestion) -> StoreResult<()> {
        let mut t = self.tables();
        match t.allotments.get_mut(&allotment.id) {
            Some(existing) => {
                *existing = allotment.clone();
                Ok(())
            }
            None => Err(not_found("allotted question", allotment.id)),
        }
    }

    async fn list_session_allotments(
        &self,
        session_id: SessionId,
    ) -> StoreResult<Vec<AllottedQuestion>> {
        Ok(self
            .tables()
            .allotments
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_user_allotments(&self, user_id: UserId) -> StoreResult<Vec<AllottedQuestion>> {
        Ok(self
            .tables()
            .allotments
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_allotments(&self) -> StoreResult<Vec<AllottedQuestion>> {
        Ok(self.tables().allotments.values().cloned().collect())
    }

    async fn create_scheduled(
        &self,
        draft: ScheduledAuctionDraft,
    ) -> StoreResult<ScheduledAuction> {
        let mut t = self.tables();
        let id = t.next_id();
        let auction = ScheduledAuction {
            id,
            title: draft.title,
            description: draft.description,
            scheduled_time: draft.scheduled_time,
            questions: draft.questions,
            min_users: draft.min_users,
            max_users: draft.max_users,
            auction_duration: draft.auction_duration,
            coding_duration: draft.coding_duration,
            joined_users: BTreeSet::new(),
            status: ScheduledStatus::Scheduled,
            created_at: Utc::now(),
        };
        t.scheduled.insert(id, auction.clone());
        Ok(auction)
    }

    async fn get_scheduled(&self, id: AuctionId) -> StoreResult<ScheduledAuction> {
        self.tables()
            .scheduled
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("scheduled auction", id))
    }

    async fn list_scheduled(&self) -> StoreResult<Vec<ScheduledAuction>> {
        let mut all: Vec<_> = self.tables().scheduled.values().cloned().collect();
        all.sort_by_key(|a| a.scheduled_time);
        Ok(all)
    }

    async fn save_scheduled(&self, auction: &ScheduledAuction) -> StoreResult<()> {
        let mut t = self.tables();
        match t.scheduled.get_mut(&auction.id) {
            Some(existing) => {
                *existing = auction.clone();
                Ok(())
            }
            None => Err(not_found("scheduled auction", auction.id)),
        }
    }

    async fn delete_scheduled(&self, id: AuctionId) -> StoreResult<()> {
        self.tables()
            .scheduled
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("scheduled auction", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let user = store
            .create_user(
                NewUser {
                    username: "lee".to_string(),
                    team_name: "blue".to_string(),
                    wallet: None,
                },
                200,
            )
            .await
            .unwrap();
        (store, user)
    }

    fn new_allotment(user_id: UserId, amount: i64) -> NewAllotment {
        NewAllotment {
            session_id: 1,
            user_id,
            question_id: 5,
            bid_amount: amount,
            total_test_cases: 2,
        }
    }

    #[tokio::test]
    async fn allocate_debits_once() {
        let (store, user) = seeded().await;

        let first = store.allocate(new_allotment(user.id, 120)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.wallet_after, 80);

        let again = store.allocate(new_allotment(user.id, 120)).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.allotment.id, first.allotment.id);
        assert_eq!(store.get_user(user.id).await.unwrap().wallet, 80);
    }

    #[tokio::test]
    async fn allocate_rejects_overdraft_without_side_effects() {
        let (store, user) = seeded().await;

        let err = store.allocate(new_allotment(user.id, 500)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { wallet: 200, .. }));
        assert_eq!(store.get_user(user.id).await.unwrap().wallet, 200);
        assert!(store.list_allotments().await.unwrap().is_empty());
    }
}
