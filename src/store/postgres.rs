// region:    --- Imports
use super::{AuctionStore, StoreError, StoreResult};
use crate::allocation::model::{AllotmentStatus, AllottedQuestion, Allocation, NewAllotment};
use crate::auction::model::{
    AllotmentId, AuctionId, AuctionSession, Difficulty, NewUser, Question, QuestionDraft,
    QuestionId, SessionId, SessionKind, SessionPhase, TestCase, User, UserId,
};
use crate::bidding::model::{Bid, CurrentBid, NewBid};
use crate::database::DatabaseManager;
use crate::query::queries;
use crate::scheduler::model::{ScheduledAuction, ScheduledAuctionDraft, ScheduledStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use std::sync::Arc;
use tracing::info;
// endregion: --- Imports

// region:    --- Rows
#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    title: String,
    difficulty: String,
    description: String,
    starter_code: String,
    tags: Vec<String>,
    test_cases: Json<Vec<TestCase>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let difficulty = Difficulty::parse(&row.difficulty)
            .ok_or_else(|| StoreError::Corrupt(format!("difficulty {}", row.difficulty)))?;
        Ok(Question {
            id: row.id,
            title: row.title,
            difficulty,
            description: row.description,
            starter_code: row.starter_code,
            tags: row.tags,
            test_cases: row.test_cases.0,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    kind: String,
    auction_id: Option<i64>,
    phase: String,
    current_question_id: Option<i64>,
    current_bid: Option<Json<CurrentBid>>,
    deadline: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for AuctionSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.auction_id) {
            ("live", _) => SessionKind::Live,
            ("scheduled", Some(auction_id)) => SessionKind::Scheduled { auction_id },
            (other, _) => return Err(StoreError::Corrupt(format!("session kind {other}"))),
        };
        let phase = SessionPhase::parse(&row.phase)
            .ok_or_else(|| StoreError::Corrupt(format!("session phase {}", row.phase)))?;
        Ok(AuctionSession {
            id: row.id,
            kind,
            phase,
            current_question_id: row.current_question_id,
            current_bid: row.current_bid.map(|bid| bid.0),
            deadline: row.deadline,
        })
    }
}

#[derive(FromRow)]
struct AllotmentRow {
    id: i64,
    session_id: i64,
    user_id: i64,
    question_id: i64,
    bid_amount: i64,
    status: String,
    score: Option<i32>,
    test_cases_passed: i32,
    total_test_cases: i32,
    judge_failed: bool,
}

impl TryFrom<AllotmentRow> for AllottedQuestion {
    type Error = StoreError;

    fn try_from(row: AllotmentRow) -> Result<Self, Self::Error> {
        let status = AllotmentStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("allotment status {}", row.status)))?;
        Ok(AllottedQuestion {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            question_id: row.question_id,
            bid_amount: row.bid_amount,
            status,
            score: row.score,
            test_cases_passed: row.test_cases_passed,
            total_test_cases: row.total_test_cases,
            judge_failed: row.judge_failed,
        })
    }
}

#[derive(FromRow)]
struct ScheduledRow {
    id: i64,
    title: String,
    description: String,
    scheduled_time: DateTime<Utc>,
    questions: Vec<i64>,
    min_users: i32,
    max_users: Option<i32>,
    auction_duration: i64,
    coding_duration: i64,
    joined_users: Vec<i64>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScheduledRow> for ScheduledAuction {
    type Error = StoreError;

    fn try_from(row: ScheduledRow) -> Result<Self, Self::Error> {
        let status = ScheduledStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("auction status {}", row.status)))?;
        Ok(ScheduledAuction {
            id: row.id,
            title: row.title,
            description: row.description,
            scheduled_time: row.scheduled_time,
            questions: row.questions,
            min_users: row.min_users.max(0) as u32,
            max_users: row.max_users.map(|max| max.max(0) as u32),
            auction_duration: row.auction_duration.max(0) as u64,
            coding_duration: row.coding_duration.max(0) as u64,
            joined_users: row.joined_users.into_iter().collect(),
            status,
            created_at: row.created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn kind_columns(kind: &SessionKind) -> (&'static str, Option<i64>) {
    match kind {
        SessionKind::Live => ("live", None),
        SessionKind::Scheduled { auction_id } => ("scheduled", Some(*auction_id)),
    }
}
// endregion: --- Rows

// region:    --- Postgres Store
/// Postgres 저장소 구현체
pub struct PostgresStore {
    db: Arc<DatabaseManager>,
}

impl PostgresStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn not_found(entity: &'static str, id: i64) -> StoreError {
    StoreError::NotFound { entity, id }
}

#[async_trait]
impl AuctionStore for PostgresStore {
    async fn create_user(&self, user: NewUser, initial_wallet: i64) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(queries::INSERT_USER)
            .bind(&user.username)
            .bind(&user.team_name)
            .bind(user.wallet.unwrap_or(initial_wallet).max(0))
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Duplicate(format!("username {}", user.username))
                }
                other => StoreError::Database(other),
            })?;
        info!("{:<12} --> 사용자 생성 id: {}", "Store", created.id);
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        sqlx::query_as::<_, User>(queries::GET_USER)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("user", id))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(queries::LIST_USERS)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        sqlx::query_as::<_, User>(queries::SET_USER_ACTIVE)
            .bind(active)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("user", id))
    }

    async fn create_question(&self, draft: QuestionDraft) -> StoreResult<Question> {
        sqlx::query_as::<_, QuestionRow>(queries::INSERT_QUESTION)
            .bind(&draft.title)
            .bind(draft.difficulty.as_str())
            .bind(&draft.description)
            .bind(&draft.starter_code)
            .bind(&draft.tags)
            .bind(Json(&draft.test_cases))
            .fetch_one(self.db.pool())
            .await?
            .try_into()
    }

    async fn update_question(
        &self,
        id: QuestionId,
        draft: QuestionDraft,
    ) -> StoreResult<Question> {
        sqlx::query_as::<_, QuestionRow>(queries::UPDATE_QUESTION)
            .bind(&draft.title)
            .bind(draft.difficulty.as_str())
            .bind(&draft.description)
            .bind(&draft.starter_code)
            .bind(&draft.tags)
            .bind(Json(&draft.test_cases))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("question", id))?
            .try_into()
    }

    async fn delete_question(&self, id: QuestionId) -> StoreResult<()> {
        let result = sqlx::query(queries::DELETE_QUESTION)
            .bind(id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("question", id));
        }
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> StoreResult<Question> {
        sqlx::query_as::<_, QuestionRow>(queries::GET_QUESTION)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("question", id))?
            .try_into()
    }

    async fn list_questions(&self) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(queries::LIST_QUESTIONS)
            .fetch_all(self.db.pool())
            .await?;
        collect(rows)
    }

    async fn create_session(&self, kind: SessionKind) -> StoreResult<AuctionSession> {
        let (kind, auction_id) = kind_columns(&kind);
        sqlx::query_as::<_, SessionRow>(queries::INSERT_SESSION)
            .bind(kind)
            .bind(auction_id)
            .fetch_one(self.db.pool())
            .await?
            .try_into()
    }

    async fn save_session(&self, session: &AuctionSession) -> StoreResult<()> {
        let result = sqlx::query(queries::UPDATE_SESSION)
            .bind(session.phase.as_str())
            .bind(session.current_question_id)
            .bind(session.current_bid.as_ref().map(Json))
            .bind(session.deadline)
            .bind(session.id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("session", session.id));
        }
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> StoreResult<AuctionSession> {
        sqlx::query_as::<_, SessionRow>(queries::GET_SESSION)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("session", id))?
            .try_into()
    }

    async fn append_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        Ok(sqlx::query_as::<_, Bid>(queries::INSERT_BID)
            .bind(bid.session_id)
            .bind(bid.round_question_id)
            .bind(bid.user_id)
            .bind(bid.amount)
            .bind(bid.accepted_at)
            .fetch_one(self.db.pool())
            .await?)
    }

    async fn list_bids(&self, session_id: SessionId) -> StoreResult<Vec<Bid>> {
        Ok(sqlx::query_as::<_, Bid>(queries::LIST_BIDS)
            .bind(session_id)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn allocate(&self, new: NewAllotment) -> StoreResult<Allocation> {
        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    // 이미 처리된 라운드면 차감하지 않는다
                    let existing = sqlx::query_as::<_, AllotmentRow>(queries::FIND_ALLOTMENT)
                        .bind(new.session_id)
                        .bind(new.user_id)
                        .bind(new.question_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    if let Some(row) = existing {
                        let wallet_after: i64 = sqlx::query_scalar(queries::GET_USER_WALLET)
                            .bind(new.user_id)
                            .fetch_one(&mut **tx)
                            .await?;
                        return Ok(Allocation {
                            allotment: row.try_into()?,
                            created: false,
                            wallet_after,
                        });
                    }

                    // 조건부 차감 (동시 차감 시 행 잠금으로 직렬화)
                    let debited: Option<i64> = sqlx::query_scalar(queries::DEBIT_WALLET)
                        .bind(new.bid_amount)
                        .bind(new.user_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    let Some(wallet_after) = debited else {
                        let wallet: Option<i64> = sqlx::query_scalar(queries::GET_USER_WALLET)
                            .bind(new.user_id)
                            .fetch_optional(&mut **tx)
                            .await?;
                        return Err(match wallet {
                            Some(wallet) => StoreError::InsufficientFunds {
                                user_id: new.user_id,
                                wallet,
                                amount: new.bid_amount,
                            },
                            None => not_found("user", new.user_id),
                        });
                    };

                    let row = sqlx::query_as::<_, AllotmentRow>(queries::INSERT_ALLOTMENT)
                        .bind(new.session_id)
                        .bind(new.user_id)
                        .bind(new.question_id)
                        .bind(new.bid_amount)
                        .bind(new.total_test_cases)
                        .fetch_one(&mut **tx)
                        .await?;

                    Ok::<_, StoreError>(Allocation {
                        allotment: row.try_into()?,
                        created: true,
                        wallet_after,
                    })
                })
            })
            .await
    }

    async fn get_allotment(&self, id: AllotmentId) -> StoreResult<AllottedQuestion> {
        sqlx::query_as::<_, AllotmentRow>(queries::GET_ALLOTMENT)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("allotted question", id))?
            .try_into()
    }

    async fn find_allotment_for_question(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> StoreResult<Option<AllottedQuestion>> {
        sqlx::query_as::<_, AllotmentRow>(queries::FIND_ALLOTMENT_FOR_QUESTION)
            .bind(session_id)
            .bind(question_id)
            .fetch_optional(self.db.pool())
            .await?
            .map(AllottedQuestion::try_from)
            .transpose()
    }

    async fn update_allotment(&self, allotment: &AllottedQuestion) -> StoreResult<()> {
        let result = sqlx::query(queries::UPDATE_ALLOTMENT)
            .bind(allotment.status.as_str())
            .bind(allotment.score)
            .bind(allotment.test_cases_passed)
            .bind(allotment.total_test_cases)
            .bind(allotment.judge_failed)
            .bind(allotment.id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("allotted question", allotment.id));
        }
        Ok(())
    }

    async fn list_session_allotments(
        &self,
        session_id: SessionId,
    ) -> StoreResult<Vec<AllottedQuestion>> {
        let rows = sqlx::query_as::<_, AllotmentRow>(queries::LIST_SESSION_ALLOTMENTS)
            .bind(session_id)
            .fetch_all(self.db.pool())
            .await?;
        collect(rows)
    }

    async fn list_user_allotments(&self, user_id: UserId) -> StoreResult<Vec<AllottedQuestion>> {
        let rows = sqlx::query_as::<_, AllotmentRow>(queries::LIST_USER_ALLOTMENTS)
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?;
        collect(rows)
    }

    async fn list_allotments(&self) -> StoreResult<Vec<AllottedQuestion>> {
        let rows = sqlx::query_as::<_, AllotmentRow>(queries::LIST_ALLOTMENTS)
            .fetch_all(self.db.pool())
            .await?;
        collect(rows)
    }

    async fn create_scheduled(
        &self,
        draft: ScheduledAuctionDraft,
    ) -> StoreResult<ScheduledAuction> {
        sqlx::query_as::<_, ScheduledRow>(queries::INSERT_SCHEDULED)
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(draft.scheduled_time)
            .bind(&draft.questions)
            .bind(draft.min_users as i32)
            .bind(draft.max_users.map(|max| max as i32))
            .bind(draft.auction_duration as i64)
            .bind(draft.coding_duration as i64)
            .fetch_one(self.db.pool())
            .await?
            .try_into()
    }

    async fn get_scheduled(&self, id: AuctionId) -> StoreResult<ScheduledAuction> {
        sqlx::query_as::<_, ScheduledRow>(queries::GET_SCHEDULED)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| not_found("scheduled auction", id))?
            .try_into()
    }

    async fn list_scheduled(&self) -> StoreResult<Vec<ScheduledAuction>> {
        let rows = sqlx::query_as::<_, ScheduledRow>(queries::LIST_SCHEDULED)
            .fetch_all(self.db.pool())
            .await?;
        collect(rows)
    }

    async fn save_scheduled(&self, auction: &ScheduledAuction) -> StoreResult<()> {
        let joined: Vec<i64> = auction.joined_users.iter().copied().collect();
        let result = sqlx::query(queries::UPDATE_SCHEDULED)
            .bind(&auction.title)
            .bind(&auction.description)
            .bind(auction.scheduled_time)
            .bind(&auction.questions)
            .bind(auction.min_users as i32)
            .bind(auction.max_users.map(|max| max as i32))
            .bind(auction.auction_duration as i64)
            .bind(auction.coding_duration as i64)
            .bind(&joined)
            .bind(auction.status.as_str())
            .bind(auction.id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("scheduled auction", auction.id));
        }
        Ok(())
    }

    async fn delete_scheduled(&self, id: AuctionId) -> StoreResult<()> {
        let result = sqlx::query(queries::DELETE_SCHEDULED)
            .bind(id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("scheduled auction", id));
        }
        Ok(())
    }
}
// endregion: --- Postgres Store
