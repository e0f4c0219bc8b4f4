//! 저장소 추상화
//! 엔진은 이 트레이트만 사용하며, 테스트와 단일 프로세스 실행은 메모리 저장소를,
//! 운영 환경은 Postgres 저장소를 사용한다.

// region:    --- Imports
use crate::allocation::model::{AllottedQuestion, Allocation, NewAllotment};
use crate::auction::model::{
    AllotmentId, AuctionId, AuctionSession, NewUser, Question, QuestionDraft, QuestionId,
    SessionId, SessionKind, User, UserId,
};
use crate::bidding::model::{Bid, NewBid};
use crate::scheduler::model::{ScheduledAuction, ScheduledAuctionDraft};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
// endregion: --- Imports

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("user {user_id} has {wallet} points, cannot debit {amount}")]
    InsufficientFunds {
        user_id: UserId,
        wallet: i64,
        amount: i64,
    },
    #[error("duplicate {0}")]
    Duplicate(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

// region:    --- Store Trait
/// 경매 저장소 트레이트
#[async_trait]
pub trait AuctionStore: Send + Sync {
    // 사용자
    async fn create_user(&self, user: NewUser, initial_wallet: i64) -> StoreResult<User>;
    async fn get_user(&self, id: UserId) -> StoreResult<User>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User>;

    // 문제
    async fn create_question(&self, draft: QuestionDraft) -> StoreResult<Question>;
    async fn update_question(&self, id: QuestionId, draft: QuestionDraft)
        -> StoreResult<Question>;
    async fn delete_question(&self, id: QuestionId) -> StoreResult<()>;
    async fn get_question(&self, id: QuestionId) -> StoreResult<Question>;
    async fn list_questions(&self) -> StoreResult<Vec<Question>>;

    // 세션
    async fn create_session(&self, kind: SessionKind) -> StoreResult<AuctionSession>;
    async fn save_session(&self, session: &AuctionSession) -> StoreResult<()>;
    async fn get_session(&self, id: SessionId) -> StoreResult<AuctionSession>;

    // 입찰 로그 (append-only)
    async fn append_bid(&self, bid: NewBid) -> StoreResult<Bid>;
    async fn list_bids(&self, session_id: SessionId) -> StoreResult<Vec<Bid>>;

    // 할당
    /// 지갑 차감과 할당 생성을 하나의 원자적 단위로 수행한다.
    /// 같은 (session, user, question) 이 이미 있으면 차감 없이 기존 기록을 돌려준다.
    async fn allocate(&self, allotment: NewAllotment) -> StoreResult<Allocation>;
    async fn get_allotment(&self, id: AllotmentId) -> StoreResult<AllottedQuestion>;
    async fn find_allotment_for_question(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> StoreResult<Option<AllottedQuestion>>;
    async fn update_allotment(&self, allotment: &AllottedQuestion) -> StoreResult<()>;
    async fn list_session_allotments(
        &self,
        session_id: SessionId,
    ) -> StoreResult<Vec<AllottedQuestion>>;
    async fn list_user_allotments(&self, user_id: UserId) -> StoreResult<Vec<AllottedQuestion>>;
    async fn list_allotments(&self) -> StoreResult<Vec<AllottedQuestion>>;

    // 예약 경매
    async fn create_scheduled(&self, draft: ScheduledAuctionDraft)
        -> StoreResult<ScheduledAuction>;
    async fn get_scheduled(&self, id: AuctionId) -> StoreResult<ScheduledAuction>;
    async fn list_scheduled(&self) -> StoreResult<Vec<ScheduledAuction>>;
    async fn save_scheduled(&self, auction: &ScheduledAuction) -> StoreResult<()>;
    async fn delete_scheduled(&self, id: AuctionId) -> StoreResult<()>;
}
// endregion: --- Store Trait
