#![allow(dead_code)]

use async_trait::async_trait;
use code_auction_service::auction::events::AuctionEvent;
use code_auction_service::allocation::model::{
    AllotmentStatus, AllottedQuestion, Allocation, NewAllotment,
};
use code_auction_service::auction::model::{
    AllotmentId, AuctionId, AuctionSession, Difficulty, NewUser, Question, QuestionDraft,
    QuestionId, SessionId, SessionKind, TestCase, User, UserId,
};
use code_auction_service::bidding::model::{Bid, NewBid};
use code_auction_service::engine::{AuctionEngine, EngineSettings};
use code_auction_service::judge::{Judge, JudgeError, JudgeVerdict, RetryPolicy};
use code_auction_service::message_broker::{EventBus, EventFilter, Subscription};
use code_auction_service::scheduler::model::{ScheduledAuction, ScheduledAuctionDraft};
use code_auction_service::store::{AuctionStore, MemoryStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ROUND: Duration = Duration::from_secs(10);
pub const CODING: Duration = Duration::from_secs(60);
pub const SLOW_JUDGE: Duration = Duration::from_secs(30);

/// 코드 내용으로 결과를 정하는 채점기
/// "pass:N" -> N 개 통과, "boom" -> 전송 오류, "slow" -> 30초 뒤 전부 통과, 그 외 -> 0 개 통과
#[derive(Default)]
pub struct ScriptedJudge {
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate(
        &self,
        code: &str,
        test_cases: &[TestCase],
    ) -> Result<JudgeVerdict, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = test_cases.len() as u32;
        if code == "boom" {
            return Err(JudgeError::Transport("connection refused".to_string()));
        }
        if code == "slow" {
            tokio::time::sleep(SLOW_JUDGE).await;
            return Ok(JudgeVerdict {
                test_cases_passed: total,
                total_test_cases: total,
            });
        }
        let passed = code
            .strip_prefix("pass:")
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(0);
        Ok(JudgeVerdict {
            test_cases_passed: passed.min(total),
            total_test_cases: total,
        })
    }
}

pub struct Harness {
    pub engine: Arc<AuctionEngine>,
    pub store: Arc<MemoryStore>,
    pub judge: Arc<ScriptedJudge>,
    pub bus: EventBus,
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        live_round: ROUND,
        live_coding: CODING,
        timer_tick: Duration::from_secs(1),
        top_performers: 3,
        judge_retry: RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(1),
        },
    }
}

pub async fn setup() -> Harness {
    setup_with(settings()).await
}

pub async fn setup_with(settings: EngineSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    assemble(store.clone(), store, settings).await
}

/// 저장소 쓰기 실패를 주입할 수 있는 하네스
pub async fn setup_flaky() -> (Harness, Arc<FlakyStore>) {
    let store = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(store.clone()));
    let harness = assemble(flaky.clone(), store, settings()).await;
    (harness, flaky)
}

async fn assemble(
    engine_store: Arc<dyn AuctionStore>,
    store: Arc<MemoryStore>,
    settings: EngineSettings,
) -> Harness {
    let judge = Arc::new(ScriptedJudge::default());
    let bus = EventBus::new(1024);
    let engine = AuctionEngine::new(engine_store, judge.clone(), bus.clone(), settings);
    engine
        .open_live_session()
        .await
        .expect("라이브 세션 생성 실패");
    Harness {
        engine,
        store,
        judge,
        bus,
    }
}

impl Harness {
    pub async fn user(&self, name: &str, wallet: i64) -> User {
        self.store
            .create_user(
                NewUser {
                    username: name.to_string(),
                    team_name: format!("team-{}", name),
                    wallet: Some(wallet),
                },
                200,
            )
            .await
            .expect("사용자 생성 실패")
    }

    pub async fn question(&self, title: &str, cases: usize) -> Question {
        self.store
            .create_question(QuestionDraft {
                title: title.to_string(),
                difficulty: Difficulty::Easy,
                description: format!("{} description", title),
                starter_code: String::new(),
                tags: vec!["test".to_string()],
                test_cases: (0..cases)
                    .map(|i| TestCase {
                        input: i.to_string(),
                        expected_output: (i * 2).to_string(),
                    })
                    .collect(),
            })
            .await
            .expect("문제 생성 실패")
    }

    pub async fn live_id(&self) -> SessionId {
        self.engine.live_session().await.expect("라이브 세션").id
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe(EventFilter::all())
    }

    pub async fn wallet(&self, user: &User) -> i64 {
        self.store.get_user(user.id).await.expect("사용자 조회").wallet
    }

    /// 한 라운드를 열고 입찰 후 만료까지 기다린다.
    pub async fn win(&self, session_id: SessionId, question: &Question, user: &User, amount: i64) {
        self.engine
            .open_round(session_id, question.id)
            .await
            .expect("라운드 시작 실패");
        self.engine
            .place_bid(session_id, user.id, amount)
            .await
            .expect("입찰 실패");
        pass(ROUND + Duration::from_millis(100)).await;
    }
}

/// 가상 시간을 진행시킨다. 멈춘 시계에서는 대기 중인 타이머가 순서대로 실행된다.
pub async fn pass(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// 수신 대기 중인 이벤트를 모두 꺼낸다.
pub fn drain(sub: &mut Subscription) -> Vec<Arc<AuctionEvent>> {
    let mut events = Vec::new();
    while let Some(event) = sub.try_recv() {
        events.push(event);
    }
    events
}

// region:    --- Flaky Store
/// 메모리 저장소를 감싸고, 켜진 스위치에 해당하는 쓰기를 실패시킨다.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    /// 예약 세션 생성 실패
    pub fail_scheduled_sessions: AtomicBool,
    /// 채점 결과 기록 실패
    pub fail_evaluations: AtomicBool,
    /// 코딩 시작 기록 실패 (n 번째 쓰기부터)
    pub fail_coding_after: AtomicUsize,
    coding_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_scheduled_sessions: AtomicBool::new(false),
            fail_evaluations: AtomicBool::new(false),
            fail_coding_after: AtomicUsize::new(usize::MAX),
            coding_writes: AtomicUsize::new(0),
        }
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl AuctionStore for FlakyStore {
    async fn create_user(&self, user: NewUser, initial_wallet: i64) -> StoreResult<User> {
        self.inner.create_user(user, initial_wallet).await
    }
    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.inner.get_user(id).await
    }
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }
    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        self.inner.set_user_active(id, active).await
    }

    async fn create_question(&self, draft: QuestionDraft) -> StoreResult<Question> {
        self.inner.create_question(draft).await
    }
    async fn update_question(
        &self,
        id: QuestionId,
        draft: QuestionDraft,
    ) -> StoreResult<Question> {
        self.inner.update_question(id, draft).await
    }
    async fn delete_question(&self, id: QuestionId) -> StoreResult<()> {
        self.inner.delete_question(id).await
    }
    async fn get_question(&self, id: QuestionId) -> StoreResult<Question> {
        self.inner.get_question(id).await
    }
    async fn list_questions(&self) -> StoreResult<Vec<Question>> {
        self.inner.list_questions().await
    }

    async fn create_session(&self, kind: SessionKind) -> StoreResult<AuctionSession> {
        if matches!(kind, SessionKind::Scheduled { .. })
            && self.fail_scheduled_sessions.load(Ordering::SeqCst)
        {
            return Err(unavailable());
        }
        self.inner.create_session(kind).await
    }
    async fn save_session(&self, session: &AuctionSession) -> StoreResult<()> {
        self.inner.save_session(session).await
    }
    async fn get_session(&self, id: SessionId) -> StoreResult<AuctionSession> {
        self.inner.get_session(id).await
    }

    async fn append_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        self.inner.append_bid(bid).await
    }
    async fn list_bids(&self, session_id: SessionId) -> StoreResult<Vec<Bid>> {
        self.inner.list_bids(session_id).await
    }

    async fn allocate(&self, allotment: NewAllotment) -> StoreResult<Allocation> {
        self.inner.allocate(allotment).await
    }
    async fn get_allotment(&self, id: AllotmentId) -> StoreResult<AllottedQuestion> {
        self.inner.get_allotment(id).await
    }
    async fn find_allotment_for_question(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> StoreResult<Option<AllottedQuestion>> {
        self.inner
            .find_allotment_for_question(session_id, question_id)
            .await
    }
    async fn update_allotment(&self, allotment: &AllottedQuestion) -> StoreResult<()> {
        match allotment.status {
            AllotmentStatus::Evaluated if self.fail_evaluations.load(Ordering::SeqCst) => {
                return Err(unavailable())
            }
            AllotmentStatus::Coding => {
                let n = self.coding_writes.fetch_add(1, Ordering::SeqCst);
                if n >= self.fail_coding_after.load(Ordering::SeqCst) {
                    return Err(unavailable());
                }
            }
            _ => {}
        }
        self.inner.update_allotment(allotment).await
    }
    async fn list_session_allotments(
        &self,
        session_id: SessionId,
    ) -> StoreResult<Vec<AllottedQuestion>> {
        self.inner.list_session_allotments(session_id).await
    }
    async fn list_user_allotments(&self, user_id: UserId) -> StoreResult<Vec<AllottedQuestion>> {
        self.inner.list_user_allotments(user_id).await
    }
    async fn list_allotments(&self) -> StoreResult<Vec<AllottedQuestion>> {
        self.inner.list_allotments().await
    }

    async fn create_scheduled(
        &self,
        draft: ScheduledAuctionDraft,
    ) -> StoreResult<ScheduledAuction> {
        self.inner.create_scheduled(draft).await
    }
    async fn get_scheduled(&self, id: AuctionId) -> StoreResult<ScheduledAuction> {
        self.inner.get_scheduled(id).await
    }
    async fn list_scheduled(&self) -> StoreResult<Vec<ScheduledAuction>> {
        self.inner.list_scheduled().await
    }
    async fn save_scheduled(&self, auction: &ScheduledAuction) -> StoreResult<()> {
        self.inner.save_scheduled(auction).await
    }
    async fn delete_scheduled(&self, id: AuctionId) -> StoreResult<()> {
        self.inner.delete_scheduled(id).await
    }
}
// endregion: --- Flaky Store
