//! 경매 오케스트레이션 엔진
//! 세션 레지스트리, 타이머, 저장소, 채점기, 이벤트 버스를 묶는다.
//! 라운드/할당/코딩 단계의 연산은 각 모듈의 `impl AuctionEngine` 블록에 있다.

// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{AuctionSession, QuestionId, SessionId, SessionKind, SessionPhase};
use crate::coding::ranking::{RankingPolicy, TieBreak};
use crate::error::{EngineError, EngineResult};
use crate::judge::{Judge, RetryPolicy};
use crate::message_broker::EventBus;
use crate::scheduler::model::ScheduledAuction;
use crate::session::{Session, SessionRegistry, SessionState};
use crate::store::AuctionStore;
use crate::timer::TimerService;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub live_round: Duration,
    pub live_coding: Duration,
    pub timer_tick: Duration,
    pub top_performers: usize,
    pub judge_retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            live_round: Duration::from_secs(60),
            live_coding: Duration::from_secs(900),
            timer_tick: Duration::from_secs(1),
            top_performers: 3,
            judge_retry: RetryPolicy::default(),
        }
    }
}
// endregion: --- Settings

// region:    --- Auction Engine
pub struct AuctionEngine {
    pub(crate) store: Arc<dyn AuctionStore>,
    pub(crate) judge: Arc<dyn Judge>,
    pub(crate) bus: EventBus,
    pub(crate) registry: SessionRegistry,
    pub(crate) timer: TimerService,
    pub(crate) settings: EngineSettings,
    pub(crate) ranking: Arc<dyn RankingPolicy>,
}

impl AuctionEngine {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        judge: Arc<dyn Judge>,
        bus: EventBus,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Self::with_ranking(store, judge, bus, settings, Arc::new(TieBreak::default()))
    }

    pub fn with_ranking(
        store: Arc<dyn AuctionStore>,
        judge: Arc<dyn Judge>,
        bus: EventBus,
        settings: EngineSettings,
        ranking: Arc<dyn RankingPolicy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            judge,
            bus,
            registry: SessionRegistry::new(),
            timer: TimerService::new(settings.timer_tick),
            settings,
            ranking,
        })
    }

    pub fn store(&self) -> &Arc<dyn AuctionStore> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn ranking(&self) -> &dyn RankingPolicy {
        self.ranking.as_ref()
    }

    // region:    --- Sessions
    /// 새 라이브 세션을 만들고 현재 라이브 세션으로 등록한다.
    pub async fn open_live_session(&self) -> EngineResult<Arc<Session>> {
        let snapshot = self.store.create_session(SessionKind::Live).await?;
        let state = SessionState::new(
            &snapshot,
            self.settings.live_round,
            self.settings.live_coding,
        );
        let session = Arc::new(Session::new(state));
        self.registry.insert(Arc::clone(&session));
        self.registry.set_live(session.id);
        info!("{:<12} --> 라이브 세션 생성: {}", "Engine", session.id);
        Ok(session)
    }

    /// 현재 라이브 세션. 없으면 새로 만든다.
    pub async fn live_session(&self) -> EngineResult<Arc<Session>> {
        match self.registry.live() {
            Some(session) => Ok(session),
            None => self.open_live_session().await,
        }
    }

    /// 라이브 세션 초기화 (관리자)
    /// 진행 중인 단계가 없을 때만 가능하며, 이전 세션은 기록용으로 남는다.
    pub async fn reset_live(&self) -> EngineResult<AuctionSession> {
        if let Some(current) = self.registry.live() {
            let state = current.state.lock().await;
            match state.phase {
                SessionPhase::Bidding => {
                    return Err(EngineError::RoundAlreadyActive {
                        session_id: state.id,
                        phase: state.phase,
                    })
                }
                SessionPhase::Coding => return Err(EngineError::CodingAlreadyActive(state.id)),
                SessionPhase::Idle | SessionPhase::Completed => {}
            }
        }
        let session = self.open_live_session().await?;
        let state = session.state.lock().await;
        Ok(state.snapshot())
    }

    /// 예약 경매를 세션으로 등록하고 첫 라운드를 연다.
    pub async fn start_scheduled_session(
        self: &Arc<Self>,
        auction: &ScheduledAuction,
    ) -> EngineResult<SessionId> {
        let snapshot = self
            .store
            .create_session(SessionKind::Scheduled {
                auction_id: auction.id,
            })
            .await?;
        let mut state = SessionState::new(
            &snapshot,
            Duration::from_secs(auction.auction_duration),
            Duration::from_secs(auction.coding_duration),
        );
        state.participants = Some(auction.joined_users.clone());
        state.pending_questions = auction.questions.iter().copied().collect();

        let session = Arc::new(Session::new(state));
        self.registry.insert(Arc::clone(&session));
        info!(
            "{:<12} --> 예약 경매 세션 시작: auction={} session={}",
            "Engine", auction.id, session.id
        );

        self.bus.publish(AuctionEvent::ScheduledStarted {
            auction_id: auction.id,
            session_id: session.id,
            title: auction.title.clone(),
        });

        let mut state = session.state.lock().await;
        if let Err(e) = self.advance_schedule(&mut state).await {
            self.registry.remove(session.id);
            return Err(e);
        }
        Ok(session.id)
    }

    pub async fn session_snapshot(&self, session_id: SessionId) -> EngineResult<AuctionSession> {
        let session = self.registry.get(session_id)?;
        let state = session.state.lock().await;
        Ok(state.snapshot())
    }

    /// 경매에 걸려 있는 문제는 수정하거나 삭제할 수 없다.
    /// 진행 중인 라운드, 예약 세션의 남은 문제, 낙찰 기록이 모두 해당된다.
    pub async fn ensure_question_idle(&self, question_id: QuestionId) -> EngineResult<()> {
        for session in self.registry.list() {
            let state = session.state.lock().await;
            if state.phase == SessionPhase::Bidding && state.current_question_id == Some(question_id)
            {
                return Err(EngineError::RoundAlreadyActive {
                    session_id: state.id,
                    phase: state.phase,
                });
            }
            if state.pending_questions.contains(&question_id) {
                return Err(EngineError::QuestionInUse {
                    session_id: state.id,
                    question_id,
                });
            }
        }

        // 낙찰된 문제는 결과 조회를 위해 남겨 둔다.
        if let Some(aq) = self
            .store
            .list_allotments()
            .await?
            .into_iter()
            .find(|aq| aq.question_id == question_id)
        {
            return Err(EngineError::QuestionAlreadyAllotted {
                session_id: aq.session_id,
                question_id,
            });
        }
        Ok(())
    }

    /// 세션 스냅샷 저장. 실패해도 메모리 상태가 기준이므로 기록만 남긴다.
    pub(crate) async fn persist(&self, state: &SessionState) {
        if let Err(e) = self.store.save_session(&state.snapshot()).await {
            error!(
                "{:<12} --> 세션 {} 저장 실패: {}",
                "Engine", state.id, e
            );
        }
    }

    /// 예약 세션의 다음 단계: 남은 문제가 있으면 다음 라운드, 없으면 코딩 시작.
    pub(crate) async fn advance_schedule(
        self: &Arc<Self>,
        state: &mut SessionState,
    ) -> EngineResult<()> {
        while let Some(question_id) = state.pending_questions.pop_front() {
            match self.open_round_locked(state, question_id).await {
                Ok(()) => return Ok(()),
                Err(e) => error!(
                    "{:<12} --> 세션 {} 문제 {} 건너뜀: {}",
                    "Engine", state.id, question_id, e
                ),
            }
        }
        self.begin_coding_locked(state).await
    }
    // endregion: --- Sessions

    // region:    --- Countdown
    /// 현재 단계의 카운트다운을 건다. 만료 시 단계 번호가 같을 때만 종료 처리가 실행된다.
    pub(crate) fn arm_countdown(self: &Arc<Self>, state: &mut SessionState, seq: u64) {
        let duration = match state.phase {
            SessionPhase::Bidding => state.round_duration,
            SessionPhase::Coding => state.coding_duration,
            SessionPhase::Idle | SessionPhase::Completed => return,
        };
        let session_id = state.id;
        let auction_id = state.auction_id();
        let phase = state.phase;
        let bus = self.bus.clone();
        let engine = Arc::downgrade(self);

        let countdown = self.timer.start(
            duration,
            move |time_remaining| {
                bus.publish(AuctionEvent::TimerUpdate {
                    session_id,
                    auction_id,
                    phase,
                    time_remaining,
                })
            },
            move || async move {
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                let result = match phase {
                    SessionPhase::Bidding => engine.close_round(session_id, seq).await.map(|_| ()),
                    SessionPhase::Coding => engine.auto_submit(session_id, seq).await,
                    SessionPhase::Idle | SessionPhase::Completed => Ok(()),
                };
                if let Err(e) = result {
                    error!(
                        "{:<12} --> 세션 {} {} 만료 처리 실패: {}",
                        "Timer", session_id, phase, e
                    );
                }
            },
        );
        state.countdown = Some(countdown);
    }
    // endregion: --- Countdown
}
// endregion: --- Auction Engine
