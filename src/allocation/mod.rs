//! 낙찰 처리와 코딩 단계 진입

// region:    --- Imports
use crate::allocation::model::{
    AllotmentStatus, AllottedQuestion, Allocation, CodingQuestion, NewAllotment,
};
use crate::auction::events::AuctionEvent;
use crate::auction::model::{QuestionId, QuestionView, SessionId, SessionPhase, UserId};
use crate::engine::AuctionEngine;
use crate::error::{EngineError, EngineResult};
use crate::session::{CodingBoard, SessionState, UserQueue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
// endregion: --- Imports

pub mod model;

impl AuctionEngine {
    /// 낙찰자의 지갑 차감과 할당 생성을 원자적으로 수행한다.
    /// 같은 (세션, 사용자, 문제) 는 한 번만 차감된다.
    pub async fn allocate(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        user_id: UserId,
        amount: i64,
    ) -> EngineResult<Allocation> {
        let question = self.store.get_question(question_id).await?;
        let allocation = self
            .store
            .allocate(NewAllotment {
                session_id,
                user_id,
                question_id,
                bid_amount: amount,
                total_test_cases: question.test_cases.len() as i32,
            })
            .await?;

        if allocation.created {
            info!(
                "{:<12} --> 낙찰: session={} question={} user={} amount={} (잔액 {})",
                "Allocation", session_id, question_id, user_id, amount, allocation.wallet_after
            );
        }
        Ok(allocation)
    }

    /// 코딩 단계 시작 (관리자 또는 예약 세션의 마지막 라운드 종료 후)
    pub async fn begin_coding(self: &Arc<Self>, session_id: SessionId) -> EngineResult<()> {
        let session = self.registry.get(session_id)?;
        let mut state = session.state.lock().await;
        self.begin_coding_locked(&mut state).await
    }

    pub(crate) async fn begin_coding_locked(
        self: &Arc<Self>,
        state: &mut SessionState,
    ) -> EngineResult<()> {
        match state.phase {
            SessionPhase::Bidding => {
                return Err(EngineError::RoundAlreadyActive {
                    session_id: state.id,
                    phase: state.phase,
                })
            }
            SessionPhase::Coding => return Err(EngineError::CodingAlreadyActive(state.id)),
            SessionPhase::Completed => return Err(EngineError::SessionClosed(state.id)),
            SessionPhase::Idle => {}
        }

        // 할당 순서대로 사용자별 대기열 구성
        let mut grouped: BTreeMap<UserId, Vec<_>> = BTreeMap::new();
        for aq in self.store.list_session_allotments(state.id).await? {
            if aq.status == AllotmentStatus::Allotted {
                grouped.entry(aq.user_id).or_default().push(aq);
            }
        }

        if grouped.is_empty() {
            info!(
                "{:<12} --> 세션 {} 할당 없음, 바로 종료",
                "Allocation", state.id
            );
            state.coding = Some(CodingBoard::default());
            self.finish_coding_locked(state).await?;
            return Ok(());
        }

        // 문제를 모두 확인한 뒤에만 상태를 바꾼다.
        let mut board = CodingBoard::default();
        let mut announcements = Vec::with_capacity(grouped.len());
        let mut heads = Vec::with_capacity(grouped.len());
        for (user_id, mut rows) in grouped {
            rows.sort_by_key(|aq| aq.id);
            let mut questions = Vec::with_capacity(rows.len());
            for (i, aq) in rows.iter().enumerate() {
                let question = self.store.get_question(aq.question_id).await?;
                questions.push(CodingQuestion {
                    allotted_question_id: aq.id,
                    status: if i == 0 {
                        AllotmentStatus::Coding
                    } else {
                        aq.status
                    },
                    question: QuestionView::from(&question),
                });
            }

            board
                .queues
                .insert(user_id, UserQueue::new(rows.iter().map(|aq| aq.id).collect()));
            announcements.push((user_id, questions));
            heads.extend(rows.into_iter().next());
        }

        self.start_heads(state.id, heads).await?;

        state.coding = Some(board);
        let seq = state.begin_phase(SessionPhase::Coding, state.coding_duration);
        self.arm_countdown(state, seq);
        self.persist(state).await;

        let time_remaining = state.time_remaining();
        info!(
            "{:<12} --> 코딩 시작: session={} 참가자 {}명 ({}초)",
            "Allocation",
            state.id,
            announcements.len(),
            time_remaining
        );
        for (user_id, questions) in announcements {
            self.bus.publish(AuctionEvent::CodingStarted {
                session_id: state.id,
                auction_id: state.auction_id(),
                user_id,
                questions,
                time_remaining,
            });
        }
        Ok(())
    }

    /// 사용자별 첫 문제를 coding 으로 바꾼다. 중간에 실패하면 바꾼 것을 되돌린다.
    async fn start_heads(
        &self,
        session_id: SessionId,
        heads: Vec<AllottedQuestion>,
    ) -> EngineResult<()> {
        let mut started: Vec<AllottedQuestion> = Vec::with_capacity(heads.len());
        for mut head in heads {
            head.advance_to(AllotmentStatus::Coding);
            if let Err(e) = self.store.update_allotment(&head).await {
                error!(
                    "{:<12} --> 세션 {} 코딩 시작 실패, {}건 되돌림: {}",
                    "Allocation",
                    session_id,
                    started.len(),
                    e
                );
                for mut aq in started {
                    aq.status = AllotmentStatus::Allotted;
                    if let Err(e) = self.store.update_allotment(&aq).await {
                        error!(
                            "{:<12} --> 할당 {} 되돌리기 실패: {}",
                            "Allocation", aq.id, e
                        );
                    }
                }
                return Err(e.into());
            }
            started.push(head);
        }
        Ok(())
    }
}
