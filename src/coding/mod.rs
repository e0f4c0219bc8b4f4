//! 코딩 단계 컨트롤러
//! 사용자별 대기열을 순서대로 진행시키고, 채점은 세션 잠금 밖에서 수행한다.

// region:    --- Imports
use crate::allocation::model::{AllotmentStatus, AllottedQuestion};
use crate::auction::events::AuctionEvent;
use crate::auction::model::{AllotmentId, SessionId, SessionPhase, UserId};
use crate::coding::ranking::{aggregate, rank, top_n, UserResult};
use crate::engine::AuctionEngine;
use crate::error::{EngineError, EngineResult};
use crate::judge::{evaluate_with_retry, Evaluation};
use crate::scheduler::model::ScheduledStatus;
use crate::session::{CodingBoard, Session, SessionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
// endregion: --- Imports

pub mod ranking;

// region:    --- Commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCodeCommand {
    pub code: String,
}

/// 제출 결과
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub allotted_question_id: AllotmentId,
    pub score: i32,
    pub test_cases_passed: i32,
    pub total_test_cases: i32,
    pub judge_failed: bool,
    pub next_allotted_id: Option<AllotmentId>,
    pub complete: bool,
}
// endregion: --- Commands

fn board_mut(state: &mut SessionState) -> EngineResult<&mut CodingBoard> {
    let session_id = state.id;
    state
        .coding
        .as_mut()
        .ok_or(EngineError::CodingNotActive(session_id))
}

impl AuctionEngine {
    /// 본인 소유의 할당만 조회한다. 다른 사용자의 것은 존재하지 않는 것으로 취급한다.
    async fn owned_allotment(
        &self,
        user_id: UserId,
        allotted_id: AllotmentId,
    ) -> EngineResult<AllottedQuestion> {
        let aq = self.store.get_allotment(allotted_id).await?;
        if aq.user_id != user_id {
            return Err(EngineError::NotFound {
                entity: "allotted question",
                id: allotted_id,
            });
        }
        Ok(aq)
    }

    fn ensure_coding_open(state: &SessionState) -> EngineResult<()> {
        let expired = state.coding.as_ref().map_or(true, |b| b.expired);
        if state.phase != SessionPhase::Coding || state.deadline_passed() || expired {
            return Err(EngineError::CodingNotActive(state.id));
        }
        Ok(())
    }

    // region:    --- Draft
    /// 편집 중인 코드 저장. 코딩 시간이 끝나면 이 내용으로 강제 제출된다.
    pub async fn save_draft(
        &self,
        user_id: UserId,
        allotted_id: AllotmentId,
        code: String,
    ) -> EngineResult<()> {
        let aq = self.owned_allotment(user_id, allotted_id).await?;
        let session = self.registry.get(aq.session_id)?;
        let mut state = session.state.lock().await;
        Self::ensure_coding_open(&state)?;

        let current = self.store.get_allotment(allotted_id).await?;
        if current.status != AllotmentStatus::Coding {
            return Err(EngineError::AlreadySubmitted(allotted_id));
        }
        let board = board_mut(&mut state)?;
        if let Some(queue) = board.queues.get_mut(&user_id) {
            queue.drafts.insert(allotted_id, code);
        }
        Ok(())
    }
    // endregion: --- Draft

    // region:    --- Submit
    /// 코드 제출
    pub async fn submit_code(
        self: &Arc<Self>,
        user_id: UserId,
        allotted_id: AllotmentId,
        code: String,
    ) -> EngineResult<SubmissionOutcome> {
        let aq = self.owned_allotment(user_id, allotted_id).await?;
        let session = self.registry.get(aq.session_id)?;

        // submitted 로 표시한 뒤 잠금을 풀고 채점한다.
        let (aq, question) = {
            let mut state = session.state.lock().await;
            Self::ensure_coding_open(&state)?;

            let mut aq = self.store.get_allotment(allotted_id).await?;
            if !aq.advance_to(AllotmentStatus::Submitted) {
                return Err(EngineError::AlreadySubmitted(allotted_id));
            }
            let question = self.store.get_question(aq.question_id).await?;
            self.store.update_allotment(&aq).await?;

            let board = board_mut(&mut state)?;
            if let Some(queue) = board.queues.get_mut(&user_id) {
                queue.in_flight = true;
                queue.drafts.remove(&allotted_id);
            }
            (aq, question)
        };

        info!(
            "{:<12} --> 제출: user={} allotted={}",
            "Coding", user_id, allotted_id
        );
        let evaluation = evaluate_with_retry(
            self.judge.as_ref(),
            &self.settings.judge_retry,
            &code,
            &question.test_cases,
        )
        .await;

        self.record_evaluation(&session, aq, evaluation, false).await
    }

    /// 채점 결과 기록 후 대기열 전진. 모든 대기열이 끝나면 코딩 단계를 마감한다.
    async fn record_evaluation(
        self: &Arc<Self>,
        session: &Session,
        mut aq: AllottedQuestion,
        evaluation: Evaluation,
        forced: bool,
    ) -> EngineResult<SubmissionOutcome> {
        let mut state = session.state.lock().await;

        aq.score = Some(evaluation.score);
        aq.test_cases_passed = evaluation.test_cases_passed;
        aq.total_test_cases = evaluation.total_test_cases;
        aq.judge_failed = evaluation.judge_failed;
        aq.advance_to(AllotmentStatus::Evaluated);
        if let Err(e) = self.store.update_allotment(&aq).await {
            error!(
                "{:<12} --> 채점 결과 저장 실패: allotted={} {}",
                "Coding", aq.id, e
            );
            // 이 대기열은 더 진행하지 않는다. 마감 조건은 다시 확인한다.
            self.close_queue(&mut state, aq.user_id).await?;
            return Err(e.into());
        }

        let board = board_mut(&mut state)?;
        let expired = board.expired;
        let (mut next, mut complete) = match board.queues.get_mut(&aq.user_id) {
            Some(queue) => {
                queue.in_flight = false;
                let next = if expired || queue.complete {
                    queue.complete = true;
                    None
                } else {
                    queue.advance()
                };
                (next, queue.complete)
            }
            None => (None, true),
        };

        if let Some(next_id) = next {
            if let Err(e) = self.start_next(next_id).await {
                error!(
                    "{:<12} --> 다음 문제 {} 시작 실패, 대기열 종료: {}",
                    "Coding", next_id, e
                );
                if let Some(queue) = board_mut(&mut state)?.queues.get_mut(&aq.user_id) {
                    queue.complete = true;
                }
                next = None;
                complete = true;
            }
        }
        let settled = board_mut(&mut state)?.all_complete();

        self.bus.publish(AuctionEvent::SubmissionEvaluated {
            session_id: state.id,
            user_id: aq.user_id,
            allotted_question_id: aq.id,
            score: evaluation.score,
            test_cases_passed: evaluation.test_cases_passed,
            total_test_cases: evaluation.total_test_cases,
            judge_failed: evaluation.judge_failed,
            forced,
        });

        if settled {
            self.finish_coding_locked(&mut state).await?;
        }

        Ok(SubmissionOutcome {
            allotted_question_id: aq.id,
            score: evaluation.score,
            test_cases_passed: evaluation.test_cases_passed,
            total_test_cases: evaluation.total_test_cases,
            judge_failed: evaluation.judge_failed,
            next_allotted_id: next,
            complete,
        })
    }
    async fn start_next(&self, next_id: AllotmentId) -> EngineResult<()> {
        let mut upcoming = self.store.get_allotment(next_id).await?;
        upcoming.advance_to(AllotmentStatus::Coding);
        self.store.update_allotment(&upcoming).await?;
        Ok(())
    }

    /// 기록하지 못한 제출의 대기열을 닫는다. 남은 대기열이 없으면 코딩 단계를 마감한다.
    async fn close_queue(
        self: &Arc<Self>,
        state: &mut SessionState,
        user_id: UserId,
    ) -> EngineResult<()> {
        let board = board_mut(state)?;
        if let Some(queue) = board.queues.get_mut(&user_id) {
            queue.in_flight = false;
            queue.complete = true;
        }
        if board.all_complete() && state.phase == SessionPhase::Coding {
            self.finish_coding_locked(state).await?;
        }
        Ok(())
    }
    // endregion: --- Submit

    // region:    --- Auto Submit
    /// 코딩 타이머 만료. 진행 중인 문제는 저장된 초안으로 강제 제출되고,
    /// 아직 시작하지 않은 문제는 allotted 로 남아 점수에서 제외된다.
    pub(crate) async fn auto_submit(
        self: &Arc<Self>,
        session_id: SessionId,
        seq: u64,
    ) -> EngineResult<()> {
        let session = self.registry.get(session_id)?;

        let forced = {
            let mut state = session.state.lock().await;
            if !state.is_current(seq) || state.phase != SessionPhase::Coding {
                return Ok(());
            }
            state.countdown = None;

            let board = board_mut(&mut state)?;
            board.expired = true;

            // 강제 제출 대상은 기록이 끝날 때까지 in_flight 로 둔다.
            let mut pending = Vec::new();
            for queue in board.queues.values_mut() {
                if queue.in_flight || queue.complete {
                    continue;
                }
                match queue.current() {
                    Some(current) => {
                        queue.in_flight = true;
                        pending.push((current, queue.drafts.remove(&current)));
                    }
                    None => queue.complete = true,
                }
            }

            let mut forced = Vec::with_capacity(pending.len());
            let mut skipped = Vec::new();
            for (allotted_id, draft) in pending {
                let mut aq = self.store.get_allotment(allotted_id).await?;
                if aq.advance_to(AllotmentStatus::Submitted) {
                    self.store.update_allotment(&aq).await?;
                    forced.push((aq, draft));
                } else {
                    skipped.push(aq.user_id);
                }
            }

            let board = board_mut(&mut state)?;
            for user_id in skipped {
                if let Some(queue) = board.queues.get_mut(&user_id) {
                    queue.in_flight = false;
                    queue.complete = true;
                }
            }
            let settled = board.all_complete();

            info!(
                "{:<12} --> 코딩 시간 종료: session={} 강제 제출 {}건",
                "Coding",
                session_id,
                forced.len()
            );
            if forced.is_empty() && settled {
                self.finish_coding_locked(&mut state).await?;
                return Ok(());
            }
            forced
        };

        let mut tasks = JoinSet::new();
        for (aq, draft) in forced {
            let engine = Arc::clone(self);
            let session = Arc::clone(&session);
            tasks.spawn(async move {
                let evaluation = match draft.filter(|code| !code.trim().is_empty()) {
                    Some(code) => match engine.store.get_question(aq.question_id).await {
                        Ok(question) => {
                            evaluate_with_retry(
                                engine.judge.as_ref(),
                                &engine.settings.judge_retry,
                                &code,
                                &question.test_cases,
                            )
                            .await
                        }
                        Err(e) => {
                            warn!("{:<12} --> 문제 조회 실패: {}", "Coding", e);
                            Evaluation::failed(aq.total_test_cases)
                        }
                    },
                    None => Evaluation::empty(aq.total_test_cases),
                };
                engine
                    .record_evaluation(&session, aq, evaluation, true)
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("{:<12} --> 강제 제출 기록 실패: {}", "Coding", e),
                Err(e) => error!("{:<12} --> 강제 제출 태스크 실패: {}", "Coding", e),
            }
        }
        Ok(())
    }
    // endregion: --- Auto Submit

    // region:    --- End Coding
    /// 코딩 단계 마감. 모든 대기열이 끝난 뒤에만 가능하며, 이미 마감된 세션은 결과만 다시 돌려준다.
    pub async fn end_coding(&self, session_id: SessionId) -> EngineResult<Vec<UserResult>> {
        let session = self.registry.get(session_id)?;
        let mut state = session.state.lock().await;
        match &state.coding {
            Some(board) if board.finished => return self.session_results(session_id).await,
            Some(board) if state.phase == SessionPhase::Coding => {
                if !board.all_complete() {
                    return Err(EngineError::CodingNotFinished(session_id));
                }
            }
            _ => return Err(EngineError::CodingNotActive(session_id)),
        }
        self.finish_coding_locked(&mut state).await
    }

    /// 세션 결과 집계 및 순위
    pub async fn session_results(&self, session_id: SessionId) -> EngineResult<Vec<UserResult>> {
        let users = self.store.list_users().await?;
        let allotments = self.store.list_session_allotments(session_id).await?;
        Ok(rank(
            self.ranking.as_ref(),
            aggregate(&users, &allotments, false),
        ))
    }

    pub(crate) async fn finish_coding_locked(
        &self,
        state: &mut SessionState,
    ) -> EngineResult<Vec<UserResult>> {
        let session_id = state.id;
        if state.coding.as_ref().is_some_and(|b| b.finished) {
            return self.session_results(session_id).await;
        }

        let results = self.session_results(session_id).await?;
        let top_performers = top_n(&results, self.settings.top_performers);

        if let Some(board) = state.coding.as_mut() {
            board.finished = true;
        }
        state.end_phase(SessionPhase::Completed);
        self.persist(state).await;

        info!(
            "{:<12} --> 코딩 종료: session={} 참가자 {}명",
            "Coding",
            session_id,
            results.len()
        );
        self.bus.publish(AuctionEvent::CodingEnded {
            session_id,
            auction_id: state.auction_id(),
            results: results.clone(),
            top_performers,
        });

        if let Some(auction_id) = state.auction_id() {
            let mut auction = self.store.get_scheduled(auction_id).await?;
            match auction.transition(ScheduledStatus::Completed) {
                Ok(()) => {
                    self.store.save_scheduled(&auction).await?;
                    self.bus.publish(AuctionEvent::AuctionCompleted {
                        auction_id,
                        session_id,
                        results: results.clone(),
                    });
                }
                Err((from, to)) => warn!(
                    "{:<12} --> 예약 경매 {} 상태 전이 불가: {} -> {}",
                    "Coding", auction_id, from, to
                ),
            }
        }
        Ok(results)
    }
    // endregion: --- End Coding
}
