/// 입찰 라운드 커맨드 처리
/// 1. 라운드 시작 (문제 공개)
/// 2. 입찰
/// 3. 라운드 종료 (타이머 만료 시에만)
// region:    --- Imports
use crate::auction::events::{AuctionEvent, Winner};
use crate::auction::model::{QuestionId, QuestionView, SessionId, SessionPhase, UserId};
use crate::bidding::model::{BidReceipt, CurrentBid, NewBid};
use crate::engine::AuctionEngine;
use crate::error::{EngineError, EngineResult};
use crate::session::SessionState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- Commands
/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidCommand {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub amount: i64,
}

/// 문제 공개 명령 (관리자)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PushQuestionCommand {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub question_id: QuestionId,
}
// endregion: --- Commands

// region:    --- Round Controller
impl AuctionEngine {
    /// 1. 라운드 시작
    pub async fn open_round(
        self: &Arc<Self>,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> EngineResult<()> {
        let session = self.registry.get(session_id)?;
        let mut state = session.state.lock().await;
        self.open_round_locked(&mut state, question_id).await
    }

    pub(crate) async fn open_round_locked(
        self: &Arc<Self>,
        state: &mut SessionState,
        question_id: QuestionId,
    ) -> EngineResult<()> {
        match state.phase {
            SessionPhase::Bidding | SessionPhase::Coding => {
                return Err(EngineError::RoundAlreadyActive {
                    session_id: state.id,
                    phase: state.phase,
                })
            }
            SessionPhase::Completed => return Err(EngineError::SessionClosed(state.id)),
            SessionPhase::Idle => {}
        }

        let question = self.store.get_question(question_id).await?;
        if self
            .store
            .find_allotment_for_question(state.id, question_id)
            .await?
            .is_some()
        {
            return Err(EngineError::QuestionAlreadyAllotted {
                session_id: state.id,
                question_id,
            });
        }

        state.current_question_id = Some(question_id);
        state.current_bid = None;
        let seq = state.begin_phase(SessionPhase::Bidding, state.round_duration);
        self.arm_countdown(state, seq);
        self.persist(state).await;

        info!(
            "{:<12} --> 라운드 시작: session={} question={} ({}초)",
            "Command",
            state.id,
            question_id,
            state.round_duration.as_secs()
        );
        self.bus.publish(AuctionEvent::QuestionPushed {
            session_id: state.id,
            auction_id: state.auction_id(),
            question: QuestionView::from(&question),
            time_remaining: state.time_remaining(),
        });
        Ok(())
    }

    /// 2. 입찰
    /// 검증, 기록, 최고가 교체가 세션 잠금 안에서 한 번에 일어난다.
    pub async fn place_bid(
        &self,
        session_id: SessionId,
        user_id: UserId,
        amount: i64,
    ) -> EngineResult<BidReceipt> {
        let session = self.registry.get(session_id)?;
        let mut state = session.state.lock().await;

        if state.phase != SessionPhase::Bidding || state.deadline_passed() {
            return Err(EngineError::RoundNotActive(session_id));
        }
        let Some(question_id) = state.current_question_id else {
            return Err(EngineError::RoundNotActive(session_id));
        };
        if !state.is_participant(user_id) {
            return Err(EngineError::NotParticipant {
                user_id,
                session_id,
            });
        }

        let user = self.store.get_user(user_id).await?;
        if !user.active {
            return Err(EngineError::UserInactive(user_id));
        }
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        if amount > user.wallet {
            return Err(EngineError::InsufficientFunds {
                wallet: user.wallet,
                amount,
            });
        }
        if let Some(current) = &state.current_bid {
            if amount <= current.amount {
                return Err(EngineError::BidTooLow {
                    amount,
                    current: current.amount,
                });
            }
        }

        let accepted_at = Utc::now();
        let bid = self
            .store
            .append_bid(NewBid {
                session_id,
                round_question_id: question_id,
                user_id,
                amount,
                accepted_at,
            })
            .await?;
        state.current_bid = Some(CurrentBid {
            amount,
            user_id,
            username: user.username.clone(),
            team_name: user.team_name.clone(),
        });
        self.persist(&state).await;

        let time_remaining = state.time_remaining();
        info!(
            "{:<12} --> 입찰 접수: session={} user={} amount={}",
            "Command", session_id, user_id, amount
        );
        self.bus.publish(AuctionEvent::NewBid {
            session_id,
            auction_id: state.auction_id(),
            amount,
            bidder_id: user_id,
            bidder_username: user.username,
            bidder_team: user.team_name,
            time_remaining,
            timestamp: accepted_at,
        });

        Ok(BidReceipt {
            bid_id: bid.id,
            amount,
            time_remaining,
        })
    }

    /// 3. 라운드 종료
    /// 라운드 타이머 만료 시에만 호출된다. seq 가 현재 단계와 다르면 아무것도 하지 않는다.
    pub(crate) async fn close_round(
        self: &Arc<Self>,
        session_id: SessionId,
        seq: u64,
    ) -> EngineResult<Option<Winner>> {
        let session = self.registry.get(session_id)?;
        let mut state = session.state.lock().await;
        if !state.is_current(seq) || state.phase != SessionPhase::Bidding {
            return Ok(None);
        }

        let question_id = state.current_question_id.take();
        let leader = state.current_bid.take();
        state.end_phase(SessionPhase::Idle);

        let winner = match (question_id, leader) {
            (Some(question_id), Some(leader)) => {
                match self
                    .allocate(session_id, question_id, leader.user_id, leader.amount)
                    .await
                {
                    Ok(allocation) => Some(Winner {
                        user_id: leader.user_id,
                        username: leader.username,
                        team_name: leader.team_name,
                        amount: leader.amount,
                        allotted_question_id: allocation.allotment.id,
                    }),
                    Err(e) => {
                        warn!(
                            "{:<12} --> 낙찰 실패, 문제 {} 반환: {}",
                            "Command", question_id, e
                        );
                        None
                    }
                }
            }
            _ => None,
        };
        self.persist(&state).await;

        info!(
            "{:<12} --> 라운드 종료: session={} winner={:?}",
            "Command",
            session_id,
            winner.as_ref().map(|w| w.user_id)
        );
        if let Some(question_id) = question_id {
            self.bus.publish(AuctionEvent::AuctionEnded {
                session_id,
                auction_id: state.auction_id(),
                question_id,
                winner: winner.clone(),
            });
        }

        if state.auction_id().is_some() {
            self.advance_schedule(&mut state).await?;
        }
        Ok(winner)
    }
}
// endregion: --- Round Controller
