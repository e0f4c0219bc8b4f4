//! 세션 레지스트리와 세션별 상태
//! 세션 하나의 모든 변경은 해당 세션의 `tokio::sync::Mutex` 안에서 일어난다.

// region:    --- Imports
use crate::auction::model::{
    AllotmentId, AuctionId, AuctionSession, QuestionId, SessionId, SessionKind, SessionPhase,
    UserId,
};
use crate::bidding::model::CurrentBid;
use crate::error::{EngineError, EngineResult};
use crate::timer::{remaining_secs, Countdown};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
// endregion: --- Imports

// region:    --- Coding Board
/// 사용자별 코딩 대기열. items 는 할당 순서이며 cursor 위치가 진행 중인 문제다.
#[derive(Debug, Default)]
pub struct UserQueue {
    pub items: Vec<AllotmentId>,
    pub cursor: usize,
    pub in_flight: bool,
    pub complete: bool,
    pub drafts: HashMap<AllotmentId, String>,
}

impl UserQueue {
    pub fn new(items: Vec<AllotmentId>) -> Self {
        let complete = items.is_empty();
        Self {
            items,
            complete,
            ..Self::default()
        }
    }

    /// 진행 중인 문제
    pub fn current(&self) -> Option<AllotmentId> {
        if self.complete {
            None
        } else {
            self.items.get(self.cursor).copied()
        }
    }

    /// 다음 문제로 이동한다. 더 없으면 complete 로 표시하고 None.
    pub fn advance(&mut self) -> Option<AllotmentId> {
        self.cursor += 1;
        match self.items.get(self.cursor) {
            Some(next) => Some(*next),
            None => {
                self.complete = true;
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CodingBoard {
    pub queues: BTreeMap<UserId, UserQueue>,
    /// 코딩 타이머 만료 후에는 대기열이 더 이상 전진하지 않는다.
    pub expired: bool,
    pub finished: bool,
}

impl CodingBoard {
    pub fn all_complete(&self) -> bool {
        self.queues.values().all(|q| q.complete)
    }

    pub fn owner_of(&self, allotment_id: AllotmentId) -> Option<UserId> {
        self.queues
            .iter()
            .find(|(_, q)| q.items.contains(&allotment_id))
            .map(|(user_id, _)| *user_id)
    }
}
// endregion: --- Coding Board

// region:    --- Session State
pub struct SessionState {
    pub id: SessionId,
    pub kind: SessionKind,
    pub phase: SessionPhase,
    pub current_question_id: Option<QuestionId>,
    pub current_bid: Option<CurrentBid>,
    pub deadline: Option<Instant>,
    pub deadline_at: Option<DateTime<Utc>>,
    /// 단계 인스턴스 번호. 만료 콜백은 자신이 시작된 번호와 같을 때만 동작한다.
    pub seq: u64,
    pub countdown: Option<Countdown>,
    pub round_duration: Duration,
    pub coding_duration: Duration,
    pub pending_questions: VecDeque<QuestionId>,
    /// 예약 세션 참가자. None 이면 누구나 입찰 가능 (라이브 세션).
    pub participants: Option<BTreeSet<UserId>>,
    pub coding: Option<CodingBoard>,
}

impl SessionState {
    pub fn new(
        snapshot: &AuctionSession,
        round_duration: Duration,
        coding_duration: Duration,
    ) -> Self {
        Self {
            id: snapshot.id,
            kind: snapshot.kind,
            phase: snapshot.phase,
            current_question_id: snapshot.current_question_id,
            current_bid: snapshot.current_bid.clone(),
            deadline: None,
            deadline_at: None,
            seq: 0,
            countdown: None,
            round_duration,
            coding_duration,
            pending_questions: VecDeque::new(),
            participants: None,
            coding: None,
        }
    }

    pub fn auction_id(&self) -> Option<AuctionId> {
        self.kind.auction_id()
    }

    /// 새 단계 인스턴스 시작. 이전 카운트다운은 취소된다.
    pub fn begin_phase(&mut self, phase: SessionPhase, duration: Duration) -> u64 {
        self.countdown = None;
        self.seq += 1;
        self.phase = phase;
        self.deadline = Some(Instant::now() + duration);
        self.deadline_at = chrono::Duration::from_std(duration)
            .ok()
            .map(|d| Utc::now() + d);
        self.seq
    }

    /// 진행 중인 단계 종료
    pub fn end_phase(&mut self, phase: SessionPhase) {
        self.countdown = None;
        self.seq += 1;
        self.phase = phase;
        self.deadline = None;
        self.deadline_at = None;
    }

    pub fn is_current(&self, seq: u64) -> bool {
        self.seq == seq
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn time_remaining(&self) -> u64 {
        self.deadline.map(remaining_secs).unwrap_or(0)
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants
            .as_ref()
            .map_or(true, |joined| joined.contains(&user_id))
    }

    pub fn snapshot(&self) -> AuctionSession {
        AuctionSession {
            id: self.id,
            kind: self.kind,
            phase: self.phase,
            current_question_id: self.current_question_id,
            current_bid: self.current_bid.clone(),
            deadline: self.deadline_at,
        }
    }
}
// endregion: --- Session State

// region:    --- Session
pub struct Session {
    pub id: SessionId,
    pub kind: SessionKind,
    pub state: Mutex<SessionState>,
}

impl Session {
    pub fn new(state: SessionState) -> Self {
        Self {
            id: state.id,
            kind: state.kind,
            state: Mutex::new(state),
        }
    }
}
// endregion: --- Session

// region:    --- Session Registry
/// 진행 중인 세션 목록. 라이브 세션 하나와 예약 세션 여러 개.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    live: RwLock<Option<SessionId>>,
    by_auction: RwLock<HashMap<AuctionId, SessionId>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        if let Some(auction_id) = session.kind.auction_id() {
            write(&self.by_auction).insert(auction_id, session.id);
        }
        write(&self.sessions).insert(session.id, session);
    }

    /// 시작하지 못한 세션 제거
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let session = write(&self.sessions).remove(&id)?;
        if let Some(auction_id) = session.kind.auction_id() {
            let mut by_auction = write(&self.by_auction);
            if by_auction.get(&auction_id) == Some(&id) {
                by_auction.remove(&auction_id);
            }
        }
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> EngineResult<Arc<Session>> {
        read(&self.sessions)
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound {
                entity: "session",
                id,
            })
    }

    /// 현재 라이브 세션
    pub fn live(&self) -> Option<Arc<Session>> {
        let id = (*read(&self.live))?;
        read(&self.sessions).get(&id).cloned()
    }

    pub fn set_live(&self, id: SessionId) {
        *write(&self.live) = Some(id);
    }

    pub fn for_auction(&self, auction_id: AuctionId) -> Option<Arc<Session>> {
        let id = *read(&self.by_auction).get(&auction_id)?;
        read(&self.sessions).get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = read(&self.sessions).values().cloned().collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }
}
// endregion: --- Session Registry
