/// 예약 경매 스케줄러
/// 참가/탈퇴로 정원을 관리하고, 예약 시간이 지나고 최소 인원이 모이면 세션을 자동으로 시작한다.
/// 최소 인원이 모이지 않은 경매는 자동 취소하지 않고 대기 상태로 둔다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{AuctionId, UserId};
use crate::engine::AuctionEngine;
use crate::error::{EngineError, EngineResult};
use crate::message_broker::EventBus;
use crate::scheduler::model::{ScheduledAuction, ScheduledAuctionDraft, ScheduledStatus};
use crate::store::AuctionStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

pub mod model;
// endregion: --- Imports

// region:    --- Auction Scheduler
/// 예약 경매 스케줄러
pub struct AuctionScheduler {
    store: Arc<dyn AuctionStore>,
    bus: EventBus,
    engine: Arc<AuctionEngine>,
    locks: StdMutex<HashMap<AuctionId, Arc<Mutex<()>>>>,
    stalled: StdMutex<HashSet<AuctionId>>,
    period: Duration,
}

/// 예약 경매 스케줄러 생성
impl AuctionScheduler {
    pub fn new(engine: Arc<AuctionEngine>, tick: Duration) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::clone(engine.store()),
            bus: engine.bus().clone(),
            engine,
            locks: StdMutex::new(HashMap::new()),
            stalled: StdMutex::new(HashSet::new()),
            period: tick,
        })
    }

    /// 경매별 잠금. 같은 경매에 대한 변경은 직렬화된다.
    fn lock_for(&self, auction_id: AuctionId) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(auction_id).or_default())
    }

    /// 스케줄러 시작
    pub async fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = interval(scheduler.period);
            loop {
                interval.tick().await;
                if let Err(e) = scheduler.tick(Utc::now()).await {
                    error!(
                        "{:<12} --> 예약 경매 확인 중 오류 발생: {:?}",
                        "Scheduler", e
                    );
                }
            }
        });
    }

    // region:    --- Admin
    pub async fn create(&self, draft: ScheduledAuctionDraft) -> EngineResult<ScheduledAuction> {
        draft.validate().map_err(EngineError::Validation)?;
        for question_id in &draft.questions {
            self.store.get_question(*question_id).await?;
        }
        let auction = self.store.create_scheduled(draft).await?;
        info!(
            "{:<12} --> 예약 경매 생성: {} '{}' at {}",
            "Scheduler", auction.id, auction.title, auction.scheduled_time
        );
        Ok(auction)
    }

    pub async fn update(
        &self,
        auction_id: AuctionId,
        draft: ScheduledAuctionDraft,
    ) -> EngineResult<ScheduledAuction> {
        draft.validate().map_err(EngineError::Validation)?;
        let lock = self.lock_for(auction_id);
        let _guard = lock.lock().await;

        let mut auction = self.store.get_scheduled(auction_id).await?;
        if !auction.status.is_open() {
            return Err(EngineError::AuctionLocked(auction_id));
        }
        if let Some(max) = draft.max_users {
            if (max as usize) < auction.joined_users.len() {
                return Err(EngineError::Validation(format!(
                    "maxUsers {} is below the {} users already joined",
                    max,
                    auction.joined_users.len()
                )));
            }
        }
        for question_id in &draft.questions {
            self.store.get_question(*question_id).await?;
        }

        auction.title = draft.title;
        auction.description = draft.description;
        auction.scheduled_time = draft.scheduled_time;
        auction.questions = draft.questions;
        auction.min_users = draft.min_users;
        auction.max_users = draft.max_users;
        auction.auction_duration = draft.auction_duration;
        auction.coding_duration = draft.coding_duration;
        self.store.save_scheduled(&auction).await?;
        self.clear_stall(auction_id);
        Ok(auction)
    }

    pub async fn delete(&self, auction_id: AuctionId) -> EngineResult<()> {
        let lock = self.lock_for(auction_id);
        let _guard = lock.lock().await;

        // 시작된 경매는 결과 조회를 위해 남겨 둔다.
        let auction = self.store.get_scheduled(auction_id).await?;
        if !auction.status.is_open() {
            return Err(EngineError::AuctionLocked(auction_id));
        }
        self.store.delete_scheduled(auction_id).await?;
        self.clear_stall(auction_id);

        info!("{:<12} --> 예약 경매 삭제: {}", "Scheduler", auction_id);
        if !auction.joined_users.is_empty() {
            self.bus.publish(AuctionEvent::ScheduledCancelled {
                auction_id,
                title: auction.title,
                notified: auction.joined_users.into_iter().collect(),
            });
        }
        Ok(())
    }

    pub async fn get(&self, auction_id: AuctionId) -> EngineResult<ScheduledAuction> {
        Ok(self.store.get_scheduled(auction_id).await?)
    }

    pub async fn list(&self) -> EngineResult<Vec<ScheduledAuction>> {
        Ok(self.store.list_scheduled().await?)
    }

    /// 예약 경매 취소. 참가자에게 알린다.
    pub async fn cancel(&self, auction_id: AuctionId) -> EngineResult<ScheduledAuction> {
        let lock = self.lock_for(auction_id);
        let _guard = lock.lock().await;

        let mut auction = self.store.get_scheduled(auction_id).await?;
        auction
            .transition(ScheduledStatus::Cancelled)
            .map_err(|(from, to)| EngineError::InvalidTransition {
                auction_id,
                from,
                to,
            })?;
        self.store.save_scheduled(&auction).await?;
        self.clear_stall(auction_id);

        info!("{:<12} --> 예약 경매 취소: {}", "Scheduler", auction_id);
        self.bus.publish(AuctionEvent::ScheduledCancelled {
            auction_id,
            title: auction.title.clone(),
            notified: auction.joined_users.iter().copied().collect(),
        });
        Ok(auction)
    }
    // endregion: --- Admin

    // region:    --- Participants
    /// 참가. 이미 참가한 사용자는 아무 변화 없이 현재 상태를 돌려받는다.
    pub async fn join(
        &self,
        auction_id: AuctionId,
        user_id: UserId,
    ) -> EngineResult<ScheduledAuction> {
        let lock = self.lock_for(auction_id);
        let _guard = lock.lock().await;

        let mut auction = self.store.get_scheduled(auction_id).await?;
        if !auction.status.is_open() {
            return Err(EngineError::NotJoinable {
                auction_id,
                status: auction.status,
            });
        }
        let user = self.store.get_user(user_id).await?;
        if !user.active {
            return Err(EngineError::UserInactive(user_id));
        }
        if auction.joined_users.contains(&user_id) {
            return Ok(auction);
        }
        if auction.is_full() {
            return Err(EngineError::AuctionFull(auction_id));
        }

        auction.joined_users.insert(user_id);
        if auction.status == ScheduledStatus::Scheduled {
            auction
                .transition(ScheduledStatus::Waiting)
                .map_err(|(from, to)| EngineError::InvalidTransition {
                    auction_id,
                    from,
                    to,
                })?;
        }
        self.store.save_scheduled(&auction).await?;

        let joined = auction.joined_users.len();
        info!(
            "{:<12} --> 참가: auction={} user={} ({}/{})",
            "Scheduler", auction_id, user_id, joined, auction.min_users
        );
        self.bus.publish(AuctionEvent::UserJoined {
            auction_id,
            user_id,
            joined,
        });
        if joined == auction.min_users as usize {
            self.bus.publish(AuctionEvent::QuorumReached {
                auction_id,
                title: auction.title.clone(),
                joined,
            });
        }
        Ok(auction)
    }

    /// 탈퇴. 참가하지 않은 사용자의 탈퇴는 false 를 돌려준다. 상태는 되돌아가지 않는다.
    pub async fn leave(&self, auction_id: AuctionId, user_id: UserId) -> EngineResult<bool> {
        let lock = self.lock_for(auction_id);
        let _guard = lock.lock().await;

        let mut auction = self.store.get_scheduled(auction_id).await?;
        if !auction.status.is_open() {
            return Err(EngineError::NotLeavable {
                auction_id,
                status: auction.status,
            });
        }
        if !auction.joined_users.remove(&user_id) {
            return Ok(false);
        }
        self.store.save_scheduled(&auction).await?;

        let joined = auction.joined_users.len();
        info!(
            "{:<12} --> 탈퇴: auction={} user={} ({}/{})",
            "Scheduler", auction_id, user_id, joined, auction.min_users
        );
        self.bus.publish(AuctionEvent::UserLeft {
            auction_id,
            user_id,
            joined,
        });
        Ok(true)
    }
    // endregion: --- Participants

    // region:    --- Auto Start
    /// 예약 시간이 지난 경매를 확인한다. 시작된 경매 id 를 돌려준다.
    pub async fn tick(&self, now: DateTime<Utc>) -> EngineResult<Vec<AuctionId>> {
        let mut started = Vec::new();
        for auction in self.store.list_scheduled().await? {
            if !auction.status.is_open() || now < auction.scheduled_time {
                continue;
            }
            if auction.status == ScheduledStatus::Waiting && auction.has_quorum() {
                match self.start_auction(auction.id, now).await {
                    Ok(true) => started.push(auction.id),
                    Ok(false) => {}
                    Err(e) => error!(
                        "{:<12} --> 예약 경매 {} 시작 실패: {}",
                        "Scheduler", auction.id, e
                    ),
                }
            } else {
                self.report_stall(&auction);
            }
        }
        if !started.is_empty() {
            debug!("{:<12} --> 자동 시작: {:?}", "Scheduler", started);
        }
        Ok(started)
    }

    async fn start_auction(&self, auction_id: AuctionId, now: DateTime<Utc>) -> EngineResult<bool> {
        let lock = self.lock_for(auction_id);
        let _guard = lock.lock().await;

        // 잠금을 얻는 사이 탈퇴나 취소가 있었을 수 있다.
        let mut auction = self.store.get_scheduled(auction_id).await?;
        if auction.status != ScheduledStatus::Waiting
            || !auction.has_quorum()
            || now < auction.scheduled_time
        {
            return Ok(false);
        }
        auction
            .transition(ScheduledStatus::InProgress)
            .map_err(|(from, to)| EngineError::InvalidTransition {
                auction_id,
                from,
                to,
            })?;
        self.store.save_scheduled(&auction).await?;
        self.clear_stall(auction_id);

        info!(
            "{:<12} --> 예약 경매 시작: {} '{}' 참가자 {}명",
            "Scheduler",
            auction_id,
            auction.title,
            auction.joined_users.len()
        );
        if let Err(e) = self.engine.start_scheduled_session(&auction).await {
            self.restore_waiting(&mut auction).await;
            return Err(e);
        }
        Ok(true)
    }

    /// 세션을 열지 못한 경매는 대기 상태로 되돌려 다음 확인 때 다시 시도한다.
    async fn restore_waiting(&self, auction: &mut ScheduledAuction) {
        auction.status = ScheduledStatus::Waiting;
        match self.store.save_scheduled(auction).await {
            Ok(()) => warn!(
                "{:<12} --> 예약 경매 {} 시작 실패, 대기 상태로 복구",
                "Scheduler", auction.id
            ),
            Err(e) => error!(
                "{:<12} --> 예약 경매 {} 복구 실패: {}",
                "Scheduler", auction.id, e
            ),
        }
    }

    /// 최소 인원 미달로 시작하지 못한 경매는 한 번만 기록한다.
    fn report_stall(&self, auction: &ScheduledAuction) {
        let first = self
            .stalled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(auction.id);
        if first {
            warn!(
                "{:<12} --> 예약 경매 {} 대기 중: 참가자 {}/{}",
                "Scheduler",
                auction.id,
                auction.joined_users.len(),
                auction.min_users
            );
        }
    }

    fn clear_stall(&self, auction_id: AuctionId) {
        self.stalled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&auction_id);
    }

    pub fn is_stalled(&self, auction_id: AuctionId) -> bool {
        self.stalled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&auction_id)
    }
    // endregion: --- Auto Start
}
// endregion: --- Auction Scheduler
