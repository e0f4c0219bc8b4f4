//! 세션 이벤트 브로드캐스터
//! 구독자는 `Subscription` 핸들을 소유하며, 핸들을 drop 하거나 `unsubscribe` 하면 해제된다.

// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{SessionId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[cfg(feature = "kafka")]
pub mod kafka;
// endregion: --- Imports

// region:    --- Event Filter
/// 구독 필터. user 가 없으면 (관리자) 사용자 지정 이벤트도 모두 받는다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub session: Option<SessionId>,
    pub user: Option<UserId>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn session(session_id: SessionId) -> Self {
        Self {
            session: Some(session_id),
            user: None,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user = Some(user_id);
        self
    }

    pub fn matches(&self, event: &AuctionEvent) -> bool {
        if let (Some(wanted), Some(actual)) = (self.session, event.session_id()) {
            if wanted != actual {
                return false;
            }
        }
        match (self.user, event.target_user()) {
            (Some(me), Some(target)) => me == target,
            _ => true,
        }
    }
}
// endregion: --- Event Filter

// region:    --- Event Bus
/// 이벤트 버스. 복제해서 필요한 컴포넌트에 명시적으로 전달한다.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<AuctionEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 이벤트 발행. 구독자가 없어도 오류가 아니다.
    pub fn publish(&self, event: AuctionEvent) {
        let event_type = event.event_type();
        match self.tx.send(Arc::new(event)) {
            Ok(receivers) => debug!(
                "{:<12} --> 이벤트 발행: {} (구독자 {})",
                "Broker", event_type, receivers
            ),
            Err(_) => debug!("{:<12} --> 구독자 없음: {}", "Broker", event_type),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
// endregion: --- Event Bus

// region:    --- Subscription
/// 구독 핸들
pub struct Subscription {
    rx: broadcast::Receiver<Arc<AuctionEvent>>,
    filter: EventFilter,
}

impl Subscription {
    pub fn filter(&self) -> EventFilter {
        self.filter
    }

    /// 필터에 맞는 다음 이벤트. 버스가 닫히면 None.
    pub async fn recv(&mut self) -> Option<Arc<AuctionEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{:<12} --> 구독자 지연, {}개 이벤트 건너뜀", "Broker", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 대기 없이 이미 도착한 이벤트만 확인한다.
    pub fn try_recv(&mut self) -> Option<Arc<AuctionEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("{:<12} --> 구독자 지연, {}개 이벤트 건너뜀", "Broker", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}
// endregion: --- Subscription
