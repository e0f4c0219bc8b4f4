//! 관리자 파괴적 작업의 2단계 확인
//! propose 로 토큰을 받고, 만료 전에 confirm 해야 실행된다. 토큰은 한 번만 쓸 수 있다.

// region:    --- Imports
use crate::auction::model::{AuctionId, QuestionId, UserId};
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;
// endregion: --- Imports

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "id", rename_all = "kebab-case")]
pub enum PendingAction {
    CancelScheduled(AuctionId),
    DeleteScheduled(AuctionId),
    DeleteQuestion(QuestionId),
    DeactivateUser(UserId),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationTicket {
    pub token: String,
    pub action: PendingAction,
    pub expires_at: DateTime<Utc>,
}

struct Pending {
    action: PendingAction,
    expires: Instant,
}

pub struct ConfirmationDesk {
    ttl: Duration,
    pending: Mutex<HashMap<String, Pending>>,
}

impl ConfirmationDesk {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 확인 토큰 발급
    pub fn propose(&self, action: PendingAction) -> ConfirmationTicket {
        let now = Instant::now();
        let token = Uuid::new_v4().to_string();

        let mut pending = self.pending();
        pending.retain(|_, p| p.expires > now);
        pending.insert(
            token.clone(),
            Pending {
                action,
                expires: now + self.ttl,
            },
        );

        info!("{:<12} --> 확인 대기: {:?}", "Confirm", action);
        let expires_at = chrono::Duration::from_std(self.ttl)
            .map(|ttl| Utc::now() + ttl)
            .unwrap_or_else(|_| Utc::now());
        ConfirmationTicket {
            token,
            action,
            expires_at,
        }
    }

    /// 토큰 사용. 알 수 없거나 만료되었거나 이미 쓴 토큰은 거부된다.
    pub fn take(&self, token: &str) -> EngineResult<PendingAction> {
        let entry = self.pending().remove(token).ok_or(EngineError::InvalidToken)?;
        if Instant::now() >= entry.expires {
            return Err(EngineError::InvalidToken);
        }
        Ok(entry.action)
    }
}
