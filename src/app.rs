//! 요청 처리에 필요한 구성 요소 묶음. 라우터 state 로 명시적으로 전달된다.

// region:    --- Imports
use crate::confirmation::{ConfirmationDesk, PendingAction};
use crate::engine::AuctionEngine;
use crate::error::EngineResult;
use crate::scheduler::AuctionScheduler;
use crate::store::AuctionStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
// endregion: --- Imports

#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<AuctionEngine>,
    pub scheduler: Arc<AuctionScheduler>,
    pub desk: Arc<ConfirmationDesk>,
    pub admin_token: Arc<str>,
    pub initial_wallet: i64,
}

impl AppContext {
    pub fn store(&self) -> &Arc<dyn AuctionStore> {
        self.engine.store()
    }

    /// 확인된 관리자 작업 실행
    pub async fn execute_confirmed(&self, token: &str) -> EngineResult<Value> {
        let action = self.desk.take(token)?;
        info!("{:<12} --> 확인된 작업 실행: {:?}", "Confirm", action);

        match action {
            PendingAction::CancelScheduled(id) => {
                let auction = self.scheduler.cancel(id).await?;
                Ok(json!({ "action": action, "auction": auction }))
            }
            PendingAction::DeleteScheduled(id) => {
                self.scheduler.delete(id).await?;
                Ok(json!({ "action": action }))
            }
            PendingAction::DeleteQuestion(id) => {
                self.engine.ensure_question_idle(id).await?;
                self.store().delete_question(id).await?;
                Ok(json!({ "action": action }))
            }
            PendingAction::DeactivateUser(id) => {
                let user = self.store().set_user_active(id, false).await?;
                Ok(json!({ "action": action, "user": user }))
            }
        }
    }
}
