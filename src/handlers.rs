// region:    --- Imports
use crate::app::AppContext;
use crate::auction::model::{AuctionId, NewUser, QuestionDraft, QuestionId, SessionId, UserId};
use crate::bidding::commands::{PlaceBidCommand, PushQuestionCommand};
use crate::coding::SubmitCodeCommand;
use crate::confirmation::PendingAction;
use crate::error::{EngineError, EngineResult};
use crate::message_broker::{EventFilter, Subscription};
use crate::query;
use crate::scheduler::model::ScheduledAuctionDraft;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

// endregion: --- Imports

// region:    --- Extractors

/// x-user-id 헤더로 전달된 인증 사용자
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = EngineError;

    async fn from_request_parts(
        parts: &mut Parts,
        _ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map(AuthUser)
            .ok_or_else(|| EngineError::Unauthorized("x-user-id header required".to_string()))
    }
}

/// x-admin-token 헤더 검증
#[derive(Debug, Clone, Copy)]
pub struct AdminGuard;

fn is_admin(parts: &Parts, ctx: &AppContext) -> bool {
    parts
        .headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|token| !ctx.admin_token.is_empty() && token == ctx.admin_token.as_ref())
}

#[axum::async_trait]
impl FromRequestParts<AppContext> for AdminGuard {
    type Rejection = EngineError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        if is_admin(parts, ctx) {
            Ok(AdminGuard)
        } else {
            Err(EngineError::Unauthorized("admin token required".to_string()))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCodingCommand {
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBidCommand {
    pub amount: i64,
}

/// 세션 id 가 없으면 현재 라이브 세션
async fn resolve_session(ctx: &AppContext, session_id: Option<SessionId>) -> EngineResult<SessionId> {
    match session_id {
        Some(id) => Ok(id),
        None => Ok(ctx.engine.live_session().await?.id),
    }
}

fn accepted(ticket: impl serde::Serialize) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(ticket))
}

// endregion: --- Extractors

// region:    --- Auction Handlers

/// 입찰 요청 처리
pub async fn handle_bid(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Json(cmd): Json<PlaceBidCommand>,
) -> EngineResult<impl IntoResponse> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);
    let session_id = resolve_session(&ctx, cmd.session_id).await?;
    let receipt = ctx.engine.place_bid(session_id, user_id, cmd.amount).await?;
    Ok(Json(receipt))
}

/// 문제 공개 (관리자)
pub async fn handle_push_question(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Json(cmd): Json<PushQuestionCommand>,
) -> EngineResult<impl IntoResponse> {
    info!("{:<12} --> 문제 공개 요청: {:?}", "Command", cmd);
    let session_id = resolve_session(&ctx, cmd.session_id).await?;
    ctx.engine.open_round(session_id, cmd.question_id).await?;
    Ok(Json(ctx.engine.session_snapshot(session_id).await?))
}

/// 코딩 시작 (관리자)
pub async fn handle_start_coding(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    cmd: Option<Json<StartCodingCommand>>,
) -> EngineResult<impl IntoResponse> {
    let session_id = resolve_session(&ctx, cmd.and_then(|Json(c)| c.session_id)).await?;
    info!("{:<12} --> 코딩 시작 요청 session: {}", "Command", session_id);
    ctx.engine.begin_coding(session_id).await?;
    Ok(Json(ctx.engine.session_snapshot(session_id).await?))
}

/// 코딩 종료 및 결과 (관리자)
pub async fn handle_end_coding(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    cmd: Option<Json<StartCodingCommand>>,
) -> EngineResult<impl IntoResponse> {
    let session_id = resolve_session(&ctx, cmd.and_then(|Json(c)| c.session_id)).await?;
    info!("{:<12} --> 코딩 종료 요청 session: {}", "Command", session_id);
    Ok(Json(ctx.engine.end_coding(session_id).await?))
}

/// 라이브 세션 초기화 (관리자)
pub async fn handle_reset(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
) -> EngineResult<impl IntoResponse> {
    info!("{:<12} --> 라이브 세션 초기화 요청", "Command");
    Ok(Json(ctx.engine.reset_live().await?))
}

/// 편집 중인 코드 저장
pub async fn handle_save_draft(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Path(allotted_id): Path<i64>,
    Json(cmd): Json<SubmitCodeCommand>,
) -> EngineResult<impl IntoResponse> {
    debug!("{:<12} --> 초안 저장 allotted: {}", "Command", allotted_id);
    ctx.engine.save_draft(user_id, allotted_id, cmd.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 코드 제출
pub async fn handle_submit(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Path(allotted_id): Path<i64>,
    Json(cmd): Json<SubmitCodeCommand>,
) -> EngineResult<impl IntoResponse> {
    info!("{:<12} --> 코드 제출 allotted: {}", "Command", allotted_id);
    let outcome = ctx.engine.submit_code(user_id, allotted_id, cmd.code).await?;
    Ok(Json(outcome))
}

// endregion: --- Auction Handlers

// region:    --- Query Handlers

/// 지갑 조회
pub async fn handle_get_wallet(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(query::handlers::get_wallet(ctx.store().as_ref(), user_id).await?))
}

/// 할당 문제 조회
pub async fn handle_get_allotted(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(
        query::handlers::get_user_allotments(ctx.store().as_ref(), user_id).await?,
    ))
}

/// 현재 세션에서 낙찰받은 문제
pub async fn handle_get_my_questions(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SessionQuery>,
) -> EngineResult<impl IntoResponse> {
    let session_id = resolve_session(&ctx, q.session_id).await?;
    Ok(Json(
        query::handlers::get_session_allotments(ctx.store().as_ref(), user_id, session_id)
            .await?,
    ))
}

/// 팀 통계
pub async fn handle_get_team_stats(
    State(ctx): State<AppContext>,
    _user: AuthUser,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(query::handlers::get_team_stats(ctx.store().as_ref()).await?))
}

/// 세션 상태 조회
pub async fn handle_get_session(
    State(ctx): State<AppContext>,
    Query(q): Query<SessionQuery>,
) -> EngineResult<impl IntoResponse> {
    let session_id = resolve_session(&ctx, q.session_id).await?;
    info!("{:<12} --> 세션 상태 조회 id: {}", "HandlerQuery", session_id);
    Ok(Json(ctx.engine.session_snapshot(session_id).await?))
}

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(ctx): State<AppContext>,
    Query(q): Query<SessionQuery>,
) -> EngineResult<impl IntoResponse> {
    let session_id = resolve_session(&ctx, q.session_id).await?;
    Ok(Json(
        query::handlers::get_bid_history(ctx.store().as_ref(), session_id).await?,
    ))
}

/// 리더보드
pub async fn handle_get_leaderboard(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(
        query::handlers::get_leaderboard(ctx.store().as_ref(), ctx.engine.ranking()).await?,
    ))
}

// endregion: --- Query Handlers

// region:    --- Question Handlers

pub async fn handle_list_questions(
    State(ctx): State<AppContext>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.store().list_questions().await?))
}

pub async fn handle_get_question(
    State(ctx): State<AppContext>,
    Path(question_id): Path<QuestionId>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.store().get_question(question_id).await?))
}

pub async fn handle_create_question(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Json(draft): Json<QuestionDraft>,
) -> EngineResult<impl IntoResponse> {
    draft.validate().map_err(EngineError::Validation)?;
    let question = ctx.store().create_question(draft).await?;
    info!("{:<12} --> 문제 생성 id: {}", "Command", question.id);
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn handle_update_question(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(question_id): Path<QuestionId>,
    Json(draft): Json<QuestionDraft>,
) -> EngineResult<impl IntoResponse> {
    draft.validate().map_err(EngineError::Validation)?;
    ctx.engine.ensure_question_idle(question_id).await?;
    Ok(Json(ctx.store().update_question(question_id, draft).await?))
}

/// 문제 삭제 요청. 확인 토큰을 돌려준다.
pub async fn handle_delete_question(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(question_id): Path<QuestionId>,
) -> EngineResult<impl IntoResponse> {
    ctx.store().get_question(question_id).await?;
    Ok(accepted(
        ctx.desk.propose(PendingAction::DeleteQuestion(question_id)),
    ))
}

// endregion: --- Question Handlers

// region:    --- Admin Handlers

pub async fn handle_list_users(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.store().list_users().await?))
}

fn validate_new_user(user: &NewUser) -> EngineResult<()> {
    if user.username.trim().is_empty() || user.team_name.trim().is_empty() {
        return Err(EngineError::Validation(
            "username and teamName are required".to_string(),
        ));
    }
    if user.wallet.is_some_and(|w| w < 0) {
        return Err(EngineError::Validation("wallet must not be negative".to_string()));
    }
    Ok(())
}

pub async fn handle_create_user(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Json(user): Json<NewUser>,
) -> EngineResult<impl IntoResponse> {
    validate_new_user(&user)?;
    let created = ctx.store().create_user(user, ctx.initial_wallet).await?;
    info!("{:<12} --> 사용자 생성 id: {}", "Command", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// 팀 등록. 지갑은 항상 기본 금액으로 시작한다.
pub async fn handle_register(
    State(ctx): State<AppContext>,
    Json(mut user): Json<NewUser>,
) -> EngineResult<impl IntoResponse> {
    user.wallet = None;
    validate_new_user(&user)?;
    let created = ctx.store().create_user(user, ctx.initial_wallet).await?;
    info!(
        "{:<12} --> 팀 등록 id: {} team: {}",
        "Command", created.id, created.team_name
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn handle_get_user(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(user_id): Path<UserId>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.store().get_user(user_id).await?))
}

pub async fn handle_get_user_count(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(query::handlers::get_user_count(ctx.store().as_ref()).await?))
}

/// 사용자 비활성화 요청. 확인 토큰을 돌려준다.
pub async fn handle_deactivate_user(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(user_id): Path<UserId>,
) -> EngineResult<impl IntoResponse> {
    ctx.store().get_user(user_id).await?;
    Ok(accepted(ctx.desk.propose(PendingAction::DeactivateUser(user_id))))
}

/// 확인 토큰 실행
pub async fn handle_confirm(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(token): Path<String>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.execute_confirmed(&token).await?))
}

// endregion: --- Admin Handlers

// region:    --- Scheduled Handlers

pub async fn handle_list_scheduled(
    State(ctx): State<AppContext>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.scheduler.list().await?))
}

pub async fn handle_get_scheduled(
    State(ctx): State<AppContext>,
    Path(auction_id): Path<AuctionId>,
) -> EngineResult<impl IntoResponse> {
    let auction = ctx.scheduler.get(auction_id).await?;
    let session_id = ctx.engine.registry().for_auction(auction_id).map(|s| s.id);
    Ok(Json(json!({ "auction": auction, "sessionId": session_id })))
}

pub async fn handle_create_scheduled(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Json(draft): Json<ScheduledAuctionDraft>,
) -> EngineResult<impl IntoResponse> {
    let auction = ctx.scheduler.create(draft).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

pub async fn handle_update_scheduled(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(auction_id): Path<AuctionId>,
    Json(draft): Json<ScheduledAuctionDraft>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.scheduler.update(auction_id, draft).await?))
}

/// 예약 경매 삭제 요청. 확인 토큰을 돌려준다.
pub async fn handle_delete_scheduled(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(auction_id): Path<AuctionId>,
) -> EngineResult<impl IntoResponse> {
    ctx.scheduler.get(auction_id).await?;
    Ok(accepted(
        ctx.desk.propose(PendingAction::DeleteScheduled(auction_id)),
    ))
}

/// 예약 경매 취소 요청. 확인 토큰을 돌려준다.
pub async fn handle_cancel_scheduled(
    State(ctx): State<AppContext>,
    _admin: AdminGuard,
    Path(auction_id): Path<AuctionId>,
) -> EngineResult<impl IntoResponse> {
    ctx.scheduler.get(auction_id).await?;
    Ok(accepted(
        ctx.desk.propose(PendingAction::CancelScheduled(auction_id)),
    ))
}

pub async fn handle_join_scheduled(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Path(auction_id): Path<AuctionId>,
) -> EngineResult<impl IntoResponse> {
    Ok(Json(ctx.scheduler.join(auction_id, user_id).await?))
}

pub async fn handle_leave_scheduled(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Path(auction_id): Path<AuctionId>,
) -> EngineResult<impl IntoResponse> {
    let left = ctx.scheduler.leave(auction_id, user_id).await?;
    Ok(Json(json!({ "left": left })))
}

/// 예약 경매 입찰
pub async fn handle_scheduled_bid(
    State(ctx): State<AppContext>,
    AuthUser(user_id): AuthUser,
    Path(auction_id): Path<AuctionId>,
    Json(cmd): Json<ScheduledBidCommand>,
) -> EngineResult<impl IntoResponse> {
    let session = ctx
        .engine
        .registry()
        .for_auction(auction_id)
        .ok_or(EngineError::NotFound {
            entity: "scheduled session",
            id: auction_id,
        })?;
    let receipt = ctx.engine.place_bid(session.id, user_id, cmd.amount).await?;
    Ok(Json(receipt))
}

// endregion: --- Scheduled Handlers

// region:    --- Event Stream

/// 이벤트 구독 (WebSocket)
/// 관리자는 모든 이벤트를, 사용자는 자신에게 해당하는 이벤트만 받는다.
pub async fn handle_events(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(q): Query<SessionQuery>,
    user: Option<AuthUser>,
    admin: Option<AdminGuard>,
) -> EngineResult<impl IntoResponse> {
    let mut filter = q
        .session_id
        .map(EventFilter::session)
        .unwrap_or_default();
    match (admin, user) {
        (Some(_), _) => {}
        (None, Some(AuthUser(user_id))) => filter = filter.for_user(user_id),
        (None, None) => {
            return Err(EngineError::Unauthorized(
                "x-user-id header required".to_string(),
            ))
        }
    }

    let subscription = ctx.engine.bus().subscribe(filter);
    info!("{:<12} --> 이벤트 구독 시작: {:?}", "Events", filter);
    Ok(ws.on_upgrade(move |socket| stream_events(socket, subscription)))
}

async fn stream_events(mut socket: WebSocket, mut subscription: Subscription) {
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(event.as_ref()) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("{:<12} --> 이벤트 구독 종료: {:?}", "Events", subscription.filter());
    subscription.unsubscribe();
}

// endregion: --- Event Stream
