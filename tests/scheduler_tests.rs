mod common;

use chrono::{DateTime, Utc};
use code_auction_service::auction::events::AuctionEvent;
use code_auction_service::auction::model::{QuestionId, SessionPhase};
use code_auction_service::error::EngineError;
use code_auction_service::scheduler::model::{ScheduledAuctionDraft, ScheduledStatus};
use code_auction_service::scheduler::AuctionScheduler;
use code_auction_service::store::AuctionStore;
use common::{drain, pass, setup, setup_flaky, FlakyStore, ROUND};
use std::sync::Arc;
use std::time::Duration;

fn draft(
    at: DateTime<Utc>,
    questions: Vec<QuestionId>,
    min_users: u32,
    max_users: Option<u32>,
) -> ScheduledAuctionDraft {
    ScheduledAuctionDraft {
        title: "Friday Night Auction".to_string(),
        description: "weekly".to_string(),
        scheduled_time: at,
        questions,
        min_users,
        max_users,
        auction_duration: 5,
        coding_duration: 20,
    }
}

fn scheduler(h: &common::Harness) -> Arc<AuctionScheduler> {
    AuctionScheduler::new(Arc::clone(&h.engine), Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_join_and_leave() {
    let h = setup().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 200).await;
    let bob = h.user("bob", 200).await;
    let carol = h.user("carol", 200).await;
    let question = h.question("Warmup", 1).await;
    let mut events = h.subscribe();

    let at = Utc::now() + chrono::Duration::minutes(10);
    let auction = scheduler
        .create(draft(at, vec![question.id], 2, Some(2)))
        .await
        .unwrap();
    assert_eq!(auction.status, ScheduledStatus::Scheduled);

    let joined = scheduler.join(auction.id, alice.id).await.unwrap();
    assert_eq!(joined.status, ScheduledStatus::Waiting);
    // 중복 참가는 변화 없음
    let joined = scheduler.join(auction.id, alice.id).await.unwrap();
    assert_eq!(joined.joined_users.len(), 1);

    let joined = scheduler.join(auction.id, bob.id).await.unwrap();
    assert_eq!(joined.joined_users.len(), 2);
    assert!(matches!(
        scheduler.join(auction.id, carol.id).await,
        Err(EngineError::AuctionFull(_))
    ));

    let events = drain(&mut events);
    let joins = events
        .iter()
        .filter(|e| matches!(&***e, AuctionEvent::UserJoined { .. }))
        .count();
    assert_eq!(joins, 2);
    assert!(events
        .iter()
        .any(|e| matches!(&**e, AuctionEvent::QuorumReached { joined: 2, .. })));

    // 두 번째 탈퇴는 false
    assert!(scheduler.leave(auction.id, bob.id).await.unwrap());
    assert!(!scheduler.leave(auction.id, bob.id).await.unwrap());
    let current = scheduler.get(auction.id).await.unwrap();
    assert_eq!(current.joined_users.len(), 1);
    assert_eq!(current.status, ScheduledStatus::Waiting);

    h.store.set_user_active(carol.id, false).await.unwrap();
    assert!(matches!(
        scheduler.join(auction.id, carol.id).await,
        Err(EngineError::UserInactive(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_notifies_joined_users() {
    let h = setup().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 200).await;
    let question = h.question("Cancelled", 1).await;

    let at = Utc::now() + chrono::Duration::minutes(10);
    let auction = scheduler
        .create(draft(at, vec![question.id], 1, None))
        .await
        .unwrap();
    scheduler.join(auction.id, alice.id).await.unwrap();

    let mut events = h.subscribe();
    let cancelled = scheduler.cancel(auction.id).await.unwrap();
    assert_eq!(cancelled.status, ScheduledStatus::Cancelled);
    assert!(drain(&mut events).iter().any(|e| matches!(
        &**e,
        AuctionEvent::ScheduledCancelled { notified, .. } if notified == &vec![alice.id]
    )));

    assert!(matches!(
        scheduler.join(auction.id, alice.id).await,
        Err(EngineError::NotJoinable { .. })
    ));
    assert!(matches!(
        scheduler.cancel(auction.id).await,
        Err(EngineError::InvalidTransition {
            from: ScheduledStatus::Cancelled,
            to: ScheduledStatus::Cancelled,
            ..
        })
    ));
    // 취소된 경매는 기록으로 남는다.
    assert!(matches!(
        scheduler.delete(auction.id).await,
        Err(EngineError::AuctionLocked(_))
    ));
    // 취소된 경매는 자동 시작되지 않는다.
    let started = scheduler
        .tick(at + chrono::Duration::minutes(1))
        .await
        .unwrap();
    assert!(started.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_admin_validation() {
    let h = setup().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 200).await;
    let bob = h.user("bob", 200).await;
    let question = h.question("Admin", 1).await;
    let at = Utc::now() + chrono::Duration::minutes(10);

    let mut bad = draft(at, vec![question.id], 1, None);
    bad.title = "  ".to_string();
    assert!(matches!(
        scheduler.create(bad).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        scheduler.create(draft(at, vec![9_999], 1, None)).await,
        Err(EngineError::NotFound { .. })
    ));

    let auction = scheduler
        .create(draft(at, vec![question.id], 1, Some(3)))
        .await
        .unwrap();
    scheduler.join(auction.id, alice.id).await.unwrap();
    scheduler.join(auction.id, bob.id).await.unwrap();

    // 이미 참가한 인원보다 정원을 줄일 수 없다.
    assert!(matches!(
        scheduler
            .update(auction.id, draft(at, vec![question.id], 1, Some(1)))
            .await,
        Err(EngineError::Validation(_))
    ));
    let mut renamed = draft(at, vec![question.id], 1, Some(2));
    renamed.title = "Renamed".to_string();
    let updated = scheduler.update(auction.id, renamed).await.unwrap();
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.joined_users.len(), 2);

    let mut events = h.subscribe();
    scheduler.delete(auction.id).await.unwrap();
    assert!(scheduler.get(auction.id).await.is_err());
    // 참가자에게 삭제를 알린다.
    assert!(drain(&mut events).iter().any(|e| matches!(
        &**e,
        AuctionEvent::ScheduledCancelled { notified, .. } if notified == &vec![alice.id, bob.id]
    )));
}

/// 최소 인원이 모이지 않으면 시간이 지나도 시작하지 않고 대기한다.
#[tokio::test(start_paused = true)]
async fn test_auto_start_requires_quorum_and_time() {
    let h = setup().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 200).await;
    let bob = h.user("bob", 200).await;
    let question = h.question("Quorum", 1).await;

    let at = Utc::now() + chrono::Duration::minutes(10);
    let auction = scheduler
        .create(draft(at, vec![question.id], 2, None))
        .await
        .unwrap();
    scheduler.join(auction.id, alice.id).await.unwrap();

    let later = at + chrono::Duration::seconds(1);
    assert!(scheduler.tick(later).await.unwrap().is_empty());
    assert!(scheduler.is_stalled(auction.id));
    assert_eq!(
        scheduler.get(auction.id).await.unwrap().status,
        ScheduledStatus::Waiting
    );

    scheduler.join(auction.id, bob.id).await.unwrap();
    // 예약 시간 전
    assert!(scheduler
        .tick(at - chrono::Duration::seconds(1))
        .await
        .unwrap()
        .is_empty());

    let started = scheduler.tick(later).await.unwrap();
    assert_eq!(started, vec![auction.id]);
    assert!(!scheduler.is_stalled(auction.id));
    assert_eq!(
        scheduler.get(auction.id).await.unwrap().status,
        ScheduledStatus::InProgress
    );
    // 이미 시작된 경매는 다시 시작하지 않는다.
    assert!(scheduler.tick(later).await.unwrap().is_empty());

    // 진행 중에는 탈퇴, 취소, 수정, 삭제가 모두 거절된다.
    assert!(matches!(
        scheduler.leave(auction.id, bob.id).await,
        Err(EngineError::NotLeavable { .. })
    ));
    assert!(matches!(
        scheduler.cancel(auction.id).await,
        Err(EngineError::InvalidTransition {
            from: ScheduledStatus::InProgress,
            ..
        })
    ));
    assert!(matches!(
        scheduler
            .update(auction.id, draft(at, vec![question.id], 2, None))
            .await,
        Err(EngineError::AuctionLocked(_))
    ));
    assert!(matches!(
        scheduler.delete(auction.id).await,
        Err(EngineError::AuctionLocked(_))
    ));
}

/// 예약 경매 전체 흐름: 자동 시작, 연속 라운드, 코딩, 완료
#[tokio::test(start_paused = true)]
async fn test_scheduled_lifecycle() {
    let h = setup().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 200).await;
    let bob = h.user("bob", 200).await;
    let carol = h.user("carol", 200).await;
    let q1 = h.question("First", 2).await;
    let q2 = h.question("Second", 2).await;

    let at = Utc::now();
    let auction = scheduler
        .create(draft(at, vec![q1.id, q2.id], 2, None))
        .await
        .unwrap();
    scheduler.join(auction.id, alice.id).await.unwrap();
    scheduler.join(auction.id, bob.id).await.unwrap();

    let mut events = h.subscribe();
    let round = Duration::from_secs(auction.auction_duration) + Duration::from_millis(100);

    assert_eq!(scheduler.tick(at).await.unwrap(), vec![auction.id]);
    let session = h
        .engine
        .registry()
        .for_auction(auction.id)
        .expect("세션이 없음");
    let sid = session.id;

    let snapshot = h.engine.session_snapshot(sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Bidding);
    assert_eq!(snapshot.current_question_id, Some(q1.id));

    // 참가하지 않은 사용자는 입찰할 수 없다.
    assert!(matches!(
        h.engine.place_bid(sid, carol.id, 10).await,
        Err(EngineError::NotParticipant { .. })
    ));
    h.engine.place_bid(sid, alice.id, 30).await.unwrap();
    pass(round).await;

    // 다음 문제가 자동으로 열린다.
    let snapshot = h.engine.session_snapshot(sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Bidding);
    assert_eq!(snapshot.current_question_id, Some(q2.id));
    h.engine.place_bid(sid, bob.id, 20).await.unwrap();
    pass(round).await;

    // 마지막 라운드 후 코딩 단계
    let snapshot = h.engine.session_snapshot(sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Coding);
    assert_eq!(h.wallet(&alice).await, 170);
    assert_eq!(h.wallet(&bob).await, 180);

    let allotments = h.store.list_session_allotments(sid).await.unwrap();
    let mine = |user_id| {
        allotments
            .iter()
            .find(|aq| aq.user_id == user_id)
            .map(|aq| aq.id)
            .unwrap()
    };
    h.engine
        .submit_code(alice.id, mine(alice.id), "pass:2".into())
        .await
        .unwrap();
    h.engine
        .submit_code(bob.id, mine(bob.id), "pass:1".into())
        .await
        .unwrap();

    assert_eq!(
        scheduler.get(auction.id).await.unwrap().status,
        ScheduledStatus::Completed
    );

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        &**e,
        AuctionEvent::ScheduledStarted { auction_id, .. } if *auction_id == auction.id
    )));
    let pushed = events
        .iter()
        .filter(|e| {
            matches!(
                &***e,
                AuctionEvent::QuestionPushed {
                    auction_id: Some(_),
                    ..
                }
            )
        })
        .count();
    assert_eq!(pushed, 2);
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match &**e {
            AuctionEvent::AuctionCompleted { results, .. } => Some(results.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0][0].user_id, alice.id);
    assert_eq!(completed[0][0].total_score, 100);
    assert_eq!(completed[0][1].total_score, 50);

    // 완료된 경매와 세션은 결과 조회를 위해 남는다.
    assert!(matches!(
        scheduler.delete(auction.id).await,
        Err(EngineError::AuctionLocked(_))
    ));
    assert_eq!(
        scheduler.get(auction.id).await.unwrap().status,
        ScheduledStatus::Completed
    );
    assert_eq!(
        h.engine.registry().for_auction(auction.id).map(|s| s.id),
        Some(sid)
    );
}

/// 세션을 열지 못하면 대기 상태로 돌아가고 다음 확인 때 다시 시작한다.
#[tokio::test(start_paused = true)]
async fn test_failed_start_returns_to_waiting() {
    let (h, flaky) = setup_flaky().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 200).await;
    let question = h.question("Retry", 1).await;

    let at = Utc::now();
    let auction = scheduler
        .create(draft(at, vec![question.id], 1, None))
        .await
        .unwrap();
    scheduler.join(auction.id, alice.id).await.unwrap();

    FlakyStore::set(&flaky.fail_scheduled_sessions, true);
    assert!(scheduler.tick(at).await.unwrap().is_empty());
    assert_eq!(
        scheduler.get(auction.id).await.unwrap().status,
        ScheduledStatus::Waiting
    );
    assert!(h.engine.registry().for_auction(auction.id).is_none());

    // 복구된 경매는 다시 수정할 수 있다.
    let updated = scheduler
        .update(auction.id, draft(at, vec![question.id], 1, None))
        .await
        .unwrap();
    assert_eq!(updated.status, ScheduledStatus::Waiting);

    FlakyStore::set(&flaky.fail_scheduled_sessions, false);
    assert_eq!(scheduler.tick(at).await.unwrap(), vec![auction.id]);
    assert_eq!(
        scheduler.get(auction.id).await.unwrap().status,
        ScheduledStatus::InProgress
    );
    let session = h.engine.registry().for_auction(auction.id).unwrap();
    let snapshot = h.engine.session_snapshot(session.id).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Bidding);
}

/// 라이브 세션과 예약 세션에서 모두 최고가를 써도 지갑을 넘겨 차감되지 않는다.
#[tokio::test(start_paused = true)]
async fn test_cross_session_spend_is_bounded() {
    let h = setup().await;
    let scheduler = scheduler(&h);
    let alice = h.user("alice", 100).await;
    let q1 = h.question("Live", 1).await;
    let q2 = h.question("Scheduled", 1).await;
    let live = h.live_id().await;
    let mut events = h.subscribe();

    let at = Utc::now();
    let auction = scheduler
        .create(draft(at, vec![q2.id], 1, None))
        .await
        .unwrap();
    scheduler.join(auction.id, alice.id).await.unwrap();

    h.engine.open_round(live, q1.id).await.unwrap();
    h.engine.place_bid(live, alice.id, 80).await.unwrap();
    assert_eq!(scheduler.tick(at).await.unwrap(), vec![auction.id]);
    let sid = h.engine.registry().for_auction(auction.id).unwrap().id;
    // 입찰 시점에는 두 세션 모두 잔액이 충분하다.
    h.engine.place_bid(sid, alice.id, 80).await.unwrap();

    // 예약 라운드 (5초) 가 먼저 닫히고, 라이브 라운드는 잔액 부족으로 반환된다.
    pass(ROUND + Duration::from_millis(100)).await;

    assert_eq!(h.wallet(&alice).await, 20);
    let allotments = h.store.list_user_allotments(alice.id).await.unwrap();
    assert_eq!(allotments.len(), 1);
    assert_eq!(allotments[0].session_id, sid);
    assert!(h
        .store
        .find_allotment_for_question(live, q1.id)
        .await
        .unwrap()
        .is_none());
    assert!(drain(&mut events).iter().any(|e| matches!(
        &**e,
        AuctionEvent::AuctionEnded { session_id, winner: None, .. } if *session_id == live
    )));
}
