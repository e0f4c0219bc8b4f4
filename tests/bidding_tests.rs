mod common;

use code_auction_service::auction::events::AuctionEvent;
use code_auction_service::auction::model::{SessionKind, SessionPhase};
use code_auction_service::error::EngineError;
use code_auction_service::store::AuctionStore;
use common::{drain, pass, setup, ROUND};
use std::time::Duration;

/// 50, 80, 80, 120 순서의 입찰: 세 번째는 거절되고 120 이 낙찰된다.
#[tokio::test(start_paused = true)]
async fn test_strictly_increasing_bids() {
    let h = setup().await;
    let sid = h.live_id().await;
    let alice = h.user("alice", 200).await;
    let bob = h.user("bob", 200).await;
    let carol = h.user("carol", 200).await;
    let question = h.question("Two Sum", 3).await;
    let mut events = h.subscribe();

    h.engine.open_round(sid, question.id).await.unwrap();
    h.engine.place_bid(sid, alice.id, 50).await.unwrap();
    h.engine.place_bid(sid, bob.id, 80).await.unwrap();
    let tie = h.engine.place_bid(sid, carol.id, 80).await;
    assert!(matches!(
        tie,
        Err(EngineError::BidTooLow {
            amount: 80,
            current: 80
        })
    ));
    let receipt = h.engine.place_bid(sid, alice.id, 120).await.unwrap();
    assert_eq!(receipt.amount, 120);
    assert!(receipt.time_remaining <= ROUND.as_secs());

    // 거절된 입찰은 기록되지 않는다.
    let bids = h.store.list_bids(sid).await.unwrap();
    let amounts: Vec<i64> = bids.iter().map(|b| b.amount).collect();
    assert_eq!(amounts, vec![50, 80, 120]);

    pass(ROUND + Duration::from_millis(100)).await;

    let allotment = h
        .store
        .find_allotment_for_question(sid, question.id)
        .await
        .unwrap()
        .expect("낙찰 기록이 없음");
    assert_eq!(allotment.user_id, alice.id);
    assert_eq!(allotment.bid_amount, 120);
    assert_eq!(h.wallet(&alice).await, 80);
    assert_eq!(h.wallet(&bob).await, 200);
    assert_eq!(h.wallet(&carol).await, 200);

    let snapshot = h.engine.session_snapshot(sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(snapshot.current_bid.is_none());

    let ended: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match &*e {
            AuctionEvent::AuctionEnded { winner, .. } => Some(winner.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ended.len(), 1);
    let winner = ended[0].clone().expect("낙찰자 없음");
    assert_eq!(winner.user_id, alice.id);
    assert_eq!(winner.amount, 120);
    assert_eq!(winner.allotted_question_id, allotment.id);
}

/// 입찰 없는 라운드는 할당도 차감도 없다.
#[tokio::test(start_paused = true)]
async fn test_round_without_bids() {
    let h = setup().await;
    let sid = h.live_id().await;
    let alice = h.user("alice", 200).await;
    let question = h.question("Empty", 2).await;
    let mut events = h.subscribe();

    h.engine.open_round(sid, question.id).await.unwrap();
    pass(ROUND + Duration::from_millis(100)).await;

    assert!(h
        .store
        .find_allotment_for_question(sid, question.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(h.wallet(&alice).await, 200);

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(&**e, AuctionEvent::QuestionPushed { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(&**e, AuctionEvent::AuctionEnded { winner: None, .. })));

    // 반환된 문제는 다시 경매할 수 있다.
    h.engine.open_round(sid, question.id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bid_validation() {
    let h = setup().await;
    let sid = h.live_id().await;
    let alice = h.user("alice", 200).await;
    let idle = h.user("idle", 200).await;
    let question = h.question("Validation", 1).await;

    // 라운드 전
    assert!(matches!(
        h.engine.place_bid(sid, alice.id, 10).await,
        Err(EngineError::RoundNotActive(_))
    ));

    h.engine.open_round(sid, question.id).await.unwrap();
    assert!(matches!(
        h.engine.place_bid(sid, alice.id, 0).await,
        Err(EngineError::InvalidAmount(0))
    ));
    assert!(matches!(
        h.engine.place_bid(sid, alice.id, -5).await,
        Err(EngineError::InvalidAmount(-5))
    ));
    assert!(matches!(
        h.engine.place_bid(sid, alice.id, 250).await,
        Err(EngineError::InsufficientFunds {
            wallet: 200,
            amount: 250
        })
    ));

    h.store.set_user_active(idle.id, false).await.unwrap();
    assert!(matches!(
        h.engine.place_bid(sid, idle.id, 10).await,
        Err(EngineError::UserInactive(_))
    ));

    // 진행 중인 라운드 위에 새 라운드를 열 수 없다.
    assert!(matches!(
        h.engine.open_round(sid, question.id).await,
        Err(EngineError::RoundAlreadyActive {
            phase: SessionPhase::Bidding,
            ..
        })
    ));

    assert!(h.store.list_bids(sid).await.unwrap().is_empty());

    // 만료 후 도착한 입찰
    pass(ROUND + Duration::from_millis(100)).await;
    assert!(matches!(
        h.engine.place_bid(sid, alice.id, 10).await,
        Err(EngineError::RoundNotActive(_))
    ));
}

/// 같은 금액의 동시 입찰은 하나만 성공한다.
#[tokio::test(start_paused = true)]
async fn test_concurrent_equal_bids() {
    let h = setup().await;
    let sid = h.live_id().await;
    let alice = h.user("alice", 200).await;
    let bob = h.user("bob", 200).await;
    let question = h.question("Race", 1).await;

    h.engine.open_round(sid, question.id).await.unwrap();

    let (a, b) = tokio::join!(
        h.engine.place_bid(sid, alice.id, 100),
        h.engine.place_bid(sid, bob.id, 100)
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    assert_eq!(h.store.list_bids(sid).await.unwrap().len(), 1);

    let snapshot = h.engine.session_snapshot(sid).await.unwrap();
    assert_eq!(snapshot.current_bid.map(|bid| bid.amount), Some(100));
}

/// 라운드는 한 번만 닫히고, 낙찰된 문제는 다시 열 수 없다.
#[tokio::test(start_paused = true)]
async fn test_round_closes_once() {
    let h = setup().await;
    let sid = h.live_id().await;
    let alice = h.user("alice", 200).await;
    let question = h.question("Once", 2).await;
    let mut events = h.subscribe();

    h.win(sid, &question, &alice, 70).await;
    pass(ROUND * 3).await;

    let events = drain(&mut events);
    let ended = events
        .iter()
        .filter(|e| matches!(&***e, AuctionEvent::AuctionEnded { .. }))
        .count();
    assert_eq!(ended, 1);
    assert!(events
        .iter()
        .any(|e| matches!(&**e, AuctionEvent::TimerUpdate { .. })));
    assert_eq!(h.wallet(&alice).await, 130);

    assert!(matches!(
        h.engine.open_round(sid, question.id).await,
        Err(EngineError::QuestionAlreadyAllotted { .. })
    ));
}

/// 낙찰 처리는 같은 (세션, 사용자, 문제) 에 대해 한 번만 차감한다.
#[tokio::test(start_paused = true)]
async fn test_allocate_is_idempotent() {
    let h = setup().await;
    let sid = h.live_id().await;
    let alice = h.user("alice", 100).await;
    let question = h.question("Idempotent", 1).await;

    let first = h.engine.allocate(sid, question.id, alice.id, 60).await.unwrap();
    assert!(first.created);
    assert_eq!(first.wallet_after, 40);

    let again = h.engine.allocate(sid, question.id, alice.id, 60).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.allotment.id, first.allotment.id);
    assert_eq!(h.wallet(&alice).await, 40);

    // 잔액이 모자라면 차감도 할당도 없다.
    let other = h.question("Too expensive", 1).await;
    assert!(h.engine.allocate(sid, other.id, alice.id, 50).await.is_err());
    assert_eq!(h.wallet(&alice).await, 40);
    assert!(h
        .store
        .find_allotment_for_question(sid, other.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reset_live_rejected_while_bidding() {
    let h = setup().await;
    let sid = h.live_id().await;
    let question = h.question("Reset", 1).await;

    h.engine.open_round(sid, question.id).await.unwrap();
    assert!(h.engine.reset_live().await.is_err());

    pass(ROUND + Duration::from_millis(100)).await;
    let fresh = h.engine.reset_live().await.unwrap();
    assert_ne!(fresh.id, sid);
    assert_eq!(h.live_id().await, fresh.id);
    // 이전 세션은 조회용으로 남는다.
    assert!(h.engine.session_snapshot(sid).await.is_ok());
}

/// 두 세션에서 동시에 낙찰되어도 지갑은 한 번만 차감된다.
#[tokio::test(start_paused = true)]
async fn test_concurrent_allocations_across_sessions() {
    let h = setup().await;
    let live = h.live_id().await;
    let other = h.store.create_session(SessionKind::Live).await.unwrap().id;
    let alice = h.user("alice", 100).await;
    let q1 = h.question("Left", 1).await;
    let q2 = h.question("Right", 1).await;

    let (a, b) = tokio::join!(
        h.engine.allocate(live, q1.id, alice.id, 60),
        h.engine.allocate(other, q2.id, alice.id, 60)
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    assert!(matches!(
        a.err().or(b.err()),
        Some(EngineError::InsufficientFunds {
            wallet: 40,
            amount: 60
        })
    ));
    assert_eq!(h.wallet(&alice).await, 40);
    assert_eq!(h.store.list_user_allotments(alice.id).await.unwrap().len(), 1);
}
