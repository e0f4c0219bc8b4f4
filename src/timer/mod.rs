//! 세션 단계별 카운트다운
//! 일정 주기로 남은 시간을 알리고, 0 이 되면 만료 콜백을 정확히 한 번 실행한다.

// region:    --- Imports
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Duration, Instant, MissedTickBehavior};
use tracing::debug;
// endregion: --- Imports

/// 남은 시간 (초, 올림)
pub fn remaining_secs(deadline: Instant) -> u64 {
    let left = deadline.saturating_duration_since(Instant::now());
    let secs = left.as_secs();
    if left.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

// region:    --- Countdown
/// 실행 중인 카운트다운. drop 되면 틱과 만료 콜백이 모두 취소된다.
pub struct Countdown {
    handle: JoinHandle<()>,
    deadline: Instant,
}

impl Countdown {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining_secs(&self) -> u64 {
        remaining_secs(self.deadline)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel(self) {}
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
// endregion: --- Countdown

// region:    --- Timer Service
#[derive(Debug, Clone, Copy)]
pub struct TimerService {
    tick: Duration,
}

impl TimerService {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(10)),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// 카운트다운 시작
    pub fn start<T, E, Fut>(&self, duration: Duration, on_tick: T, on_expire: E) -> Countdown
    where
        T: Fn(u64) + Send + 'static,
        E: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + duration;
        let tick = self.tick;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let expiry = sleep_until(deadline);
            tokio::pin!(expiry);

            loop {
                tokio::select! {
                    _ = &mut expiry => break,
                    _ = ticker.tick() => on_tick(remaining_secs(deadline)),
                }
            }

            // 만료 콜백은 별도 태스크에서 실행한다.
            // 콜백이 카운트다운을 교체하면서 이 태스크를 abort 해도 콜백은 끝까지 수행된다.
            debug!("{:<12} --> 카운트다운 만료", "Timer");
            tokio::spawn(on_expire());
        });

        Countdown { handle, deadline }
    }
}
// endregion: --- Timer Service
