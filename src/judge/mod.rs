//! 외부 채점기 (Judge) 클라이언트
//! 코드와 테스트 케이스를 보내고 통과 개수를 받는다. 실행 자체는 채점기가 담당한다.

// region:    --- Imports
use crate::auction::model::TestCase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
// endregion: --- Imports

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeVerdict {
    #[serde(alias = "passed")]
    pub test_cases_passed: u32,
    #[serde(alias = "total")]
    pub total_test_cases: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge request failed: {0}")]
    Transport(String),
    #[error("judge timed out after {0:?}")]
    Timeout(Duration),
    #[error("judge rejected the submission: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// 채점기 트레이트
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, code: &str, test_cases: &[TestCase])
        -> Result<JudgeVerdict, JudgeError>;
}

// region:    --- Http Judge
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JudgeRequest<'a> {
    code: &'a str,
    test_cases: &'a [TestCase],
}

pub struct HttpJudge {
    client: reqwest::Client,
    url: String,
}

impl HttpJudge {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn evaluate(
        &self,
        code: &str,
        test_cases: &[TestCase],
    ) -> Result<JudgeVerdict, JudgeError> {
        let response = self
            .client
            .post(&self.url)
            .json(&JudgeRequest { code, test_cases })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Rejected(format!("{status}: {body}")));
        }

        let verdict: JudgeVerdict = response.json().await?;
        if verdict.test_cases_passed > verdict.total_test_cases {
            return Err(JudgeError::Rejected(format!(
                "passed {} exceeds total {}",
                verdict.test_cases_passed, verdict.total_test_cases
            )));
        }
        Ok(verdict)
    }
}
// endregion: --- Http Judge

// region:    --- Retry
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 첫 시도를 제외한 재시도 횟수
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// n 번째 재시도 전 대기 시간 (지수 증가)
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// 채점 결과. 채점기가 끝내 실패하면 0점, judge_failed = true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub score: i32,
    pub test_cases_passed: i32,
    pub total_test_cases: i32,
    pub judge_failed: bool,
}

impl Evaluation {
    pub fn from_counts(passed: u32, total: u32) -> Self {
        Self {
            score: score(passed, total),
            test_cases_passed: passed as i32,
            total_test_cases: total as i32,
            judge_failed: false,
        }
    }

    /// 제출할 코드가 없는 강제 제출
    pub fn empty(total: i32) -> Self {
        Self {
            score: 0,
            test_cases_passed: 0,
            total_test_cases: total,
            judge_failed: false,
        }
    }

    pub fn failed(total: i32) -> Self {
        Self {
            judge_failed: true,
            ..Self::empty(total)
        }
    }
}

/// round(100 * passed / total). total 이 0 이면 0.
pub fn score(passed: u32, total: u32) -> i32 {
    if total == 0 {
        return 0;
    }
    let passed = passed.min(total) as u64;
    ((passed * 200 + total as u64) / (total as u64 * 2)) as i32
}

/// 재시도와 시도별 타임아웃을 적용해 채점한다. 이 함수는 실패하지 않는다.
pub async fn evaluate_with_retry(
    judge: &dyn Judge,
    policy: &RetryPolicy,
    code: &str,
    test_cases: &[TestCase],
) -> Evaluation {
    let total = test_cases.len() as i32;
    let mut retry = 0;
    loop {
        let outcome = match tokio::time::timeout(
            policy.attempt_timeout,
            judge.evaluate(code, test_cases),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(JudgeError::Timeout(policy.attempt_timeout)),
        };

        match outcome {
            Ok(verdict) => {
                return Evaluation::from_counts(verdict.test_cases_passed, verdict.total_test_cases)
            }
            Err(e) if retry < policy.max_retries => {
                let wait = policy.backoff(retry);
                warn!(
                    "{:<12} --> 채점 실패, {:?} 후 재시도 ({}/{}): {}",
                    "Judge",
                    wait,
                    retry + 1,
                    policy.max_retries,
                    e
                );
                tokio::time::sleep(wait).await;
                retry += 1;
            }
            Err(e) => {
                info!("{:<12} --> 채점 포기, 0점 처리: {}", "Judge", e);
                return Evaluation::failed(total);
            }
        }
    }
}
// endregion: --- Retry
