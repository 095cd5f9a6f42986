//! 再試行ポリシー
//!
//! 状態遷移: `Attempting(n)` → `Succeeded` | `Failed` | `Attempting(n + 1)`
//! 再試行するのはレート制限エラーのみ。待ち時間は試行ごとに倍増する。

use super::InvokeError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// モデル呼び出しの最大回数
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 初回呼び出しからの経過時間の上限（待ち時間込み）
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// `attempt` 回目（1始まり）が失敗した後の待ち時間
    ///
    /// base, base*2, base*4, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// 待ってから再試行しても期限内に収まるか
    pub fn fits_deadline(&self, elapsed: Duration, delay: Duration) -> bool {
        match self.deadline {
            Some(deadline) => elapsed.saturating_add(delay) <= deadline,
            None => true,
        }
    }
}

/// 再試行してよいエラーか
pub fn is_retriable(error: &InvokeError) -> bool {
    matches!(error, InvokeError::Throttled(_))
}

/// 1回の生成呼び出しの状態
#[derive(Debug)]
pub enum AttemptState<T, E> {
    Attempting(u32),
    Succeeded(T),
    Failed(E),
}

/// 1回の生成呼び出し中だけ保持する再試行状況
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub last_error: Option<InvokeError>,
}

impl RetryState {
    pub fn record_failure(&mut self, attempt: u32, error: InvokeError) {
        self.attempts = attempt;
        self.last_error = Some(error);
    }
}
