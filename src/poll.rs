//! 輪詢授權與訂單，直到狀態離開等待中的集合。

use std::{
    thread,
    time::{Duration, Instant},
};

use log::debug;
use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    session::Session,
    transport::HttpResponse,
};

/// 固定輪詢間隔。
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// 從第一次輪詢起算的時間上限。
pub const POLL_TIMEOUT: Duration = Duration::from_secs(3600);

/// 時間來源；測試時可以替換以模擬經過的時間。
pub trait Clock: Send + Sync {
    /// 自某個固定起點起算的單調時間。
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// 以系統單調時鐘與 `thread::sleep` 實作的 [`Clock`]。
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 輪詢策略：固定間隔、不退避，超過上限即為致命錯誤。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout: POLL_TIMEOUT,
        }
    }
}

/// 可以被輪詢的 CA 資源。
pub trait Pollable: DeserializeOwned {
    /// 目前狀態是否仍需等待。
    fn is_pending(&self) -> bool;

    fn from_response(response: &HttpResponse) -> Result<Self> {
        response.parse()
    }
}

/// 以 POST-as-GET 反覆取得 `url`，直到資源不再處於等待狀態。
///
/// 第一次立即查詢，之後每次間隔 `policy.interval`。每次查詢前都會檢查經過時間，
/// 因此在預設策略下最後一次查詢發生在第 3598 秒。
///
/// # 參數
///
/// - `session`: 已註冊帳戶的工作階段
/// - `clock`: 時間來源，測試時以模擬時鐘取代
/// - `policy`: 輪詢間隔與時間上限
/// - `url`: 要輪詢的資源 URL
///
/// # Errors
///
/// 從第一次查詢起經過 `policy.timeout` 仍未完成時回傳 [`Error::Timeout`]。
pub fn poll_until_settled<T: Pollable>(
    session: &mut Session,
    clock: &dyn Clock,
    policy: &PollPolicy,
    url: &str,
) -> Result<T> {
    let started = clock.now();
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            clock.sleep(policy.interval);
        }
        if clock.now().saturating_sub(started) >= policy.timeout {
            return Err(Error::Timeout {
                url: url.to_owned(),
                after: policy.timeout,
            });
        }
        attempt += 1;

        let resource = T::from_response(&session.post_as_get(url)?)?;
        if !resource.is_pending() {
            return Ok(resource);
        }
        debug!("{} still pending after {} polls", url, attempt);
    }
}
