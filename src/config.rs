//! 프로토콜 설정

use std::time::Duration;

use crate::packet::MAX_MSS;
use crate::{Error, Result, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_MSS};

/// 수신자 팬아웃 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// 수신자별 태스크가 동시에 stop-and-wait 수행, 세그먼트마다 배리어
    Concurrent,

    /// 수신자를 고정 순서로 하나씩 처리
    Sequential,
}

/// P2MP-FTP 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 최대 세그먼트 크기 (바이트)
    pub mss: usize,

    /// 초기 ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 백오프 상한 (밀리초)
    pub max_ack_timeout_ms: u64,

    /// 타임아웃마다 곱해지는 배수 (1이면 고정 타임아웃)
    pub backoff_factor: u32,

    /// 세그먼트당 최대 재전송 횟수
    /// None이면 무제한 재시도
    pub max_retries: Option<u32>,

    /// 팬아웃 방식
    pub fan_out: FanOut,

    /// 허용 수신자 수 상한
    pub max_receivers: usize,

    /// 수신측 손실 시뮬레이션 확률 (0.0 ~ 1.0)
    pub loss_probability: f64,

    /// 손실 시뮬레이션 RNG 시드 (None이면 엔트로피)
    pub loss_seed: Option<u64>,

    /// 스트림 종료 후 재전송에 재-ACK하며 대기하는 시간 (밀리초)
    pub eos_linger_ms: u64,

    /// 소켓 수신 버퍼 크기 (수신자 소켓, 송신 링크 공통)
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS, // 120ms
            max_ack_timeout_ms: 2000,               // 2초
            backoff_factor: 2,
            max_retries: Some(16),
            fan_out: FanOut::Concurrent,
            max_receivers: 64,
            loss_probability: 0.0,
            loss_seed: None,
            eos_linger_ms: 1000,
            recv_buffer_size: 65535,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 로컬 네트워크용 설정
    pub fn lan() -> Self {
        Self {
            mss: 1400,
            ack_timeout_ms: 20,
            max_ack_timeout_ms: 500,
            backoff_factor: 2,
            max_retries: Some(24),
            eos_linger_ms: 300,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            mss: 500,                 // 작은 세그먼트
            ack_timeout_ms: 200,
            max_ack_timeout_ms: 5000,
            backoff_factor: 2,
            max_retries: Some(64),
            eos_linger_ms: 5000,
            ..Self::default()
        }
    }

    /// 고정 타임아웃, 무제한 재시도, 순차 팬아웃
    pub fn legacy() -> Self {
        Self {
            backoff_factor: 1,
            max_ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            max_retries: None,
            fan_out: FanOut::Sequential,
            ..Self::default()
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.mss == 0 || self.mss > MAX_MSS {
            return Err(Error::InvalidConfig(format!(
                "mss {}는 1..={} 범위여야 함",
                self.mss, MAX_MSS
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(Error::InvalidConfig(format!(
                "loss_probability {}는 0.0..=1.0 범위여야 함",
                self.loss_probability
            )));
        }
        if self.ack_timeout_ms == 0 {
            return Err(Error::InvalidConfig("ack_timeout_ms는 0일 수 없음".into()));
        }
        if self.max_ack_timeout_ms < self.ack_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "max_ack_timeout_ms {} < ack_timeout_ms {}",
                self.max_ack_timeout_ms, self.ack_timeout_ms
            )));
        }
        if self.backoff_factor == 0 {
            return Err(Error::InvalidConfig("backoff_factor는 0일 수 없음".into()));
        }
        if self.max_receivers == 0 {
            return Err(Error::InvalidConfig("max_receivers는 0일 수 없음".into()));
        }
        if self.recv_buffer_size < self.mss + crate::packet::HEADER_LEN {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size {}가 mss + 헤더보다 작음",
                self.recv_buffer_size
            )));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn eos_linger(&self) -> Duration {
        Duration::from_millis(self.eos_linger_ms)
    }

    /// 현재 타임아웃에 백오프 적용
    pub fn next_timeout(&self, current: Duration) -> Duration {
        let cap = Duration::from_millis(self.max_ack_timeout_ms);
        current.saturating_mul(self.backoff_factor).min(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for config in [
            Config::default(),
            Config::lan(),
            Config::lossy_network(),
            Config::legacy(),
        ] {
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            Config { mss: 0, ..Config::default() },
            Config { mss: MAX_MSS + 1, ..Config::default() },
            Config { loss_probability: 1.5, ..Config::default() },
            Config { loss_probability: -0.1, ..Config::default() },
            Config { ack_timeout_ms: 0, ..Config::default() },
            Config { backoff_factor: 0, ..Config::default() },
            Config { max_receivers: 0, ..Config::default() },
            Config { recv_buffer_size: 16, ..Config::default() },
        ];

        for config in bad {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = Config::default();
        let mut timeout = config.ack_timeout();

        timeout = config.next_timeout(timeout);
        assert_eq!(timeout, Duration::from_millis(240));

        for _ in 0..10 {
            timeout = config.next_timeout(timeout);
        }
        assert_eq!(timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_legacy_timeout_is_fixed() {
        let config = Config::legacy();
        assert_eq!(config.next_timeout(config.ack_timeout()), config.ack_timeout());
        assert!(config.max_retries.is_none());
        assert_eq!(config.fan_out, FanOut::Sequential);
    }
}
