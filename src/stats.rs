//! 전송 통계

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// 수신자 링크별 송신 통계
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// 전송한 DATA 패킷 수 (재전송 포함)
    pub packets_sent: u64,

    /// 재전송 횟수
    pub retransmissions: u64,

    /// ACK 타임아웃 횟수
    pub timeouts: u64,

    /// 시퀀스가 맞지 않는 ACK 수
    pub stale_acks: u64,

    /// INVALID_SEQUENCE ACK 수
    pub sentinel_acks: u64,

    /// 확인된 세그먼트 수
    pub segments_acknowledged: u64,

    /// 센티넬 ACK로 포기한 세그먼트 수
    pub segments_abandoned: u64,

    /// 확인된 페이로드 바이트
    pub bytes_acknowledged: u64,

    /// 최근 RTT 샘플 (재전송 없이 확인된 세그먼트만)
    pub last_rtt: Option<Duration>,
}

impl LinkStats {
    /// 첫 전송 대비 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.packets_sent as f64
    }
}

/// 수신자 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverStatus {
    /// 종료 마커까지 모두 처리
    Completed,

    /// 재시도 한도 초과 등으로 팬아웃에서 제외됨
    Failed { sequence: i32, reason: String },
}

/// 수신자별 결과
#[derive(Debug, Clone)]
pub struct ReceiverOutcome {
    pub addr: SocketAddr,
    pub status: ReceiverStatus,
    pub stats: LinkStats,
}

impl ReceiverOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == ReceiverStatus::Completed
    }
}

/// 전체 전송 결과
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// 시작 시간
    pub start_time: Instant,

    /// 소요 시간
    pub elapsed: Duration,

    /// 파일 크기
    pub total_bytes: u64,

    /// 종료 마커 포함 세그먼트 수
    pub total_segments: u64,

    /// 수신자별 결과 (입력 순서 유지)
    pub receivers: Vec<ReceiverOutcome>,
}

impl TransferReport {
    /// 모든 수신자가 완료했는지
    pub fn is_complete(&self) -> bool {
        self.receivers.iter().all(ReceiverOutcome::is_completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReceiverOutcome> {
        self.receivers.iter().filter(|r| !r.is_completed())
    }

    pub fn total_retransmissions(&self) -> u64 {
        self.receivers.iter().map(|r| r.stats.retransmissions).sum()
    }

    /// 처리율 (bytes/sec, 수신자 1명 기준)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        let completed = self.receivers.iter().filter(|r| r.is_completed()).count();
        format!(
            "Elapsed: {:.2}s | Receivers: {}/{} | Bytes: {} | Segments: {} | Throughput: {:.2} KB/s | Retransmissions: {}",
            self.elapsed.as_secs_f64(),
            completed,
            self.receivers.len(),
            self.total_bytes,
            self.total_segments,
            self.throughput() / 1000.0,
            self.total_retransmissions(),
        )
    }
}

/// 수신측 통계
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// 순서대로 수락한 패킷 수 (종료 마커 포함)
    pub accepted: u64,

    /// 중복/순서 어긋난 패킷 수
    pub out_of_sequence: u64,

    /// 체크섬 불일치로 버린 패킷 수
    pub corrupted: u64,

    /// 손실 시뮬레이션으로 버린 패킷 수
    pub simulated_losses: u64,

    /// 전송한 ACK 수
    pub acks_sent: u64,

    /// 싱크에 쓴 바이트
    pub bytes_written: u64,
}

impl ReceiverStats {
    pub fn summary(&self) -> String {
        format!(
            "Accepted: {} | Bytes: {} | Out-of-sequence: {} | Corrupted: {} | Simulated loss: {} | ACKs: {}",
            self.accepted,
            self.bytes_written,
            self.out_of_sequence,
            self.corrupted,
            self.simulated_losses,
            self.acks_sent,
        )
    }
}
