//! 에러 타입 정의

use std::net::SocketAddr;

use thiserror::Error;

/// P2MP-FTP 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("패킷이 너무 짧음: {len} bytes (헤더 {header_len} bytes)")]
    Truncated { len: usize, header_len: usize },

    #[error("알 수 없는 패킷 타입: {0:#06X}")]
    UnknownPacketType(u16),

    #[error("페이로드 크기 초과: {len} bytes (최대 {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("파일 읽기 부족: sequence={sequence}, expected {expected} bytes")]
    ShortRead { sequence: i32, expected: usize },

    #[error("전송 실패: receiver={receiver}, sequence={sequence}, attempts={attempts}")]
    DeliveryFailed {
        receiver: SocketAddr,
        sequence: i32,
        attempts: u32,
    },

    #[error("수신자 없음")]
    NoReceivers,

    #[error("수신자 수 초과: {count} (최대 {max})")]
    TooManyReceivers { count: usize, max: usize },

    #[error("세그먼트 수 초과: {count}")]
    TooManySegments { count: u64 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("로컬 IPv4 주소를 찾을 수 없음: {0}")]
    NoLocalAddress(String),

    #[error("채널 에러")]
    ChannelError,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
