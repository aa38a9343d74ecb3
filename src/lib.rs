//! # P2MP-FTP (Point-to-Multipoint File Transfer Protocol)
//!
//! UDP 기반 1:N stop-and-wait 신뢰 전송 프로토콜
//!
//! ## 핵심 특징
//! - **Stop-and-wait ARQ**: 수신자별로 한 번에 패킷 하나만 전송 중
//! - **체크섬**: 16비트 1의 보수, 손상 패킷은 수신측에서 조용히 버림
//! - **시퀀스 번호**: 중복/순서 어긋남은 마지막 수락 번호로 재-ACK
//! - **종료 마커**: 0바이트 DATA 패킷, 일반 패킷과 동일하게 ACK
//! - **동시 팬아웃**: 수신자별 워커 태스크, 세그먼트 단위 배리어
//! - **지수 백오프**: 재시도 한도 초과 시 해당 수신자만 실패 처리

pub mod checksum;
pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod stats;
pub mod transport;

pub use config::{Config, FanOut};
pub use error::{Error, Result};
pub use packet::{AckPacket, DataPacket, Packet, PacketType, INVALID_SEQUENCE};
pub use receiver::{receive_loop, FileReceiver, LossSimulator, ReceiveSummary, ReceiverSession};
pub use sender::{Delivery, ReceiverLink, Sender};
pub use stats::{LinkStats, ReceiverStats, ReceiverStatus, TransferReport};

/// 기본 최대 세그먼트 크기 (바이트)
pub const DEFAULT_MSS: usize = 500;

/// 기본 ACK 타임아웃 (밀리초)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 120;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 7735;
