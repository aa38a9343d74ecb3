//! 와이어 포맷 정의
//!
//! 모든 패킷은 8바이트 고정 헤더 뒤에 (DATA인 경우) 페이로드가 붙는다.
//! 멀티바이트 필드는 big-endian.
//!
//! ```text
//!  0               1               2               3
//! +---------------+---------------+---------------+---------------+
//! |                     Sequence Number (i32)                     |
//! +---------------+---------------+---------------+---------------+
//! |         Checksum (u16)        |        Packet Type (u16)      |
//! +---------------+---------------+---------------+---------------+
//! |                        Payload (DATA only)                    |
//! +---------------------------------------------------------------+
//! ```

use bincode::Options;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::{Error, Result};

/// 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 8;

/// IPv4 UDP 최대 페이로드
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// 최대 세그먼트 크기 (헤더 제외)
pub const MAX_MSS: usize = MAX_DATAGRAM_SIZE - HEADER_LEN;

/// "아직 수락한 패킷 없음" 센티넬 시퀀스 번호
pub const INVALID_SEQUENCE: i32 = -1;

/// 패킷 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketType {
    /// 파일 데이터 (0바이트면 스트림 종료)
    Data = 0x5555,

    /// 확인 응답
    Ack = 0xAAAA,
}

impl TryFrom<u16> for PacketType {
    type Error = Error;

    fn try_from(tag: u16) -> Result<Self> {
        match tag {
            0x5555 => Ok(PacketType::Data),
            0xAAAA => Ok(PacketType::Ack),
            other => Err(Error::UnknownPacketType(other)),
        }
    }
}

/// 와이어 상의 헤더 레이아웃
#[derive(Debug, Serialize, Deserialize)]
struct RawHeader {
    sequence: i32,
    checksum: u16,
    packet_type: u16,
}

/// 고정 폭 big-endian 인코딩 (가변 길이 정수 없음)
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

/// 패킷 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// 시퀀스 번호 (ACK에서는 마지막으로 수락한 번호 또는 [`INVALID_SEQUENCE`])
    pub sequence: i32,

    /// 페이로드 체크섬 (ACK는 0)
    pub checksum: u16,

    /// 패킷 타입
    pub packet_type: PacketType,
}

impl PacketHeader {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let raw = RawHeader {
            sequence: self.sequence,
            checksum: self.checksum,
            packet_type: self.packet_type as u16,
        };
        Ok(wire_options().serialize(&raw)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                len: bytes.len(),
                header_len: HEADER_LEN,
            });
        }

        let raw: RawHeader = wire_options().deserialize(&bytes[..HEADER_LEN])?;
        Ok(Self {
            sequence: raw.sequence,
            checksum: raw.checksum,
            packet_type: PacketType::try_from(raw.packet_type)?,
        })
    }
}

/// 데이터 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub sequence: i32,
    pub checksum: u16,
    pub payload: Bytes,
}

impl DataPacket {
    /// 새 데이터 패킷 (체크섬 자동 계산)
    pub fn new(sequence: i32, payload: Bytes) -> Self {
        Self {
            sequence,
            checksum: checksum::checksum(&payload),
            payload,
        }
    }

    /// 스트림 종료 마커
    pub fn end_of_stream(sequence: i32) -> Self {
        Self::new(sequence, Bytes::new())
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.payload.is_empty()
    }

    /// 헤더 체크섬과 페이로드 일치 여부
    pub fn verify(&self) -> bool {
        checksum::verify(&self.payload, self.checksum)
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            sequence: self.sequence,
            checksum: self.checksum,
            packet_type: PacketType::Data,
        }
    }
}

/// 확인 응답 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub sequence: i32,
}

impl AckPacket {
    pub fn new(sequence: i32) -> Self {
        Self { sequence }
    }

    /// 수신자가 아직 어떤 패킷도 수락하지 않았음을 알리는 ACK인지
    pub fn is_sentinel(&self) -> bool {
        self.sequence == INVALID_SEQUENCE
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            sequence: self.sequence,
            checksum: 0,
            packet_type: PacketType::Ack,
        }
    }
}

/// 통합 패킷 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Data(_) => PacketType::Data,
            Packet::Ack(_) => PacketType::Ack,
        }
    }

    pub fn sequence(&self) -> i32 {
        match self {
            Packet::Data(data) => data.sequence,
            Packet::Ack(ack) => ack.sequence,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Packet::Data(data) => {
                if data.payload.len() > MAX_MSS {
                    return Err(Error::PayloadTooLarge {
                        len: data.payload.len(),
                        max: MAX_MSS,
                    });
                }

                let mut buf = Vec::with_capacity(HEADER_LEN + data.payload.len());
                buf.extend_from_slice(&data.header().encode()?);
                buf.extend_from_slice(&data.payload);
                Ok(buf)
            }
            Packet::Ack(ack) => ack.header().encode(),
        }
    }

    /// 바이트에서 역직렬화
    ///
    /// 체크섬은 검증하지 않는다. 손상된 데이터 패킷을 버릴지는 수신 측이 결정한다.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::decode(bytes)?;

        let packet = match header.packet_type {
            PacketType::Data => Packet::Data(DataPacket {
                sequence: header.sequence,
                checksum: header.checksum,
                payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
            }),
            // ACK 뒤의 여분 바이트는 무시
            PacketType::Ack => Packet::Ack(AckPacket::new(header.sequence)),
        };
        Ok(packet)
    }
}

impl From<DataPacket> for Packet {
    fn from(data: DataPacket) -> Self {
        Packet::Data(data)
    }
}

impl From<AckPacket> for Packet {
    fn from(ack: AckPacket) -> Self {
        Packet::Ack(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = Packet::Data(DataPacket::new(0x01020304, Bytes::from_static(b"hi")));
        let bytes = packet.to_bytes().unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 2);
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..6], &checksum::checksum(b"hi").to_be_bytes());
        assert_eq!(&bytes[6..8], &[0x55, 0x55]);
        assert_eq!(&bytes[8..], b"hi");
    }

    #[test]
    fn test_ack_encoding() {
        let bytes = Packet::Ack(AckPacket::new(INVALID_SEQUENCE)).to_bytes().unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0xAA, 0xAA]);

        let restored = Packet::from_bytes(&bytes).unwrap();
        match restored {
            Packet::Ack(ack) => assert!(ack.is_sentinel()),
            other => panic!("ACK 기대, got {:?}", other),
        }
    }

    #[test]
    fn test_data_serialization() {
        let data = DataPacket::new(7, Bytes::from(vec![1, 2, 3, 4, 5]));
        let bytes = Packet::Data(data.clone()).to_bytes().unwrap();
        let restored = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(restored, Packet::Data(data));
        assert_eq!(restored.sequence(), 7);
        assert_eq!(restored.packet_type(), PacketType::Data);
    }

    #[test]
    fn test_end_of_stream_marker() {
        let eos = DataPacket::end_of_stream(3);
        assert!(eos.is_end_of_stream());
        assert!(eos.verify());
        assert_eq!(eos.checksum, 0xFFFF);

        let bytes = Packet::Data(eos).to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
    }

    #[test]
    fn test_truncated_packet() {
        let err = Packet::from_bytes(&[0, 0, 0, 1, 0]).unwrap_err();
        assert!(matches!(err, Error::Truncated { len: 5, .. }));
    }

    #[test]
    fn test_unknown_type_tag() {
        let bytes = [0, 0, 0, 1, 0, 0, 0x12, 0x34];
        let err = Packet::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownPacketType(0x1234)));
    }

    #[test]
    fn test_corrupted_payload_fails_verify() {
        let data = DataPacket::new(0, Bytes::from_static(b"payload"));
        let mut bytes = Packet::Data(data).to_bytes().unwrap();
        bytes[HEADER_LEN] ^= 0x01;

        match Packet::from_bytes(&bytes).unwrap() {
            Packet::Data(corrupted) => assert!(!corrupted.verify()),
            other => panic!("DATA 기대, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_too_large() {
        let data = DataPacket::new(0, Bytes::from(vec![0u8; MAX_MSS + 1]));
        assert!(matches!(
            Packet::Data(data).to_bytes(),
            Err(Error::PayloadTooLarge { .. })
        ));
    }
}
