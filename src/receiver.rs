//! 수신자 (서버측)
//!
//! - 순서대로 도착한 DATA만 싱크에 기록
//! - 중복/순서 어긋남은 마지막으로 수락한 번호로 재-ACK
//! - 체크섬 불일치, 손실 시뮬레이션은 조용히 버림 (송신측 타임아웃이 복구)
//! - 0바이트 DATA 수락 시 스트림 종료

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::packet::{AckPacket, DataPacket, Packet, INVALID_SEQUENCE};
use crate::stats::ReceiverStats;
use crate::transport;
use crate::{Config, Error, Result};

/// 수신측 손실 시뮬레이터
///
/// RNG를 주입받으므로 시드를 고정하면 손실 패턴이 재현된다.
#[derive(Debug, Clone)]
pub struct LossSimulator {
    probability: f64,
    rng: StdRng,
}

impl LossSimulator {
    pub fn new(probability: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng,
        }
    }

    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self::new(probability, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(probability: f64) -> Self {
        Self::new(probability, StdRng::from_entropy())
    }

    /// 손실 없음
    pub fn disabled() -> Self {
        Self::seeded(0.0, 0)
    }

    pub fn from_config(config: &Config) -> Self {
        match config.loss_seed {
            Some(seed) => Self::seeded(config.loss_probability, seed),
            None => Self::from_entropy(config.loss_probability),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// [0, 100) 균등 추첨값이 `probability * 100` 미만이면 손실
    pub fn should_drop(&mut self) -> bool {
        if self.probability <= 0.0 {
            return false;
        }
        let draw: f64 = self.rng.gen_range(0.0..100.0);
        draw < self.probability * 100.0
    }
}

/// DATA 패킷 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 기대한 시퀀스: ACK 후 페이로드 기록
    Accept {
        ack: AckPacket,
        payload: Bytes,
        end_of_stream: bool,
    },

    /// 중복 또는 순서 어긋남: 마지막 수락 번호로 재-ACK, 기록 없음
    Reack(AckPacket),

    /// 체크섬 불일치
    Corrupted,

    /// 손실 시뮬레이션
    Lost,
}

/// 수신 세션 상태 (I/O 없음)
#[derive(Debug)]
pub struct ReceiverSession {
    expected: i32,
    last_accepted: i32,
    finished: bool,
    loss: LossSimulator,
    stats: ReceiverStats,
}

impl ReceiverSession {
    pub fn new(loss: LossSimulator) -> Self {
        Self {
            expected: 0,
            last_accepted: INVALID_SEQUENCE,
            finished: false,
            loss,
            stats: ReceiverStats::default(),
        }
    }

    pub fn expected_sequence(&self) -> i32 {
        self.expected
    }

    pub fn last_accepted_sequence(&self) -> i32 {
        self.last_accepted
    }

    /// 종료 마커를 수락했는지
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// DATA 패킷 하나 처리
    ///
    /// 종료 이후에는 어떤 패킷도 수락하지 않고 재-ACK만 한다.
    pub fn handle(&mut self, packet: &DataPacket) -> Verdict {
        if !packet.verify() {
            self.stats.corrupted += 1;
            return Verdict::Corrupted;
        }

        if self.loss.should_drop() {
            self.stats.simulated_losses += 1;
            return Verdict::Lost;
        }

        if !self.finished && packet.sequence == self.expected {
            let ack = AckPacket::new(self.expected);
            self.last_accepted = self.expected;
            self.expected += 1;
            self.stats.accepted += 1;

            let end_of_stream = packet.is_end_of_stream();
            if end_of_stream {
                self.finished = true;
            }

            Verdict::Accept {
                ack,
                payload: packet.payload.clone(),
                end_of_stream,
            }
        } else {
            self.stats.out_of_sequence += 1;
            Verdict::Reack(AckPacket::new(self.last_accepted))
        }
    }
}

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiveSummary {
    /// 마지막으로 DATA를 보낸 송신자 주소
    pub sender: Option<SocketAddr>,

    /// 종료 마커의 시퀀스 번호
    pub final_sequence: i32,

    pub stats: ReceiverStats,
}

/// 스트림 종료까지 수신
///
/// 종료 마커를 수락하면 싱크를 flush한 뒤 `linger` 동안 소켓을 유지하며
/// 재전송된 패킷에 재-ACK한다. 마지막 ACK가 유실된 송신자를 위한 것.
/// `buffer_size`보다 긴 데이터그램은 잘려서 체크섬 검사에서 버려진다.
pub async fn receive_loop<W>(
    socket: &UdpSocket,
    sink: &mut W,
    session: &mut ReceiverSession,
    linger: Duration,
    buffer_size: usize,
) -> Result<ReceiveSummary>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut sender = None;

    while !session.is_finished() {
        let (len, from) = socket.recv_from(&mut buf).await?;
        if handle_datagram(socket, sink, session, &buf[..len], from).await? {
            sender = Some(from);
        }
    }

    let final_sequence = session.last_accepted_sequence();
    info!(
        "스트림 종료: sequence={}, {} bytes",
        final_sequence, session.stats.bytes_written
    );

    if !linger.is_zero() {
        let deadline = Instant::now() + linger;
        loop {
            let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(result) => result?,
            };
            handle_datagram(socket, sink, session, &buf[..len], from).await?;
        }
        trace!("linger 종료");
    }

    Ok(ReceiveSummary {
        sender,
        final_sequence,
        stats: session.stats.clone(),
    })
}

/// 데이터그램 하나 처리. 새 데이터를 수락했으면 true.
async fn handle_datagram<W>(
    socket: &UdpSocket,
    sink: &mut W,
    session: &mut ReceiverSession,
    bytes: &[u8],
    from: SocketAddr,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let data = match Packet::from_bytes(bytes) {
        Ok(Packet::Data(data)) => data,
        Ok(Packet::Ack(ack)) => {
            debug!("{}에서 ACK 수신 (무시): sequence={}", from, ack.sequence);
            return Ok(false);
        }
        Err(Error::Truncated { len, .. }) => {
            debug!("{}에서 잘린 데이터그램 버림: {} bytes", from, len);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    match session.handle(&data) {
        Verdict::Corrupted => {
            debug!("체크섬 불일치, 버림: sequence={}", data.sequence);
            Ok(false)
        }
        Verdict::Lost => {
            debug!("손실 시뮬레이션, 버림: sequence={}", data.sequence);
            Ok(false)
        }
        Verdict::Reack(ack) => {
            debug!(
                "순서 어긋남: got {}, expected {}, 재-ACK {}",
                data.sequence,
                session.expected_sequence(),
                ack.sequence
            );
            send_ack(socket, session, ack, from).await?;
            Ok(false)
        }
        Verdict::Accept {
            ack,
            payload,
            end_of_stream,
        } => {
            send_ack(socket, session, ack, from).await?;

            if end_of_stream {
                sink.flush().await?;
            } else {
                sink.write_all(&payload).await?;
                session.stats.bytes_written += payload.len() as u64;
                trace!("sequence={} 기록: {} bytes", ack.sequence, payload.len());
            }
            Ok(true)
        }
    }
}

async fn send_ack(
    socket: &UdpSocket,
    session: &mut ReceiverSession,
    ack: AckPacket,
    to: SocketAddr,
) -> Result<()> {
    let bytes = Packet::Ack(ack).to_bytes()?;
    socket.send_to(&bytes, to).await?;
    session.stats.acks_sent += 1;
    Ok(())
}

/// 간단한 파일 수신용 수신자
pub struct FileReceiver {
    socket: UdpSocket,
    config: Config,
}

impl FileReceiver {
    /// 지정 IPv4 주소/포트에 바인딩
    pub async fn bind(config: Config, ip: Ipv4Addr, port: u16) -> Result<Self> {
        config.validate()?;
        let socket = transport::bind_receiver(ip, port).await?;
        Ok(Self { socket, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 임의 싱크로 수신
    pub async fn receive<W>(&self, sink: &mut W) -> Result<ReceiveSummary>
    where
        W: AsyncWrite + Unpin,
    {
        let mut session = ReceiverSession::new(LossSimulator::from_config(&self.config));
        info!(
            "P2MP Receiver listening on {} (loss={:.1}%)",
            self.local_addr()?,
            self.config.loss_probability * 100.0
        );
        receive_loop(
            &self.socket,
            sink,
            &mut session,
            self.config.eos_linger(),
            self.config.recv_buffer_size,
        )
        .await
    }

    /// 파일로 수신
    pub async fn receive_to_file(&self, path: impl AsRef<Path>) -> Result<ReceiveSummary> {
        let mut file = tokio::fs::File::create(path.as_ref()).await?;
        let summary = self.receive(&mut file).await?;
        file.sync_all().await?;
        Ok(summary)
    }
}
