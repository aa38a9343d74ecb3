//! 송신자 (클라이언트측)
//!
//! - 파일을 MSS 단위 세그먼트로 분할, 시퀀스 0부터 순서대로 전송
//! - 수신자마다 독립적인 stop-and-wait 링크 (링크당 워커 태스크 하나)
//! - 모든 활성 링크가 현재 세그먼트를 마칠 때까지 다음 세그먼트로 넘어가지 않음
//! - 타임아웃마다 지수 백오프, 재시도 한도 초과 시 해당 수신자만 제외

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::FanOut;
use crate::packet::{DataPacket, Packet};
use crate::segment::SegmentPlan;
use crate::stats::{LinkStats, ReceiverOutcome, ReceiverStatus, TransferReport};
use crate::transport::DatagramLink;
use crate::{Config, Error, Result};

/// 세그먼트 하나에 대한 링크의 종료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 같은 시퀀스의 ACK 수신
    Acknowledged,

    /// INVALID_SEQUENCE ACK: 중간에 합류한 수신자, 이 세그먼트는 포기
    Abandoned,
}

/// 수신자 하나와의 stop-and-wait 링크
pub struct ReceiverLink {
    link: DatagramLink,
    config: Arc<Config>,
    stats: Arc<RwLock<LinkStats>>,
}

impl ReceiverLink {
    pub async fn connect(addr: SocketAddr, config: Arc<Config>) -> Result<Self> {
        let link = DatagramLink::connect(addr, config.recv_buffer_size).await?;
        debug!("링크 생성: {} -> {}", link.local_addr()?, addr);

        Ok(Self {
            link,
            config,
            stats: Arc::new(RwLock::new(LinkStats::default())),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.link.remote_addr()
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> LinkStats {
        self.stats.read().clone()
    }

    /// 세그먼트 하나를 이 수신자에게 확실히 전달
    ///
    /// 같은 시퀀스의 ACK가 오면 [`Delivery::Acknowledged`], 센티넬 ACK면
    /// [`Delivery::Abandoned`]. 다른 시퀀스의 ACK는 아직 미확인으로 보고 즉시 재전송,
    /// 타임아웃이면 백오프 후 재전송한다. 타임아웃 재전송을 `max_retries`번 한 뒤에도
    /// 확인이 없으면 [`Error::DeliveryFailed`].
    pub async fn deliver(&mut self, sequence: i32, payload: Bytes) -> Result<Delivery> {
        let payload_len = payload.len() as u64;
        let packet = Packet::Data(DataPacket::new(sequence, payload));

        let mut timeout = self.config.ack_timeout();
        let mut timeout_retries = 0u32;
        let mut resent = false;
        let sent_at = Instant::now();

        self.link.send(&packet).await?;
        self.stats.write().packets_sent += 1;

        loop {
            let deadline = Instant::now() + timeout;
            let mut stale_resent = false;

            // 타임아웃까지 ACK 대기
            loop {
                match self.link.recv_until(deadline).await? {
                    None => {
                        self.stats.write().timeouts += 1;
                        warn!(
                            "ACK 타임아웃: receiver={}, sequence={}, timeout={}ms",
                            self.addr(),
                            sequence,
                            timeout.as_millis()
                        );
                        timeout = self.config.next_timeout(timeout);
                        break;
                    }
                    Some(Packet::Ack(ack)) if ack.sequence == sequence => {
                        let mut stats = self.stats.write();
                        stats.segments_acknowledged += 1;
                        stats.bytes_acknowledged += payload_len;
                        if !resent {
                            stats.last_rtt = Some(sent_at.elapsed());
                        }
                        trace!("ACK: receiver={}, sequence={}", self.addr(), sequence);
                        return Ok(Delivery::Acknowledged);
                    }
                    Some(Packet::Ack(ack)) if ack.is_sentinel() => {
                        let mut stats = self.stats.write();
                        stats.sentinel_acks += 1;
                        stats.segments_abandoned += 1;
                        debug!(
                            "수신자 {} 기준 없음 (중간 합류), sequence={} 포기",
                            self.addr(),
                            sequence
                        );
                        return Ok(Delivery::Abandoned);
                    }
                    Some(Packet::Ack(ack)) => {
                        self.stats.write().stale_acks += 1;
                        debug!(
                            "시퀀스 불일치 ACK: receiver={}, got {}, waiting {}",
                            self.addr(),
                            ack.sequence,
                            sequence
                        );
                        // 대기 구간당 한 번만 즉시 재전송, 재시도 한도 미포함.
                        // 구간 수가 max_retries로 제한되므로 총 전송도 유한
                        if !stale_resent {
                            stale_resent = true;
                            resent = true;
                            self.retransmit(&packet).await?;
                        }
                    }
                    Some(Packet::Data(data)) => {
                        trace!("송신측에 DATA 도착 (무시): sequence={}", data.sequence);
                    }
                }
            }

            if let Some(max_retries) = self.config.max_retries {
                if timeout_retries >= max_retries {
                    return Err(Error::DeliveryFailed {
                        receiver: self.addr(),
                        sequence,
                        attempts: timeout_retries + 1,
                    });
                }
            }

            timeout_retries += 1;
            resent = true;
            self.retransmit(&packet).await?;
        }
    }

    async fn retransmit(&self, packet: &Packet) -> Result<()> {
        self.link.send(packet).await?;

        let mut stats = self.stats.write();
        stats.packets_sent += 1;
        stats.retransmissions += 1;
        Ok(())
    }
}

/// 워커에 넘기는 세그먼트
struct SegmentJob {
    sequence: i32,
    payload: Bytes,
}

/// 워커가 돌려주는 세그먼트 결과
struct LinkReport {
    index: usize,
    sequence: i32,
    result: Result<Delivery>,
}

/// 링크 워커 태스크: 세그먼트를 하나씩 받아 전달하고 결과 보고
async fn run_link(
    index: usize,
    mut link: ReceiverLink,
    mut jobs: mpsc::Receiver<SegmentJob>,
    reports: mpsc::Sender<LinkReport>,
) {
    while let Some(job) = jobs.recv().await {
        let result = link.deliver(job.sequence, job.payload).await;
        let failed = result.is_err();

        let report = LinkReport {
            index,
            sequence: job.sequence,
            result,
        };
        if reports.send(report).await.is_err() || failed {
            break;
        }
    }
}

/// 코디네이터가 보는 링크 상태
struct LinkHandle {
    addr: SocketAddr,
    stats: Arc<RwLock<LinkStats>>,
    jobs: Option<mpsc::Sender<SegmentJob>>,
    failure: Option<ReceiverStatus>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    fn is_active(&self) -> bool {
        self.failure.is_none()
    }

    fn fail(&mut self, sequence: i32, reason: String) {
        self.jobs = None;
        self.failure = Some(ReceiverStatus::Failed { sequence, reason });
    }
}

/// 세그먼트 팬아웃 + 배리어
struct Dispatcher {
    handles: Vec<LinkHandle>,
    reports: mpsc::Receiver<LinkReport>,
    mode: FanOut,
}

impl Dispatcher {
    fn spawn(links: Vec<ReceiverLink>, mode: FanOut) -> Self {
        let (report_tx, reports) = mpsc::channel(links.len().max(1));

        let handles = links
            .into_iter()
            .enumerate()
            .map(|(index, link)| {
                let (jobs_tx, jobs_rx) = mpsc::channel(1);
                let addr = link.addr();
                let stats = link.stats.clone();
                let task = tokio::spawn(run_link(index, link, jobs_rx, report_tx.clone()));
                LinkHandle {
                    addr,
                    stats,
                    jobs: Some(jobs_tx),
                    failure: None,
                    task,
                }
            })
            .collect();

        Self {
            handles,
            reports,
            mode,
        }
    }

    fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_active()).count()
    }

    /// 모든 활성 링크에 세그먼트를 보내고 각 링크가 끝날 때까지 대기
    ///
    /// 남은 활성 링크 수를 반환.
    async fn send_segment(&mut self, sequence: i32, payload: Bytes) -> Result<usize> {
        match self.mode {
            FanOut::Concurrent => {
                let mut pending = 0;
                for index in 0..self.handles.len() {
                    if self.dispatch(index, sequence, payload.clone()).await {
                        pending += 1;
                    }
                }
                for _ in 0..pending {
                    self.collect().await?;
                }
            }
            FanOut::Sequential => {
                for index in 0..self.handles.len() {
                    if self.dispatch(index, sequence, payload.clone()).await {
                        self.collect().await?;
                    }
                }
            }
        }

        Ok(self.active_count())
    }

    async fn dispatch(&mut self, index: usize, sequence: i32, payload: Bytes) -> bool {
        let handle = &mut self.handles[index];
        let Some(jobs) = handle.jobs.as_ref() else {
            return false;
        };

        if jobs.send(SegmentJob { sequence, payload }).await.is_err() {
            warn!("링크 워커 종료됨: receiver={}", handle.addr);
            handle.fail(sequence, Error::ChannelError.to_string());
            return false;
        }
        true
    }

    async fn collect(&mut self) -> Result<()> {
        let report = self.reports.recv().await.ok_or(Error::ChannelError)?;
        let handle = &mut self.handles[report.index];

        match report.result {
            Ok(Delivery::Acknowledged) => {}
            Ok(Delivery::Abandoned) => {
                debug!(
                    "sequence={} receiver={} 포기 (중간 합류)",
                    report.sequence, handle.addr
                );
            }
            Err(e) => {
                warn!("수신자 {} 제외: {}", handle.addr, e);
                handle.fail(report.sequence, e.to_string());
            }
        }
        Ok(())
    }

    /// 워커 종료 후 수신자별 결과 수집
    async fn finish(self) -> Vec<ReceiverOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());

        for mut handle in self.handles {
            handle.jobs = None;
            if let Err(e) = (&mut handle.task).await {
                warn!("링크 워커 비정상 종료: receiver={}, {}", handle.addr, e);
            }

            let stats = handle.stats.read().clone();
            outcomes.push(ReceiverOutcome {
                addr: handle.addr,
                status: handle.failure.unwrap_or(ReceiverStatus::Completed),
                stats,
            });
        }

        outcomes
    }
}

/// 송신자
pub struct Sender {
    config: Arc<Config>,
    links: Vec<ReceiverLink>,
}

impl Sender {
    /// 수신자별 링크 생성
    pub async fn bind(config: Config, receivers: &[SocketAddr]) -> Result<Self> {
        config.validate()?;

        if receivers.is_empty() {
            return Err(Error::NoReceivers);
        }
        if receivers.len() > config.max_receivers {
            return Err(Error::TooManyReceivers {
                count: receivers.len(),
                max: config.max_receivers,
            });
        }

        let config = Arc::new(config);
        let mut links = Vec::with_capacity(receivers.len());
        for &addr in receivers {
            links.push(ReceiverLink::connect(addr, config.clone()).await?);
        }

        Ok(Self { config, links })
    }

    pub fn receivers(&self) -> Vec<SocketAddr> {
        self.links.iter().map(ReceiverLink::addr).collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 파일 전송
    pub async fn send_file(self, path: impl AsRef<Path>) -> Result<TransferReport> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();

        info!("Loading file: {:?} ({} bytes)", path, length);
        self.transfer(file, length).await
    }

    /// `source`에서 `length` 바이트를 읽어 모든 수신자에게 전송
    ///
    /// 데이터 세그먼트 다음에 0바이트 종료 마커를 보낸다. 소스가 `length`보다 짧으면
    /// [`Error::ShortRead`]. 재시도 한도를 넘긴 수신자는 보고서에 `Failed`로 남는다.
    pub async fn transfer<R>(self, mut source: R, length: u64) -> Result<TransferReport>
    where
        R: AsyncRead + Unpin,
    {
        let plan = SegmentPlan::new(length, self.config.mss)?;
        let start = StdInstant::now();

        info!(
            "P2MP Sender: {} bytes, {} segments (+ end marker), {} receivers, mss={}, fan-out={:?}",
            length,
            plan.data_segments(),
            self.links.len(),
            self.config.mss,
            self.config.fan_out
        );

        let mut dispatcher = Dispatcher::spawn(self.links, self.config.fan_out);
        let total_segments = plan.total_segments();

        for segment in plan.iter() {
            let mut buf = vec![0u8; segment.len];
            source.read_exact(&mut buf).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::ShortRead {
                    sequence: segment.sequence,
                    expected: segment.len,
                },
                _ => Error::Io(e),
            })?;

            let active = dispatcher
                .send_segment(segment.sequence, Bytes::from(buf))
                .await?;

            if active == 0 {
                warn!("모든 수신자 실패, 전송 중단: sequence={}", segment.sequence);
                break;
            }

            let done = segment.sequence as u64 + 1;
            if done % 100 == 0 || done == total_segments {
                info!(
                    "Progress: segment {}/{} ({:.1}%)",
                    done,
                    total_segments,
                    done as f64 / total_segments as f64 * 100.0
                );
            }
        }

        let receivers = dispatcher.finish().await;
        let report = TransferReport {
            start_time: start,
            elapsed: start.elapsed(),
            total_bytes: length,
            total_segments,
            receivers,
        };

        info!("Transfer finished: {}", report.summary());
        Ok(report)
    }
}
