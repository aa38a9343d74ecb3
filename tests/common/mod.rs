//! 통합 테스트 공용 도구
//!
//! - 수신자 태스크 실행
//! - 지정한 데이터그램을 버리거나 손상시키는 UDP 릴레이

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use p2mp::{Config, FileReceiver, ReceiveSummary};

/// 재현 가능한 테스트 데이터
pub fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// 짧은 타임아웃의 송신 설정
pub fn fast_sender_config(mss: usize) -> Config {
    Config {
        mss,
        ack_timeout_ms: 15,
        max_ack_timeout_ms: 60,
        max_retries: Some(100),
        ..Config::default()
    }
}

/// 수신 설정
pub fn receiver_config(loss_probability: f64, seed: u64, linger_ms: u64) -> Config {
    Config {
        loss_probability,
        loss_seed: Some(seed),
        eos_linger_ms: linger_ms,
        ..Config::default()
    }
}

pub type ReceiverTask = JoinHandle<p2mp::Result<(Vec<u8>, ReceiveSummary)>>;

/// 루프백에 수신자를 띄우고 메모리로 수신
pub async fn spawn_receiver(config: Config) -> (SocketAddr, ReceiverTask) {
    let receiver = FileReceiver::bind(config, Ipv4Addr::LOCALHOST, 0)
        .await
        .unwrap();
    let addr = receiver.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let mut sink = Vec::new();
        let summary = receiver.receive(&mut sink).await?;
        Ok((sink, summary))
    });

    (addr, task)
}

/// 릴레이 방향별 조작 계획 (방향별 데이터그램 순번, 0부터)
#[derive(Debug, Default, Clone)]
pub struct RelayPlan {
    pub drop_to_receiver: HashSet<usize>,
    pub corrupt_to_receiver: HashSet<usize>,
    pub drop_to_sender: HashSet<usize>,
}

/// 릴레이 통과량
#[derive(Debug, Default)]
pub struct RelayCounters {
    pub to_receiver: AtomicUsize,
    pub to_sender: AtomicUsize,
}

/// 송신자와 수신자 사이의 UDP 릴레이
pub struct LossyRelay {
    pub addr: SocketAddr,
    pub counters: Arc<RelayCounters>,
    task: JoinHandle<()>,
}

impl LossyRelay {
    pub async fn start(receiver: SocketAddr, plan: RelayPlan) -> Self {
        let front = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let back = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        back.connect(receiver).await.unwrap();

        let addr = front.local_addr().unwrap();
        let counters = Arc::new(RelayCounters::default());
        let task_counters = counters.clone();

        let task = tokio::spawn(async move {
            let mut front_buf = vec![0u8; 65535];
            let mut back_buf = vec![0u8; 65535];
            let mut sender_addr: Option<SocketAddr> = None;

            loop {
                tokio::select! {
                    result = front.recv_from(&mut front_buf) => {
                        let Ok((len, from)) = result else { continue };
                        sender_addr = Some(from);

                        let index = task_counters.to_receiver.fetch_add(1, Ordering::SeqCst);
                        if plan.drop_to_receiver.contains(&index) {
                            continue;
                        }

                        let datagram = &mut front_buf[..len];
                        if plan.corrupt_to_receiver.contains(&index) {
                            // 페이로드가 있으면 마지막 바이트, 없으면 체크섬 필드
                            let at = if len > 8 { len - 1 } else { 4 };
                            datagram[at] ^= 0x40;
                        }
                        let _ = back.send(datagram).await;
                    }
                    result = back.recv(&mut back_buf) => {
                        let Ok(len) = result else { continue };

                        let index = task_counters.to_sender.fetch_add(1, Ordering::SeqCst);
                        if plan.drop_to_sender.contains(&index) {
                            continue;
                        }
                        if let Some(to) = sender_addr {
                            let _ = front.send_to(&back_buf[..len], to).await;
                        }
                    }
                }
            }
        });

        Self {
            addr,
            counters,
            task,
        }
    }

    pub fn to_receiver(&self) -> usize {
        self.counters.to_receiver.load(Ordering::SeqCst)
    }

    pub fn to_sender(&self) -> usize {
        self.counters.to_sender.load(Ordering::SeqCst)
    }
}

impl Drop for LossyRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}
