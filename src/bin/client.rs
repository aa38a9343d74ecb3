//! P2MP 클라이언트 (송신자)
//!
//! 파일 하나를 여러 수신자(p2mp-server)에게 stop-and-wait로 전송
//!
//! 예시:
//!   # 두 수신자에게 전송
//!   cargo run --release --bin p2mp-client -- 10.0.0.2 10.0.0.3 --port 7735 --file data.bin --mss 500
//!
//!   # 고정 타임아웃 + 무제한 재시도 + 순차 팬아웃
//!   cargo run --release --bin p2mp-client -- 127.0.0.1 -f data.bin --legacy

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use p2mp::{Config, FanOut, Sender, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_MSS, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "p2mp-client", about = "P2MP-FTP sender: one file to N receivers")]
struct Args {
    /// 수신자 주소 (순서대로 처리)
    #[arg(required = true)]
    receivers: Vec<IpAddr>,

    /// 수신자 공통 포트
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 전송할 파일
    #[arg(short, long)]
    file: PathBuf,

    /// 최대 세그먼트 크기 (바이트)
    #[arg(short, long, default_value_t = DEFAULT_MSS)]
    mss: usize,

    /// 초기 ACK 타임아웃 (밀리초)
    #[arg(long, default_value_t = DEFAULT_ACK_TIMEOUT_MS)]
    timeout_ms: u64,

    /// 세그먼트당 최대 재전송 횟수
    #[arg(long, conflicts_with = "unbounded")]
    max_retries: Option<u32>,

    /// 재시도 무제한
    #[arg(long)]
    unbounded: bool,

    /// 수신자를 하나씩 순서대로 처리
    #[arg(long)]
    sequential: bool,

    /// 고정 타임아웃, 무제한 재시도, 순차 팬아웃
    #[arg(long)]
    legacy: bool,
}

impl Args {
    fn to_config(&self) -> Config {
        let mut config = if self.legacy {
            Config::legacy()
        } else {
            Config::default()
        };

        config.mss = self.mss;
        config.ack_timeout_ms = self.timeout_ms;
        config.max_ack_timeout_ms = config.max_ack_timeout_ms.max(self.timeout_ms);
        if self.legacy {
            config.max_ack_timeout_ms = self.timeout_ms;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = Some(max_retries);
        }
        if self.unbounded {
            config.max_retries = None;
        }
        if self.sequential {
            config.fan_out = FanOut::Sequential;
        }
        config
    }

    fn receiver_addrs(&self) -> Vec<SocketAddr> {
        self.receivers
            .iter()
            .map(|ip| SocketAddr::new(*ip, self.port))
            .collect()
    }
}

async fn run(args: Args) -> p2mp::Result<bool> {
    let config = args.to_config();
    let receivers = args.receiver_addrs();

    info!("P2MP Client starting...");
    info!("Receivers: {:?}", receivers);
    info!("MSS: {} bytes", config.mss);
    info!(
        "ACK timeout: {}ms (max {}ms), retries: {}",
        config.ack_timeout_ms,
        config.max_ack_timeout_ms,
        config
            .max_retries
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );

    let sender = Sender::bind(config, &receivers).await?;
    let report = sender.send_file(&args.file).await?;

    for outcome in &report.receivers {
        info!(
            "  {}: {:?} (sent {}, retransmitted {}, timeouts {})",
            outcome.addr,
            outcome.status,
            outcome.stats.packets_sent,
            outcome.stats.retransmissions,
            outcome.stats.timeouts
        );
    }
    for failed in report.failed() {
        warn!("Receiver {} did not complete", failed.addr);
    }

    Ok(report.is_complete())
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
