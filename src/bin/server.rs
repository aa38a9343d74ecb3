//! P2MP 서버 (수신자)
//!
//! 로컬 IPv4 주소에 바인딩해 p2mp-client가 보내는 파일을 순서대로 기록
//!
//! 예시:
//!   # 5% 손실 시뮬레이션
//!   cargo run --release --bin p2mp-server -- --port 7735 --output received.bin --loss 0.05
//!
//!   # 루프백, 재현 가능한 손실 패턴
//!   cargo run --release --bin p2mp-server -- -o out.bin --loss 0.2 --interface lo --seed 42

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use p2mp::transport::discover_local_ipv4;
use p2mp::{Config, FileReceiver, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "p2mp-server", about = "P2MP-FTP receiver: writes one incoming file")]
struct Args {
    /// 수신 포트
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 출력 파일
    #[arg(short, long)]
    output: PathBuf,

    /// 손실 시뮬레이션 확률 (0.0 ~ 1.0)
    #[arg(short, long, default_value_t = 0.0)]
    loss: f64,

    /// 선호 인터페이스 (이름 또는 IPv4 주소)
    #[arg(short, long)]
    interface: Option<String>,

    /// 바인드 주소 직접 지정 (탐색 생략)
    #[arg(short, long)]
    bind: Option<Ipv4Addr>,

    /// 손실 시뮬레이션 RNG 시드
    #[arg(long)]
    seed: Option<u64>,

    /// 종료 마커 수락 후 재전송에 응답하는 시간 (밀리초)
    #[arg(long)]
    linger_ms: Option<u64>,
}

async fn run(args: Args) -> p2mp::Result<()> {
    let mut config = Config {
        loss_probability: args.loss,
        loss_seed: args.seed,
        ..Config::default()
    };
    if let Some(linger_ms) = args.linger_ms {
        config.eos_linger_ms = linger_ms;
    }

    let ip = match args.bind {
        Some(ip) => ip,
        None => discover_local_ipv4(args.interface.as_deref()).await?,
    };

    info!("P2MP Server starting...");
    info!("Output: {:?}", args.output);

    let receiver = FileReceiver::bind(config, ip, args.port).await?;
    let summary = receiver.receive_to_file(&args.output).await?;

    info!("Transfer complete!");
    if let Some(sender) = summary.sender {
        info!("  Sender: {}", sender);
    }
    info!("  Final sequence: {}", summary.final_sequence);
    info!("  {}", summary.stats.summary());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
