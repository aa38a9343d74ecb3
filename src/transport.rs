//! UDP 전송 바인딩
//!
//! - 송신측: 수신자마다 connect된 소켓 하나 ([`DatagramLink`])
//! - 수신측: 로컬 IPv4 주소 탐색 후 바인딩

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::packet::{Packet, MAX_DATAGRAM_SIZE};
use crate::{Error, Result};

/// 로컬/원격 주소 쌍에 묶인 비신뢰 데이터그램 링크
pub struct DatagramLink {
    socket: UdpSocket,
    remote: SocketAddr,
    buf: Vec<u8>,
}

impl DatagramLink {
    /// 임의 로컬 포트에서 원격 주소로 연결
    ///
    /// 수신 버퍼는 `buffer_size` 바이트 (최대 [`MAX_DATAGRAM_SIZE`]). 더 긴 데이터그램은
    /// 잘린 채로 읽힌다.
    pub async fn connect(remote: SocketAddr, buffer_size: usize) -> Result<Self> {
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        Self::bind(local, remote, buffer_size).await
    }

    /// 지정 로컬 주소에서 원격 주소로 연결
    pub async fn bind(local: SocketAddr, remote: SocketAddr, buffer_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        // connect 이후 커널이 다른 주소에서 온 데이터그램을 걸러낸다
        socket.connect(remote).await?;

        Ok(Self {
            socket,
            remote,
            buf: vec![0u8; buffer_size.min(MAX_DATAGRAM_SIZE)],
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 패킷 전송 (논블로킹, 전달 보장 없음)
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        match self.socket.send(&bytes).await {
            Ok(_) => Ok(()),
            // 원격이 아직 떠 있지 않음: 손실과 동일하게 취급
            Err(e) if is_transient(&e) => {
                debug!("{} 전송 실패 (손실로 처리): {}", self.remote, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `deadline`까지 패킷 하나 수신
    ///
    /// 타임아웃이면 `Ok(None)`. 헤더보다 짧거나 타입 태그를 모르는 데이터그램은 건너뛴다.
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Packet>> {
        loop {
            let len = match tokio::time::timeout_at(deadline, self.socket.recv(&mut self.buf)).await
            {
                Err(_) => return Ok(None),
                Ok(Ok(len)) => len,
                Ok(Err(e)) if is_transient(&e) => {
                    debug!("{} 수신 에러 (타임아웃으로 처리): {}", self.remote, e);
                    tokio::time::sleep_until(deadline).await;
                    return Ok(None);
                }
                Ok(Err(e)) => return Err(e.into()),
            };

            match Packet::from_bytes(&self.buf[..len]) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => trace!("{}에서 잘못된 데이터그램 ({} bytes): {}", self.remote, len, e),
            }
        }
    }
}

/// ICMP port unreachable 등 재시도로 해소될 수 있는 에러
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

/// 수신측 소켓 바인딩
pub async fn bind_receiver(ip: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(ip), port)).await?;
    Ok(socket)
}

/// 로컬 IPv4 주소 탐색
///
/// - IPv4 주소 문자열이면 그대로 사용
/// - `lo` / `localhost`는 루프백
/// - 그 외 이름은 호스트 인터페이스 목록에서 찾아 첫 IPv4 주소 (없으면 에러)
/// - None이면 외부로 나가는 경로의 소스 주소 (UDP connect, 실제 송신 없음)
pub async fn discover_local_ipv4(interface: Option<&str>) -> Result<Ipv4Addr> {
    match interface {
        Some(name) => interface_ipv4(name),
        None => default_route_ipv4().await,
    }
}

fn interface_ipv4(name: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = name.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    if name == "lo" || name == "localhost" {
        return Ok(Ipv4Addr::LOCALHOST);
    }

    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| Error::NoLocalAddress(format!("인터페이스 목록 조회 실패: {}", e)))?;

    let found = interfaces
        .iter()
        .filter(|iface| iface.name == name)
        .find_map(|iface| match iface.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        });

    match found {
        Some(ip) => {
            debug!("인터페이스 {}: {}", name, ip);
            Ok(ip)
        }
        None => Err(Error::NoLocalAddress(format!(
            "인터페이스 {}에 IPv4 주소 없음",
            name
        ))),
    }
}

async fn default_route_ipv4() -> Result<Ipv4Addr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    probe
        .connect((Ipv4Addr::new(8, 8, 8, 8), 80))
        .await
        .map_err(|e| Error::NoLocalAddress(e.to_string()))?;

    match probe.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(Error::NoLocalAddress(format!("탐색 결과 {}", other))),
    }
}
