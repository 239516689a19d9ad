//! UDP discovery service (spec §4.2): appliance lookup, heartbeat
//! keep-alive, and scan-button event notification.
//!
//! Adapted from a symmetric peer-announce protocol to a request/response
//! one: we send a request and wait for exactly one typed reply, rather
//! than maintaining a live peer map.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use log::{debug, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::wire::constants::*;
use crate::wire::udp::{BroadcastAdvertisement, DeviceInfo, DiscoveryRequest, EventNotification};
use crate::wire::ApplianceDescriptor;

/// Bind a UDP socket with `SO_REUSEADDR` (and `SO_REUSEPORT` where available)
/// so repeated discovery/heartbeat sockets on the same machine don't fight
/// over the fixed client ports the appliance expects replies on.
pub async fn bind_reusable_udp(port: u16) -> Result<UdpSocket, ScanError> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(not(target_os = "windows"))]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(SocketAddr::V4(addr)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(ScanError::from)
}

/// Determine the local IP address used for LAN traffic by connecting a UDP
/// socket to an arbitrary LAN address and inspecting its local endpoint —
/// no packets are actually sent. Falls back to `0.0.0.0` if undeterminable
/// (e.g. no network interface is up).
pub async fn local_ip() -> Ipv4Addr {
    match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(sock) => {
            if sock.connect((Ipv4Addr::new(192, 168, 0, 1), 80)).await.is_ok() {
                if let Ok(SocketAddr::V4(addr)) = sock.local_addr() {
                    return *addr.ip();
                }
            }
            Ipv4Addr::UNSPECIFIED
        }
        Err(_) => Ipv4Addr::UNSPECIFIED,
    }
}

/// Sends a VENS+ssNR discovery request pair and waits for a Device Info
/// reply, either from a specific `target_ip` or, when `target_ip` is `None`,
/// as a limited + subnet broadcast.
pub async fn find_appliance(
    target_ip: Option<Ipv4Addr>,
    token: [u8; 8],
    timeout_duration: Duration,
) -> Result<ApplianceDescriptor, ScanError> {
    let socket = bind_reusable_udp(CLIENT_DISCOVERY_PORT).await?;
    let client_ip = local_ip().await;

    let request = DiscoveryRequest {
        client_ip,
        token,
        client_port: CLIENT_DISCOVERY_PORT,
        heartbeat: false,
    };

    match target_ip {
        Some(ip) => send_discovery_pair(&socket, &request, ip).await?,
        None => {
            send_discovery_pair(&socket, &request, Ipv4Addr::new(255, 255, 255, 255)).await?;
            if let Some(subnet) = subnet_broadcast(client_ip) {
                send_discovery_pair(&socket, &request, subnet).await?;
            }
        }
    }

    let mut buf = [0u8; 256];
    let deadline = tokio::time::Instant::now() + timeout_duration;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(ScanError::DiscoveryTimeout);
        }
        let (len, addr) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => return Err(ScanError::DiscoveryTimeout),
        };
        if len < 20 || &buf[0..4] != MAGIC {
            continue;
        }
        if len == HEARTBEAT_ACK_SIZE {
            debug!("heartbeat ack from {}", addr);
            continue;
        }
        if len >= DEVICE_INFO_SIZE {
            match DeviceInfo::decode(&buf[..len]) {
                Ok(info) => {
                    info!(
                        "discovered {} ({}) at {}",
                        info.descriptor.name, info.descriptor.serial, info.descriptor.device_ip
                    );
                    return Ok(info.descriptor);
                }
                Err(e) => {
                    debug!("malformed device info from {}: {}", addr, e);
                }
            }
        }
    }
}

async fn send_discovery_pair(
    socket: &UdpSocket,
    request: &DiscoveryRequest,
    target: Ipv4Addr,
) -> Result<(), ScanError> {
    let dest = SocketAddrV4::new(target, DISCOVERY_PORT);
    socket.send_to(&request.encode_vens(), dest).await?;
    socket.send_to(&request.encode_ssnr(), dest).await?;
    debug!("sent discovery request to {}", dest);
    Ok(())
}

fn subnet_broadcast(ip: Ipv4Addr) -> Option<Ipv4Addr> {
    if ip == Ipv4Addr::UNSPECIFIED {
        return None;
    }
    let octets = ip.octets();
    Some(Ipv4Addr::new(octets[0], octets[1], octets[2], 255))
}

/// Waits for an unsolicited Broadcast Advertisement on UDP:53220 (a
/// supplemental discovery mode: listen-only, no request sent).
pub async fn wait_for_broadcast(
    timeout_duration: Duration,
) -> Result<BroadcastAdvertisement, ScanError> {
    let socket = bind_reusable_udp(BROADCAST_PORT).await?;
    let mut buf = [0u8; 256];
    let (len, _addr) = timeout(timeout_duration, socket.recv_from(&mut buf))
        .await
        .map_err(|_| ScanError::DiscoveryTimeout)??;
    BroadcastAdvertisement::decode(&buf[..len])
}

/// Waits for a scan-button-press Event Notification on UDP:55265.
pub async fn wait_for_button(timeout_duration: Duration) -> Result<EventNotification, ScanError> {
    let socket = bind_reusable_udp(CLIENT_NOTIFY_PORT).await?;
    let mut buf = [0u8; 256];
    loop {
        let (len, addr) = timeout(timeout_duration, socket.recv_from(&mut buf))
            .await
            .map_err(|_| ScanError::DiscoveryTimeout)??;
        match EventNotification::decode(&buf[..len]) {
            Ok(event) => return Ok(event),
            Err(e) => debug!("ignoring malformed notification from {}: {}", addr, e),
        }
    }
}

/// Runs the heartbeat loop until `cancel` fires. Owns its UDP socket for the
/// entire lifetime of the session — no other task may bind the client
/// discovery port while a heartbeat is running.
///
/// Send failures are logged and tolerated: a single dropped heartbeat is not
/// fatal, the appliance's reservation timeout is generous relative to the
/// cadence.
pub async fn run_heartbeat(appliance_ip: Ipv4Addr, token: [u8; 8], cancel: CancellationToken) {
    let socket = match bind_reusable_udp(CLIENT_DISCOVERY_PORT).await {
        Ok(s) => s,
        Err(e) => {
            warn!("heartbeat socket bind failed: {}", e);
            return;
        }
    };
    let client_ip = local_ip().await;
    let request = DiscoveryRequest {
        client_ip,
        token,
        client_port: CLIENT_DISCOVERY_PORT,
        heartbeat: true,
    };
    let packet = request.encode_vens();
    let dest = SocketAddrV4::new(appliance_ip, DISCOVERY_PORT);

    let mut tick = interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    info!("heartbeat started to {}", dest);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                if let Err(e) = socket.send_to(&packet, dest).await {
                    warn!("heartbeat send failed: {}", e);
                }
            }
        }
    }

    debug!("heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_broadcast_replaces_last_octet() {
        let ip = Ipv4Addr::new(192, 168, 0, 42);
        assert_eq!(subnet_broadcast(ip), Some(Ipv4Addr::new(192, 168, 0, 255)));
    }

    #[test]
    fn subnet_broadcast_none_when_ip_unknown() {
        assert_eq!(subnet_broadcast(Ipv4Addr::UNSPECIFIED), None);
    }
}
