//! Control channel (TCP:53219) session management (spec §4.3).
//!
//! Each operation opens a fresh connection, reads the welcome prologue,
//! exchanges one request/response, and closes — matching the observed
//! protocol's lack of a persistent control connection.

use std::net::Ipv4Addr;

use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ScanError;
use crate::wire::constants::WELCOME_SIZE;
use crate::wire::control::{
    GetWifiStatusRequest, GetWifiStatusResponse, ReleaseRequest, ReserveRequest, ReserveResponse,
};
use crate::wire::welcome;
use crate::wire::{ApplianceStatus, Identity};

pub struct ControlSession {
    host: Ipv4Addr,
    port: u16,
}

impl ControlSession {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }

    async fn connect(&self) -> Result<TcpStream, ScanError> {
        let mut stream = TcpStream::connect((self.host, self.port)).await?;
        let mut welcome_buf = [0u8; WELCOME_SIZE];
        stream.read_exact(&mut welcome_buf).await?;
        welcome::validate(&welcome_buf)?;
        debug!("control channel connected to {}:{}", self.host, self.port);
        Ok(stream)
    }

    async fn send_recv(&self, data: &[u8]) -> Result<Vec<u8>, ScanError> {
        let mut stream = self.connect().await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        read_length_prefixed(&mut stream).await
    }

    async fn send_recv_fixed_ack(&self, data: &[u8]) -> Result<Vec<u8>, ScanError> {
        let mut stream = self.connect().await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        let mut buf = vec![0u8; 16];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Sends a Reserve request and returns whether the appliance accepted
    /// this identity/token pairing.
    pub async fn reserve(
        &self,
        token: [u8; 8],
        client_ip: Ipv4Addr,
        notify_port: u16,
        identity: Identity,
    ) -> Result<bool, ScanError> {
        let req = ReserveRequest {
            token,
            client_ip,
            notify_port,
            identity,
            timestamp: now_ymdhms(),
        };
        info!("reserving session (client_ip={}, port={})", client_ip, notify_port);
        let resp = self.send_recv(&req.encode()).await?;
        let resp = ReserveResponse::decode(&resp)?;
        if resp.accepted() {
            info!("pairing accepted");
        } else {
            info!("pairing rejected (status={})", resp.status);
        }
        Ok(resp.accepted())
    }

    /// Like [`Self::reserve`] but returns an error instead of `false` on
    /// rejection, for callers that treat rejection as fatal.
    pub async fn reserve_or_fail(
        &self,
        token: [u8; 8],
        client_ip: Ipv4Addr,
        notify_port: u16,
        identity: Identity,
    ) -> Result<(), ScanError> {
        let req = ReserveRequest {
            token,
            client_ip,
            notify_port,
            identity,
            timestamp: now_ymdhms(),
        };
        let resp = self.send_recv(&req.encode()).await?;
        let resp = ReserveResponse::decode(&resp)?;
        if resp.accepted() {
            Ok(())
        } else {
            Err(ScanError::PairingRejected(resp.status))
        }
    }

    pub async fn check_status(&self, token: [u8; 8]) -> Result<ApplianceStatus, ScanError> {
        let req = GetWifiStatusRequest { token };
        let resp = self.send_recv(&req.encode()).await?;
        let GetWifiStatusResponse { state } = GetWifiStatusResponse::decode(&resp)?;
        debug!("status: state={}", state);
        Ok(ApplianceStatus { state })
    }

    pub async fn register(&self, token: [u8; 8]) -> Result<(), ScanError> {
        info!("registering session");
        let req = ReleaseRequest::register(token);
        self.send_recv_fixed_ack(&req.encode()).await?;
        Ok(())
    }

    pub async fn deregister(&self, token: [u8; 8]) -> Result<(), ScanError> {
        info!("deregistering session");
        let req = ReleaseRequest::deregister(token);
        self.send_recv_fixed_ack(&req.encode()).await?;
        Ok(())
    }
}

async fn read_length_prefixed(stream: &mut TcpStream) -> Result<Vec<u8>, ScanError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let total_len = u32::from_be_bytes(len_buf) as usize;
    let mut rest = vec![0u8; total_len.saturating_sub(4)];
    stream.read_exact(&mut rest).await?;
    let mut buf = len_buf.to_vec();
    buf.extend(rest);
    Ok(buf)
}

fn now_ymdhms() -> (u16, u8, u8, u8, u8, u8) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    civil_from_unix(secs)
}

/// Converts a UNIX timestamp to (year, month, day, hour, minute, second) in
/// UTC, avoiding a chrono/time dependency for one call site.
fn civil_from_unix(secs: u64) -> (u16, u8, u8, u8, u8, u8) {
    let days = (secs / 86400) as i64;
    let rem = secs % 86400;
    let (hour, minute, second) = ((rem / 3600) as u8, ((rem % 3600) / 60) as u8, (rem % 60) as u8);

    // Howard Hinnant's days_from_civil inverse, days since 1970-01-01.
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = if month <= 2 { y + 1 } else { y };

    (year as u16, month, day, hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_unix_matches_known_date() {
        // 2024-01-15 12:30:45 UTC
        let (y, mo, d, h, mi, s) = civil_from_unix(1705321845);
        assert_eq!((y, mo, d, h, mi, s), (2024, 1, 15, 12, 30, 45));
    }
}
