//! Control channel (TCP:53219) message framing (spec §4.1).

use std::net::Ipv4Addr;

use super::constants::*;
use super::types::Identity;
use crate::error::ScanError;

const CMD_RESERVE: u32 = 0x11;
const CMD_RELEASE: u32 = 0x12;
const CMD_GET_WIFI_STATUS: u32 = 0x30;

fn write_header(buf: &mut [u8], total_len: u32, command: u32, token: &[u8; 8]) {
    buf[0..4].copy_from_slice(&total_len.to_be_bytes());
    buf[4..8].copy_from_slice(MAGIC);
    buf[8..12].copy_from_slice(&command.to_be_bytes());
    buf[12..16].copy_from_slice(&0u32.to_be_bytes());
    buf[16..24].copy_from_slice(token);
}

/// Client → appliance, 384 bytes, cmd=0x11. Reserves the appliance for this
/// session's token and identity.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub token: [u8; 8],
    pub client_ip: Ipv4Addr,
    pub notify_port: u16,
    pub identity: Identity,
    /// Local wall-clock date/time, packed at +100..107.
    pub timestamp: (u16, u8, u8, u8, u8, u8), // year, month, day, hour, minute, second
}

impl ReserveRequest {
    pub fn encode(&self) -> [u8; RESERVE_SIZE] {
        let mut buf = [0u8; RESERVE_SIZE];
        write_header(&mut buf, RESERVE_SIZE as u32, CMD_RESERVE, &self.token);

        buf[32..36].copy_from_slice(&RESERVE_CONFIG_WORD_32.to_be_bytes());
        buf[36..40].copy_from_slice(&RESERVE_CONFIG_WORD_36.to_be_bytes());
        buf[40..44].copy_from_slice(&RESERVE_CONFIG_WORD_40.to_be_bytes());

        buf[44..48].copy_from_slice(&self.client_ip.octets());
        buf[50..52].copy_from_slice(&self.notify_port.to_be_bytes());

        let id_bytes = self.identity.as_str().as_bytes();
        let len = id_bytes.len().min(Identity::MAX_LEN);
        buf[52..52 + len].copy_from_slice(&id_bytes[..len]);

        let (year, month, day, hour, minute, second) = self.timestamp;
        buf[100..102].copy_from_slice(&year.to_be_bytes());
        buf[102] = month;
        buf[103] = day;
        buf[104] = hour;
        buf[105] = minute;
        buf[106] = second;

        buf[116..120].copy_from_slice(&RESERVE_MAGIC_TAIL.to_be_bytes());
        buf
    }
}

/// Decoded Reserve response: zero accepted, non-zero rejected (spec §4.1).
#[derive(Debug, Clone, Copy)]
pub struct ReserveResponse {
    pub status: i32,
}

impl ReserveResponse {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < 12 {
            return Err(ScanError::MalformedPacket("reserve response"));
        }
        let status = i32::from_be_bytes(data[8..12].try_into().unwrap());
        Ok(Self { status })
    }

    pub fn accepted(&self) -> bool {
        self.status == 0
    }
}

/// Client → appliance, 32 bytes, cmd=0x12. `action`: 1 = register,
/// 0 = deregister (release). The response is a fixed 16-byte acknowledgement,
/// not length-prefixed.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseRequest {
    pub token: [u8; 8],
    pub action: u32,
}

impl ReleaseRequest {
    pub fn register(token: [u8; 8]) -> Self {
        Self { token, action: 1 }
    }

    pub fn deregister(token: [u8; 8]) -> Self {
        Self { token, action: 0 }
    }

    pub fn encode(&self) -> [u8; RELEASE_SIZE] {
        let mut buf = [0u8; RELEASE_SIZE];
        write_header(&mut buf, RELEASE_SIZE as u32, CMD_RELEASE, &self.token);
        buf[24..28].copy_from_slice(&self.action.to_be_bytes());
        buf
    }
}

/// Client → appliance, 32 bytes, cmd=0x30.
#[derive(Debug, Clone, Copy)]
pub struct GetWifiStatusRequest {
    pub token: [u8; 8],
}

impl GetWifiStatusRequest {
    pub fn encode(&self) -> [u8; GET_WIFI_STATUS_SIZE] {
        let mut buf = [0u8; GET_WIFI_STATUS_SIZE];
        write_header(&mut buf, GET_WIFI_STATUS_SIZE as u32, CMD_GET_WIFI_STATUS, &self.token);
        buf
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetWifiStatusResponse {
    pub state: u32,
}

impl GetWifiStatusResponse {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < 20 {
            return Err(ScanError::MalformedPacket("wifi status response"));
        }
        let state = u32::from_be_bytes(data[16..20].try_into().unwrap());
        Ok(Self { state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("171136176174")
    }

    /// Invariant 1 & 2 from spec §8.
    #[test]
    fn reserve_request_header_invariants() {
        let req = ReserveRequest {
            token: [1, 2, 3, 4, 5, 6, 0, 0],
            client_ip: Ipv4Addr::new(192, 168, 0, 10),
            notify_port: CLIENT_NOTIFY_PORT,
            identity: identity(),
            timestamp: (2026, 7, 28, 10, 0, 0),
        };
        let buf = req.encode();
        assert_eq!(u32::from_be_bytes(buf[0..4].try_into().unwrap()), buf.len() as u32);
        assert_eq!(&buf[4..8], MAGIC);
        assert_eq!(&buf[16..24], &req.token);
        assert_eq!(u32::from_be_bytes(buf[32..36].try_into().unwrap()), RESERVE_CONFIG_WORD_32);
        assert_eq!(u32::from_be_bytes(buf[36..40].try_into().unwrap()), RESERVE_CONFIG_WORD_36);
        assert_eq!(u32::from_be_bytes(buf[40..44].try_into().unwrap()), RESERVE_CONFIG_WORD_40);
        assert_eq!(u32::from_be_bytes(buf[116..120].try_into().unwrap()), RESERVE_MAGIC_TAIL);
    }

    /// S6 — pairing rejection decode.
    #[test]
    fn reserve_response_negative_status_is_rejection() {
        let mut data = vec![0u8; 12];
        data[8..12].copy_from_slice(&(-1i32).to_be_bytes());
        let resp = ReserveResponse::decode(&data).unwrap();
        assert_eq!(resp.status, -1);
        assert!(!resp.accepted());
    }
}
