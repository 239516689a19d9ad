//! UDP message framing (spec §4.1): broadcast advertisement, discovery
//! request pair, device info, and event notification.

use std::net::Ipv4Addr;

use super::constants::*;
use super::types::ApplianceDescriptor;
use crate::error::ScanError;

fn ip_from_be_bytes(b: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(b[0], b[1], b[2], b[3])
}

fn null_terminated_ascii(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).into_owned()
}

/// Scanner → broadcast, UDP:53220, 48 bytes.
#[derive(Debug, Clone)]
pub struct BroadcastAdvertisement {
    pub device_ip: Ipv4Addr,
    pub device_id: [u8; 6],
}

impl BroadcastAdvertisement {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < BROADCAST_ADVERTISEMENT_SIZE || &data[4..8] != MAGIC {
            return Err(ScanError::MalformedPacket("broadcast advertisement"));
        }
        let cmd = u32::from_be_bytes(data[8..12].try_into().unwrap());
        if cmd != 0x21 {
            return Err(ScanError::MalformedPacket("unexpected broadcast command"));
        }
        let device_ip = ip_from_be_bytes(&data[20..24]);
        let mut device_id = [0u8; 6];
        device_id.copy_from_slice(&data[24..30]);
        Ok(Self {
            device_ip,
            device_id,
        })
    }
}

/// Client → appliance, UDP:52217, sent as a VENS/ssNR pair (32 bytes each).
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub client_ip: Ipv4Addr,
    pub token: [u8; 8],
    pub client_port: u16,
    /// 0 = discovery, 1 = heartbeat.
    pub heartbeat: bool,
}

impl DiscoveryRequest {
    pub fn encode_vens(&self) -> [u8; DISCOVERY_REQUEST_SIZE] {
        let mut buf = [0u8; DISCOVERY_REQUEST_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        let flags: u32 = if self.heartbeat { 1 } else { 0 };
        buf[4..8].copy_from_slice(&flags.to_be_bytes());
        buf[8..12].copy_from_slice(&self.client_ip.octets());
        buf[12..20].copy_from_slice(&self.token);
        buf[22..24].copy_from_slice(&self.client_port.to_be_bytes());
        buf[24..32].copy_from_slice(&[0x00, 0x10, 0, 0, 0, 0, 0, 0]);
        buf
    }

    pub fn encode_ssnr(&self) -> [u8; DISCOVERY_REQUEST_SIZE] {
        let mut buf = [0u8; DISCOVERY_REQUEST_SIZE];
        buf[0..4].copy_from_slice(MAGIC_SSNR);
        buf[8..12].copy_from_slice(&self.client_ip.octets());
        buf[12..20].copy_from_slice(&self.token);
        buf[22..24].copy_from_slice(&self.client_port.to_be_bytes());
        buf[24..32].copy_from_slice(&[0x01, 0, 0, 0, 0, 0, 0, 0]);
        buf
    }
}

/// Appliance → client, UDP:55264, 132 bytes.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub descriptor: ApplianceDescriptor,
}

impl DeviceInfo {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < DEVICE_INFO_SIZE || &data[0..4] != MAGIC {
            return Err(ScanError::MalformedPacket("device info"));
        }
        let paired = u16::from_be_bytes(data[4..6].try_into().unwrap()) != 0;
        let protocol_version = u16::from_be_bytes(data[8..10].try_into().unwrap());
        let device_ip = ip_from_be_bytes(&data[16..20]);
        let data_port = u16::from_be_bytes(data[22..24].try_into().unwrap());
        let control_port = u16::from_be_bytes(data[26..28].try_into().unwrap());
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[28..34]);
        let state = u32::from_be_bytes(data[36..40].try_into().unwrap());
        let serial = null_terminated_ascii(&data[40..104]);
        let name = null_terminated_ascii(&data[104..120]);
        let client_ip_raw = &data[120..124];
        let reserving_client_ip = if client_ip_raw == [0, 0, 0, 0] {
            None
        } else {
            Some(ip_from_be_bytes(client_ip_raw))
        };

        Ok(Self {
            descriptor: ApplianceDescriptor {
                name,
                serial,
                mac,
                device_ip,
                data_port,
                control_port,
                paired,
                protocol_version,
                state,
                reserving_client_ip,
            },
        })
    }
}

/// Appliance → client, UDP:55265, 48 bytes.
#[derive(Debug, Clone, Copy)]
pub struct EventNotification {
    pub event_type: u32,
    pub event_data: u32,
}

impl EventNotification {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < EVENT_NOTIFICATION_SIZE || &data[4..8] != MAGIC {
            return Err(ScanError::MalformedPacket("event notification"));
        }
        let event_type = u32::from_be_bytes(data[8..12].try_into().unwrap());
        let event_data = u32::from_be_bytes(data[16..20].try_into().unwrap());
        Ok(Self {
            event_type,
            event_data,
        })
    }
}

/// A Heartbeat Ack (12 bytes, UDP:55264) carries no information worth
/// decoding; callers only need to distinguish it from a Device Info reply
/// by length.
pub fn is_heartbeat_ack(data: &[u8]) -> bool {
    data.len() == HEARTBEAT_ACK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device_info() -> Vec<u8> {
        let mut buf = vec![0u8; DEVICE_INFO_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&1u16.to_be_bytes()); // paired
        buf[8..10].copy_from_slice(&4u16.to_be_bytes()); // version
        buf[16..20].copy_from_slice(&[192, 168, 0, 176]);
        buf[22..24].copy_from_slice(&53218u16.to_be_bytes());
        buf[26..28].copy_from_slice(&53219u16.to_be_bytes());
        buf[28..34].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        buf[36..40].copy_from_slice(&0u32.to_be_bytes());
        let serial = b"iX500-AK6ABB0700";
        buf[40..40 + serial.len()].copy_from_slice(serial);
        let name = b"iX500";
        buf[104..104 + name.len()].copy_from_slice(name);
        // client ip left zeroed
        buf
    }

    /// S1 — Device-Info decode.
    #[test]
    fn decodes_device_info_field_for_field() {
        let data = sample_device_info();
        let info = DeviceInfo::decode(&data).unwrap();
        let d = info.descriptor;
        assert!(d.paired);
        assert_eq!(d.protocol_version, 4);
        assert_eq!(d.device_ip, Ipv4Addr::new(192, 168, 0, 176));
        assert_eq!(d.data_port, 53218);
        assert_eq!(d.control_port, 53219);
        assert_eq!(d.mac_string(), "00:11:22:33:44:55");
        assert_eq!(d.state, 0);
        assert_eq!(d.serial, "iX500-AK6ABB0700");
        assert_eq!(d.name, "iX500");
        assert_eq!(d.reserving_client_ip, None);
    }

    #[test]
    fn rejects_short_or_bad_magic() {
        let mut data = sample_device_info();
        data.truncate(10);
        assert!(DeviceInfo::decode(&data).is_err());

        let mut data = sample_device_info();
        data[0] = b'X';
        assert!(DeviceInfo::decode(&data).is_err());
    }

    #[test]
    fn discovery_request_vens_and_ssnr_differ_only_in_flags_and_magic() {
        let req = DiscoveryRequest {
            client_ip: Ipv4Addr::new(10, 0, 0, 5),
            token: [1, 2, 3, 4, 5, 6, 0, 0],
            client_port: CLIENT_DISCOVERY_PORT,
            heartbeat: false,
        };
        let vens = req.encode_vens();
        let ssnr = req.encode_ssnr();
        assert_eq!(&vens[0..4], MAGIC);
        assert_eq!(&ssnr[0..4], MAGIC_SSNR);
        assert_eq!(&vens[12..20], &req.token);
        assert_eq!(&ssnr[12..20], &req.token);
    }
}
