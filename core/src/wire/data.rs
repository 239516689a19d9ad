//! Data channel (TCP:53218) message framing (spec §4.1, §4.4).

use super::constants::*;
use crate::error::ScanError;

const CMD_GET_SET: u32 = 0x06;
const CMD_CONFIG: u32 = 0x08;
const CMD_GET_STATUS: u32 = 0x0A;
const CMD_PAGE_TRANSFER: u32 = 0x0C;

const SUB_GET_DEVICE_INFO: u32 = 0x12;
const SUB_GET_SCAN_PARAMS: u32 = 0x90;
const SUB_GET_SCAN_SETTINGS: u32 = 0xD8;
const SUB_WRITE_TONE_CURVE: u32 = 0xDB;
const SUB_PREPARE_SCAN: u32 = 0xD5;
const SUB_WAIT_FOR_SCAN: u32 = 0xE0;
const SUB_END_SCAN: u32 = 0xD6;
const SUB_GET_PAGE_METADATA: u32 = 0x12;

fn write_data_header(buf: &mut [u8], total_len: u32, command: u32, token: &[u8; 8]) {
    buf[0..4].copy_from_slice(&total_len.to_be_bytes());
    buf[4..8].copy_from_slice(MAGIC);
    buf[8..12].copy_from_slice(&1u32.to_be_bytes()); // direction = client
    buf[12..16].copy_from_slice(&0u32.to_be_bytes());
    buf[16..24].copy_from_slice(token);
    buf[32..36].copy_from_slice(&command.to_be_bytes());
}

/// Builds a 0x06 (GET_SET) request carrying a seven-word parameter block,
/// the shape shared by every query/control sub-command on this channel.
fn get_set_request(token: &[u8; 8], words: [u32; 7]) -> Vec<u8> {
    let total = DATA_HEADER_SIZE + 28;
    let mut buf = vec![0u8; total];
    write_data_header(&mut buf, total as u32, CMD_GET_SET, token);
    for (i, word) in words.iter().enumerate() {
        let off = DATA_HEADER_SIZE + i * 4;
        buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
    }
    buf
}

pub fn get_device_info_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(
        token,
        [0x0000_0060, 0, 0, SUB_GET_DEVICE_INFO << 24, 0x6000_0000, 0, 0],
    )
}

pub fn get_scan_params_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(
        token,
        [0x0000_0090, 0, 0, 0x1201_F000, SUB_GET_SCAN_PARAMS << 24, 0, 0],
    )
}

pub fn get_scan_settings_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(token, [0, 0, 0, SUB_GET_SCAN_SETTINGS << 24, 0, 0, 0])
}

/// Sub-command 0xDB: written once, immediately before Prepare, only when the
/// job enables bleed-through reduction — the appliance applies its default
/// tone curve otherwise. No reference packet catalogue defines a parameter
/// body for this sub-command beyond the shared GET_SET shape, so it carries
/// an empty parameter block like `wait_for_scan_request`/`end_scan_request`.
pub fn write_tone_curve_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(token, [0, 0, 0, SUB_WRITE_TONE_CURVE << 24, 0, 0, 0])
}

pub fn prepare_scan_request(token: &[u8; 8]) -> Vec<u8> {
    let total = DATA_HEADER_SIZE + 36;
    let mut buf = vec![0u8; total];
    write_data_header(&mut buf, total as u32, CMD_GET_SET, token);
    let words: [u32; 9] = [
        0x0000_0008,
        0x0000_0008,
        0,
        SUB_PREPARE_SCAN << 24,
        0x0808_0000,
        0,
        0,
        0,
        0,
    ];
    for (i, word) in words.iter().enumerate() {
        let off = DATA_HEADER_SIZE + i * 4;
        buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
    }
    buf
}

pub fn wait_for_scan_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(token, [0, 0, 0, SUB_WAIT_FOR_SCAN << 24, 0, 0, 0])
}

/// Not present in the upstream reference packet catalogue (an omission
/// there); built in the same GET_SET shape as its siblings since the
/// scanner only ever exposes sub-commands of 0x06 on this path.
pub fn end_scan_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(token, [0, 0, 0, SUB_END_SCAN << 24, 0, 0, 0])
}

pub fn get_page_metadata_request(token: &[u8; 8]) -> Vec<u8> {
    get_set_request(
        token,
        [0x0000_0012, 0, 0, 0x0300_0000, SUB_GET_PAGE_METADATA << 24, 0, 0],
    )
}

pub fn scanner_config_request(token: &[u8; 8]) -> Vec<u8> {
    let total = DATA_HEADER_SIZE + 32;
    let mut buf = vec![0u8; total];
    write_data_header(&mut buf, total as u32, CMD_CONFIG, token);
    let words: [u32; 8] = [
        0,
        0x0000_0004,
        0,
        0xEB00_0000,
        0x0004_0000,
        0,
        0,
        0x0501_0000,
    ];
    for (i, word) in words.iter().enumerate() {
        let off = DATA_HEADER_SIZE + i * 4;
        buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
    }
    buf
}

pub fn get_status_request(token: &[u8; 8]) -> Vec<u8> {
    let total = DATA_HEADER_SIZE + 28;
    let mut buf = vec![0u8; total];
    write_data_header(&mut buf, total as u32, CMD_GET_STATUS, token);
    let words: [u32; 7] = [0x0000_0020, 0, 0, 0xC200_0000, 0, 0x2000_0000, 0];
    for (i, word) in words.iter().enumerate() {
        let off = DATA_HEADER_SIZE + i * 4;
        buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
    }
    buf
}

/// Decoded Get-status response: bit 0x80 of the status word at +8 (relative
/// to the data payload start, packet offset +40) signals "no paper in ADF".
#[derive(Debug, Clone, Copy)]
pub struct ScanStatus {
    pub raw: u32,
}

impl ScanStatus {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < 44 {
            return Err(ScanError::MalformedPacket("scan status response"));
        }
        let raw = u32::from_be_bytes(data[40..44].try_into().unwrap());
        Ok(Self { raw })
    }

    pub fn no_paper(&self) -> bool {
        self.raw & 0x80 != 0
    }
}

/// `page_num = (transfer_sheet << 8) | chunk_index`. `page_flags` alternates
/// by parity of `transfer_sheet`, matching the odd/even split observed on
/// duplex back sides.
pub fn page_transfer_request(token: &[u8; 8], transfer_sheet: u32, chunk_index: u32) -> Vec<u8> {
    let page_flags: u32 = if transfer_sheet % 2 == 1 { 0x0080_0400 } else { 0x0000_0400 };
    let page_num = (transfer_sheet << 8) | chunk_index;
    let total = DATA_HEADER_SIZE + 28;
    let mut buf = vec![0u8; total];
    write_data_header(&mut buf, total as u32, CMD_PAGE_TRANSFER, token);
    let words: [u32; 7] = [
        PAGE_TRANSFER_CHUNK_BUFFER,
        0,
        0,
        0x2800_0002,
        page_flags,
        page_num,
        0,
    ];
    for (i, word) in words.iter().enumerate() {
        let off = DATA_HEADER_SIZE + i * 4;
        buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
    }
    buf
}

/// 42-byte header preceding each page-transfer chunk's raw image bytes.
#[derive(Debug, Clone, Copy)]
pub struct PageChunkHeader {
    pub total_length: u32,
    /// 0 = more chunks follow, 2 = final chunk of this side.
    pub page_type: u32,
    pub sheet: u8,
    pub side: u8,
}

impl PageChunkHeader {
    pub fn decode(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < PAGE_CHUNK_HEADER_SIZE || &data[4..8] != MAGIC {
            return Err(ScanError::MalformedPacket("page chunk header"));
        }
        let total_length = u32::from_be_bytes(data[0..4].try_into().unwrap());
        if (total_length as usize) < PAGE_CHUNK_HEADER_SIZE {
            return Err(ScanError::PageTransferError("chunk total length shorter than header"));
        }
        let page_type = u32::from_be_bytes(data[12..16].try_into().unwrap());
        let sheet = data[40];
        let side = data[41];
        Ok(Self {
            total_length,
            page_type,
            sheet,
            side,
        })
    }

    pub fn jpeg_size(&self) -> usize {
        (self.total_length as usize).saturating_sub(PAGE_CHUNK_HEADER_SIZE)
    }

    pub fn is_final(&self) -> bool {
        self.page_type == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_device_info_request_header_is_well_formed() {
        let token = [9u8; 8];
        let buf = get_device_info_request(&token);
        assert_eq!(&buf[4..8], MAGIC);
        assert_eq!(u32::from_be_bytes(buf[8..12].try_into().unwrap()), 1);
        assert_eq!(&buf[16..24], &token);
        assert_eq!(u32::from_be_bytes(buf[32..36].try_into().unwrap()), CMD_GET_SET);
    }

    #[test]
    fn write_tone_curve_request_carries_sub_command() {
        let token = [3u8; 8];
        let buf = write_tone_curve_request(&token);
        let sub = u32::from_be_bytes(buf[DATA_HEADER_SIZE + 12..DATA_HEADER_SIZE + 16].try_into().unwrap());
        assert_eq!(sub >> 24, SUB_WRITE_TONE_CURVE);
    }

    #[test]
    fn page_transfer_request_flags_depend_on_parity() {
        let token = [0u8; 8];
        let even = page_transfer_request(&token, 0, 3);
        let odd = page_transfer_request(&token, 1, 0);
        let flags_even = u32::from_be_bytes(even[DATA_HEADER_SIZE + 16..DATA_HEADER_SIZE + 20].try_into().unwrap());
        let flags_odd = u32::from_be_bytes(odd[DATA_HEADER_SIZE + 16..DATA_HEADER_SIZE + 20].try_into().unwrap());
        assert_eq!(flags_even, 0x0000_0400);
        assert_eq!(flags_odd, 0x0080_0400);
        let page_num_even = u32::from_be_bytes(even[DATA_HEADER_SIZE + 20..DATA_HEADER_SIZE + 24].try_into().unwrap());
        assert_eq!(page_num_even, 3);
    }

    #[test]
    fn page_chunk_header_rejects_short_buffer() {
        assert!(PageChunkHeader::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn page_chunk_header_rejects_total_length_shorter_than_header() {
        let mut data = vec![0u8; PAGE_CHUNK_HEADER_SIZE];
        data[0..4].copy_from_slice(&10u32.to_be_bytes());
        data[4..8].copy_from_slice(MAGIC);
        let err = PageChunkHeader::decode(&data).unwrap_err();
        assert!(matches!(err, ScanError::PageTransferError(_)));
    }

    #[test]
    fn page_chunk_header_final_flag() {
        let mut data = vec![0u8; PAGE_CHUNK_HEADER_SIZE];
        data[0..4].copy_from_slice(&(PAGE_CHUNK_HEADER_SIZE as u32 + 100).to_be_bytes());
        data[4..8].copy_from_slice(MAGIC);
        data[12..16].copy_from_slice(&2u32.to_be_bytes());
        data[40] = 3;
        data[41] = 1;
        let header = PageChunkHeader::decode(&data).unwrap();
        assert!(header.is_final());
        assert_eq!(header.jpeg_size(), 100);
        assert_eq!(header.sheet, 3);
        assert_eq!(header.side, 1);
    }
}
