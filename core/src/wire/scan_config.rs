//! Set/Get-scan-settings byte-table packing (spec §4.1, Design Note; §9).
//!
//! The config block layout is positional and mode-dependent rather than a
//! flat struct, so it is expressed here as a table of (offset, value)
//! writes keyed off the job's derived flags, mirroring the upstream
//! reference packer field-for-field.

use super::constants::*;
use super::types::{ColorMode, Quality, ScanJobConfig};
use crate::error::ScanError;

const SUB_SET_CONFIG: u32 = 0xD4;

/// Config data is 80 bytes normally, 128 bytes when duplex and fully
/// automatic (color=auto, quality=auto) — the appliance expects an explicit
/// back-side parameter block in that case.
fn config_block_size(cfg: &ScanJobConfig) -> usize {
    let full_auto = cfg.color_mode == ColorMode::Auto && cfg.quality == Quality::Auto;
    if cfg.duplex && full_auto {
        0x80
    } else {
        0x50
    }
}

/// Builds the full Set-scan-settings request (data channel header + GET_SET
/// param header + positional config block).
pub fn pack(cfg: &ScanJobConfig, token: &[u8; 8]) -> Vec<u8> {
    let is_bw = cfg.color_mode == ColorMode::BlackAndWhite;
    let is_gray = cfg.color_mode == ColorMode::Gray;
    let is_auto_color = cfg.color_mode == ColorMode::Auto;
    let is_auto_quality = cfg.quality == Quality::Auto;
    let full_auto = is_auto_color && is_auto_quality;
    let dpi = cfg.quality.dpi();
    let (w, h) = cfg.paper_size.dimensions();

    let config_size = config_block_size(cfg);
    let total = 64 + config_size;
    let mut buf = vec![0u8; total];

    buf[0..4].copy_from_slice(&(total as u32).to_be_bytes());
    buf[4..8].copy_from_slice(MAGIC);
    buf[8..12].copy_from_slice(&1u32.to_be_bytes()); // direction = client
    buf[16..24].copy_from_slice(token);
    buf[32..36].copy_from_slice(&0x06u32.to_be_bytes()); // DataCommand::GET_SET

    buf[40..44].copy_from_slice(&(config_size as u32).to_be_bytes());
    buf[48..52].copy_from_slice(&(SUB_SET_CONFIG << 24).to_be_bytes());
    buf[52..56].copy_from_slice(&((config_size as u32) << 24).to_be_bytes());

    let c = 64usize;
    buf[c + 1] = if cfg.duplex { 0x03 } else { 0x01 };
    buf[c + 2] = if full_auto { 0x01 } else { 0x00 };
    buf[c + 5] = if full_auto { 0x01 } else { 0x00 };
    if is_bw && cfg.bw_density == 0 {
        buf[c + 3] = 0x02;
    } else if full_auto {
        buf[c + 3] = 0x01;
    }
    buf[c + 4] = if cfg.multi_feed_detection { 0xD0 } else { 0x80 };
    buf[c + 6] = if cfg.multi_feed_detection { 0xC1 } else { 0xC0 };
    buf[c + 7] = if is_auto_color && is_auto_quality { 0xC1 } else { 0x80 };
    buf[c + 8] = if cfg.blank_page_removal { 0xE0 } else { 0x80 };
    buf[c + 9] = 0xC8;
    buf[c + 10] = if is_auto_quality { 0xA0 } else { 0x80 };
    buf[c + 11] = if cfg.bleed_through { 0xC0 } else { 0x80 };
    buf[c + 12] = 0x80;

    buf[c + 31] = 0x30;
    buf[c + 33] = if is_bw { 0x40 } else { 0x10 };
    buf[c + 34..c + 36].copy_from_slice(&dpi.to_be_bytes());
    buf[c + 36..c + 38].copy_from_slice(&dpi.to_be_bytes());

    let color_enc_tail: u8 = if matches!(cfg.paper_size, super::types::PaperSize::Postcard) {
        0x09
    } else {
        0x0B
    };
    if is_gray {
        buf[c + 38..c + 41].copy_from_slice(&[0x02, 0x82, color_enc_tail]);
    } else if is_bw {
        buf[c + 38..c + 41].copy_from_slice(&[0x00, 0x03, 0x00]);
    } else {
        buf[c + 38..c + 41].copy_from_slice(&[0x05, 0x82, color_enc_tail]);
    }

    buf[c + 44..c + 46].copy_from_slice(&w.to_be_bytes());
    buf[c + 48..c + 50].copy_from_slice(&h.to_be_bytes());
    buf[c + 50] = 0x04;
    buf[c + 54..c + 57].copy_from_slice(&[0x01, 0x01, 0x01]);
    buf[c + 57] = if is_bw { 0x01 } else { 0x00 };
    if is_bw {
        buf[c + 60] = 0x06 + cfg.bw_density;
    }

    if config_size == 0x80 {
        let bc = c + 80;
        buf[bc] = 0x01;
        buf[bc + 1] = 0x10;
        buf[bc + 2..bc + 4].copy_from_slice(&dpi.to_be_bytes());
        buf[bc + 4..bc + 6].copy_from_slice(&dpi.to_be_bytes());
        buf[bc + 6..bc + 9].copy_from_slice(&[0x02, 0x82, 0x0B]);
        buf[bc + 12..bc + 14].copy_from_slice(&w.to_be_bytes());
        buf[bc + 16..bc + 18].copy_from_slice(&h.to_be_bytes());
        buf[bc + 18] = 0x04;
        buf[bc + 22..bc + 25].copy_from_slice(&[0x01, 0x01, 0x01]);
    }

    buf
}

/// Decodes a config block (as returned by a Get-scan-settings response, with
/// `data[0]` aligned to the config base) back into a [`ScanJobConfig`].
pub fn unpack(data: &[u8]) -> Result<ScanJobConfig, ScanError> {
    if data.len() < 61 {
        return Err(ScanError::MalformedPacket("scan config block"));
    }

    let duplex = data[1] == 0x03;
    let dpi = u16::from_be_bytes(data[34..36].try_into().unwrap());
    let quality = ScanJobConfig::quality_from_dpi(dpi);

    let color_enc = &data[38..41];
    let color_mode = if color_enc == [0x02, 0x82, 0x0B] {
        ColorMode::Gray
    } else if color_enc == [0x00, 0x03, 0x00] {
        ColorMode::BlackAndWhite
    } else if data[7] == 0xC1 && data[10] == 0xA0 {
        ColorMode::Auto
    } else {
        ColorMode::Color
    };

    let bleed_through = data[11] == 0xC0;
    let w = u16::from_be_bytes(data[44..46].try_into().unwrap());
    let h = u16::from_be_bytes(data[48..50].try_into().unwrap());
    let paper_size = ScanJobConfig::paper_from_dimensions(w, h);

    let bw_density = if color_mode == ColorMode::BlackAndWhite {
        data[60].saturating_sub(6)
    } else {
        0
    };
    let multi_feed_detection = data[4] == 0xD0;
    let blank_page_removal = data[8] == 0xE0;

    Ok(ScanJobConfig {
        color_mode,
        quality,
        duplex,
        bleed_through,
        paper_size,
        bw_density,
        multi_feed_detection,
        blank_page_removal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::PaperSize;

    /// S4 — duplex color-auto config, per spec scenario table.
    #[test]
    fn duplex_color_auto_matches_scenario_s4() {
        let cfg = ScanJobConfig {
            color_mode: ColorMode::Auto,
            quality: Quality::Auto,
            duplex: true,
            bleed_through: true,
            paper_size: PaperSize::A4,
            bw_density: 0,
            multi_feed_detection: true,
            blank_page_removal: true,
        };
        let buf = pack(&cfg, &[0u8; 8]);
        assert_eq!(buf.len(), 192);
        assert_eq!(buf[65], 0x03);
        assert_eq!(buf[66], 0x01);
        assert_eq!(buf[71], 0xC1);
        assert_eq!(buf[74], 0xA0);
        assert_eq!(u16::from_be_bytes(buf[108..110].try_into().unwrap()), 0x26D0);
        assert_eq!(u16::from_be_bytes(buf[112..114].try_into().unwrap()), 0x36D0);
    }

    #[test]
    fn simplex_non_auto_uses_80_byte_block() {
        let cfg = ScanJobConfig {
            color_mode: ColorMode::BlackAndWhite,
            quality: Quality::Fine,
            duplex: false,
            bleed_through: false,
            paper_size: PaperSize::A5,
            bw_density: 3,
            multi_feed_detection: false,
            blank_page_removal: false,
        };
        let buf = pack(&cfg, &[0u8; 8]);
        assert_eq!(buf.len(), 144);
        assert_eq!(buf[64 + 1], 0x01);
        assert_eq!(buf[64 + 57], 0x01);
        assert_eq!(buf[64 + 60], 0x09);
    }

    #[test]
    fn pack_then_unpack_round_trips_simplex_bw() {
        let cfg = ScanJobConfig {
            color_mode: ColorMode::BlackAndWhite,
            quality: Quality::Normal,
            duplex: false,
            bleed_through: true,
            paper_size: PaperSize::BusinessCard,
            bw_density: 4,
            multi_feed_detection: true,
            blank_page_removal: true,
        };
        let buf = pack(&cfg, &[0u8; 8]);
        let decoded = unpack(&buf[64..]).unwrap();
        assert_eq!(decoded, cfg);
    }
}
