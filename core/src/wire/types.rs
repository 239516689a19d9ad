//! Shared data-model types (spec §3).

use std::fmt;
use std::net::Ipv4Addr;

use rand::RngCore;

/// Eight opaque bytes identifying one logical session across every
/// channel (UDP discovery, heartbeats, control, data). Bytes 6-7 are
/// always zero — enforced here rather than at each pack site.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; 8]);

impl SessionToken {
    /// Six random bytes followed by two zero bytes.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes[..6]);
        bytes[6] = 0;
        bytes[7] = 0;
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        let mut b = bytes;
        b[6] = 0;
        b[7] = 0;
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({:02x?})", self.0)
    }
}

/// ASCII pairing credential, at most 44 bytes, derived from a shared-secret
/// password (see [`crate::identity`]) or supplied directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    pub const MAX_LEN: usize = 44;

    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into();
        debug_assert!(s.len() <= Self::MAX_LEN, "identity exceeds 44 bytes");
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a discovered appliance. Immutable once produced by
/// discovery — there are deliberately no `&mut` accessors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplianceDescriptor {
    pub name: String,
    pub serial: String,
    pub mac: [u8; 6],
    pub device_ip: Ipv4Addr,
    pub data_port: u16,
    pub control_port: u16,
    pub paired: bool,
    pub protocol_version: u16,
    pub state: u32,
    /// IP of whichever client currently holds the reservation, if any.
    pub reserving_client_ip: Option<Ipv4Addr>,
}

impl ApplianceDescriptor {
    pub fn mac_string(&self) -> String {
        self.mac
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Decoded `GetWifiStatus` response state word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplianceStatus {
    pub state: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Color,
    Gray,
    BlackAndWhite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quality {
    Auto,
    Normal,
    Fine,
    Superfine,
}

impl Quality {
    /// DPI implied by this quality level; 0 means "let the appliance decide".
    pub fn dpi(self) -> u16 {
        match self {
            Quality::Auto => 0,
            Quality::Normal => 150,
            Quality::Fine => 200,
            Quality::Superfine => 300,
        }
    }

    fn from_dpi(dpi: u16) -> Self {
        match dpi {
            150 => Quality::Normal,
            200 => Quality::Fine,
            300 => Quality::Superfine,
            _ => Quality::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaperSize {
    Auto,
    A4,
    A5,
    BusinessCard,
    Postcard,
}

impl PaperSize {
    /// (width, height) in 1/1200-inch units.
    pub fn dimensions(self) -> (u16, u16) {
        match self {
            PaperSize::Auto => (0x28D0, 0x45A4),
            PaperSize::A4 => (0x26D0, 0x36D0),
            PaperSize::A5 => (0x1B50, 0x26C0),
            PaperSize::BusinessCard => (0x28D0, 0x1274),
            PaperSize::Postcard => (0x1280, 0x1B50),
        }
    }

    fn from_dimensions(w: u16, h: u16) -> Self {
        for candidate in [
            PaperSize::Auto,
            PaperSize::A4,
            PaperSize::A5,
            PaperSize::BusinessCard,
            PaperSize::Postcard,
        ] {
            if candidate.dimensions() == (w, h) {
                return candidate;
            }
        }
        PaperSize::Auto
    }

    pub fn mm(self) -> (f64, f64) {
        let (w, h) = self.dimensions();
        (w as f64 / 1200.0 * 25.4, h as f64 / 1200.0 * 25.4)
    }
}

/// Immutable per-scan job configuration (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanJobConfig {
    pub color_mode: ColorMode,
    pub quality: Quality,
    pub duplex: bool,
    pub bleed_through: bool,
    pub paper_size: PaperSize,
    /// 0-10; only meaningful when `color_mode == BlackAndWhite`.
    pub bw_density: u8,
    pub multi_feed_detection: bool,
    pub blank_page_removal: bool,
}

impl Default for ScanJobConfig {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Auto,
            quality: Quality::Auto,
            duplex: true,
            bleed_through: true,
            paper_size: PaperSize::Auto,
            bw_density: 0,
            multi_feed_detection: true,
            blank_page_removal: true,
        }
    }
}

impl ScanJobConfig {
    /// Human-readable key/value rendering, used by the CLI to echo the
    /// effective configuration before a scan (original `ScanConfig.describe`).
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let dpi = self.quality.dpi();
        let (w_mm, h_mm) = self.paper_size.mm();
        vec![
            ("color_mode", format!("{:?}", self.color_mode).to_lowercase()),
            (
                "quality",
                if dpi > 0 {
                    format!("{:?} ({} dpi)", self.quality, dpi).to_lowercase()
                } else {
                    "auto".to_string()
                },
            ),
            ("duplex", self.duplex.to_string()),
            ("bleed_through", self.bleed_through.to_string()),
            (
                "paper_size",
                format!(
                    "{:?} ({:.1}mm x {:.1}mm)",
                    self.paper_size, w_mm, h_mm
                )
                .to_lowercase(),
            ),
            (
                "bw_density",
                if self.color_mode == ColorMode::BlackAndWhite {
                    self.bw_density.to_string()
                } else {
                    "n/a".to_string()
                },
            ),
            ("multi_feed", self.multi_feed_detection.to_string()),
            ("blank_page_removal", self.blank_page_removal.to_string()),
        ]
    }

    pub(crate) fn quality_from_dpi(dpi: u16) -> Quality {
        Quality::from_dpi(dpi)
    }

    pub(crate) fn paper_from_dimensions(w: u16, h: u16) -> PaperSize {
        PaperSize::from_dimensions(w, h)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn extension(self, color_mode: ColorMode) -> &'static str {
        let _ = self;
        if color_mode == ColorMode::BlackAndWhite {
            "tiff"
        } else {
            "jpg"
        }
    }

    pub fn file_label(self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

/// One scanned page: physical sheet index, side, and its JPEG/TIFF bytes.
/// The payload may be empty when blank-page removal elides a back side.
#[derive(Clone, Debug)]
pub struct Page {
    pub sheet: u32,
    pub side: Side,
    pub bytes: Vec<u8>,
}
