//! Data channel (TCP:53218): device queries, scan configuration, and the
//! chunked page-transfer loop (spec §4.4).

use std::net::Ipv4Addr;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ScanError;
use crate::wire::constants::WELCOME_SIZE;
use crate::wire::data::{self, PageChunkHeader, ScanStatus};
use crate::wire::scan_config;
use crate::wire::welcome;
use crate::wire::{Page, ScanJobConfig, Side};

/// Collected raw query responses, used by [`DataChannel::read_all_settings`].
#[derive(Default, Debug, Clone)]
pub struct ApplianceSettings {
    pub device_info: Vec<u8>,
    pub scan_params: Vec<u8>,
    pub scan_settings: Vec<u8>,
}

pub struct DataChannel {
    host: Ipv4Addr,
    port: u16,
    token: [u8; 8],
}

impl DataChannel {
    pub fn new(host: Ipv4Addr, port: u16, token: [u8; 8]) -> Self {
        Self { host, port, token }
    }

    async fn open(&self) -> Result<TcpStream, ScanError> {
        let mut stream = TcpStream::connect((self.host, self.port)).await?;
        let mut welcome_buf = [0u8; WELCOME_SIZE];
        stream.read_exact(&mut welcome_buf).await?;
        welcome::validate(&welcome_buf)?;
        debug!("data channel connected to {}:{}", self.host, self.port);
        Ok(stream)
    }

    /// Opens a fresh connection, sends `request`, and reads back one
    /// length-prefixed response.
    async fn request(&self, request: &[u8]) -> Result<Vec<u8>, ScanError> {
        let mut stream = self.open().await?;
        stream.write_all(request).await?;
        stream.flush().await?;
        let resp = read_response(&mut stream).await;
        let _ = stream.shutdown().await;
        resp
    }

    pub async fn get_device_info(&self) -> Result<Vec<u8>, ScanError> {
        let resp = self.request(&data::get_device_info_request(&self.token)).await?;
        info!("device info: {} bytes", resp.len());
        Ok(resp)
    }

    pub async fn get_scan_params(&self) -> Result<Vec<u8>, ScanError> {
        self.request(&data::get_scan_params_request(&self.token)).await
    }

    pub async fn get_scan_settings(&self) -> Result<Vec<u8>, ScanError> {
        self.request(&data::get_scan_settings_request(&self.token)).await
    }

    /// Queries every settings-related endpoint, tolerating per-query
    /// connection failures by recording an empty response rather than
    /// aborting the whole survey.
    pub async fn read_all_settings(&self) -> ApplianceSettings {
        let mut settings = ApplianceSettings::default();
        match self.get_device_info().await {
            Ok(v) => settings.device_info = v,
            Err(e) => warn!("query device_info failed: {}", e),
        }
        match self.get_scan_params().await {
            Ok(v) => settings.scan_params = v,
            Err(e) => warn!("query scan_params failed: {}", e),
        }
        match self.get_scan_settings().await {
            Ok(v) => settings.scan_settings = v,
            Err(e) => warn!("query scan_settings failed: {}", e),
        }
        settings
    }

    /// Scanner-level config probe (cmd 0x08), sent once during `connect()` —
    /// distinct from the per-job Set-scan-settings block (cmd 0x06/0xD4)
    /// that `run_scan` packs directly from the caller's `ScanJobConfig`.
    pub async fn set_config(&self) -> Result<Vec<u8>, ScanError> {
        self.request(&data::scanner_config_request(&self.token)).await
    }

    /// Runs a full scan session end-to-end on one long-lived connection:
    /// query current settings, push the job config, prepare, confirm paper
    /// is present, wait for the scan trigger, then loop collecting pages
    /// until the appliance reports completion. `on_page`, if given, is
    /// invoked once per side as it arrives (front and back are delivered as
    /// separate callbacks even in duplex mode).
    ///
    /// An End-scan request is always sent on the way out, even on error
    /// paths; failures doing so are logged and swallowed since the
    /// appliance's own state reset doesn't depend on our acknowledgement.
    pub async fn run_scan(
        &self,
        config: &ScanJobConfig,
        mut on_page: impl FnMut(&Page),
    ) -> Result<Vec<Page>, ScanError> {
        let mut stream = self.open().await?;
        let mut pages = Vec::new();

        let result = self.run_scan_inner(&mut stream, config, &mut pages, &mut on_page).await;

        if let Err(e) = self.end_scan(&mut stream).await {
            warn!("end-scan request failed (ignored): {}", e);
        }
        let _ = stream.shutdown().await;

        result?;
        let non_empty = pages.iter().filter(|p| !p.bytes.is_empty()).count();
        info!("scan finished: {} page(s), {} non-empty", pages.len(), non_empty);
        Ok(pages)
    }

    async fn run_scan_inner(
        &self,
        stream: &mut TcpStream,
        config: &ScanJobConfig,
        pages: &mut Vec<Page>,
        on_page: &mut impl FnMut(&Page),
    ) -> Result<(), ScanError> {
        write_request(stream, &data::get_scan_settings_request(&self.token)).await?;
        let resp = read_response(stream).await?;
        debug!("get-settings response: {} bytes", resp.len());

        write_request(stream, &scan_config::pack(config, &self.token)).await?;
        let resp = read_response(stream).await?;
        debug!("set-config response: {} bytes", resp.len());

        if config.bleed_through {
            write_request(stream, &data::write_tone_curve_request(&self.token)).await?;
            read_response(stream).await?;
            debug!("tone curve written");
        }

        write_request(stream, &data::prepare_scan_request(&self.token)).await?;
        read_response(stream).await?;

        write_request(stream, &data::get_status_request(&self.token)).await?;
        let status_resp = read_response(stream).await?;
        if let Ok(status) = ScanStatus::decode(&status_resp) {
            info!("scan status: 0x{:08X}", status.raw);
            if status.no_paper() {
                return Err(ScanError::NoPaperInFeeder);
            }
        }

        info!("waiting for scan to start...");
        write_request(stream, &data::wait_for_scan_request(&self.token)).await?;
        let resp = read_response(stream).await?;
        let wait_status = wait_status_from_response(&resp);
        if wait_status != 0 {
            return Err(ScanError::WaitFailed(wait_status));
        }
        info!("scan started");

        let mut physical_sheet: u32 = 0;
        let mut transfer_sheet: u32 = 0;
        let sides_per_sheet = if config.duplex { 2 } else { 1 };

        loop {
            for side_idx in 0..sides_per_sheet {
                let side = if side_idx == 0 { Side::Front } else { Side::Back };
                debug!("requesting page: transfer_sheet={} side={:?}", transfer_sheet, side);

                let bytes = self.transfer_page_chunks(stream, transfer_sheet).await?;
                info!(
                    "page: physical_sheet={} side={:?} size={}",
                    physical_sheet,
                    side,
                    bytes.len()
                );

                let page = Page {
                    sheet: physical_sheet,
                    side,
                    bytes,
                };
                on_page(&page);
                pages.push(page);

                write_request(stream, &data::get_page_metadata_request(&self.token)).await?;
                let meta = read_response(stream).await?;
                debug!("page metadata: {} bytes", meta.len());

                transfer_sheet += 1;
            }

            write_request(stream, &data::get_status_request(&self.token)).await?;
            let status_resp = read_response(stream).await?;
            if let Ok(status) = ScanStatus::decode(&status_resp) {
                info!("scan status: 0x{:08X}", status.raw);
            }

            write_request(stream, &data::wait_for_scan_request(&self.token)).await?;
            let resp = read_response(stream).await?;
            let wait_status = wait_status_from_response(&resp);
            if wait_status != 0 {
                info!("wait-for-scan status={}, scan complete", wait_status);
                break;
            }

            physical_sheet += 1;
        }

        Ok(())
    }

    async fn transfer_page_chunks(
        &self,
        stream: &mut TcpStream,
        transfer_sheet: u32,
    ) -> Result<Vec<u8>, ScanError> {
        let mut chunk_index = 0u32;
        let mut jpeg = Vec::new();

        loop {
            write_request(
                stream,
                &data::page_transfer_request(&self.token, transfer_sheet, chunk_index),
            )
            .await?;

            let mut header_buf = [0u8; crate::wire::constants::PAGE_CHUNK_HEADER_SIZE];
            stream.read_exact(&mut header_buf).await?;
            let header = PageChunkHeader::decode(&header_buf)?;
            debug!(
                "chunk: transfer_sheet={} chunk={} page_type={} size={}",
                transfer_sheet,
                chunk_index,
                header.page_type,
                header.jpeg_size()
            );

            let mut chunk = vec![0u8; header.jpeg_size()];
            stream.read_exact(&mut chunk).await?;
            jpeg.extend_from_slice(&chunk);

            if header.is_final() {
                break;
            }
            chunk_index += 1;
        }

        Ok(jpeg)
    }

    async fn end_scan(&self, stream: &mut TcpStream) -> Result<(), ScanError> {
        write_request(stream, &data::end_scan_request(&self.token)).await?;
        read_response(stream).await?;
        debug!("end-scan session OK");
        Ok(())
    }
}

async fn write_request(stream: &mut TcpStream, request: &[u8]) -> Result<(), ScanError> {
    stream.write_all(request).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_response(stream: &mut TcpStream) -> Result<Vec<u8>, ScanError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let total_len = u32::from_be_bytes(len_buf) as usize;
    let mut rest = vec![0u8; total_len.saturating_sub(4)];
    stream.read_exact(&mut rest).await?;
    let mut buf = len_buf.to_vec();
    buf.extend(rest);
    Ok(buf)
}

/// The wait-for-scan status word sits at +12 in the response payload;
/// non-zero means the appliance has nothing further to report (either the
/// scan is complete or it never started) and is treated as fatal by the
/// caller.
fn wait_status_from_response(resp: &[u8]) -> u32 {
    if resp.len() >= 16 {
        u32::from_be_bytes(resp[12..16].try_into().unwrap())
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_status_extracts_status_word() {
        let mut resp = vec![0u8; 16];
        resp[12..16].copy_from_slice(&7u32.to_be_bytes());
        assert_eq!(wait_status_from_response(&resp), 7);
    }

    #[test]
    fn wait_status_defaults_to_zero_on_short_response() {
        assert_eq!(wait_status_from_response(&[0u8; 4]), 0);
    }
}
