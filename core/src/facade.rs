//! Scanner facade (spec §4.5): the single entry point most callers need —
//! discover, pair or connect, run a scan, disconnect.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::control_session::ControlSession;
use crate::data_channel::DataChannel;
use crate::discovery;
use crate::error::ScanError;
use crate::identity::{compute_identity, password_from_serial};
use crate::wire::{Identity, Page, ScanJobConfig, SessionToken};

const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const POST_HEARTBEAT_SETTLE: Duration = Duration::from_millis(300);
const DATA_RETRY_ATTEMPTS: u32 = 3;
const DATA_RETRY_DELAY: Duration = Duration::from_secs(2);

/// A paired/connected session with one appliance. Dropping this value does
/// not deregister the session — call [`Scanner::disconnect`] explicitly.
pub struct Scanner {
    host: Ipv4Addr,
    data_port: u16,
    control_port: u16,
    token: SessionToken,
    identity: Identity,
    heartbeat_cancel: Option<CancellationToken>,
    discovered: bool,
}

impl Scanner {
    fn new(
        host: Ipv4Addr,
        data_port: u16,
        control_port: u16,
        token: SessionToken,
        identity: Identity,
    ) -> Self {
        Self {
            host,
            data_port,
            control_port,
            token,
            identity,
            heartbeat_cancel: None,
            discovered: false,
        }
    }

    fn control(&self) -> ControlSession {
        ControlSession::new(self.host, self.control_port)
    }

    fn data(&self) -> DataChannel {
        DataChannel::new(self.host, self.data_port, *self.token.as_bytes())
    }

    /// Discovers an appliance and returns a [`Scanner`] bound to it, without
    /// performing the Reserve handshake. Use [`Scanner::connect`] afterward,
    /// or [`Scanner::pair`] to do discovery and reservation together.
    pub async fn discover(
        target_ip: Option<Ipv4Addr>,
        identity: Identity,
        timeout: Duration,
    ) -> Result<Self, ScanError> {
        let token = SessionToken::generate();
        let descriptor = discovery::find_appliance(target_ip, *token.as_bytes(), timeout).await?;
        info!("discovered {} ({})", descriptor.name, descriptor.serial);
        let mut scanner = Self::new(
            descriptor.device_ip,
            descriptor.data_port,
            descriptor.control_port,
            token,
            identity,
        );
        scanner.discovered = true;
        Ok(scanner)
    }

    /// Discovers an appliance, derives or accepts a pairing identity, and
    /// completes the full pairing handshake: Reserve, heartbeat start, data
    /// channel probes, status check, and Register.
    ///
    /// If neither `password` nor `identity` is supplied, the password is
    /// derived from the discovered appliance's serial number.
    pub async fn pair(
        password: Option<&str>,
        identity: Option<Identity>,
        target_ip: Option<Ipv4Addr>,
        timeout: Duration,
    ) -> Result<(Self, Identity), ScanError> {
        let resolved_identity = match (password, identity) {
            (Some(_), Some(_)) => {
                return Err(ScanError::InvalidArgument(
                    "provide password or identity, not both",
                ))
            }
            (Some(pw), None) => Some(compute_identity(pw)?),
            (None, Some(id)) => Some(id),
            (None, None) => None,
        };

        let token = SessionToken::generate();
        let descriptor = discovery::find_appliance(target_ip, *token.as_bytes(), timeout).await?;
        info!(
            "discovered {} ({}) at {}",
            descriptor.name, descriptor.serial, descriptor.device_ip
        );

        let identity = match resolved_identity {
            Some(id) => id,
            None => {
                let derived_password = password_from_serial(&descriptor.serial);
                let id = compute_identity(&derived_password)?;
                info!("password derived from serial: {}", derived_password);
                id
            }
        };

        let mut scanner = Self::new(
            descriptor.device_ip,
            descriptor.data_port,
            descriptor.control_port,
            token,
            identity.clone(),
        );
        scanner.discovered = true;

        let client_ip = discovery::local_ip().await;
        scanner
            .control()
            .reserve_or_fail(
                *scanner.token.as_bytes(),
                client_ip,
                crate::wire::constants::CLIENT_NOTIFY_PORT,
                identity.clone(),
            )
            .await?;

        scanner.start_heartbeat();
        sleep(POST_HEARTBEAT_SETTLE).await;

        let data = scanner.data();
        retry_data_request(|| data.get_device_info()).await?;
        retry_data_request(|| data.get_scan_params()).await?;

        scanner.control().check_status(*scanner.token.as_bytes()).await?;
        scanner.control().register(*scanner.token.as_bytes()).await?;

        info!("pairing complete, identity={}", identity);
        Ok((scanner, identity))
    }

    /// Establishes a session with an already-discovered or directly
    /// constructed appliance: starts the heartbeat, configures the session,
    /// and validates the data channel.
    pub async fn connect(&mut self) -> Result<(), ScanError> {
        if !self.discovered {
            let descriptor =
                discovery::find_appliance(Some(self.host), *self.token.as_bytes(), DEFAULT_DISCOVERY_TIMEOUT)
                    .await?;
            self.data_port = descriptor.data_port;
            self.control_port = descriptor.control_port;
            self.discovered = true;
        }

        self.start_heartbeat();
        sleep(POST_HEARTBEAT_SETTLE).await;

        let client_ip = discovery::local_ip().await;
        self.control()
            .reserve_or_fail(
                *self.token.as_bytes(),
                client_ip,
                crate::wire::constants::CLIENT_NOTIFY_PORT,
                self.identity.clone(),
            )
            .await?;
        info!("session configured");

        let data = self.data();
        retry_data_request(|| data.get_device_info()).await?;
        info!("device info OK");

        let status = self.control().check_status(*self.token.as_bytes()).await?;
        info!("status: state={}", status.state);

        retry_data_request(|| data.get_scan_params()).await?;
        info!("scan params OK");

        retry_data_request(|| data.set_config()).await?;
        info!("config OK");

        Ok(())
    }

    /// Optionally waits for a physical button press, then runs a scan job
    /// with the given configuration. Empty pages (0-byte payload, typically
    /// a blank back side elided by blank-page removal) are excluded.
    pub async fn scan(
        &self,
        config: &ScanJobConfig,
        wait_for_button: bool,
    ) -> Result<Vec<Page>, ScanError> {
        if wait_for_button {
            info!("waiting for scan button press...");
            discovery::wait_for_button(Duration::from_secs(300)).await?;
            info!("button pressed!");
        }
        info!("starting scan...");
        let data = self.data();
        let pages = data.run_scan(config, |_| {}).await?;
        Ok(pages.into_iter().filter(|p| !p.bytes.is_empty()).collect())
    }

    /// Like [`Self::scan`] but writes each non-empty page to
    /// `output_dir/page_{sheet:03}_{front|back}.{jpg|tiff}`.
    pub async fn scan_to_files(
        &self,
        output_dir: impl AsRef<Path>,
        config: &ScanJobConfig,
        wait_for_button: bool,
    ) -> Result<Vec<PathBuf>, ScanError> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let pages = self.scan(config, wait_for_button).await?;
        let mut saved = Vec::with_capacity(pages.len());
        for page in &pages {
            let filename = format!(
                "page_{:03}_{}.{}",
                page.sheet,
                page.side.file_label(),
                page.side.extension(config.color_mode)
            );
            let path = output_dir.join(filename);
            std::fs::write(&path, &page.bytes)?;
            saved.push(path);
        }
        Ok(saved)
    }

    /// Tears down the session: stops the heartbeat and deregisters. Release
    /// errors are logged and swallowed, matching the appliance's own
    /// tolerance of an unclean client exit.
    pub async fn disconnect(&mut self) {
        if let Some(cancel) = self.heartbeat_cancel.take() {
            cancel.cancel();
        }
        if let Err(e) = self.control().deregister(*self.token.as_bytes()).await {
            log::warn!("deregister failed (ignored): {}", e);
        }
    }

    pub fn descriptor_host(&self) -> Ipv4Addr {
        self.host
    }

    fn start_heartbeat(&mut self) {
        if self.heartbeat_cancel.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let host = self.host;
        let token = *self.token.as_bytes();
        tokio::spawn(async move {
            discovery::run_heartbeat(host, token, child).await;
        });
        self.heartbeat_cancel = Some(cancel);
    }
}

async fn retry_data_request<T, F, Fut>(mut request: F) -> Result<T, ScanError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ScanError>>,
{
    let mut attempt = 0;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < DATA_RETRY_ATTEMPTS => {
                log::warn!(
                    "data channel error (attempt {}/{}): {} — retrying in {:?}",
                    attempt + 1,
                    DATA_RETRY_ATTEMPTS,
                    e,
                    DATA_RETRY_DELAY
                );
                sleep(DATA_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
