//! Control socket server answering status and quality queries.

use futures::future::join_all;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wanwatch_lib::command::{Command, InterfaceStatus, QualityResponse, Response, StatusResponse};
use wanwatch_lib::quality::Probe;
use wanwatch_lib::socket;

use crate::active::ActiveLink;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Another instance is already serving `{0}`")]
    AlreadyRunning(PathBuf),
    #[error("Socket path `{0}` has no parent directory")]
    NoParent(PathBuf),
    #[error("Error preparing socket at `{path}`: {error}")]
    IO { path: PathBuf, error: io::Error },
    #[error("Probing for running instance failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Service {
    active: ActiveLink,
    probes: Vec<Probe>,
}

impl Service {
    pub fn new(active: ActiveLink, probes: Vec<Probe>) -> Self {
        Self { active, probes }
    }

    pub async fn quality(&self, device: &str) -> QualityResponse {
        match self.probes.iter().find(|p| p.device() == device) {
            Some(probe) => QualityResponse::from_result(device.to_string(), probe.measure().await),
            None => QualityResponse::UnknownDevice(device.to_string()),
        }
    }

    /// Fresh readings for every interface, measured concurrently.
    pub async fn status(&self) -> StatusResponse {
        let readings = join_all(self.probes.iter().map(|p| p.measure())).await;
        let interfaces = self
            .probes
            .iter()
            .zip(readings)
            .map(|(probe, reading)| InterfaceStatus {
                device: probe.device().to_string(),
                link_type: probe.link_type(),
                quality: reading.into(),
            })
            .collect();

        match self.active.load() {
            Some(snapshot) => StatusResponse::new(Some(snapshot.device.clone()), Some(snapshot.since), interfaces),
            None => StatusResponse::new(None, None, interfaces),
        }
    }

    pub async fn handle(&self, cmd: Command) -> Response {
        match cmd {
            Command::Status => Response::Status(self.status().await),
            Command::Quality(device) => Response::Quality(self.quality(&device).await),
            Command::Ping => Response::Pong,
        }
    }
}

/// Binds the control socket, replacing a stale socket file but refusing to
/// take over from a running instance.
pub async fn bind(socket_path: &Path) -> Result<UnixListener, Error> {
    let io_err = |error| Error::IO {
        path: socket_path.to_path_buf(),
        error,
    };

    if socket_path.try_exists().map_err(io_err)? {
        tracing::info!("probing for running instance");
        let path = socket_path.to_path_buf();
        match tokio::task::spawn_blocking(move || socket::process_cmd(&path, &Command::Ping)).await? {
            Ok(_) => return Err(Error::AlreadyRunning(socket_path.to_path_buf())),
            Err(e) => tracing::debug!(warn = %e, "done probing for running instance"),
        }
        fs::remove_file(socket_path).await.map_err(io_err)?;
    }

    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| Error::NoParent(socket_path.to_path_buf()))?;
    fs::create_dir_all(socket_dir).await.map_err(io_err)?;

    let listener = UnixListener::bind(socket_path).map_err(io_err)?;

    // allow unprivileged access
    fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o666))
        .await
        .map_err(io_err)?;

    Ok(listener)
}

/// Accepts connections until `cancel` fires. Each connection is served on its
/// own task so a slow cellular probe never blocks other clients.
pub async fn serve(listener: UnixListener, service: Arc<Service>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("control socket closed");
                return;
            }
            res = listener.accept() => match res {
                Ok((stream, _addr)) => {
                    let service = service.clone();
                    tokio::spawn(async move { incoming_stream(stream, &service).await });
                }
                Err(e) => tracing::error!(error = ?e, "error accepting connection"),
            }
        }
    }
}

async fn incoming_stream(mut stream: UnixStream, service: &Service) {
    let mut msg = String::new();
    if let Err(e) = stream.read_to_string(&mut msg).await {
        tracing::error!(error = ?e, "error reading message");
        return;
    }

    let cmd = match msg.parse::<Command>() {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::error!(error = ?e, %msg, "error parsing command");
            return;
        }
    };

    tracing::debug!(command = %cmd, "incoming command");
    let resp = service.handle(cmd).await;

    let str_resp = match serde_json::to_string(&resp) {
        Ok(res) => res,
        Err(e) => {
            tracing::error!(error = ?e, "error serializing response");
            return;
        }
    };

    if let Err(e) = stream.write_all(str_resp.as_bytes()).await {
        tracing::error!(error = ?e, "error writing response");
        return;
    }

    if let Err(e) = stream.flush().await {
        tracing::error!(error = ?e, "error flushing stream");
    }
}
