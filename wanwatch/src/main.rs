use tokio::fs;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use wanwatch_lib::logging::{self, LogReloadHandle};
use wanwatch_lib::{config, quality};

use crate::controller::Controller;
use crate::icmp::{self, RawEchoOps};
use crate::liveness::Prober;
use crate::routing::Reconciler;
use crate::routing::netlink_ops::RealNetlinkOps;
use crate::routing::shell_ops::RealShellOps;
use crate::server::Service;

mod active;
mod cli;
mod controller;
mod icmp;
mod liveness;
mod routing;
mod server;

// Avoid musl's default allocator due to degraded performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// SIGINT and SIGTERM cancel `cancel`, SIGHUP reopens the log file.
fn signal_handler(
    cancel: CancellationToken,
    log_file: Option<(LogReloadHandle, PathBuf)>,
) -> Result<(), exitcode::ExitCode> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
        tracing::error!(error = ?e, "error setting up SIGINT handler");
        exitcode::IOERR
    })?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        tracing::error!(error = ?e, "error setting up SIGTERM handler");
        exitcode::IOERR
    })?;
    let mut sighup = signal(SignalKind::hangup()).map_err(|e| {
        tracing::error!(error = ?e, "error setting up SIGHUP handler");
        exitcode::IOERR
    })?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(_) = sigint.recv() => {
                    tracing::debug!("received SIGINT");
                    cancel.cancel();
                    break;
                },
                Some(_) = sigterm.recv() => {
                    tracing::debug!("received SIGTERM");
                    cancel.cancel();
                    break;
                },
                Some(_) = sighup.recv() => {
                    tracing::debug!("received SIGHUP");
                    if let Some((handle, path)) = &log_file {
                        match logging::reopen_log_file(handle, path) {
                            Ok(()) => tracing::info!(path = %path.display(), "reopened log file"),
                            Err(e) => tracing::error!(error = %e, "error reopening log file"),
                        }
                    }
                },
                else => {
                    tracing::warn!("signal streams closed");
                    break;
                }
            }
        }
    });

    Ok(())
}

async fn daemon(args: cli::Cli, log_file: Option<(LogReloadHandle, PathBuf)>) -> Result<(), exitcode::ExitCode> {
    let config = config::read(&args.config_path).await.map_err(|err| {
        tracing::error!(error = %err, path = %args.config_path.display(), "error reading configuration");
        exitcode::CONFIG
    })?;
    tracing::info!(
        interfaces = config.interfaces.len(),
        healthcheck = %config.healthcheck,
        interval = ?config.interval,
        timeout = ?config.timeout,
        "loaded configuration"
    );

    let (conn, handle, _) = rtnetlink::new_connection().map_err(|err| {
        tracing::error!(error = ?err, "error opening netlink connection");
        exitcode::OSERR
    })?;
    tokio::task::spawn(conn);
    let netlink = RealNetlinkOps::new(handle);

    let prober = Prober::new(
        netlink.clone(),
        RawEchoOps::new(icmp::Options::default()),
        config.healthcheck,
        config.timeout,
    );
    let reconciler = Reconciler::new(netlink, RealShellOps);
    let devices = config.interfaces.iter().map(|i| i.device.clone()).collect();
    let controller = Controller::new(devices, prober, reconciler);
    let service = Service::new(controller.active(), quality::probes(&config.interfaces));

    let listener = server::bind(&args.socket_path).await.map_err(|err| {
        tracing::error!(error = %err, "error setting up control socket");
        match err {
            server::Error::AlreadyRunning(_) => exitcode::TEMPFAIL,
            _ => exitcode::IOERR,
        }
    })?;

    let cancel = CancellationToken::new();
    signal_handler(cancel.clone(), log_file)?;

    let ctrl_task = tokio::spawn(controller.run(config.interval, cancel.clone()));
    let server_task = tokio::spawn(server::serve(listener, Arc::new(service), cancel.clone()));

    let (ctrl_res, server_res) = tokio::join!(ctrl_task, server_task);
    if let Err(e) = ctrl_res {
        tracing::error!(error = ?e, "controller task failed");
    }
    if let Err(e) = server_res {
        tracing::error!(error = ?e, "control socket task failed");
    }

    let _ = fs::remove_file(&args.socket_path).await.map_err(|err| {
        tracing::error!(error = ?err, "failed removing socket");
    });
    Ok(())
}

/// one thread keeps the control socket responsive while the other probes
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() {
    let args = cli::parse();

    let log_file = match &args.log_file {
        Some(path) => match logging::setup_log_file(path) {
            Ok(handle) => Some((handle, path.clone())),
            Err(e) => {
                eprintln!("error opening log file {}: {e}", path.display());
                process::exit(exitcode::CANTCREAT);
            }
        },
        None => {
            logging::setup_stdout();
            None
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting {}",
        env!("CARGO_PKG_NAME")
    );

    match daemon(args, log_file).await {
        Ok(_) => tracing::info!("shutdown complete"),
        Err(code) => {
            tracing::warn!("abnormal exit");
            process::exit(code);
        }
    }
}
