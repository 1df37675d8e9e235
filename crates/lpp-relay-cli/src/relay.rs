//! One relay run: start the workers, supervise the client, shut down.
//!
//! The run ends when the correction client exits, whether on its own, after
//! a parameter change (the loop interrupts it for a restart) or on a
//! termination signal. Relaunching is left to the host service manager.

use std::sync::Arc;
use std::time::Duration;

use lpp_relay_core::{CellularIdentity, Parameters};
use lpp_relay_runtime::{
    BroadcastHub, ClientCommandBuilder, ClientVersion, IngestServer, LoopState, NmeaWindow,
    ProcessSupervisor, RecordPipeline, ReconfigureLoop, StorePublisher, SubscriberListener,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bootstrap::{RelayContext, ensure_store_layout};
use crate::error::CliError;
use crate::signals::{forward_shutdown, kill_after_grace};

/// Upper bound for each worker to finish after cancellation.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Run the relay until the correction client exits; returns its exit code.
pub async fn run(ctx: RelayContext) -> Result<i32, CliError> {
    let params = ctx.device.read_parameters().await?;
    let cellular = ctx.device.read_cellular().await?;
    info!(?params, "launch parameters");
    info!(cellular = %cellular.summary(), "cellular identity");

    ensure_store_layout(ctx.store.as_ref(), &params).await;

    let cancel_token = CancellationToken::new();
    let workers = start_nmea_workers(&ctx, &params, &cancel_token).await?;

    let code = supervise(&ctx, params, cellular, &cancel_token).await;

    cancel_token.cancel();
    join_workers(workers).await;
    Ok(code)
}

async fn start_nmea_workers(
    ctx: &RelayContext,
    params: &Parameters,
    cancel_token: &CancellationToken,
) -> Result<Vec<Worker>, CliError> {
    let mut workers = Vec::new();
    if !params.output.ingests_locally() {
        info!(output = ?params.output, "client exports NMEA directly, ingestion disabled");
        return Ok(workers);
    }

    let settings = &ctx.settings;
    let hub = Arc::new(BroadcastHub::new(settings.subscriber_write_timeout));
    let mut pipeline = RecordPipeline::new(NmeaWindow::new(settings.retention), Arc::clone(&hub))
        .with_record_logging(params.log_nmea);

    if let Some(path) = &params.nmea_store_path {
        let (snapshots, receiver) = watch::channel(Vec::new());
        pipeline = pipeline.with_snapshots(snapshots);
        let publisher = StorePublisher::new(Arc::clone(&ctx.store), path.clone());
        workers.push(Worker {
            name: "publisher",
            handle: publisher.spawn(receiver, cancel_token.clone()),
        });
    } else {
        info!("store path empty, record window is not published");
    }

    let server = IngestServer::bind(&settings.nmea_socket, settings.ingest_idle_timeout).await?;
    workers.push(Worker {
        name: "ingest",
        handle: tokio::spawn(server.serve(pipeline, cancel_token.clone())),
    });

    if let Some(port) = params.output.fanout_port() {
        let listener =
            SubscriberListener::bind(&format!("0.0.0.0:{port}"), hub, settings.max_subscribers)
                .await?;
        workers.push(Worker {
            name: "subscribers",
            handle: tokio::spawn(listener.serve(cancel_token.clone())),
        });
    }

    Ok(workers)
}

async fn supervise(
    ctx: &RelayContext,
    params: Parameters,
    cellular: CellularIdentity,
    cancel_token: &CancellationToken,
) -> i32 {
    let settings = &ctx.settings;
    let version = ClientVersion::from_major(settings.client_major_version());
    info!(
        release = %settings.client_version,
        binary = version.binary_name(),
        "selected correction client"
    );
    let command = ClientCommandBuilder::new(version, &settings.client_dir, &settings.nmea_socket)
        .build(&params, &cellular);

    let supervisor = Arc::new(ProcessSupervisor::new(command));
    let control = ReconfigureLoop::new(
        supervisor.clone(),
        ctx.device.clone(),
        settings.poll_interval,
        params,
        cellular,
    );
    // An interrupted client that ignores SIGINT is killed after the grace
    // period so the relay still exits for a restart.
    let control_task = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        let cancel_token = cancel_token.clone();
        let grace = settings.shutdown_grace;
        async move {
            let state = control
                .run(supervisor.subscribe(), cancel_token.clone())
                .await;
            if state == LoopState::RestartPending {
                kill_after_grace(&supervisor, grace, &cancel_token).await;
            }
            state
        }
    });
    let signal_task = tokio::spawn(forward_shutdown(
        Arc::clone(&supervisor),
        settings.shutdown_grace,
        cancel_token.clone(),
    ));

    let code = supervisor.start().await;
    cancel_token.cancel();

    match timeout(WORKER_JOIN_TIMEOUT, control_task).await {
        Ok(Ok(LoopState::RestartPending)) => {
            info!("configuration changed, exiting for restart");
        }
        Ok(Ok(state)) => debug!(?state, "reconfiguration loop finished"),
        Ok(Err(e)) => warn!(error = %e, "reconfiguration loop panicked"),
        Err(_) => warn!("reconfiguration loop did not stop in time"),
    }
    if timeout(WORKER_JOIN_TIMEOUT, signal_task).await.is_err() {
        warn!("signal handler did not stop in time");
    }

    info!(code, "exiting, hopefully restarting");
    code
}

async fn join_workers(workers: Vec<Worker>) {
    for Worker { name, handle } in workers {
        match timeout(WORKER_JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => debug!(worker = name, "worker stopped"),
            Ok(Err(e)) => warn!(worker = name, error = %e, "worker panicked"),
            Err(_) => warn!(worker = name, "worker did not stop in time"),
        }
    }
}
