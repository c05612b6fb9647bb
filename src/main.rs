//! argus — live MJPEG camera distribution service.

use std::net::SocketAddr;
use std::time::Duration;

use argus::recording::StopRecording;
use argus::{pipeline, server, watchdog, CameraService, CaptureSupervisor, Config};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argus=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("argus launching...");

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).wrap_err("loading configuration")?;

    let stream_addr: SocketAddr = config
        .server
        .stream_addr
        .parse()
        .wrap_err("parsing server.stream_addr")?;
    let control_addr: SocketAddr = config
        .server
        .control_addr
        .parse()
        .wrap_err("parsing server.control_addr")?;

    let shutdown = CancellationToken::new();
    let service =
        CameraService::new(&config, shutdown.clone()).wrap_err("creating artifact directories")?;

    // capture → pipeline
    let (chunk_tx, chunk_rx) = flume::bounded(config.pipeline.channel_depth);
    let supervisor = CaptureSupervisor::new(config.capture.clone()).start(
        chunk_tx,
        service.heartbeat.clone(),
        shutdown.clone(),
    );
    let pipeline = pipeline::spawn(chunk_rx, service.clone());

    // periodic tasks
    let fps_window = service.fps.spawn_window(
        Duration::from_millis(config.pipeline.fps_window_ms),
        shutdown.clone(),
    );
    let disk_watchdog = watchdog::spawn_disk(
        service.clone(),
        config.storage.recordings_dir.clone(),
        config.storage.min_free_bytes,
        Duration::from_millis(config.watchdog.disk_interval_ms),
        shutdown.clone(),
    );
    let link_watchdog = watchdog::spawn_link(
        service.clone(),
        config.watchdog.wireless_iface.clone(),
        Duration::from_millis(config.watchdog.link_interval_ms),
        shutdown.clone(),
    );

    // listeners, bound up front so a taken port fails the launch
    let stream_listener = tokio::net::TcpListener::bind(stream_addr)
        .await
        .wrap_err_with(|| format!("binding stream listener on {stream_addr}"))?;
    let control_listener = tokio::net::TcpListener::bind(control_addr)
        .await
        .wrap_err_with(|| format!("binding control listener on {control_addr}"))?;
    let stream_server = tokio::spawn(server::serve(
        server::stream_router(service.clone()),
        stream_listener,
        shutdown.clone(),
    ));
    let control_server = tokio::spawn(server::serve(
        server::control_router(service.clone()),
        control_listener,
        shutdown.clone(),
    ));

    let mut sigterm = signal(SignalKind::terminate()).wrap_err("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    // Ordered teardown: close the recording first (best-effort finalize),
    // then cancel everything at once — the supervisor terminates the capture
    // process, viewer streams end, both listeners drain.
    let teardown = async {
        if let StopRecording::Stopped { output, .. } = service.recorder.stop().await {
            info!(output = %output.display(), "closed active recording");
        }
        service.recorder.wait_for_finalize().await;
        shutdown.cancel();
        for (name, handle) in [
            ("supervisor", supervisor),
            ("pipeline", pipeline),
            ("fps", fps_window),
            ("disk watchdog", disk_watchdog),
            ("link watchdog", link_watchdog),
        ] {
            if let Err(e) = handle.await {
                warn!("{name} task ended abnormally: {e}");
            }
        }
        for (name, handle) in [("stream", stream_server), ("control", control_server)] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{name} listener: {e}"),
                Err(e) => warn!("{name} listener task ended abnormally: {e}"),
            }
        }
    };

    let timeout = Duration::from_millis(config.server.shutdown_timeout_ms);
    if tokio::time::timeout(timeout, teardown).await.is_err() {
        error!("teardown exceeded {timeout:?}, forcing exit");
        std::process::exit(1);
    }

    info!("argus shut down cleanly");
    Ok(())
}
