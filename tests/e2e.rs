//! End-to-end tests driving the real supervisor, pipeline, and hub with a
//! scripted stand-in for the capture subprocess. No camera hardware needed.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use argus::capture::CaptureEvent;
use argus::{pipeline, CameraService, CaptureSupervisor, Config};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

/// Write an executable shell script that plays the capture program.
fn capture_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// Script emitting `n` JPEG-delimited frames then holding the pipe open.
fn frames_then_hold(dir: &Path, n: u32) -> String {
    capture_script(
        dir,
        "frames-then-hold.sh",
        &format!(
            "i=0\n\
             while [ $i -lt {n} ]; do\n\
             \x20 printf '\\377\\330FRAME-%d\\377\\331' $i\n\
             \x20 i=$((i+1))\n\
             done\n\
             sleep 60\n"
        ),
    )
}

fn test_config(dir: &Path, program: &str) -> Config {
    let mut config = Config::default();
    config.capture.program = program.into();
    config.capture.stall_timeout_ms = 10_000;
    config.capture.stop_grace_ms = 500;
    config.storage.snapshots_dir = dir.join("snapshots");
    config.storage.recordings_dir = dir.join("recordings");
    config.storage.min_free_bytes = 0;
    config.storage.encoder_program = "/bin/false".into();
    config
}

/// Spawn the supervisor + pipeline over an already built service, so tests
/// can attach viewers or start a recording before the first frame flows.
fn spawn_capture_stack(
    config: &Config,
    service: &Arc<CameraService>,
    shutdown: &CancellationToken,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = flume::bounded(config.pipeline.channel_depth);
    let supervisor = CaptureSupervisor::new(config.capture.clone()).start(
        tx,
        service.heartbeat.clone(),
        shutdown.clone(),
    );
    let pipeline = pipeline::spawn(rx, service.clone());
    (supervisor, pipeline)
}

fn viewer_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 55555))
}

#[tokio::test(flavor = "multi_thread")]
async fn scripted_capture_frames_reach_a_viewer() {
    let dir = tempfile::tempdir().unwrap();
    let program = frames_then_hold(dir.path(), 3);
    let config = test_config(dir.path(), &program);

    let shutdown = CancellationToken::new();
    let service = CameraService::new(&config, shutdown.clone()).unwrap();
    let viewer = service.hub.attach(viewer_addr());
    let mut body = Box::pin(viewer.into_body_stream(shutdown.clone()));
    let _stack = spawn_capture_stack(&config, &service, &shutdown);

    for i in 0..3u32 {
        let part = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("timed out waiting for a part")
            .expect("stream ended early")
            .unwrap();
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(text.contains(&format!("FRAME-{i}")), "part {i}: {text}");
    }

    // snapshot now works and holds the last frame
    let saved = service.snapshots.capture().await.unwrap();
    let bytes = std::fs::read(&saved).unwrap();
    assert!(bytes.starts_with(&[0xFF, 0xD8]));
    assert!(bytes.ends_with(&[0xFF, 0xD9]));

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn capture_exit_degrades_but_does_not_kill_the_service() {
    let dir = tempfile::tempdir().unwrap();
    // emits two frames then exits with an error
    let program = capture_script(
        dir.path(),
        "exit-early.sh",
        "printf '\\377\\330A\\377\\331'\nprintf '\\377\\330B\\377\\331'\nexit 3\n",
    );
    let config = test_config(dir.path(), &program);

    let shutdown = CancellationToken::new();
    let service = CameraService::new(&config, shutdown.clone()).unwrap();
    let (_supervisor, pipeline) = spawn_capture_stack(&config, &service, &shutdown);

    // the pipeline loop ends once the supervisor hangs up the channel
    tokio::time::timeout(Duration::from_secs(5), pipeline)
        .await
        .expect("pipeline did not drain after capture exit")
        .unwrap();

    // both frames made it through before the exit, and the command surface
    // still answers
    assert_eq!(service.frames_total(), 2);
    let status = service.status().await;
    assert_eq!(status.frames, 2);
    assert!(service.snapshots.capture().await.is_ok());

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn supervisor_reports_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let program = capture_script(dir.path(), "exit-now.sh", "exit 7\n");
    let mut config = test_config(dir.path(), &program);
    config.capture.stall_timeout_ms = 10_000;

    let shutdown = CancellationToken::new();
    let heartbeat = Arc::new(argus::Heartbeat::new());
    let (tx, rx) = flume::bounded(16);
    CaptureSupervisor::new(config.capture.clone()).start(tx, heartbeat, shutdown.clone());

    let mut exit_code = None;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_secs(5), rx.recv_async()).await
    {
        if let CaptureEvent::Exited(code) = event {
            exit_code = code;
            break;
        }
    }
    assert_eq!(exit_code, Some(7));
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_capture_is_restarted_and_frames_resume() {
    let dir = tempfile::tempdir().unwrap();
    // one frame, then silence: every spawn stalls after its first frame
    let program = capture_script(
        dir.path(),
        "stall.sh",
        "printf '\\377\\330ONCE\\377\\331'\nsleep 60\n",
    );
    let mut config = test_config(dir.path(), &program);
    config.capture.stall_timeout_ms = 300;
    config.capture.max_stall_restarts = 2;

    let shutdown = CancellationToken::new();
    let heartbeat = Arc::new(argus::Heartbeat::new());
    let (tx, rx) = flume::bounded(16);
    CaptureSupervisor::new(config.capture.clone()).start(
        tx,
        heartbeat.clone(),
        shutdown.clone(),
    );

    let mut saw_restart = false;
    let mut frames_after_restart = 0u32;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv_async()).await
        else {
            break;
        };
        match event {
            CaptureEvent::Data(chunk) => {
                // never beat the heartbeat: every child looks stalled
                if saw_restart && chunk.windows(4).any(|w| w == b"ONCE") {
                    frames_after_restart += 1;
                    break;
                }
            }
            CaptureEvent::Restarted => saw_restart = true,
            CaptureEvent::Exited(_) => break,
        }
    }

    assert!(saw_restart, "supervisor never restarted the stalled capture");
    assert!(
        frames_after_restart > 0,
        "no frames arrived from the respawned capture"
    );
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn stall_restart_budget_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    // pure silence: stalls forever, never produces a frame
    let program = capture_script(dir.path(), "silent.sh", "sleep 60\n");
    let mut config = test_config(dir.path(), &program);
    config.capture.stall_timeout_ms = 200;
    config.capture.max_stall_restarts = 2;

    let shutdown = CancellationToken::new();
    let heartbeat = Arc::new(argus::Heartbeat::new());
    let (tx, rx) = flume::bounded(16);
    let supervisor =
        CaptureSupervisor::new(config.capture.clone()).start(tx, heartbeat, shutdown.clone());

    let mut restarts = 0u32;
    let mut gave_up = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_secs(10), rx.recv_async()).await
    {
        match event {
            CaptureEvent::Restarted => restarts += 1,
            CaptureEvent::Exited(_) => {
                gave_up = true;
                break;
            }
            CaptureEvent::Data(_) => {}
        }
    }

    assert_eq!(restarts, 2);
    assert!(gave_up, "supervisor must surface a degraded condition");
    tokio::time::timeout(Duration::from_secs(5), supervisor)
        .await
        .expect("supervisor task did not end")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_terminates_the_child_within_grace() {
    let dir = tempfile::tempdir().unwrap();
    let program = frames_then_hold(dir.path(), 1);
    let mut config = test_config(dir.path(), &program);
    config.capture.stop_grace_ms = 500;

    let shutdown = CancellationToken::new();
    let service = CameraService::new(&config, shutdown.clone()).unwrap();
    let (supervisor, _pipeline) = spawn_capture_stack(&config, &service, &shutdown);

    // wait until the child is demonstrably alive
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while service.frames_total() == 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown.cancel();
    // SIGTERM + grace + a margin; the supervisor must wind down within it
    tokio::time::timeout(Duration::from_millis(1_500), supervisor)
        .await
        .expect("supervisor did not terminate the child within the grace period")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn recording_captures_the_scripted_frames() {
    let dir = tempfile::tempdir().unwrap();
    let program = frames_then_hold(dir.path(), 3);
    let config = test_config(dir.path(), &program);

    let shutdown = CancellationToken::new();
    let service = CameraService::new(&config, shutdown.clone()).unwrap();
    assert!(matches!(
        service.recorder.start().await.unwrap(),
        argus::recording::StartRecording::Started { .. }
    ));
    let _stack = spawn_capture_stack(&config, &service, &shutdown);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while service.frames_total() < 3 {
        assert!(tokio::time::Instant::now() < deadline, "frames never arrived");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let argus::recording::StopRecording::Stopped { raw, .. } = service.recorder.stop().await
    else {
        panic!("expected an active session");
    };
    service.recorder.wait_for_finalize().await;

    // raw container kept (encoder is /bin/false) and holds whole frames
    let bytes = std::fs::read(&raw).unwrap();
    assert!(bytes.starts_with(&[0xFF, 0xD8]));
    assert!(bytes.ends_with(&[0xFF, 0xD9]));
    assert!(bytes.windows(7).any(|w| w == b"FRAME-0"));

    shutdown.cancel();
}
