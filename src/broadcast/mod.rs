//! Fan-out of extracted frames to every connected HTTP viewer.
//!
//! Each frame is encoded once into a complete multipart part and pushed
//! through a bounded `tokio::sync::broadcast` channel; every viewer holds a
//! receiver wrapped into its response body stream. A viewer that falls
//! behind the buffer is dropped at its next poll, so one stuck connection
//! can never stall the producer or the other viewers. Attach and detach are
//! safe concurrent with an in-flight broadcast.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::Frame;

pub struct BroadcastHub {
    tx: broadcast::Sender<Bytes>,
    boundary: String,
}

impl BroadcastHub {
    /// `buffer` is how many encoded parts a viewer may lag before it is
    /// dropped.
    pub fn new(boundary: impl Into<String>, buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            boundary: boundary.into(),
        }
    }

    /// Value for the stream response's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Register a viewer. It observes every frame broadcast from now on;
    /// a re-attach after an idle period starts clean at the next frame.
    pub fn attach(&self, remote: SocketAddr) -> ViewerConn {
        let rx = self.tx.subscribe();
        info!(%remote, viewers = self.tx.receiver_count(), "viewer connected");
        metrics::gauge!("argus_viewers").set(self.tx.receiver_count() as f64);
        ViewerConn { rx, remote }
    }

    /// Push one frame to every viewer. Returns whether anything was
    /// delivered: with no viewers attached this skips the encode entirely,
    /// and the caller skips its FPS accounting.
    pub fn broadcast(&self, frame: &Frame) -> bool {
        if self.tx.receiver_count() == 0 {
            return false;
        }
        metrics::histogram!("argus_frame_bytes").record(frame.len() as f64);
        // send only errors when the last receiver detached mid-call
        let _ = self.tx.send(self.encode_part(frame));
        true
    }

    /// One complete multipart part:
    /// `--<boundary>\r\n` headers `\r\n\r\n` frame bytes `\r\n`.
    fn encode_part(&self, frame: &Frame) -> Bytes {
        let header = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            self.boundary,
            frame.len()
        );
        let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
        part.put_slice(header.as_bytes());
        part.put_slice(&frame.data);
        part.put_slice(b"\r\n");
        part.freeze()
    }
}

/// One registered viewer, alive until its receiver is dropped.
pub struct ViewerConn {
    rx: broadcast::Receiver<Bytes>,
    remote: SocketAddr,
}

impl ViewerConn {
    /// Turn the connection into the response body: a stream of encoded parts
    /// that ends on client disconnect (the body is dropped), on lag past the
    /// hub buffer, or on service shutdown.
    pub fn into_body_stream(
        self,
        shutdown: CancellationToken,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        let remote = self.remote;
        let guard = DisconnectLog { remote };
        BroadcastStream::new(self.rx)
            .take_until(shutdown.cancelled_owned())
            .take_while(move |part| {
                let keep = part.is_ok();
                if !keep {
                    warn!(%remote, "viewer lagged behind the broadcast buffer, dropping");
                }
                futures_util::future::ready(keep)
            })
            .map(move |part| {
                let _ = &guard; // logs the disconnect when the body is dropped
                Ok(part.unwrap_or_default())
            })
    }
}

struct DisconnectLog {
    remote: SocketAddr,
}

impl Drop for DisconnectLog {
    fn drop(&mut self) {
        info!(remote = %self.remote, "viewer disconnected");
    }
}
