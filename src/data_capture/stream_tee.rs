//! The copy-with-log primitive used once per direction per connection.
//!
//! [`relay`] pumps bytes from a source to a destination in bounded chunks,
//! appending every chunk to a capture log before forwarding it. The capture
//! log is a side-channel: a failing log file is reported and tolerated,
//! forwarding always has priority.

use std::path::{Path, PathBuf};

use log::{error, trace};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use super::types::{Direction, TeeOutcome};
use crate::error_handling::types::CaptureError;

/// Upper bound on a single read. Chunks are never batched across iterations.
pub const CHUNK_SIZE: usize = 1024;

/// Pumps `source` into `destination` until end-of-stream, an unrecoverable
/// I/O error, or cancellation, appending each chunk to `log_path` before it
/// is forwarded.
///
/// Within one call, bytes are logged and forwarded in read order. On
/// end-of-stream the destination writer is shut down so the peer observes
/// EOF instead of hanging.
pub async fn relay<R, W>(
    mut source: R,
    mut destination: W,
    log_path: PathBuf,
    connection_id: u64,
    direction: Direction,
    mut cancel: watch::Receiver<bool>,
) -> Result<TeeOutcome, CaptureError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        // The signal may have fired before this receiver was handed over.
        if *cancel.borrow() {
            return Ok(TeeOutcome::Cancelled);
        }

        let n = tokio::select! {
            _ = cancel.changed() => return Ok(TeeOutcome::Cancelled),
            read = source.read(&mut buf) => match read {
                Ok(n) => n,
                Err(e) => return Err(CaptureError::TcpStreamError(e)),
            },
        };

        if n == 0 {
            trace!(
                "[#{}] {} EOF; shutting down peer writer",
                connection_id,
                direction
            );
            let _ = destination.shutdown().await;
            return Ok(TeeOutcome::SourceClosed);
        }

        // Capture before forwarding, and never let the log file take the
        // relay down with it.
        if let Err(e) = append_chunk(&log_path, &buf[..n]).await {
            error!(
                "An error occurred when appending to the file {}: {}",
                log_path.display(),
                e
            );
        }

        if destination.write_all(&buf[..n]).await.is_err() {
            return Ok(TeeOutcome::DestinationClosed);
        }

        let preview = &buf[..std::cmp::min(n, 64)];
        trace!(
            "[#{}] relayed {} {} bytes: {}{}",
            connection_id,
            direction,
            n,
            String::from_utf8_lossy(preview),
            if n > 64 { " ..." } else { "" }
        );
    }
}

async fn append_chunk(path: &Path, chunk: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(chunk).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relay_logs_then_forwards() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("1_client.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let (mut src_w, src_r) = duplex(64);
        let (dst_w, mut dst_r) = duplex(64);

        src_w.write_all(b"PING").await.unwrap();
        drop(src_w);

        let outcome = relay(
            src_r,
            dst_w,
            log_path.clone(),
            1,
            Direction::ClientToUpstream,
            cancel_rx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TeeOutcome::SourceClosed);

        let mut forwarded = Vec::new();
        dst_r.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"PING");
        assert_eq!(std::fs::read(&log_path).unwrap(), b"PING");
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_relay_preserves_order_across_many_chunks() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("1_client.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Several times the read buffer, with distinguishable bytes so any
        // reordering or loss across iterations shows up in the comparison.
        let payload: Vec<u8> = (0..3 * CHUNK_SIZE).map(|i| (i % 251) as u8).collect();

        let (mut src_w, src_r) = duplex(256);
        let (dst_w, mut dst_r) = duplex(256);

        let pump = tokio::spawn(relay(
            src_r,
            dst_w,
            log_path.clone(),
            1,
            Direction::ClientToUpstream,
            cancel_rx,
        ));

        let to_send = payload.clone();
        let feeder = tokio::spawn(async move {
            src_w.write_all(&to_send).await.unwrap();
            // src_w drops here, signalling EOF to the pump.
        });

        let mut forwarded = Vec::new();
        dst_r.read_to_end(&mut forwarded).await.unwrap();

        feeder.await.unwrap();
        let outcome = pump.await.unwrap().unwrap();
        assert_eq!(outcome, TeeOutcome::SourceClosed);

        assert_eq!(forwarded, payload);
        assert_eq!(std::fs::read(&log_path).unwrap(), payload);
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_relay_tolerates_log_failure() {
        let dir = TempDir::new().unwrap();
        // Parent directory does not exist, every append fails.
        let log_path = dir.path().join("missing").join("1_client.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let (mut src_w, src_r) = duplex(64);
        let (dst_w, mut dst_r) = duplex(64);

        src_w.write_all(b"PING").await.unwrap();
        drop(src_w);

        let outcome = relay(
            src_r,
            dst_w,
            log_path.clone(),
            1,
            Direction::ClientToUpstream,
            cancel_rx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TeeOutcome::SourceClosed);

        // Forwarding survived the failing side-channel.
        let mut forwarded = Vec::new();
        dst_r.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"PING");
        assert!(!log_path.exists());
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_relay_without_data_creates_no_log() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("1_client.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let (src_w, src_r) = duplex(64);
        let (dst_w, _dst_r) = duplex(64);
        drop(src_w);

        let outcome = relay(
            src_r,
            dst_w,
            log_path.clone(),
            1,
            Direction::ClientToUpstream,
            cancel_rx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TeeOutcome::SourceClosed);
        assert!(!log_path.exists());
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_relay_observes_cancellation() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("1_server.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Source never produces data and is kept open, so only the
        // cancellation signal can end the pump.
        let (_src_w, src_r) = duplex(64);
        let (dst_w, _dst_r) = duplex(64);

        let pump = tokio::spawn(relay(
            src_r,
            dst_w,
            log_path,
            1,
            Direction::UpstreamToClient,
            cancel_rx,
        ));

        cancel_tx.send(true).unwrap();
        let outcome = pump.await.unwrap().unwrap();
        assert_eq!(outcome, TeeOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_relay_stops_when_destination_closes() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("1_client.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let (mut src_w, src_r) = duplex(64);
        let (dst_w, dst_r) = duplex(64);
        drop(dst_r);

        src_w.write_all(b"DATA").await.unwrap();

        let outcome = relay(
            src_r,
            dst_w,
            log_path.clone(),
            1,
            Direction::ClientToUpstream,
            cancel_rx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TeeOutcome::DestinationClosed);

        // The chunk was still captured before the failed forward.
        assert_eq!(std::fs::read(&log_path).unwrap(), b"DATA");
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_relay_read_error_is_terminal() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("7_server.txt");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let source = tokio_test::io::Builder::new()
            .read(b"AB")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let (dst_w, mut dst_r) = duplex(64);

        let err = relay(
            source,
            dst_w,
            log_path.clone(),
            7,
            Direction::UpstreamToClient,
            cancel_rx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CaptureError::TcpStreamError(_)));

        // The chunk read before the error was logged and forwarded.
        assert_eq!(std::fs::read(&log_path).unwrap(), b"AB");
        let mut forwarded = vec![0u8; 2];
        dst_r.read_exact(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"AB");
        drop(cancel_tx);
    }
}
