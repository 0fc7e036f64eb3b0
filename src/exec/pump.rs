// src/exec/pump.rs

//! Output pump: drains a child's stdout/stderr into an [`OutputSink`].
//!
//! A single task services both streams with `tokio::select!`, so neither can
//! starve the other and no polling sleep is needed. The pump stops once both
//! streams reach EOF, or once the drain deadline set through [`PumpControl`]
//! has elapsed, whichever comes first.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::sink::OutputSink;

/// Sender side of the drain signal.
///
/// The runner holds this; the pump holds the matching receiver.
#[derive(Debug)]
pub struct PumpControl {
    tx: watch::Sender<Option<Instant>>,
}

impl PumpControl {
    pub fn channel() -> (Self, watch::Receiver<Option<Instant>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Tell the pump to finish within `grace` from now.
    ///
    /// Only the first call sets the deadline.
    pub fn begin_drain(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(deadline);
                true
            } else {
                false
            }
        });
    }
}

/// What the pump did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
    /// `true` when the grace deadline cut the pump off before both EOFs.
    pub deadline_elapsed: bool,
}

enum PumpEvent {
    Stdout(io::Result<usize>),
    Stderr(io::Result<usize>),
    DrainChanged(bool),
    DeadlineElapsed,
}

/// Drain `stdout` and `stderr` into `sink` until both are closed or the
/// drain deadline passes.
///
/// Never returns an error: read failures are reported to the sink and the
/// failing stream is treated as closed.
pub async fn run_pump<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    sink: Arc<dyn OutputSink>,
    mut drain_rx: watch::Receiver<Option<Instant>>,
    buffer_size: usize,
) -> PumpReport
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = stdout;
    let mut stderr = stderr;
    let mut out_buf = vec![0u8; buffer_size.max(1)];
    let mut err_buf = vec![0u8; buffer_size.max(1)];
    let mut report = PumpReport::default();
    let mut deadline: Option<Instant> = *drain_rx.borrow_and_update();
    let mut drain_open = true;

    loop {
        if stdout.is_none() && stderr.is_none() {
            debug!(?report, "both streams closed; pump finished");
            break;
        }

        if matches!(deadline, Some(d) if Instant::now() >= d) {
            report.deadline_elapsed = true;
            break;
        }

        // Disabled select branches still evaluate their expression.
        let timer = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

        let event = tokio::select! {
            res = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => {
                PumpEvent::Stdout(res)
            }
            res = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => {
                PumpEvent::Stderr(res)
            }
            changed = drain_rx.changed(), if drain_open => {
                PumpEvent::DrainChanged(changed.is_ok())
            }
            _ = sleep_until(timer), if deadline.is_some() => PumpEvent::DeadlineElapsed,
        };

        match event {
            PumpEvent::Stdout(res) => {
                if let Some(n) = handle_read("stdout", res, sink.as_ref()) {
                    report.stdout_bytes += n as u64;
                    if let Err(e) = sink.write_out(&out_buf[..n]) {
                        warn!(error = %e, "failed to forward stdout to sink");
                    }
                } else {
                    stdout = None;
                }
            }
            PumpEvent::Stderr(res) => {
                if let Some(n) = handle_read("stderr", res, sink.as_ref()) {
                    report.stderr_bytes += n as u64;
                    if let Err(e) = sink.write_err(&err_buf[..n]) {
                        warn!(error = %e, "failed to forward stderr to sink");
                    }
                } else {
                    stderr = None;
                }
            }
            PumpEvent::DrainChanged(true) => {
                deadline = *drain_rx.borrow_and_update();
                debug!(?deadline, "pump received drain signal");
            }
            PumpEvent::DrainChanged(false) => {
                // Runner is gone; keep draining until EOF.
                drain_open = false;
            }
            PumpEvent::DeadlineElapsed => {
                report.deadline_elapsed = true;
                break;
            }
        }
    }

    if report.deadline_elapsed {
        warn!(
            stdout_open = stdout.is_some(),
            stderr_open = stderr.is_some(),
            "grace period elapsed; closing output streams"
        );
    }

    // Dropping the readers closes the pipes.
    drop(stdout);
    drop(stderr);

    report
}

/// `Some(n)` for data, `None` when the stream is finished (EOF or error).
fn handle_read(stream: &'static str, res: io::Result<usize>, sink: &dyn OutputSink) -> Option<usize> {
    match res {
        Ok(0) => {
            debug!(stream, "stream reached EOF");
            None
        }
        Ok(n) => Some(n),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Some(0),
        Err(e) => {
            warn!(stream, error = %e, "error reading child output");
            sink.notice(&format!("error reading {stream}: {e}"));
            None
        }
    }
}

async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}
