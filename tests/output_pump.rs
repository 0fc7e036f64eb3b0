mod common;
use crate::common::{init_tracing, with_timeout, CaptureSink};

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{duplex, AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};

use procwatch::exec::{run_pump, PumpControl};
use procwatch::OutputSink;

#[tokio::test]
async fn forwards_both_streams_until_eof() {
    init_tracing();

    let (mut out_w, out_r) = duplex(64);
    let (mut err_w, err_r) = duplex(64);
    let sink = Arc::new(CaptureSink::new());
    let (_control, drain_rx) = PumpControl::channel();

    let pump = tokio::spawn(run_pump(Some(out_r), Some(err_r), sink.clone(), drain_rx, 16));

    out_w.write_all(b"first line\n").await.unwrap();
    err_w.write_all(b"warning\n").await.unwrap();
    out_w.write_all(b"second line\n").await.unwrap();
    drop(out_w);
    drop(err_w);

    let report = with_timeout(pump).await.unwrap();

    assert_eq!(sink.stdout(), "first line\nsecond line\n");
    assert_eq!(sink.stderr(), "warning\n");
    assert_eq!(report.stdout_bytes, 23);
    assert_eq!(report.stderr_bytes, 8);
    assert!(!report.deadline_elapsed);
}

#[tokio::test]
async fn one_closed_stream_does_not_stop_the_other() {
    init_tracing();

    let (out_w, out_r) = duplex(64);
    let (mut err_w, err_r) = duplex(64);
    let sink = Arc::new(CaptureSink::new());
    let (_control, drain_rx) = PumpControl::channel();

    drop(out_w);
    let pump = tokio::spawn(run_pump(Some(out_r), Some(err_r), sink.clone(), drain_rx, 64));

    tokio::time::sleep(Duration::from_millis(20)).await;
    err_w.write_all(b"late").await.unwrap();
    drop(err_w);

    with_timeout(pump).await.unwrap();
    assert_eq!(sink.stderr(), "late");
    assert!(sink.stdout().is_empty());
}

#[tokio::test]
async fn grace_deadline_closes_open_streams() {
    init_tracing();

    let (mut out_w, out_r) = duplex(64);
    let sink = Arc::new(CaptureSink::new());
    let (control, drain_rx) = PumpControl::channel();

    let pump = tokio::spawn(run_pump(Some(out_r), None::<DuplexStream>, sink.clone(), drain_rx, 64));

    out_w.write_all(b"before drain\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    control.begin_drain(Duration::from_millis(100));
    // Writer stays open: only the deadline can end the pump.
    let report = with_timeout(pump).await.unwrap();

    assert!(report.deadline_elapsed);
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert_eq!(sink.stdout(), "before drain\n");
    drop(out_w);
}

#[tokio::test]
async fn first_drain_deadline_wins() {
    init_tracing();

    let (_out_w, out_r) = duplex(64);
    let sink = Arc::new(CaptureSink::new());
    let (control, drain_rx) = PumpControl::channel();

    control.begin_drain(Duration::from_millis(50));
    control.begin_drain(Duration::from_secs(60));

    let report = with_timeout(run_pump(Some(out_r), None::<DuplexStream>, sink, drain_rx, 64)).await;
    assert!(report.deadline_elapsed);
}

#[tokio::test]
async fn pump_exits_with_no_streams() {
    let sink = Arc::new(CaptureSink::new());
    let (_control, drain_rx) = PumpControl::channel();

    let report =
        with_timeout(run_pump(None::<DuplexStream>, None::<DuplexStream>, sink, drain_rx, 64)).await;
    assert_eq!(report.stdout_bytes, 0);
    assert!(!report.deadline_elapsed);
}

/// Sink whose primary stream always fails.
#[derive(Default)]
struct BrokenStdoutSink {
    inner: CaptureSink,
}

impl OutputSink for BrokenStdoutSink {
    fn write_out(&self, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "console gone"))
    }

    fn write_err(&self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_err(bytes)
    }
}

#[tokio::test]
async fn sink_failure_on_stdout_keeps_pumping_stderr() {
    init_tracing();

    let (mut out_w, out_r) = duplex(64);
    let (mut err_w, err_r) = duplex(64);
    let sink = Arc::new(BrokenStdoutSink::default());
    let (_control, drain_rx) = PumpControl::channel();

    let pump = tokio::spawn(run_pump(Some(out_r), Some(err_r), sink.clone(), drain_rx, 64));

    out_w.write_all(b"lost").await.unwrap();
    err_w.write_all(b"kept").await.unwrap();
    drop(out_w);
    drop(err_w);

    let report = with_timeout(pump).await.unwrap();
    assert_eq!(report.stdout_bytes, 4);
    assert_eq!(sink.inner.stderr(), "kept");
}

/// Reader that fails on its first read.
struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("boom")))
    }
}

#[tokio::test]
async fn read_error_is_reported_and_other_stream_keeps_pumping() {
    init_tracing();

    let (mut err_w, err_r) = duplex(64);
    let sink = Arc::new(CaptureSink::new());
    let (_control, drain_rx) = PumpControl::channel();

    let pump = tokio::spawn(run_pump(Some(FailingReader), Some(err_r), sink.clone(), drain_rx, 64));

    tokio::time::sleep(Duration::from_millis(20)).await;
    err_w.write_all(b"still here\n").await.unwrap();
    drop(err_w);

    let report = with_timeout(pump).await.unwrap();

    assert_eq!(report.stdout_bytes, 0);
    assert_eq!(report.stderr_bytes, 11);
    assert!(!report.deadline_elapsed);
    assert!(sink.stdout().is_empty());
    let stderr = sink.stderr();
    assert!(stderr.contains("error reading stdout: boom"), "stderr was {stderr:?}");
    assert!(stderr.contains("still here\n"), "stderr was {stderr:?}");
}
