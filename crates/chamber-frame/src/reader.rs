use std::io::ErrorKind;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chamber_serial::TimedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::{decode_body, DiscardPolicy, FrameConfig, END_BYTE, START_BYTE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;
const READ_CHUNK_SIZE: usize = 256;
/// Discarded bytes kept for diagnostics; the rest are only counted.
const DISCARD_PREVIEW_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    AwaitingStart,
    Reading,
}

/// Reception state of the frame being assembled. Bytes already pulled from
/// the stream but not consumed stay in the reader's buffer for the next call.
struct Reception {
    state: ReadState,
    body: BytesMut,
    discarded: BytesMut,
    discarded_count: usize,
}

impl Reception {
    fn new() -> Self {
        Self {
            state: ReadState::AwaitingStart,
            body: BytesMut::new(),
            discarded: BytesMut::new(),
            discarded_count: 0,
        }
    }

    fn discard(&mut self, byte: u8) {
        self.discarded_count += 1;
        if self.discarded.len() < DISCARD_PREVIEW_LEN {
            self.discarded.put_u8(byte);
        }
    }
}

/// Reads delimited frames from any [`TimedRead`] stream.
///
/// Handles partial reads and stray bytes internally. Callers always get the
/// decoded payload of a complete frame.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    config: FrameConfig,
    cancel: Option<CancellationToken>,
    applied_timeout: Option<Duration>,
    /// Reception interrupted by a timeout, resumed by the next call.
    pending: Option<Reception>,
}

impl<R: TimedRead> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            cancel: None,
            applied_timeout: None,
            pending: None,
        }
    }

    /// Make blocking receives end with [`FrameError::Cancelled`] once `token`
    /// is cancelled.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    /// Read the next complete frame and return its decoded payload.
    ///
    /// `timeout` bounds the whole call, measured from entry. Arriving bytes
    /// never extend it, so a peer writing noise cannot hold the call open.
    /// A frame already started at the limit is kept and resumed by the next
    /// call. `None` blocks until a frame arrives, the stream closes or the
    /// reader is cancelled.
    pub fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        let mut rx = self.pending.take().unwrap_or_else(Reception::new);
        let deadline = timeout.map(|limit| (limit, Instant::now() + limit));

        loop {
            if self.scan(&mut rx)? {
                return self.finish(rx);
            }

            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(FrameError::Cancelled);
            }

            let wait = match deadline {
                Some((limit, at)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        self.suspend(rx);
                        return Err(FrameError::ReceiveTimeout(limit));
                    }
                    left.min(self.config.poll_interval)
                }
                None => self.config.poll_interval,
            };
            self.apply_timeout(wait)?;

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    trace!(bytes = ?&chunk[..n], "read raw bytes");
                    self.buf.extend_from_slice(&chunk[..n]);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Feed buffered bytes through the reception state machine. Returns true
    /// once an end delimiter completes the frame.
    fn scan(&mut self, rx: &mut Reception) -> Result<bool> {
        let mut consumed = 0usize;
        let mut complete = false;

        for &byte in self.buf.iter() {
            consumed += 1;
            match rx.state {
                ReadState::AwaitingStart if byte == START_BYTE => rx.state = ReadState::Reading,
                ReadState::AwaitingStart => rx.discard(byte),
                ReadState::Reading if byte == END_BYTE => {
                    complete = true;
                    break;
                }
                ReadState::Reading => rx.body.put_u8(byte),
            }
        }
        self.buf.advance(consumed);

        if !complete && rx.body.len() > self.config.max_receive_len {
            return Err(FrameError::Overrun {
                len: rx.body.len(),
                max: self.config.max_receive_len,
            });
        }
        Ok(complete)
    }

    /// Keep a started frame for the next call; stray bytes alone are dropped.
    fn suspend(&mut self, rx: Reception) {
        match rx.state {
            ReadState::Reading => {
                debug!(partial = rx.body.len(), "reception timed out mid-frame");
                self.pending = Some(rx);
            }
            ReadState::AwaitingStart if rx.discarded_count > 0 => debug!(
                count = rx.discarded_count,
                "dropping stray bytes after reception timeout"
            ),
            ReadState::AwaitingStart => {}
        }
    }

    fn finish(&mut self, rx: Reception) -> Result<Bytes> {
        trace!(len = rx.body.len(), "received raw frame");
        if rx.discarded_count > 0 {
            match self.config.discarded {
                DiscardPolicy::Ignore => {}
                DiscardPolicy::Warn => warn!(
                    count = rx.discarded_count,
                    bytes = ?rx.discarded.as_ref(),
                    "unexpected bytes outside of frame delimiters"
                ),
                DiscardPolicy::Fail => {
                    return Err(FrameError::UnexpectedBytes {
                        count: rx.discarded_count,
                        preview: rx.discarded.freeze(),
                    });
                }
            }
        }
        decode_body(&rx.body)
    }

    fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.applied_timeout != Some(timeout) {
            self.inner.set_read_timeout(timeout)?;
            self.applied_timeout = Some(timeout);
        }
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, DEVICE_BUFFER_SIZE};

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, usize::MAX, &mut out).unwrap();
        }
        out.to_vec()
    }

    fn policy(discarded: DiscardPolicy) -> FrameConfig {
        FrameConfig {
            discarded,
            ..FrameConfig::default()
        }
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"OK,DONE"])));
        let payload = reader.read_frame(None).unwrap();
        assert_eq!(payload.as_ref(), b"OK,DONE");
    }

    #[test]
    fn read_multiple_frames_from_one_chunk() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"one");
        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"two");
        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"three");
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);
        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"slow");
    }

    #[test]
    fn stray_bytes_ignored_and_warned() {
        for discarded in [DiscardPolicy::Ignore, DiscardPolicy::Warn] {
            let mut bytes = b"boot noise\r\n".to_vec();
            bytes.extend(wire(&[b"payload"]));
            let mut reader = FrameReader::with_config(Cursor::new(bytes), policy(discarded));
            assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"payload");
        }
    }

    #[test]
    fn stray_bytes_fatal_under_fail_policy() {
        let mut bytes = b"xyz".to_vec();
        bytes.extend(wire(&[b"payload", b"next"]));
        let mut reader =
            FrameReader::with_config(Cursor::new(bytes), policy(DiscardPolicy::Fail));

        let err = reader.read_frame(None).unwrap_err();
        match err {
            FrameError::UnexpectedBytes { count, preview } => {
                assert_eq!(count, 3);
                assert_eq!(preview.as_ref(), b"xyz");
            }
            other => panic!("unexpected error: {other}"),
        }
        // The stream stays aligned on the following frame.
        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"next");
    }

    #[test]
    fn stray_bytes_never_merged_into_next_frame() {
        let mut bytes = wire(&[b"first"]);
        bytes.extend_from_slice(b"junk");
        bytes.extend(wire(&[b"second"]));
        let mut reader = FrameReader::with_config(Cursor::new(bytes), policy(DiscardPolicy::Ignore));

        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"first");
        assert_eq!(reader.read_frame(None).unwrap().as_ref(), b"second");
    }

    #[test]
    fn malformed_body_reported() {
        let bytes = vec![START_BYTE, b'a', b'*', END_BYTE];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::MalformedEncoding(_)));
    }

    #[test]
    fn overrun_reported() {
        let mut bytes = vec![START_BYTE];
        bytes.extend(std::iter::repeat_n(b'A', 64));
        let cfg = FrameConfig {
            max_receive_len: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        let err = reader.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::Overrun { max: 16, .. }));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = wire(&[b"truncated payload"]);
        partial.truncate(5);
        let mut reader = FrameReader::new(Cursor::new(partial));
        let err = reader.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&[b"ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame(None).unwrap().as_ref(), b"ok");
    }

    #[test]
    fn hard_io_error_propagates() {
        let mut framed = FrameReader::new(BrokenReader);
        let err = framed.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    #[cfg(unix)]
    fn receive_timeout_over_socket() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = FrameReader::new(left);

        let started = Instant::now();
        let err = reader
            .read_frame(Some(Duration::from_millis(30)))
            .unwrap_err();

        assert!(matches!(err, FrameError::ReceiveTimeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(b"VARIABLES_LIST,counter,red").unwrap();
        let payload = reader.read_frame(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(payload.as_ref(), b"VARIABLES_LIST,counter,red");
    }

    #[test]
    #[cfg(unix)]
    fn cancellation_ends_blocking_receive() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let token = CancellationToken::new();
        let mut reader = FrameReader::new(left);
        reader.set_cancellation(token.clone());

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            token.cancel();
        });

        let err = reader.read_frame(None).unwrap_err();
        assert!(matches!(err, FrameError::Cancelled));
        canceller.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn trickled_frame_within_limit() {
        use std::io::Write;

        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = FrameReader::new(right);
        let bytes = wire(&[b"trickle"]);

        let sender = std::thread::spawn(move || {
            for byte in bytes {
                left.write_all(&[byte]).unwrap();
                std::thread::sleep(Duration::from_millis(5));
            }
            left
        });

        let payload = reader.read_frame(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(payload.as_ref(), b"trickle");
        let _left = sender.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn steady_stray_bytes_do_not_extend_timeout() {
        use std::io::Write;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = FrameReader::with_config(right, policy(DiscardPolicy::Ignore));
        let stop = Arc::new(AtomicBool::new(false));

        let noise = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if left.write_all(b"#").is_err() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            })
        };

        let started = Instant::now();
        let err = reader
            .read_frame(Some(Duration::from_millis(200)))
            .unwrap_err();
        let elapsed = started.elapsed();
        stop.store(true, Ordering::Relaxed);
        noise.join().unwrap();

        assert!(matches!(err, FrameError::ReceiveTimeout(_)));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    }

    #[test]
    #[cfg(unix)]
    fn frame_split_across_timeout_is_resumed() {
        use std::io::Write;

        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = FrameReader::new(right);
        let bytes = wire(&[b"OK,SET"]);
        let (head, tail) = bytes.split_at(4);

        left.write_all(head).unwrap();
        let err = reader
            .read_frame(Some(Duration::from_millis(30)))
            .unwrap_err();
        assert!(matches!(err, FrameError::ReceiveTimeout(_)));

        left.write_all(tail).unwrap();
        let payload = reader.read_frame(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(payload.as_ref(), b"OK,SET");
    }

    #[test]
    #[cfg(unix)]
    fn stray_bytes_before_timeout_are_dropped() {
        use std::io::Write;

        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = FrameReader::with_config(right, policy(DiscardPolicy::Fail));

        left.write_all(b"noise").unwrap();
        let err = reader
            .read_frame(Some(Duration::from_millis(30)))
            .unwrap_err();
        assert!(matches!(err, FrameError::ReceiveTimeout(_)));

        left.write_all(&wire(&[b"clean"])).unwrap();
        let payload = reader.read_frame(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(payload.as_ref(), b"clean");
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(reader.config().max_frame_len, DEVICE_BUFFER_SIZE);
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    impl TimedRead for ByteByByteReader {
        fn set_read_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl TimedRead for InterruptedThenData {
        fn set_read_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }

    impl TimedRead for BrokenReader {
        fn set_read_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
            Ok(())
        }
    }
}
