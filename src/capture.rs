//! Process-wide console output capture
//!
//! Intercepts standard error (and, in debug launch mode, standard output) at
//! the file-descriptor level without breaking console visibility: the
//! original descriptor is duplicated into an echo channel, then a pipe's
//! write end is duplicated over the original descriptor so every write lands
//! in the pipe. A background reader drains the pipe as data arrives,
//! appends to a shared buffer and forwards a copy to the echo channel.
//! Host-harness noise is filtered when the buffer is drained, after the
//! captured chunks have been reassembled.
//!
//! The reader logic is generic over [`std::io::Read`] so the coordinator can
//! be tested by injecting a fake stream source.

use crate::error::{Error, Result};
use crate::model::LaunchMode;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Marker the host harness interleaves with console writes to sequence its
/// own instrumentation output; never a user-produced log line.
const OUTPUT_BARRIER: &str = "XCTestOutputBarrier";

/// Leading banner prefixes printed by the host harness itself.
const HARNESS_BANNERS: [&str; 2] = ["Test Suite '", "Test Case '"];

/// Append-only text accumulator scoped to "since last flush".
///
/// Owned by the capture subsystem; the coordinator only ever receives its
/// drained contents. The background reader and the flush paths serialize on
/// the internal lock.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<String>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        CaptureBuffer::default()
    }

    /// Appends a chunk of captured text verbatim. Chunks arrive at whatever
    /// boundaries the pipe reads produce, so noise markers may be split
    /// across appends; filtering waits until [`Self::drain`].
    pub fn append(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.push_str(chunk);
    }

    /// Atomically swaps the buffer for an empty one and returns the previous
    /// contents with harness noise stripped. An empty drain returns an empty
    /// string.
    pub fn drain(&self) -> String {
        let text = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *inner)
        };
        if text.is_empty() {
            return text;
        }
        filter_harness_noise(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Removes the output-barrier marker and drops harness banner lines.
///
/// Trailing newlines survive so captured text keeps its original line
/// structure for the flush path to split on.
fn filter_harness_noise(chunk: &str) -> String {
    let cleaned = chunk.replace(OUTPUT_BARRIER, "");
    let mut result = String::with_capacity(cleaned.len());
    for line in cleaned.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        if HARNESS_BANNERS.iter().any(|banner| text.starts_with(banner)) {
            continue;
        }
        result.push_str(line);
    }
    result
}

/// Spawns the background reader that drains a captured stream.
///
/// Reads until EOF, echoing each raw chunk to `echo` (so the console stays
/// live for a human watching the run) and appending the text to `buffer`.
/// Returns the join handle of the spawned thread.
pub(crate) fn spawn_capture_reader<R, W>(
    mut source: R,
    mut echo: Option<W>,
    buffer: CaptureBuffer,
) -> Result<JoinHandle<io::Result<()>>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("console-capture".to_string())
        .spawn(move || -> io::Result<()> {
            let mut chunk = [0u8; 8192];
            loop {
                match source.read(&mut chunk) {
                    Ok(0) => break, // EOF: write side restored or closed
                    Ok(n) => {
                        if let Some(echo) = echo.as_mut() {
                            // Echo failures must not stop the capture.
                            let _ = echo.write_all(&chunk[..n]);
                            let _ = echo.flush();
                        }
                        let text = String::from_utf8_lossy(&chunk[..n]);
                        buffer.append(&text);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })?;
    Ok(handle)
}

#[cfg(unix)]
mod redirect {
    //! Descriptor-level redirection for unix targets.

    use super::*;
    use std::fs::File;
    use std::os::unix::io::{FromRawFd, RawFd};

    /// One installed redirection: the saved copy of the original descriptor
    /// plus what is needed to restore it.
    #[derive(Debug)]
    pub struct Redirection {
        target_fd: RawFd,
        saved_fd: RawFd,
    }

    impl Redirection {
        /// Redirects `target_fd` into a fresh pipe.
        ///
        /// Returns the pipe's read end and an echo handle writing to the
        /// stream's original destination.
        pub fn install(target_fd: RawFd) -> Result<(Self, File, File)> {
            let saved_fd = check_fd(unsafe { libc::dup(target_fd) })?;

            let mut pipe_fds = [0 as RawFd; 2];
            if let Err(e) = check_fd(unsafe { libc::pipe(pipe_fds.as_mut_ptr()) }) {
                unsafe { libc::close(saved_fd) };
                return Err(e);
            }
            let [read_fd, write_fd] = pipe_fds;

            if let Err(e) = check_fd(unsafe { libc::dup2(write_fd, target_fd) }) {
                unsafe {
                    libc::close(read_fd);
                    libc::close(write_fd);
                    libc::close(saved_fd);
                }
                return Err(e);
            }
            // The redirected descriptor is now the pipe's only write end.
            unsafe { libc::close(write_fd) };

            // The guard must exist before any further fallible step: if a
            // fallible step errs, dropping the guard points the descriptor
            // back at its original destination instead of leaving it wedged
            // into a pipe nobody drains.
            let redirection = Redirection {
                target_fd,
                saved_fd,
            };
            let read_end = unsafe { File::from_raw_fd(read_fd) };

            let echo_fd = check_fd(unsafe { libc::dup(redirection.saved_fd) })?;
            let echo = unsafe { File::from_raw_fd(echo_fd) };

            Ok((redirection, read_end, echo))
        }
    }

    impl Drop for Redirection {
        fn drop(&mut self) {
            // Point the descriptor back at its original destination. This
            // closes the pipe's write side, which EOFs the reader thread.
            unsafe {
                libc::dup2(self.saved_fd, self.target_fd);
                libc::close(self.saved_fd);
            }
        }
    }

    fn check_fd(result: libc::c_int) -> Result<libc::c_int> {
        if result < 0 {
            Err(Error::Redirection(
                io::Error::last_os_error().to_string(),
            ))
        } else {
            Ok(result)
        }
    }
}

/// Redirects the process's standard streams into an internal buffer.
///
/// Installing the redirection is idempotent; the agent owns exactly one
/// instance per process. Dropping the capture restores the original
/// descriptors, which lets the reader threads run to EOF.
#[derive(Debug, Default)]
pub struct StreamCapture {
    buffer: CaptureBuffer,
    started: bool,
    #[cfg(unix)]
    redirections: Vec<redirect::Redirection>,
    readers: Vec<JoinHandle<io::Result<()>>>,
}

impl StreamCapture {
    pub fn new() -> Self {
        StreamCapture::default()
    }

    /// Shared handle to the capture buffer for the flush coordinator.
    pub fn buffer(&self) -> CaptureBuffer {
        self.buffer.clone()
    }

    /// Installs the redirection once per process.
    ///
    /// Standard error is always intercepted; standard output additionally in
    /// debug launch mode. A setup failure is fatal to the capture subsystem
    /// only: the caller reports it and test execution continues uncaptured.
    #[cfg(unix)]
    pub fn start_interception(&mut self, mode: LaunchMode) -> Result<()> {
        if self.started {
            debug!("Console interception already installed");
            return Ok(());
        }

        let mut targets = vec![libc::STDERR_FILENO];
        if mode == LaunchMode::Debug {
            targets.push(libc::STDOUT_FILENO);
        }

        for target_fd in targets {
            let (redirection, read_end, echo) = redirect::Redirection::install(target_fd)?;
            let handle = spawn_capture_reader(read_end, Some(echo), self.buffer.clone())?;
            self.redirections.push(redirection);
            self.readers.push(handle);
        }

        self.started = true;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn start_interception(&mut self, _mode: LaunchMode) -> Result<()> {
        Err(Error::Redirection(
            "descriptor redirection is only supported on unix targets".to_string(),
        ))
    }

    /// Atomically takes everything captured since the last flush.
    pub fn drain(&self) -> String {
        self.buffer.drain()
    }

    /// Restores the original descriptors and joins the reader threads.
    pub fn shutdown(&mut self) {
        #[cfg(unix)]
        self.redirections.clear();
        for handle in self.readers.drain(..) {
            if let Ok(Err(e)) = handle.join() {
                debug!("Capture reader exited with error: {}", e);
            }
        }
        self.started = false;
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

    /// A reader that reads from a channel, buffering as needed. Stands in
    /// for the OS pipe so reader-thread tests need no real descriptors.
    struct ChannelReader {
        rx: Receiver<Vec<u8>>,
        buffer: Vec<u8>,
        pos: usize,
    }

    impl ChannelReader {
        fn new(rx: Receiver<Vec<u8>>) -> Self {
            ChannelReader {
                rx,
                buffer: Vec::new(),
                pos: 0,
            }
        }
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos < self.buffer.len() {
                let remaining = self.buffer.len() - self.pos;
                let to_copy = remaining.min(buf.len());
                buf[..to_copy].copy_from_slice(&self.buffer[self.pos..self.pos + to_copy]);
                self.pos += to_copy;
                return Ok(to_copy);
            }

            match self.rx.recv() {
                Ok(data) => {
                    self.buffer = data;
                    self.pos = 0;
                    self.read(buf)
                }
                Err(_) => Ok(0), // Channel closed, EOF
            }
        }
    }

    /// Shared in-memory echo target.
    #[derive(Clone, Default)]
    struct SharedEcho(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedEcho {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn feed(tx: &SyncSender<Vec<u8>>, text: &str) {
        tx.send(text.as_bytes().to_vec()).unwrap();
    }

    #[test]
    fn test_buffer_drain_swaps_contents() {
        let buffer = CaptureBuffer::new();
        buffer.append("first line\n");
        buffer.append("second line\n");

        assert_eq!(buffer.drain(), "first line\nsecond line\n");
        assert!(buffer.is_empty());
        assert_eq!(buffer.drain(), "");
    }

    #[test]
    fn test_noise_split_across_chunks_is_still_filtered() {
        let buffer = CaptureBuffer::new();
        // The pipe hands out arbitrary read boundaries; a marker may arrive
        // in two halves.
        buffer.append("user line XCTestOutput");
        buffer.append("Barrier more text\n");
        assert_eq!(buffer.drain(), "user line  more text\n");

        buffer.append("Test Suite 'Smoke");
        buffer.append("Tests' started at 2024-01-01\n");
        assert_eq!(buffer.drain(), "");
    }

    #[test]
    fn test_buffer_usable_after_poisoned_lock() {
        let buffer = CaptureBuffer::new();
        buffer.append("early\n");

        let inner = buffer.inner.clone();
        let _ = thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("poison the buffer lock");
        })
        .join();

        buffer.append("late\n");
        assert_eq!(buffer.drain(), "early\nlate\n");
    }

    #[test]
    fn test_filter_strips_output_barrier() {
        let filtered = filter_harness_noise("before XCTestOutputBarrier after\n");
        assert_eq!(filtered, "before  after\n");
    }

    #[test]
    fn test_filter_drops_harness_banners() {
        let chunk = "Test Suite 'SmokeTests' started at 2024-01-01\n\
                     real output\n\
                     Test Case 'testA' started.\n";
        assert_eq!(filter_harness_noise(chunk), "real output\n");
    }

    #[test]
    fn test_filter_keeps_user_lines_mentioning_tests() {
        // Only leading banners are harness noise.
        let chunk = "running Test Suite 'SmokeTests' now\n";
        assert_eq!(filter_harness_noise(chunk), chunk);
    }

    #[test]
    fn test_reader_appends_and_echoes() {
        let (tx, rx) = sync_channel(8);
        let buffer = CaptureBuffer::new();
        let echo = SharedEcho::default();
        let handle =
            spawn_capture_reader(ChannelReader::new(rx), Some(echo.clone()), buffer.clone())
                .unwrap();

        feed(&tx, "hello from the test\n");
        feed(&tx, "XCTestOutputBarrier");
        feed(&tx, "more output\n");
        drop(tx); // EOF
        handle.join().unwrap().unwrap();

        assert_eq!(buffer.drain(), "hello from the test\nmore output\n");
        // The echo side receives the raw, unfiltered bytes.
        let echoed = String::from_utf8(echo.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            echoed,
            "hello from the test\nXCTestOutputBarriermore output\n"
        );
    }

    #[test]
    fn test_reader_without_echo() {
        let (tx, rx) = sync_channel(8);
        let buffer = CaptureBuffer::new();
        let handle =
            spawn_capture_reader(ChannelReader::new(rx), None::<SharedEcho>, buffer.clone())
                .unwrap();

        feed(&tx, "quiet capture\n");
        drop(tx);
        handle.join().unwrap().unwrap();

        assert_eq!(buffer.drain(), "quiet capture\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_redirection_roundtrip_on_scratch_descriptor() {
        use std::fs::File;
        use std::os::unix::io::AsRawFd;

        // Use a temp file's descriptor as the redirection target so the test
        // never disturbs the harness's own stdout/stderr.
        let tmp = tempfile::tempfile().unwrap();
        let target_fd = tmp.as_raw_fd();

        let (redirection, read_end, _echo) =
            redirect::Redirection::install(target_fd).unwrap();
        let buffer = CaptureBuffer::new();
        let handle = spawn_capture_reader(read_end, None::<File>, buffer.clone()).unwrap();

        let payload = b"written through the redirected descriptor\n";
        let written = unsafe {
            libc::write(target_fd, payload.as_ptr() as *const libc::c_void, payload.len())
        };
        assert_eq!(written, payload.len() as isize);

        // Restoring the descriptor EOFs the reader.
        drop(redirection);
        handle.join().unwrap().unwrap();

        assert_eq!(buffer.drain(), "written through the redirected descriptor\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_dropped_redirection_restores_original_destination() {
        use std::io::{Seek, SeekFrom};
        use std::os::unix::io::AsRawFd;

        let mut tmp = tempfile::tempfile().unwrap();
        let target_fd = tmp.as_raw_fd();

        let (redirection, read_end, _echo) =
            redirect::Redirection::install(target_fd).unwrap();
        drop(redirection);
        drop(read_end);

        // With the guard gone, writes land back at the original destination
        // instead of the (now closed) pipe.
        let payload = b"back to the file\n";
        let written = unsafe {
            libc::write(target_fd, payload.as_ptr() as *const libc::c_void, payload.len())
        };
        assert_eq!(written, payload.len() as isize);

        let mut contents = String::new();
        tmp.seek(SeekFrom::Start(0)).unwrap();
        tmp.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "back to the file\n");
    }
}
