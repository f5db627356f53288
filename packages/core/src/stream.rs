//! The buffered stream discipline shared by every File resource.
//!
//! A file is either idle (readable), or has exactly one pending buffer open
//! for writing or appending. [`FileStream`] owns that state; backends supply
//! closures for the three things only they know how to do: open a buffer,
//! open a read view over persisted content, and commit a buffer.

use std::fmt;

use crate::chunked::ReadView;
use crate::Error;

/// Which buffer, if any, is open on a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    Idle,
    Writing,
    Appending,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Idle => write!(f, "idle"),
            StreamMode::Writing => write!(f, "writing"),
            StreamMode::Appending => write!(f, "appending"),
        }
    }
}

/// A stream operation, as named in state errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOp {
    Read,
    Write,
    Append,
}

impl fmt::Display for StreamOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOp::Read => write!(f, "read"),
            StreamOp::Write => write!(f, "write"),
            StreamOp::Append => write!(f, "append"),
        }
    }
}

/// Where pending writes accumulate until flush.
pub trait StageBuffer: Send {
    fn extend_from(&mut self, data: &[u8]) -> Result<(), Error>;
}

impl StageBuffer for Vec<u8> {
    fn extend_from(&mut self, data: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(data);
        Ok(())
    }
}

enum Pending<B> {
    Idle,
    Writing(B),
    Appending(B),
}

/// Stream state for one File resource.
///
/// ```rust
/// use urlfs_core::{FileStream, OnceSource, ReadView, StreamMode};
///
/// let mut persisted = b"old".to_vec();
/// let mut stream: FileStream = FileStream::new("mem://loc/f");
///
/// stream.write(b"new", || Ok(Vec::new())).unwrap();
/// assert_eq!(stream.mode(), StreamMode::Writing);
/// stream.flush(|buf| { persisted = buf.clone(); Ok(()) }).unwrap();
///
/// let data = stream
///     .read(None, || Ok(ReadView::boxed(OnceSource::new(persisted.clone()))))
///     .unwrap();
/// assert_eq!(data, b"new");
/// ```
pub struct FileStream<B: StageBuffer = Vec<u8>> {
    label: String,
    pending: Pending<B>,
    view: Option<ReadView>,
}

impl<B: StageBuffer> FileStream<B> {
    /// `label` names the file in error messages, usually its URL.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pending: Pending::Idle,
            view: None,
        }
    }

    pub fn mode(&self) -> StreamMode {
        match self.pending {
            Pending::Idle => StreamMode::Idle,
            Pending::Writing(_) => StreamMode::Writing,
            Pending::Appending(_) => StreamMode::Appending,
        }
    }

    pub fn has_read_view(&self) -> bool {
        self.view.is_some()
    }

    /// Append `data` to the write buffer, opening an empty one with `open` if idle.
    pub fn write(
        &mut self,
        data: &[u8],
        open: impl FnOnce() -> Result<B, Error>,
    ) -> Result<(), Error> {
        match &mut self.pending {
            Pending::Writing(buf) => buf.extend_from(data),
            Pending::Appending(_) => Err(self.conflict(StreamOp::Write)),
            Pending::Idle => {
                let mut buf = open()?;
                buf.extend_from(data)?;
                self.view = None;
                self.pending = Pending::Writing(buf);
                Ok(())
            }
        }
    }

    /// Append `data` to the append buffer; `open_seeded` must return a buffer
    /// already holding the persisted content.
    pub fn append(
        &mut self,
        data: &[u8],
        open_seeded: impl FnOnce() -> Result<B, Error>,
    ) -> Result<(), Error> {
        match &mut self.pending {
            Pending::Appending(buf) => buf.extend_from(data),
            Pending::Writing(_) => Err(self.conflict(StreamOp::Append)),
            Pending::Idle => {
                let mut buf = open_seeded()?;
                buf.extend_from(data)?;
                self.view = None;
                self.pending = Pending::Appending(buf);
                Ok(())
            }
        }
    }

    /// Read from the current view, opening one with `open_view` on first use.
    pub fn read(
        &mut self,
        max: Option<usize>,
        open_view: impl FnOnce() -> Result<ReadView, Error>,
    ) -> Result<Vec<u8>, Error> {
        if !matches!(self.pending, Pending::Idle) {
            return Err(self.conflict(StreamOp::Read));
        }
        let view = match self.view.take() {
            Some(view) => view,
            None => open_view()?,
        };
        Ok(Vec::from(self.view.insert(view).read(max)?))
    }

    /// Commit the open buffer. Returns false if nothing was pending.
    ///
    /// When `commit` fails the buffer stays open and the error is returned.
    pub fn flush(&mut self, commit: impl FnOnce(&mut B) -> Result<(), Error>) -> Result<bool, Error> {
        match &mut self.pending {
            Pending::Idle => Ok(false),
            Pending::Writing(buf) | Pending::Appending(buf) => {
                commit(buf)?;
                self.pending = Pending::Idle;
                self.view = None;
                Ok(true)
            }
        }
    }

    /// Discard the open buffer and read view without committing.
    pub fn reset(&mut self) {
        self.pending = Pending::Idle;
        self.view = None;
    }

    /// Drop the read view so the next read starts from the beginning.
    pub fn rewind(&mut self) {
        self.view = None;
    }

    fn conflict(&self, requested: StreamOp) -> Error {
        Error::InvalidStreamState {
            url: self.label.clone(),
            requested,
            active: self.mode(),
        }
    }
}

impl<B: StageBuffer> fmt::Debug for FileStream<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("label", &self.label)
            .field("mode", &self.mode())
            .field("read_view", &self.view.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OnceSource;

    /// A persisted value plus the stream over it, the way a backend pairs them.
    struct Fixture {
        persisted: Vec<u8>,
        stream: FileStream,
    }

    impl Fixture {
        fn new(content: &[u8]) -> Self {
            Self {
                persisted: content.to_vec(),
                stream: FileStream::new("mem://loc/f"),
            }
        }

        fn write(&mut self, data: &[u8]) -> Result<(), Error> {
            self.stream.write(data, || Ok(Vec::new()))
        }

        fn append(&mut self, data: &[u8]) -> Result<(), Error> {
            let seed = self.persisted.clone();
            self.stream.append(data, move || Ok(seed))
        }

        fn read(&mut self, max: Option<usize>) -> Result<Vec<u8>, Error> {
            let seed = self.persisted.clone();
            self.stream
                .read(max, move || Ok(ReadView::boxed(OnceSource::new(seed))))
        }

        fn flush(&mut self) -> Result<bool, Error> {
            let persisted = &mut self.persisted;
            self.stream.flush(|buf| {
                *persisted = buf.clone();
                Ok(())
            })
        }
    }

    #[test]
    fn write_flush_read() {
        let mut f = Fixture::new(b"old");
        f.write(b"hello ").unwrap();
        f.write(b"world").unwrap();
        assert_eq!(f.persisted, b"old");
        assert!(f.flush().unwrap());
        assert_eq!(f.stream.mode(), StreamMode::Idle);
        assert_eq!(f.read(None).unwrap(), b"hello world");
    }

    #[test]
    fn empty_write_truncates() {
        let mut f = Fixture::new(b"old");
        f.write(b"").unwrap();
        f.flush().unwrap();
        assert!(f.persisted.is_empty());
        assert!(f.read(None).unwrap().is_empty());
    }

    #[test]
    fn append_is_seeded_with_persisted_content() {
        let mut f = Fixture::new(b"line1\n");
        f.append(b"line2\n").unwrap();
        f.append(b"line3\n").unwrap();
        assert_eq!(f.stream.mode(), StreamMode::Appending);
        f.flush().unwrap();
        assert_eq!(f.persisted, b"line1\nline2\nline3\n");
    }

    #[test]
    fn append_after_write_is_rejected() {
        let mut f = Fixture::new(b"");
        f.write(b"x").unwrap();
        let err = f.append(b"y").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidStreamState {
                requested: StreamOp::Append,
                active: StreamMode::Writing,
                ..
            }
        ));
    }

    #[test]
    fn write_after_append_is_rejected() {
        let mut f = Fixture::new(b"");
        f.append(b"x").unwrap();
        assert!(matches!(
            f.write(b"y"),
            Err(Error::InvalidStreamState {
                requested: StreamOp::Write,
                active: StreamMode::Appending,
                ..
            })
        ));
    }

    #[test]
    fn read_while_buffer_open_is_rejected() {
        let mut f = Fixture::new(b"data");
        f.write(b"x").unwrap();
        assert!(matches!(
            f.read(None),
            Err(Error::InvalidStreamState {
                requested: StreamOp::Read,
                ..
            })
        ));
    }

    #[test]
    fn reset_discards_pending_writes() {
        let mut f = Fixture::new(b"keep");
        f.write(b"discard").unwrap();
        f.stream.reset();
        assert_eq!(f.stream.mode(), StreamMode::Idle);
        assert!(!f.flush().unwrap());
        assert_eq!(f.read(None).unwrap(), b"keep");
    }

    #[test]
    fn reads_continue_from_cursor() {
        let mut f = Fixture::new(b"abcdef");
        assert_eq!(f.read(Some(2)).unwrap(), b"ab");
        assert_eq!(f.read(Some(2)).unwrap(), b"cd");
        assert_eq!(f.read(Some(10)).unwrap(), b"ef");
        assert!(f.read(Some(10)).unwrap().is_empty());
        f.stream.rewind();
        assert_eq!(f.read(Some(3)).unwrap(), b"abc");
    }

    #[test]
    fn opening_a_buffer_drops_the_read_view() {
        let mut f = Fixture::new(b"abcdef");
        f.read(Some(2)).unwrap();
        assert!(f.stream.has_read_view());
        f.write(b"xyz").unwrap();
        assert!(!f.stream.has_read_view());
        f.flush().unwrap();
        assert_eq!(f.read(None).unwrap(), b"xyz");
    }

    #[test]
    fn failed_commit_keeps_the_buffer() {
        let mut stream: FileStream = FileStream::new("mem://loc/f");
        stream.write(b"payload", || Ok(Vec::new())).unwrap();

        let err = stream.flush(|_| {
            Err(Error::BackendCommandFailure {
                command: "upload".to_string(),
                status: Some(1),
                message: "refused".to_string(),
            })
        });
        assert!(err.is_err());
        assert_eq!(stream.mode(), StreamMode::Writing);

        let mut committed = Vec::new();
        assert!(stream
            .flush(|buf| {
                committed = buf.clone();
                Ok(())
            })
            .unwrap());
        assert_eq!(committed, b"payload");
    }

    #[test]
    fn failed_open_leaves_stream_idle() {
        let mut stream: FileStream = FileStream::new("mem://loc/f");
        let err = stream.append(b"x", || Err(Error::not_found("mem://loc/f")));
        assert!(err.is_err());
        assert_eq!(stream.mode(), StreamMode::Idle);
    }

    #[test]
    fn mode_display() {
        assert_eq!(StreamMode::Idle.to_string(), "idle");
        assert_eq!(StreamMode::Appending.to_string(), "appending");
        assert_eq!(StreamOp::Read.to_string(), "read");
    }
}
