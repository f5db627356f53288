//! Exact-size reads over sources that only yield successive chunks.
//!
//! Remote object bodies, local readers and decompressor output all look the
//! same from here: a [`ChunkSource`] hands out chunks of whatever size it
//! likes, an optional [`ChunkTransform`] rewrites each one, and
//! [`ChunkedReader`] slices the result into the sizes the caller asked for.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::write::GzDecoder;

use crate::Error;

/// Lower bound for the chunk size requested from a source.
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;

/// A producer of successive chunks.
pub trait ChunkSource: Send {
    /// Return the next chunk, or `None` once the source is exhausted.
    ///
    /// `size_hint` is advisory. An empty chunk is treated as exhaustion.
    fn next_chunk(&mut self, size_hint: usize) -> Result<Option<Bytes>, Error>;
}

impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn next_chunk(&mut self, size_hint: usize) -> Result<Option<Bytes>, Error> {
        self.as_mut().next_chunk(size_hint)
    }
}

/// A stateful rewrite applied to every chunk, e.g. a decompressor.
pub trait ChunkTransform: Send {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, Error>;

    /// Called once after the source is exhausted; returns any trailing output.
    fn finish(&mut self) -> Result<Bytes, Error> {
        Ok(Bytes::new())
    }

    /// Expected output/input size ratio, used to size source requests.
    ///
    /// Decompressors should return 3 (compression ratios are typically 2-5).
    fn expansion_hint(&self) -> usize {
        1
    }
}

impl<T: ChunkTransform + ?Sized> ChunkTransform for Box<T> {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, Error> {
        self.as_mut().transform(chunk)
    }

    fn finish(&mut self) -> Result<Bytes, Error> {
        self.as_mut().finish()
    }

    fn expansion_hint(&self) -> usize {
        self.as_ref().expansion_hint()
    }
}

/// Pass-through transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl ChunkTransform for Identity {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, Error> {
        Ok(chunk)
    }
}

/// Gunzips the chunk stream as it arrives.
///
/// Output for a chunk may lag behind its input; whatever is still held
/// back comes out of [`finish`](ChunkTransform::finish).
pub struct GzipTransform {
    decoder: GzDecoder<Vec<u8>>,
}

impl GzipTransform {
    pub fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
        }
    }

    fn drain(&mut self) -> Bytes {
        Bytes::from(std::mem::take(self.decoder.get_mut()))
    }
}

impl Default for GzipTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkTransform for GzipTransform {
    fn transform(&mut self, chunk: Bytes) -> Result<Bytes, Error> {
        self.decoder.write_all(&chunk)?;
        Ok(self.drain())
    }

    fn finish(&mut self) -> Result<Bytes, Error> {
        self.decoder.try_finish()?;
        Ok(self.drain())
    }

    fn expansion_hint(&self) -> usize {
        3
    }
}

/// A source holding a single in-memory chunk.
#[derive(Debug, Clone)]
pub struct OnceSource(Option<Bytes>);

impl OnceSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(Some(data.into()))
    }
}

impl ChunkSource for OnceSource {
    fn next_chunk(&mut self, _size_hint: usize) -> Result<Option<Bytes>, Error> {
        Ok(self.0.take().filter(|chunk| !chunk.is_empty()))
    }
}

/// A source over any [`Read`], pulling `size_hint` bytes at a time.
pub struct ReadSource<R> {
    reader: R,
}

impl<R: Read + Send> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read + Send> ChunkSource for ReadSource<R> {
    fn next_chunk(&mut self, size_hint: usize) -> Result<Option<Bytes>, Error> {
        let mut buf = vec![0u8; size_hint.max(1)];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(Bytes::from(buf)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

/// A source over an iterator of chunk results.
pub struct IterSource<I> {
    chunks: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Result<Bytes, Error>> + Send,
{
    pub fn new(chunks: I) -> Self {
        Self { chunks }
    }
}

impl<I> ChunkSource for IterSource<I>
where
    I: Iterator<Item = Result<Bytes, Error>> + Send,
{
    fn next_chunk(&mut self, _size_hint: usize) -> Result<Option<Bytes>, Error> {
        self.chunks.next().transpose()
    }
}

/// Turns a chunk source into exact-size reads.
///
/// Concatenating every result of [`read`](ChunkedReader::read), in order,
/// yields exactly the transformed content of the source. End of data is a
/// short read; once exhausted, every read returns empty.
///
/// # Example
///
/// ```rust
/// use urlfs_core::{Bytes, ChunkedReader, IterSource};
///
/// let chunks = vec![Ok(Bytes::from_static(b"hel")), Ok(Bytes::from_static(b"lo world"))];
/// let mut reader = ChunkedReader::new(IterSource::new(chunks.into_iter()));
///
/// assert_eq!(reader.read(Some(5)).unwrap(), "hello");
/// assert_eq!(reader.read(Some(100)).unwrap(), " world");
/// assert!(reader.read(Some(1)).unwrap().is_empty());
/// ```
pub struct ChunkedReader<S, T = Identity> {
    source: S,
    transform: T,
    buffer: BytesMut,
    exhausted: bool,
    min_chunk: usize,
}

/// The boxed reader used by file streams for their read view.
pub type ReadView = ChunkedReader<Box<dyn ChunkSource>, Box<dyn ChunkTransform>>;

impl ReadView {
    pub fn boxed(source: impl ChunkSource + 'static) -> Self {
        ChunkedReader::with_transform(Box::new(source), Box::new(Identity))
    }

    pub fn boxed_with(
        source: impl ChunkSource + 'static,
        transform: impl ChunkTransform + 'static,
    ) -> Self {
        ChunkedReader::with_transform(Box::new(source), Box::new(transform))
    }
}

impl<S: ChunkSource> ChunkedReader<S, Identity> {
    pub fn new(source: S) -> Self {
        Self::with_transform(source, Identity)
    }
}

impl<S: ChunkSource, T: ChunkTransform> ChunkedReader<S, T> {
    pub fn with_transform(source: S, transform: T) -> Self {
        Self {
            source,
            transform,
            buffer: BytesMut::new(),
            exhausted: false,
            min_chunk: MIN_CHUNK_SIZE,
        }
    }

    /// Override the minimum chunk size requested from the source.
    pub fn with_min_chunk(mut self, min_chunk: usize) -> Self {
        self.min_chunk = min_chunk.max(1);
        self
    }

    /// Bytes already transformed and waiting to be read.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True once the source is drained and nothing is left buffered.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }

    /// Read up to `max` bytes; `None` drains everything that is left.
    pub fn read(&mut self, max: Option<usize>) -> Result<Bytes, Error> {
        match max {
            None => {
                let hint = self.min_chunk;
                while self.pull(hint)? {}
                Ok(self.buffer.split().freeze())
            }
            Some(wanted) => {
                let hint = self.chunk_hint(wanted);
                while self.buffer.len() < wanted && self.pull(hint)? {}
                let take = wanted.min(self.buffer.len());
                Ok(self.buffer.split_to(take).freeze())
            }
        }
    }

    fn chunk_hint(&self, wanted: usize) -> usize {
        wanted
            .saturating_mul(self.transform.expansion_hint())
            .max(self.min_chunk)
    }

    /// Pull one chunk into the buffer. Returns false once the source is drained.
    fn pull(&mut self, size_hint: usize) -> Result<bool, Error> {
        if self.exhausted {
            return Ok(false);
        }
        match self.source.next_chunk(size_hint)? {
            Some(chunk) if !chunk.is_empty() => {
                let out = self.transform.transform(chunk)?;
                self.buffer.extend_from_slice(&out);
                Ok(true)
            }
            _ => {
                self.exhausted = true;
                let tail = self.transform.finish()?;
                self.buffer.extend_from_slice(&tail);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn chunks_of(data: &[u8], sizes: &[usize]) -> Vec<Result<Bytes, Error>> {
        let mut out = Vec::new();
        let mut rest = data;
        let mut i = 0;
        while !rest.is_empty() {
            let size = sizes[i % sizes.len()].clamp(1, rest.len());
            out.push(Ok(Bytes::copy_from_slice(&rest[..size])));
            rest = &rest[size..];
            i += 1;
        }
        out
    }

    /// Emits every byte twice and appends a marker on finish.
    struct Doubler;

    impl ChunkTransform for Doubler {
        fn transform(&mut self, chunk: Bytes) -> Result<Bytes, Error> {
            Ok(chunk.iter().flat_map(|b| [*b, *b]).collect::<Vec<_>>().into())
        }

        fn finish(&mut self) -> Result<Bytes, Error> {
            Ok(Bytes::from_static(b"<end>"))
        }

        fn expansion_hint(&self) -> usize {
            3
        }
    }

    /// Records the size hints it receives.
    struct HintRecorder {
        hints: Arc<Mutex<Vec<usize>>>,
        remaining: usize,
    }

    impl ChunkSource for HintRecorder {
        fn next_chunk(&mut self, size_hint: usize) -> Result<Option<Bytes>, Error> {
            self.hints.lock().unwrap().push(size_hint);
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Bytes::from_static(b"x")))
        }
    }

    #[test]
    fn exact_reads_across_chunk_boundaries() {
        let source = IterSource::new(chunks_of(b"abcdefghij", &[3]).into_iter());
        let mut reader = ChunkedReader::new(source);

        assert_eq!(reader.read(Some(4)).unwrap(), "abcd");
        assert_eq!(reader.read(Some(4)).unwrap(), "efgh");
        assert_eq!(reader.read(Some(4)).unwrap(), "ij");
        assert_eq!(reader.read(Some(4)).unwrap(), "");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn remainder_is_retained() {
        let mut reader = ChunkedReader::new(OnceSource::new("hello world"));
        assert_eq!(reader.read(Some(5)).unwrap(), "hello");
        assert_eq!(reader.buffered(), 6);
        assert_eq!(reader.read(None).unwrap(), " world");
    }

    #[test]
    fn unbounded_read_drains_everything() {
        let source = IterSource::new(chunks_of(b"0123456789", &[1, 2, 3]).into_iter());
        let mut reader = ChunkedReader::new(source);
        assert_eq!(reader.read(None).unwrap(), "0123456789");
        assert_eq!(reader.read(None).unwrap(), "");
    }

    #[test]
    fn empty_source_reads_empty() {
        let mut reader = ChunkedReader::new(OnceSource::new(Bytes::new()));
        assert!(reader.read(Some(10)).unwrap().is_empty());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn transform_applies_per_chunk_and_on_finish() {
        let source = IterSource::new(chunks_of(b"abc", &[2]).into_iter());
        let mut reader = ChunkedReader::with_transform(source, Doubler);

        assert_eq!(reader.read(Some(3)).unwrap(), "aab");
        assert_eq!(reader.read(None).unwrap(), "bcc<end>");
    }

    #[test]
    fn chunk_hint_scales_with_expansion() {
        let hints = Arc::new(Mutex::new(Vec::new()));
        let source = HintRecorder {
            hints: hints.clone(),
            remaining: 1,
        };
        let mut reader = ChunkedReader::with_transform(source, Doubler).with_min_chunk(10);

        reader.read(Some(100)).unwrap();
        assert_eq!(hints.lock().unwrap()[0], 300);

        let hints = Arc::new(Mutex::new(Vec::new()));
        let source = HintRecorder {
            hints: hints.clone(),
            remaining: 1,
        };
        let mut reader = ChunkedReader::new(source);
        reader.read(Some(2)).unwrap();
        assert_eq!(hints.lock().unwrap()[0], MIN_CHUNK_SIZE);
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzip_transform_inflates_across_chunks() {
        let plain: Vec<u8> = (0..5000)
            .flat_map(|i| format!("line {}\n", i).into_bytes())
            .collect();
        let source = IterSource::new(chunks_of(&gzip(&plain), &[7, 100, 1]).into_iter());
        let mut reader = ChunkedReader::with_transform(source, GzipTransform::new());

        let mut out = Vec::new();
        loop {
            let chunk = reader.read(Some(1000)).unwrap();
            out.extend_from_slice(&chunk);
            if chunk.len() < 1000 {
                break;
            }
        }
        assert_eq!(out, plain);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn gzip_transform_sizes_requests_for_expansion() {
        assert_eq!(GzipTransform::new().expansion_hint(), 3);

        let source = OnceSource::new(gzip(b"hello gzip"));
        let mut view = ReadView::boxed_with(source, GzipTransform::new());
        assert_eq!(view.read(None).unwrap(), "hello gzip");
    }

    #[test]
    fn gzip_transform_rejects_plain_data() {
        let mut reader = ChunkedReader::with_transform(
            OnceSource::new("this was never compressed"),
            GzipTransform::new(),
        );
        assert!(matches!(reader.read(None), Err(Error::Io(_))));
    }

    #[test]
    fn source_errors_propagate() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(Error::BackendCommandFailure {
                command: "download".to_string(),
                status: Some(1),
                message: "broken pipe".to_string(),
            }),
        ];
        let mut reader = ChunkedReader::new(IterSource::new(chunks.into_iter()));
        assert_eq!(reader.read(Some(2)).unwrap(), "ok");
        assert!(matches!(
            reader.read(Some(2)),
            Err(Error::BackendCommandFailure { .. })
        ));
    }

    #[test]
    fn read_source_over_reader() {
        let data = b"line one\nline two\n".to_vec();
        let mut reader = ChunkedReader::new(ReadSource::new(std::io::Cursor::new(data.clone())))
            .with_min_chunk(4);
        let mut out = Vec::new();
        loop {
            let chunk = reader.read(Some(5)).unwrap();
            out.extend_from_slice(&chunk);
            if chunk.len() < 5 {
                break;
            }
        }
        assert_eq!(out, data);
    }

    #[test]
    fn boxed_read_view() {
        let mut view = ReadView::boxed(OnceSource::new("abc"));
        assert_eq!(view.read(Some(2)).unwrap(), "ab");
        let mut view = ReadView::boxed_with(OnceSource::new("ab"), Doubler);
        assert_eq!(view.read(None).unwrap(), "aabb<end>");
    }
}
