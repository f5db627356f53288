//! Line iteration over a File resource.

use std::mem;

use crate::{Error, FileCapability};

const LINE_CHUNK: usize = 8192;

/// Lazy iterator over the lines of a file, split on `\n`.
///
/// Each line keeps its terminating `\n`; a trailing partial line is yielded
/// as-is if non-empty. The iterator reads through the file's own read view,
/// so it continues from wherever earlier reads left off and cannot be
/// restarted without [`rewind`](FileCapability::rewind). A read error is
/// yielded once and ends the iteration.
pub struct Lines<'a, F: FileCapability + ?Sized> {
    file: &'a mut F,
    pending: Vec<u8>,
    scanned: usize,
    done: bool,
}

impl<'a, F: FileCapability + ?Sized> Lines<'a, F> {
    pub fn new(file: &'a mut F) -> Self {
        Self {
            file,
            pending: Vec::new(),
            scanned: 0,
            done: false,
        }
    }
}

impl<F: FileCapability + ?Sized> Iterator for Lines<'_, F> {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pos) = self.pending[self.scanned..].iter().position(|b| *b == b'\n') {
                let rest = self.pending.split_off(self.scanned + pos + 1);
                self.scanned = 0;
                return Some(Ok(mem::replace(&mut self.pending, rest)));
            }
            self.scanned = self.pending.len();

            if self.done {
                self.scanned = 0;
                return (!self.pending.is_empty()).then(|| Ok(mem::take(&mut self.pending)));
            }

            match self.file.read(Some(LINE_CHUNK)) {
                Ok(chunk) => {
                    self.done = chunk.len() < LINE_CHUNK;
                    self.pending.extend_from_slice(&chunk);
                }
                Err(e) => {
                    self.done = true;
                    self.pending.clear();
                    self.scanned = 0;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl dyn FileCapability + '_ {
    /// Iterate the lines of this file.
    pub fn lines(&mut self) -> Lines<'_, Self> {
        Lines::new(self)
    }
}
