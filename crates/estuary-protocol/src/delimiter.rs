use estuary_core::Pipe;

use crate::protocol::{AProtocol, Message};

/// Messages terminated by a single delimiter byte (e.g. `b'\n'` or `b'\0'`).
///
/// Ported from `qb::protocol::base::byte_terminated`
/// (`original_source/include/qb/io/protocol/base.h`): the scan offset is
/// persisted across calls so a growing input pipe is never re-scanned from
/// the start.
pub struct ByteTerminated {
    delimiter: u8,
    offset: usize,
    failed: bool,
}

impl ByteTerminated {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter, offset: 0, failed: false }
    }
}

impl AProtocol for ByteTerminated {
    fn message_size(&mut self, input: &Pipe) -> usize {
        let buf = input.begin();
        if let Some(rel) = buf[self.offset..].iter().position(|&b| b == self.delimiter) {
            let idx = self.offset + rel;
            self.offset = 0;
            idx + 1
        } else {
            self.offset = buf.len();
            0
        }
    }

    fn on_message(&mut self, input: &Pipe, size: usize, emit: &mut dyn FnMut(Message<'_>)) {
        emit(Message { data: &input.begin()[..size - 1] });
    }

    fn reset(&mut self) {
        self.offset = 0;
    }

    fn ok(&self) -> bool {
        !self.failed
    }

    fn mark_failed(&mut self) {
        self.failed = true;
    }
}

/// Messages terminated by a multi-byte delimiter (e.g. `b"\r\n"`).
///
/// Ported from `qb::protocol::base::bytes_terminated`; the saved offset
/// accounts for the delimiter length so a delimiter straddling a buffer
/// growth is never missed (spec.md §8 boundary behavior).
pub struct BytesTerminated {
    delimiter: Vec<u8>,
    offset: usize,
    failed: bool,
}

impl BytesTerminated {
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Self {
        let delimiter = delimiter.into();
        assert!(!delimiter.is_empty(), "delimiter must not be empty");
        Self { delimiter, offset: 0, failed: false }
    }
}

impl AProtocol for BytesTerminated {
    fn message_size(&mut self, input: &Pipe) -> usize {
        let buf = input.begin();
        let dlen = self.delimiter.len();
        if buf.len() < self.offset + dlen {
            return 0;
        }
        let last_start = buf.len() - dlen;
        let mut i = self.offset;
        while i <= last_start {
            if &buf[i..i + dlen] == self.delimiter.as_slice() {
                self.offset = 0;
                return i + dlen;
            }
            i += 1;
        }
        // Keep re-scanning from a point that still covers a delimiter that
        // straddles the next append; never skip past `last_start + 1`.
        self.offset = last_start + 1;
        0
    }

    fn on_message(&mut self, input: &Pipe, size: usize, emit: &mut dyn FnMut(Message<'_>)) {
        let dlen = self.delimiter.len();
        emit(Message { data: &input.begin()[..size - dlen] });
    }

    fn reset(&mut self) {
        self.offset = 0;
    }

    fn ok(&self) -> bool {
        !self.failed
    }

    fn mark_failed(&mut self) {
        self.failed = true;
    }
}
