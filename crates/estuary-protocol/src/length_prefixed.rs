use estuary_core::Pipe;

use crate::protocol::{AProtocol, Message};

/// Width of the length header, in bytes. Multi-byte widths are interpreted
/// as network (big-endian) byte order per spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWidth {
    One,
    Two,
    Four,
}

impl HeaderWidth {
    fn bytes(self) -> usize {
        match self {
            HeaderWidth::One => 1,
            HeaderWidth::Two => 2,
            HeaderWidth::Four => 4,
        }
    }
}

/// Length-prefixed framing: a `W`-byte size header followed by exactly that
/// many payload bytes.
///
/// Ported from `qb::protocol::base::size_as_header`
/// (`original_source/include/qb/io/protocol/base.h`), which consumes the
/// header via `free_front` as soon as it is read and latches the payload
/// size until enough bytes have arrived. A latched size of zero is a
/// well-formed empty message and is dispatched once, not elided (spec.md §8
/// boundary behavior).
pub struct LengthPrefixed {
    width: HeaderWidth,
    latched_size: Option<usize>,
    max_frame_size: usize,
    failed: bool,
}

impl LengthPrefixed {
    pub fn new(width: HeaderWidth, max_frame_size: usize) -> Self {
        Self { width, latched_size: None, max_frame_size, failed: false }
    }
}

impl AProtocol for LengthPrefixed {
    fn message_size(&mut self, input: &Pipe) -> usize {
        let w = self.width.bytes();

        if self.latched_size.is_none() {
            if input.size() < w {
                return 0;
            }
            let header = &input.begin()[..w];
            let size = match self.width {
                HeaderWidth::One => header[0] as usize,
                HeaderWidth::Two => u16::from_be_bytes([header[0], header[1]]) as usize,
                HeaderWidth::Four => {
                    u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize
                }
            };
            if size > self.max_frame_size {
                tracing::warn!(
                    size,
                    max_frame_size = self.max_frame_size,
                    "length-prefixed header exceeds max_frame_size, failing protocol"
                );
                self.failed = true;
                return 0;
            }
            self.latched_size = Some(size);
        }

        // Unlike `qb::protocol::base::size_as_header`, which calls
        // `free_front(W)` inside `getMessageSize` as soon as the header is
        // read, this port only inspects `input` here (the trait takes
        // `&Pipe`, not `&mut Pipe`). To keep the same `message_size` /
        // `free_front(size)` contract every other protocol in this crate
        // uses, the returned size covers the *whole* frame — header and
        // payload together — so the host's eventual `free_front(size)`
        // drops both in one call.
        let payload = self.latched_size.expect("just set above");
        if input.size() >= w + payload {
            w + payload
        } else {
            0
        }
    }

    fn on_message(&mut self, input: &Pipe, size: usize, emit: &mut dyn FnMut(Message<'_>)) {
        let w = self.width.bytes();
        emit(Message { data: &input.begin()[w..size] });
        self.latched_size = None;
    }

    fn reset(&mut self) {
        self.latched_size = None;
    }

    fn ok(&self) -> bool {
        !self.failed
    }

    fn mark_failed(&mut self) {
        self.failed = true;
    }
}
