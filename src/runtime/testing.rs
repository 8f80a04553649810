//! In-memory transport for exercising the chat engine without sockets.

use crate::protocols::chat::{decode, Message};
use crate::runtime::buffer::FrameBuffer;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Debug, Default)]
struct SinkState {
    written: Vec<u8>,
    fail: bool,
}

/// A cloneable `Write` whose contents stay readable after the engine takes
/// ownership of one clone.
#[derive(Debug, Clone, Default)]
pub struct Sink(Rc<RefCell<SinkState>>);

impl Sink {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    /// Make every later write fail with `BrokenPipe`.
    pub fn fail_writes(&self) {
        self.0.borrow_mut().fail = true;
    }

    /// Decode and clear everything written so far.
    pub fn take_messages(&self) -> Vec<Message> {
        let written = std::mem::take(&mut self.0.borrow_mut().written);
        let mut buffer = FrameBuffer::new(written.len().max(1));
        buffer.extend(&written).unwrap();

        let mut messages = Vec::new();
        while let Some(frame) = buffer.next_frame().unwrap() {
            messages.push(decode(&frame).unwrap().1);
        }
        assert!(buffer.is_empty(), "trailing partial frame");
        messages
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        if state.fail {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
