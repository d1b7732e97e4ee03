// Scripted serial port for tests. Reads replay queued chunks in order and
// return 0 bytes (a read timeout) once the script runs out.

use std::collections::VecDeque;
use std::vec::Vec;

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

use crate::SYNC;

#[derive(Debug, Default)]
pub struct MockSerial {
    script: VecDeque<Result<Vec<u8>, ErrorKind>>,
    pub written: Vec<u8>,
    fail_writes: bool,
    pub reads: usize,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Ok(bytes.to_vec()));
        self
    }

    // A read that times out with nothing received.
    pub fn silence(self) -> Self {
        self.reply(&[])
    }

    pub fn fail_read(mut self) -> Self {
        self.script.push_back(Err(ErrorKind::BrokenPipe));
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn written_text(&self) -> &str {
        std::str::from_utf8(&self.written).unwrap()
    }
}

impl ErrorType for MockSerial {
    type Error = ErrorKind;
}

impl Read for MockSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(Ok(mut chunk)) => {
                if chunk.len() > buf.len() {
                    let rest = chunk.split_off(buf.len());
                    self.script.push_front(Ok(rest));
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Some(Err(kind)) => Err(kind),
            None => Ok(0),
        }
    }
}

impl Write for MockSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(ErrorKind::BrokenPipe);
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// Builds a streaming frame the way the transducer sends it, stuffing any sync bytes in the payload.
pub fn encode_frame(packet_type: u8, value: f32) -> heapless::Vec<u8, 10> {
    let mut frame = heapless::Vec::new();
    frame.push(SYNC).unwrap();
    frame.push(packet_type).unwrap();
    for byte in value.to_le_bytes() {
        frame.push(byte).unwrap();
        if byte == SYNC {
            frame.push(SYNC).unwrap();
        }
    }
    frame
}
