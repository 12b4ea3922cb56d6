use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Size of the intermediate copy buffer.
pub const BUFFER_SIZE: usize = 1024;

/// Statistics of a completed copy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CopyStats {
    /// Number of bytes moved.
    pub bytes: u64,
    /// Wall-clock time spent copying.
    pub elapsed: Duration,
}

/// Copies a readable source into a writable destination through a fixed-size buffer.
pub struct StreamCopier {
    buffer: [u8; BUFFER_SIZE],
}

impl StreamCopier {
    pub fn new() -> Self {
        StreamCopier {
            buffer: [0; BUFFER_SIZE],
        }
    }

    /// Copies every readable byte from `src` into `dst`.
    ///
    /// A read error ends the copy the same way end-of-stream does, so a failing source
    /// yields a truncated copy rather than an error. The error is logged at `warn` level.
    /// Write errors are returned.
    pub fn copy<R, W>(&mut self, src: &mut R, dst: &mut W) -> std::io::Result<CopyStats>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let start = Instant::now();
        let mut bytes = 0u64;
        loop {
            let n = match src.read(&mut self.buffer) {
                Ok(n) => n,
                Err(error) => {
                    tracing::warn!(%error, bytes, "read failed, treating as end of stream");
                    0
                }
            };
            if n == 0 {
                break;
            }
            dst.write_all(&self.buffer[..n])?;
            bytes += n as u64;
        }
        dst.flush()?;
        Ok(CopyStats {
            bytes,
            elapsed: start.elapsed(),
        })
    }
}

impl Default for StreamCopier {
    fn default() -> Self {
        Self::new()
    }
}
