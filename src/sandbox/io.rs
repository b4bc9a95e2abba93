//! Transcript capture for toolchain invocations.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A shared buffer collecting the interleaved output of every command run
/// in one sandbox, each introduced by a `$ <command line>` header.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the command line about to run.
    pub fn write_command(&self, command_line: &str) {
        let mut buffer = self.lock();
        buffer.extend_from_slice(b"$ ");
        buffer.extend_from_slice(command_line.as_bytes());
        buffer.push(b'\n');
    }

    /// Append raw output.
    pub fn append(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
    }

    /// Get the transcript as a string.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Get the transcript as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Get the length of captured data.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_output() {
        let mut output = Transcript::new();
        output.write_all(b"hello ").unwrap();
        output.write_all(b"world").unwrap();
        assert_eq!(output.to_string_lossy(), "hello world");
    }

    #[test]
    fn test_command_headers() {
        let transcript = Transcript::new();
        transcript.write_command("go build -o main.wasm");
        transcript.append(b"./main.go:3:1: syntax error\n");
        transcript.write_command("go version");
        assert_eq!(
            transcript.to_string_lossy(),
            "$ go build -o main.wasm\n./main.go:3:1: syntax error\n$ go version\n"
        );
    }

    #[test]
    fn test_clones_share_buffer() {
        let transcript = Transcript::new();
        let clone = transcript.clone();
        clone.append(b"shared");
        assert_eq!(transcript.len(), 6);
        assert!(!transcript.is_empty());
    }
}
