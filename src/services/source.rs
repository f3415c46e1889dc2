use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use super::MessageSource;
use crate::types::CaptureMessage;
use crate::Result;

/// Reads capture messages line by line. Blank lines are ignored; malformed
/// ones, including lines that are not UTF-8, are logged and skipped.
pub struct LineMessageSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin + Send> LineMessageSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

impl LineMessageSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl LineMessageSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &std::path::Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageSource for LineMessageSource<R> {
    async fn next_message(&mut self) -> Result<Option<CaptureMessage>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "skipping non UTF-8 line");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<CaptureMessage>() {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!(line = self.line_no, error = %e, "skipping capture message"),
            }
        }
    }
}
