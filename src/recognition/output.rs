//! Symbol output sinks

use std::io::{self, Write};

/// Appended after every emitted symbol
pub const SYMBOL_SEPARATOR: &str = " ";

/// Append-only receiver of confirmed symbols
pub trait SymbolSink: Send {
    fn emit(&mut self, symbol: &str) -> io::Result<()>;
}

/// In-memory transcript
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Return the transcript and leave the buffer empty
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

impl SymbolSink for TextBuffer {
    fn emit(&mut self, symbol: &str) -> io::Result<()> {
        self.text.push_str(symbol);
        self.text.push_str(SYMBOL_SEPARATOR);
        Ok(())
    }
}

/// Writes symbols to any `io::Write`, flushing after each one
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> SymbolSink for WriterSink<W> {
    fn emit(&mut self, symbol: &str) -> io::Result<()> {
        write!(self.writer, "{symbol}{SYMBOL_SEPARATOR}")?;
        self.writer.flush()
    }
}
