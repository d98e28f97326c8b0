use std::io::{BufWriter, Write};

/// Where a stream of diagnostics ends up.
enum Sink {
    /// Kept in memory so tests can inspect what the tools printed.
    Buffer(String),
    Stream(BufWriter<Box<dyn Write>>),
}

impl Sink {
    fn stream(target: Box<dyn Write>) -> Self {
        Sink::Stream(BufWriter::new(target))
    }

    fn push(&mut self, msg: &str, name: &str) {
        match self {
            Sink::Buffer(buffer) => buffer.push_str(msg),
            Sink::Stream(writer) => writer
                .write_all(msg.as_bytes())
                .unwrap_or_else(|err| panic!("Failed to write to {name}: {err}")),
        }
    }

    fn contents(&self) -> Option<String> {
        match self {
            Sink::Buffer(buffer) => Some(buffer.clone()),
            Sink::Stream(_) => None,
        }
    }

    fn flush(&mut self, name: &str) {
        if let Sink::Stream(writer) = self {
            writer
                .flush()
                .unwrap_or_else(|err| panic!("Failed to flush {name}: {err}"));
        }
    }
}

/// The program output and the error messages of the lexer, the parser and
/// the driver. Streams are flushed when the emitter is dropped.
pub struct DiagnosticEmitter {
    out: Sink,
    err: Sink,
}

impl DiagnosticEmitter {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            out: Sink::stream(out),
            err: Sink::stream(err),
        }
    }

    pub fn log_to_buffer() -> Self {
        Self {
            out: Sink::Buffer(String::new()),
            err: Sink::Buffer(String::new()),
        }
    }

    pub fn out(&mut self, msg: &str) {
        self.out.push(msg, "output");
    }

    pub fn out_ln(&mut self, msg: &str) {
        self.out(msg);
        self.out("\n");
    }

    pub fn err(&mut self, msg: &str) {
        self.err.push(msg, "error output");
    }

    pub fn err_ln(&mut self, msg: &str) {
        self.err(msg);
        self.err("\n");
    }

    /// Everything printed so far, `None` unless logging to a buffer.
    pub fn out_buffer(&self) -> Option<String> {
        self.out.contents()
    }

    pub fn err_buffer(&self) -> Option<String> {
        self.err.contents()
    }

    /// A lexical error on `line`.
    pub fn error(&mut self, line: u32, message: &str) {
        self.report(line, "", message);
    }

    /// A syntax error at `item`, e.g. "at 'foo'" or "at end of file".
    pub fn report(&mut self, line: u32, item: &str, message: &str) {
        self.err(&format!("[line {line}] Error {item}: {message}\n"));
    }

    pub fn flush(&mut self) {
        self.out.flush("output");
        self.err.flush("error output");
    }
}

impl Drop for DiagnosticEmitter {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod emitter_tests;
