//! Line protocol spoken with a persistent compiler session.
//!
//! Request: three newline-terminated lines on the session's stdin:
//!
//! ```text
//! <intermediate output path>
//! <init symbol name>
//! <source path>
//! ```
//!
//! Response: exactly one newline-terminated line on stdout once the
//! intermediate file has been written. The line `quit` ends the session.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use thiserror::Error;

use super::job::BuildJob;

/// Directive asking the compiler process to exit.
pub const QUIT_DIRECTIVE: &str = "quit";

/// One compilation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Where the compiler writes the intermediate (assembly) file.
    pub intermediate: PathBuf,

    /// Init symbol for the compiled scope.
    pub symbol: String,

    /// Source file to compile.
    pub source: PathBuf,
}

impl CompileRequest {
    pub fn from_job(job: &BuildJob) -> Self {
        Self {
            intermediate: job.intermediate(),
            symbol: job.symbol.clone(),
            source: job.source.clone(),
        }
    }
}

/// Why an acknowledgment could not be read.
#[derive(Debug, Error)]
pub enum AckError {
    /// The compiler closed its output (usually: it exited).
    #[error("compiler closed its output before acknowledging")]
    Eof,

    /// Output ended in the middle of a line.
    #[error("malformed acknowledgment: {0:?}")]
    Unterminated(String),

    #[error("failed to read acknowledgment: {0}")]
    Io(#[from] io::Error),
}

fn line_field(value: &str) -> io::Result<&str> {
    if value.contains('\n') || value.contains('\r') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("request field contains a line break: {value:?}"),
        ));
    }
    Ok(value)
}

/// Write a request and flush it.
pub fn write_request<W: Write>(writer: &mut W, request: &CompileRequest) -> io::Result<()> {
    let intermediate = request.intermediate.to_string_lossy();
    let source = request.source.to_string_lossy();

    writeln!(writer, "{}", line_field(&intermediate)?)?;
    writeln!(writer, "{}", line_field(&request.symbol)?)?;
    writeln!(writer, "{}", line_field(&source)?)?;
    writer.flush()
}

/// Write the quit directive and flush it.
pub fn write_quit<W: Write>(writer: &mut W) -> io::Result<()> {
    writeln!(writer, "{QUIT_DIRECTIVE}")?;
    writer.flush()
}

/// Read one acknowledgment line, without its terminator.
pub fn read_ack<R: BufRead>(reader: &mut R) -> Result<String, AckError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        return Err(AckError::Eof);
    }
    match line.strip_suffix('\n') {
        Some(body) => Ok(body.trim_end_matches('\r').to_string()),
        None => Err(AckError::Unterminated(line)),
    }
}

/// Read one request from the compiler's side of the pipe.
///
/// Returns `None` on `quit` or end of input. Used by test doubles that stand
/// in for a real compiler.
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<CompileRequest>> {
    let mut fields = [String::new(), String::new(), String::new()];
    for (i, field) in fields.iter_mut().enumerate() {
        if reader.read_line(field)? == 0 {
            return Ok(None);
        }
        let trimmed = field.trim_end_matches(['\n', '\r']).len();
        field.truncate(trimmed);
        if i == 0 && field == QUIT_DIRECTIVE {
            return Ok(None);
        }
    }

    let [intermediate, symbol, source] = fields;
    Ok(Some(CompileRequest {
        intermediate: PathBuf::from(intermediate),
        symbol,
        source: PathBuf::from(source),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request() -> CompileRequest {
        CompileRequest {
            intermediate: PathBuf::from("/b/obj/main.rb.x86.o.s"),
            symbol: "MREP_abc".to_string(),
            source: PathBuf::from("/p/main.rb"),
        }
    }

    #[test]
    fn test_request_is_three_lines() {
        let mut buf = Vec::new();
        write_request(&mut buf, &request()).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "/b/obj/main.rb.x86.o.s\nMREP_abc\n/p/main.rb\n"
        );
    }

    #[test]
    fn test_request_rejects_line_breaks() {
        let mut req = request();
        req.symbol = "bad\nsymbol".to_string();
        let err = write_request(&mut Vec::new(), &req).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_request_then_quit() {
        let mut buf = Vec::new();
        write_request(&mut buf, &request()).unwrap();
        write_quit(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_request(&mut cursor).unwrap(), Some(request()));
        assert_eq!(read_request(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_read_ack() {
        let mut cursor = Cursor::new(b"done\n".to_vec());
        assert_eq!(read_ack(&mut cursor).unwrap(), "done");

        let mut cursor = Cursor::new(b"\n".to_vec());
        assert_eq!(read_ack(&mut cursor).unwrap(), "");
    }

    #[test]
    fn test_read_ack_eof_and_partial() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(read_ack(&mut cursor), Err(AckError::Eof)));

        let mut cursor = Cursor::new(b"partial".to_vec());
        assert!(matches!(read_ack(&mut cursor), Err(AckError::Unterminated(_))));
    }
}
