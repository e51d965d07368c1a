//! RESP2 wire codec.
//!
//! The same encoding serves three purposes: client requests, server replies
//! and append-only log entries (a log is just requests back to back).
//!
//! Framing:
//!   `+<text>\r\n`        simple string
//!   `-<text>\r\n`        error
//!   `:<i64>\r\n`         integer
//!   `$<len>\r\n<bytes>\r\n` bulk string (`$-1\r\n` = null)
//!   `*<n>\r\n<value>...` array (`*-1\r\n` = null array)

use std::io::{BufRead, Read};

use crate::error::{KvError, KvResult};

/// Largest bulk string accepted (512 MiB, same as Redis)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array accepted
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Longest header or simple-string line accepted, terminator included
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Bulk payloads are buffered at most this far ahead of the bytes actually received
const BULK_PREALLOC: usize = 64 * 1024;

/// Decoded RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Simple(String),
    Error(String),
    Integer(i64),
    /// Bulk payloads are decoded as UTF-8 with invalid sequences replaced by
    /// U+FFFD, so binary values are not preserved byte for byte (in memory
    /// or in the log, which stores the decoded request).
    Bulk(String),
    Null,
    Array(Vec<Value>),
    NullArray,
}

impl Value {
    /// `+OK`
    pub fn ok() -> Self {
        Value::Simple("OK".to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(message.into())
    }

    pub fn bulk(text: impl Into<String>) -> Self {
        Value::Bulk(text.into())
    }

    /// A request: array of bulk strings, command name first.
    pub fn command<S: AsRef<str>>(name: &str, args: &[S]) -> Self {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(Value::bulk(name));
        parts.extend(args.iter().map(|a| Value::bulk(a.as_ref())));
        Value::Array(parts)
    }

    /// Text payload of a simple/bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Simple(s) | Value::Bulk(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize to wire bytes.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::Integer(i) => {
                out.extend_from_slice(format!(":{}\r\n", i).as_bytes());
            }
            Value::Bulk(s) => {
                out.extend_from_slice(format!("${}\r\n", s.len()).as_bytes());
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::Null => out.extend_from_slice(b"$-1\r\n"),
            Value::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.write_to(out);
                }
            }
            Value::NullArray => out.extend_from_slice(b"*-1\r\n"),
        }
    }
}

/// Streaming RESP decoder over any buffered reader.
///
/// Tracks how many bytes of complete values it has consumed so a caller can
/// tell exactly where a torn trailing value starts.
pub struct RespReader<R> {
    inner: R,
    /// Bytes consumed, including any partial value in progress
    consumed: u64,
    /// End offset of the last fully decoded top-level value
    position: u64,
}

impl<R: BufRead> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0, position: 0 }
    }

    /// Offset just past the last complete value.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Decode the next top-level value.
    ///
    /// `Ok(None)` means the input ended cleanly between values.
    /// `TruncatedEntry` means it ended inside one.
    pub fn read_value(&mut self) -> KvResult<Option<Value>> {
        let start = self.position;
        if self.inner.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let value = self.decode(start)?;
        self.position = self.consumed;
        Ok(Some(value))
    }

    fn decode(&mut self, start: u64) -> KvResult<Value> {
        let line_offset = self.consumed;
        let line = self.read_line(start)?;
        let (prefix, body) = match line.split_first() {
            Some((prefix, body)) => (*prefix, body),
            None => return Err(KvError::protocol(line_offset, "empty line")),
        };

        match prefix {
            b'+' => Ok(Value::Simple(String::from_utf8_lossy(body).into_owned())),
            b'-' => Ok(Value::Error(String::from_utf8_lossy(body).into_owned())),
            b':' => Ok(Value::Integer(parse_int(body, line_offset)?)),
            b'$' => {
                let len = parse_int(body, line_offset)?;
                if len == -1 {
                    return Ok(Value::Null);
                }
                if len < 0 || len as u64 > MAX_BULK_LEN as u64 {
                    return Err(KvError::protocol(line_offset, format!("invalid bulk length {}", len)));
                }
                let data = self.read_exact(len as usize + 2, start)?;
                if &data[len as usize..] != b"\r\n" {
                    return Err(KvError::protocol(line_offset, "bulk string missing trailing CRLF"));
                }
                Ok(Value::Bulk(String::from_utf8_lossy(&data[..len as usize]).into_owned()))
            }
            b'*' => {
                let count = parse_int(body, line_offset)?;
                if count == -1 {
                    return Ok(Value::NullArray);
                }
                if count < 0 || count as u64 > MAX_ARRAY_LEN as u64 {
                    return Err(KvError::protocol(line_offset, format!("invalid array length {}", count)));
                }
                let mut items = Vec::with_capacity((count as usize).min(64));
                for _ in 0..count {
                    items.push(self.decode(start)?);
                }
                Ok(Value::Array(items))
            }
            other => Err(KvError::protocol(
                line_offset,
                format!("unknown type byte '{}'", other.escape_ascii()),
            )),
        }
    }

    /// Read one CRLF-terminated line, without the terminator.
    fn read_line(&mut self, start: u64) -> KvResult<Vec<u8>> {
        let line_offset = self.consumed;
        let mut line = Vec::new();
        let n = (&mut self.inner)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut line)?;
        self.consumed += n as u64;

        if !line.ends_with(b"\n") {
            if n == MAX_LINE_LEN {
                return Err(KvError::protocol(
                    line_offset,
                    format!("line longer than {} bytes", MAX_LINE_LEN),
                ));
            }
            return Err(KvError::TruncatedEntry { offset: start });
        }
        if !line.ends_with(b"\r\n") {
            return Err(KvError::protocol(line_offset, "line not terminated by CRLF"));
        }
        line.truncate(line.len() - 2);
        Ok(line)
    }

    /// Read exactly `len` bytes. The buffer grows with the data received,
    /// not with the length a header claims.
    fn read_exact(&mut self, len: usize, start: u64) -> KvResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(BULK_PREALLOC));
        let n = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.consumed += n as u64;
        if n < len {
            return Err(KvError::TruncatedEntry { offset: start });
        }
        Ok(buf)
    }
}

fn parse_int(body: &[u8], offset: u64) -> KvResult<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            KvError::protocol(offset, format!("invalid integer '{}'", String::from_utf8_lossy(body)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> RespReader<Cursor<Vec<u8>>> {
        RespReader::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_marshal_command() {
        let v = Value::command("HSET", &["user1", "name", "alice"]);
        assert_eq!(
            v.marshal(),
            b"*4\r\n$4\r\nHSET\r\n$5\r\nuser1\r\n$4\r\nname\r\n$5\r\nalice\r\n".to_vec()
        );
    }

    #[test]
    fn test_marshal_replies() {
        assert_eq!(Value::ok().marshal(), b"+OK\r\n");
        assert_eq!(Value::error("ERR boom").marshal(), b"-ERR boom\r\n");
        assert_eq!(Value::Integer(-7).marshal(), b":-7\r\n");
        assert_eq!(Value::Null.marshal(), b"$-1\r\n");
        assert_eq!(Value::NullArray.marshal(), b"*-1\r\n");
        assert_eq!(Value::bulk("").marshal(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_read_sequence_then_clean_eof() {
        let mut bytes = Value::command("SET", &["a", "1"]).marshal();
        bytes.extend(Value::command("GET", &["a"]).marshal());
        let mut r = reader(&bytes);

        assert_eq!(r.read_value().unwrap(), Some(Value::command("SET", &["a", "1"])));
        assert_eq!(r.read_value().unwrap(), Some(Value::command("GET", &["a"])));
        assert_eq!(r.read_value().unwrap(), None);
        assert_eq!(r.position(), bytes.len() as u64);
    }

    #[test]
    fn test_read_scalars() {
        let mut r = reader(b"+PONG\r\n:42\r\n-ERR x\r\n$-1\r\n*0\r\n");
        assert_eq!(r.read_value().unwrap(), Some(Value::Simple("PONG".into())));
        assert_eq!(r.read_value().unwrap(), Some(Value::Integer(42)));
        assert_eq!(r.read_value().unwrap(), Some(Value::Error("ERR x".into())));
        assert_eq!(r.read_value().unwrap(), Some(Value::Null));
        assert_eq!(r.read_value().unwrap(), Some(Value::Array(vec![])));
    }

    #[test]
    fn test_bulk_with_crlf_inside() {
        let v = Value::command("SET", &["k", "line1\r\nline2"]);
        let mut r = reader(&v.marshal());
        assert_eq!(r.read_value().unwrap(), Some(v));
    }

    #[test]
    fn test_every_truncation_detected() {
        let complete = Value::command("HSET", &["user1", "name", "alice"]);
        let bytes = complete.marshal();
        for cut in 1..bytes.len() {
            let mut r = reader(&bytes[..cut]);
            match r.read_value() {
                Err(KvError::TruncatedEntry { offset }) => assert_eq!(offset, 0),
                other => panic!("cut at {} gave {:?}", cut, other),
            }
        }
    }

    #[test]
    fn test_truncation_after_complete_value_reports_its_end() {
        let first = Value::command("SET", &["a", "1"]).marshal();
        let mut bytes = first.clone();
        bytes.extend_from_slice(b"*2\r\n$3\r\nGE");
        let mut r = reader(&bytes);

        assert!(r.read_value().unwrap().is_some());
        match r.read_value() {
            Err(KvError::TruncatedEntry { offset }) => assert_eq!(offset, first.len() as u64),
            other => panic!("expected truncation, got {:?}", other),
        }
        assert_eq!(r.position(), first.len() as u64);
    }

    #[test]
    fn test_bad_type_byte() {
        let mut r = reader(b"?what\r\n");
        assert!(matches!(r.read_value(), Err(KvError::Protocol { .. })));
    }

    #[test]
    fn test_bad_bulk_length() {
        let mut r = reader(b"$abc\r\n");
        assert!(matches!(r.read_value(), Err(KvError::Protocol { .. })));
        let mut r = reader(b"$-5\r\n");
        assert!(matches!(r.read_value(), Err(KvError::Protocol { .. })));
    }

    #[test]
    fn test_missing_bulk_terminator() {
        let mut r = reader(b"$3\r\nabcXY");
        assert!(matches!(r.read_value(), Err(KvError::Protocol { .. })));
    }

    #[test]
    fn test_declared_bulk_larger_than_input_is_truncation() {
        let mut r = reader(b"*1\r\n$536870912\r\nabc");
        assert!(matches!(r.read_value(), Err(KvError::TruncatedEntry { offset: 0 })));
    }

    #[test]
    fn test_overlong_line_rejected() {
        let mut bytes = vec![b'+'; MAX_LINE_LEN + 10];
        bytes.extend_from_slice(b"\r\n");
        let mut r = reader(&bytes);
        assert!(matches!(r.read_value(), Err(KvError::Protocol { offset: 0, .. })));
    }

    #[test]
    fn test_endless_line_rejected() {
        // A peer that never sends a newline.
        let endless = std::io::BufReader::new(std::io::repeat(b'+'));
        let mut r = RespReader::new(endless);
        assert!(matches!(r.read_value(), Err(KvError::Protocol { .. })));
    }

    #[test]
    fn test_line_at_limit_accepted() {
        let mut bytes = vec![b'+'];
        bytes.extend(std::iter::repeat(b'x').take(MAX_LINE_LEN - 3));
        bytes.extend_from_slice(b"\r\n");
        assert_eq!(bytes.len(), MAX_LINE_LEN);
        let mut r = reader(&bytes);
        assert_eq!(r.read_value().unwrap(), Some(Value::Simple("x".repeat(MAX_LINE_LEN - 3))));
    }

    #[test]
    fn test_invalid_utf8_bulk_is_replaced() {
        let mut r = reader(b"$2\r\n\xff\xfe\r\n");
        assert_eq!(r.read_value().unwrap(), Some(Value::Bulk("\u{FFFD}\u{FFFD}".into())));
    }

    #[test]
    fn test_oversized_array_rejected() {
        let mut r = reader(b"*99999999\r\n");
        assert!(matches!(r.read_value(), Err(KvError::Protocol { .. })));
    }
}
