// Canonical ordered-dictionary wire codec
//
// The record and relay formats share one compact self-describing encoding:
// a dictionary framed by 'd'..'e', byte strings as `<len>:<bytes>`, and
// unsigned integers as `i<digits>e`. Producers emit keys in ascending byte
// order; the reader accepts keys in any order and exposes the raw offset of
// each entry so a signature field can be excluded from a signed message by
// byte splicing rather than re-encoding.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("truncated input")]
    Truncated,
    #[error("expected dictionary")]
    ExpectedDict,
    #[error("invalid length prefix")]
    InvalidLength,
    #[error("invalid integer")]
    InvalidInt,
    #[error("unsupported value type {0:#04x}")]
    UnsupportedType(u8),
    #[error("trailing bytes after dictionary")]
    TrailingData,
    #[error("nesting too deep")]
    TooDeep,
}

/// Maximum container nesting the reader will follow when skipping
/// unrecognized values
const MAX_DEPTH: usize = 8;

/// One decoded dictionary entry.
///
/// `key_start` is the byte offset of the entry's key token within the input
/// buffer; everything before it is the encoding of all preceding entries.
#[derive(Debug)]
pub struct Entry<'a> {
    pub key: &'a [u8],
    pub value: Value<'a>,
    pub key_start: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Value<'a> {
    Bytes(&'a [u8]),
    Int(u64),
    /// Raw span of a nested list/dictionary we carried over without
    /// interpreting
    Raw(&'a [u8]),
}

/// Streaming reader over one top-level dictionary
#[derive(Debug)]
pub struct DictReader<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> DictReader<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, WireError> {
        match buf.first() {
            Some(b'd') => Ok(Self { buf, pos: 1, done: false }),
            Some(_) => Err(WireError::ExpectedDict),
            None => Err(WireError::Truncated),
        }
    }

    /// Read the next entry, or `None` at the closing 'e'.
    ///
    /// The closing 'e' must also be the end of the input; anything after it
    /// is an error, so a dictionary consumes its buffer exactly.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'a>>, WireError> {
        if self.done {
            return Ok(None);
        }
        match self.buf.get(self.pos) {
            None => Err(WireError::Truncated),
            Some(b'e') => {
                if self.pos + 1 != self.buf.len() {
                    return Err(WireError::TrailingData);
                }
                self.done = true;
                Ok(None)
            }
            Some(_) => {
                let key_start = self.pos;
                let key = self.read_string()?;
                let value = self.read_value(0)?;
                Ok(Some(Entry { key, value, key_start }))
            }
        }
    }

    fn read_string(&mut self) -> Result<&'a [u8], WireError> {
        let mut len: usize = 0;
        let mut digits = 0usize;
        while let Some(&c) = self.buf.get(self.pos) {
            match c {
                b'0'..=b'9' => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add((c - b'0') as usize))
                        .ok_or(WireError::InvalidLength)?;
                    digits += 1;
                    self.pos += 1;
                }
                b':' => {
                    if digits == 0 {
                        return Err(WireError::InvalidLength);
                    }
                    self.pos += 1;
                    let end = self
                        .pos
                        .checked_add(len)
                        .filter(|&e| e <= self.buf.len())
                        .ok_or(WireError::Truncated)?;
                    let out = &self.buf[self.pos..end];
                    self.pos = end;
                    return Ok(out);
                }
                _ => return Err(WireError::InvalidLength),
            }
        }
        Err(WireError::Truncated)
    }

    fn read_int(&mut self) -> Result<u64, WireError> {
        // caller consumed the leading 'i'
        let mut value: u64 = 0;
        let mut digits = 0usize;
        while let Some(&c) = self.buf.get(self.pos) {
            match c {
                b'0'..=b'9' => {
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add((c - b'0') as u64))
                        .ok_or(WireError::InvalidInt)?;
                    digits += 1;
                    self.pos += 1;
                }
                b'e' => {
                    if digits == 0 {
                        return Err(WireError::InvalidInt);
                    }
                    self.pos += 1;
                    return Ok(value);
                }
                _ => return Err(WireError::InvalidInt),
            }
        }
        Err(WireError::Truncated)
    }

    fn read_value(&mut self, depth: usize) -> Result<Value<'a>, WireError> {
        if depth > MAX_DEPTH {
            return Err(WireError::TooDeep);
        }
        match self.buf.get(self.pos) {
            None => Err(WireError::Truncated),
            Some(b'i') => {
                self.pos += 1;
                Ok(Value::Int(self.read_int()?))
            }
            Some(b'0'..=b'9') => Ok(Value::Bytes(self.read_string()?)),
            Some(b'l') | Some(b'd') => {
                let start = self.pos;
                self.skip_container(depth + 1)?;
                Ok(Value::Raw(&self.buf[start..self.pos]))
            }
            Some(&other) => Err(WireError::UnsupportedType(other)),
        }
    }

    fn skip_container(&mut self, depth: usize) -> Result<(), WireError> {
        if depth > MAX_DEPTH {
            return Err(WireError::TooDeep);
        }
        self.pos += 1; // 'l' or 'd'
        loop {
            match self.buf.get(self.pos) {
                None => return Err(WireError::Truncated),
                Some(b'e') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => {
                    self.read_value(depth)?;
                }
            }
        }
    }
}

/// Canonical dictionary writer.
///
/// Callers must append keys in ascending byte order; that is what makes the
/// encoding canonical, and what the signed-record splice relies on.
#[derive(Clone)]
pub struct DictWriter {
    buf: Vec<u8>,
    #[cfg(debug_assertions)]
    last_key: Vec<u8>,
}

impl DictWriter {
    pub fn new() -> Self {
        Self {
            buf: vec![b'd'],
            #[cfg(debug_assertions)]
            last_key: Vec::new(),
        }
    }

    fn write_string(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes.len().to_string().as_bytes());
        self.buf.push(b':');
        self.buf.extend_from_slice(bytes);
    }

    fn write_key(&mut self, key: &str) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.last_key.as_slice() < key.as_bytes(),
                "dictionary keys must be appended in ascending order"
            );
            self.last_key = key.as_bytes().to_vec();
        }
        self.write_string(key.as_bytes());
    }

    pub fn append_bytes(&mut self, key: &str, value: &[u8]) -> &mut Self {
        self.write_key(key);
        self.write_string(value);
        self
    }

    pub fn append_str(&mut self, key: &str, value: &str) -> &mut Self {
        self.append_bytes(key, value.as_bytes())
    }

    pub fn append_int(&mut self, key: &str, value: u64) -> &mut Self {
        self.write_key(key);
        self.buf.push(b'i');
        self.buf.extend_from_slice(value.to_string().as_bytes());
        self.buf.push(b'e');
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(b'e');
        self.buf
    }
}

impl Default for DictWriter {
    fn default() -> Self {
        Self::new()
    }
}
