//! NETCONF message framing over SSH (RFC 6242)
//!
//! Two framings exist on the wire:
//! - end-of-message: every message is terminated by `]]>]]>` (base:1.0,
//!   always used for the hello exchange)
//! - chunked: `\n#<len>\n<data>` repeated, closed by `\n##\n` (base:1.1)

/// Delimiter closing every base:1.0 message
pub const END_OF_MESSAGE: &str = "]]>]]>";

/// Largest chunk size allowed by RFC 6242
const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

/// Digits in the largest chunk size; a longer header is malformed
const MAX_CHUNK_DIGITS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("invalid chunk header at byte {0}")]
    InvalidChunkHeader(usize),
    #[error("chunk size {0} out of range")]
    ChunkSize(u64),
    #[error("message is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    EndOfMessage,
    Chunked,
}

impl Framing {
    /// Frame an outgoing message
    pub fn encode(&self, message: &str) -> Vec<u8> {
        match self {
            Framing::EndOfMessage => {
                let mut out = Vec::with_capacity(message.len() + END_OF_MESSAGE.len());
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(END_OF_MESSAGE.as_bytes());
                out
            }
            Framing::Chunked => {
                let mut out = format!("\n#{}\n", message.len()).into_bytes();
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(b"\n##\n");
                out
            }
        }
    }

    /// Pull one complete message off the front of `buffer`.
    ///
    /// Returns `Ok(None)` while the buffer only holds part of a message;
    /// nothing is consumed in that case.
    pub fn decode(&self, buffer: &mut Vec<u8>) -> Result<Option<String>, FramingError> {
        match self {
            Framing::EndOfMessage => decode_end_of_message(buffer),
            Framing::Chunked => decode_chunked(buffer),
        }
    }
}

fn decode_end_of_message(buffer: &mut Vec<u8>) -> Result<Option<String>, FramingError> {
    let delimiter = END_OF_MESSAGE.as_bytes();
    let Some(end) = buffer
        .windows(delimiter.len())
        .position(|window| window == delimiter)
    else {
        return Ok(None);
    };

    let message: Vec<u8> = buffer.drain(..end + delimiter.len()).take(end).collect();
    Ok(Some(String::from_utf8(message)?.trim().to_string()))
}

fn decode_chunked(buffer: &mut Vec<u8>) -> Result<Option<String>, FramingError> {
    let mut pos = 0;
    let mut message = Vec::new();

    loop {
        if buffer.len() < pos + 4 {
            return Ok(None);
        }
        if &buffer[pos..pos + 2] != b"\n#" {
            return Err(FramingError::InvalidChunkHeader(pos));
        }

        // end-of-chunks marker
        if buffer[pos + 2] == b'#' {
            if buffer[pos + 3] != b'\n' {
                return Err(FramingError::InvalidChunkHeader(pos));
            }
            buffer.drain(..pos + 4);
            return Ok(Some(String::from_utf8(message)?));
        }

        let size_start = pos + 2;
        let Some(size_len) = buffer[size_start..].iter().position(|b| *b == b'\n') else {
            if buffer.len() - size_start > MAX_CHUNK_DIGITS {
                return Err(FramingError::InvalidChunkHeader(pos));
            }
            return Ok(None);
        };

        let digits = &buffer[size_start..size_start + size_len];
        if digits.is_empty()
            || digits.len() > MAX_CHUNK_DIGITS
            || !digits.iter().all(u8::is_ascii_digit)
        {
            return Err(FramingError::InvalidChunkHeader(pos));
        }
        let size: u64 = digits
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'));
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(FramingError::ChunkSize(size));
        }

        let data_start = size_start + size_len + 1;
        let data_end = data_start + size as usize;
        if buffer.len() < data_end {
            return Ok(None);
        }
        message.extend_from_slice(&buffer[data_start..data_end]);
        pos = data_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_message_waits_for_delimiter() {
        let mut buffer = b"<hello/>]]>".to_vec();
        assert!(Framing::EndOfMessage.decode(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), 11);

        buffer.extend_from_slice(b"]]><rpc-reply");
        let message = Framing::EndOfMessage.decode(&mut buffer).unwrap();
        assert_eq!(message.as_deref(), Some("<hello/>"));
        assert_eq!(buffer, b"<rpc-reply".to_vec());
    }

    #[test]
    fn test_chunked_message_spanning_several_chunks() {
        let mut buffer = b"\n#4\n<rpc\n#18\n-reply><ok/></rpc-\n#6\nreply>\n##\n".to_vec();
        let message = Framing::Chunked.decode(&mut buffer).unwrap();
        assert_eq!(message.as_deref(), Some("<rpc-reply><ok/></rpc-reply>"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_chunked_partial_input_is_not_consumed() {
        let full = Framing::Chunked.encode("<rpc-reply><ok/></rpc-reply>");
        let mut buffer = full[..full.len() - 3].to_vec();
        assert!(Framing::Chunked.decode(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), full.len() - 3);

        buffer.extend_from_slice(&full[full.len() - 3..]);
        assert!(Framing::Chunked.decode(&mut buffer).unwrap().is_some());
    }

    #[test]
    fn test_chunked_rejects_bad_headers() {
        let mut buffer = b"<rpc-reply/>]]>]]>".to_vec();
        assert!(matches!(
            Framing::Chunked.decode(&mut buffer),
            Err(FramingError::InvalidChunkHeader(0))
        ));

        let mut zero = b"\n#0\n\n##\n".to_vec();
        assert!(matches!(
            Framing::Chunked.decode(&mut zero),
            Err(FramingError::ChunkSize(0))
        ));

        let mut runaway = b"\n#12345678901".to_vec();
        assert!(Framing::Chunked.decode(&mut runaway).is_err());
    }

    #[test]
    fn test_encode_matches_wire_format() {
        assert_eq!(Framing::EndOfMessage.encode("<a/>"), b"<a/>]]>]]>".to_vec());
        assert_eq!(Framing::Chunked.encode("<a/>"), b"\n#4\n<a/>\n##\n".to_vec());
    }
}
