//! Prompt-delimited codec for CLI sessions
//!
//! A device answers every line it receives with output followed by a prompt:
//! ```text
//! [ output lines, newline terminated ][ prompt, no trailing newline ]
//! ```
//! During login it answers with a credential challenge instead
//! (`Username: `, `Password: `). A frame is therefore complete when the
//! trailing partial line of the buffer is a prompt or a challenge.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::state_machine::CliMode;

/// Maximum bytes buffered while waiting for a prompt (4 MB)
pub const MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Response too large: {0} bytes without a prompt (max: {MAX_BUFFER_SIZE})")]
    BufferOverflow(usize),

    #[error("Command contains a line break: {0:?}")]
    EmbeddedNewline(String),
}

/// Parsed device prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub hostname: String,
    pub mode: CliMode,
    /// Text inside the parentheses, e.g. `config-if`
    pub context: Option<String>,
}

impl Prompt {
    /// Parse a trailing line as a prompt
    pub fn parse(line: &str) -> Option<Self> {
        let caps = prompt_regex().captures(line.trim_end_matches('\r'))?;
        let hostname = caps.name("host")?.as_str().trim().to_string();
        let context = caps.name("ctx").map(|m| m.as_str().to_string());
        let mode = match (&context, caps.name("term")?.as_str()) {
            (Some(ctx), _) if ctx.starts_with("config") => CliMode::Config,
            (_, "#") => CliMode::Privileged,
            _ => CliMode::User,
        };

        Some(Self {
            hostname,
            mode,
            context,
        })
    }
}

/// Render the prompt a device shows in a given mode
pub fn render_prompt(hostname: &str, mode: CliMode) -> String {
    match mode {
        CliMode::User => format!("{}>", hostname),
        CliMode::Privileged => format!("{}#", hostname),
        CliMode::Config => format!("{}(config)#", hostname),
    }
}

/// Credential request sent by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    Username,
    Password,
}

impl Challenge {
    /// Parse a trailing line as a credential challenge
    pub fn parse(line: &str) -> Option<Self> {
        let caps = challenge_regex().captures(line.trim_end_matches('\r'))?;
        let kind = caps.name("kind")?.as_str().to_ascii_lowercase();
        if kind.starts_with("pass") {
            Some(Challenge::Password)
        } else {
            Some(Challenge::Username)
        }
    }

    /// Text the device writes for this challenge
    pub fn render(&self) -> &'static str {
        match self {
            Challenge::Username => "Username: ",
            Challenge::Password => "Password: ",
        }
    }
}

/// One complete device answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Command output terminated by a prompt
    Response { output: String, prompt: Prompt },
    /// Credential challenge, with whatever the device printed before it
    Challenge {
        preamble: String,
        challenge: Challenge,
    },
}

fn prompt_regex() -> &'static Regex {
    static PROMPT: OnceLock<Regex> = OnceLock::new();
    PROMPT.get_or_init(|| {
        Regex::new(r"^(?P<host>[\w.\-/@:~\[\] ]+?)(?:\((?P<ctx>[^()]+)\))?\s?(?P<term>[>#$])\s*$")
            .unwrap_or_else(|e| panic!("invalid prompt pattern: {}", e))
    })
}

fn challenge_regex() -> &'static Regex {
    static CHALLENGE: OnceLock<Regex> = OnceLock::new();
    CHALLENGE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?P<kind>user ?name|login|password)\s*:\s*$")
            .unwrap_or_else(|e| panic!("invalid challenge pattern: {}", e))
    })
}

/// Strip carriage returns and trailing blank lines
fn normalize(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).replace('\r', "");
    text.trim_end_matches('\n').to_string()
}

/// Encode one command line for the wire
pub fn encode_line(line: &str) -> Result<Bytes, CodecError> {
    if line.contains('\n') || line.contains('\r') {
        return Err(CodecError::EmbeddedNewline(line.to_string()));
    }

    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Try to decode one frame from a buffer
///
/// Returns:
/// - `Ok(Some(frame))` if the buffer ends with a prompt or a challenge
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if too much data arrived without a prompt
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    decode_from(buf, None)
}

/// Like [`decode`], but once `base_prompt` is known only a prompt carrying
/// that hostname ends a response. Output lines that merely look like a
/// prompt (`... to core#`) keep the frame open.
pub fn decode_from(
    buf: &mut BytesMut,
    base_prompt: Option<&str>,
) -> Result<Option<Frame>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let tail_start = buf
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);

    let tail = match std::str::from_utf8(&buf[tail_start..]) {
        Ok(tail) => tail,
        // Partial multi-byte character, wait for the rest
        Err(_) => return check_size(buf),
    };

    if let Some(challenge) = Challenge::parse(tail) {
        let preamble = normalize(&buf[..tail_start]);
        buf.clear();
        return Ok(Some(Frame::Challenge {
            preamble,
            challenge,
        }));
    }

    if let Some(prompt) = Prompt::parse(tail)
        .filter(|prompt| base_prompt.map_or(true, |base| prompt.hostname == base))
    {
        let body = buf.split_to(tail_start);
        let output = normalize(&body);
        buf.advance(buf.len());
        return Ok(Some(Frame::Response { output, prompt }));
    }

    check_size(buf)
}

fn check_size(buf: &BytesMut) -> Result<Option<Frame>, CodecError> {
    if buf.len() > MAX_BUFFER_SIZE {
        return Err(CodecError::BufferOverflow(buf.len()));
    }
    Ok(None)
}

/// Decoder state for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial answer being accumulated
    buffer: BytesMut,
    /// Hostname of the device prompt, once seen
    base_prompt: Option<String>,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            base_prompt: None,
        }
    }

    /// Only accept prompts of `hostname` from now on
    pub fn set_base_prompt(&mut self, hostname: impl Into<String>) {
        self.base_prompt = Some(hostname.into());
    }

    /// Bytes received but not yet decoded
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    pub fn decode_next(&mut self) -> Result<Option<Frame>, CodecError> {
        decode_from(&mut self.buffer, self.base_prompt.as_deref())
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_split_across_chunks() {
        let mut decoder = FrameDecoder::new();

        decoder.extend(b"Cisco IOS Software, Version 15.2\r\nuptime is 3 wee");
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(b"ks\r\nsw1>");
        let frame = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have frame");

        match frame {
            Frame::Response { output, prompt } => {
                assert_eq!(output, "Cisco IOS Software, Version 15.2\nuptime is 3 weeks");
                assert_eq!(prompt.hostname, "sw1");
                assert_eq!(prompt.mode, CliMode::User);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_prompt_shaped_output_waits_for_base_prompt() {
        let mut decoder = FrameDecoder::new();
        decoder.set_base_prompt("mt3");

        decoder.extend(b"line one\r\n description to core#");
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(b"\r\nline three\r\nmt3>");
        let frame = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have frame");
        match frame {
            Frame::Response { output, prompt } => {
                assert_eq!(output, "line one\n description to core#\nline three");
                assert_eq!(prompt.hostname, "mt3");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_without_base_prompt_any_prompt_ends_frame() {
        let mut buf = BytesMut::from(&b"line one\r\nsomething to core#"[..]);
        assert!(decode(&mut buf).expect("decode error").is_some());
    }

    #[test]
    fn test_prompt_only_response() {
        let mut buf = BytesMut::from(&b"\r\nsw1#"[..]);
        let frame = decode(&mut buf).expect("decode error").expect("no frame");
        assert_eq!(
            frame,
            Frame::Response {
                output: String::new(),
                prompt: Prompt {
                    hostname: "sw1".into(),
                    mode: CliMode::Privileged,
                    context: None,
                },
            }
        );
    }

    #[test]
    fn test_challenge_with_preamble() {
        let mut buf = BytesMut::from(&b"% Login invalid\r\n\r\nUsername: "[..]);
        let frame = decode(&mut buf).expect("decode error").expect("no frame");
        assert_eq!(
            frame,
            Frame::Challenge {
                preamble: "% Login invalid".into(),
                challenge: Challenge::Username,
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_prompt_variants() {
        let config = Prompt::parse("core-sw1(config-if)#").expect("config prompt");
        assert_eq!(config.hostname, "core-sw1");
        assert_eq!(config.mode, CliMode::Config);
        assert_eq!(config.context.as_deref(), Some("config-if"));

        let junos = Prompt::parse("netops@mx1> ").expect("junos prompt");
        assert_eq!(junos.hostname, "netops@mx1");
        assert_eq!(junos.mode, CliMode::User);

        let routeros = Prompt::parse("[admin@MikroTik] >").expect("routeros prompt");
        assert_eq!(routeros.hostname, "[admin@MikroTik]");

        let vyos = Prompt::parse("vyos@vyos:~$").expect("vyos prompt");
        assert_eq!(vyos.mode, CliMode::User);
    }

    #[test]
    fn test_output_lines_are_not_prompts() {
        assert!(Prompt::parse("% Invalid input detected at '^' marker.").is_none());
        assert!(Prompt::parse("Building configuration...").is_none());
        assert!(Challenge::parse("Password: ").is_some());
        assert!(Challenge::parse("Password changed: yes").is_none());
    }

    #[test]
    fn test_render_prompt_parses_back() {
        for mode in [CliMode::User, CliMode::Privileged, CliMode::Config] {
            let prompt = Prompt::parse(&render_prompt("edge-7", mode)).expect("prompt");
            assert_eq!(prompt.mode, mode);
            assert_eq!(prompt.hostname, "edge-7");
        }
    }

    #[test]
    fn test_encode_line() {
        let encoded = encode_line("show version").expect("encode failed");
        assert_eq!(&encoded[..], b"show version\n");

        let err = encode_line("interface Gi0/1\nshutdown").unwrap_err();
        assert!(matches!(err, CodecError::EmbeddedNewline(_)));
    }

    #[test]
    fn test_buffer_overflow() {
        let mut buf = BytesMut::new();
        buf.put_bytes(b'x', MAX_BUFFER_SIZE + 1);

        let result = decode(&mut buf);
        assert!(matches!(result, Err(CodecError::BufferOverflow(_))));
    }
}
