//! The wire protocol: newline-delimited, prefix-tagged UTF-8 text frames.
//!
//! Each frame is one line. A tag (`MSG:`, `RELAY:`, ...) identifies the
//! frame kind; the remainder of the line is its payload, with `|` as the
//! field separator for multi-field payloads. `decode_line` parses exactly
//! one already-isolated line; `LineDecoder` owns the per-link buffering
//! that turns a stream of arbitrary byte chunks into a sequence of lines.

use std::collections::VecDeque;

use thiserror::Error;

/// Maximum chunk size before base64 encoding (§4.6); frames carrying a
/// chunk payload are bounded by this, even though the codec itself has no
/// length limit.
pub const FILE_CHUNK_SIZE: usize = 16 * 1024;

/// A single parsed protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Msg(String),
    Relay {
        msg_id: String,
        from_addr: String,
        from_nick: String,
        to_addr: String,
        hop_count: String,
        content: String,
    },
    Peers(Vec<(String, String)>),
    Typing(bool),
    Nick(String),
    FileStart {
        filename: String,
        orig_size: String,
        comp_size: String,
        total_chunks: String,
        checksum: String,
    },
    FileChunk {
        index: String,
        data_b64: String,
    },
    FileEnd {
        checksum: String,
    },
    /// Any unrecognized line that isn't a long spaceless token — the
    /// legacy fallback from §4.1, surfaced as raw text.
    Raw(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("RELAY frame has fewer than 6 fields")]
    MalformedRelay,
    #[error("PEERS entry missing '@' separator")]
    MalformedPeers,
    #[error("FSTART frame has fewer than 5 fields")]
    MalformedFileStart,
    #[error("FCHUNK frame has fewer than 2 fields")]
    MalformedFileChunk,
    #[error("FEND frame has fewer than 2 fields")]
    MalformedFileEnd,
}

/// A token with no whitespace longer than this, with no recognized
/// prefix, is silently dropped rather than surfaced as raw text (§4.1).
const MAX_UNRECOGNIZED_TOKEN: usize = 500;

/// Parses one already-newline-stripped, whitespace-trimmed line into a
/// [`Frame`]. Returns `Ok(None)` for lines that should be silently
/// dropped (the long-spaceless-token case).
pub fn decode_line(line: &str) -> Result<Option<Frame>, FrameError> {
    if let Some(rest) = line.strip_prefix("MSG:") {
        return Ok(Some(Frame::Msg(rest.to_string())));
    }
    if let Some(rest) = line.strip_prefix("RELAY:") {
        let fields: Vec<&str> = rest.splitn(6, '|').collect();
        if fields.len() < 6 {
            return Err(FrameError::MalformedRelay);
        }
        return Ok(Some(Frame::Relay {
            msg_id: fields[0].to_string(),
            from_addr: fields[1].to_string(),
            from_nick: fields[2].to_string(),
            to_addr: fields[3].to_string(),
            hop_count: fields[4].to_string(),
            content: fields[5].to_string(),
        }));
    }
    if let Some(rest) = line.strip_prefix("PEERS:") {
        if rest.is_empty() {
            return Ok(Some(Frame::Peers(Vec::new())));
        }
        let mut entries = Vec::new();
        for entry in rest.split(',') {
            let mut parts = entry.splitn(2, '@');
            let nick = parts.next().ok_or(FrameError::MalformedPeers)?;
            let addr = parts.next().ok_or(FrameError::MalformedPeers)?;
            entries.push((nick.to_string(), addr.to_string()));
        }
        return Ok(Some(Frame::Peers(entries)));
    }
    if let Some(rest) = line.strip_prefix("TYPING:") {
        return Ok(Some(Frame::Typing(rest.trim() == "1")));
    }
    if let Some(rest) = line.strip_prefix("NICK:") {
        return Ok(Some(Frame::Nick(rest.to_string())));
    }
    if let Some(rest) = line.strip_prefix("FSTART:") {
        let fields: Vec<&str> = rest.splitn(5, '|').collect();
        if fields.len() < 5 {
            return Err(FrameError::MalformedFileStart);
        }
        return Ok(Some(Frame::FileStart {
            filename: fields[0].to_string(),
            orig_size: fields[1].to_string(),
            comp_size: fields[2].to_string(),
            total_chunks: fields[3].to_string(),
            checksum: fields[4].to_string(),
        }));
    }
    if let Some(rest) = line.strip_prefix("FCHUNK:") {
        let fields: Vec<&str> = rest.splitn(2, '|').collect();
        if fields.len() < 2 {
            return Err(FrameError::MalformedFileChunk);
        }
        return Ok(Some(Frame::FileChunk {
            index: fields[0].to_string(),
            data_b64: fields[1].to_string(),
        }));
    }
    if let Some(rest) = line.strip_prefix("FEND:") {
        let fields: Vec<&str> = rest.splitn(2, '|').collect();
        if fields.len() < 2 {
            return Err(FrameError::MalformedFileEnd);
        }
        return Ok(Some(Frame::FileEnd {
            checksum: fields[1].to_string(),
        }));
    }

    if !line.contains(' ') && line.len() > MAX_UNRECOGNIZED_TOKEN {
        return Ok(None);
    }
    Ok(Some(Frame::Raw(line.to_string())))
}

/// Per-link incomplete-read buffer (§4.1, §9 "owned exclusively by the
/// reader task for that link; no sharing required").
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a freshly-read chunk (already UTF-8 decoded) and returns
    /// every complete, non-empty, whitespace-trimmed line it produced.
    /// Any trailing partial line is retained for the next call.
    pub fn push(&mut self, chunk: &str) -> VecDeque<String> {
        self.partial.push_str(chunk);

        let mut lines = VecDeque::new();
        let Some(last_newline) = self.partial.rfind('\n') else {
            return lines;
        };

        let complete_region = self.partial[..=last_newline].to_string();
        let remainder = self.partial[last_newline + 1..].to_string();

        for raw_line in complete_region.split('\n') {
            let trimmed = raw_line.trim();
            if !trimmed.is_empty() {
                lines.push_back(trimmed.to_string());
            }
        }

        self.partial = remainder;
        lines
    }
}

/// Formats a frame back into its wire representation, including the
/// trailing `\n`.
pub fn encode(frame: &Frame) -> String {
    match frame {
        Frame::Msg(text) => format!("MSG:{text}\n"),
        Frame::Relay {
            msg_id,
            from_addr,
            from_nick,
            to_addr,
            hop_count,
            content,
        } => format!("RELAY:{msg_id}|{from_addr}|{from_nick}|{to_addr}|{hop_count}|{content}\n"),
        Frame::Peers(entries) => {
            let joined = entries
                .iter()
                .map(|(nick, addr)| format!("{nick}@{addr}"))
                .collect::<Vec<_>>()
                .join(",");
            format!("PEERS:{joined}\n")
        }
        Frame::Typing(on) => format!("TYPING:{}\n", if *on { 1 } else { 0 }),
        Frame::Nick(name) => format!("NICK:{name}\n"),
        Frame::FileStart {
            filename,
            orig_size,
            comp_size,
            total_chunks,
            checksum,
        } => format!("FSTART:{filename}|{orig_size}|{comp_size}|{total_chunks}|{checksum}\n"),
        Frame::FileChunk { index, data_b64 } => format!("FCHUNK:{index}|{data_b64}\n"),
        Frame::FileEnd { checksum } => format!("FEND:success|{checksum}\n"),
        Frame::Raw(text) => format!("{text}\n"),
    }
}
