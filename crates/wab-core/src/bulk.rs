//! Numbered-message files (`cleaned_messages.txt`).
//!
//! The file is a sequence of blocks, each starting with a `[N]` marker line:
//!
//! ```text
//! [1] first message
//! continues here
//!
//! [2] second message
//! ```
//!
//! [`NumberedBlocks`] reads it lazily (async) for relaying; [`extract_messages`] produces it
//! from a raw exported chat log.

use std::{
    fs,
    io::{self, BufRead, BufWriter, Write},
    path::Path,
    sync::OnceLock,
};

use regex::Regex;
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
};

/// Longest block written by [`extract_messages`]; longer messages are split on lines.
pub const MAX_BLOCK_LEN: usize = 19_000;

fn block_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[\d+\]").expect("valid regex"))
}

fn export_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{1,2}/\d{1,2}/\d{2,4}, \d{1,2}:\d{2} - (.*?): (.*)").expect("valid regex")
    })
}

/// Accumulates lines and cuts a block at every marker line.
#[derive(Default)]
struct BlockSplitter {
    pending: String,
}

impl BlockSplitter {
    /// Feed one line; returns the previous block when `line` starts a new one.
    fn push(&mut self, line: &str) -> Option<String> {
        let flushed = if block_start_re().is_match(line) {
            self.take()
        } else {
            None
        };
        self.pending.push_str(line);
        self.pending.push('\n');
        flushed
    }

    fn take(&mut self) -> Option<String> {
        let block = self.pending.trim().to_string();
        self.pending.clear();
        (!block.is_empty()).then_some(block)
    }
}

/// Lazy async reader over trimmed blocks of a numbered-message file.
///
/// Text before the first marker forms a block of its own. Blank blocks are skipped.
/// Not resumable: to replay, open the file again.
pub struct NumberedBlocks<R> {
    lines: Lines<R>,
    splitter: BlockSplitter,
    done: bool,
}

impl NumberedBlocks<BufReader<File>> {
    pub async fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path).await?)))
    }
}

impl<R: AsyncBufRead + Unpin> NumberedBlocks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            splitter: BlockSplitter::default(),
            done: false,
        }
    }

    /// Next block, or `None` once the input is exhausted (and on every call after).
    pub async fn next_block(&mut self) -> io::Result<Option<String>> {
        if self.done {
            return Ok(None);
        }

        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(block) = self.splitter.push(&line) {
                        return Ok(Some(block));
                    }
                }
                Ok(None) => {
                    self.done = true;
                    return Ok(self.splitter.take());
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
    }
}

/// Convert an exported chat log into a numbered-message file.
///
/// Lines shaped like `d/m/yy, h:mm - Author: text` start a message; other lines
/// continue the current one. Lines before the first message header are dropped.
/// Double quotes become single quotes so blocks survive the quoted-argument
/// syntax of the broadcast commands. Returns the number of blocks written.
pub fn extract_messages(input: &Path, output: &Path) -> io::Result<usize> {
    let reader = io::BufReader::new(fs::File::open(input)?);
    let mut writer = BufWriter::new(fs::File::create(output)?);
    let count = extract_into(reader, &mut writer)?;
    writer.flush()?;
    Ok(count)
}

fn extract_into(reader: impl BufRead, out: &mut impl Write) -> io::Result<usize> {
    let mut counter = 0usize;
    let mut current: Vec<String> = Vec::new();
    let mut started = false;

    for line in reader.lines() {
        let line = line?;
        if let Some(caps) = export_line_re().captures(&line) {
            if started && !current.is_empty() {
                counter = write_message(out, &current.join("\n"), counter)?;
                current.clear();
            }
            started = true;
            current.push(caps[2].replace('"', "'"));
        } else if started {
            current.push(line.replace('"', "'"));
        }
    }

    if started && !current.is_empty() {
        counter = write_message(out, &current.join("\n"), counter)?;
    }
    Ok(counter)
}

fn write_message(out: &mut impl Write, message: &str, mut counter: usize) -> io::Result<usize> {
    for part in split_long_message(message, MAX_BLOCK_LEN) {
        counter += 1;
        writeln!(out, "[{counter}] {part}\n")?;
    }
    Ok(counter)
}

/// Split on newline boundaries so that each chunk stays within `limit` bytes
/// (a single line longer than `limit` is kept whole).
pub fn split_long_message(message: &str, limit: usize) -> Vec<String> {
    if message.len() <= limit {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut chunk = String::new();
    for line in message.split('\n') {
        if !chunk.is_empty() && chunk.len() + line.len() + 1 > limit {
            parts.push(chunk.trim_end().to_string());
            chunk.clear();
        }
        chunk.push_str(line);
        chunk.push('\n');
    }
    if !chunk.trim().is_empty() {
        parts.push(chunk.trim_end().to_string());
    }
    parts
}
