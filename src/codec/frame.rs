// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Start-of-frame markers for the datafeed stream
//!
//! Each frame on the stream starts with four big-endian 16-bit words: three
//! fixed sync words and one type word.
//!
//! ```text
//! F3 88  C6 A2  DA DA  00 01   reading follows
//! F3 88  C6 A2  DA DA  00 02   archive record follows
//! F3 88  C6 A2  DA DA  00 03   archive request (u32 date/time follows)
//! ```
//!
//! Receivers resynchronize word by word with [`StartFrameMatcher`], giving
//! the first word [`FIRST_WORD_WAIT`] to arrive and every following word
//! [`NEXT_WORD_WAIT`].

use std::time::Duration;

use super::CodecError;

/// Length of a start-of-frame marker in bytes.
pub const START_FRAME_LENGTH: usize = 8;

/// Fixed sync words preceding the type word.
pub const SYNC_WORDS: [u16; 3] = [0xF388, 0xC6A2, 0xDADA];

/// Time allowed for the first marker word.
pub const FIRST_WORD_WAIT: Duration = Duration::from_millis(500);

/// Time allowed for each following marker word.
pub const NEXT_WORD_WAIT: Duration = Duration::from_millis(250);

/// Payload announced by a start-of-frame marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Reading,
    Archive,
    ArchiveRequest,
}

impl FrameType {
    pub fn code(self) -> u16 {
        match self {
            FrameType::Reading => 0x0001,
            FrameType::Archive => 0x0002,
            FrameType::ArchiveRequest => 0x0003,
        }
    }

    pub fn from_code(code: u16) -> Result<Self, CodecError> {
        match code {
            0x0001 => Ok(FrameType::Reading),
            0x0002 => Ok(FrameType::Archive),
            0x0003 => Ok(FrameType::ArchiveRequest),
            other => Err(CodecError::UnknownFrameType(other)),
        }
    }

    /// The 8-byte marker announcing this frame type.
    pub fn marker(self) -> [u8; START_FRAME_LENGTH] {
        let mut out = [0u8; START_FRAME_LENGTH];
        for (i, word) in SYNC_WORDS.iter().chain(std::iter::once(&self.code())).enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

/// Incremental start-of-frame matcher
///
/// Feed it one 16-bit word at a time. It returns `Ok(None)` while a sync
/// word matched, `Ok(Some(type))` once the type word is read and an error
/// as soon as a word does not match, after which it starts over.
#[derive(Debug, Default)]
pub struct StartFrameMatcher {
    index: usize,
}

impl StartFrameMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long the next word may take to arrive.
    pub fn next_wait(&self) -> Duration {
        if self.index == 0 {
            FIRST_WORD_WAIT
        } else {
            NEXT_WORD_WAIT
        }
    }

    pub fn push_word(&mut self, word: u16) -> Result<Option<FrameType>, CodecError> {
        let index = self.index;
        if index < SYNC_WORDS.len() {
            if word != SYNC_WORDS[index] {
                self.index = 0;
                return Err(CodecError::BadMarker { index, word });
            }
            self.index += 1;
            return Ok(None);
        }

        self.index = 0;
        FrameType::from_code(word).map(Some)
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// Classify a complete 8-byte marker.
pub fn classify_start_frame(bytes: &[u8; START_FRAME_LENGTH]) -> Result<FrameType, CodecError> {
    let mut matcher = StartFrameMatcher::new();
    for chunk in bytes.chunks_exact(2) {
        if let Some(frame_type) = matcher.push_word(u16::from_be_bytes([chunk[0], chunk[1]]))? {
            return Ok(frame_type);
        }
    }
    // Four words always reach the type word
    Err(CodecError::UnexpectedEnd {
        needed: START_FRAME_LENGTH,
        remaining: 0,
    })
}
