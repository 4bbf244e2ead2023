use crate::error::{Result, SpeechError};

/// CTC blank label, the last class.
pub const BLANK: i64 = 28;

/// Maps transcripts to label ids: `'` is 0, space is 1, `a`..=`z` are 2..=27.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTransform;

impl TextTransform {
    pub fn new() -> Self {
        Self
    }

    pub fn char_to_id(&self, c: char) -> Result<i64> {
        match c.to_ascii_lowercase() {
            '\'' => Ok(0),
            ' ' => Ok(1),
            c @ 'a'..='z' => Ok(c as i64 - 'a' as i64 + 2),
            _ => Err(SpeechError::UnknownChar(c)),
        }
    }

    pub fn id_to_char(&self, id: i64) -> Option<char> {
        match id {
            0 => Some('\''),
            1 => Some(' '),
            2..=27 => Some((b'a' + (id - 2) as u8) as char),
            _ => None,
        }
    }

    pub fn text_to_int(&self, text: &str) -> Result<Vec<i64>> {
        text.chars().map(|c| self.char_to_id(c)).collect()
    }

    /// Ids outside the vocabulary, including the blank, are dropped.
    pub fn int_to_text(&self, ids: &[i64]) -> String {
        ids.iter().filter_map(|&id| self.id_to_char(id)).collect()
    }
}
