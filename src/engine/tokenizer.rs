//! Vocabulary-driven tokenizer.
//!
//! Encoding is greedy longest-match over the vocabulary with byte-fallback
//! tokens (`<0xNN>`) for anything the vocabulary cannot spell. Decoding goes
//! through an incremental UTF-8 decoder so pieces that split a multi-byte
//! character are held until the character is complete.

use std::collections::HashMap;

use encoding_rs::{Decoder, UTF_8};
use thiserror::Error;

pub type TokenId = u32;

/// SentencePiece word-boundary marker.
const SPACE_MARKER: &str = "\u{2581}";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("Invalid token ID: {0}")]
    InvalidToken(TokenId),

    #[error("Character {0:?} has no token, byte fallback or unknown token")]
    Unrepresentable(char),

    #[error("Invalid vocabulary: {0}")]
    InvalidVocabulary(String),
}

/// Token categories as stored in `tokenizer.ggml.token_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl TokenKind {
    pub fn from_gguf(v: i64) -> Self {
        match v {
            2 => Self::Unknown,
            3 => Self::Control,
            4 => Self::UserDefined,
            5 => Self::Unused,
            6 => Self::Byte,
            _ => Self::Normal,
        }
    }
}

/// Raw vocabulary table as read from the model.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub tokens: Vec<String>,
    /// Empty means "infer": `<0xNN>` pieces are bytes, the rest normal.
    pub kinds: Vec<TokenKind>,
    pub bos: Option<TokenId>,
    pub eos: Option<TokenId>,
    pub unk: Option<TokenId>,
    /// Spaces are spelled with `▁` (SentencePiece/llama vocabularies).
    pub space_marker: bool,
}

/// A generated token and the text it completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: TokenId,
    /// Empty while a multi-byte character is still incomplete.
    pub text: String,
}

pub struct Tokenizer {
    /// Bytes each token decodes to.
    pieces: Vec<Vec<u8>>,
    lookup: HashMap<Vec<u8>, TokenId>,
    byte_tokens: [Option<TokenId>; 256],
    max_piece_len: usize,
    bos: Option<TokenId>,
    eos: Option<TokenId>,
    unk: Option<TokenId>,
    space_marker: bool,
}

impl Tokenizer {
    pub fn new(vocab: Vocabulary) -> Result<Self, TokenizerError> {
        let n = vocab.tokens.len();
        if n == 0 {
            return Err(TokenizerError::InvalidVocabulary("vocabulary is empty".into()));
        }
        if !vocab.kinds.is_empty() && vocab.kinds.len() != n {
            return Err(TokenizerError::InvalidVocabulary(format!(
                "{} token types for {} tokens",
                vocab.kinds.len(),
                n
            )));
        }
        for (label, id) in [("bos", vocab.bos), ("eos", vocab.eos), ("unk", vocab.unk)] {
            if let Some(id) = id {
                if id as usize >= n {
                    return Err(TokenizerError::InvalidVocabulary(format!(
                        "{label} id {id} outside vocabulary of {n}"
                    )));
                }
            }
        }

        let mut pieces = Vec::with_capacity(n);
        let mut lookup = HashMap::with_capacity(n);
        let mut byte_tokens = [None; 256];
        let mut max_piece_len = 0;

        for (id, text) in vocab.tokens.iter().enumerate() {
            let id = id as TokenId;
            let kind = match vocab.kinds.get(id as usize) {
                Some(k) => *k,
                None if parse_byte_token(text).is_some() => TokenKind::Byte,
                None => TokenKind::Normal,
            };
            let is_control = kind == TokenKind::Control
                || kind == TokenKind::Unused
                || Some(id) == vocab.bos
                || Some(id) == vocab.eos;

            let piece = if is_control {
                Vec::new()
            } else if kind == TokenKind::Byte {
                let b = parse_byte_token(text).ok_or_else(|| {
                    TokenizerError::InvalidVocabulary(format!("byte token {id} is {text:?}"))
                })?;
                byte_tokens[b as usize].get_or_insert(id);
                vec![b]
            } else {
                let spelled = if vocab.space_marker {
                    text.replace(SPACE_MARKER, " ")
                } else {
                    text.clone()
                };
                spelled.into_bytes()
            };

            if matches!(kind, TokenKind::Normal | TokenKind::UserDefined)
                && !is_control
                && !piece.is_empty()
            {
                max_piece_len = max_piece_len.max(piece.len());
                // First id wins for duplicate spellings.
                lookup.entry(piece.clone()).or_insert(id);
            }
            pieces.push(piece);
        }

        Ok(Self {
            pieces,
            lookup,
            byte_tokens,
            max_piece_len,
            bos: vocab.bos,
            eos: vocab.eos,
            unk: vocab.unk,
            space_marker: vocab.space_marker,
        })
    }

    /// Encode text. Deterministic; never drops input.
    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let mut ids = Vec::with_capacity(text.len() / 2 + 1);
        let mut i = 0;
        let bytes = text.as_bytes();

        while i < bytes.len() {
            let longest = self.max_piece_len.min(bytes.len() - i);
            if let Some((len, id)) = (1..=longest)
                .rev()
                .find_map(|len| self.lookup.get(&bytes[i..i + len]).map(|&id| (len, id)))
            {
                ids.push(id);
                i += len;
                continue;
            }

            // `i` is always on a char boundary: every matched piece is
            // valid UTF-8 and we only ever advance by whole pieces or chars.
            let ch = text[i..].chars().next().ok_or(TokenizerError::Unrepresentable('\0'))?;
            let width = ch.len_utf8();
            self.push_fallback(ch, &bytes[i..i + width], &mut ids)?;
            i += width;
        }

        Ok(ids)
    }

    fn push_fallback(
        &self,
        ch: char,
        bytes: &[u8],
        ids: &mut Vec<TokenId>,
    ) -> Result<(), TokenizerError> {
        let all_bytes: Option<Vec<TokenId>> =
            bytes.iter().map(|&b| self.byte_tokens[b as usize]).collect();
        match (all_bytes, self.unk) {
            (Some(byte_ids), _) => ids.extend(byte_ids),
            (None, Some(unk)) => ids.push(unk),
            (None, None) => return Err(TokenizerError::Unrepresentable(ch)),
        }
        Ok(())
    }

    /// Decode a complete sequence. Malformed byte sequences become U+FFFD.
    pub fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError> {
        let mut bytes = Vec::with_capacity(ids.len() * 4);
        for &id in ids {
            bytes.extend_from_slice(self.piece(id)?);
        }
        let (text, _had_errors) = UTF_8.decode_without_bom_handling(&bytes);
        Ok(text.into_owned())
    }

    /// Bytes a token decodes to (empty for control tokens).
    pub fn piece(&self, id: TokenId) -> Result<&[u8], TokenizerError> {
        self.pieces
            .get(id as usize)
            .map(Vec::as_slice)
            .ok_or(TokenizerError::InvalidToken(id))
    }

    /// Whether the vocabulary spells spaces as `▁`. Pieces are stored with
    /// spaces restored, so callers never see the marker.
    pub fn uses_space_marker(&self) -> bool {
        self.space_marker
    }

    pub fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    pub fn bos(&self) -> Option<TokenId> {
        self.bos
    }

    pub fn eos(&self) -> Option<TokenId> {
        self.eos
    }

    pub fn unk(&self) -> Option<TokenId> {
        self.unk
    }

    pub fn is_eos(&self, id: TokenId) -> bool {
        Some(id) == self.eos
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.pieces.len())
            .field("bos", &self.bos)
            .field("eos", &self.eos)
            .field("unk", &self.unk)
            .finish()
    }
}

fn parse_byte_token(text: &str) -> Option<u8> {
    let hex = text.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Incremental detokenizer for streaming output.
///
/// Bytes of an incomplete UTF-8 sequence stay inside the decoder until the
/// rest arrives; whatever is still pending when the decoder is dropped is
/// discarded.
pub struct StreamDecoder {
    decoder: Decoder,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self { decoder: UTF_8.new_decoder_without_bom_handling() }
    }

    /// Feed one token, returning the text it completes.
    pub fn push(&mut self, tokenizer: &Tokenizer, id: TokenId) -> Result<Token, TokenizerError> {
        let bytes = tokenizer.piece(id)?;
        let mut text = String::new();
        let room = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 16);
        text.reserve(room);
        let (_result, _read, _replaced) = self.decoder.decode_to_string(bytes, &mut text, false);
        Ok(Token { id, text })
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
