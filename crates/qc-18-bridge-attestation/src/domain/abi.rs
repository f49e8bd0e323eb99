//! Solidity `abi.encode` for the handful of types the bridge hashes.
//!
//! Output must match what the external verifier contract recomputes, so the
//! head/tail layout follows the Solidity ABI specification exactly: static
//! values inline in the head, dynamic values as a 32-byte offset in the head
//! with their body appended to the tail.

use crate::domain::errors::{BridgeError, BridgeResult};
use shared_types::{Address, Hash, U256};

const WORD: usize = 32;

/// An ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `address`
    Address(Address),
    /// `uint256`
    Uint(U256),
    /// `bytes32`
    FixedBytes(Hash),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `string`
    String(String),
    /// `T[]`
    Array(Vec<Token>),
    /// `(T1, T2, ...)`
    Tuple(Vec<Token>),
}

impl Token {
    /// `uint256` from a `u64`.
    pub fn uint(value: u64) -> Self {
        Token::Uint(U256::from(value))
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::String(_) | Token::Array(_) => true,
            Token::Tuple(items) => items.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    /// Bytes this token occupies in a head.
    fn head_len(&self) -> usize {
        match self {
            Token::Tuple(items) if !self.is_dynamic() => items.iter().map(Token::head_len).sum(),
            _ => WORD,
        }
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// `abi.encode(tokens...)`.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    encode_sequence(tokens)
}

fn encode_sequence(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_len).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encode_dynamic(token));
        } else {
            encode_static(token, &mut head);
        }
    }

    head.extend(tail);
    head
}

fn encode_static(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Address(address) => {
            out.extend_from_slice(&[0u8; 12]);
            out.extend_from_slice(address);
        }
        Token::Uint(value) => {
            let mut word = [0u8; WORD];
            value.to_big_endian(&mut word);
            out.extend_from_slice(&word);
        }
        Token::FixedBytes(bytes) => out.extend_from_slice(bytes),
        Token::Tuple(items) => {
            for item in items {
                encode_static(item, out);
            }
        }
        // Dynamic tokens never reach here.
        Token::Bytes(_) | Token::String(_) | Token::Array(_) => {}
    }
}

fn encode_dynamic(token: &Token) -> Vec<u8> {
    match token {
        Token::Bytes(bytes) => encode_bytes_body(bytes),
        Token::String(text) => encode_bytes_body(text.as_bytes()),
        Token::Array(items) => {
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode_sequence(items));
            out
        }
        Token::Tuple(items) => encode_sequence(items),
        _ => {
            let mut out = Vec::with_capacity(WORD);
            encode_static(token, &mut out);
            out
        }
    }
}

fn encode_bytes_body(bytes: &[u8]) -> Vec<u8> {
    let padded_len = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded_len);
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded_len, 0);
    out
}

fn usize_word(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

// =============================================================================
// FIXED-WIDTH HELPERS
// =============================================================================

/// Copy `data` into the left of a zeroed `bytes32`.
pub fn right_padded_bytes32(field: &'static str, data: &[u8]) -> BridgeResult<Hash> {
    if data.len() > WORD {
        return Err(BridgeError::FieldTooLong {
            field,
            max: WORD,
            actual: data.len(),
        });
    }
    let mut out = [0u8; WORD];
    out[..data.len()].copy_from_slice(data);
    Ok(out)
}
