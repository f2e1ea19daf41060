//! Shared bincode encode/decode helpers for the three topics'
//! payloads (`ImmutableMember`, `Vec<ImmutableMember>`, `bool`).
//! Wire format is otherwise opaque to the core — any collaborator
//! providing matching encode/decode is compatible.

use serde::{de::DeserializeOwned, Serialize};

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).expect("wire payloads are always encodable")
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, String> {
    bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| e.to_string())
}
