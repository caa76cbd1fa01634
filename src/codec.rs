//! Envelope encodings.
//!
//! The bus only moves bytes. `Codec` turns envelopes into those bytes and
//! back. JSON is the default and matches the field layout other services on
//! the bus already speak; bitcode is a compact binary alternative for
//! deployments where every participant uses this crate.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    #[cfg(feature = "bitcode")]
    Bitcode,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            #[cfg(feature = "bitcode")]
            Codec::Bitcode => "bitcode",
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Json => {
                serde_json::to_vec(value).map_err(|e| CodecError::encode(self.name(), e.to_string()))
            }
            #[cfg(feature = "bitcode")]
            Codec::Bitcode => {
                bitcode::serialize(value).map_err(|e| CodecError::encode(self.name(), e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| CodecError::decode(self.name(), e.to_string())),
            #[cfg(feature = "bitcode")]
            Codec::Bitcode => bitcode::deserialize(bytes)
                .map_err(|e| CodecError::decode(self.name(), e.to_string())),
        }
    }
}
