// Encrypt Algorithms
//
// Reversible column encryptors. Ciphertext is always hex text so it can be
// stored in a character column and spliced into SQL as a string literal.

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::config::EncryptAlgorithmConfig;
use crate::merge::decorator::ColumnValueDecoder;

#[derive(Debug, Clone, PartialEq)]
pub enum EncryptAlgorithm {
    Hex,
    Xor { key: Vec<u8> },
}

impl EncryptAlgorithm {
    pub fn from_config(config: &EncryptAlgorithmConfig) -> Result<Self, crate::config::ConfigError> {
        match config {
            EncryptAlgorithmConfig::Hex => Ok(EncryptAlgorithm::Hex),
            EncryptAlgorithmConfig::Xor { key } if key.is_empty() => {
                Err(crate::config::ConfigError::invalid("xor encrypt key must not be empty"))
            }
            EncryptAlgorithmConfig::Xor { key } => Ok(EncryptAlgorithm::Xor { key: key.as_bytes().to_vec() }),
        }
    }

    /// NULL stays NULL; every other value is encrypted from its plain text
    pub fn encrypt(&self, plain: &DataValue) -> DataValue {
        if plain.is_null() {
            return DataValue::Null;
        }
        let bytes = plain.to_plain_text().into_bytes();
        DataValue::Text(hex::encode(self.apply(bytes)))
    }

    pub fn decrypt(&self, cipher: &DataValue) -> ShardingResult<DataValue> {
        let text = match cipher {
            DataValue::Null => return Ok(DataValue::Null),
            DataValue::Text(text) => text,
            other => {
                return Err(ShardingError::TypeError(format!(
                    "cipher value must be text, got {}",
                    other.type_name()
                )));
            }
        };
        let bytes = hex::decode(text)
            .map_err(|e| ShardingError::TypeError(format!("cipher value '{}' is not hex: {}", text, e)))?;
        String::from_utf8(self.apply(bytes))
            .map(DataValue::Text)
            .map_err(|_| ShardingError::TypeError("decrypted value is not valid UTF-8".to_string()))
    }

    fn apply(&self, bytes: Vec<u8>) -> Vec<u8> {
        match self {
            EncryptAlgorithm::Hex => bytes,
            EncryptAlgorithm::Xor { key } => bytes
                .into_iter()
                .zip(key.iter().cycle())
                .map(|(b, k)| b ^ k)
                .collect(),
        }
    }
}

impl ColumnValueDecoder for EncryptAlgorithm {
    fn decode(&self, value: DataValue) -> ShardingResult<DataValue> {
        self.decrypt(&value)
    }
}
