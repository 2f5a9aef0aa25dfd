use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, de};
use thiserror::Error;

/// The name of a dataset, one database being backed up.
///
/// Only `[a-zA-Z0-9_\-]` is accepted so the name is safe as a directory name on every backend
/// and inside a cloud storage query literal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetName(String);

impl DatasetName {
    /// The longest name accepted.
    pub const MAX_LENGTH: usize = 64;

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for DatasetName {
    type Error = DatasetNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(Self::Error::Empty);
        }

        if value.len() > Self::MAX_LENGTH {
            return Err(Self::Error::TooLong(value.len(), Self::MAX_LENGTH));
        }

        // All characters must be valid
        if let Some((index, character)) = value
            .char_indices()
            .find(|(_, character)| {
                !(character.is_ascii_alphanumeric() || matches!(character, '_' | '-'))
            })
        {
            return Err(Self::Error::Invalid(index, character));
        }

        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for DatasetName {
    type Error = DatasetNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl FromStr for DatasetName {
    type Err = DatasetNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl AsRef<str> for DatasetName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatasetName").field(&self.0).finish()
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DatasetName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string: String = Deserialize::deserialize(deserializer)?;
        Self::try_from(string).map_err(de::Error::custom)
    }
}

impl Serialize for DatasetName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetNameError {
    /// `length, limit`
    #[error("Dataset name was too long {0} > {1}")]
    TooLong(usize, usize),

    #[error("Dataset name was empty")]
    Empty,

    /// `index, char`
    #[error("Invalid character at index {0}: '{1}', may only contain [a-zA-Z0-9_\\-]")]
    Invalid(usize, char),
}
