use std::fmt;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A secret string that can round-trip through configuration files.
///
/// [`secrecy::Secret`] deliberately refuses to serialize its content. Configuration structs
/// still need to be deserialized from files and environment variables, so this wrapper keeps
/// the value redacted in [`fmt::Debug`] output while allowing serde to read and write it.
pub struct SerializableSecretString(Secret<String>);

impl SerializableSecretString {
    pub fn new(value: String) -> Self {
        Self(Secret::new(value))
    }
}

impl ExposeSecret<String> for SerializableSecretString {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

impl Clone for SerializableSecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose_secret().clone())
    }
}

impl fmt::Debug for SerializableSecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SerializableSecretString {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.expose_secret())
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let secret = SerializableSecretString::from("hunter2");

        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn deserializes_from_plain_string() {
        let secret: SerializableSecretString = serde_json::from_str("\"s3cret\"").unwrap();

        assert_eq!(secret.expose_secret(), "s3cret");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"s3cret\"");
    }
}
