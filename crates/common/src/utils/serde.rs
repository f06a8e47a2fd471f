//! Serialization utilities for durations
//!
//! Configuration files express every duration as whole milliseconds, which
//! keeps TOML and JSON settings free of unit suffixes.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Whole milliseconds of `duration`, saturating at `u64::MAX`
#[must_use]
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Custom serialization module for Duration as milliseconds
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use bulwark_common::utils::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as milliseconds (u64)
    ///
    /// # Errors
    /// Returns the serializer's error unchanged.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration_to_millis(*duration))
    }

    /// Deserialize milliseconds (u64) into a Duration
    ///
    /// # Errors
    /// Returns an error if the value is not an unsigned integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Same as [`duration_millis`] for optional durations
///
/// Pair with `#[serde(default)]` so a missing key deserializes to `None`.
pub mod option_duration_millis {
    use super::*;

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize an optional Duration as milliseconds
    ///
    /// # Errors
    /// Returns the serializer's error unchanged.
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&duration_to_millis(*duration)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional milliseconds into an optional Duration
    ///
    /// # Errors
    /// Returns an error if the value is neither null nor an unsigned integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        #[serde(with = "duration_millis")]
        timeout: Duration,
        #[serde(default, with = "option_duration_millis")]
        acquire_timeout: Option<Duration>,
    }

    /// Tests that Duration serializes to milliseconds as u64
    #[test]
    fn test_duration_millis_serialize() {
        let data = TestStruct { timeout: Duration::from_millis(1500), acquire_timeout: None };

        let json = serde_json::to_string(&data).expect("Should serialize valid struct");
        assert_eq!(json, r#"{"timeout":1500,"acquire_timeout":null}"#);
    }

    /// Tests that a missing optional duration deserializes to `None`
    #[test]
    fn test_option_duration_millis_missing_key() {
        let data: TestStruct =
            serde_json::from_str(r#"{"timeout":2500}"#).expect("Should deserialize valid JSON");

        assert_eq!(data.timeout, Duration::from_millis(2500));
        assert_eq!(data.acquire_timeout, None);
    }

    #[test]
    fn test_duration_to_millis_saturates() {
        assert_eq!(duration_to_millis(Duration::from_millis(42)), 42);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_option_duration_millis_present() {
        let data: TestStruct = serde_json::from_str(r#"{"timeout":0,"acquire_timeout":750}"#)
            .expect("Should deserialize valid JSON");

        assert_eq!(data.timeout, Duration::ZERO);
        assert_eq!(data.acquire_timeout, Some(Duration::from_millis(750)));
    }

    /// Validates the duration millis deserialize invalid json scenario.
    ///
    /// Assertions:
    /// - Ensures `result.is_err()` evaluates to true.
    #[test]
    fn test_duration_millis_deserialize_invalid_json() {
        let invalid_json = r#"{"timeout":"not_a_number"}"#;
        let result: Result<TestStruct, _> = serde_json::from_str(invalid_json);
        assert!(result.is_err());
    }
}
