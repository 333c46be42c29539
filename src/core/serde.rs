use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes Duration as seconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes Duration from seconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid duration: {}", secs)));
    }
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[derive(Serialize, Deserialize)]
    struct Timing {
        #[serde(serialize_with = "serialize_duration")]
        #[serde(deserialize_with = "deserialize_duration")]
        cooldown: Duration,
    }

    #[test]
    fn test_duration_serialization() {
        let original = Timing {
            cooldown: Duration::from_millis(1500),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"cooldown":1.5}"#);

        let deserialized: Timing = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.cooldown, original.cooldown);
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(serde_json::from_str::<Timing>(r#"{"cooldown":-2.0}"#).is_err());
    }

    #[test]
    fn test_overflowing_duration_rejected() {
        assert!(serde_json::from_str::<Timing>(r#"{"cooldown":1e300}"#).is_err());
    }
}
