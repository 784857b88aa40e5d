use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /stream/:channel`.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishParams {
    pub event: String,
    /// Any JSON value. Omitted data is published as `null`.
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_data_defaults_to_null() {
        let params: PublishParams = serde_json::from_value(json!({"event": "ping"})).unwrap();

        assert_eq!(params.event, "ping");
        assert_eq!(params.data, Value::Null);
    }

    #[test]
    fn test_missing_event_is_rejected() {
        assert!(serde_json::from_value::<PublishParams>(json!({"data": 1})).is_err());
    }
}
