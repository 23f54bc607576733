/// Response of the realtime session issuance endpoint.
///
/// Every field is optional on the wire; callers decide whether a response
/// without a usable secret is fatal.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EphemeralSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ClientSecret {
    #[serde(default)]
    value: Option<String>,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
}

impl EphemeralSession {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// The usable secret, if the response carried a non-empty one.
    pub fn client_secret_value(&self) -> Option<&str> {
        self.client_secret
            .as_ref()
            .and_then(|secret| secret.value.as_deref())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.client_secret.as_ref().and_then(|secret| secret.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_secret_from_provider_response() {
        let session: EphemeralSession = serde_json::from_str(
            r#"{"id":"sess_1","model":"gpt-4o-realtime-preview","client_secret":{"value":"ek_123","expires_at":1700000000}}"#,
        )
        .unwrap();
        assert_eq!(session.client_secret_value(), Some("ek_123"));
        assert_eq!(session.expires_at(), Some(1_700_000_000));
    }

    #[test]
    fn missing_or_blank_secret_is_none() {
        let missing: EphemeralSession = serde_json::from_str(r#"{"id":"sess_1"}"#).unwrap();
        assert_eq!(missing.client_secret_value(), None);

        let blank: EphemeralSession =
            serde_json::from_str(r#"{"client_secret":{"value":"  "}}"#).unwrap();
        assert_eq!(blank.client_secret_value(), None);
    }
}
