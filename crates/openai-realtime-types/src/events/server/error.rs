#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    code: Option<String>,
    message: String,
    param: Option<String>,
    event_id: Option<String>,
}

impl ErrorDetails {
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The client event that caused the error, if any.
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.error_type, code, self.message),
            None => write!(f, "{}: {}", self.error_type, self.message),
        }
    }
}
