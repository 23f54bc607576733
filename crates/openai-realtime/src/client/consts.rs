pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

pub const BASE_URL: &str = "wss://api.openai.com/v1";
pub const REST_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2025-06-03";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const OPENAI_BETA_HEADER: &str = "OpenAI-Beta";

