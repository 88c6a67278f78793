// =============================================================================
// Provider — LLM provider registration
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Openai,
    AzureOpenai,
    Deepseek,
    Anthropic,
    Gemini,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Openai => "openai",
            Self::AzureOpenai => "azure_openai",
            Self::Deepseek => "deepseek",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub api_url: String,
    pub api_key: String,
    pub provider_type: ProviderType,
}
