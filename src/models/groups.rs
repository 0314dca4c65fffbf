use serde::Serialize;

/// Canonical quota groups. Variant order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelGroup {
    ClaudeGpt,
    Gemini3Pro,
    Gemini25Flash,
    Gemini25FlashLite,
    Gemini25Cu,
    Gemini3Flash,
    Gemini3ProImage,
}

impl ModelGroup {
    pub fn label(self) -> &'static str {
        match self {
            ModelGroup::ClaudeGpt => "Claude/GPT",
            ModelGroup::Gemini3Pro => "Gemini 3 Pro",
            ModelGroup::Gemini25Flash => "Gemini 2.5 Flash",
            ModelGroup::Gemini25FlashLite => "Gemini 2.5 Flash Lite",
            ModelGroup::Gemini25Cu => "Gemini 2.5 CU",
            ModelGroup::Gemini3Flash => "Gemini 3 Flash",
            ModelGroup::Gemini3ProImage => "Gemini 3 Pro Image",
        }
    }
}

// Update when the gateway's model catalog changes.
pub const MODEL_GROUPS: &[(&str, ModelGroup)] = &[
    ("claude-sonnet-4-5-thinking", ModelGroup::ClaudeGpt),
    ("claude-opus-4-5-thinking", ModelGroup::ClaudeGpt),
    ("claude-sonnet-4-5", ModelGroup::ClaudeGpt),
    ("gpt-oss-120b-medium", ModelGroup::ClaudeGpt),
    ("gemini-3-pro-high", ModelGroup::Gemini3Pro),
    ("gemini-3-pro-low", ModelGroup::Gemini3Pro),
    ("gemini-3-pro-preview", ModelGroup::Gemini3Pro),
    ("gemini-2.5-flash", ModelGroup::Gemini25Flash),
    ("gemini-2.5-flash-thinking", ModelGroup::Gemini25Flash),
    ("gemini-2.5-flash-lite", ModelGroup::Gemini25FlashLite),
    ("rev19-uic3-1p", ModelGroup::Gemini25Cu),
    ("gemini-3-flash", ModelGroup::Gemini3Flash),
    ("gemini-3-flash-preview", ModelGroup::Gemini3Flash),
    ("gemini-3-pro-image", ModelGroup::Gemini3ProImage),
];

/// Maps a raw model identifier to its canonical group, `None` when unknown.
pub fn classify(model_id: &str) -> Option<ModelGroup> {
    MODEL_GROUPS
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, group)| *group)
}
