//! Board self-description.
//!
//! `/_info.lua` prints a JSON-like table dump. Lua's serializer leaves a
//! trailing comma before closing brackets, which is stripped before parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Console command printing the board description.
pub const INFO_COMMAND: &str = "dofile(\"/_info.lua\")";

/// Structured subset of what the board reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Firmware build identifier. Builds compare lexicographically.
    #[serde(default, alias = "Build")]
    pub build: String,

    /// Everything else the board reported.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BoardInfo {
    /// Parse an already normalized description.
    pub fn parse(normalized: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(normalized)
    }

    /// Whether `latest` is a newer build than this board runs.
    pub fn is_outdated(&self, latest: &str) -> bool {
        self.build.as_str() < latest
    }
}

/// Strip the trailing commas Lua leaves before `}` and `]`.
pub fn normalize(raw: &str) -> String {
    raw.replace(",}", "}").replace(",]", "]")
}
