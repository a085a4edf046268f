use crate::error::{SourceError, SourceResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_OPTIONS_NAME: &str = "bindery.options.json";

/// Runtime options, usually persisted as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Short object-path binding form; capture group 1 is the path body
    #[serde(default = "default_object_pattern")]
    pub object_pattern: String,

    /// Code-block binding form; capture group 1 is the expression body
    #[serde(default = "default_code_block_pattern")]
    pub code_block_pattern: String,

    /// Row placeholder used inside face templates; capture group 1 is the column
    #[serde(default = "default_row_pattern")]
    pub row_pattern: String,

    /// Attribute that marks a command node and names its keyword
    #[serde(default = "default_command_attribute")]
    pub command_attribute: String,

    /// Tags recognized as markup that carry no command of their own
    #[serde(default = "default_passthrough_tags")]
    pub passthrough_tags: Vec<String>,

    /// Source namespaces that live in memory only; lookups never wait on them
    #[serde(default = "default_reserved_namespaces")]
    pub reserved_namespaces: Vec<String>,

    /// Free-form per-scope settings
    #[serde(default)]
    pub settings: HashMap<String, JsonValue>,
}

fn default_object_pattern() -> String {
    r"\[##(.*?)##\]".to_string()
}

fn default_code_block_pattern() -> String {
    r"\{##([\s\S]*?)##\}".to_string()
}

fn default_row_pattern() -> String {
    r"@([A-Za-z_][A-Za-z0-9_]*)".to_string()
}

fn default_command_attribute() -> String {
    "core".to_string()
}

fn default_passthrough_tags() -> Vec<String> {
    vec!["basis".to_string()]
}

fn default_reserved_namespaces() -> Vec<String> {
    vec!["cms".to_string()]
}

impl Default for Options {
    fn default() -> Self {
        Self {
            object_pattern: default_object_pattern(),
            code_block_pattern: default_code_block_pattern(),
            row_pattern: default_row_pattern(),
            command_attribute: default_command_attribute(),
            passthrough_tags: default_passthrough_tags(),
            reserved_namespaces: default_reserved_namespaces(),
            settings: HashMap::new(),
        }
    }
}

impl Options {
    /// Parse options from JSON text and validate them
    pub fn from_json(json: &str) -> SourceResult<Self> {
        let options: Options =
            serde_json::from_str(json).map_err(|e| SourceError::invalid_options(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Load `bindery.options.json` from a directory
    pub fn load_from_dir(dir: impl AsRef<Path>) -> SourceResult<Self> {
        Self::load(dir.as_ref().join(DEFAULT_OPTIONS_NAME))
    }

    pub fn validate(&self) -> SourceResult<()> {
        BindingPatterns::compile(self).map(|_| ())
    }

    pub fn is_reserved(&self, source_id: &str) -> bool {
        let namespace = source_id.split('.').next().unwrap_or_default();
        self.reserved_namespaces
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(namespace))
    }
}

/// Compiled binding patterns for one context
#[derive(Debug, Clone)]
pub struct BindingPatterns {
    pub object: Regex,
    pub code_block: Regex,
    pub row: Regex,
}

impl BindingPatterns {
    pub fn compile(options: &Options) -> SourceResult<Self> {
        Ok(Self {
            object: compile_pattern("objectPattern", &options.object_pattern)?,
            code_block: compile_pattern("codeBlockPattern", &options.code_block_pattern)?,
            row: compile_pattern("rowPattern", &options.row_pattern)?,
        })
    }

    /// True when the text contains an object-path or code-block binding
    pub fn is_binding(&self, text: &str) -> bool {
        self.object.is_match(text) || self.code_block.is_match(text)
    }
}

fn compile_pattern(name: &str, pattern: &str) -> SourceResult<Regex> {
    let regex = Regex::new(pattern)
        .map_err(|e| SourceError::invalid_options(format!("{} is not a valid pattern: {}", name, e)))?;
    if regex.captures_len() < 2 {
        return Err(SourceError::invalid_options(format!(
            "{} needs a capture group for the binding body",
            name
        )));
    }
    Ok(regex)
}
