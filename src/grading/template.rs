//! Validated command templates
//!
//! Commands are configured as shell strings containing brace-delimited
//! placeholders such as `{EVALUATE}` or `{SUBMISSIONS}`. A template is
//! checked against the set of tokens its command accepts when it is loaded,
//! so a typo is reported before any grading starts instead of reaching the
//! shell verbatim.

use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Z][A-Z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Placeholder occurrences as (byte range, token). `${NAME}` is shell
/// parameter expansion and is left alone.
fn occurrences(raw: &str) -> impl Iterator<Item = (std::ops::Range<usize>, &str)> {
    PLACEHOLDER.captures_iter(raw).filter_map(move |caps| {
        let whole = caps.get(0)?;
        let name = caps.get(1)?;
        if raw[..whole.start()].ends_with('$') {
            return None;
        }
        Some((whole.range(), name.as_str()))
    })
}

/// Template validation and rendering errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("command template is empty")]
    Empty,

    #[error("unknown placeholder {{{token}}} in command template (allowed: {allowed})")]
    UnknownPlaceholder { token: String, allowed: String },

    #[error("no value supplied for placeholder {{{0}}}")]
    MissingValue(String),
}

/// A shell command with validated placeholder tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
}

impl CommandTemplate {
    /// Parse a template, rejecting tokens outside `allowed`.
    pub fn parse(raw: &str, allowed: &[&str]) -> Result<Self, TemplateError> {
        if raw.trim().is_empty() {
            return Err(TemplateError::Empty);
        }

        for (_, token) in occurrences(raw) {
            if !allowed.contains(&token) {
                return Err(TemplateError::UnknownPlaceholder {
                    token: token.to_string(),
                    allowed: allowed.join(", "),
                });
            }
        }

        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// The template text as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder tokens used by this template, in order of appearance
    pub fn placeholders(&self) -> Vec<&str> {
        occurrences(&self.raw).map(|(_, token)| token).collect()
    }

    /// Substitute every placeholder with its value.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut rendered = String::with_capacity(self.raw.len());
        let mut last = 0;

        for (range, name) in occurrences(&self.raw) {
            let value = values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
                .ok_or_else(|| TemplateError::MissingValue(name.to_string()))?;

            rendered.push_str(&self.raw[last..range.start]);
            rendered.push_str(value);
            last = range.end;
        }

        rendered.push_str(&self.raw[last..]);
        Ok(rendered)
    }
}
