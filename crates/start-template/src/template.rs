use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use start_core::StartError;

/// `{{.name}}` with optional inner whitespace.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

/// The substitution dictionary. Only keys set by the caller are valid;
/// anything else in a template is an error, never silently dropped.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    map: BTreeMap<&'static str, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.map.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Substitute every `{{.name}}` in a single pass. Substituted values are
    /// never re-expanded, and environment variables are never consulted.
    pub fn render(&self, template: &str) -> Result<String, StartError> {
        let re = placeholder_re();
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in re.captures_iter(template) {
            let whole = caps.get(0).unwrap();
            let name = caps.get(1).unwrap().as_str();
            let value = self
                .map
                .get(name)
                .ok_or_else(|| StartError::UnknownPlaceholder(name.to_string()))?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

/// Does the template mention `{{.key}}`? Used to skip file reads and command
/// execution the body never asks for.
pub fn references(template: &str, key: &str) -> bool {
    placeholder_re()
        .captures_iter(template)
        .any(|caps| caps.get(1).map(|m| m.as_str()) == Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Placeholders {
        Placeholders::new()
            .set("file", "/work/.start/temp/role-assistant.md")
            .set("command_output", "total 4")
            .set("instructions", "be brief")
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = dict()
            .render("Read {{.file}} then: {{.command_output}} ({{ .instructions }})")
            .unwrap();
        assert_eq!(
            out,
            "Read /work/.start/temp/role-assistant.md then: total 4 (be brief)"
        );
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let err = dict().render("{{.fiel}}").unwrap_err();
        match err {
            StartError::UnknownPlaceholder(name) => assert_eq!(name, "fiel"),
            other => panic!("expected UnknownPlaceholder, got {other}"),
        }
    }

    #[test]
    fn environment_variables_are_not_expanded() {
        let out = dict().render("keep $HOME and ${PATH} literal").unwrap();
        assert_eq!(out, "keep $HOME and ${PATH} literal");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let dict = Placeholders::new().set("instructions", "{{.file}}");
        let out = dict.render("{{.instructions}}").unwrap();
        // The injected value stays literal; no second expansion pass.
        assert_eq!(out, "{{.file}}");
    }

    #[test]
    fn references_detects_exact_key() {
        assert!(references("run {{.command_output}}", "command_output"));
        assert!(!references("run {{.command_output}}", "command"));
        assert!(!references("no placeholders", "file"));
    }

    #[test]
    fn non_placeholder_braces_pass_through() {
        let out = dict().render("json: {\"a\": 1} and {{not one}}").unwrap();
        assert_eq!(out, "json: {\"a\": 1} and {{not one}}");
    }
}
