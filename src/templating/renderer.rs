//! Model rendering
//!
//! Renders the stencil's text template with `{$ … $}` variable delimiters.
//! The context exposes `providers`, `evaluations`, `lookups` and
//! `loop.item`; full control flow exists in the engine but templates only
//! need interpolation and attribute/index access in practice.

use std::collections::BTreeMap;

use minijinja::syntax::SyntaxConfig;
use minijinja::Environment;
use serde_json::{json, Value};

use crate::error::{ConfigError, GdbtError, Result};
use crate::infrastructure::ProviderRegistry;

const DELIMITER_LEFT: &str = "{$";
const DELIMITER_RIGHT: &str = "$}";

pub fn render(
    template: &str,
    providers: &ProviderRegistry,
    evaluations: &BTreeMap<String, Value>,
    lookups: &BTreeMap<String, Value>,
    loop_item: Option<&Value>,
) -> Result<String> {
    let syntax = SyntaxConfig::builder()
        .variable_delimiters(DELIMITER_LEFT, DELIMITER_RIGHT)
        .build()
        .map_err(|e| GdbtError::Config(ConfigError::FormatInvalid(e.to_string())))?;

    let mut env = Environment::new();
    env.set_syntax(syntax);

    let context = json!({
        "providers": providers,
        "evaluations": evaluations,
        "lookups": lookups,
        "loop": {"item": loop_item.cloned().unwrap_or(Value::Null)},
    });

    env.render_str(template, context)
        .map_err(|e| GdbtError::Config(ConfigError::FormatInvalid(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_simple(template: &str, loop_item: Option<&Value>) -> Result<String> {
        let mut lookups = BTreeMap::new();
        lookups.insert("team".to_string(), json!("sre"));
        let mut evaluations = BTreeMap::new();
        evaluations.insert("envs".to_string(), json!(["stg", "prd"]));
        render(
            template,
            &ProviderRegistry::new(),
            &evaluations,
            &lookups,
            loop_item,
        )
    }

    #[test]
    fn test_variable_interpolation() {
        let rendered = render_simple(r#"{"owner": "{$ lookups.team $}"}"#, None).unwrap();
        assert_eq!(rendered, r#"{"owner": "sre"}"#);
    }

    #[test]
    fn test_index_access() {
        let rendered = render_simple(r#"{$ evaluations.envs[1] $}"#, None).unwrap();
        assert_eq!(rendered, "prd");
    }

    #[test]
    fn test_loop_item() {
        let item = json!("stg");
        let rendered =
            render_simple(r#"{"title": "Web ({$ loop.item $})"}"#, Some(&item)).unwrap();
        assert_eq!(rendered, r#"{"title": "Web (stg)"}"#);
    }

    #[test]
    fn test_jinja_braces_outside_delimiters_are_literal() {
        // Plain JSON braces must survive rendering untouched
        let rendered = render_simple(r#"{"panels": [{"id": 1}]}"#, None).unwrap();
        assert_eq!(rendered, r#"{"panels": [{"id": 1}]}"#);
    }

    #[test]
    fn test_template_error_is_config_error() {
        let err = render_simple(r#"{$ lookups.team"#, None).unwrap_err();
        assert_eq!(err.code(), "ERR_CONFIG_FORMAT_INVALID");
    }
}
