use start_core::keys;
use toml::Value;

/// Merge two scope values with the two-level algebra.
///
/// - Collection keys (`agents`, `roles`, `contexts`, `tasks`): additive union
///   by item key; an item present in both is replaced by the overlay item in
///   its entirety, so an override never inherits stale fields.
/// - `settings`: a single record with field-level replacement.
/// - Anything else: overlay replaces base.
pub fn merge_scopes(base: Value, overlay: Value) -> Value {
    let (Value::Table(mut base_map), Value::Table(overlay_map)) = (base, overlay) else {
        unreachable!("scope values are always top-level tables");
    };

    for (key, overlay_val) in overlay_map {
        let merged = match base_map.remove(&key) {
            Some(base_val) if keys::COLLECTIONS.contains(&key.as_str()) => {
                merge_collection(base_val, overlay_val)
            }
            Some(base_val) if key == keys::SETTINGS => merge_record(base_val, overlay_val),
            _ => overlay_val,
        };
        base_map.insert(key, merged);
    }
    Value::Table(base_map)
}

/// Item-level replacement: union of keys, overlay item wins whole.
fn merge_collection(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (item_key, item) in overlay_map {
                base_map.insert(item_key, item);
            }
            Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Field-level replacement for the flat settings record.
fn merge_record(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (field, value) in overlay_map {
                base_map.insert(field, value);
            }
            Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(raw: &str) -> Value {
        raw.parse().unwrap()
    }

    #[test]
    fn collection_item_replaced_whole() {
        let global = table(
            r#"
            [agents.claude]
            command = "claude -p {{.prompt}}"
            bin = "claude"
            default_model = "sonnet"
        "#,
        );
        let local = table(
            r#"
            [agents.claude]
            command = "claude --verbose -p {{.prompt}}"

            [agents.gemini]
            command = "gemini -p {{.prompt}}"
        "#,
        );

        let merged = merge_scopes(global, local);
        let agents = merged.get("agents").unwrap().as_table().unwrap();

        // Both agents present.
        assert!(agents.contains_key("claude"));
        assert!(agents.contains_key("gemini"));

        // The local claude wins in its entirety: no stale bin/default_model.
        let claude = agents["claude"].as_table().unwrap();
        assert_eq!(
            claude["command"].as_str().unwrap(),
            "claude --verbose -p {{.prompt}}"
        );
        assert!(!claude.contains_key("bin"));
        assert!(!claude.contains_key("default_model"));
    }

    #[test]
    fn settings_fields_merge_individually() {
        let global = table(
            r#"
            [settings]
            default_agent = "claude"
            timeout = 60
        "#,
        );
        let local = table(
            r#"
            [settings]
            timeout = 10
            shell = "bash -c"
        "#,
        );

        let merged = merge_scopes(global, local);
        let settings = merged.get("settings").unwrap().as_table().unwrap();
        assert_eq!(settings["default_agent"].as_str().unwrap(), "claude");
        assert_eq!(settings["timeout"].as_integer().unwrap(), 10);
        assert_eq!(settings["shell"].as_str().unwrap(), "bash -c");
    }

    #[test]
    fn disjoint_top_level_keys_union_commutatively() {
        let a = table(
            r#"
            [roles.reviewer]
            prompt = "review"
        "#,
        );
        let b = table(
            r#"
            [contexts.env]
            command = "env"
        "#,
        );

        let ab = merge_scopes(a.clone(), b.clone());
        let ba = merge_scopes(b, a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn unrelated_collections_survive_merge() {
        let global = table(
            r#"
            [roles.reviewer]
            prompt = "review"
        "#,
        );
        let local = table(
            r#"
            [agents.gemini]
            command = "gemini"
        "#,
        );

        let merged = merge_scopes(global, local);
        assert!(merged.get("roles").is_some());
        assert!(merged.get("agents").is_some());
    }
}
