//! Constructed inventory features: `compose`, `groups` and `keyed_groups`.
//!
//! Expressions are parsed once when the source is loaded and evaluated per
//! host. With `strict` every evaluation error aborts the run; otherwise the
//! offending entry is skipped for that host.

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::model::Inventory;
use crate::models::{KeyedGroupConfig, SourceConfig};
use crate::template::eval::type_name;
use crate::template::{Expression, Template, TemplateError, display, is_truthy};
use serde_json::Value;
use tracing::{debug, warn};

/// Group names may only hold word characters and must not start with a digit.
fn is_invalid_group_char(index: usize, c: char) -> bool {
    !(c.is_alphanumeric() || c == '_') || (index == 0 && c.is_numeric())
}

fn has_invalid_group_chars(name: &str) -> bool {
    name.chars()
        .enumerate()
        .any(|(i, c)| is_invalid_group_char(i, c))
}

/// Replace every character that is invalid in a group name with `_`.
pub fn to_safe_group_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| if is_invalid_group_char(i, c) { '_' } else { c })
        .collect()
}

/// An expression entry with its name and source text.
#[derive(Debug, Clone)]
struct CompiledEntry {
    name: String,
    source: String,
    expr: Result<Expression, TemplateError>,
}

impl CompiledEntry {
    fn new(name: String, source: String) -> Self {
        let expr = Expression::parse(&source);
        Self { name, source, expr }
    }

    fn evaluate(&self, vars: &serde_json::Map<String, Value>) -> Result<Value, TemplateError> {
        match &self.expr {
            Ok(expr) => expr.evaluate(vars),
            Err(e) => Err(e.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledKeyedGroup {
    config: KeyedGroupConfig,
    key: Result<Expression, TemplateError>,
    parent: Option<Result<Template, TemplateError>>,
}

/// Compiled constructed options of one inventory source.
#[derive(Debug, Clone)]
pub struct Constructed {
    strict: bool,
    leading_separator: bool,
    sanitize_group_names: bool,
    compose: Vec<CompiledEntry>,
    groups: Vec<CompiledEntry>,
    keyed_groups: Vec<CompiledKeyedGroup>,
}

impl Constructed {
    pub fn from_source(source: &SourceConfig) -> InventoryResult<Self> {
        let compose = source
            .compose_entries()?
            .into_iter()
            .map(|(name, expr)| CompiledEntry::new(name, expr))
            .collect();
        let groups = source
            .group_entries()?
            .into_iter()
            .map(|(name, expr)| CompiledEntry::new(name, expr))
            .collect();
        let keyed_groups = source
            .keyed_groups
            .iter()
            .map(|config| CompiledKeyedGroup {
                key: Expression::parse(&config.key),
                parent: config
                    .parent_group
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(Template::parse),
                config: config.clone(),
            })
            .collect();

        let constructed = Self {
            strict: source.strict,
            leading_separator: source.leading_separator,
            sanitize_group_names: source.sanitize_group_names,
            compose,
            groups,
            keyed_groups,
        };
        constructed.check_syntax()?;
        Ok(constructed)
    }

    /// In strict mode a syntax error fails at load time instead of per host.
    fn check_syntax(&self) -> InventoryResult<()> {
        if !self.strict {
            return Ok(());
        }
        for entry in self.compose.iter().chain(&self.groups) {
            if let Err(e) = &entry.expr {
                return Err(InventoryError::expression(
                    format!("Invalid expression for '{}'", entry.name),
                    entry.source.clone(),
                    e.clone(),
                ));
            }
        }
        for keyed in &self.keyed_groups {
            if let Err(e) = &keyed.key {
                return Err(InventoryError::expression(
                    "Invalid keyed group key",
                    keyed.config.key.clone(),
                    e.clone(),
                ));
            }
            if let Some(Err(e)) = &keyed.parent {
                return Err(InventoryError::expression(
                    "Invalid parent_group template",
                    keyed.config.parent_group.clone().unwrap_or_default(),
                    e.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Apply compose, then groups, then keyed_groups to `host`.
    pub fn apply(&self, inventory: &mut Inventory, host: &str) -> InventoryResult<()> {
        self.set_composite_vars(inventory, host)?;
        self.add_host_to_composed_groups(inventory, host)?;
        self.add_host_to_keyed_groups(inventory, host)?;
        Ok(())
    }

    /// Non-strict runs skip the failed entry for this host.
    fn fail_or_skip(&self, host: &str, err: InventoryError) -> InventoryResult<()> {
        if self.strict {
            return Err(err);
        }
        debug!(host, error = %err, "Skipping constructed entry");
        Ok(())
    }

    fn current_vars(inventory: &Inventory, host: &str) -> serde_json::Map<String, Value> {
        inventory.host_vars(host).cloned().unwrap_or_default()
    }

    /// All compose expressions see the variables as they were before any of
    /// them was applied.
    fn set_composite_vars(&self, inventory: &mut Inventory, host: &str) -> InventoryResult<()> {
        if self.compose.is_empty() {
            return Ok(());
        }
        let vars = Self::current_vars(inventory, host);
        for entry in &self.compose {
            match entry.evaluate(&vars) {
                Ok(value) => {
                    debug!(host, var = %entry.name, "Composed variable");
                    inventory.set_variable(host, &entry.name, value)?;
                }
                Err(e) => self.fail_or_skip(
                    host,
                    InventoryError::expression(
                        format!("Could not set {} for host {}", entry.name, host),
                        entry.source.clone(),
                        e,
                    ),
                )?,
            }
        }
        Ok(())
    }

    fn add_host_to_composed_groups(
        &self,
        inventory: &mut Inventory,
        host: &str,
    ) -> InventoryResult<()> {
        if self.groups.is_empty() {
            return Ok(());
        }
        let vars = Self::current_vars(inventory, host);
        for entry in &self.groups {
            let group = self.sanitize_group_name(&entry.name);
            match entry.evaluate(&vars) {
                Ok(value) if is_truthy(&value) => {
                    inventory.add_host_to_group(&group, host)?;
                }
                Ok(_) => {}
                Err(e) => self.fail_or_skip(
                    host,
                    InventoryError::expression(
                        format!("Could not add host {} to group {}", host, group),
                        entry.source.clone(),
                        e,
                    ),
                )?,
            }
        }
        Ok(())
    }

    fn add_host_to_keyed_groups(&self, inventory: &mut Inventory, host: &str) -> InventoryResult<()> {
        if self.keyed_groups.is_empty() {
            return Ok(());
        }
        let vars = Self::current_vars(inventory, host);

        for keyed in &self.keyed_groups {
            let config = &keyed.config;
            let context = || {
                format!(
                    "Could not generate group for host {} from {} entry",
                    host, config.key
                )
            };

            let key = match &keyed.key {
                Ok(expr) => expr.evaluate(&vars),
                Err(e) => Err(e.clone()),
            };
            let key = match key {
                Ok(key) => key,
                Err(e) => {
                    self.fail_or_skip(
                        host,
                        InventoryError::expression(context(), config.key.clone(), e),
                    )?;
                    continue;
                }
            };

            let empty_with_default = key == Value::String(String::new())
                && config.default_value.is_some();
            if !is_truthy(&key) && !empty_with_default {
                // Empty lists and mappings are valid: they just yield no group.
                let empty_container = matches!(&key, Value::Array(a) if a.is_empty())
                    || matches!(&key, Value::Object(o) if o.is_empty());
                if self.strict && !empty_container {
                    return Err(InventoryError::keyed_group(format!(
                        "No key or key resulted empty for {} in host {}, invalid entry",
                        config.key, host
                    )));
                }
                continue;
            }

            let parent = match &keyed.parent {
                None => None,
                Some(Ok(template)) => match template.render(&vars) {
                    Ok(name) => Some(name).filter(|n| !n.is_empty()),
                    Err(e) => {
                        self.fail_or_skip(
                            host,
                            InventoryError::expression(
                                format!("Could not generate parent group for host {}", host),
                                config.parent_group.clone().unwrap_or_default(),
                                e,
                            ),
                        )?;
                        continue;
                    }
                },
                Some(Err(e)) => {
                    self.fail_or_skip(
                        host,
                        InventoryError::expression(
                            format!("Could not generate parent group for host {}", host),
                            config.parent_group.clone().unwrap_or_default(),
                            e.clone(),
                        ),
                    )?;
                    continue;
                }
            };

            let separator = if config.prefix.is_empty() && !self.leading_separator {
                ""
            } else {
                config.separator.as_str()
            };

            for bare_name in keyed_group_names(&key, config)? {
                let group = self.sanitize_group_name(&format!(
                    "{}{}{}",
                    config.prefix, separator, bare_name
                ));
                inventory.add_host_to_group(&group, host)?;

                if let Some(parent) = &parent {
                    let parent = self.sanitize_group_name(parent);
                    inventory.add_child(&parent, &group)?;
                }
            }
        }
        Ok(())
    }

    fn sanitize_group_name(&self, name: &str) -> String {
        if !has_invalid_group_chars(name) {
            return name.to_string();
        }
        if self.sanitize_group_names {
            let safe = to_safe_group_name(name);
            debug!(group = name, replaced = %safe, "Replaced invalid characters in group name");
            safe
        } else {
            warn!(
                group = name,
                "Invalid characters were found in group name but not replaced (set sanitize_group_names)"
            );
            name.to_string()
        }
    }
}

/// Group names (before prefix and separator) generated by one key value.
fn keyed_group_names(key: &Value, config: &KeyedGroupConfig) -> InventoryResult<Vec<String>> {
    let sep = config.separator.as_str();
    let default = config.default_value.as_deref();

    let names = match key {
        Value::String(s) => vec![match (s.is_empty(), default) {
            (true, Some(d)) => d.to_string(),
            _ => s.clone(),
        }],
        Value::Array(items) => items
            .iter()
            .map(|item| match (item, default) {
                (Value::String(s), Some(d)) if s.is_empty() => d.to_string(),
                _ => display(item),
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| {
                let empty = matches!(value, Value::String(s) if s.is_empty());
                match (empty, default, config.trailing_separator) {
                    (true, Some(d), _) => format!("{}{}{}", name, sep, d),
                    (true, None, Some(false)) => name.clone(),
                    _ => format!("{}{}{}", name, sep, display(value)),
                }
            })
            .collect(),
        other => {
            return Err(InventoryError::keyed_group(format!(
                "Invalid group name format, expected a string or a list of them or dictionary, got: {}",
                type_name(other)
            )));
        }
    };
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyed(yaml: &str) -> KeyedGroupConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn setup(source_yaml: &str, vars: Value) -> (Constructed, Inventory) {
        let source = SourceConfig::from_yaml(&format!("plugin: inventory\n{}", source_yaml)).unwrap();
        let constructed = Constructed::from_source(&source).unwrap();
        let mut inventory = Inventory::new();
        inventory.add_host("web01");
        if let Value::Object(map) = vars {
            for (k, v) in map {
                inventory.set_variable("web01", &k, v).unwrap();
            }
        }
        (constructed, inventory)
    }

    #[test]
    fn test_safe_group_name() {
        assert_eq!(to_safe_group_name("app-web.01"), "app_web_01");
        assert_eq!(to_safe_group_name("1st"), "_st");
        assert_eq!(to_safe_group_name("ok_name"), "ok_name");
    }

    #[test]
    fn test_keyed_names_for_string_list_and_mapping() {
        let config = keyed("key: x\n");
        assert_eq!(keyed_group_names(&json!("web"), &config).unwrap(), vec!["web"]);
        assert_eq!(keyed_group_names(&json!(["a", 1]), &config).unwrap(), vec!["a", "1"]);
        assert_eq!(
            keyed_group_names(&json!({"env": "prod", "tier": "web"}), &config).unwrap(),
            vec!["env_prod", "tier_web"]
        );
    }

    #[test]
    fn test_keyed_names_default_value() {
        let config = keyed("key: x\ndefault_value: unknown\n");
        assert_eq!(keyed_group_names(&json!(""), &config).unwrap(), vec!["unknown"]);
        assert_eq!(keyed_group_names(&json!(["", "b"]), &config).unwrap(), vec!["unknown", "b"]);
        assert_eq!(
            keyed_group_names(&json!({"os": ""}), &config).unwrap(),
            vec!["os_unknown"]
        );
    }

    #[test]
    fn test_keyed_names_trailing_separator() {
        let keep = keyed("key: x\n");
        let drop = keyed("key: x\ntrailing_separator: false\n");
        assert_eq!(keyed_group_names(&json!({"os": ""}), &keep).unwrap(), vec!["os_"]);
        assert_eq!(keyed_group_names(&json!({"os": ""}), &drop).unwrap(), vec!["os"]);
    }

    #[test]
    fn test_keyed_names_scalar_is_rejected() {
        let config = keyed("key: x\n");
        let err = keyed_group_names(&json!(42), &config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid keyed group: Invalid group name format, expected a string or a list of them or dictionary, got: int"
        );
        assert!(keyed_group_names(&json!(true), &config).is_err());
    }

    #[test]
    fn test_scalar_key_fails_even_when_not_strict() {
        let (c, mut inv) = setup("keyed_groups:\n  - key: rack\n", json!({"rack": 7}));
        assert!(matches!(
            c.apply(&mut inv, "web01"),
            Err(InventoryError::KeyedGroup { .. })
        ));
    }

    #[test]
    fn test_compose_sets_variables() {
        let (c, mut inv) = setup(
            "compose:\n  ansible_host: ip\n  short: hostname | upper\n",
            json!({"ip": "10.0.0.5", "hostname": "web01"}),
        );
        c.apply(&mut inv, "web01").unwrap();
        let vars = inv.host_vars("web01").unwrap();
        assert_eq!(vars["ansible_host"], json!("10.0.0.5"));
        assert_eq!(vars["short"], json!("WEB01"));
    }

    #[test]
    fn test_composed_vars_visible_to_groups() {
        let (c, mut inv) = setup(
            "compose:\n  tier: \"'frontend' if role == 'web' else 'backend'\"\ngroups:\n  frontend: tier == 'frontend'\n",
            json!({"role": "web"}),
        );
        c.apply(&mut inv, "web01").unwrap();
        assert_eq!(inv.group("frontend").unwrap().hosts, vec!["web01".to_string()]);
    }

    #[test]
    fn test_groups_conditionals() {
        let (c, mut inv) = setup(
            "groups:\n  prod: env == 'PROD'\n  dev: env == 'DEV'\n",
            json!({"env": "PROD"}),
        );
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("prod").is_some());
        assert!(inv.group("dev").is_none());
    }

    #[test]
    fn test_undefined_variable_skipped_when_not_strict() {
        let (c, mut inv) = setup(
            "compose:\n  ansible_host: missing_var\ngroups:\n  g: missing_var == 1\n",
            json!({}),
        );
        c.apply(&mut inv, "web01").unwrap();
        assert!(!inv.host_vars("web01").unwrap().contains_key("ansible_host"));
        assert!(inv.group("g").is_none());
    }

    #[test]
    fn test_oversized_repeat_skipped_when_not_strict() {
        let (c, mut inv) = setup(
            "compose:\n  pad: \"'ab' * 9000000000000000000\"\n  short: \"'ab' * 2\"\n",
            json!({}),
        );
        c.apply(&mut inv, "web01").unwrap();
        let vars = inv.host_vars("web01").unwrap();
        assert!(!vars.contains_key("pad"));
        assert_eq!(vars["short"], json!("abab"));
    }

    #[test]
    fn test_undefined_variable_fatal_when_strict() {
        let (c, mut inv) = setup("strict: true\ncompose:\n  ansible_host: missing_var\n", json!({}));
        let err = c.apply(&mut inv, "web01").unwrap_err();
        assert!(err.to_string().contains("Could not set ansible_host for host web01"));
    }

    #[test]
    fn test_syntax_error_fatal_at_load_when_strict() {
        let source =
            SourceConfig::from_yaml("plugin: inventory\nstrict: true\ngroups:\n  g: \"env ==\"\n")
                .unwrap();
        assert!(Constructed::from_source(&source).is_err());
    }

    #[test]
    fn test_syntax_error_skipped_when_not_strict() {
        let (c, mut inv) = setup("groups:\n  g: \"env ==\"\n", json!({"env": "x"}));
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("g").is_none());
    }

    #[test]
    fn test_keyed_group_with_prefix() {
        let (c, mut inv) = setup(
            "keyed_groups:\n  - key: application\n    prefix: app\n",
            json!({"application": "billing"}),
        );
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("app_billing").is_some());
    }

    #[test]
    fn test_keyed_group_empty_separator() {
        let (c, mut inv) = setup(
            "keyed_groups:\n  - key: application\n    prefix: app_\n    separator: \"\"\n",
            json!({"application": "billing"}),
        );
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("app_billing").is_some());
    }

    #[test]
    fn test_leading_separator() {
        let with = "keyed_groups:\n  - key: env\n";
        let without = "leading_separator: false\nkeyed_groups:\n  - key: env\n";
        let (c, mut inv) = setup(with, json!({"env": "prod"}));
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("_prod").is_some());
        let (c, mut inv) = setup(without, json!({"env": "prod"}));
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("prod").is_some());
    }

    #[test]
    fn test_parent_group_template() {
        let (c, mut inv) = setup(
            "keyed_groups:\n  - key: role\n    prefix: role\n    parent_group: \"{{ env }}_roles\"\n",
            json!({"role": "web", "env": "prod"}),
        );
        c.apply(&mut inv, "web01").unwrap();
        assert_eq!(
            inv.group("prod_roles").unwrap().children,
            vec!["role_web".to_string()]
        );
    }

    #[test]
    fn test_falsy_key_strict() {
        let yaml = "strict: true\nkeyed_groups:\n  - key: env\n";
        let (c, mut inv) = setup(yaml, json!({"env": ""}));
        assert!(matches!(
            c.apply(&mut inv, "web01").unwrap_err(),
            InventoryError::KeyedGroup { .. }
        ));
        let (c, mut inv) = setup(yaml, json!({"env": []}));
        c.apply(&mut inv, "web01").unwrap();
        assert_eq!(inv.group_names().count(), 0);
    }

    #[test]
    fn test_falsy_key_not_strict_creates_nothing() {
        let (c, mut inv) = setup("keyed_groups:\n  - key: env\n", json!({"env": null}));
        c.apply(&mut inv, "web01").unwrap();
        assert_eq!(inv.group_names().count(), 0);
    }

    #[test]
    fn test_sanitize_group_names_option() {
        let yaml = "sanitize_group_names: true\nkeyed_groups:\n  - key: dc\n    prefix: dc\n";
        let (c, mut inv) = setup(yaml, json!({"dc": "eu-west.1"}));
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("dc_eu_west_1").is_some());

        let (c, mut inv) = setup("keyed_groups:\n  - key: dc\n    prefix: dc\n", json!({"dc": "eu-west.1"}));
        c.apply(&mut inv, "web01").unwrap();
        assert!(inv.group("dc_eu-west.1").is_some());
    }
}
