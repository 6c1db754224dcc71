//! Inventory-script entry points: `--list` and `--host`.

use crate::config::{Action, Config, OutputStyle};
use crate::db::{MySqlRowSource, RowSource};
use crate::error::{InventoryError, InventoryResult};
use crate::inventory::{Inventory, InventoryPlugin};
use crate::models::ConnectionSettings;
use serde_json::Value;
use tracing::{debug, info};

/// Load the source named by `config`, query MySQL and render the answer.
pub async fn run(config: &Config) -> InventoryResult<String> {
    let plugin = InventoryPlugin::load(&config.source)?;
    let settings = ConnectionSettings::from_env(plugin.source())?;
    info!(url = %settings.redacted_url(), "Resolved connection settings");
    debug!(settings = ?settings, "Connection settings");

    let rows = MySqlRowSource::new(settings);
    run_with(config, &plugin, &rows).await
}

/// Same as [`run`] with an already loaded plugin and any row source.
pub async fn run_with<R: RowSource>(
    config: &Config,
    plugin: &InventoryPlugin,
    rows: &R,
) -> InventoryResult<String> {
    let inventory = plugin.parse(rows, config.use_cache()).await?;
    render(&inventory, &config.action(), config.output)
}

/// The JSON document answering `action`.
pub fn render(inventory: &Inventory, action: &Action, style: OutputStyle) -> InventoryResult<String> {
    let doc = match action {
        Action::List => inventory.to_list_json(),
        Action::Host(host) => inventory.host_json(host),
    };
    to_string(&doc, style)
}

fn to_string(doc: &Value, style: OutputStyle) -> InventoryResult<String> {
    let out = match style {
        OutputStyle::Compact => serde_json::to_string(doc),
        OutputStyle::Pretty => serde_json::to_string_pretty(doc),
    };
    out.map_err(|e| InventoryError::config(format!("cannot render inventory: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inventory() -> Inventory {
        let mut inv = Inventory::new();
        inv.add_host("web01");
        inv.set_variable("web01", "env", json!("PROD")).unwrap();
        inv
    }

    #[test]
    fn test_render_host() {
        let out = render(&inventory(), &Action::Host("web01".into()), OutputStyle::Compact).unwrap();
        assert_eq!(out, r#"{"env":"PROD"}"#);
    }

    #[test]
    fn test_render_unknown_host() {
        let out = render(&inventory(), &Action::Host("nope".into()), OutputStyle::Compact).unwrap();
        assert_eq!(out, "{}");
    }

    #[test]
    fn test_render_list_pretty_is_multiline() {
        let out = render(&inventory(), &Action::List, OutputStyle::Pretty).unwrap();
        assert!(out.contains('\n'));
        let doc: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["ungrouped"]["hosts"], json!(["web01"]));
    }
}
