//! In-memory inventory: hosts, their variables, and groups.
//!
//! Rendered in the inventory-script format Ansible expects from `--list`
//! and `--host`.

use crate::db::Record;
use crate::error::{InventoryError, InventoryResult};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

pub const ALL_GROUP: &str = "all";
pub const UNGROUPED_GROUP: &str = "ungrouped";

/// A named group. Hosts and children keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub hosts: Vec<String>,
    pub children: Vec<String>,
}

impl Group {
    fn push_host(&mut self, host: &str) {
        if !self.hosts.iter().any(|h| h == host) {
            self.hosts.push(host.to_string());
        }
    }

    fn push_child(&mut self, child: &str) {
        if !self.children.iter().any(|c| c == child) {
            self.children.push(child.to_string());
        }
    }

    fn to_json(&self) -> Value {
        let mut out = Map::new();
        if !self.hosts.is_empty() {
            out.insert("hosts".to_string(), json!(self.hosts));
        }
        if !self.children.is_empty() {
            out.insert("children".to_string(), json!(self.children));
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Host order of first appearance
    host_order: Vec<String>,
    hostvars: BTreeMap<String, Record>,
    groups: BTreeMap<String, Group>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host (to `all`). Adding an existing host is a no-op.
    pub fn add_host(&mut self, host: &str) {
        if !self.hostvars.contains_key(host) {
            trace!(host, "Added host to group 'all'");
            self.host_order.push(host.to_string());
            self.hostvars.insert(host.to_string(), Record::new());
        }
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.hostvars.contains_key(host)
    }

    pub fn hosts(&self) -> &[String] {
        &self.host_order
    }

    pub fn host_count(&self) -> usize {
        self.host_order.len()
    }

    pub fn set_variable(&mut self, host: &str, name: &str, value: Value) -> InventoryResult<()> {
        let vars = self
            .hostvars
            .get_mut(host)
            .ok_or_else(|| InventoryError::record(format!("unknown host '{}'", host)))?;
        vars.insert(name.to_string(), value);
        Ok(())
    }

    pub fn host_vars(&self, host: &str) -> Option<&Record> {
        self.hostvars.get(host)
    }

    /// Create the group if needed; returns its name.
    pub fn add_group(&mut self, name: &str) -> InventoryResult<String> {
        if name.is_empty() {
            return Err(InventoryError::invalid_option("group", "group name must not be empty"));
        }
        if name == ALL_GROUP || name == UNGROUPED_GROUP {
            return Ok(name.to_string());
        }
        self.groups.entry(name.to_string()).or_default();
        Ok(name.to_string())
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn add_host_to_group(&mut self, group: &str, host: &str) -> InventoryResult<()> {
        if !self.has_host(host) {
            return Err(InventoryError::record(format!("unknown host '{}'", host)));
        }
        if group == ALL_GROUP {
            return Ok(());
        }
        let name = self.add_group(group)?;
        if let Some(g) = self.groups.get_mut(&name) {
            g.push_host(host);
        }
        trace!(host, group = %name, "Added host to group");
        Ok(())
    }

    /// Make `child` a child group of `parent`, creating both as needed.
    pub fn add_child(&mut self, parent: &str, child: &str) -> InventoryResult<()> {
        if parent == child {
            return Err(InventoryError::invalid_option(
                "parent_group",
                format!("group '{}' cannot be its own parent", parent),
            ));
        }
        if self.is_ancestor(child, parent) {
            return Err(InventoryError::invalid_option(
                "parent_group",
                format!("adding '{}' under '{}' would create a cycle", child, parent),
            ));
        }
        let parent = self.add_group(parent)?;
        let child = self.add_group(child)?;
        if let Some(g) = self.groups.get_mut(&parent) {
            g.push_child(&child);
        }
        Ok(())
    }

    /// True when `node` is `ancestor` or lies somewhere below it.
    fn is_ancestor(&self, ancestor: &str, node: &str) -> bool {
        let mut stack = vec![ancestor];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == node {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(group) = self.groups.get(current) {
                stack.extend(group.children.iter().map(String::as_str));
            }
        }
        false
    }

    /// Hosts that are not a member of any group besides `all`.
    pub fn ungrouped_hosts(&self) -> Vec<String> {
        let grouped: BTreeSet<&str> = self
            .groups
            .values()
            .flat_map(|g| g.hosts.iter().map(String::as_str))
            .collect();
        self.host_order
            .iter()
            .filter(|h| !grouped.contains(h.as_str()))
            .cloned()
            .collect()
    }

    /// Groups that are nobody's child; they hang directly under `all`.
    fn top_level_groups(&self) -> Vec<String> {
        let children: BTreeSet<&str> = self
            .groups
            .values()
            .flat_map(|g| g.children.iter().map(String::as_str))
            .collect();
        self.groups
            .keys()
            .filter(|name| !children.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// The `--list` document.
    pub fn to_list_json(&self) -> Value {
        let mut doc = Map::new();

        let hostvars: Map<String, Value> = self
            .hostvars
            .iter()
            .map(|(host, vars)| (host.clone(), Value::Object(vars.clone())))
            .collect();
        doc.insert("_meta".to_string(), json!({ "hostvars": hostvars }));

        let mut all_children = vec![UNGROUPED_GROUP.to_string()];
        all_children.extend(self.top_level_groups());
        doc.insert(ALL_GROUP.to_string(), json!({ "children": all_children }));

        let ungrouped = Group {
            hosts: self.ungrouped_hosts(),
            ..Group::default()
        };
        doc.insert(UNGROUPED_GROUP.to_string(), ungrouped.to_json());

        for (name, group) in &self.groups {
            doc.insert(name.clone(), group.to_json());
        }

        Value::Object(doc)
    }

    /// The `--host` document: the host's variables, `{}` when unknown.
    pub fn host_json(&self, host: &str) -> Value {
        self.hostvars
            .get(host)
            .map(|vars| Value::Object(vars.clone()))
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}
