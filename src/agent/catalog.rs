// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Namespaced tool lookup for one turn.

use std::collections::HashMap;

use tracing::warn;

use crate::mcp::types::{ServerTool, Tool};
use crate::types::ToolDefinition;

/// Maps `server:tool` names shown to the model back to their server.
#[derive(Debug, Default, Clone)]
pub struct ToolCatalog {
    entries: HashMap<String, ServerTool>,
    order: Vec<String>,
}

impl ToolCatalog {
    pub fn new(tools: impl IntoIterator<Item = ServerTool>) -> Self {
        let mut catalog = Self::default();
        for tool in tools {
            let name = tool.qualified_name();
            if catalog.entries.contains_key(&name) {
                warn!(tool = %name, "Duplicate tool name; keeping the first");
                continue;
            }
            catalog.order.push(name.clone());
            catalog.entries.insert(name, tool);
        }
        catalog
    }

    /// Server and tool for a qualified name.
    pub fn resolve(&self, qualified_name: &str) -> Option<(&str, &Tool)> {
        self.entries
            .get(qualified_name)
            .map(|entry| (entry.server.as_str(), &entry.tool))
    }

    /// Definitions for the provider, in discovery order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|entry| (name, entry)))
            .map(|(name, entry)| {
                let description = entry.tool.description.clone().unwrap_or_default();
                ToolDefinition::new(name.clone(), description)
                    .with_parameters(entry.tool.input_schema.clone())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
