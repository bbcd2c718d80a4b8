//! Plan computation and rendering
//!
//! The plan is a pure function of the serialized current and desired
//! resource sets: per-resource outcomes plus per-field changes. The
//! `kind`, `grafana`, `uid` and `folder` fields still drive the outcome
//! but are suppressed from the field display.

use std::collections::{BTreeMap, BTreeSet};

use colored::Colorize;
use serde_json::{Map, Value};

use crate::domain::diff::{diff_documents, FieldChange};
use crate::domain::resource::{Resource, ResourceKind};

/// Top-level paths excluded from per-field display
const SUPPRESSED_FIELDS: [&str; 4] = ["kind", "grafana", "uid", "folder"];

const VALUE_DISPLAY_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Remove,
}

impl Action {
    pub fn symbol(&self) -> &'static str {
        match self {
            Action::Create => "+",
            Action::Update => "~",
            Action::Remove => "-",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Action::Create => "created",
            Action::Update => "updated",
            Action::Remove => "removed",
        }
    }

    fn paint(&self, text: &str) -> colored::ColoredString {
        match self {
            Action::Create => text.green(),
            Action::Update => text.yellow(),
            Action::Remove => text.red(),
        }
    }
}

/// Planned outcome for one resource
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub action: Action,
    pub kind: ResourceKind,
    pub fields: BTreeMap<String, FieldChange>,
}

/// The full plan, keyed by group-qualified resource name
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub changes: BTreeMap<String, ResourceChange>,
}

impl Plan {
    /// Diff the flattened current and desired resource sets
    pub fn compute(
        current: &BTreeMap<String, Resource>,
        desired: &BTreeMap<String, Resource>,
    ) -> Self {
        let empty = Value::Object(Map::new());
        let names: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();

        let mut changes = BTreeMap::new();
        for name in names {
            let current_resource = current.get(name);
            let desired_resource = desired.get(name);

            let current_doc = current_resource
                .map(Resource::serialized)
                .unwrap_or_else(|| empty.clone());
            let desired_doc = desired_resource
                .map(Resource::serialized)
                .unwrap_or_else(|| empty.clone());

            let fields = diff_documents(&current_doc, &desired_doc);
            if fields.is_empty() {
                continue;
            }

            let action = match (current_resource, desired_resource) {
                (None, Some(_)) => Action::Create,
                (Some(_), None) => Action::Remove,
                _ => Action::Update,
            };
            let kind = desired_resource
                .or(current_resource)
                .map(Resource::kind)
                .expect("at least one side is present");

            changes.insert(
                name.clone(),
                ResourceChange {
                    action,
                    kind,
                    fields,
                },
            );
        }
        Plan { changes }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Names matching an action and kind, in name order
    pub fn names_for(&self, action: Action, kind: ResourceKind) -> Vec<String> {
        self.changes
            .iter()
            .filter(|(_, change)| change.action == action && change.kind == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Render the plan for display. Folder summaries come before dashboard
    /// summaries, mirroring the order changes are applied in.
    pub fn render(&self) -> String {
        let mut blocks = Vec::new();
        let folders = self
            .changes
            .iter()
            .filter(|(_, change)| change.kind == ResourceKind::Folder);
        let dashboards = self
            .changes
            .iter()
            .filter(|(_, change)| change.kind == ResourceKind::Dashboard);

        for (name, change) in folders.chain(dashboards) {
            blocks.push(render_change(name, change));
        }
        blocks.join("\n\n")
    }
}

fn render_change(name: &str, change: &ResourceChange) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {} {} will be {}:",
        change.action.paint(change.action.symbol()),
        change.kind.title(),
        name.bold(),
        change.action.paint(change.action.past_tense()),
    ));

    let visible: Vec<(&String, &FieldChange)> = change
        .fields
        .iter()
        .filter(|(path, _)| !SUPPRESSED_FIELDS.contains(&path.as_str()))
        .collect();
    let padding = visible.iter().map(|(path, _)| path.len()).max().unwrap_or(0);

    for (path, field) in visible {
        lines.push(render_field(path, field, padding));
    }
    lines.join("\n")
}

fn render_field(path: &str, field: &FieldChange, padding: usize) -> String {
    let label = format!("{}:", path);
    match field {
        FieldChange::Added { value } => format!(
            "  {} {:<width$}  \"{}\"",
            Action::Create.paint(Action::Create.symbol()),
            label,
            Action::Create.paint(&display_value(value)),
            width = padding + 1,
        ),
        FieldChange::Removed { value } => format!(
            "  {} {:<width$}  \"{}\"",
            Action::Remove.paint(Action::Remove.symbol()),
            label,
            Action::Remove.paint(&display_value(value)),
            width = padding + 1,
        ),
        FieldChange::Changed { old, new } => format!(
            "  {} {:<width$}  \"{}\" {} \"{}\"",
            Action::Update.paint(Action::Update.symbol()),
            label,
            Action::Remove.paint(&display_value(old)),
            "=>".dimmed(),
            Action::Create.paint(&display_value(new)),
            width = padding + 1,
        ),
    }
}

fn display_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.len() > VALUE_DISPLAY_LIMIT {
        format!("{}...", &text[..VALUE_DISPLAY_LIMIT])
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn folder(title: &str) -> Resource {
        Resource::folder("gr", "gdbt_f", model(json!({"title": title})))
    }

    fn dashboard(title: &str) -> Resource {
        Resource::dashboard("gr", "gdbt_d", model(json!({"title": title})), "gdbt_f")
    }

    #[test]
    fn test_no_drift_means_empty_plan() {
        let mut current = BTreeMap::new();
        current.insert("folders/main".to_string(), folder("A"));
        let plan = Plan::compute(&current, &current.clone());
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_create_when_absent_on_left() {
        let mut desired = BTreeMap::new();
        desired.insert("folders/main".to_string(), folder("T"));
        let plan = Plan::compute(&BTreeMap::new(), &desired);
        assert_eq!(plan.changes["folders/main"].action, Action::Create);
    }

    #[test]
    fn test_remove_when_absent_on_right() {
        let mut current = BTreeMap::new();
        current.insert("folders/main".to_string(), folder("T"));
        let plan = Plan::compute(&current, &BTreeMap::new());
        assert_eq!(plan.changes["folders/main"].action, Action::Remove);
    }

    #[test]
    fn test_title_change_is_single_field_update() {
        let mut current = BTreeMap::new();
        current.insert("folders/main".to_string(), folder("A"));
        let mut desired = BTreeMap::new();
        desired.insert("folders/main".to_string(), folder("B"));

        let plan = Plan::compute(&current, &desired);
        let change = &plan.changes["folders/main"];
        assert_eq!(change.action, Action::Update);
        assert_eq!(
            change.fields.get("model.title"),
            Some(&FieldChange::Changed {
                old: json!("A"),
                new: json!("B"),
            })
        );
        assert_eq!(change.fields.len(), 1);
    }

    #[test]
    fn test_ignored_model_keys_never_influence_outcome() {
        let mut current = BTreeMap::new();
        current.insert(
            "dashboards/web".to_string(),
            Resource::dashboard(
                "gr",
                "gdbt_d",
                model(json!({"title": "T", "id": 1, "version": 4})),
                "gdbt_f",
            ),
        );
        let mut desired = BTreeMap::new();
        desired.insert(
            "dashboards/web".to_string(),
            Resource::dashboard(
                "gr",
                "gdbt_d",
                model(json!({"title": "T", "id": 9, "version": 1})),
                "gdbt_f",
            ),
        );
        let plan = Plan::compute(&current, &desired);
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_suppressed_fields_still_drive_outcome() {
        // Folder move changes only the suppressed `folder` path
        let mut current = BTreeMap::new();
        current.insert(
            "dashboards/web".to_string(),
            Resource::dashboard("gr", "gdbt_d", model(json!({"title": "T"})), "gdbt_old"),
        );
        let mut desired = BTreeMap::new();
        desired.insert(
            "dashboards/web".to_string(),
            Resource::dashboard("gr", "gdbt_d", model(json!({"title": "T"})), "gdbt_new"),
        );

        let plan = Plan::compute(&current, &desired);
        let change = &plan.changes["dashboards/web"];
        assert_eq!(change.action, Action::Update);
        // ...but does not show up in the rendered field list
        let rendered = render_change("dashboards/web", change);
        assert!(!rendered.contains("gdbt_old"));
    }

    #[test]
    fn test_render_orders_folders_before_dashboards() {
        let mut desired = BTreeMap::new();
        desired.insert("dashboards/web".to_string(), dashboard("W"));
        desired.insert("folders/main".to_string(), folder("M"));

        let plan = Plan::compute(&BTreeMap::new(), &desired);
        let rendered = plan.render();
        let folder_at = rendered.find("folders/main").unwrap();
        let dashboard_at = rendered.find("dashboards/web").unwrap();
        assert!(folder_at < dashboard_at);
    }

    #[test]
    fn test_names_for_partitions_by_action_and_kind() {
        let mut current = BTreeMap::new();
        current.insert("dashboards/old".to_string(), dashboard("O"));
        let mut desired = BTreeMap::new();
        desired.insert("folders/main".to_string(), folder("M"));

        let plan = Plan::compute(&current, &desired);
        assert_eq!(
            plan.names_for(Action::Create, ResourceKind::Folder),
            vec!["folders/main"]
        );
        assert_eq!(
            plan.names_for(Action::Remove, ResourceKind::Dashboard),
            vec!["dashboards/old"]
        );
        assert!(plan
            .names_for(Action::Create, ResourceKind::Dashboard)
            .is_empty());
    }
}
