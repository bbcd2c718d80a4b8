//! Planner
//!
//! Flattens the two-level `{group → {name → resource}}` maps into one
//! namespace and hands them to the differ. Resource names are
//! group-qualified by construction (`group` or `group:item`), so
//! flattening is a plain merge and the group is recoverable from a name.

use std::collections::BTreeMap;

use crate::domain::plan::Plan;
use crate::domain::resource::Resource;
use crate::services::resolver::ResourceGroups;

/// Merge all groups into one `{name → resource}` namespace
pub fn flatten(groups: &ResourceGroups) -> BTreeMap<String, Resource> {
    groups
        .iter()
        .flat_map(|(_, resources)| resources.iter())
        .map(|(name, resource)| (name.clone(), resource.clone()))
        .collect()
}

/// The state group a resource name belongs to
pub fn group_of(name: &str) -> &str {
    name.split_once(':').map(|(group, _)| group).unwrap_or(name)
}

/// Compute the plan from grouped current and desired resource sets
pub fn compute(current: &ResourceGroups, desired: &ResourceGroups) -> Plan {
    Plan::compute(&flatten(current), &flatten(desired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::Action;
    use crate::domain::resource::ResourceKind;
    use serde_json::json;

    fn folder(title: &str) -> Resource {
        let model = match json!({"title": title}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        Resource::folder("gr", "gdbt_f", model)
    }

    #[test]
    fn test_group_of_strips_loop_item() {
        assert_eq!(group_of("dashboards/web:stg"), "dashboards/web");
        assert_eq!(group_of("folders/main"), "folders/main");
    }

    #[test]
    fn test_flatten_merges_groups() {
        let mut groups = ResourceGroups::new();
        groups
            .entry("folders/main".to_string())
            .or_default()
            .insert("folders/main".to_string(), folder("A"));
        groups
            .entry("folders/aux".to_string())
            .or_default()
            .insert("folders/aux".to_string(), folder("B"));

        let flat = flatten(&groups);
        assert_eq!(flat.len(), 2);
        assert!(flat.contains_key("folders/main"));
        assert!(flat.contains_key("folders/aux"));
    }

    #[test]
    fn test_compute_plans_create_for_new_group() {
        let mut desired = ResourceGroups::new();
        desired
            .entry("folders/main".to_string())
            .or_default()
            .insert("folders/main".to_string(), folder("T"));

        let plan = compute(&ResourceGroups::new(), &desired);
        let change = &plan.changes["folders/main"];
        assert_eq!(change.action, Action::Create);
        assert_eq!(change.kind, ResourceKind::Folder);
    }
}
