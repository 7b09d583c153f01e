//! Projection of the VM list
//!
//! Pure functions only. The filtered view is recomputed on every read so it
//! always reflects the latest list and the latest criteria together.

use super::model::{Vm, VmState};

/// Filter criteria for the VM list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Case-insensitive substring of the VM name; empty matches everything
    pub query: String,
    /// Exact state match; `None` matches everything
    pub state: Option<VmState>,
}

impl Filter {
    pub fn new(query: impl Into<String>, state: Option<VmState>) -> Self {
        Self {
            query: query.into(),
            state,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty() && self.state.is_none()
    }

    pub fn matches(&self, vm: &Vm) -> bool {
        matches_query(vm, &self.query.to_lowercase()) && self.state.map_or(true, |s| vm.state == s)
    }

    pub fn apply(&self, vms: &[Vm]) -> Vec<Vm> {
        project(vms, &self.query, self.state)
    }
}

fn matches_query(vm: &Vm, query_lower: &str) -> bool {
    query_lower.is_empty() || vm.name.to_lowercase().contains(query_lower)
}

/// VMs whose name contains `query` (case-insensitive) and whose state equals
/// `state`, in their original order.
pub fn project(vms: &[Vm], query: &str, state: Option<VmState>) -> Vec<Vm> {
    let query = query.to_lowercase();
    vms.iter()
        .filter(|vm| matches_query(vm, &query))
        .filter(|vm| state.map_or(true, |s| vm.state == s))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Vm> {
        vec![
            Vm::new("web-frontend", VmState::Running),
            Vm::new("db-primary", VmState::Running),
            Vm::new("Web-Staging", VmState::Stopped),
            Vm::new("backup", VmState::Paused),
        ]
    }

    fn names(vms: &[Vm]) -> Vec<&str> {
        vms.iter().map(|vm| vm.name.as_str()).collect()
    }

    #[test]
    fn test_empty_criteria_pass_through() {
        let vms = sample();
        assert_eq!(project(&vms, "", None), vms);
        assert!(Filter::default().is_empty());
    }

    #[test]
    fn test_query_is_case_insensitive() {
        let vms = sample();
        assert_eq!(
            names(&project(&vms, "WEB", None)),
            vec!["web-frontend", "Web-Staging"]
        );
    }

    #[test]
    fn test_state_filter_is_exact() {
        let vms = sample();
        assert_eq!(
            names(&project(&vms, "", Some(VmState::Running))),
            vec!["web-frontend", "db-primary"]
        );
        assert!(project(&vms, "", Some(VmState::Crashed)).is_empty());
    }

    #[test]
    fn test_criteria_are_anded() {
        let vms = sample();
        let filter = Filter::new("web", Some(VmState::Stopped));
        assert_eq!(names(&filter.apply(&vms)), vec!["Web-Staging"]);
        assert!(filter.matches(&vms[2]));
        assert!(!filter.matches(&vms[0]));
    }

    #[test]
    fn test_query_only_matches_name() {
        let mut vm = Vm::new("alpha", VmState::Running);
        vm.uuid = "web-0000".into();
        assert!(project(&[vm], "web", None).is_empty());
    }
}
