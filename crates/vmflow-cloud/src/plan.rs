//! Provisioning plan
//!
//! A plan is the dependency-respecting execution order of a set of
//! [`ResourceSpec`]s, computed with Kahn's algorithm. Among specs that are
//! ready at the same time the declaration order is kept, so a plan declared
//! in a valid order is returned unchanged.

use crate::error::PlanError;
use crate::resource::{ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ordered sequence of resource specs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    specs: Vec<ResourceSpec>,
}

impl ProvisioningPlan {
    /// Sort the specs so that every spec comes after its dependencies
    pub fn new(specs: Vec<ResourceSpec>) -> Result<Self, PlanError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.id.as_str(), i).is_some() {
                return Err(PlanError::DuplicateId(spec.id.clone()));
            }
        }

        // in_degrees[i] = number of unsatisfied dependencies of specs[i]
        let mut in_degrees = vec![0usize; specs.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for dep in &spec.depends_on {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| PlanError::UnknownDependency {
                        resource: spec.id.clone(),
                        dependency: dep.clone(),
                    })?;
                if seen.insert(d) {
                    in_degrees[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|&i| in_degrees[i] == 0).collect();
        let mut order = Vec::with_capacity(specs.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                in_degrees[dependent] -= 1;
                if in_degrees[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != specs.len() {
            let remaining = (0..specs.len())
                .filter(|&i| in_degrees[i] > 0)
                .map(|i| specs[i].id.clone())
                .collect();
            return Err(PlanError::Cycle(remaining));
        }

        let mut slots: Vec<Option<ResourceSpec>> = specs.into_iter().map(Some).collect();
        let specs = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[ResourceSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ResourceSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    /// Position of a spec in execution order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.id == id)
    }

    /// Specs of one kind, in execution order
    pub fn by_kind(&self, kind: ResourceKind) -> Vec<&ResourceSpec> {
        self.specs.iter().filter(|s| s.kind == kind).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, deps: &[&str]) -> ResourceSpec {
        deps.iter().fold(
            ResourceSpec::new(id, ResourceKind::ServiceAccount),
            |s, d| s.depends_on(*d),
        )
    }

    fn ids(plan: &ProvisioningPlan) -> Vec<&str> {
        plan.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_declared_order_is_kept_when_valid() {
        let plan = ProvisioningPlan::new(vec![
            spec("sa", &[]),
            spec("iam", &["sa"]),
            spec("fw", &[]),
            spec("vm", &["sa", "fw"]),
        ])
        .unwrap();

        assert_eq!(ids(&plan), vec!["sa", "iam", "fw", "vm"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let plan = ProvisioningPlan::new(vec![
            spec("bind", &["vm", "ip"]),
            spec("vm", &["sa"]),
            spec("ip", &[]),
            spec("sa", &[]),
        ])
        .unwrap();

        for s in plan.iter() {
            let pos = plan.position(&s.id).unwrap();
            for dep in &s.depends_on {
                assert!(plan.position(dep).unwrap() < pos, "{} before {}", dep, s.id);
            }
        }
        assert_eq!(ids(&plan), vec!["ip", "sa", "vm", "bind"]);
    }

    #[test]
    fn test_duplicate_dependency_is_counted_once() {
        let plan = ProvisioningPlan::new(vec![spec("a", &[]), spec("b", &["a", "a"])]).unwrap();
        assert_eq!(ids(&plan), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = ProvisioningPlan::new(vec![
            spec("a", &["c"]),
            spec("b", &["a"]),
            spec("c", &["b"]),
            spec("d", &[]),
        ])
        .unwrap_err();

        match err {
            PlanError::Cycle(remaining) => {
                assert_eq!(remaining, vec!["a", "b", "c"]);
            }
            other => panic!("Expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let err = ProvisioningPlan::new(vec![spec("vm", &["sa"])]).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownDependency {
                resource: "vm".into(),
                dependency: "sa".into()
            }
        );
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let err = ProvisioningPlan::new(vec![spec("sa", &[]), spec("sa", &[])]).unwrap_err();
        assert_eq!(err, PlanError::DuplicateId("sa".into()));
    }

    #[test]
    fn test_empty_plan() {
        let plan = ProvisioningPlan::new(Vec::new()).unwrap();
        assert!(plan.is_empty());
    }
}
