//! The variant tree: every `(runtime, loader)` node a release builds.

use std::collections::BTreeSet;

use modship_types::{ReleaseError, RuntimeVersion, VariantDescriptor};

use crate::config::TreeConfig;

/// Immutable, ordered set of variant descriptors.
///
/// Iteration order is runtime ascending, the common node first, then
/// loaders by name. Every loader node has a common node of the same runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantTree {
    nodes: BTreeSet<VariantDescriptor>,
}

impl VariantTree {
    /// Build a tree from declared descriptors. Repeated declarations collapse.
    pub fn build(
        declared: impl IntoIterator<Item = VariantDescriptor>,
    ) -> Result<Self, ReleaseError> {
        let nodes: BTreeSet<VariantDescriptor> = declared.into_iter().collect();

        if nodes.is_empty() {
            return Err(ReleaseError::Structural(
                "variant tree is empty; declare at least one runtime and branch".to_string(),
            ));
        }

        let missing: Vec<String> = nodes
            .iter()
            .filter(|n| !n.is_common() && !nodes.contains(&n.common_sibling()))
            .map(|n| n.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ReleaseError::Structural(format!(
                "no common project for {}",
                missing.join(", ")
            )));
        }

        Ok(Self { nodes })
    }

    /// Expand the branch declarations of `modship.toml` into a tree.
    pub fn from_config(config: &TreeConfig) -> Result<Self, ReleaseError> {
        Self::build(declared_nodes(config))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantDescriptor> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &VariantDescriptor) -> bool {
        self.nodes.contains(node)
    }

    /// Loader nodes, the ones that produce publishable artifacts.
    pub fn loader_nodes(&self) -> impl Iterator<Item = &VariantDescriptor> {
        self.nodes.iter().filter(|n| !n.is_common())
    }

    /// Distinct runtimes in ascending order.
    pub fn runtimes(&self) -> Vec<&RuntimeVersion> {
        let mut out: Vec<&RuntimeVersion> = Vec::new();
        for node in &self.nodes {
            if out.last() != Some(&&node.runtime) {
                out.push(&node.runtime);
            }
        }
        out
    }
}

fn declared_nodes(config: &TreeConfig) -> Vec<VariantDescriptor> {
    config
        .branches
        .iter()
        .flat_map(|branch| {
            let runtimes = branch.runtimes.as_ref().unwrap_or(&config.runtimes);
            runtimes
                .iter()
                .map(|runtime| VariantDescriptor::new(runtime.clone(), branch.loader.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BranchConfig;

    fn v(s: &str) -> RuntimeVersion {
        s.parse().expect("version")
    }

    fn node(runtime: &str, loader: &str) -> VariantDescriptor {
        VariantDescriptor::new(v(runtime), loader)
    }

    #[test]
    fn duplicate_declarations_collapse() {
        let tree = VariantTree::build([
            node("1.20.1", ""),
            node("1.20.1", "forge"),
            node("1.20.1", "forge"),
        ])
        .expect("tree");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn missing_common_node_is_structural() {
        let err = VariantTree::build([node("1.20.1", ""), node("1.21.1", "neoforge")])
            .expect_err("should fail");
        assert_eq!(
            err,
            ReleaseError::Structural("no common project for 1.21.1-neoforge".to_string())
        );
    }

    #[test]
    fn empty_tree_is_structural() {
        let err = VariantTree::build(Vec::new()).expect_err("should fail");
        assert!(matches!(err, ReleaseError::Structural(_)));
    }

    #[test]
    fn iteration_is_runtime_then_common_then_loader() {
        let tree = VariantTree::build([
            node("1.21.1", "neoforge"),
            node("1.9", ""),
            node("1.21.1", ""),
            node("1.21.1", "forge"),
            node("1.9", "forge"),
        ])
        .expect("tree");

        let order: Vec<String> = tree.iter().map(|n| n.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "1.9-common",
                "1.9-forge",
                "1.21.1-common",
                "1.21.1-forge",
                "1.21.1-neoforge"
            ]
        );
        assert_eq!(tree.runtimes(), vec![&v("1.9"), &v("1.21.1")]);
        assert_eq!(tree.loader_nodes().count(), 3);
    }

    #[test]
    fn branches_expand_over_declared_runtimes() {
        let config = TreeConfig {
            runtimes: vec![v("1.20.1"), v("1.21.1")],
            branches: vec![
                BranchConfig {
                    loader: String::new(),
                    runtimes: None,
                },
                BranchConfig {
                    loader: "forge".to_string(),
                    runtimes: Some(vec![v("1.20.1")]),
                },
                BranchConfig {
                    loader: "neoforge".to_string(),
                    runtimes: None,
                },
            ],
        };

        let tree = VariantTree::from_config(&config).expect("tree");
        assert_eq!(tree.len(), 5);
        assert!(tree.contains(&node("1.20.1", "forge")));
        assert!(!tree.contains(&node("1.21.1", "forge")));
        assert!(tree.contains(&node("1.20.1", "neoforge")));
    }

    #[test]
    fn branch_without_common_branch_is_rejected() {
        let config = TreeConfig {
            runtimes: vec![v("1.20.1")],
            branches: vec![BranchConfig {
                loader: "forge".to_string(),
                runtimes: None,
            }],
        };
        assert!(matches!(
            VariantTree::from_config(&config),
            Err(ReleaseError::Structural(_))
        ));
    }
}
