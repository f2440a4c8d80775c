//! Release task graph.
//!
//! Tasks and their prerequisites are explicit. The graph is checked for
//! cycles with Kahn's algorithm before anything runs, and grouped into
//! dependency levels: every task of level `n` depends only on tasks in
//! levels `< n`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use modship_types::{ReleaseError, VariantDescriptor};

use crate::propagate::Propagation;

/// One unit of release work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    Changelog,
    ParentRelease,
    Build(VariantDescriptor),
    Relocate(VariantDescriptor),
    Publish(VariantDescriptor),
    Notify,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Changelog => write!(f, "changelog"),
            Task::ParentRelease => write!(f, "parent-release"),
            Task::Build(node) => write!(f, "build {node}"),
            Task::Relocate(node) => write!(f, "relocate {node}"),
            Task::Publish(node) => write!(f, "publish {node}"),
            Task::Notify => write!(f, "notify"),
        }
    }
}

/// Which stages a graph covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub build: bool,
    pub publish: bool,
}

impl Stages {
    pub const BUILD: Stages = Stages {
        build: true,
        publish: false,
    };
    pub const PUBLISH: Stages = Stages {
        build: false,
        publish: true,
    };
    pub const RELEASE: Stages = Stages {
        build: true,
        publish: true,
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGraph {
    deps: BTreeMap<Task, BTreeSet<Task>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Task) {
        self.deps.entry(task).or_default();
    }

    /// Record that `task` cannot start before `prerequisite` finished.
    pub fn add_edge(&mut self, task: Task, prerequisite: Task) {
        self.add_task(prerequisite.clone());
        self.deps.entry(task).or_default().insert(prerequisite);
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn contains(&self, task: &Task) -> bool {
        self.deps.contains_key(task)
    }

    pub fn prerequisites(&self, task: &Task) -> impl Iterator<Item = &Task> {
        self.deps.get(task).into_iter().flatten()
    }

    /// Graph for the requested stages over a propagated tree.
    pub fn for_release(propagation: &Propagation, stages: Stages) -> Self {
        let mut graph = Self::new();

        if stages.build {
            for config in propagation.iter() {
                graph.add_task(Task::Build(config.node.clone()));
                if config.publishable {
                    graph.add_edge(
                        Task::Relocate(config.node.clone()),
                        Task::Build(config.node.clone()),
                    );
                }
            }
            for (dependent, dependency) in &propagation.edges {
                graph.add_edge(
                    Task::Build(dependent.clone()),
                    Task::Build(dependency.clone()),
                );
            }
        }

        if stages.publish {
            graph.add_edge(Task::ParentRelease, Task::Changelog);
            for config in propagation.publishable() {
                let publish = Task::Publish(config.node.clone());
                graph.add_edge(publish.clone(), Task::ParentRelease);
                if stages.build {
                    // Nothing leaves the machine until every artifact is in place.
                    graph.add_edge(Task::ParentRelease, Task::Relocate(config.node.clone()));
                    graph.add_edge(publish.clone(), Task::Relocate(config.node.clone()));
                }
                graph.add_edge(Task::Notify, publish);
            }
            graph.add_edge(Task::Notify, Task::ParentRelease);
        }

        graph
    }

    /// Deterministic topological order (Kahn). A cycle is a structural error.
    pub fn topo_order(&self) -> Result<Vec<Task>, ReleaseError> {
        Ok(self.levels()?.into_iter().flatten().collect())
    }

    /// Tasks grouped by dependency depth, each level sorted.
    pub fn levels(&self) -> Result<Vec<Vec<Task>>, ReleaseError> {
        let mut indegree: BTreeMap<&Task, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&Task, BTreeSet<&Task>> = BTreeMap::new();

        for (task, prereqs) in &self.deps {
            indegree.insert(task, prereqs.len());
            for prereq in prereqs {
                dependents.entry(prereq).or_default().insert(task);
            }
        }

        let mut ready: BTreeSet<&Task> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(task, _)| *task)
            .collect();
        let mut levels: Vec<Vec<Task>> = Vec::new();
        let mut seen = 0usize;

        while !ready.is_empty() {
            let level: Vec<&Task> = ready.iter().copied().collect();
            ready.clear();
            seen += level.len();

            for task in &level {
                for dependent in dependents.get(task).into_iter().flatten() {
                    if let Some(deg) = indegree.get_mut(dependent) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            ready.insert(*dependent);
                        }
                    }
                }
            }

            levels.push(level.into_iter().cloned().collect());
        }

        if seen != self.deps.len() {
            let stuck: Vec<String> = indegree
                .iter()
                .filter(|(_, deg)| **deg > 0)
                .map(|(task, _)| task.to_string())
                .collect();
            return Err(ReleaseError::Structural(format!(
                "dependency cycle detected among: {}",
                stuck.join(", ")
            )));
        }

        Ok(levels)
    }
}
