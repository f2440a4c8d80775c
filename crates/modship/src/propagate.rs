//! Per-node configuration.
//!
//! [`compute_node_config`] is a pure function of the global metadata and one
//! descriptor. [`propagate`] runs it over the whole tree up front and records
//! the loader -> common dependency edges the task graph and build runner
//! consume.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use modship_types::{RuntimeVersion, VariantDescriptor};

use crate::config::{LevelThreshold, ModMetadata, ModshipConfig};
use crate::tree::VariantTree;

/// Everything node configuration is derived from.
#[derive(Debug, Clone)]
pub struct GlobalMetadata {
    pub mod_meta: ModMetadata,
    pub thresholds: Vec<LevelThreshold>,
    pub default_level: u32,
    pub dependency_templates: Vec<String>,
    /// Advertised versions per runtime spelling; absent means `[runtime]`.
    pub runtime_targets: BTreeMap<String, Vec<String>>,
    pub extension: String,
    pub output_root: PathBuf,
}

impl GlobalMetadata {
    pub fn from_config(config: &ModshipConfig, project_root: &Path) -> Self {
        Self {
            mod_meta: config.mod_meta.clone(),
            thresholds: config.target_level.thresholds.clone(),
            default_level: config.target_level.default,
            dependency_templates: config.dependencies.clone(),
            runtime_targets: config
                .runtimes
                .iter()
                .filter(|(_, o)| !o.targets.is_empty())
                .map(|(k, o)| (k.clone(), o.targets.clone()))
                .collect(),
            extension: config.build.extension.clone(),
            output_root: config.output_root(project_root),
        }
    }
}

/// Resolved settings of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeConfig {
    pub node: VariantDescriptor,
    /// The mod version shared by every node
    pub mod_version: String,
    /// `<mod version>+<runtime>`
    pub project_version: String,
    pub group: String,
    pub archive_name: String,
    pub artifact_name: String,
    pub sources_name: String,
    pub target_level: u32,
    pub dependencies: Vec<String>,
    pub output_dir: PathBuf,
    pub display_name: String,
    pub game_versions: Vec<String>,
    pub resource_properties: BTreeMap<String, String>,
    pub publishable: bool,
}

/// All node configs plus the loader -> common edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagation {
    pub configs: BTreeMap<VariantDescriptor, NodeConfig>,
    /// `(dependent, dependency)` pairs.
    pub edges: Vec<(VariantDescriptor, VariantDescriptor)>,
}

impl Propagation {
    pub fn get(&self, node: &VariantDescriptor) -> Option<&NodeConfig> {
        self.configs.get(node)
    }

    /// Configs in tree order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeConfig> {
        self.configs.values()
    }

    pub fn publishable(&self) -> impl Iterator<Item = &NodeConfig> {
        self.configs.values().filter(|c| c.publishable)
    }
}

/// Compiler target level for `runtime`: the highest threshold it meets, else
/// the default. Declaration order does not matter.
pub fn target_level(runtime: &RuntimeVersion, thresholds: &[LevelThreshold], default: u32) -> u32 {
    thresholds
        .iter()
        .filter(|t| runtime.at_least(&t.min))
        .max_by(|a, b| a.min.cmp(&b.min))
        .map(|t| t.level)
        .unwrap_or(default)
}

/// `forge` -> `Forge`.
pub fn loader_title(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn project_version(meta: &ModMetadata, runtime: &RuntimeVersion) -> String {
    format!("{}+{}", meta.version, runtime)
}

fn group_for(meta: &ModMetadata, label: &str) -> String {
    format!("{}.{}", meta.group, label)
}

fn archive_for(meta: &ModMetadata, label: &str) -> String {
    format!("{}-{}", meta.id, label)
}

fn expand_template(template: &str, node: &VariantDescriptor, version: &str) -> String {
    template
        .replace("{loader}", node.loader_label())
        .replace("{runtime}", node.runtime.as_str())
        .replace("{version}", version)
}

/// Derive one node's configuration from global metadata alone.
pub fn compute_node_config(global: &GlobalMetadata, node: &VariantDescriptor) -> NodeConfig {
    let meta = &global.mod_meta;
    let label = node.loader_label();
    let project_version = project_version(meta, &node.runtime);
    let archive_name = archive_for(meta, label);

    let mut dependencies: Vec<String> = global
        .dependency_templates
        .iter()
        .map(|t| expand_template(t, node, &meta.version))
        .collect();
    if !node.is_common() {
        // The common node's coordinates follow from the same rules, so no
        // other NodeConfig is consulted.
        dependencies.push(format!(
            "{}:{}:{}",
            group_for(meta, modship_types::COMMON_LABEL),
            archive_for(meta, modship_types::COMMON_LABEL),
            project_version
        ));
    }

    let game_versions = global
        .runtime_targets
        .get(node.runtime.as_str())
        .cloned()
        .unwrap_or_else(|| vec![node.runtime.to_string()]);

    let resource_properties = BTreeMap::from([
        ("id".to_string(), meta.id.clone()),
        ("name".to_string(), meta.name.clone()),
        ("version".to_string(), meta.version.clone()),
        ("description".to_string(), meta.description.clone()),
        ("author".to_string(), meta.author.clone()),
        ("license".to_string(), meta.license.clone()),
        (
            "minecraft".to_string(),
            format!("[{}]", game_versions.join(", ")),
        ),
    ]);

    NodeConfig {
        node: node.clone(),
        mod_version: meta.version.clone(),
        group: group_for(meta, label),
        artifact_name: format!("{archive_name}-{project_version}.{}", global.extension),
        sources_name: format!(
            "{archive_name}-{project_version}-sources.{}",
            global.extension
        ),
        archive_name,
        target_level: target_level(&node.runtime, &global.thresholds, global.default_level),
        dependencies,
        output_dir: global.output_root.join(&meta.version).join(label),
        display_name: format!(
            "{} for {} {}",
            meta.version,
            loader_title(label),
            node.runtime
        ),
        game_versions,
        resource_properties,
        publishable: !node.is_common(),
        project_version,
    }
}

/// Compute every node's configuration and the loader -> common edges.
pub fn propagate(tree: &VariantTree, global: &GlobalMetadata) -> Propagation {
    let configs = tree
        .iter()
        .map(|node| (node.clone(), compute_node_config(global, node)))
        .collect();

    let edges = tree
        .loader_nodes()
        .map(|node| (node.clone(), node.common_sibling()))
        .collect();

    Propagation { configs, edges }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> RuntimeVersion {
        s.parse().expect("version")
    }

    fn global() -> GlobalMetadata {
        GlobalMetadata {
            mod_meta: ModMetadata {
                id: "demo".to_string(),
                name: "Demo Mod".to_string(),
                version: "1.0.0".to_string(),
                group: "com.example".to_string(),
                description: "A demo".to_string(),
                author: "Someone".to_string(),
                license: "MIT".to_string(),
            },
            thresholds: crate::config::TargetLevelConfig::default().thresholds,
            default_level: 8,
            dependency_templates: vec![
                "io.github.llamalad7:mixinextras-{loader}:0.4.1".to_string(),
            ],
            runtime_targets: BTreeMap::from([(
                "1.20.1".to_string(),
                vec!["1.20".to_string(), "1.20.1".to_string()],
            )]),
            extension: "jar".to_string(),
            output_root: PathBuf::from("/proj/output"),
        }
    }

    #[test]
    fn forge_node_matches_documented_example() {
        let node = VariantDescriptor::new(v("1.20.1"), "forge");
        let config = compute_node_config(&global(), &node);

        assert_eq!(config.project_version, "1.0.0+1.20.1");
        assert_eq!(config.group, "com.example.forge");
        assert_eq!(config.archive_name, "demo-forge");
        assert_eq!(config.artifact_name, "demo-forge-1.0.0+1.20.1.jar");
        assert_eq!(config.sources_name, "demo-forge-1.0.0+1.20.1-sources.jar");
        assert_eq!(config.target_level, 17);
        assert_eq!(config.output_dir, PathBuf::from("/proj/output/1.0.0/forge"));
        assert_eq!(config.display_name, "1.0.0 for Forge 1.20.1");
        assert_eq!(config.game_versions, vec!["1.20", "1.20.1"]);
        assert_eq!(
            config.resource_properties.get("minecraft").map(String::as_str),
            Some("[1.20, 1.20.1]")
        );
        assert!(config.publishable);
        assert_eq!(
            config.dependencies,
            vec![
                "io.github.llamalad7:mixinextras-forge:0.4.1".to_string(),
                "com.example.common:demo-common:1.0.0+1.20.1".to_string(),
            ]
        );
    }

    #[test]
    fn common_node_uses_common_label() {
        let node = VariantDescriptor::common(v("1.21.1"));
        let config = compute_node_config(&global(), &node);

        assert_eq!(config.group, "com.example.common");
        assert_eq!(config.archive_name, "demo-common");
        assert_eq!(config.target_level, 21);
        assert!(!config.publishable);
        assert_eq!(config.game_versions, vec!["1.21.1"]);
        assert_eq!(
            config.dependencies,
            vec!["io.github.llamalad7:mixinextras-common:0.4.1".to_string()]
        );
    }

    #[test]
    fn target_level_compares_semantically() {
        let thresholds = crate::config::TargetLevelConfig::default().thresholds;
        assert_eq!(target_level(&v("1.20.4"), &thresholds, 8), 17);
        assert_eq!(target_level(&v("1.20.5"), &thresholds, 8), 21);
        assert_eq!(target_level(&v("1.21"), &thresholds, 8), 21);
        assert_eq!(target_level(&v("1.17"), &thresholds, 8), 17);
        assert_eq!(target_level(&v("1.16.5"), &thresholds, 8), 8);
        assert_eq!(target_level(&v("1.9"), &thresholds, 8), 8);
    }

    #[test]
    fn target_level_ignores_threshold_declaration_order() {
        let config: crate::config::TargetLevelConfig = toml::from_str(
            r#"
default = 8
thresholds = [
  { min = "1.17", level = 17 },
  { min = "1.20.5", level = 21 },
]
"#,
        )
        .expect("thresholds");

        assert_eq!(target_level(&v("1.21"), &config.thresholds, 8), 21);
        assert_eq!(target_level(&v("1.20.5"), &config.thresholds, 8), 21);
        assert_eq!(target_level(&v("1.18.2"), &config.thresholds, 8), 17);
        assert_eq!(target_level(&v("1.16.5"), &config.thresholds, 8), 8);
    }

    #[test]
    fn dependency_templates_expand_mod_version() {
        let mut global = global();
        global.dependency_templates =
            vec!["com.example:addon-{loader}-{runtime}:{version}".to_string()];
        let node = VariantDescriptor::new(v("1.20.1"), "forge");
        let config = compute_node_config(&global, &node);

        assert_eq!(config.mod_version, "1.0.0");
        assert_eq!(config.dependencies[0], "com.example:addon-forge-1.20.1:1.0.0");
    }

    #[test]
    fn game_versions_come_from_runtime_overrides() {
        let config: ModshipConfig = toml::from_str(
            r#"
[mod]
id = "demo"
name = "Demo"
version = "1.0.0"
group = "com.example"

[runtime."1.20.1"]
targets = ["1.20", "1.20.1"]

[runtime."1.21.1"]
targets = []
"#,
        )
        .expect("parse");
        let global = GlobalMetadata::from_config(&config, Path::new("/proj"));

        let game_versions = |runtime: &str| {
            compute_node_config(&global, &VariantDescriptor::new(v(runtime), "forge")).game_versions
        };
        assert_eq!(game_versions("1.20.1"), vec!["1.20", "1.20.1"]);
        assert_eq!(game_versions("1.21.1"), vec!["1.21.1"]);
        assert_eq!(game_versions("1.19.2"), vec!["1.19.2"]);
    }

    #[test]
    fn loader_titles_capitalize_first_letter() {
        assert_eq!(loader_title("forge"), "Forge");
        assert_eq!(loader_title("neoforge"), "Neoforge");
        assert_eq!(loader_title(""), "");
    }

    #[test]
    fn propagate_emits_loader_to_common_edges() {
        let tree = VariantTree::build([
            VariantDescriptor::common(v("1.20.1")),
            VariantDescriptor::new(v("1.20.1"), "forge"),
            VariantDescriptor::new(v("1.20.1"), "neoforge"),
        ])
        .expect("tree");

        let propagation = propagate(&tree, &global());
        assert_eq!(propagation.configs.len(), 3);
        assert_eq!(propagation.publishable().count(), 2);
        assert_eq!(
            propagation.edges,
            vec![
                (
                    VariantDescriptor::new(v("1.20.1"), "forge"),
                    VariantDescriptor::common(v("1.20.1"))
                ),
                (
                    VariantDescriptor::new(v("1.20.1"), "neoforge"),
                    VariantDescriptor::common(v("1.20.1"))
                ),
            ]
        );
    }

    #[test]
    fn propagation_is_deterministic() {
        let tree = VariantTree::build([
            VariantDescriptor::common(v("1.20.1")),
            VariantDescriptor::new(v("1.20.1"), "forge"),
        ])
        .expect("tree");
        assert_eq!(propagate(&tree, &global()), propagate(&tree, &global()));
    }
}
