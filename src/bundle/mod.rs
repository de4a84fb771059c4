// SPDX-License-Identifier: MIT

//! Four-file flow bundle
//!
//! A bundle is what the test-automation runtime consumes: the structure file,
//! the experiment flows keyed by node id, the unit configuration INI and the
//! editor positions. It ships as a single ZIP archive holding those four
//! members, or unpacked into a directory. Export is deterministic, so
//! importing an exported bundle and exporting it again yields the same
//! documents.

pub mod ini;
pub mod structure;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::BundleError;
use crate::flow::layout::{layout, LayoutConfig};
use crate::flow::types::{Bindings, ExperimentBinding, FlowGraph, Position, UnitConfig};
use structure::{AnyStructure, StructureDocument};

pub const STRUCTURE_FILE: &str = "TestStructure.json";
pub const FLOWS_FILE: &str = "TestFlows.json";
pub const INI_FILE: &str = "unit_config.ini";
/// Older runtimes ship the unit configuration under this name
pub const LEGACY_INI_FILE: &str = "FrameworkAutomationInit.ini";
pub const POSITIONS_FILE: &str = "positions.json";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Subtracted from node positions on export and added back on import
    pub position_offset: Position,
    /// Write the structure as the legacy id-keyed map instead of nodes plus connections
    pub legacy_structure: bool,
    /// Used for nodes that have no position yet
    #[serde(skip)]
    pub layout: LayoutConfig,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            position_offset: Position::new(0, 0),
            legacy_structure: false,
            layout: LayoutConfig::default(),
        }
    }
}

impl ExportOptions {
    /// Offset used by the legacy flow renderer
    pub fn legacy_renderer() -> Self {
        Self {
            position_offset: Position::new(75, 50),
            ..Self::default()
        }
    }
}

/// The four bundle documents
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Bundle {
    pub structure: Value,
    pub flows: Value,
    pub ini: String,
    pub positions: Value,
}

impl Bundle {
    /// Member names and contents, in archive order
    fn members(&self) -> Result<[(&'static str, String); 4], BundleError> {
        Ok([
            (STRUCTURE_FILE, member_text(STRUCTURE_FILE, &self.structure)?),
            (FLOWS_FILE, member_text(FLOWS_FILE, &self.flows)?),
            (INI_FILE, self.ini.clone()),
            (POSITIONS_FILE, member_text(POSITIONS_FILE, &self.positions)?),
        ])
    }

    fn from_members<F>(mut read: F) -> Result<Self, BundleError>
    where
        F: FnMut(&str) -> Result<Option<String>, BundleError>,
    {
        let mut json = |member: &str| -> Result<Value, BundleError> {
            let text = read(member)?.ok_or_else(|| BundleError::MissingMember(member.to_string()))?;
            parse_member(member, serde_json::from_str(&text))
        };
        let structure = json(STRUCTURE_FILE)?;
        let flows = json(FLOWS_FILE)?;
        let positions = json(POSITIONS_FILE)?;

        let ini = match read(INI_FILE)? {
            Some(text) => text,
            None => read(LEGACY_INI_FILE)?
                .ok_or_else(|| BundleError::MissingMember(INI_FILE.to_string()))?,
        };

        Ok(Self {
            structure,
            flows,
            ini,
            positions,
        })
    }

    /// Write the four members into `dir`, creating it if needed
    pub fn write_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(), BundleError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for (name, text) in self.members()? {
            fs::write(dir.join(name), text)?;
        }
        log::info!("Wrote bundle to {}", dir.display());
        Ok(())
    }

    pub fn read_dir<P: AsRef<Path>>(dir: P) -> Result<Self, BundleError> {
        let dir = dir.as_ref();
        Self::from_members(|member| {
            let path = dir.join(member);
            if path.is_file() {
                Ok(Some(fs::read_to_string(path)?))
            } else {
                Ok(None)
            }
        })
    }

    /// Pack the four members into a ZIP archive
    pub fn to_zip(&self) -> Result<Vec<u8>, BundleError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, text) in self.members()? {
            writer.start_file(name, options)?;
            writer.write_all(text.as_bytes())?;
        }
        Ok(writer.finish()?.into_inner())
    }

    pub fn from_zip(bytes: &[u8]) -> Result<Self, BundleError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        Self::from_members(|member| {
            let mut file = match archive.by_name(member) {
                Ok(file) => file,
                Err(ZipError::FileNotFound) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut text = String::new();
            file.read_to_string(&mut text)?;
            Ok(Some(text))
        })
    }

    pub fn write_zip<P: AsRef<Path>>(&self, path: P) -> Result<(), BundleError> {
        let path = path.as_ref();
        fs::write(path, self.to_zip()?)?;
        log::info!("Wrote bundle archive {}", path.display());
        Ok(())
    }

    pub fn read_zip<P: AsRef<Path>>(path: P) -> Result<Self, BundleError> {
        Self::from_zip(&fs::read(path)?)
    }
}

fn member_text(member: &str, value: &Value) -> Result<String, BundleError> {
    parse_member(member, serde_json::to_string_pretty(value))
}

fn parse_member<T>(member: &str, result: serde_json::Result<T>) -> Result<T, BundleError> {
    result.map_err(|source| BundleError::Json {
        member: member.to_string(),
        source,
    })
}

/// Serialize a graph, its bindings and the unit configuration into a bundle
pub fn export(
    graph: &FlowGraph,
    bindings: &Bindings,
    unit_config: &UnitConfig,
    options: &ExportOptions,
) -> Result<Bundle, BundleError> {
    let structure = StructureDocument::from_graph(graph);
    let structure = if options.legacy_structure {
        serde_json::to_value(structure.to_legacy())
    } else {
        serde_json::to_value(structure)
    };
    let structure = parse_member(STRUCTURE_FILE, structure)?;
    let flows = parse_member(FLOWS_FILE, serde_json::to_value(bindings))?;

    let fallback = layout(graph, &options.layout);
    let offset = options.position_offset;
    let positions: BTreeMap<&str, Position> = graph
        .nodes()
        .iter()
        .filter_map(|node| {
            node.position
                .or_else(|| fallback.get(&node.id).copied())
                .map(|p| (node.id.as_str(), Position::new(p.x - offset.x, p.y - offset.y)))
        })
        .collect();
    let positions = parse_member(POSITIONS_FILE, serde_json::to_value(positions))?;

    log::info!(
        "Exported {} nodes, {} connections, {} bindings",
        graph.len(),
        graph.connections().len(),
        bindings.len()
    );

    Ok(Bundle {
        structure,
        flows,
        ini: ini::render_unit_config(unit_config),
        positions,
    })
}

/// Rebuild the graph, bindings and unit configuration from a bundle
pub fn import(
    bundle: &Bundle,
    options: &ExportOptions,
) -> Result<(FlowGraph, Bindings, UnitConfig), BundleError> {
    let structure: AnyStructure =
        parse_member(STRUCTURE_FILE, serde_json::from_value(bundle.structure.clone()))?;
    let structure = structure.into_canonical();

    let mut graph = FlowGraph::new();
    for node in structure.nodes {
        graph.add_node(node.into_node())?;
    }
    for connection in structure.connections {
        graph.connect(&connection.from, &connection.to, connection.port)?;
    }

    let positions: HashMap<String, Position> =
        parse_member(POSITIONS_FILE, serde_json::from_value(bundle.positions.clone()))?;
    let offset = options.position_offset;
    for (id, p) in positions {
        if graph.contains(&id) {
            graph.set_position(&id, Position::new(p.x + offset.x, p.y + offset.y))?;
        } else {
            log::warn!("Ignoring position for unknown node '{}'", id);
        }
    }

    let flows: BTreeMap<String, ExperimentBinding> =
        parse_member(FLOWS_FILE, serde_json::from_value(bundle.flows.clone()))?;
    let mut bindings = Bindings::new();
    for (key, binding) in flows {
        let id = resolve_binding_key(&graph, &key)?;
        bindings.insert(id, binding);
    }

    let unit_config = ini::parse_unit_config(&bundle.ini);

    log::info!(
        "Imported {} nodes, {} connections, {} bindings",
        graph.len(),
        graph.connections().len(),
        bindings.len()
    );

    Ok((graph, bindings, unit_config))
}

/// Binding keys are node ids; older files key them by a unique node name
fn resolve_binding_key(graph: &FlowGraph, key: &str) -> Result<String, BundleError> {
    if graph.contains(key) {
        return Ok(key.to_string());
    }

    let mut matches = graph.nodes().iter().filter(|n| n.name == key);
    match (matches.next(), matches.next()) {
        (Some(node), None) => {
            log::debug!("Resolved binding key '{}' to node {}", key, node.id);
            Ok(node.id.clone())
        }
        _ => Err(BundleError::UnknownBindingNode(key.to_string())),
    }
}
