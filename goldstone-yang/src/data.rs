//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::path::{DataPath, MEMBER_KEY, PathElem};
use crate::schema::{Context, NodeKind, Resolved, SchemaNode, json_key};

/// Instance data validated against a schema context.
///
/// The tree uses the JSON encoding of YANG data: top-level members are
/// module-qualified, lists are arrays of objects carrying their keys and
/// leaf-lists are arrays of scalars.
#[derive(Clone, Debug)]
pub struct DataTree {
    ctx: Arc<Context>,
    root: Map<String, Value>,
}

/// Data node visited in tree order.
#[derive(Clone, Debug, PartialEq)]
pub struct DataNode {
    pub path: DataPath,
    pub kind: NodeKind,
    pub value: Option<Value>,
    // Node present only because of a schema default.
    pub default: bool,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One edit between two versions of a tree.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: DataPath,
    // Value after the change (leaves and leaf-list members only).
    pub value: Option<Value>,
    // Value before the change.
    pub prev: Option<Value>,
}

// ===== impl DataTree =====

impl DataTree {
    pub fn new(ctx: Arc<Context>) -> DataTree {
        DataTree {
            ctx,
            root: Map::new(),
        }
    }

    /// Builds a tree from JSON data, checking every member against the
    /// schema and canonicalizing leaf values.
    pub fn from_value(ctx: Arc<Context>, value: &Value) -> Result<DataTree> {
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Ok(DataTree::new(ctx)),
            _ => {
                return Err(Error::InvalidData(
                    "top-level data must be an object".to_owned(),
                ));
            }
        };

        let mut root = Map::new();
        for (key, value) in object {
            let (_, node) = ctx.find_top_node(key).ok_or_else(|| {
                Error::InvalidData(format!("unknown top-level member {key}"))
            })?;
            let value = canonical_node(node, value, &format!("/{key}"))?;
            root.insert(key.clone(), value);
        }
        Ok(DataTree { ctx, root })
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Creates or updates a node.
    ///
    /// Missing containers and list entries along the path are created.
    /// Leaf-list members come either from a `[.='x']` predicate or from
    /// `value`.
    pub fn set(
        &mut self,
        path: &DataPath,
        value: Option<&Value>,
    ) -> Result<()> {
        let ctx = self.ctx.clone();
        let resolved = ctx.resolve(path)?;
        let node = resolved.node();
        let last = path.len() - 1;
        let elem = &path.elems()[last];
        let missing_value = || {
            Error::InvalidValue(path.to_string(), "missing value".to_owned())
        };

        // Validate everything before touching the tree.
        let value = match node.kind {
            NodeKind::Container | NodeKind::List => None,
            NodeKind::Leaf => {
                let value = value.ok_or_else(missing_value)?;
                Some(node.canonicalize(&path.to_string(), value)?)
            }
            NodeKind::LeafList => {
                let member = match (elem.member(), value) {
                    (Some(member), _) => Value::String(member.to_owned()),
                    (None, Some(value)) => value.clone(),
                    (None, None) => return Err(missing_value()),
                };
                Some(node.canonicalize(&path.to_string(), &member)?)
            }
            NodeKind::Notification | NodeKind::Rpc => {
                return Err(Error::InvalidPath(
                    path.to_string(),
                    "not a data node".to_owned(),
                ));
            }
        };
        check_path_keys(&resolved, path)?;

        let key = resolved.json_key(last);
        let parent = walk_create(&mut self.root, &resolved, path, last)?;
        match (node.kind, value) {
            (NodeKind::Container, _) => {
                parent
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            (NodeKind::List, _) => {
                ensure_entry(parent, key, node, elem, path)?;
            }
            (NodeKind::Leaf, Some(value)) => {
                if last > 0 && resolved.nodes[last - 1].is_key(&node.name) {
                    if parent.get(&key) != Some(&value) {
                        return Err(Error::KeyModified(path.to_string()));
                    }
                    return Ok(());
                }
                parent.insert(key, value);
            }
            (NodeKind::LeafList, Some(member)) => {
                let members = parent
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
                    .ok_or_else(|| malformed(path))?;
                if members.contains(&member) {
                    return Err(Error::NodeExists(path.to_string()));
                }
                members.push(member);
            }
            _ => return Err(malformed(path)),
        }

        Ok(())
    }

    /// Removes a node and everything below it.
    pub fn delete(&mut self, path: &DataPath) -> Result<()> {
        let ctx = self.ctx.clone();
        let resolved = ctx.resolve(path)?;
        let not_found = || Error::NodeNotFound(path.to_string());
        let last = path.len() - 1;

        let mut map = &mut self.root;
        for depth in 0..last {
            let elem = &path.elems()[depth];
            let node = resolved.nodes[depth];
            let key = resolved.json_key(depth);
            map = match node.kind {
                NodeKind::Container => map
                    .get_mut(&key)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(not_found)?,
                NodeKind::List => {
                    check_keys(node, elem, path)?;
                    map.get_mut(&key)
                        .and_then(Value::as_array_mut)
                        .and_then(|entries| {
                            entries
                                .iter_mut()
                                .find(|entry| entry_matches(entry, &elem.keys))
                        })
                        .and_then(Value::as_object_mut)
                        .ok_or_else(not_found)?
                }
                _ => return Err(not_found()),
            };
        }

        let elem = &path.elems()[last];
        let node = resolved.node();
        let key = resolved.json_key(last);
        match node.kind {
            NodeKind::Leaf
                if last > 0 && resolved.nodes[last - 1].is_key(&node.name) =>
            {
                return Err(Error::KeyModified(path.to_string()));
            }
            NodeKind::List if !elem.keys.is_empty() => {
                let entries = map
                    .get_mut(&key)
                    .and_then(Value::as_array_mut)
                    .ok_or_else(not_found)?;
                let count = entries.len();
                entries.retain(|entry| !entry_matches(entry, &elem.keys));
                if entries.len() == count {
                    return Err(not_found());
                }
            }
            NodeKind::LeafList if elem.member().is_some() => {
                let member = elem.member().unwrap_or_default();
                let member = Value::String(member.to_owned());
                let member = node.canonicalize(&path.to_string(), &member)?;
                let members = map
                    .get_mut(&key)
                    .and_then(Value::as_array_mut)
                    .ok_or_else(not_found)?;
                let pos = members
                    .iter()
                    .position(|m| *m == member)
                    .ok_or_else(not_found)?;
                members.remove(pos);
            }
            _ => {
                map.remove(&key).ok_or_else(not_found)?;
            }
        }

        prune_empty(&mut self.root);
        Ok(())
    }

    /// Removes all data of a module.
    pub fn delete_module(&mut self, module: &str) {
        let prefix = format!("{module}:");
        self.root.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Returns every data node selected by `path`, with its path.
    ///
    /// Steps on lists without keys select all entries. When the last step
    /// is such a list, the whole list is returned as one array.
    pub fn find(&self, path: &DataPath) -> Result<Vec<(DataPath, Value)>> {
        let resolved = self.ctx.resolve(path)?;
        let mut found = Vec::new();
        find_in(
            &self.root,
            &resolved,
            path.elems(),
            0,
            &DataPath::default(),
            &mut found,
        );
        Ok(found)
    }

    /// Returns a tree holding only the nodes selected by `path` and their
    /// ancestors.
    pub fn filter(&self, path: &DataPath) -> Result<DataTree> {
        let mut tree = DataTree::new(self.ctx.clone());
        for (path, value) in self.find(path)? {
            tree.graft(&path, value)?;
        }
        Ok(tree)
    }

    // Places a subtree at the given location, creating its ancestors.
    fn graft(&mut self, path: &DataPath, value: Value) -> Result<()> {
        let ctx = self.ctx.clone();
        let resolved = ctx.resolve(path)?;
        let last = path.len() - 1;
        let elem = &path.elems()[last];
        let node = resolved.node();
        let key = resolved.json_key(last);
        let parent = walk_create(&mut self.root, &resolved, path, last)?;
        match node.kind {
            NodeKind::List if !elem.keys.is_empty() => {
                let entry = ensure_entry(parent, key, node, elem, path)?;
                if let Value::Object(object) = value {
                    *entry = object;
                }
            }
            NodeKind::LeafList if elem.member().is_some() => {
                let members = parent
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
                    .ok_or_else(|| malformed(path))?;
                if !members.contains(&value) {
                    members.push(value);
                }
            }
            _ => {
                parent.insert(key, value);
            }
        }
        Ok(())
    }

    /// Merges another tree into this one. Leaves from `other` take
    /// precedence, list entries are matched by key and leaf-lists are
    /// united.
    pub fn merge(&mut self, other: &DataTree) -> Result<()> {
        for (key, value) in &other.root {
            let (_, node) = self.ctx.find_top_node(key).ok_or_else(|| {
                Error::InvalidData(format!("unknown top-level member {key}"))
            })?;
            merge_node(&mut self.root, key, node, value);
        }
        Ok(())
    }

    /// Returns a copy with schema defaults added under every existing
    /// container and list entry.
    pub fn with_defaults(&self, config_only: bool) -> DataTree {
        let mut tree = self.clone();
        for module in self.ctx.modules() {
            for node in module.data_nodes() {
                if config_only && !node.config {
                    continue;
                }
                let key = json_key(0, &module.name, &node.name);
                add_defaults(&mut tree.root, key, node, config_only);
            }
        }
        tree
    }

    /// Lists every node in schema order, parents before children and list
    /// keys first. Leaf-list members are listed as `path[.='member']`.
    pub fn flatten(&self) -> Vec<DataNode> {
        self.walk(true)
    }

    /// Like [`DataTree::flatten`], also listing schema defaults. Nodes that
    /// exist only because of a default are flagged.
    pub fn flatten_with_defaults(&self, config_only: bool) -> Vec<DataNode> {
        let explicit = self
            .flatten()
            .into_iter()
            .map(|node| node.path)
            .collect::<HashSet<_>>();
        let mut nodes = self.with_defaults(config_only).flatten();
        for node in &mut nodes {
            node.default = !explicit.contains(&node.path);
        }
        nodes
    }

    /// Leaves and leaf-lists with their values. Each leaf-list is reported
    /// once with all its members.
    pub fn leaves(&self) -> Vec<(DataPath, Value)> {
        self.walk(false)
            .into_iter()
            .filter(|node| {
                matches!(node.kind, NodeKind::Leaf | NodeKind::LeafList)
            })
            .filter_map(|node| node.value.map(|value| (node.path, value)))
            .collect()
    }

    fn walk(&self, expand_members: bool) -> Vec<DataNode> {
        let mut nodes = Vec::new();
        for module in self.ctx.modules() {
            for node in module.data_nodes() {
                let key = json_key(0, &module.name, &node.name);
                if let Some(value) = self.root.get(&key) {
                    let step = PathElem::new(Some(&module.name), &node.name);
                    walk_node(
                        &mut nodes,
                        &DataPath::default(),
                        step,
                        node,
                        value,
                        expand_members,
                    );
                }
            }
        }
        nodes
    }
}

impl PartialEq for DataTree {
    fn eq(&self, other: &DataTree) -> bool {
        self.root == other.root
    }
}

// ===== impl Change =====

impl Change {
    pub fn new(
        kind: ChangeKind,
        path: DataPath,
        value: Option<Value>,
        prev: Option<Value>,
    ) -> Change {
        Change {
            kind,
            path,
            value,
            prev,
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        match &self.value {
            Some(value) => write!(f, "{kind} {} = {value}", self.path),
            None => write!(f, "{kind} {}", self.path),
        }
    }
}

// ===== global functions =====

/// Computes the edits turning `old` into `new`.
///
/// Removed nodes come first (parents before children), followed by created
/// and modified nodes in tree order. Defaults appear as created or deleted
/// together with their parent. An explicit leaf falling back to its
/// default is reported as deleted.
pub fn diff(old: &DataTree, new: &DataTree, config_only: bool) -> Vec<Change> {
    let old_nodes = old.flatten_with_defaults(config_only);
    let new_nodes = new.flatten_with_defaults(config_only);
    let old_index = old_nodes
        .iter()
        .map(|node| (&node.path, node))
        .collect::<HashMap<_, _>>();
    let new_paths = new_nodes
        .iter()
        .map(|node| &node.path)
        .collect::<HashSet<_>>();

    let mut changes = Vec::new();
    for node in old_nodes.iter().filter(|n| !new_paths.contains(&n.path)) {
        changes.push(Change::new(
            ChangeKind::Deleted,
            node.path.clone(),
            None,
            node.value.clone(),
        ));
    }
    for node in &new_nodes {
        let Some(old) = old_index.get(&node.path) else {
            changes.push(Change::new(
                ChangeKind::Created,
                node.path.clone(),
                node.value.clone(),
                None,
            ));
            continue;
        };
        if node.kind != NodeKind::Leaf {
            continue;
        }
        let kind = match (old.default, node.default) {
            (false, true) => ChangeKind::Deleted,
            (true, false) => ChangeKind::Created,
            _ if old.value != node.value => ChangeKind::Modified,
            _ => continue,
        };
        let value = match kind {
            ChangeKind::Deleted => None,
            _ => node.value.clone(),
        };
        changes.push(Change::new(
            kind,
            node.path.clone(),
            value,
            old.value.clone(),
        ));
    }
    changes
}

/// Textual form of a key or leaf-list member as used in path predicates.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

fn entry_matches(entry: &Value, keys: &[(String, String)]) -> bool {
    keys.iter().all(|(key, value)| {
        entry.get(key).map(key_string).as_deref() == Some(value.as_str())
    })
}

fn entry_keys(node: &SchemaNode, entry: &Value) -> Vec<(String, String)> {
    node.keys
        .iter()
        .filter_map(|key| {
            entry.get(key).map(|value| (key.clone(), key_string(value)))
        })
        .collect()
}

fn malformed(path: &DataPath) -> Error {
    Error::InvalidData(format!("unexpected data shape at {path}"))
}

fn check_keys(
    node: &SchemaNode,
    elem: &PathElem,
    path: &DataPath,
) -> Result<()> {
    if node.keys.iter().any(|key| elem.key(key).is_none()) {
        return Err(Error::InvalidPath(
            path.to_string(),
            format!("missing keys for list {}", node.name),
        ));
    }
    Ok(())
}

// Checks that every list step names all its keys with valid values.
fn check_path_keys(resolved: &Resolved<'_>, path: &DataPath) -> Result<()> {
    for (elem, node) in path.elems().iter().zip(resolved.nodes.iter()) {
        if node.kind != NodeKind::List {
            continue;
        }
        check_keys(node, elem, path)?;
        for (key, value) in &elem.keys {
            if let Some(key_node) = node.find_child(key) {
                let value = Value::String(value.clone());
                key_node.canonicalize(&path.to_string(), &value)?;
            }
        }
    }
    Ok(())
}

// Returns the map holding the node at `upto`, creating containers and list
// entries on the way.
fn walk_create<'m>(
    mut map: &'m mut Map<String, Value>,
    resolved: &Resolved<'_>,
    path: &DataPath,
    upto: usize,
) -> Result<&'m mut Map<String, Value>> {
    for depth in 0..upto {
        let node = resolved.nodes[depth];
        let elem = &path.elems()[depth];
        let key = resolved.json_key(depth);
        map = match node.kind {
            NodeKind::Container => map
                .entry(key)
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| malformed(path))?,
            NodeKind::List => ensure_entry(map, key, node, elem, path)?,
            _ => {
                return Err(Error::InvalidPath(
                    path.to_string(),
                    format!("{} has no children", node.name),
                ));
            }
        };
    }
    Ok(map)
}

// Finds or creates the list entry selected by the step's keys.
fn ensure_entry<'m>(
    map: &'m mut Map<String, Value>,
    key: String,
    node: &SchemaNode,
    elem: &PathElem,
    path: &DataPath,
) -> Result<&'m mut Map<String, Value>> {
    check_keys(node, elem, path)?;
    let entries = map
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| malformed(path))?;
    let pos = match entries
        .iter()
        .position(|entry| entry_matches(entry, &elem.keys))
    {
        Some(pos) => pos,
        None => {
            let mut entry = Map::new();
            for key in &node.keys {
                let key_node = node.find_child(key).ok_or_else(|| {
                    Error::InvalidData(format!("list key {key} not in schema"))
                })?;
                let raw = elem.key(key).unwrap_or_default();
                let raw = Value::String(raw.to_owned());
                let value = key_node.canonicalize(&path.to_string(), &raw)?;
                entry.insert(key.clone(), value);
            }
            entries.push(Value::Object(entry));
            entries.len() - 1
        }
    };
    entries[pos].as_object_mut().ok_or_else(|| malformed(path))
}

fn find_in(
    map: &Map<String, Value>,
    resolved: &Resolved<'_>,
    elems: &[PathElem],
    depth: usize,
    current: &DataPath,
    found: &mut Vec<(DataPath, Value)>,
) {
    let node = resolved.nodes[depth];
    let elem = &elems[depth];
    let last = depth == elems.len() - 1;
    let Some(value) = map.get(&resolved.json_key(depth)) else {
        return;
    };
    let prefix = (depth == 0).then_some(resolved.module.name.as_str());
    let step = PathElem::new(prefix, &node.name);

    match node.kind {
        NodeKind::Container => {
            let path = current.join(step);
            if last {
                found.push((path, value.clone()));
            } else if let Some(object) = value.as_object() {
                find_in(object, resolved, elems, depth + 1, &path, found);
            }
        }
        NodeKind::List => {
            if last && elem.keys.is_empty() {
                found.push((current.join(step), value.clone()));
                return;
            }
            let entries = value.as_array().into_iter().flatten();
            for entry in entries.filter(|e| entry_matches(e, &elem.keys)) {
                let mut step = step.clone();
                step.keys = entry_keys(node, entry);
                let path = current.join(step);
                if last {
                    found.push((path, entry.clone()));
                } else if let Some(object) = entry.as_object() {
                    find_in(object, resolved, elems, depth + 1, &path, found);
                }
            }
        }
        NodeKind::Leaf => {
            found.push((current.join(step), value.clone()));
        }
        NodeKind::LeafList => match elem.member() {
            Some(member) => {
                let selected = value
                    .as_array()
                    .and_then(|a| a.iter().find(|v| key_string(v) == member));
                if let Some(selected) = selected {
                    let step = step.with_key(MEMBER_KEY, member);
                    found.push((current.join(step), selected.clone()));
                }
            }
            None => found.push((current.join(step), value.clone())),
        },
        NodeKind::Notification | NodeKind::Rpc => (),
    }
}

fn merge_node(
    dst: &mut Map<String, Value>,
    key: &str,
    node: &SchemaNode,
    src: &Value,
) {
    match node.kind {
        NodeKind::Container => {
            if let (Some(Value::Object(dst_object)), Some(src_object)) =
                (dst.get_mut(key), src.as_object())
            {
                merge_children(dst_object, node, src_object);
                return;
            }
            dst.insert(key.to_owned(), src.clone());
        }
        NodeKind::List => {
            let Some(src_entries) = src.as_array() else {
                return;
            };
            let Some(dst_entries) = dst
                .entry(key)
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
            else {
                return;
            };
            for src_entry in src_entries {
                let keys = entry_keys(node, src_entry);
                match dst_entries
                    .iter_mut()
                    .find(|entry| entry_matches(entry, &keys))
                {
                    Some(Value::Object(dst_entry)) => {
                        if let Some(src_entry) = src_entry.as_object() {
                            merge_children(dst_entry, node, src_entry);
                        }
                    }
                    _ => dst_entries.push(src_entry.clone()),
                }
            }
        }
        NodeKind::Leaf => {
            dst.insert(key.to_owned(), src.clone());
        }
        NodeKind::LeafList => {
            let Some(src_members) = src.as_array() else {
                return;
            };
            if let Some(dst_members) = dst
                .entry(key)
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
            {
                for member in src_members {
                    if !dst_members.contains(member) {
                        dst_members.push(member.clone());
                    }
                }
            }
        }
        NodeKind::Notification | NodeKind::Rpc => (),
    }
}

fn merge_children(
    dst: &mut Map<String, Value>,
    node: &SchemaNode,
    src: &Map<String, Value>,
) {
    for (key, value) in src {
        if let Some(child) = node.find_child(key) {
            merge_node(dst, key, child, value);
        }
    }
}

fn add_defaults(
    map: &mut Map<String, Value>,
    key: String,
    node: &SchemaNode,
    config_only: bool,
) {
    match node.kind {
        NodeKind::Leaf => {
            if !map.contains_key(&key)
                && let Some(default) = node.default_value()
            {
                map.insert(key, default.clone());
            }
        }
        NodeKind::Container => match map.get_mut(&key) {
            Some(Value::Object(object)) => {
                add_defaults_children(object, node, config_only);
            }
            Some(_) => (),
            None => {
                let mut object = Map::new();
                add_defaults_children(&mut object, node, config_only);
                if !object.is_empty() {
                    map.insert(key, Value::Object(object));
                }
            }
        },
        NodeKind::List => {
            if let Some(Value::Array(entries)) = map.get_mut(&key) {
                for entry in entries {
                    if let Value::Object(object) = entry {
                        add_defaults_children(object, node, config_only);
                    }
                }
            }
        }
        _ => (),
    }
}

fn add_defaults_children(
    map: &mut Map<String, Value>,
    node: &SchemaNode,
    config_only: bool,
) {
    for child in &node.children {
        if !child.is_data() || (config_only && !child.config) {
            continue;
        }
        add_defaults(map, child.name.clone(), child, config_only);
    }
}

// Drops containers, lists and leaf-lists left without content.
fn prune_empty(map: &mut Map<String, Value>) {
    map.retain(|_, value| match value {
        Value::Object(object) => {
            prune_empty(object);
            !object.is_empty()
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::Object(object) = item {
                    prune_empty(object);
                }
            }
            !items.is_empty()
        }
        _ => true,
    });
}

fn walk_node(
    nodes: &mut Vec<DataNode>,
    parent: &DataPath,
    step: PathElem,
    node: &SchemaNode,
    value: &Value,
    expand_members: bool,
) {
    let data_node = |path: DataPath, value: Option<Value>| DataNode {
        path,
        kind: node.kind,
        value,
        default: false,
    };

    match node.kind {
        NodeKind::Container => {
            let path = parent.join(step);
            nodes.push(data_node(path.clone(), None));
            if let Some(object) = value.as_object() {
                walk_children(nodes, &path, node, object, expand_members);
            }
        }
        NodeKind::List => {
            for entry in value.as_array().into_iter().flatten() {
                let mut step = step.clone();
                step.keys = entry_keys(node, entry);
                let path = parent.join(step);
                nodes.push(data_node(path.clone(), None));
                if let Some(object) = entry.as_object() {
                    walk_children(nodes, &path, node, object, expand_members);
                }
            }
        }
        NodeKind::Leaf => {
            nodes.push(data_node(parent.join(step), Some(value.clone())));
        }
        NodeKind::LeafList if expand_members => {
            for member in value.as_array().into_iter().flatten() {
                let step =
                    step.clone().with_key(MEMBER_KEY, &key_string(member));
                nodes.push(data_node(parent.join(step), Some(member.clone())));
            }
        }
        NodeKind::LeafList => {
            nodes.push(data_node(parent.join(step), Some(value.clone())));
        }
        NodeKind::Notification | NodeKind::Rpc => (),
    }
}

fn walk_children(
    nodes: &mut Vec<DataNode>,
    path: &DataPath,
    node: &SchemaNode,
    object: &Map<String, Value>,
    expand_members: bool,
) {
    let keys = node.keys.iter().filter_map(|key| node.find_child(key));
    let others = node.children.iter().filter(|c| !node.is_key(&c.name));
    for child in keys.chain(others) {
        if let Some(value) = object.get(&child.name) {
            let step = PathElem::new(None, &child.name);
            walk_node(nodes, path, step, child, value, expand_members);
        }
    }
}

// Validates JSON data for a schema node, returning its canonical form.
fn canonical_node(
    node: &SchemaNode,
    value: &Value,
    path: &str,
) -> Result<Value> {
    let children = |object: &Map<String, Value>| -> Result<Value> {
        let mut canonical = Map::new();
        for (key, value) in object {
            let child = node.find_child(key).ok_or_else(|| {
                Error::InvalidData(format!("unknown member {key} at {path}"))
            })?;
            let child_path = format!("{path}/{key}");
            let child = canonical_node(child, value, &child_path)?;
            canonical.insert(key.clone(), child);
        }
        Ok(Value::Object(canonical))
    };
    let unexpected = |what: &str| {
        Error::InvalidData(format!("expected {what} at {path}"))
    };

    match node.kind {
        NodeKind::Container => {
            children(value.as_object().ok_or_else(|| unexpected("an object"))?)
        }
        NodeKind::List => {
            let entries =
                value.as_array().ok_or_else(|| unexpected("an array"))?;
            let mut canonical = Vec::with_capacity(entries.len());
            for entry in entries {
                let object = entry
                    .as_object()
                    .ok_or_else(|| unexpected("list entries"))?;
                if let Some(key) =
                    node.keys.iter().find(|key| !object.contains_key(*key))
                {
                    return Err(Error::InvalidData(format!(
                        "list entry without key {key} at {path}"
                    )));
                }
                canonical.push(children(object)?);
            }
            Ok(Value::Array(canonical))
        }
        NodeKind::Leaf => node.canonicalize(path, value),
        NodeKind::LeafList => {
            let members =
                value.as_array().ok_or_else(|| unexpected("an array"))?;
            members
                .iter()
                .map(|member| node.canonicalize(path, member))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        NodeKind::Notification | NodeKind::Rpc => {
            Err(unexpected("a data node"))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{BaseType, LeafType, Module};

    fn context() -> Arc<Context> {
        let module = Module::new("m", "m").node(
            SchemaNode::container("top").child(
                SchemaNode::list("item", &["name"])
                    .child(SchemaNode::leaf("name", LeafType::string()))
                    .child(
                        SchemaNode::container("config")
                            .child(SchemaNode::leaf("name", LeafType::string()))
                            .child(SchemaNode::leaf(
                                "mtu",
                                LeafType::new(BaseType::Uint16)
                                    .with_default(1500),
                            ))
                            .child(SchemaNode::leaf_list(
                                "tags",
                                LeafType::string(),
                            )),
                    )
                    .child(
                        SchemaNode::container("state").state().child(
                            SchemaNode::leaf(
                                "oper-status",
                                LeafType::enumeration(&["UP", "DOWN"]),
                            ),
                        ),
                    ),
            ),
        );
        Arc::new(Context::from_modules([module]).unwrap())
    }

    fn path(path: &str) -> DataPath {
        DataPath::parse(path).unwrap()
    }

    #[test]
    fn set_creates_ancestors() {
        let mut tree = DataTree::new(context());
        let mtu = path("/m:top/item[name='a']/config/mtu");
        tree.set(&mtu, Some(&json!("9000"))).unwrap();
        assert_eq!(
            tree.to_value(),
            json!({"m:top": {"item": [{"name": "a", "config": {"mtu": 9000}}]}})
        );

        // Keys can't change.
        assert!(matches!(
            tree.set(&path("/m:top/item[name='a']/name"), Some(&json!("b"))),
            Err(Error::KeyModified(_))
        ));
        tree.set(&path("/m:top/item[name='a']/name"), Some(&json!("a")))
            .unwrap();
    }

    #[test]
    fn leaf_list_members() {
        let mut tree = DataTree::new(context());
        let tags = path("/m:top/item[name='a']/config/tags");
        tree.set(&tags, Some(&json!("x"))).unwrap();
        tree.set(&path("/m:top/item[name='a']/config/tags[.='y']"), None)
            .unwrap();
        assert!(matches!(
            tree.set(&tags, Some(&json!("x"))),
            Err(Error::NodeExists(_))
        ));

        tree.delete(&path("/m:top/item[name='a']/config/tags[.='x']"))
            .unwrap();
        let found = tree.find(&tags).unwrap();
        assert_eq!(found, vec![(tags.clone(), json!(["y"]))]);
    }

    #[test]
    fn delete_prunes_and_reports_missing() {
        let mut tree = DataTree::new(context());
        let mtu = path("/m:top/item[name='a']/config/mtu");
        tree.set(&mtu, Some(&json!(1000))).unwrap();
        tree.delete(&path("/m:top/item[name='a']")).unwrap();
        assert!(tree.is_empty());
        assert!(matches!(tree.delete(&mtu), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn find_fans_out_over_lists() {
        let ctx = context();
        let tree = DataTree::from_value(
            ctx,
            &json!({"m:top": {"item": [
                {"name": "a", "state": {"oper-status": "UP"}},
                {"name": "b", "state": {"oper-status": "DOWN"}},
            ]}}),
        )
        .unwrap();

        let found = tree.find(&path("/m:top/item/state/oper-status")).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[1].0.to_string(),
            "/m:top/item[name='b']/state/oper-status"
        );

        let filtered = tree.filter(&path("/m:top/item[name='b']")).unwrap();
        assert_eq!(
            filtered.to_value(),
            json!({"m:top": {"item": [
                {"name": "b", "state": {"oper-status": "DOWN"}},
            ]}})
        );
    }

    #[test]
    fn merge_lists_by_key() {
        let ctx = context();
        let mut running = DataTree::from_value(
            ctx.clone(),
            &json!({"m:top": {"item": [{"name": "a", "config": {"mtu": 1000}}]}}),
        )
        .unwrap();
        let state = DataTree::from_value(
            ctx,
            &json!({"m:top": {"item": [{
                "name": "a",
                "state": {"oper-status": "UP"},
            }]}}),
        )
        .unwrap();
        running.merge(&state).unwrap();
        assert_eq!(
            running.to_value(),
            json!({"m:top": {"item": [{
                "name": "a",
                "config": {"mtu": 1000},
                "state": {"oper-status": "UP"},
            }]}})
        );
    }

    #[test]
    fn from_value_rejects_unknown_members() {
        let ctx = context();
        let unknown = json!({"m:nope": {}});
        assert!(DataTree::from_value(ctx.clone(), &unknown).is_err());
        assert!(
            DataTree::from_value(ctx, &json!({"m:top": {"item": [{"mtu": 1}]}}))
                .is_err()
        );
    }

    #[test]
    fn diff_reports_defaults_with_their_parent() {
        let ctx = context();
        let old = DataTree::new(ctx.clone());
        let mut new = DataTree::new(ctx);
        new.set(
            &path("/m:top/item[name='a']/config/name"),
            Some(&json!("a")),
        )
        .unwrap();

        let changes = diff(&old, &new, true)
            .into_iter()
            .map(|change| change.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            changes,
            vec![
                "created /m:top",
                "created /m:top/item[name='a']",
                "created /m:top/item[name='a']/name = \"a\"",
                "created /m:top/item[name='a']/config",
                "created /m:top/item[name='a']/config/name = \"a\"",
                "created /m:top/item[name='a']/config/mtu = 1500",
            ]
        );
    }

    #[test]
    fn diff_explicit_default_transitions() {
        let ctx = context();
        let mtu = path("/m:top/item[name='a']/config/mtu");
        let mut old = DataTree::new(ctx);
        old.set(&path("/m:top/item[name='a']/config/name"), Some(&json!("a")))
            .unwrap();
        let mut new = old.clone();
        new.set(&mtu, Some(&json!(9000))).unwrap();

        let changes = diff(&old, &new, true);
        assert_eq!(
            changes,
            vec![Change::new(
                ChangeKind::Created,
                mtu.clone(),
                Some(json!(9000)),
                Some(json!(1500)),
            )]
        );

        let changes = diff(&new, &old, true);
        assert_eq!(
            changes,
            vec![Change::new(
                ChangeKind::Deleted,
                mtu,
                None,
                Some(json!(9000)),
            )]
        );
    }

    #[test]
    fn leaves_keep_leaf_lists_whole() {
        let ctx = context();
        let tree = DataTree::from_value(
            ctx,
            &json!({"m:top": {"item": [
                {"name": "a", "config": {"tags": ["x", "y"]}},
            ]}}),
        )
        .unwrap();
        let leaves = tree.leaves();
        assert_eq!(
            leaves,
            vec![
                (path("/m:top/item[name='a']/name"), json!("a")),
                (path("/m:top/item[name='a']/config/tags"), json!(["x", "y"])),
            ]
        );
    }
}
