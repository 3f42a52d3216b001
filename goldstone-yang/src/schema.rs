//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::path::{DataPath, MEMBER_KEY};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Notification,
    Rpc,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    String,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64,
    Enumeration,
    Empty,
}

/// Type of a leaf or leaf-list.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeafType {
    pub base: BaseType,
    #[serde(default)]
    pub range: Option<(i64, i64)>,
    #[serde(default)]
    pub enums: Vec<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Node of a module's schema tree.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaNode {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default = "config_default")]
    pub config: bool,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub leaf_type: Option<LeafType>,
    // Preferred sampling interval in nanoseconds.
    #[serde(default)]
    pub sample_interval: Option<u64>,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Module {
    pub name: String,
    pub prefix: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub nodes: Vec<SchemaNode>,
}

/// Loaded schema modules, kept in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Context {
    modules: Vec<Module>,
}

/// Schema nodes visited while resolving a path.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub module: &'a Module,
    pub nodes: Vec<&'a SchemaNode>,
}

// ===== impl BaseType =====

impl BaseType {
    // Value space of the integer types.
    fn bounds(&self) -> Option<RangeInclusive<i128>> {
        let bounds = match self {
            BaseType::Int8 => i8::MIN as i128..=i8::MAX as i128,
            BaseType::Int16 => i16::MIN as i128..=i16::MAX as i128,
            BaseType::Int32 => i32::MIN as i128..=i32::MAX as i128,
            BaseType::Int64 => i64::MIN as i128..=i64::MAX as i128,
            BaseType::Uint8 => 0..=u8::MAX as i128,
            BaseType::Uint16 => 0..=u16::MAX as i128,
            BaseType::Uint32 => 0..=u32::MAX as i128,
            BaseType::Uint64 => 0..=u64::MAX as i128,
            _ => return None,
        };
        Some(bounds)
    }
}

// ===== impl LeafType =====

impl LeafType {
    pub fn new(base: BaseType) -> LeafType {
        LeafType {
            base,
            range: None,
            enums: Vec::new(),
            default: None,
        }
    }

    pub fn string() -> LeafType {
        LeafType::new(BaseType::String)
    }

    pub fn boolean() -> LeafType {
        LeafType::new(BaseType::Boolean)
    }

    pub fn enumeration(enums: &[&str]) -> LeafType {
        let mut leaf_type = LeafType::new(BaseType::Enumeration);
        leaf_type.enums = enums.iter().map(|e| (*e).to_owned()).collect();
        leaf_type
    }

    pub fn with_range(mut self, min: i64, max: i64) -> LeafType {
        self.range = Some((min, max));
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> LeafType {
        self.default = Some(default.into());
        self
    }

    /// Effective numeric range: the declared range, else the type bounds.
    pub fn bounds(&self) -> Option<RangeInclusive<i128>> {
        match self.range {
            Some((min, max)) => Some(min as i128..=max as i128),
            None => self.base.bounds(),
        }
    }

    /// Checks a value against this type and returns its canonical JSON
    /// form.
    pub fn canonicalize(
        &self,
        value: &Value,
    ) -> std::result::Result<Value, String> {
        match self.base {
            BaseType::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err("expected a string".to_owned()),
            },
            BaseType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s == "false" => Ok(Value::Bool(false)),
                _ => Err("expected a boolean".to_owned()),
            },
            BaseType::Enumeration => match value {
                Value::String(s) if self.enums.contains(s) => {
                    Ok(value.clone())
                }
                Value::String(s) => Err(format!(
                    "unknown enum {s}, expected one of {:?}",
                    self.enums
                )),
                _ => Err("expected an enum string".to_owned()),
            },
            BaseType::Decimal64 => {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse::<f64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| "expected a decimal number".to_owned())?;
                if let Some((min, max)) = self.range
                    && (number < min as f64 || number > max as f64)
                {
                    return Err(format!("{number} out of range {min}..{max}"));
                }
                serde_json::Number::from_f64(number)
                    .map(Value::Number)
                    .ok_or_else(|| "not a finite number".to_owned())
            }
            BaseType::Empty => match value {
                Value::Null => Ok(Value::Null),
                Value::Array(a) if a.len() == 1 && a[0].is_null() => {
                    Ok(Value::Null)
                }
                _ => Err("expected an empty value".to_owned()),
            },
            _ => {
                let number = match value {
                    Value::Number(n) => n
                        .as_i64()
                        .map(i128::from)
                        .or_else(|| n.as_u64().map(i128::from)),
                    Value::String(s) => s.parse::<i128>().ok(),
                    _ => None,
                }
                .ok_or_else(|| "expected an integer".to_owned())?;
                if let Some(bounds) = self.bounds()
                    && !bounds.contains(&number)
                {
                    return Err(format!(
                        "{number} out of range {}..{}",
                        bounds.start(),
                        bounds.end()
                    ));
                }
                let number = if number < 0 {
                    serde_json::Number::from(number as i64)
                } else {
                    serde_json::Number::from(number as u64)
                };
                Ok(Value::Number(number))
            }
        }
    }
}

// ===== impl SchemaNode =====

impl SchemaNode {
    fn new(name: &str, kind: NodeKind) -> SchemaNode {
        SchemaNode {
            name: name.to_owned(),
            kind,
            config: true,
            keys: Vec::new(),
            leaf_type: None,
            sample_interval: None,
            children: Vec::new(),
        }
    }

    pub fn container(name: &str) -> SchemaNode {
        SchemaNode::new(name, NodeKind::Container)
    }

    pub fn list(name: &str, keys: &[&str]) -> SchemaNode {
        let mut node = SchemaNode::new(name, NodeKind::List);
        node.keys = keys.iter().map(|k| (*k).to_owned()).collect();
        node
    }

    pub fn leaf(name: &str, leaf_type: LeafType) -> SchemaNode {
        let mut node = SchemaNode::new(name, NodeKind::Leaf);
        node.leaf_type = Some(leaf_type);
        node
    }

    pub fn leaf_list(name: &str, leaf_type: LeafType) -> SchemaNode {
        let mut node = SchemaNode::new(name, NodeKind::LeafList);
        node.leaf_type = Some(leaf_type);
        node
    }

    pub fn notification(name: &str) -> SchemaNode {
        let mut node = SchemaNode::new(name, NodeKind::Notification);
        node.config = false;
        node
    }

    pub fn rpc(name: &str) -> SchemaNode {
        let mut node = SchemaNode::new(name, NodeKind::Rpc);
        node.config = false;
        node
    }

    /// Appends a child. Children of state nodes are state nodes too.
    pub fn child(mut self, mut child: SchemaNode) -> SchemaNode {
        if !self.config {
            child.set_state();
        }
        self.children.push(child);
        self
    }

    /// Marks the subtree as operational state (`config false`).
    pub fn state(mut self) -> SchemaNode {
        self.set_state();
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> SchemaNode {
        self.sample_interval = Some(interval.as_nanos() as u64);
        self
    }

    fn set_state(&mut self) {
        self.config = false;
        for child in &mut self.children {
            child.set_state();
        }
    }

    pub fn find_child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.keys.iter().any(|key| key == name)
    }

    /// Whether instances of this node can be stored in a datastore view.
    pub fn is_data(&self) -> bool {
        !matches!(self.kind, NodeKind::Notification | NodeKind::Rpc)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.leaf_type.as_ref().and_then(|t| t.default.as_ref())
    }

    /// Canonicalizes a value for this leaf or leaf-list.
    pub fn canonicalize(&self, path: &str, value: &Value) -> Result<Value> {
        let leaf_type = self.leaf_type.as_ref().ok_or_else(|| {
            Error::InvalidValue(path.to_owned(), "not a leaf".to_owned())
        })?;
        leaf_type
            .canonicalize(value)
            .map_err(|reason| Error::InvalidValue(path.to_owned(), reason))
    }
}

fn config_default() -> bool {
    true
}

// ===== impl Module =====

impl Module {
    pub fn new(name: &str, prefix: &str) -> Module {
        Module {
            name: name.to_owned(),
            prefix: prefix.to_owned(),
            revision: None,
            nodes: Vec::new(),
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Module {
        self.revision = Some(revision.to_owned());
        self
    }

    pub fn node(mut self, node: SchemaNode) -> Module {
        self.nodes.push(node);
        self
    }

    pub fn find_node(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// First top-level container, where the module's data is rooted.
    pub fn top_container(&self) -> Option<&SchemaNode> {
        self.nodes
            .iter()
            .find(|node| node.kind == NodeKind::Container)
    }

    /// Top-level nodes holding data (no RPCs or notifications).
    pub fn data_nodes(&self) -> impl Iterator<Item = &SchemaNode> + '_ {
        self.nodes.iter().filter(|node| node.is_data())
    }
}

// ===== impl Context =====

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn from_modules(
        modules: impl IntoIterator<Item = Module>,
    ) -> Result<Context> {
        let mut ctx = Context::new();
        for module in modules {
            ctx.add_module(module)?;
        }
        Ok(ctx)
    }

    pub fn add_module(&mut self, module: Module) -> Result<()> {
        if self.module(&module.name).is_some() {
            return Err(Error::ModuleExists(module.name));
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> + '_ {
        self.modules.iter()
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|module| module.name == name)
    }

    /// Position of a module in declaration order.
    pub fn module_index(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|module| module.name == name)
    }

    /// Resolves a top-level JSON member name (`module:node`).
    pub fn find_top_node(
        &self,
        json_key: &str,
    ) -> Option<(&Module, &SchemaNode)> {
        let (module, name) = json_key.split_once(':')?;
        let module = self.module(module)?;
        let node = module.find_node(name)?;
        Some((module, node))
    }

    /// Resolves every step of a path to its schema node.
    ///
    /// The first step may omit its module prefix when the top-level node
    /// name is unique. Key predicates must name keys of the list, or `.`
    /// for leaf-list members.
    pub fn resolve(&self, path: &DataPath) -> Result<Resolved<'_>> {
        let unknown = || Error::UnknownNode(path.to_string());
        let first = path.first().ok_or_else(unknown)?;
        let (module, top) = match &first.prefix {
            Some(prefix) => {
                let module = self
                    .module(prefix)
                    .ok_or_else(|| Error::UnknownModule(prefix.clone()))?;
                let top = module.find_node(&first.name).ok_or_else(unknown)?;
                (module, top)
            }
            None => self
                .modules
                .iter()
                .find_map(|module| {
                    module.find_node(&first.name).map(|node| (module, node))
                })
                .ok_or_else(unknown)?,
        };

        let mut nodes = vec![top];
        for elem in &path.elems()[1..] {
            let parent = nodes[nodes.len() - 1];
            let node = parent.find_child(&elem.name).ok_or_else(unknown)?;
            nodes.push(node);
        }

        for (elem, node) in path.elems().iter().zip(nodes.iter()) {
            for (key, _) in &elem.keys {
                let valid = match node.kind {
                    NodeKind::List => node.is_key(key),
                    NodeKind::LeafList => key == MEMBER_KEY,
                    _ => false,
                };
                if !valid {
                    return Err(Error::InvalidPath(
                        path.to_string(),
                        format!("unexpected predicate on {}", elem.name),
                    ));
                }
            }
        }

        Ok(Resolved { module, nodes })
    }

    pub fn find_node(&self, path: &str) -> Result<&SchemaNode> {
        let path = DataPath::parse(path)?;
        self.resolve(&path).map(|resolved| resolved.node())
    }

    pub fn find_module(&self, path: &DataPath) -> Result<&Module> {
        self.resolve(path).map(|resolved| resolved.module)
    }

    /// Schema default of a leaf, if any.
    pub fn default_value(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.find_node(path)?.default_value().cloned())
    }

    /// Effective numeric range of a leaf.
    pub fn range(&self, path: &str) -> Result<Option<RangeInclusive<i128>>> {
        Ok(self
            .find_node(path)?
            .leaf_type
            .as_ref()
            .and_then(LeafType::bounds))
    }

    /// Enumeration values accepted by a leaf.
    pub fn enums(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .find_node(path)?
            .leaf_type
            .as_ref()
            .map(|t| t.enums.clone())
            .unwrap_or_default())
    }
}

// ===== impl Resolved =====

impl<'a> Resolved<'a> {
    /// Schema node of the last step.
    pub fn node(&self) -> &'a SchemaNode {
        self.nodes[self.nodes.len() - 1]
    }

    /// Name used for the node at `depth` in JSON instance data.
    pub fn json_key(&self, depth: usize) -> String {
        json_key(depth, &self.module.name, &self.nodes[depth].name)
    }
}

// ===== global functions =====

/// JSON member name: top-level nodes are module-qualified.
pub(crate) fn json_key(depth: usize, module: &str, name: &str) -> String {
    if depth == 0 {
        format!("{module}:{name}")
    } else {
        name.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> Context {
        Context::from_modules([Module::new("m", "m").node(
            SchemaNode::container("top")
                .child(
                    SchemaNode::list("item", &["name"])
                        .child(SchemaNode::leaf("name", LeafType::string()))
                        .child(SchemaNode::leaf(
                            "mtu",
                            LeafType::new(BaseType::Uint16)
                                .with_range(64, 9000)
                                .with_default(1500),
                        )),
                )
                .child(
                    SchemaNode::container("status").state().child(
                        SchemaNode::leaf(
                            "oper",
                            LeafType::enumeration(&["UP", "DOWN"]),
                        ),
                    ),
                ),
        )])
        .unwrap()
    }

    #[test]
    fn resolve_paths() {
        let ctx = context();
        let node = ctx.find_node("/m:top/item[name='a']/mtu").unwrap();
        assert_eq!(node.kind, NodeKind::Leaf);
        assert_eq!(ctx.find_node("/top/status/oper").unwrap().name, "oper");
        assert!(!ctx.find_node("/top/status/oper").unwrap().config);
        assert!(matches!(
            ctx.find_node("/x:top"),
            Err(Error::UnknownModule(_))
        ));
        assert!(matches!(
            ctx.find_node("/m:top/nothing"),
            Err(Error::UnknownNode(_))
        ));
        assert!(matches!(
            ctx.find_node("/m:top/item[mtu='1']"),
            Err(Error::InvalidPath(..))
        ));
    }

    #[test]
    fn leaf_helpers() {
        let ctx = context();
        assert_eq!(
            ctx.default_value("/m:top/item/mtu").unwrap(),
            Some(json!(1500))
        );
        assert_eq!(ctx.range("/m:top/item/mtu").unwrap(), Some(64..=9000));
        assert_eq!(ctx.enums("/m:top/status/oper").unwrap(), ["UP", "DOWN"]);
    }

    #[test]
    fn canonicalize_values() {
        let uint16 = LeafType::new(BaseType::Uint16).with_range(64, 9000);
        assert_eq!(uint16.canonicalize(&json!("1500")), Ok(json!(1500)));
        assert!(uint16.canonicalize(&json!(10)).is_err());
        assert!(uint16.canonicalize(&json!("abc")).is_err());

        let int8 = LeafType::new(BaseType::Int8);
        assert_eq!(int8.canonicalize(&json!(-5)), Ok(json!(-5)));
        assert!(int8.canonicalize(&json!(200)).is_err());

        let boolean = LeafType::boolean();
        assert_eq!(boolean.canonicalize(&json!("true")), Ok(json!(true)));

        let enumeration = LeafType::enumeration(&["UP", "DOWN"]);
        assert!(enumeration.canonicalize(&json!("UP")).is_ok());
        assert!(enumeration.canonicalize(&json!("SIDEWAYS")).is_err());
    }
}
