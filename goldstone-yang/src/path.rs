//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Optionally prefixed node identifier.
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([A-Za-z_][-\w.]*):)?([A-Za-z_][-\w.]*|\*)$").unwrap()
});

// Name of the predicate used to select leaf-list members.
pub const MEMBER_KEY: &str = ".";

/// One step of a data path.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PathElem {
    pub prefix: Option<String>,
    pub name: String,
    pub keys: Vec<(String, String)>,
}

/// Schema-qualified location of a data node.
///
/// Keys are carried for list entries and leaf-list members; schema lookups
/// ignore them.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataPath(Vec<PathElem>);

// Cursor over the textual path.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

// ===== impl PathElem =====

impl PathElem {
    pub fn new(prefix: Option<&str>, name: &str) -> PathElem {
        PathElem {
            prefix: prefix.map(str::to_owned),
            name: name.to_owned(),
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: &str, value: &str) -> PathElem {
        self.keys.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Returns the value of the given key predicate.
    pub fn key(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the selected member for leaf-list steps.
    pub fn member(&self) -> Option<&str> {
        self.key(MEMBER_KEY)
    }

    // Keys present in both steps must agree.
    fn keys_compatible(&self, other: &PathElem) -> bool {
        self.keys.iter().all(|(name, value)| {
            other.key(name).is_none_or(|other_value| other_value == value)
        })
    }

    fn same_node(&self, other: &PathElem) -> bool {
        if self.name != other.name && self.name != "*" && other.name != "*" {
            return false;
        }
        match (&self.prefix, &other.prefix) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl std::fmt::Display for PathElem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}:")?;
        }
        write!(f, "{}", self.name)?;
        for (key, value) in &self.keys {
            if value.contains('\'') {
                write!(f, "[{key}=\"{value}\"]")?;
            } else {
                write!(f, "[{key}='{value}']")?;
            }
        }
        Ok(())
    }
}

// ===== impl DataPath =====

impl DataPath {
    pub fn parse(path: &str) -> Result<DataPath> {
        xpath_split(path).map(DataPath)
    }

    pub fn from_elems(elems: Vec<PathElem>) -> DataPath {
        DataPath(elems)
    }

    pub fn elems(&self) -> &[PathElem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&PathElem> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&PathElem> {
        self.0.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut PathElem> {
        self.0.last_mut()
    }

    pub fn push(&mut self, elem: PathElem) {
        self.0.push(elem);
    }

    /// Returns a copy of this path extended by one step.
    pub fn join(&self, elem: PathElem) -> DataPath {
        let mut path = self.clone();
        path.push(elem);
        path
    }

    pub fn parent(&self) -> Option<DataPath> {
        match self.0.len() {
            0 => None,
            len => Some(DataPath(self.0[..len - 1].to_vec())),
        }
    }

    /// Module named by the first step, if qualified.
    pub fn module(&self) -> Option<&str> {
        self.first().and_then(|elem| elem.prefix.as_deref())
    }

    /// Node names along the path, without prefixes or keys.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|elem| elem.name.as_str())
    }

    /// Checks whether `prefix` selects this path or one of its ancestors.
    ///
    /// Steps without keys in `prefix` match any list entry.
    pub fn starts_with(&self, prefix: &DataPath) -> bool {
        prefix.len() <= self.len()
            && prefix.0.iter().zip(self.0.iter()).all(|(p, elem)| {
                p.same_node(elem)
                    && p.keys.iter().all(|(name, value)| {
                        elem.key(name) == Some(value.as_str())
                    })
            })
    }

    /// Checks whether either path contains the other, considering only
    /// the keys both of them carry.
    pub fn intersects(&self, other: &DataPath) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| {
            a.same_node(b) && a.keys_compatible(b) && b.keys_compatible(a)
        })
    }

    /// Path without key predicates.
    pub fn schema_path(&self) -> String {
        self.0
            .iter()
            .map(|elem| match &elem.prefix {
                Some(prefix) => format!("/{prefix}:{}", elem.name),
                None => format!("/{}", elem.name),
            })
            .join("")
    }
}

impl std::fmt::Display for DataPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for elem in &self.0 {
            write!(f, "/{elem}")?;
        }
        Ok(())
    }
}

impl FromStr for DataPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<DataPath> {
        DataPath::parse(s)
    }
}

impl TryFrom<String> for DataPath {
    type Error = Error;

    fn try_from(s: String) -> Result<DataPath> {
        DataPath::parse(&s)
    }
}

impl From<DataPath> for String {
    fn from(path: DataPath) -> String {
        path.to_string()
    }
}

// ===== impl Scanner =====

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }
}

// ===== global functions =====

/// Splits a data path into `(prefix, name, keys)` steps.
///
/// Key values are quoted with either `'` or `"` and may contain any other
/// character, including `/` and `]`.
pub fn xpath_split(path: &str) -> Result<Vec<PathElem>> {
    let error = |reason: &str| {
        Error::InvalidPath(path.to_owned(), reason.to_owned())
    };
    let mut scanner = Scanner {
        input: path.strip_prefix('/').unwrap_or(path),
        pos: 0,
    };
    let mut elems = Vec::new();

    if scanner.input.is_empty() {
        return Err(error("empty path"));
    }

    loop {
        let ident = scanner
            .take_while(|c| c != '/' && c != '[' && !c.is_whitespace());
        let caps = IDENTIFIER
            .captures(ident)
            .ok_or_else(|| error("invalid node identifier"))?;
        let mut elem = PathElem::new(
            caps.get(1).map(|m| m.as_str()),
            caps.get(2).map(|m| m.as_str()).unwrap_or_default(),
        );

        while scanner.eat('[') {
            scanner.skip_ws();
            let key = scanner
                .take_while(|c| c != '=' && c != ']' && !c.is_whitespace());
            // Key names may be module-qualified.
            let key = key.rsplit(':').next().unwrap_or(key);
            if key != MEMBER_KEY && !IDENTIFIER.is_match(key) {
                return Err(error("invalid key name"));
            }
            scanner.skip_ws();
            if !scanner.eat('=') {
                return Err(error("expected '=' in predicate"));
            }
            scanner.skip_ws();
            let quote = match scanner.bump() {
                Some(quote @ ('\'' | '"')) => quote,
                _ => return Err(error("expected quoted key value")),
            };
            let value = scanner.take_while(|c| c != quote);
            if !scanner.eat(quote) {
                return Err(error("unterminated key value"));
            }
            scanner.skip_ws();
            if !scanner.eat(']') {
                return Err(error("expected ']'"));
            }
            elem.keys.push((key.to_owned(), value.to_owned()));
        }
        elems.push(elem);

        match scanner.bump() {
            None => break,
            Some('/') if scanner.peek().is_some() => continue,
            Some('/') => return Err(error("trailing '/'")),
            Some(_) => return Err(error("unexpected character")),
        }
    }

    Ok(elems)
}
