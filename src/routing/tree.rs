//! Path-segment route tree.
//!
//! # Responsibilities
//! - Store endpoints keyed by (path segments, HTTP method)
//! - Resolve a request path to an endpoint plus captured parameters
//! - Distinguish "no such path" from "path exists, method not allowed"
//!
//! # Design Decisions
//! - Child precedence is literal > regex > parameter (most specific wins)
//! - Backtracking walk: a dead end under a literal child falls back to regex, then parameter
//! - One regex slot and one parameter slot per node
//! - Lookups take `&self` only; the tree is frozen before it is shared

use std::borrow::Cow;
use std::collections::HashMap;

use axum::http::Method;
use regex::Regex;

use crate::routing::pattern::{decode_segment, parse_pattern, split_path, SegmentSpec};
use crate::routing::RouteError;

/// Parameters captured while walking the tree, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Value captured for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of a tree lookup.
#[derive(Debug)]
pub enum Lookup<'t, T> {
    /// Path and method matched.
    Found { value: &'t T, params: Params },
    /// Path matched but no endpoint for this method.
    MethodNotAllowed { allowed: Vec<Method> },
    /// No node matched the path.
    NotFound,
}

#[derive(Debug)]
struct Leaf<T> {
    value: T,
    names: Vec<String>,
}

#[derive(Debug)]
struct PatternChild<T> {
    regex: Regex,
    node: Box<Node<T>>,
}

#[derive(Debug)]
struct Node<T> {
    literals: HashMap<String, Node<T>>,
    pattern: Option<PatternChild<T>>,
    param: Option<Box<Node<T>>>,
    endpoints: HashMap<Method, Leaf<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            pattern: None,
            param: None,
            endpoints: HashMap::new(),
        }
    }
}

impl<T> Node<T> {
    fn allowed(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.endpoints.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    fn search<'t>(
        &'t self,
        segments: &[&str],
        method: &Method,
        captures: &mut Vec<String>,
        path_match: &mut Option<&'t Node<T>>,
    ) -> Option<&'t Leaf<T>> {
        let Some((head, rest)) = segments.split_first() else {
            if let Some(leaf) = self.endpoints.get(method) {
                return Some(leaf);
            }
            if !self.endpoints.is_empty() && path_match.is_none() {
                *path_match = Some(self);
            }
            return None;
        };

        if let Some(child) = self.literals.get(*head) {
            if let Some(leaf) = child.search(rest, method, captures, path_match) {
                return Some(leaf);
            }
        }

        if let Some(child) = &self.pattern {
            if child.regex.is_match(head) {
                captures.push((*head).to_string());
                if let Some(leaf) = child.node.search(rest, method, captures, path_match) {
                    return Some(leaf);
                }
                captures.pop();
            }
        }

        if let Some(child) = &self.param {
            captures.push((*head).to_string());
            if let Some(leaf) = child.search(rest, method, captures, path_match) {
                return Some(leaf);
            }
            captures.pop();
        }

        None
    }
}

/// Trie mapping path segments and methods to endpoints.
#[derive(Debug)]
pub struct RouteTree<T> {
    root: Node<T>,
    routes: usize,
}

impl<T> Default for RouteTree<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            routes: 0,
        }
    }
}

impl<T: Clone> RouteTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` for every method in `methods`.
    ///
    /// Nothing is inserted if any (path, method) pair is already taken.
    pub fn insert(&mut self, pattern: &str, methods: &[Method], value: T) -> Result<(), RouteError> {
        if methods.is_empty() {
            return Err(RouteError::NoMethods(pattern.to_string()));
        }

        let specs = parse_pattern(pattern)?;
        let names: Vec<String> = specs.iter().filter_map(|s| s.name().map(str::to_string)).collect();

        let mut node = &mut self.root;
        for spec in specs {
            node = match spec {
                SegmentSpec::Literal(literal) => node.literals.entry(literal).or_default(),
                SegmentSpec::Param(_) => &mut **node.param.get_or_insert_with(Box::default),
                SegmentSpec::Pattern { regex, .. } => {
                    if let Some(existing) = &node.pattern {
                        if existing.regex.as_str() != regex.as_str() {
                            return Err(RouteError::ConflictingPattern {
                                pattern: pattern.to_string(),
                                existing: existing.regex.as_str().to_string(),
                            });
                        }
                    }
                    let child = node.pattern.get_or_insert_with(|| PatternChild {
                        regex,
                        node: Box::default(),
                    });
                    &mut *child.node
                }
            };
        }

        let mut unique: Vec<&Method> = Vec::with_capacity(methods.len());
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }

        if let Some(taken) = unique.iter().find(|m| node.endpoints.contains_key(**m)) {
            return Err(RouteError::Duplicate {
                method: (*taken).clone(),
                pattern: pattern.to_string(),
            });
        }

        for method in unique {
            node.endpoints.insert(
                method.clone(),
                Leaf {
                    value: value.clone(),
                    names: names.clone(),
                },
            );
            self.routes += 1;
        }
        Ok(())
    }
}

impl<T> RouteTree<T> {
    /// Resolve `path` and `method` to an endpoint.
    pub fn lookup(&self, path: &str, method: &Method) -> Lookup<'_, T> {
        let decoded: Vec<Cow<'_, str>> = split_path(path).into_iter().map(decode_segment).collect();
        let segments: Vec<&str> = decoded.iter().map(|s| s.as_ref()).collect();
        let mut captures = Vec::with_capacity(segments.len());
        let mut path_match = None;

        match self.root.search(&segments, method, &mut captures, &mut path_match) {
            Some(leaf) => Lookup::Found {
                value: &leaf.value,
                params: Params(leaf.names.iter().cloned().zip(captures).collect()),
            },
            None => match path_match {
                Some(node) => Lookup::MethodNotAllowed {
                    allowed: node.allowed(),
                },
                None => Lookup::NotFound,
            },
        }
    }

    /// Number of registered (path, method) pairs.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }
}
