//! API specification lookups and name resolution.
//!
//! Specs are consumed through the [`ApiSpecs`] trait as an opaque lookup
//! keyed by path templates (`products/{id}/items`, with `""` for the API
//! root). Resource nodes never query specs directly; they go through a
//! [`Resolver`], which is either permissive (any name resolves) or strict
//! (names must be declared by the specs).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::Method;

/// Lookup interface over an API description.
pub trait ApiSpecs: Send + Sync {
    /// Whether `method` on the concrete `path` is a known operation.
    fn exists(&self, method: &Method, path: &str) -> bool;

    /// Names of the top-level namespaces.
    fn namespaces(&self) -> BTreeSet<String>;

    /// Names of the collections directly below the node at `node`.
    fn collections_of(&self, node: &str) -> BTreeSet<String>;

    /// Names of the actions directly below the node at `node`.
    fn actions_of(&self, node: &str) -> BTreeSet<String>;

    /// Opaque metadata describing an operation on a node.
    fn operation_spec(&self, _node: &str, _operation: &str) -> Option<Value> {
        None
    }
}

/// Replace every `{param}` segment with `{}` and strip surrounding slashes.
fn normalize_template(template: &str) -> String {
    template
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('{') && s.ends_with('}') {
                "{}"
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn split_parent(template: &str) -> (&str, &str) {
    template.rsplit_once('/').unwrap_or(("", template))
}

fn template_matches(template: &str, path: &str) -> bool {
    let path = path.split('?').next().unwrap_or_default().trim_matches('/');
    let mut expected = template.split('/').filter(|s| !s.is_empty());
    let mut actual = path.split('/').filter(|s| !s.is_empty());
    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return true,
            (Some("{}"), Some(_)) => continue,
            (Some(e), Some(a)) if e == a => continue,
            _ => return false,
        }
    }
}

/// In-memory [`ApiSpecs`] built from path templates.
///
/// ```
/// use rest_fluent::{ApiSpecs, Method, StaticSpecs};
///
/// let specs = StaticSpecs::new()
///     .collection("products")
///     .collection("products/{id}/items")
///     .action("products/{id}/endsale")
///     .operation(Method::GET, "products/{id}");
///
/// assert!(specs.exists(&Method::GET, "products/PRD-1?select(name)"));
/// assert!(specs.collections_of("products/{product_id}").contains("items"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticSpecs {
    namespaces: BTreeSet<String>,
    collections: BTreeSet<String>,
    actions: BTreeSet<String>,
    operations: BTreeSet<(String, String)>,
    operation_specs: BTreeMap<(String, String), Value>,
}

impl StaticSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a top-level namespace.
    pub fn namespace(mut self, name: impl Into<String>) -> Self {
        self.namespaces.insert(name.into());
        self
    }

    /// Declare a collection. Also registers `GET` (search) and `POST`
    /// (create) on it and `GET`/`PUT`/`DELETE` on its items.
    pub fn collection(mut self, template: &str) -> Self {
        let template = normalize_template(template);
        let item = format!("{}/{{}}", template);
        for method in [Method::GET, Method::POST] {
            self.operations
                .insert((method.as_str().to_string(), template.clone()));
        }
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            self.operations
                .insert((method.as_str().to_string(), item.clone()));
        }
        self.collections.insert(template);
        self
    }

    /// Declare an action. Also registers `GET`/`POST`/`PUT`/`DELETE` on it.
    pub fn action(mut self, template: &str) -> Self {
        let template = normalize_template(template);
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            self.operations
                .insert((method.as_str().to_string(), template.clone()));
        }
        self.actions.insert(template);
        self
    }

    /// Declare a single operation.
    pub fn operation(mut self, method: Method, template: &str) -> Self {
        self.operations
            .insert((method.as_str().to_string(), normalize_template(template)));
        self
    }

    /// Attach metadata to a named operation on a node.
    pub fn with_operation_spec(mut self, template: &str, operation: &str, spec: Value) -> Self {
        self.operation_specs
            .insert((normalize_template(template), operation.to_string()), spec);
        self
    }

    fn children_of(set: &BTreeSet<String>, node: &str) -> BTreeSet<String> {
        let node = normalize_template(node);
        set.iter()
            .filter_map(|template| {
                let (parent, name) = split_parent(template);
                (parent == node).then(|| name.to_string())
            })
            .collect()
    }
}

impl ApiSpecs for StaticSpecs {
    fn exists(&self, method: &Method, path: &str) -> bool {
        let method = method.as_str();
        self.operations
            .iter()
            .any(|(m, template)| m.eq_ignore_ascii_case(method) && template_matches(template, path))
    }

    fn namespaces(&self) -> BTreeSet<String> {
        self.namespaces.clone()
    }

    fn collections_of(&self, node: &str) -> BTreeSet<String> {
        Self::children_of(&self.collections, node)
    }

    fn actions_of(&self, node: &str) -> BTreeSet<String> {
        Self::children_of(&self.actions, node)
    }

    fn operation_spec(&self, node: &str, operation: &str) -> Option<Value> {
        self.operation_specs
            .get(&(normalize_template(node), operation.to_string()))
            .cloned()
    }
}

/// Kind of child a node can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Namespace,
    Collection,
    Action,
}

impl ChildKind {
    fn label(&self) -> &'static str {
        match self {
            ChildKind::Namespace => "namespace",
            ChildKind::Collection => "collection",
            ChildKind::Action => "action",
        }
    }
}

/// Name-resolution strategy injected into every resource node.
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Accept or reject `name` as a child of the node at template `parent`.
    fn resolve(&self, parent: &str, kind: ChildKind, name: &str) -> Result<()>;

    /// Names known below `parent`, or `None` when nothing is known.
    fn known(&self, parent: &str, kind: ChildKind) -> Option<BTreeSet<String>>;

    /// Metadata for an operation on the node at `node`.
    fn operation_spec(&self, node: &str, operation: &str) -> Option<Value>;
}

/// Accepts every name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveResolver;

impl Resolver for PermissiveResolver {
    fn resolve(&self, _parent: &str, _kind: ChildKind, _name: &str) -> Result<()> {
        Ok(())
    }

    fn known(&self, _parent: &str, _kind: ChildKind) -> Option<BTreeSet<String>> {
        None
    }

    fn operation_spec(&self, _node: &str, _operation: &str) -> Option<Value> {
        None
    }
}

/// Accepts only names declared by the specs.
#[derive(Clone)]
pub struct StrictResolver {
    specs: Arc<dyn ApiSpecs>,
}

impl StrictResolver {
    pub fn new(specs: Arc<dyn ApiSpecs>) -> Self {
        Self { specs }
    }
}

impl fmt::Debug for StrictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrictResolver").finish_non_exhaustive()
    }
}

impl Resolver for StrictResolver {
    fn resolve(&self, parent: &str, kind: ChildKind, name: &str) -> Result<()> {
        let known = self.known(parent, kind).unwrap_or_default();
        if known.contains(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "The {} {} does not exist.",
                kind.label(),
                name
            )))
        }
    }

    fn known(&self, parent: &str, kind: ChildKind) -> Option<BTreeSet<String>> {
        Some(match kind {
            ChildKind::Namespace => self.specs.namespaces(),
            ChildKind::Collection => self.specs.collections_of(parent),
            ChildKind::Action => self.specs.actions_of(parent),
        })
    }

    fn operation_spec(&self, node: &str, operation: &str) -> Option<Value> {
        self.specs.operation_spec(node, operation)
    }
}
