//! Node identity shared by the async and blocking object graphs.
//!
//! A node knows its concrete path (`products/PRD-1/items`), the matching
//! spec template (`products/{id}/items`) and the resolver deciding which
//! child names exist. It carries no other state.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::specs::{ChildKind, Resolver};

const ITEM_PLACEHOLDER: &str = "{id}";

/// Member-style names use underscores where the API uses hyphens.
pub(crate) fn hyphenate(name: &str) -> String {
    name.replace('_', "-")
}

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidValue(format!("`{}` must not be blank.", what)));
    }
    Ok(())
}

fn join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", base, segment)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    path: String,
    template: String,
    resolver: Arc<dyn Resolver>,
}

impl Node {
    /// The API root.
    pub(crate) fn root(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            path: String::new(),
            template: String::new(),
            resolver,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn template(&self) -> &str {
        &self.template
    }

    /// Resolve a named child.
    pub(crate) fn child(&self, kind: ChildKind, name: &str) -> Result<Node> {
        require_name(name, "name")?;
        self.resolver.resolve(&self.template, kind, name)?;
        Ok(Node {
            path: join(&self.path, name),
            template: join(&self.template, name),
            resolver: self.resolver.clone(),
        })
    }

    /// Resolve the item `id` of a collection.
    pub(crate) fn item(&self, id: &str) -> Result<Node> {
        require_name(id, "item_id")?;
        Ok(Node {
            path: join(&self.path, id),
            template: join(&self.template, ITEM_PLACEHOLDER),
            resolver: self.resolver.clone(),
        })
    }

    /// Resolve a member-style name below an item to a collection or action.
    pub(crate) fn member(&self, name: &str) -> Result<(ChildKind, Node)> {
        require_name(name, "name")?;
        let name = hyphenate(name);
        let collections = self.resolver.known(&self.template, ChildKind::Collection);
        let actions = self.resolver.known(&self.template, ChildKind::Action);
        match (collections, actions) {
            (None, None) => Err(Error::NotFound(
                "No specs available. Use the `collection` or `action` methods instead."
                    .to_string(),
            )),
            (Some(c), _) if c.contains(&name) => Ok((
                ChildKind::Collection,
                self.child(ChildKind::Collection, &name)?,
            )),
            (_, Some(a)) if a.contains(&name) => {
                Ok((ChildKind::Action, self.child(ChildKind::Action, &name)?))
            }
            _ => Err(Error::NotFound(format!("Unable to resolve {}.", name))),
        }
    }

    /// Names of children of `kind` known to the specs.
    pub(crate) fn known(&self, kind: ChildKind) -> BTreeSet<String> {
        self.resolver
            .known(&self.template, kind)
            .unwrap_or_default()
    }

    pub(crate) fn operation_spec(&self, operation: &str) -> Option<Value> {
        self.resolver.operation_spec(&self.template, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::{PermissiveResolver, StaticSpecs, StrictResolver};

    fn permissive() -> Node {
        Node::root(Arc::new(PermissiveResolver))
    }

    fn strict() -> Node {
        let specs = StaticSpecs::new()
            .namespace("devops")
            .collection("products")
            .collection("devops/services")
            .collection("products/{id}/items")
            .action("products/{id}/endsale");
        Node::root(Arc::new(StrictResolver::new(Arc::new(specs))))
    }

    #[test]
    fn test_paths_concatenate() {
        let root = permissive();
        let collection = root.child(ChildKind::Collection, "products").unwrap();
        assert_eq!(collection.path(), "products");

        let item = collection.item("PRD-000").unwrap();
        assert_eq!(item.path(), "products/PRD-000");
        assert_eq!(item.template(), "products/{id}");

        for name in ["items", "my_thing", "x"] {
            let child = item.child(ChildKind::Collection, name).unwrap();
            assert_eq!(child.path(), format!("{}/{}", item.path(), name));
        }
    }

    #[test]
    fn test_blank_names_rejected() {
        let root = permissive();
        for name in ["", "   "] {
            let err = root.child(ChildKind::Collection, name).unwrap_err();
            assert!(matches!(err, Error::InvalidValue(_)));
        }
        let collection = root.child(ChildKind::Collection, "products").unwrap();
        assert!(matches!(collection.item("").unwrap_err(), Error::InvalidValue(_)));
    }

    #[test]
    fn test_strict_resolution() {
        let root = strict();
        assert!(root.child(ChildKind::Namespace, "devops").is_ok());
        assert!(root.child(ChildKind::Namespace, "billing").unwrap_err().is_not_found());
        assert!(root.child(ChildKind::Collection, "listings").unwrap_err().is_not_found());

        let ns = root.child(ChildKind::Namespace, "devops").unwrap();
        assert_eq!(ns.child(ChildKind::Collection, "services").unwrap().path(), "devops/services");

        let item = root
            .child(ChildKind::Collection, "products")
            .unwrap()
            .item("PRD-1")
            .unwrap();
        assert!(item.child(ChildKind::Collection, "items").is_ok());
        assert!(item.child(ChildKind::Action, "endsale").is_ok());
        assert!(item.child(ChildKind::Action, "items").unwrap_err().is_not_found());
        assert_eq!(
            item.known(ChildKind::Action),
            BTreeSet::from(["endsale".to_string()])
        );
    }

    #[test]
    fn test_member_resolution() {
        let item = strict()
            .child(ChildKind::Collection, "products")
            .unwrap()
            .item("PRD-1")
            .unwrap();

        let (kind, node) = item.member("items").unwrap();
        assert_eq!(kind, ChildKind::Collection);
        assert_eq!(node.path(), "products/PRD-1/items");

        let (kind, _) = item.member("endsale").unwrap();
        assert_eq!(kind, ChildKind::Action);

        assert!(item.member("nothing").unwrap_err().is_not_found());

        let unchecked = permissive().item("x").unwrap();
        assert!(unchecked.member("items").unwrap_err().is_not_found());
    }

    #[test]
    fn test_hyphenate() {
        assert_eq!(hyphenate("my_collection"), "my-collection");
        assert_eq!(hyphenate("plain"), "plain");
    }
}
