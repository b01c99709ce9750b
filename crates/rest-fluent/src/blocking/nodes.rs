use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Client, Search};
use crate::error::{Error, Result};
use crate::executor::{Payload, RequestOptions};
use crate::query::Query;
use crate::resource::{hyphenate, Node};
use crate::search::{project, SearchState};
use crate::specs::ChildKind;
use crate::transport::Method;

fn json_options<B: Serialize + ?Sized>(payload: &B) -> Result<RequestOptions> {
    Ok(RequestOptions::new().json(serde_json::to_value(payload)?))
}

/// A grouping of collections, addressed by name.
#[derive(Debug, Clone)]
pub struct Namespace {
    client: Client,
    node: Node,
}

impl Namespace {
    pub(crate) fn new(client: Client, node: Node) -> Self {
        Self { client, node }
    }

    pub fn path(&self) -> &str {
        self.node.path()
    }

    pub fn collection(&self, name: &str) -> Result<Collection> {
        let node = self.node.child(ChildKind::Collection, name)?;
        Ok(Collection::new(self.client.clone(), node))
    }

    pub fn member(&self, name: &str) -> Result<Collection> {
        self.collection(&hyphenate(name))
    }

    pub fn children(&self) -> BTreeSet<String> {
        self.node.known(ChildKind::Collection)
    }
}

/// A set of items of one kind.
#[derive(Debug, Clone)]
pub struct Collection {
    client: Client,
    node: Node,
}

impl Collection {
    pub(crate) fn new(client: Client, node: Node) -> Self {
        Self { client, node }
    }

    pub fn path(&self) -> &str {
        self.node.path()
    }

    pub fn all(&self) -> Search {
        self.search_with(Query::new())
    }

    pub fn filter(&self, query: impl Into<Query>) -> Search {
        self.search_with(query.into())
    }

    /// Full-text search.
    pub fn search(&self, term: impl Into<String>) -> Search {
        let state = SearchState::new(self.path(), Query::new(), self.client.default_limit())
            .with_search_term(term);
        Search::new(self.client.clone(), state)
    }

    fn search_with(&self, query: Query) -> Search {
        let state = SearchState::new(self.path(), query, self.client.default_limit());
        Search::new(self.client.clone(), state)
    }

    pub fn create<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.create_with(json_options(payload)?)
    }

    pub fn create_with(&self, options: RequestOptions) -> Result<Payload> {
        self.client.create(self.path(), options)
    }

    pub fn item(&self, id: &str) -> Result<Item> {
        let node = self.node.item(id)?;
        Ok(Item::new(self.client.clone(), node))
    }

    pub fn operation_spec(&self, operation: &str) -> Option<Value> {
        self.node.operation_spec(operation)
    }
}

/// One addressable item of a collection.
#[derive(Debug, Clone)]
pub struct Item {
    client: Client,
    node: Node,
}

/// A child reached by member-style access on an [`Item`].
#[derive(Debug, Clone)]
pub enum Member {
    Collection(Collection),
    Action(Action),
}

impl Item {
    pub(crate) fn new(client: Client, node: Node) -> Self {
        Self { client, node }
    }

    pub fn path(&self) -> &str {
        self.node.path()
    }

    pub fn collection(&self, name: &str) -> Result<Collection> {
        let node = self.node.child(ChildKind::Collection, name)?;
        Ok(Collection::new(self.client.clone(), node))
    }

    pub fn action(&self, name: &str) -> Result<Action> {
        let node = self.node.child(ChildKind::Action, name)?;
        Ok(Action::new(self.client.clone(), node))
    }

    /// Resolve a member-style name against the specs.
    pub fn member(&self, name: &str) -> Result<Member> {
        let (kind, node) = self.node.member(name)?;
        Ok(match kind {
            ChildKind::Action => Member::Action(Action::new(self.client.clone(), node)),
            _ => Member::Collection(Collection::new(self.client.clone(), node)),
        })
    }

    pub fn collections(&self) -> BTreeSet<String> {
        self.node.known(ChildKind::Collection)
    }

    pub fn actions(&self) -> BTreeSet<String> {
        self.node.known(ChildKind::Action)
    }

    /// Every nested collection and action known to the specs, by name.
    pub fn children(&self) -> BTreeMap<String, ChildKind> {
        let collections = self.collections().into_iter().map(|n| (n, ChildKind::Collection));
        let actions = self.actions().into_iter().map(|n| (n, ChildKind::Action));
        collections.chain(actions).collect()
    }

    pub fn get(&self) -> Result<Payload> {
        self.get_with(RequestOptions::new())
    }

    pub fn get_with(&self, options: RequestOptions) -> Result<Payload> {
        self.client.get(self.path(), options)
    }

    pub fn update<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.update_with(json_options(payload)?)
    }

    pub fn update_with(&self, options: RequestOptions) -> Result<Payload> {
        self.client.update(self.path(), options)
    }

    pub fn delete(&self) -> Result<Payload> {
        self.client.delete(self.path(), RequestOptions::new())
    }

    /// Fetch the item and project it onto dotted field paths.
    pub fn values<S: AsRef<str>>(&self, fields: &[S]) -> Result<Map<String, Value>> {
        let item = self
            .get()?
            .into_json()
            .ok_or_else(|| Error::Decode("item is not a JSON document".to_string()))?;
        Ok(project(&item, fields))
    }
}

/// An operation on an item that is not plain CRUD.
#[derive(Debug, Clone)]
pub struct Action {
    client: Client,
    node: Node,
}

impl Action {
    pub(crate) fn new(client: Client, node: Node) -> Self {
        Self { client, node }
    }

    pub fn path(&self) -> &str {
        self.node.path()
    }

    pub fn get(&self) -> Result<Payload> {
        self.client.get(self.path(), RequestOptions::new())
    }

    /// POST to the action; anything but 200 is an error.
    pub fn post(&self, options: RequestOptions) -> Result<Payload> {
        self.client
            .execute(Method::POST, self.path(), Some(200), options)
    }

    pub fn post_json<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.post(json_options(payload)?)
    }

    /// PUT to the action; anything but 200 is an error.
    pub fn put(&self, options: RequestOptions) -> Result<Payload> {
        self.client
            .execute(Method::PUT, self.path(), Some(200), options)
    }

    pub fn put_json<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.put(json_options(payload)?)
    }

    pub fn delete(&self) -> Result<Payload> {
        self.client.delete(self.path(), RequestOptions::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::specs::StaticSpecs;
    use crate::testing::MockTransport;
    use crate::transport::HttpResponse;
    use serde_json::json;

    fn client(transport: Arc<MockTransport>) -> Client {
        Client::builder()
            .api_key("API_KEY")
            .endpoint("https://localhost")
            .specs(
                StaticSpecs::new()
                    .collection("products")
                    .collection("products/{id}/items")
                    .action("products/{id}/endsale")
                    .with_operation_spec("products", "list", json!({"summary": "List products"})),
            )
            .blocking_transport(transport)
            .build_blocking()
            .unwrap()
    }

    #[test]
    fn test_validation_blocks_undeclared_operations() {
        let transport = Arc::new(MockTransport::default());
        let client = client(transport.clone());
        let err = client.get("resources", RequestOptions::new()).unwrap_err();
        assert!(err.is_not_found());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_member_dispatch_and_action() {
        let transport = Arc::new(MockTransport::new(vec![Ok(HttpResponse::json(
            200,
            &json!({"status": "ended"}),
        ))]));
        let item = client(transport.clone())
            .collection("products")
            .unwrap()
            .item("PRD-1")
            .unwrap();

        let Member::Action(endsale) = item.member("endsale").unwrap() else {
            panic!("expected an action");
        };
        let result = endsale.post_json(&json!({"reason": "eol"})).unwrap();
        assert_eq!(result.as_json().unwrap()["status"], "ended");
        assert_eq!(
            transport.requests()[0].url,
            "https://localhost/products/PRD-1/endsale"
        );
    }

    #[test]
    fn test_operation_spec() {
        let products = client(Arc::new(MockTransport::default()))
            .collection("products")
            .unwrap();
        assert_eq!(
            products.operation_spec("list").unwrap()["summary"],
            "List products"
        );
        assert!(products.operation_spec("create").is_none());
    }

    #[test]
    fn test_item_values() {
        let transport = Arc::new(MockTransport::new(vec![Ok(HttpResponse::json(
            200,
            &json!({"id": "PRD-1", "items": [{"name": "first"}]}),
        ))]));
        let values = client(transport)
            .collection("products")
            .unwrap()
            .item("PRD-1")
            .unwrap()
            .values(&["id", "items.0.name", "absent"])
            .unwrap();
        assert_eq!(values["id"], "PRD-1");
        assert_eq!(values["items.0.name"], "first");
        assert_eq!(values["absent"], Value::Null);
    }
}
