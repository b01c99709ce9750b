//! Namespace, collection, item and action nodes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::Search;
use crate::client::Client;
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

    /// Path relative to the endpoint.
    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// Access a collection of this namespace.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let node = self.node.child(ChildKind::Collection, name)?;
        Ok(Collection::new(self.client.clone(), node))
    }

    /// Access a collection by member-style name.
    pub fn member(&self, name: &str) -> Result<Collection> {
        self.collection(&hyphenate(name))
    }

    /// Collections of this namespace known to the specs.
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

    /// Path relative to the endpoint.
    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// Search every item.
    pub fn all(&self) -> Search {
        self.search_with(Query::new())
    }

    /// Search the items matching `query`.
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

    /// Create an item from a JSON-serializable payload.
    pub async fn create<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.create_with(json_options(payload)?).await
    }

    /// Create an item with explicit request options.
    pub async fn create_with(&self, options: RequestOptions) -> Result<Payload> {
        self.client.create(self.path(), options).await
    }

    /// Access one item.
    pub fn item(&self, id: &str) -> Result<Item> {
        let node = self.node.item(id)?;
        Ok(Item::new(self.client.clone(), node))
    }

    /// Spec document of `operation` (`list`, `create`, ...), when the specs
    /// provide one.
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

    /// Path relative to the endpoint.
    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// Access a nested collection.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let node = self.node.child(ChildKind::Collection, name)?;
        Ok(Collection::new(self.client.clone(), node))
    }

    /// Access an action.
    pub fn action(&self, name: &str) -> Result<Action> {
        let node = self.node.child(ChildKind::Action, name)?;
        Ok(Action::new(self.client.clone(), node))
    }

    /// Resolve a member-style name against the specs. Without specs this
    /// fails; use [`collection`](Self::collection) or
    /// [`action`](Self::action) instead.
    pub fn member(&self, name: &str) -> Result<Member> {
        let (kind, node) = self.node.member(name)?;
        Ok(match kind {
            ChildKind::Action => Member::Action(Action::new(self.client.clone(), node)),
            _ => Member::Collection(Collection::new(self.client.clone(), node)),
        })
    }

    /// Nested collections known to the specs.
    pub fn collections(&self) -> BTreeSet<String> {
        self.node.known(ChildKind::Collection)
    }

    /// Actions known to the specs.
    pub fn actions(&self) -> BTreeSet<String> {
        self.node.known(ChildKind::Action)
    }

    /// Every nested collection and action known to the specs, by name.
    pub fn children(&self) -> BTreeMap<String, ChildKind> {
        let collections = self.collections().into_iter().map(|n| (n, ChildKind::Collection));
        let actions = self.actions().into_iter().map(|n| (n, ChildKind::Action));
        collections.chain(actions).collect()
    }

    /// Fetch the item.
    pub async fn get(&self) -> Result<Payload> {
        self.get_with(RequestOptions::new()).await
    }

    pub async fn get_with(&self, options: RequestOptions) -> Result<Payload> {
        self.client.get(self.path(), options).await
    }

    /// Replace the item with a JSON-serializable payload.
    pub async fn update<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.update_with(json_options(payload)?).await
    }

    pub async fn update_with(&self, options: RequestOptions) -> Result<Payload> {
        self.client.update(self.path(), options).await
    }

    /// Delete the item.
    pub async fn delete(&self) -> Result<Payload> {
        self.client.delete(self.path(), RequestOptions::new()).await
    }

    /// Fetch the item and project it onto dotted field paths.
    pub async fn values<S: AsRef<str>>(&self, fields: &[S]) -> Result<Map<String, Value>> {
        let item = self
            .get()
            .await?
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

    /// Path relative to the endpoint.
    pub fn path(&self) -> &str {
        self.node.path()
    }

    pub async fn get(&self) -> Result<Payload> {
        self.client.get(self.path(), RequestOptions::new()).await
    }

    /// POST to the action; anything but 200 is an error.
    pub async fn post(&self, options: RequestOptions) -> Result<Payload> {
        self.client
            .execute(Method::POST, self.path(), Some(200), options)
            .await
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.post(json_options(payload)?).await
    }

    /// PUT to the action; anything but 200 is an error.
    pub async fn put(&self, options: RequestOptions) -> Result<Payload> {
        self.client
            .execute(Method::PUT, self.path(), Some(200), options)
            .await
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, payload: &B) -> Result<Payload> {
        self.put(json_options(payload)?).await
    }

    pub async fn delete(&self) -> Result<Payload> {
        self.client.delete(self.path(), RequestOptions::new()).await
    }
}
