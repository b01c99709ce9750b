//! Async client.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::api::{Collection, Namespace};
use crate::config::{ClientBuilder, Settings};
use crate::error::Result;
use crate::executor::{build_request, perform_async, ApiResponse, Payload, RequestOptions};
use crate::resource::{hyphenate, Node};
use crate::specs::ChildKind;
use crate::transport::{AsyncTransport, Method};

/// Async API client.
///
/// Cheap to clone; clones share configuration and transport. Nodes created
/// from a client hold their own clone.
///
/// # Example
///
/// ```no_run
/// use rest_fluent::{Client, Query};
///
/// # async fn example() -> rest_fluent::Result<()> {
/// let client = Client::builder().api_key("ApiKey SU-000:xxx").build()?;
///
/// let mut published = client
///     .collection("products")?
///     .filter(Query::eq("status", "published"))
///     .order_by(["-created"]);
/// while let Some(product) = published.next().await {
///     println!("{}", product?["id"]);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    settings: Arc<Settings>,
    transport: Arc<dyn AsyncTransport>,
    root: Node,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(settings: Arc<Settings>, transport: Arc<dyn AsyncTransport>) -> Self {
        let root = Node::root(settings.resolver.clone());
        Self {
            settings,
            transport,
            root,
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn transport(&self) -> &dyn AsyncTransport {
        self.transport.as_ref()
    }

    /// The API endpoint every path is relative to.
    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    /// Page size used by new searches.
    pub fn default_limit(&self) -> usize {
        self.settings.default_limit
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────────

    /// Access a namespace.
    pub fn ns(&self, name: &str) -> Result<Namespace> {
        let node = self.root.child(ChildKind::Namespace, name)?;
        Ok(Namespace::new(self.clone(), node))
    }

    /// Access a top-level collection.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let node = self.root.child(ChildKind::Collection, name)?;
        Ok(Collection::new(self.clone(), node))
    }

    /// Access a top-level collection by member-style name
    /// (`my_collection` resolves `my-collection`).
    pub fn member(&self, name: &str) -> Result<Collection> {
        self.collection(&hyphenate(name))
    }

    /// Top-level namespaces known to the specs.
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.root.known(ChildKind::Namespace)
    }

    /// Top-level collections known to the specs.
    pub fn collections(&self) -> BTreeSet<String> {
        self.root.known(ChildKind::Collection)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Raw HTTP
    // ─────────────────────────────────────────────────────────────────────────

    /// Perform a GET on `path`.
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::GET, path, None, options).await
    }

    /// Perform a POST on `path`.
    pub async fn create(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::POST, path, None, options).await
    }

    /// Perform a PUT on `path`.
    pub async fn update(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::PUT, path, None, options).await
    }

    /// Perform a DELETE on `path`.
    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::DELETE, path, None, options).await
    }

    /// Perform `method` on `path`, optionally requiring an exact status.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        expected: Option<u16>,
        options: RequestOptions,
    ) -> Result<Payload> {
        Ok(self
            .execute_raw(method, path, expected, options)
            .await?
            .payload)
    }

    /// Like [`execute`](Self::execute), keeping status and headers.
    pub async fn execute_raw(
        &self,
        method: Method,
        path: &str,
        expected: Option<u16>,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let request = build_request(&self.settings, &method, path, &options)?;
        perform_async(
            self.transport.as_ref(),
            &self.settings.retry,
            &request,
            expected,
        )
        .await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
