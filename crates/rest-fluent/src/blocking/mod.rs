//! Blocking client.
//!
//! Same object graph as the async [`Client`](crate::Client), with every
//! call running on the caller's thread. [`Search`] implements [`IntoIterator`].
//!
//! Do not use from within an async runtime.
//!
//! ```no_run
//! use rest_fluent::blocking::Client;
//! use rest_fluent::Query;
//!
//! # fn example() -> rest_fluent::Result<()> {
//! let client = Client::builder().api_key("ApiKey SU-000:xxx").build_blocking()?;
//!
//! for product in client
//!     .collection("products")?
//!     .filter(Query::eq("status", "published"))
//! {
//!     println!("{}", product?["id"]);
//! }
//! # Ok(())
//! # }
//! ```

mod nodes;
mod search;

pub use nodes::{Action, Collection, Item, Member, Namespace};
pub use search::{IntoIter, Iter, Search};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::{ClientBuilder, Settings};
use crate::error::Result;
use crate::executor::{build_request, perform_blocking, ApiResponse, Payload, RequestOptions};
use crate::resource::{hyphenate, Node};
use crate::specs::ChildKind;
use crate::transport::{Method, Transport};

/// Blocking API client.
#[derive(Clone)]
pub struct Client {
    settings: Arc<Settings>,
    transport: Arc<dyn Transport>,
    root: Node,
}

impl Client {
    /// Create a new client builder; finish with
    /// [`build_blocking`](ClientBuilder::build_blocking).
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(settings: Arc<Settings>, transport: Arc<dyn Transport>) -> Self {
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

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    pub fn default_limit(&self) -> usize {
        self.settings.default_limit
    }

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

    /// Access a top-level collection by member-style name.
    pub fn member(&self, name: &str) -> Result<Collection> {
        self.collection(&hyphenate(name))
    }

    pub fn namespaces(&self) -> BTreeSet<String> {
        self.root.known(ChildKind::Namespace)
    }

    pub fn collections(&self) -> BTreeSet<String> {
        self.root.known(ChildKind::Collection)
    }

    pub fn get(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::GET, path, None, options)
    }

    pub fn create(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::POST, path, None, options)
    }

    pub fn update(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::PUT, path, None, options)
    }

    pub fn delete(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        self.execute(Method::DELETE, path, None, options)
    }

    /// Perform `method` on `path`, optionally requiring an exact status.
    pub fn execute(
        &self,
        method: Method,
        path: &str,
        expected: Option<u16>,
        options: RequestOptions,
    ) -> Result<Payload> {
        Ok(self.execute_raw(method, path, expected, options)?.payload)
    }

    /// Like [`execute`](Self::execute), keeping status and headers.
    pub fn execute_raw(
        &self,
        method: Method,
        path: &str,
        expected: Option<u16>,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let request = build_request(&self.settings, &method, path, &options)?;
        perform_blocking(
            self.transport.as_ref(),
            &self.settings.retry,
            &request,
            expected,
        )
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("blocking::Client")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::transport::HttpResponse;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let transport = Arc::new(MockTransport::new(vec![Ok(HttpResponse::json(
            200,
            &json!({"id": "PRD-1"}),
        ))]));
        let client = Client::builder()
            .api_key("API_KEY")
            .endpoint("https://localhost/public/v1/")
            .default_header("X-Custom-Header", "value")
            .blocking_transport(transport.clone())
            .build_blocking()
            .unwrap();

        let payload = client
            .get("products/PRD-1", RequestOptions::new().param("select", "name"))
            .unwrap();
        assert_eq!(payload.as_json().unwrap()["id"], "PRD-1");

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.url,
            "https://localhost/public/v1/products/PRD-1?select=name"
        );
        assert_eq!(request.header("Authorization"), Some("API_KEY"));
        assert_eq!(request.header("X-Custom-Header"), Some("value"));
    }

    #[test]
    fn test_no_content() {
        let transport = Arc::new(MockTransport::new(vec![Ok(HttpResponse::new(204))]));
        let client = Client::builder()
            .api_key("API_KEY")
            .blocking_transport(transport)
            .build_blocking()
            .unwrap();
        assert_eq!(
            client.delete("products/PRD-1", RequestOptions::new()).unwrap(),
            Payload::Empty
        );
    }
}
