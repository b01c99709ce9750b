//! Fluent client SDK for resource-oriented REST APIs.
//!
//! APIs are modelled as a tree of nodes: namespaces group collections,
//! collections hold items, and items carry nested collections and actions.
//! Navigating the tree only builds paths; requests happen when an operation
//! is invoked.
//!
//! # Example
//!
//! ```no_run
//! use rest_fluent::{Client, Query, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder()
//!     .api_key("ApiKey SU-000:xxx")
//!     .endpoint("https://api.example.com/public/v1")
//!     .max_retries(2)
//!     .build()?;
//!
//! // Fetch one item
//! let product = client.collection("products")?.item("PRD-000-000")?.get().await?;
//!
//! // Lazily page through a filtered search
//! let mut listings = client
//!     .collection("listings")?
//!     .filter(Query::eq("status", "listed") & Query::any_in("contract.type", ["distribution"]))
//!     .select(["-vendor"])
//!     .order_by(["-created"]);
//! println!("{} listings", listings.count().await?);
//! while let Some(listing) = listings.next().await {
//!     println!("{}", listing?["id"]);
//! }
//!
//! // Invoke an action
//! client
//!     .collection("products")?
//!     .item("PRD-000-000")?
//!     .action("endsale")?
//!     .post_json(&serde_json::json!({"replacement": "PRD-000-001"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! [`Client`] is async. [`blocking::Client`] exposes the same object graph
//! with synchronous calls. Both share request shaping, response
//! interpretation and pagination; only the waiting differs.
//!
//! # Specs
//!
//! Supplying [`ApiSpecs`] makes navigation strict: unknown namespaces,
//! collections and actions fail with [`Error::NotFound`] before any request,
//! and (unless disabled) requests to undeclared operations are rejected.

pub mod api;
pub mod blocking;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod query;
mod resource;
pub mod search;
pub mod specs;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use api::{Action, Collection, Item, Member, Namespace, Search};
pub use client::Client;
pub use config::{ClientBuilder, ClientConfig};
pub use error::{ClientError, Error, Result};
pub use executor::{ApiResponse, Payload, RequestOptions, RetryPolicy};
pub use query::{Operator, Query};
pub use search::{ContentRange, SearchPhase, Slice};
pub use specs::{ApiSpecs, ChildKind, PermissiveResolver, Resolver, StaticSpecs, StrictResolver};
pub use transport::{
    AsyncTransport, BlockingReqwestTransport, HttpRequest, HttpResponse, Method,
    ReqwestTransport, Transport, TransportError, TransportErrorKind,
};
