use serde_json::Value;

use super::Client;
use crate::error::Result;
use crate::executor::{build_request, perform_blocking, RequestOptions};
use crate::query::Query;
use crate::search::{check_index, ContentRange, SearchPhase, SearchState, Slice, Step};
use crate::transport::Method;

/// A lazy, paginated search over a collection; iterate it to fetch pages
/// on demand.
///
/// ```no_run
/// # fn example(client: rest_fluent::blocking::Client) -> rest_fluent::Result<()> {
/// let mut search = client.collection("products")?.all().order_by(["-created"]);
/// for product in search.iter().take(5) {
///     println!("{}", product?["id"]);
/// }
/// println!("{} products", search.count()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Search {
    client: Client,
    state: SearchState,
}

impl Search {
    pub(crate) fn new(client: Client, state: SearchState) -> Self {
        Self { client, state }
    }

    pub fn filter(mut self, query: impl Into<Query>) -> Self {
        self.state.filter(&query.into());
        self
    }

    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.order_by(fields);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.select(fields);
        self
    }

    pub fn configure(mut self, options: RequestOptions) -> Self {
        self.state.configure(options);
        self
    }

    pub fn values_list<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.values_list(fields);
        self
    }

    /// Restrict the search to one window, fetched in a single request.
    pub fn slice(mut self, slice: impl Into<Slice>) -> Result<Self> {
        self.state.slice(slice.into())?;
        Ok(self)
    }

    pub fn limit(&self) -> usize {
        self.state.limit()
    }

    pub fn offset(&self) -> usize {
        self.state.offset()
    }

    pub fn phase(&self) -> SearchPhase {
        self.state.phase()
    }

    pub fn content_range(&self) -> Option<ContentRange> {
        self.state.content_range()
    }

    pub fn query_string(&self) -> String {
        self.state.query_string()
    }

    fn fetch(&mut self) -> Result<()> {
        let (path, options) = self.state.request();
        let settings = self.client.settings();
        let result = build_request(settings, &Method::GET, &path, &options).and_then(|request| {
            perform_blocking(self.client.transport(), &settings.retry, &request, None)
        });
        match result {
            Ok(response) => self.state.load(response),
            Err(err) => {
                self.state.fail();
                Err(err)
            }
        }
    }

    fn ensure_fetched(&mut self) -> Result<()> {
        if self.state.needs_fetch() {
            self.fetch()?;
        }
        Ok(())
    }

    /// Total number of matching items, as declared by the server.
    pub fn count(&mut self) -> Result<usize> {
        self.ensure_fetched()?;
        Ok(self.state.count())
    }

    /// First item of the current page.
    pub fn first(&mut self) -> Result<Option<Value>> {
        self.ensure_fetched()?;
        Ok(self.state.first())
    }

    /// Item at `index` within the current page.
    pub fn get(&mut self, index: i64) -> Result<Option<Value>> {
        let index = check_index(index)?;
        self.ensure_fetched()?;
        Ok(self.state.item_at(index))
    }

    pub fn exists(&mut self) -> Result<bool> {
        Ok(self.count()? > 0)
    }
}

impl Search {
    /// Iterate without giving up the search, so [`count`](Self::count) and
    /// friends stay available afterwards.
    pub fn iter(&mut self) -> Iter<'_> {
        Iter { search: self }
    }

    fn advance(&mut self) -> Option<Result<Value>> {
        loop {
            match self.state.step() {
                Step::Yield(item) => return Some(Ok(item)),
                Step::Fetch => {
                    if let Err(err) = self.fetch() {
                        return Some(Err(err));
                    }
                }
                Step::Done => return None,
            }
        }
    }
}

/// Borrowing iterator over a [`Search`].
#[derive(Debug)]
pub struct Iter<'a> {
    search: &'a mut Search,
}

impl Iterator for Iter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.search.advance()
    }
}

/// Owning iterator over a [`Search`].
#[derive(Debug)]
pub struct IntoIter {
    search: Search,
}

impl Iterator for IntoIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.search.advance()
    }
}

impl IntoIterator for Search {
    type Item = Result<Value>;
    type IntoIter = IntoIter;

    fn into_iter(self) -> IntoIter {
        IntoIter { search: self }
    }
}

impl<'a> IntoIterator for &'a mut Search {
    type Item = Result<Value>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blocking::Collection;
    use crate::testing::{page, MockTransport};
    use crate::transport::{HttpResponse, TransportError};
    use serde_json::json;

    fn ids(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|i| json!({"id": i})).collect()
    }

    fn products(transport: Arc<MockTransport>, limit: usize) -> Collection {
        Client::builder()
            .api_key("API_KEY")
            .endpoint("https://localhost")
            .default_limit(limit)
            .max_retries(2)
            .blocking_transport(transport)
            .build_blocking()
            .unwrap()
            .collection("products")
            .unwrap()
    }

    #[test]
    fn test_iterates_all_pages() {
        let transport = Arc::new(MockTransport::new(vec![
            Ok(page(&ids(0..10), 0, 9, 25)),
            Ok(page(&ids(10..20), 10, 19, 25)),
            Ok(page(&ids(20..25), 20, 24, 25)),
        ]));
        let items: Vec<Value> = products(transport.clone(), 10)
            .all()
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(items, ids(0..25));

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            [
                "https://localhost/products?limit=10&offset=0",
                "https://localhost/products?limit=10&offset=10",
                "https://localhost/products?limit=10&offset=20",
            ]
        );
    }

    #[test]
    fn test_slice_is_one_request() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(&ids(5..15), 5, 14, 100))]));
        let search = products(transport.clone(), 100).all().slice(5..15).unwrap();
        assert_eq!(search.into_iter().count(), 10);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(
            transport.requests()[0].url,
            "https://localhost/products?limit=10&offset=5"
        );
    }

    #[test]
    fn test_stepped_slice_rejected() {
        let transport = Arc::new(MockTransport::default());
        let err = products(transport, 10)
            .all()
            .slice(crate::Slice::new(0, 10).step(2))
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidType(_)));
    }

    #[test]
    fn test_count_reads_content_range() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(&ids(0..10), 0, 9, 300))]));
        let mut search = products(transport.clone(), 10).filter(Query::eq("status", "draft"));
        assert_eq!(search.count().unwrap(), 300);
        assert_eq!(
            search.content_range(),
            Some(ContentRange {
                first: 0,
                last: 9,
                count: 300
            })
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_values_list() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(
            &[json!({"id": "PRD-1", "name": "Cloud", "extra": true})],
            0,
            0,
            1,
        ))]));
        let rows: Vec<Value> = products(transport, 10)
            .all()
            .values_list(["id", "name"])
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows, [json!({"id": "PRD-1", "name": "Cloud"})]);
    }

    #[test]
    fn test_server_errors_exhaust_retries() {
        let transport = Arc::new(MockTransport::new(vec![
            Ok(HttpResponse::new(502)),
            Ok(HttpResponse::new(502)),
            Ok(HttpResponse::new(502)),
        ]));
        let mut search = products(transport.clone(), 10).all();
        let err = search.iter().next().unwrap().unwrap_err();
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(transport.requests().len(), 3);
        assert!(search.iter().next().is_none());
    }

    #[test]
    fn test_transport_failure() {
        let transport = Arc::new(MockTransport::new(vec![Err(TransportError::other("boom"))]));
        let mut search = products(transport, 10).all();
        let err = search.first().unwrap_err();
        assert_eq!(err.to_string(), "Unexpected error");
    }
}
