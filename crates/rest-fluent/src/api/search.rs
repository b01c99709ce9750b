//! Async search driver.

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;

use crate::client::Client;
use crate::error::Result;
use crate::executor::{build_request, perform_async, RequestOptions};
use crate::query::Query;
use crate::search::{check_index, ContentRange, SearchPhase, SearchState, Slice, Step};
use crate::transport::Method;

/// A lazy, paginated search over a collection.
///
/// Nothing is requested until the first read. Pages are then fetched on
/// demand as items are consumed.
///
/// ```no_run
/// use futures::TryStreamExt;
/// use rest_fluent::{Client, Query};
///
/// # async fn example(client: Client) -> rest_fluent::Result<()> {
/// let products = client.collection("products")?;
///
/// let total = products.all().count().await?;
/// let names: Vec<_> = products
///     .filter(Query::eq("status", "published"))
///     .values_list(["id", "name"])
///     .slice(0..20)?
///     .into_stream()
///     .try_collect()
///     .await?;
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

    /// AND `query` into the filter.
    pub fn filter(mut self, query: impl Into<Query>) -> Self {
        self.state.filter(&query.into());
        self
    }

    /// Add sort fields (`-field` for descending).
    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.order_by(fields);
        self
    }

    /// Add fields to the server-side projection (`-field` to exclude).
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.select(fields);
        self
    }

    /// Replace the extra options sent with every page request.
    pub fn configure(mut self, options: RequestOptions) -> Self {
        self.state.configure(options);
        self
    }

    /// Yield each item projected onto dotted field paths.
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

    /// Range announced by the last fetched page.
    pub fn content_range(&self) -> Option<ContentRange> {
        self.state.content_range()
    }

    /// The RQL query string sent with each page request.
    pub fn query_string(&self) -> String {
        self.state.query_string()
    }

    async fn fetch(&mut self) -> Result<()> {
        let (path, options) = self.state.request();
        let result = async {
            let settings = self.client.settings();
            let request = build_request(settings, &Method::GET, &path, &options)?;
            perform_async(self.client.transport(), &settings.retry, &request, None).await
        }
        .await;
        match result {
            Ok(response) => self.state.load(response),
            Err(err) => {
                self.state.fail();
                Err(err)
            }
        }
    }

    async fn ensure_fetched(&mut self) -> Result<()> {
        if self.state.needs_fetch() {
            self.fetch().await?;
        }
        Ok(())
    }

    /// Total number of matching items, as declared by the server.
    pub async fn count(&mut self) -> Result<usize> {
        self.ensure_fetched().await?;
        Ok(self.state.count())
    }

    /// First item of the current page.
    pub async fn first(&mut self) -> Result<Option<Value>> {
        self.ensure_fetched().await?;
        Ok(self.state.first())
    }

    /// Item at `index` within the current page.
    pub async fn get(&mut self, index: i64) -> Result<Option<Value>> {
        let index = check_index(index)?;
        self.ensure_fetched().await?;
        Ok(self.state.item_at(index))
    }

    /// Whether the search matches anything.
    pub async fn exists(&mut self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// The next item, fetching another page when the buffered one is spent.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        loop {
            match self.state.step() {
                Step::Yield(item) => return Some(Ok(item)),
                Step::Fetch => {
                    if let Err(err) = self.fetch().await {
                        return Some(Err(err));
                    }
                }
                Step::Done => return None,
            }
        }
    }

    /// Every remaining item as a stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        stream::unfold(self, |mut search| async move {
            search.next().await.map(|item| (item, search))
        })
    }

    /// Collect every remaining item.
    pub async fn collect(self) -> Result<Vec<Value>> {
        self.into_stream().try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::testing::{page, MockTransport};
    use crate::transport::HttpResponse;
    use futures::StreamExt;
    use serde_json::json;

    fn ids(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|i| json!({"id": i})).collect()
    }

    fn products(transport: Arc<MockTransport>, limit: usize) -> crate::api::Collection {
        Client::builder()
            .api_key("API_KEY")
            .endpoint("https://localhost")
            .default_limit(limit)
            .max_retries(2)
            .transport(transport)
            .build()
            .unwrap()
            .collection("products")
            .unwrap()
    }

    fn param(url: &str, name: &str) -> Option<String> {
        let url = url::Url::parse(url).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn test_iterates_all_pages() {
        let transport = Arc::new(MockTransport::new(vec![
            Ok(page(&ids(0..10), 0, 9, 25)),
            Ok(page(&ids(10..20), 10, 19, 25)),
            Ok(page(&ids(20..25), 20, 24, 25)),
        ]));
        let items = products(transport.clone(), 10).all().collect().await.unwrap();
        assert_eq!(items, ids(0..25));

        let offsets: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| param(&r.url, "offset").unwrap())
            .collect();
        assert_eq!(offsets, ["0", "10", "20"]);
    }

    #[tokio::test]
    async fn test_slice_fetches_once() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(&ids(5..15), 5, 14, 100))]));
        let mut search = products(transport.clone(), 100).all().slice(5..15).unwrap();
        let mut seen = 0;
        while let Some(item) = search.next().await {
            item.unwrap();
            seen += 1;
        }
        assert_eq!(seen, 10);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(param(&requests[0].url, "offset").as_deref(), Some("5"));
        assert_eq!(param(&requests[0].url, "limit").as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_count_and_first_share_one_fetch() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(&ids(0..10), 0, 9, 42))]));
        let mut search = products(transport.clone(), 10).all();
        assert_eq!(search.phase(), SearchPhase::Unfetched);
        assert_eq!(search.count().await.unwrap(), 42);
        assert_eq!(search.first().await.unwrap(), Some(json!({"id": 0})));
        assert_eq!(search.get(3).await.unwrap(), Some(json!({"id": 3})));
        assert_eq!(search.get(30).await.unwrap(), None);
        assert!(search.exists().await.unwrap());
        assert_eq!(search.phase(), SearchPhase::PagedFetched);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_index_rejected_without_fetching() {
        let transport = Arc::new(MockTransport::default());
        let mut search = products(transport.clone(), 10).all();
        assert!(matches!(search.get(-1).await, Err(Error::InvalidValue(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_filtered_request_url() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(&[], 0, 0, 0))]));
        let mut search = products(transport.clone(), 10)
            .filter(Query::eq("status", "published"))
            .select(["-items"])
            .order_by(["-created"])
            .configure(RequestOptions::new().header("X-Trace", "1"));
        assert!(!search.exists().await.unwrap());

        let request = &transport.requests()[0];
        assert!(request.url.starts_with(
            "https://localhost/products?select(-items)&eq(status,published)&ordering(-created)&"
        ));
        assert_eq!(request.header("X-Trace"), Some("1"));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_and_ends_stream() {
        let transport = Arc::new(MockTransport::new(vec![Ok(HttpResponse::json(
            400,
            &json!({"error_code": "X", "errors": ["bad filter"]}),
        ))]));
        let mut stream = Box::pin(products(transport, 10).all().into_stream());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.as_client_error().unwrap().error_code.as_deref(), Some("X"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_retries_within_page_fetch() {
        let transport = Arc::new(MockTransport::new(vec![
            Ok(HttpResponse::new(502)),
            Ok(page(&ids(0..2), 0, 1, 2)),
        ]));
        let items = products(transport.clone(), 10).all().collect().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_search_term_param() {
        let transport = Arc::new(MockTransport::new(vec![Ok(page(&ids(0..1), 0, 0, 1))]));
        let items = products(transport.clone(), 10)
            .search("cloud")
            .collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            param(&transport.requests()[0].url, "search").as_deref(),
            Some("cloud")
        );
    }
}
