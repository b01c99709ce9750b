//! Lazy, paginated collection search.
//!
//! [`SearchState`] holds everything about a search except the transport:
//! the query, projection, window and the page currently buffered. Both
//! client flavours drive it the same way. They ask it for the next
//! [`Step`], perform a fetch when told to, and feed the response back.

use std::ops::{Range, RangeFrom, RangeTo};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::executor::{ApiResponse, Payload, RequestOptions};
use crate::query::{Query, AND_SEPARATOR};

/// Header announcing the window of the returned page.
pub const CONTENT_RANGE: &str = "Content-Range";

/// A parsed `Content-Range: items <first>-<last>/<count>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: usize,
    pub last: usize,
    pub count: usize,
}

impl ContentRange {
    /// Parse a header value. The unit prefix is optional.
    ///
    /// ```
    /// use rest_fluent::ContentRange;
    ///
    /// let range = ContentRange::parse("items 0-9/42").unwrap();
    /// assert_eq!((range.first, range.last, range.count), (0, 9, 42));
    /// assert!(ContentRange::parse("items */42").is_none());
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        let range = value.trim().rsplit(' ').next()?;
        let (span, count) = range.split_once('/')?;
        let (first, last) = span.split_once('-')?;
        let parsed = Self {
            first: first.trim().parse().ok()?,
            last: last.trim().parse().ok()?,
            count: count.trim().parse().ok()?,
        };
        (parsed.first <= parsed.last).then_some(parsed)
    }

    /// Whether this page ends the result set.
    pub fn is_last_page(&self) -> bool {
        self.last
            .checked_add(1)
            .is_none_or(|end| end >= self.count)
    }
}

/// A `[start:stop:step]` window over search results.
///
/// Only non-negative bounds are supported, and the step must be absent, zero
/// or one; anything else is rejected when the slice is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    /// `[start:stop]`
    pub fn new(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// Set the step.
    pub fn step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Offset and optional length of the window.
    fn window(&self) -> Result<(usize, Option<usize>)> {
        if self.step.is_some_and(|step| step != 0 && step != 1) {
            return Err(Error::InvalidType(
                "Indexing with step is not supported.".to_string(),
            ));
        }
        let start = self.start.unwrap_or(0);
        if start < 0 || self.stop.is_some_and(|stop| stop < 0) {
            return Err(Error::InvalidValue(
                "Negative indexing is not supported.".to_string(),
            ));
        }
        match self.stop {
            Some(stop) if stop < start => Err(Error::InvalidValue(format!(
                "Slice stop ({}) must not precede start ({}).",
                stop, start
            ))),
            Some(stop) => Ok((start as usize, Some((stop - start) as usize))),
            None => Ok((start as usize, None)),
        }
    }
}

impl From<Range<usize>> for Slice {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start as i64, range.end as i64)
    }
}

impl From<RangeFrom<usize>> for Slice {
    fn from(range: RangeFrom<usize>) -> Self {
        Self {
            start: Some(range.start as i64),
            ..Self::default()
        }
    }
}

impl From<RangeTo<usize>> for Slice {
    fn from(range: RangeTo<usize>) -> Self {
        Self {
            stop: Some(range.end as i64),
            ..Self::default()
        }
    }
}

/// Follow a dotted path (`product.id`, `items.0.name`) through a document.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Project `item` onto `fields`; unresolvable paths map to `null`.
pub fn project<S: AsRef<str>>(item: &Value, fields: &[S]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| {
            let field = field.as_ref();
            let value = resolve_path(item, field).cloned().unwrap_or(Value::Null);
            (field.to_string(), value)
        })
        .collect()
}

/// Where a search stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// The next page has not been requested yet.
    Unfetched,
    /// A page is buffered and more may follow.
    PagedFetched,
    /// The single page of a sliced search is buffered.
    SlicedFetched,
    /// Nothing more will be yielded.
    Exhausted,
}

/// What the driver should do next.
#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    Yield(Value),
    Fetch,
    Done,
}

#[derive(Debug, Clone)]
pub(crate) struct SearchState {
    path: String,
    query: Query,
    select: Vec<String>,
    ordering: Vec<String>,
    search: Option<String>,
    fields: Option<Vec<String>>,
    options: RequestOptions,
    limit: usize,
    offset: usize,
    sliced: bool,
    fetched: bool,
    exhausted: bool,
    results: Vec<Value>,
    cursor: usize,
    content_range: Option<ContentRange>,
}

impl SearchState {
    pub(crate) fn new(path: impl Into<String>, query: Query, limit: usize) -> Self {
        Self {
            path: path.into(),
            query,
            select: Vec::new(),
            ordering: Vec::new(),
            search: None,
            fields: None,
            options: RequestOptions::new(),
            limit,
            offset: 0,
            sliced: false,
            fetched: false,
            exhausted: false,
            results: Vec::new(),
            cursor: 0,
            content_range: None,
        }
    }

    pub(crate) fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn content_range(&self) -> Option<ContentRange> {
        self.content_range
    }

    pub(crate) fn phase(&self) -> SearchPhase {
        match (self.exhausted, self.fetched, self.sliced) {
            (true, _, _) => SearchPhase::Exhausted,
            (false, false, _) => SearchPhase::Unfetched,
            (false, true, true) => SearchPhase::SlicedFetched,
            (false, true, false) => SearchPhase::PagedFetched,
        }
    }

    /// `select(...)`, the filter and `ordering(...)`, in that order.
    pub(crate) fn query_string(&self) -> String {
        let mut parts = Vec::new();
        if !self.select.is_empty() {
            parts.push(format!("select({})", self.select.join(",")));
        }
        if !self.query.is_empty() {
            parts.push(self.query.to_string());
        }
        if !self.ordering.is_empty() {
            parts.push(format!("ordering({})", self.ordering.join(",")));
        }
        parts.join(AND_SEPARATOR)
    }

    /// Path and options for fetching the page at the current offset.
    pub(crate) fn request(&self) -> (String, RequestOptions) {
        let qs = self.query_string();
        let path = if qs.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, qs)
        };
        let mut options = self.options.clone();
        options.set_param("limit".to_string(), self.limit.to_string());
        options.set_param("offset".to_string(), self.offset.to_string());
        if let Some(term) = &self.search {
            options.set_param("search".to_string(), term.clone());
        }
        (path, options)
    }

    pub(crate) fn needs_fetch(&self) -> bool {
        !self.fetched && !self.exhausted
    }

    /// Buffer a fetched page.
    pub(crate) fn load(&mut self, response: ApiResponse) -> Result<()> {
        let content_range = response.header(CONTENT_RANGE).and_then(|value| {
            let parsed = ContentRange::parse(value);
            if parsed.is_none() {
                trace!(header = value, "ignoring malformed Content-Range");
            }
            parsed
        });
        let results = match response.payload {
            Payload::Json(Value::Array(items)) => items,
            Payload::Empty => Vec::new(),
            _ => {
                self.fail();
                return Err(Error::Decode(
                    "search results must be a JSON array".to_string(),
                ));
            }
        };
        debug!(
            path = %self.path,
            offset = self.offset,
            limit = self.limit,
            returned = results.len(),
            count = content_range.map(|r| r.count),
            "fetched search page"
        );

        self.exhausted = results.is_empty();
        self.results = results;
        self.cursor = 0;
        self.content_range = content_range;
        self.fetched = true;
        Ok(())
    }

    /// Stop after a failed fetch.
    pub(crate) fn fail(&mut self) {
        self.exhausted = true;
    }

    fn has_more(&self) -> bool {
        !self.sliced
            && self
                .content_range
                .is_some_and(|range| !range.is_last_page())
    }

    pub(crate) fn step(&mut self) -> Step {
        // An empty window yields nothing, though `count()` may still fetch it.
        if self.exhausted || (self.sliced && self.limit == 0) {
            return Step::Done;
        }
        if !self.fetched {
            return Step::Fetch;
        }
        if let Some(item) = self.results.get(self.cursor) {
            self.cursor += 1;
            return Step::Yield(self.shape(item));
        }
        if self.has_more() {
            self.offset += self.limit;
            self.fetched = false;
            self.results.clear();
            self.cursor = 0;
            return Step::Fetch;
        }
        self.exhausted = true;
        Step::Done
    }

    fn shape(&self, item: &Value) -> Value {
        match &self.fields {
            Some(fields) => Value::Object(project(item, fields)),
            None => item.clone(),
        }
    }

    /// Total declared by the server, else the size of the buffered page.
    pub(crate) fn count(&self) -> usize {
        self.content_range
            .map(|range| range.count)
            .unwrap_or(self.results.len())
    }

    pub(crate) fn first(&self) -> Option<Value> {
        self.results.first().map(|item| self.shape(item))
    }

    pub(crate) fn item_at(&self, index: usize) -> Option<Value> {
        self.results.get(index).map(|item| self.shape(item))
    }

    pub(crate) fn filter(&mut self, query: &Query) {
        self.query = self.query.and(query);
    }

    pub(crate) fn order_by<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordering.extend(fields.into_iter().map(Into::into));
    }

    pub(crate) fn select<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
    }

    pub(crate) fn configure(&mut self, options: RequestOptions) {
        self.options = options;
    }

    pub(crate) fn values_list<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
    }

    /// Restrict the search to one window, fetched in a single request.
    pub(crate) fn slice(&mut self, slice: Slice) -> Result<()> {
        let (start, length) = slice.window()?;
        self.offset = start;
        if let Some(length) = length {
            self.limit = length;
        }
        self.sliced = true;
        self.fetched = false;
        self.results.clear();
        self.cursor = 0;
        self.content_range = None;
        self.exhausted = false;
        Ok(())
    }
}

/// Validate an index into the current page.
pub(crate) fn check_index(index: i64) -> Result<usize> {
    if index < 0 {
        return Err(Error::InvalidValue(
            "Negative indexing is not supported.".to_string(),
        ));
    }
    Ok(index as usize)
}
