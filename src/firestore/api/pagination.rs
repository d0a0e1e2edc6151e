use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::firestore::api::client::FirestoreClient;
use crate::firestore::api::query::Query;
use crate::firestore::api::snapshot::DocumentSnapshot;
use crate::firestore::api::source::Source;
use crate::firestore::error::{invalid_argument, FirestoreResult};

/// Asks the paginator to re-read one document it already holds.
///
/// Applied only when `version` is strictly greater than the last version
/// applied for the same document, so replays and out-of-order tokens are
/// ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    pub document_id: String,
    pub version: i64,
}

impl RefreshToken {
    pub fn new(document_id: impl Into<String>, version: i64) -> Self {
        Self {
            document_id: document_id.into(),
            version,
        }
    }
}

/// Page sizes used by [`FirestoreClient::paginate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationOptions {
    /// Size of the first page.
    pub initial_limit: u32,
    /// Size of every page fetched after the first.
    pub future_limit: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            initial_limit: 20,
            future_limit: 10,
        }
    }
}

impl PaginationOptions {
    pub fn new(initial_limit: u32, future_limit: u32) -> Self {
        Self {
            initial_limit,
            future_limit,
        }
    }

    fn validate(&self) -> FirestoreResult<()> {
        if self.initial_limit == 0 || self.future_limit == 0 {
            return Err(invalid_argument(format!(
                "Page sizes must be positive (initial_limit: {}, future_limit: {})",
                self.initial_limit, self.future_limit
            )));
        }
        Ok(())
    }
}

/// The growing list of documents behind a paginated query.
///
/// The first item is the initial page. After that, an item is produced each
/// time a scroll position reaches the end of the list and the next page loads,
/// and each time a refresh token replaces a document in place. Every item is an
/// owned copy of the whole list.
///
/// Only the initial fetch can fail the stream; later fetch failures just skip
/// that update. The stream ends once both signal streams end, or when dropped.
#[must_use = "streams do nothing unless polled"]
pub struct Paginator {
    inner: BoxStream<'static, FirestoreResult<Vec<DocumentSnapshot>>>,
}

impl Stream for Paginator {
    type Item = FirestoreResult<Vec<DocumentSnapshot>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

enum Signal {
    Scroll(usize),
    Refresh(Option<RefreshToken>),
}

/// Accumulator plus the latest value of each input signal.
struct PageState {
    client: FirestoreClient,
    query: Query,
    options: PaginationOptions,
    documents: Vec<DocumentSnapshot>,
    applied_versions: HashMap<String, i64>,
    latest_scroll: Option<usize>,
    latest_refresh: Option<RefreshToken>,
}

struct Session {
    state: PageState,
    signals: BoxStream<'static, Signal>,
    pending: VecDeque<Vec<DocumentSnapshot>>,
    started: bool,
}

impl PageState {
    async fn load_first_page(&mut self) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.options.validate()?;
        let query = self.query.limit(self.options.initial_limit)?;
        let snapshot = self.client.get_docs(&query, Source::Default).await?;
        self.documents = snapshot.into_documents();
        self.client
            .logger()
            .debug(format!("Loaded first page of {} with {} documents", self.query.collection_path(), self.documents.len()));
        Ok(self.documents.clone())
    }

    /// Runs one tick: records `signal`, then the refresh check, then the growth check.
    async fn tick(&mut self, signal: Signal) -> Vec<Vec<DocumentSnapshot>> {
        match signal {
            Signal::Scroll(position) => self.latest_scroll = Some(position),
            Signal::Refresh(token) => self.latest_refresh = token,
        }

        let mut emissions = Vec::new();
        if self.apply_refresh().await {
            emissions.push(self.documents.clone());
        }
        if self.grow().await {
            emissions.push(self.documents.clone());
        }
        emissions
    }

    async fn apply_refresh(&mut self) -> bool {
        let Some(token) = self.latest_refresh.clone() else {
            return false;
        };
        let is_newer = self
            .applied_versions
            .get(&token.document_id)
            .map_or(true, |applied| token.version > *applied);
        if !is_newer {
            return false;
        }
        let Some(index) = self.documents.iter().position(|doc| doc.id() == token.document_id) else {
            return false;
        };

        let reference = self.documents[index].reference();
        match self.client.get_doc_or_none(&reference, Source::Cache).await {
            Some(fresh) => {
                self.client
                    .logger()
                    .debug(format!("Refreshed {reference} at index {index} (version {})", token.version));
                self.documents[index] = fresh;
                self.applied_versions.insert(token.document_id, token.version);
                true
            }
            None => false,
        }
    }

    async fn grow(&mut self) -> bool {
        if self.documents.is_empty() || self.latest_scroll != Some(self.documents.len()) {
            return false;
        }
        let query = match self.next_page_query() {
            Ok(query) => query,
            Err(err) => {
                self.client.logger().warn(format!("Cannot build next page query: {err}"));
                return false;
            }
        };
        let Some(page) = self.client.get_docs_or_none(&query, Source::Default).await else {
            return false;
        };

        let known: HashSet<String> = self.documents.iter().map(|doc| doc.id().to_owned()).collect();
        let before = self.documents.len();
        self.documents
            .extend(page.into_documents().into_iter().filter(|doc| !known.contains(doc.id())));
        self.client.logger().debug(format!(
            "Next page of {} added {} documents",
            self.query.collection_path(),
            self.documents.len() - before
        ));
        true
    }

    fn next_page_query(&self) -> FirestoreResult<Query> {
        let base = match self.documents.last() {
            Some(last) => self.query.start_after(last),
            None => self.query.clone(),
        };
        base.limit(self.options.future_limit)
    }
}

impl Session {
    async fn advance(mut self) -> Option<(FirestoreResult<Vec<DocumentSnapshot>>, Option<Session>)> {
        if !self.started {
            self.started = true;
            return match self.state.load_first_page().await {
                Ok(page) => Some((Ok(page), Some(self))),
                Err(err) => Some((Err(err), None)),
            };
        }
        loop {
            if let Some(page) = self.pending.pop_front() {
                return Some((Ok(page), Some(self)));
            }
            let signal = self.signals.next().await?;
            let emissions = self.state.tick(signal).await;
            self.pending.extend(emissions);
        }
    }
}

impl FirestoreClient {
    /// Pages through `query`, growing the list as the consumer scrolls.
    ///
    /// `scroll_positions` reports the index the consumer has reached; when it
    /// equals the current list length (and the list is not empty) the next
    /// page is fetched after the last held document. `refresh` tokens re-read
    /// one held document from the cache and replace it in place.
    pub fn paginate<S>(
        &self,
        query: Query,
        scroll_positions: S,
        options: PaginationOptions,
        refresh: Option<BoxStream<'static, Option<RefreshToken>>>,
    ) -> Paginator
    where
        S: Stream<Item = usize> + Send + 'static,
    {
        let scroll = scroll_positions.map(Signal::Scroll).boxed();
        let signals = match refresh {
            Some(refresh) => stream::select(scroll, refresh.map(Signal::Refresh)).boxed(),
            None => scroll,
        };
        let session = Session {
            state: PageState {
                client: self.clone(),
                query,
                options,
                documents: Vec::new(),
                applied_versions: HashMap::new(),
                latest_scroll: None,
                latest_refresh: None,
            },
            signals,
            pending: VecDeque::new(),
            started: false,
        };
        Paginator {
            inner: stream::unfold(Some(session), |session| async move { session?.advance().await }).boxed(),
        }
    }
}
