//! Extraction pipeline orchestration
//!
//! One run walks the requested platforms concurrently, each through its
//! own phase loop: navigate to a listing batch, extract fields from each
//! item, optionally enrich from the detail page, validate, and hand
//! batches to the sink. A failed item is counted and skipped; a listing
//! that never produced a first page fails its platform; a sink that keeps
//! failing fails the platform after retries.

use crate::config::{
    Collection, Config, CrawlerConfig, GenreEntry, PlatformConfig, SessionConfig, Strategy,
};
use crate::crawler::auth::AuthAdapter;
use crate::crawler::detail::DetailFetcher;
use crate::crawler::extract::{extract_list_item, DetailSelectorSet, ListSelectorSet};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::navigate::{
    discover_genres, CategoryNavigator, ItemFragment, Navigator, PaginatedNavigator,
    ScrollNavigator,
};
use crate::record::{validate, NovelRecord, Platform};
use crate::selector::FieldSelector;
use crate::storage::RecordSink;
use crate::{ConfigError, YeonjaeError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

/// The sink shared by all platform tasks of a run.
pub type SharedSink = Arc<Mutex<dyn RecordSink + Send>>;

/// Where a platform run currently is in its phase loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Navigating,
    ExtractingListFields,
    FetchingDetail,
    Validating,
    Batched,
    ItemFailed,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Navigating => "navigating",
            Self::ExtractingListFields => "extracting-list-fields",
            Self::FetchingDetail => "fetching-detail",
            Self::Validating => "validating",
            Self::Batched => "batched",
            Self::ItemFailed => "item-failed",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What one invocation should harvest.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// Platforms to run; empty means every configured platform
    pub platforms: Vec<Platform>,
    /// Genre display names to filter to; empty means the platform's
    /// default behavior (whole table for category platforms)
    pub genres: Vec<String>,
    /// Cap on validated records (per genre traversal when genre filters
    /// are given, otherwise per platform)
    pub limit: Option<usize>,
    /// Which listing surface to traverse
    pub collection: Collection,
    /// Whether adult-gated titles are wanted (triggers login)
    pub include_adult: bool,
    /// Whether detail pages are fetched for deep fields
    pub fetch_details: bool,
}

impl Default for CrawlRequest {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            genres: Vec::new(),
            limit: None,
            collection: Collection::All,
            include_adult: false,
            fetch_details: true,
        }
    }
}

/// Per-platform outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformSummary {
    pub platform: Platform,
    /// Validated records produced
    pub extracted: usize,
    /// Records confirmed written by the sink
    pub written: usize,
    /// Items dropped by extraction or validation
    pub failed_items: usize,
    /// Records left partial because their detail fetch failed
    pub detail_failures: usize,
    /// Re-sightings of an already-extracted URL
    pub duplicates: usize,
    /// Adult-gated items skipped for lack of access
    pub adult_skipped: usize,
    /// Distinct author names among the extracted records
    pub unique_authors: usize,
    /// Listing pages fetched
    pub pages: u32,
    /// Set when the platform run aborted
    pub error: Option<String>,
}

impl PlatformSummary {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            extracted: 0,
            written: 0,
            failed_items: 0,
            detail_failures: 0,
            duplicates: 0,
            adult_skipped: 0,
            unique_authors: 0,
            pages: 0,
            error: None,
        }
    }

    fn failed(platform: Platform, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(platform)
        }
    }
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub platforms: Vec<PlatformSummary>,
    /// True when the run stopped on the cancellation signal
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_extracted(&self) -> usize {
        self.platforms.iter().map(|p| p.extracted).sum()
    }

    pub fn total_written(&self) -> usize {
        self.platforms.iter().map(|p| p.written).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.platforms.iter().map(|p| p.failed_items).sum()
    }

    /// A run succeeded when it extracted at least one record.
    pub fn is_success(&self) -> bool {
        self.total_extracted() > 0
    }
}

fn limit_reached(limit: Option<usize>, produced: usize) -> bool {
    limit.map(|cap| produced >= cap).unwrap_or(false)
}

/// Runs one harvest across the requested platforms.
///
/// Platforms run as concurrent tasks over the shared sink. Per-platform
/// failures land in that platform's summary; the run itself only errors
/// on misconfiguration (an unconfigured platform was requested) or a
/// panicked task.
///
/// # Arguments
///
/// * `config` - The loaded configuration
/// * `request` - What to harvest
/// * `sink` - Where validated records go
/// * `cancel` - Cooperative cancellation flag, checked between items
pub async fn run_once(
    config: Arc<Config>,
    request: CrawlRequest,
    sink: SharedSink,
    cancel: Arc<AtomicBool>,
) -> crate::Result<RunSummary> {
    let started_at = Utc::now();

    let selected: Vec<PlatformConfig> = if request.platforms.is_empty() {
        config.platforms.clone()
    } else {
        let mut picked = Vec::new();
        for platform in &request.platforms {
            match config.platform(*platform) {
                Some(p) => picked.push(p.clone()),
                None => {
                    return Err(YeonjaeError::Config(ConfigError::Validation(format!(
                        "platform '{platform}' is not configured"
                    ))))
                }
            }
        }
        picked
    };

    tracing::info!(
        "Starting '{}' run across {} platform(s)",
        request.collection,
        selected.len()
    );

    let mut join_set = JoinSet::new();
    for platform_config in selected {
        let config = config.clone();
        let request = request.clone();
        let sink = sink.clone();
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let name = platform_config.name;
            match PlatformRun::new(platform_config, &config, request, sink, cancel) {
                Ok(run) => run.run().await,
                Err(e) => {
                    tracing::error!("Failed to prepare {} run: {}", name, e);
                    PlatformSummary::failed(name, e.to_string())
                }
            }
        });
    }

    let mut platforms = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(summary) => platforms.push(summary),
            Err(e) => return Err(YeonjaeError::Task(e.to_string())),
        }
    }
    platforms.sort_by_key(|p| p.platform.as_str());

    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        platforms,
        cancelled: cancel.load(Ordering::Relaxed),
    };
    tracing::info!(
        "Run finished: {} extracted, {} written, {} failed item(s)",
        summary.total_extracted(),
        summary.total_written(),
        summary.total_failed()
    );
    Ok(summary)
}

/// One platform's traversal, from navigation through sink flushes.
struct PlatformRun {
    platform: PlatformConfig,
    crawler: CrawlerConfig,
    session_config: Option<SessionConfig>,
    request: CrawlRequest,
    fetcher: Arc<Fetcher>,
    list_selectors: ListSelectorSet,
    detail: Option<DetailFetcher>,
    sink: SharedSink,
    cancel: Arc<AtomicBool>,
    phase: Phase,
    summary: PlatformSummary,
    seen_urls: HashSet<String>,
    authors: HashSet<String>,
    batch: Vec<NovelRecord>,
    adult_enabled: bool,
}

impl PlatformRun {
    fn new(
        platform: PlatformConfig,
        config: &Config,
        request: CrawlRequest,
        sink: SharedSink,
        cancel: Arc<AtomicBool>,
    ) -> crate::Result<Self> {
        let crawler = config.crawler.clone();
        let fetcher = Arc::new(Fetcher::new(&crawler, platform.rate_limit(&crawler))?);
        let list_selectors = ListSelectorSet::compile(&platform.list)?;
        let detail = match &platform.detail {
            Some(d) => Some(DetailFetcher::new(
                fetcher.clone(),
                DetailSelectorSet::compile(d)?,
            )),
            None => None,
        };
        let summary = PlatformSummary::new(platform.name);

        Ok(Self {
            crawler,
            session_config: config.session.clone(),
            platform,
            request,
            fetcher,
            list_selectors,
            detail,
            sink,
            cancel,
            phase: Phase::Idle,
            summary,
            seen_urls: HashSet::new(),
            authors: HashSet::new(),
            batch: Vec::new(),
            adult_enabled: false,
        })
    }

    async fn run(mut self) -> PlatformSummary {
        tracing::info!("Platform {} run starting", self.platform.name);
        match self.execute().await {
            Ok(()) => self.set_phase(Phase::Done),
            Err(e) => {
                tracing::error!("Platform {} run failed: {}", self.platform.name, e);
                self.summary.error = Some(e.to_string());
            }
        }
        self.summary.unique_authors = self.authors.len();
        tracing::info!(
            "Platform {} finished: {} extracted, {} written, {} failed, {} duplicate(s), {} page(s)",
            self.platform.name,
            self.summary.extracted,
            self.summary.written,
            self.summary.failed_items,
            self.summary.duplicates,
            self.summary.pages
        );
        self.summary
    }

    async fn execute(&mut self) -> crate::Result<()> {
        self.adult_enabled = self.establish_adult_access().await;

        let template = match self.platform.surfaces.template_for(self.request.collection) {
            Some(t) => t.to_string(),
            None => {
                // The platform simply lacks this surface; nothing to do.
                tracing::warn!(
                    "{} has no '{}' surface, skipping",
                    self.platform.name,
                    self.request.collection
                );
                return Ok(());
            }
        };

        let navigators = self.build_navigators(&template).await?;
        let per_navigator_limit = !self.request.genres.is_empty();
        let mut total = 0usize;

        for mut navigator in navigators {
            let mut produced = 0usize;
            'traversal: while navigator.has_more() && !self.cancelled() {
                self.set_phase(Phase::Navigating);
                let batch = match navigator.next_batch().await {
                    Ok(b) => b,
                    Err(e) => {
                        if self.summary.pages == 0 {
                            return Err(YeonjaeError::ListingUnreachable {
                                platform: self.platform.name.to_string(),
                                message: e.to_string(),
                            });
                        }
                        tracing::warn!(
                            "{} listing fetch failed after {} page(s): {} (ending traversal)",
                            self.platform.name,
                            self.summary.pages,
                            e
                        );
                        break;
                    }
                };
                self.summary.pages += 1;

                // Progress reporting every 10 listing pages
                if self.summary.pages % 10 == 0 {
                    tracing::info!(
                        "{} progress: {} page(s) fetched, {} extracted, {} failed",
                        self.platform.name,
                        self.summary.pages,
                        self.summary.extracted,
                        self.summary.failed_items
                    );
                }

                for fragment in batch {
                    if self.cancelled() {
                        break 'traversal;
                    }
                    if self.process_item(fragment).await? {
                        produced += 1;
                        total += 1;
                    }
                    let counted = if per_navigator_limit { produced } else { total };
                    if limit_reached(self.request.limit, counted) {
                        tracing::info!("{} reached its item limit", self.platform.name);
                        break 'traversal;
                    }
                }
            }

            if self.cancelled() {
                tracing::info!("{} run cancelled, flushing", self.platform.name);
                break;
            }
            if !per_navigator_limit && limit_reached(self.request.limit, total) {
                break;
            }
        }

        self.set_phase(Phase::Batched);
        self.flush().await?;
        Ok(())
    }

    /// Logs in when the request wants adult titles and the platform has a
    /// gate. A failed login only disables the adult sub-scope; regular
    /// extraction proceeds.
    async fn establish_adult_access(&mut self) -> bool {
        if !self.request.include_adult {
            return false;
        }
        let Some(auth_config) = self.platform.auth.clone() else {
            // No gate configured; adult entries on public listings pass.
            return true;
        };

        let adapter = match AuthAdapter::new(
            auth_config,
            self.platform.name,
            &self.crawler,
            self.session_config.as_ref(),
        ) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(
                    "{}: could not build login client: {} (adult titles skipped)",
                    self.platform.name,
                    e
                );
                return false;
            }
        };

        match adapter.establish().await {
            Ok(session) => {
                self.fetcher.set_cookie_header(session.cookie_header);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "{}: login failed: {} (adult titles skipped)",
                    self.platform.name,
                    e
                );
                false
            }
        }
    }

    /// Assembles the navigators this run will drain, resolving the genre
    /// table (configured or menu-discovered) first.
    async fn build_navigators(
        &mut self,
        template: &str,
    ) -> crate::Result<Vec<Box<dyn Navigator + Send>>> {
        let table: Vec<GenreEntry> = if !self.platform.genres.is_empty() {
            self.platform.genres.clone()
        } else if let Some(menu) = self.platform.menu.clone() {
            let item_selector = FieldSelector::parse(&menu.item).map_err(|e| {
                ConfigError::InvalidSelector {
                    field: format!("{}.menu.item", self.platform.name),
                    message: e.to_string(),
                }
            })?;
            discover_genres(&self.fetcher, &menu, &item_selector)
                .await
                .map_err(|e| YeonjaeError::ListingUnreachable {
                    platform: self.platform.name.to_string(),
                    message: format!("category menu: {e}"),
                })?
        } else {
            Vec::new()
        };

        let page_cap = self.platform.page_cap(&self.crawler);

        // Explicit genre filters: one traversal per requested genre.
        if !self.request.genres.is_empty() {
            let mut navigators: Vec<Box<dyn Navigator + Send>> = Vec::new();
            for name in &self.request.genres {
                let Some(genre) = table.iter().find(|g| g.name == *name) else {
                    tracing::warn!(
                        "{} has no genre named '{}', skipping",
                        self.platform.name,
                        name
                    );
                    continue;
                };
                navigators.push(self.single_navigator(template, Some(genre.clone()), page_cap));
            }
            return Ok(navigators);
        }

        // No filter: category platforms sweep the whole table; the other
        // strategies run once, on the default genre if the template wants one.
        match self.platform.strategy {
            Strategy::Category => Ok(vec![Box::new(CategoryNavigator::new(
                self.fetcher.clone(),
                self.list_selectors.item.clone(),
                template.to_string(),
                table,
                page_cap,
            ))]),
            Strategy::Pagination | Strategy::InfiniteScroll => {
                let genre = if template.contains("{genre}") {
                    let default = table
                        .iter()
                        .find(|g| g.default)
                        .or_else(|| table.first())
                        .cloned();
                    if default.is_none() {
                        tracing::warn!(
                            "{} template wants a genre but the table is empty",
                            self.platform.name
                        );
                    }
                    default
                } else {
                    None
                };
                Ok(vec![self.single_navigator(template, genre, page_cap)])
            }
        }
    }

    fn single_navigator(
        &self,
        template: &str,
        genre: Option<GenreEntry>,
        page_cap: u32,
    ) -> Box<dyn Navigator + Send> {
        match self.platform.strategy {
            Strategy::InfiniteScroll => {
                let load_more = self
                    .platform
                    .load_more_url
                    .clone()
                    .unwrap_or_else(|| template.to_string());
                Box::new(ScrollNavigator::new(
                    self.fetcher.clone(),
                    self.list_selectors.item.clone(),
                    template.to_string(),
                    load_more,
                    genre,
                    Duration::from_millis(self.crawler.scroll_settle_ms),
                    self.crawler.max_stale_scrolls,
                    page_cap,
                ))
            }
            Strategy::Pagination | Strategy::Category => Box::new(PaginatedNavigator::new(
                self.fetcher.clone(),
                self.list_selectors.item.clone(),
                template.to_string(),
                genre,
                page_cap,
            )),
        }
    }

    /// Takes one fragment through extraction, enrichment, and validation.
    /// Returns whether a validated record came out of it; errors are
    /// fatal sink failures only.
    async fn process_item(&mut self, fragment: ItemFragment) -> crate::Result<bool> {
        self.set_phase(Phase::ExtractingListFields);
        let mut record =
            match extract_list_item(&fragment, &self.list_selectors, self.platform.name) {
                Ok(r) => r,
                Err(e) => {
                    self.set_phase(Phase::ItemFailed);
                    self.summary.failed_items += 1;
                    tracing::warn!("{} item skipped: {}", self.platform.name, e);
                    return Ok(false);
                }
            };

        if record.is_adult && !self.adult_enabled {
            self.summary.adult_skipped += 1;
            tracing::debug!("Skipping adult-gated item {}", record.url);
            return Ok(false);
        }

        // First sighting of a URL wins; later duplicates are dropped.
        if !self.seen_urls.insert(record.url.clone()) {
            self.summary.duplicates += 1;
            return Ok(false);
        }

        if self.request.fetch_details && self.detail.is_some() {
            self.set_phase(Phase::FetchingDetail);
            if let Some(detail) = &self.detail {
                if !detail.enrich(&mut record).await {
                    self.summary.detail_failures += 1;
                }
            }
        }

        self.set_phase(Phase::Validating);
        let record = match validate(record) {
            Ok(r) => r,
            Err(e) => {
                self.set_phase(Phase::ItemFailed);
                self.summary.failed_items += 1;
                tracing::warn!(
                    "{} item failed validation: {}",
                    self.platform.name,
                    e
                );
                return Ok(false);
            }
        };

        self.summary.extracted += 1;
        self.authors.insert(record.author.clone());
        self.batch.push(record);
        if self.batch.len() >= self.crawler.batch_size {
            self.set_phase(Phase::Batched);
            self.flush().await?;
        }
        Ok(true)
    }

    /// Writes the pending batch, retrying with linear backoff. Exhausted
    /// retries fail the platform run.
    async fn flush(&mut self) -> crate::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let mut attempt: u32 = 1;
        loop {
            let result = { self.sink.lock().unwrap().write_batch(&self.batch) };
            match result {
                Ok(written) => {
                    tracing::debug!(
                        "{} wrote batch of {} record(s)",
                        self.platform.name,
                        written
                    );
                    self.summary.written += written;
                    self.batch.clear();
                    return Ok(());
                }
                Err(e) if attempt < self.crawler.sink_retries => {
                    let backoff = Duration::from_millis(self.crawler.retry_backoff_ms) * attempt;
                    tracing::warn!(
                        "{} batch write failed (attempt {}/{}): {} (retrying in {:?})",
                        self.platform.name,
                        attempt,
                        self.crawler.sink_retries,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::trace!("{} phase: {} -> {}", self.platform.name, self.phase, phase);
            self.phase = phase;
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
