//! Abstract retrieval through a rendered page.
//!
//! Article pages render their abstract client-side, so a static GET is not
//! enough. Each article gets its own rendering session (a browser tab) that
//! navigates to the canonical abstract URL under a timeout, and the rendered
//! markup is read with the abstract page schema.
//!
//! Nothing here fails the run: navigation errors, timeouts and missing
//! abstract nodes all degrade to an empty abstract. When the page loaded but
//! the node was absent, the markup is saved under the diagnostics directory.
//! The session is closed on every path.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, OptionExt, Result};
use crate::normalize::{is_missing, ArticleRecord};
use crate::schema::CompiledPage;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One isolated rendering session
pub trait RenderSession {
    /// Navigate and wait for the page to load
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<()>>;

    /// Markup of the rendered page
    fn html(&mut self) -> impl Future<Output = Result<String>>;

    /// Release the session
    fn close(self) -> impl Future<Output = ()>
    where
        Self: Sized;
}

/// Source of rendering sessions
pub trait PageRenderer {
    type Session: RenderSession;

    fn open_session(&self) -> impl Future<Output = Result<Self::Session>>;
}

/// What happened when fetching one abstract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstractOutcome {
    Found(String),
    /// Page loaded but had no abstract node
    MissingNode,
    /// Session could not be opened, navigation failed or timed out
    Failed(String),
    /// Link has no usable article id
    InvalidLink(String),
}

impl AbstractOutcome {
    /// Abstract text, empty for every non-found outcome
    pub fn into_text(self) -> String {
        match self {
            AbstractOutcome::Found(text) => text,
            _ => String::new(),
        }
    }
}

/// Counters for the abstract stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbstractStats {
    pub requested: usize,
    pub found: usize,
    pub missing_node: usize,
    pub failed: usize,
    pub without_link: usize,
}

impl AbstractStats {
    fn record(&mut self, outcome: &AbstractOutcome) {
        match outcome {
            AbstractOutcome::Found(_) => self.found += 1,
            AbstractOutcome::MissingNode => self.missing_node += 1,
            AbstractOutcome::Failed(_) | AbstractOutcome::InvalidLink(_) => self.failed += 1,
        }
    }
}

/// Article id: the last non-empty path segment of a detail link
pub fn article_id_from_link(link: &str) -> Result<String> {
    let path = link.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
        .ok_or_parse("detail link has no trailing path segment")
}

/// Fetches abstracts for normalized records
pub struct AbstractFetcher<'a, R: PageRenderer> {
    renderer: &'a R,
    page: &'a CompiledPage,
    config: &'a HarvestConfig,
    navigation_timeout: Duration,
}

impl<'a, R: PageRenderer> AbstractFetcher<'a, R> {
    pub fn new(renderer: &'a R, page: &'a CompiledPage, config: &'a HarvestConfig) -> Self {
        Self {
            renderer,
            page,
            config,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Fetch the abstract behind one detail link. Never fails.
    pub async fn fetch(&self, link: &str) -> AbstractOutcome {
        let article_id = match article_id_from_link(link) {
            Ok(id) => id,
            Err(e) => {
                warn!(link, error = %e, "Cannot derive article id");
                return AbstractOutcome::InvalidLink(e.to_string());
            }
        };
        let url = self.config.abstract_url(&article_id);

        let mut session = match self.renderer.open_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(article_id = %article_id, error = %e, "Failed to open rendering session");
                return AbstractOutcome::Failed(e.to_string());
            }
        };

        let outcome = self.read_abstract(&mut session, &article_id, &url).await;
        session.close().await;
        outcome
    }

    async fn read_abstract(
        &self,
        session: &mut R::Session,
        article_id: &str,
        url: &str,
    ) -> AbstractOutcome {
        let rendered = tokio::time::timeout(self.navigation_timeout, async {
            session.navigate(url).await?;
            session.html().await
        })
        .await;

        let html = match rendered {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                warn!(article_id, url, error = %e, "Navigation failed");
                return AbstractOutcome::Failed(e.to_string());
            }
            Err(_) => {
                let e = HarvestError::Timeout(self.navigation_timeout.as_secs());
                warn!(article_id, url, error = %e, "Navigation timed out");
                return AbstractOutcome::Failed(e.to_string());
            }
        };

        let text = self
            .page
            .extract_html(&html)
            .into_iter()
            .find_map(|mut item| item.remove("abstract"));

        match text {
            Some(text) => {
                debug!(article_id, chars = text.len(), "Abstract found");
                AbstractOutcome::Found(text)
            }
            None => {
                warn!(article_id, url, "Abstract node not found in rendered page");
                if let Err(e) = write_diagnostic(&self.config.diagnostics_dir, article_id, &html).await
                {
                    warn!(article_id, error = %e, "Failed to write diagnostic HTML");
                }
                AbstractOutcome::MissingNode
            }
        }
    }

    /// Fill `abstract_text` of every record that has a detail link.
    ///
    /// At most `abstract_concurrency` sessions are open at once. Completion
    /// order is irrelevant: outcomes are matched back by record index.
    pub async fn fill_abstracts(&self, records: &mut [ArticleRecord]) -> AbstractStats {
        let mut stats = AbstractStats::default();

        let jobs: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| !is_missing(&record.doi))
            .map(|(index, record)| (index, record.doi.clone()))
            .collect();
        stats.requested = jobs.len();
        stats.without_link = records.len() - jobs.len();

        info!(
            requested = stats.requested,
            concurrency = self.config.abstract_concurrency,
            "Fetching abstracts"
        );

        let outcomes: Vec<(usize, AbstractOutcome)> = stream::iter(jobs)
            .map(|(index, link)| async move { (index, self.fetch(&link).await) })
            .buffer_unordered(self.config.abstract_concurrency)
            .collect()
            .await;

        for (index, outcome) in outcomes {
            stats.record(&outcome);
            records[index].abstract_text = outcome.into_text();
        }

        info!(
            found = stats.found,
            missing_node = stats.missing_node,
            failed = stats.failed,
            "Abstract stage complete"
        );
        stats
    }
}

/// Save rendered markup as `abstract_<article_id>.html`
async fn write_diagnostic(dir: &Path, article_id: &str, html: &str) -> Result<PathBuf> {
    let safe_id: String = article_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("abstract_{}.html", safe_id));
    tokio::fs::write(&path, html).await?;
    info!(path = %path.display(), "Diagnostic HTML saved");
    Ok(path)
}

fn browser_error(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Browser(e.to_string())
}

/// Headless Chromium renderer; one tab per session
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch a headless browser and drive its event handler in the background
    pub async fn launch(executable: Option<&Path>) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(HarvestError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        info!("Headless browser launched");
        Ok(Self { browser, handler })
    }

    /// Close the browser and wait for its handler to stop
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Failed to wait for browser exit");
        }
        if tokio::time::timeout(Duration::from_secs(5), self.handler)
            .await
            .is_err()
        {
            warn!("Browser handler did not stop in time");
        }
        info!("Headless browser shut down");
    }
}

impl PageRenderer for ChromiumRenderer {
    type Session = ChromiumSession;

    async fn open_session(&self) -> Result<ChromiumSession> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;
        Ok(ChromiumSession {
            page: Some(page),
            runtime: tokio::runtime::Handle::current(),
        })
    }
}

/// A browser tab. Closed explicitly by [`RenderSession::close`]; if the
/// session is dropped first, the close is spawned on the runtime.
pub struct ChromiumSession {
    page: Option<Page>,
    runtime: tokio::runtime::Handle,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("session already closed".to_string()))
    }
}

impl RenderSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page()?.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn html(&mut self) -> Result<String> {
        self.page()?.content().await.map_err(browser_error)
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "Failed to close browser tab");
            }
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            self.runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    warn!(error = %e, "Deferred tab close failed");
                }
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted renderer standing in for a browser.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub enum Script {
        Html(String),
        Hang,
        Fail,
    }

    #[derive(Default)]
    pub struct ScriptedRenderer {
        pub scripts: HashMap<String, Script>,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl ScriptedRenderer {
        pub fn with(mut self, url: &str, script: Script) -> Self {
            self.scripts.insert(url.to_string(), script);
            self
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    pub struct ScriptedSession {
        scripts: HashMap<String, Script>,
        current: Option<Script>,
        closed: Arc<AtomicUsize>,
    }

    impl PageRenderer for ScriptedRenderer {
        type Session = ScriptedSession;

        async fn open_session(&self) -> Result<ScriptedSession> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedSession {
                scripts: self.scripts.clone(),
                current: None,
                closed: Arc::clone(&self.closed),
            })
        }
    }

    impl RenderSession for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> Result<()> {
            let script = self
                .scripts
                .get(url)
                .cloned()
                .unwrap_or_else(|| Script::Html("<html><body>Not Found</body></html>".to_string()));
            match script {
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
                Script::Fail => Err(HarvestError::Browser("net::ERR_CONNECTION_REFUSED".to_string())),
                html => {
                    self.current = Some(html);
                    Ok(())
                }
            }
        }

        async fn html(&mut self) -> Result<String> {
            match &self.current {
                Some(Script::Html(html)) => Ok(html.clone()),
                _ => Err(HarvestError::Browser("nothing rendered".to_string())),
            }
        }

        async fn close(self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
