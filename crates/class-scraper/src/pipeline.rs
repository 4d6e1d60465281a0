use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserError, BrowserPage, BrowserSession};
use crate::config::PipelineConfig;
use crate::consent::dismiss_consent;
use crate::history::{HistoryError, HistoryStore, ReconcileOutcome};
use crate::scraper::{ClassScraper, ScraperError};
use crate::session::{SessionError, SessionManager};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Scrape error: {0}")]
    Scrape(#[from] ScraperError),
    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub links_found: usize,
    pub extracted: usize,
    pub failed: usize,
    pub outcome: ReconcileOutcome,
}

/// Runs one complete refresh: log in, collect every class, persist.
///
/// The browser is closed before returning, whether the run succeeded or not.
pub async fn run(
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<RunSummary, PipelineError> {
    let session = SessionManager::new(config.site.clone(), &config.cookies_path)
        .with_login_timeout(config.login_timeout)
        .with_cancellation(cancel);
    let scraper = ClassScraper::new(config.site.clone(), session)
        .with_request_delay(config.request_delay);
    let store = HistoryStore::new(&config.history_path);

    let browser = BrowserSession::launch(config.headless).await?;
    let result = scrape_and_store(browser.page(), &scraper, &store).await;
    browser.close().await;

    result
}

/// Pipeline body over any page, separated from browser lifetime handling.
///
/// Nothing is written to the history file unless every link was visited.
pub async fn scrape_and_store<P: BrowserPage>(
    page: &P,
    scraper: &ClassScraper,
    store: &HistoryStore,
) -> Result<RunSummary, PipelineError> {
    let session = scraper.session();
    session.load(page).await?;
    session.ensure_logged_in(page).await?;

    dismiss_consent(page, scraper.site()).await;
    scraper.confirm_landing(page).await;

    let links = scraper.list_detail_links(page).await?;
    let report = scraper.hop(page, &links).await?;

    if !report.failures.is_empty() {
        log::warn!(
            "{} of {} class(es) could not be extracted",
            report.failures.len(),
            links.len()
        );
    }

    let extracted = report.records.len();
    let outcome = store.reconcile(report.records).await?;

    Ok(RunSummary {
        links_found: links.len(),
        extracted,
        failed: report.failures.len(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::history::DatasetChange;
    use crate::session::element_exists_script;
    use crate::test_support::FakePage;
    use crate::types::ClassRecord;
    use std::time::Duration;

    const LIST: &str = r#"<ul id="season_tabs"></ul>
        <div class="tab-pane">
            <a href="class_detail.php?class_id=1">Ballet</a>
            <a href="class_detail.php?class_id=2">Broken</a>
        </div>
        <div class="tab-pane">
            <a href="class_detail.php?class_id=1">Ballet</a>
        </div>"#;

    #[tokio::test(start_paused = true)]
    async fn test_scrape_and_store_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let cookies_path = dir.path().join("cookies.json");
        std::fs::write(&cookies_path, "[]").unwrap();

        let site = SiteConfig::default();
        let page = FakePage::new();
        page.add_page(&site.landing_url(), LIST);
        page.add_page(
            &site.resolve("class_detail.php?class_id=1"),
            r#"<input name="class_name" value="Ballet">"#,
        );
        page.fail_navigation(&site.resolve("class_detail.php?class_id=2"));

        let session = SessionManager::new(site.clone(), &cookies_path);
        let scraper = ClassScraper::new(site, session);
        let store = HistoryStore::new(dir.path().join("class-data.json"));

        let summary = scrape_and_store(&page, &scraper, &store).await.unwrap();
        assert_eq!(summary.links_found, 2);
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.outcome.saved);
        assert_eq!(summary.outcome.change, DatasetChange::Initial);

        let current = store.current().await.unwrap().unwrap();
        assert_eq!(current.classes[0].class_name, "Ballet");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_relogin_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cookies_path = dir.path().join("cookies.json");
        std::fs::write(&cookies_path, "[]").unwrap();

        let store = HistoryStore::new(dir.path().join("class-data.json"));
        let seeded = ["Ballet", "Tap"]
            .into_iter()
            .map(|name| ClassRecord {
                class_name: name.into(),
                ..Default::default()
            })
            .collect();
        store.reconcile(seeded).await.unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let site = SiteConfig::default();
        let page = FakePage::new();
        page.add_page(&site.landing_url(), LIST);
        page.add_page(
            &site.resolve("class_detail.php?class_id=1"),
            r#"<input name="class_name" value="Ballet">"#,
        );

        let cancel = CancellationToken::new();
        let session = SessionManager::new(site.clone(), &cookies_path).with_cancellation(cancel.clone());
        let scraper = ClassScraper::new(site.clone(), session);

        // Session lapses while the landmark check is polling, then the
        // operator interrupts the run.
        let expire = page.clone();
        let landmark = element_exists_script(&site.landmark_selector);
        tokio::spawn(async move {
            while !expire.evaluations().contains(&landmark) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            expire.redirect(&site.landing_url(), &site.login_url());
            expire.redirect(&site.resolve("class_detail.php?class_id=1"), &site.login_url());
            expire.redirect(&site.resolve("class_detail.php?class_id=2"), &site.login_url());
            cancel.cancel();
        });

        let err = scrape_and_store(&page, &scraper, &store).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Scrape(ScraperError::Session(SessionError::LoginCancelled))
        ));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
        let current = store.current().await.unwrap().unwrap();
        assert_eq!(current.classes.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_cookie_file_stops_before_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let site = SiteConfig::default();
        let page = FakePage::new();
        let session = SessionManager::new(site.clone(), dir.path().join("missing.json"));
        let scraper = ClassScraper::new(site, session);
        let store = HistoryStore::new(dir.path().join("class-data.json"));

        let err = scrape_and_store(&page, &scraper, &store).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Session(SessionError::CookieFile { .. })
        ));
        assert!(page.visited().is_empty());
        assert!(!store.path().exists());
    }
}
