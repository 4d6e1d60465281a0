use std::time::Duration;

use chrono::Utc;

use crate::browser::{BrowserError, BrowserPage};
use crate::config::SiteConfig;
use crate::parser::{ParseError, SYNC_FORM_STATE_SCRIPT, parse_class_record, parse_detail_links};
use crate::session::{SessionError, SessionManager, element_exists_script};
use crate::types::{ClassRecord, HopReport, LinkFailure};
use crate::utils::{WaitBound, await_condition};

pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(1000);

const LANDMARK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl ScraperError {
    /// Errors that end the whole run instead of just the current link.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScraperError::Session(SessionError::LoginTimeout(_) | SessionError::LoginCancelled)
        )
    }
}

/// Walks the class list and every class detail page over one browser tab.
#[derive(Debug, Clone)]
pub struct ClassScraper {
    site: SiteConfig,
    session: SessionManager,
    request_delay: Duration,
}

impl ClassScraper {
    pub fn new(site: SiteConfig, session: SessionManager) -> Self {
        Self {
            site,
            session,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Waits briefly for the logged-in landmark. Only logs when it is
    /// missing; the caller goes on regardless.
    pub async fn confirm_landing<P: BrowserPage>(&self, page: &P) -> bool {
        let script = element_exists_script(&self.site.landmark_selector);
        let script = script.as_str();
        let found = await_condition(
            move || async move { page.evaluate_bool(script).await.unwrap_or(false) },
            Duration::from_millis(100),
            WaitBound::Timeout(LANDMARK_TIMEOUT),
            &Default::default(),
        )
        .await
        .is_ok();

        if found {
            log::info!("Logged in using session cookies");
        } else {
            log::error!("Class list not found, the session may be expired. Please re-export cookies.");
        }
        found
    }

    /// Distinct detail links on the current (class list) page.
    pub async fn list_detail_links<P: BrowserPage>(
        &self,
        page: &P,
    ) -> Result<Vec<String>, ScraperError> {
        log::info!("Scanning for class links in all panels...");
        let html = page.content().await?;
        let links = parse_detail_links(&html, &self.site)?;
        log::info!("Found {} unique classes to process", links.len());
        Ok(links)
    }

    /// Visits each link in order. A failing link is recorded and skipped,
    /// but an abandoned re-login stops the batch with that error.
    pub async fn hop<P: BrowserPage>(
        &self,
        page: &P,
        links: &[String],
    ) -> Result<HopReport, ScraperError> {
        let mut report = HopReport::default();
        let total = links.len();

        for (i, link) in links.iter().enumerate() {
            log::info!("Processing class {}/{}: {}", i + 1, total, link);

            match self.fetch_class(page, link).await {
                Ok(record) => {
                    log::info!("Extracted data for: {}", record.display_name());
                    report.records.push(record);
                }
                Err(e) if e.is_fatal() => {
                    log::error!("Stopping at {}: {}", link, e);
                    return Err(e);
                }
                Err(e) => {
                    log::error!("Error processing {}: {}", link, e);
                    report.failures.push(LinkFailure {
                        link: link.clone(),
                        error: e.to_string(),
                    });
                }
            }

            tokio::time::sleep(self.request_delay).await;
        }

        Ok(report)
    }

    /// Loads one detail page, logging in again once if the session has
    /// lapsed mid-run.
    pub async fn fetch_class<P: BrowserPage>(
        &self,
        page: &P,
        link: &str,
    ) -> Result<ClassRecord, ScraperError> {
        let url = self.site.resolve(link);
        page.goto(&url).await?;

        if self.site.is_login_url(&page.current_url().await?) {
            log::warn!("Session expired during processing, refreshing...");
            self.session.ensure_logged_in(page).await?;
            page.goto(&url).await?;
        }

        if !page.evaluate_bool(SYNC_FORM_STATE_SCRIPT).await? {
            log::debug!("Form state not synced for {}", url);
        }

        let current_url = page.current_url().await?;
        let html = page.content().await?;
        Ok(parse_class_record(&html, &current_url, Utc::now()))
    }
}
