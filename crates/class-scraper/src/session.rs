use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserError, BrowserPage};
use crate::config::SiteConfig;
use crate::types::StoredCookie;
use crate::utils::{WaitBound, WaitError, await_condition};

pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot load cookies from {}: {reason}", path.display())]
    CookieFile { path: PathBuf, reason: String },
    #[error("Failed to save cookies: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize cookies: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("Manual login did not complete within {0:?}")]
    LoginTimeout(Duration),
    #[error("Manual login wait was cancelled")]
    LoginCancelled,
}

/// Keeps the browser logged in, handing over to a human when the stored
/// session has expired.
#[derive(Debug, Clone)]
pub struct SessionManager {
    site: SiteConfig,
    cookies_path: PathBuf,
    login_timeout: Duration,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(site: SiteConfig, cookies_path: impl Into<PathBuf>) -> Self {
        Self {
            site,
            cookies_path: cookies_path.into(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Token that aborts a pending manual-login wait.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Applies the stored cookies to the page. A missing or unreadable
    /// cookie file is fatal.
    pub async fn load<P: BrowserPage>(&self, page: &P) -> Result<usize, SessionError> {
        let cookies = read_cookie_file(&self.cookies_path).await?;
        page.set_cookies(&cookies).await?;
        log::info!(
            "Loaded {} cookie(s) from {}",
            cookies.len(),
            self.cookies_path.display()
        );
        Ok(cookies.len())
    }

    /// Leaves the page on the landing screen with a valid session.
    pub async fn ensure_logged_in<P: BrowserPage>(&self, page: &P) -> Result<(), SessionError> {
        log::info!("Checking login status...");
        page.goto(&self.site.landing_url()).await?;

        let url = page.current_url().await?;
        if !self.site.is_login_url(&url) {
            log::info!("Already logged in");
            return Ok(());
        }

        log::warn!("Session expired, waiting for manual login...");
        page.goto(&self.site.login_url()).await?;
        log::warn!(
            "Please log in manually in the browser window within {:?}; the run continues automatically afterwards",
            self.login_timeout
        );

        self.wait_for_login(page).await?;

        let cookies = page.cookies().await?;
        let kept = self.persist(cookies).await?;
        log::info!(
            "Cookies refreshed and saved ({} kept) to {}",
            kept,
            self.cookies_path.display()
        );

        page.goto(&self.site.landing_url()).await?;
        Ok(())
    }

    async fn wait_for_login<P: BrowserPage>(&self, page: &P) -> Result<(), SessionError> {
        let landmark_script = element_exists_script(&self.site.landmark_selector);
        let script = landmark_script.as_str();

        await_condition(
            move || self.login_completed(page, script),
            LOGIN_POLL_INTERVAL,
            WaitBound::Timeout(self.login_timeout),
            &self.cancel,
        )
        .await
        .map_err(|e| match e {
            WaitError::Cancelled => SessionError::LoginCancelled,
            _ => SessionError::LoginTimeout(self.login_timeout),
        })
    }

    async fn login_completed<P: BrowserPage>(&self, page: &P, landmark_script: &str) -> bool {
        let Ok(url) = page.current_url().await else {
            return false;
        };
        if url.contains(self.site.login_page.as_str()) {
            return false;
        }
        if self.site.is_authenticated_url(&url) {
            return true;
        }
        page.evaluate_bool(landmark_script).await.unwrap_or(false)
    }

    /// Writes the session-relevant subset of `cookies`, returning how many
    /// were kept.
    async fn persist(&self, cookies: Vec<StoredCookie>) -> Result<usize, SessionError> {
        let kept = filter_session_cookies(&self.site, cookies);
        let json = serde_json::to_string_pretty(&kept)?;
        tokio::fs::write(&self.cookies_path, json).await?;
        Ok(kept.len())
    }
}

pub fn filter_session_cookies(site: &SiteConfig, cookies: Vec<StoredCookie>) -> Vec<StoredCookie> {
    cookies
        .into_iter()
        .filter(|c| site.is_session_cookie(&c.name))
        .collect()
}

async fn read_cookie_file(path: &Path) -> Result<Vec<StoredCookie>, SessionError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SessionError::CookieFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    serde_json::from_str(&content).map_err(|e| SessionError::CookieFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Script answering whether `selector` matches anything in the document.
pub(crate) fn element_exists_script(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!("document.querySelector({}) !== null", quoted)
}
