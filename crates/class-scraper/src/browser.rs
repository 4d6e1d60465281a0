use std::future::Future;

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::types::StoredCookie;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to configure browser: {0}")]
    Config(String),
    #[error("Failed to launch browser: {0}")]
    Launch(#[source] CdpError),
    #[error("DevTools protocol error: {0}")]
    Cdp(#[from] CdpError),
    #[error("Unexpected script result: {0}")]
    Script(#[from] serde_json::Error),
}

/// The slice of a browser tab the scraper drives.
pub trait BrowserPage {
    /// Navigates and waits for the page to load.
    fn goto(&self, url: &str) -> impl Future<Output = Result<(), BrowserError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, BrowserError>> + Send;

    /// Serialized HTML of the current document.
    fn content(&self) -> impl Future<Output = Result<String, BrowserError>> + Send;

    /// Evaluates an expression that must produce a boolean.
    fn evaluate_bool(&self, script: &str)
    -> impl Future<Output = Result<bool, BrowserError>> + Send;

    fn cookies(&self) -> impl Future<Output = Result<Vec<StoredCookie>, BrowserError>> + Send;

    fn set_cookies(
        &self,
        cookies: &[StoredCookie],
    ) -> impl Future<Output = Result<(), BrowserError>> + Send;
}

impl BrowserPage for Page {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        Page::goto(self, url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(Page::content(self).await?)
    }

    async fn evaluate_bool(&self, script: &str) -> Result<bool, BrowserError> {
        Ok(self.evaluate(script).await?.into_value::<bool>()?)
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        let cookies = self.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
                session: c.session,
                same_site: c.same_site.map(|s| format!("{s:?}")),
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError> {
        let params: Vec<CookieParam> = cookies
            .iter()
            .filter(|c| !c.name.is_empty() && !c.domain.is_empty())
            .map(|c| {
                let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                param.domain = Some(c.domain.clone());
                param.path = Some(c.path.clone());
                param.secure = Some(c.secure);
                param.http_only = Some(c.http_only);
                if !c.session && c.expires > 0.0 {
                    param.expires = Some(TimeSinceEpoch::new(c.expires));
                }
                param
            })
            .collect();

        if !params.is_empty() {
            Page::set_cookies(self, params).await?;
        }
        Ok(())
    }
}

/// A launched browser with the single page the pipeline uses.
///
/// Call [`BrowserSession::close`] when done; dropping the session only
/// stops the event handler.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl BrowserSession {
    pub async fn launch(headless: bool) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !headless {
            builder = builder.with_head();
        }
        if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
            log::info!("Using custom Chrome binary: {}", chrome_bin);
            builder = builder.chrome_executable(chrome_bin);
        }
        let config = builder.build().map_err(BrowserError::Config)?;

        log::info!(
            "Launching browser in {} mode",
            if headless { "headless" } else { "visible" }
        );
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(BrowserError::Launch)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Browser handler error (ignoring): {}", e);
                }
            }
            log::debug!("Browser handler task ended");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(e.into());
            }
        };

        Ok(Self {
            browser,
            handler_task,
            page,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            log::warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            log::warn!("Failed to wait for browser exit: {}", e);
        }
        self.handler_task.abort();
        log::info!("Browser closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
