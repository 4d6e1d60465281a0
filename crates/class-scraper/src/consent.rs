use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::BrowserPage;
use crate::config::SiteConfig;
use crate::session::element_exists_script;
use crate::utils::{WaitBound, await_condition};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const HOST_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_ATTEMPTS: u32 = 50;
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Script that clicks the accept button inside the overlay's shadow root,
/// answering whether it found one.
pub(crate) fn accept_script(site: &SiteConfig) -> String {
    let host = serde_json::to_string(&site.consent_host_selector).unwrap_or_default();
    let button = serde_json::to_string(&site.consent_accept_selector).unwrap_or_default();
    format!(
        r#"(() => {{
  const host = document.querySelector({host});
  const button = host && host.shadowRoot ? host.shadowRoot.querySelector({button}) : null;
  if (!button) return false;
  button.click();
  return true;
}})()"#
    )
}

/// Clicks away the privacy-consent overlay if it shows up.
///
/// Returns `true` once the overlay is gone, including when it never showed
/// up, and `false` when its accept button could not be found. Never fails
/// the run.
pub async fn dismiss_consent<P: BrowserPage>(page: &P, site: &SiteConfig) -> bool {
    log::info!("Waiting for consent overlay...");
    let cancel = CancellationToken::new();

    let host_script = element_exists_script(&site.consent_host_selector);
    let host_script = host_script.as_str();
    let host_found = await_condition(
        move || async move { page.evaluate_bool(host_script).await.unwrap_or(false) },
        POLL_INTERVAL,
        WaitBound::Timeout(HOST_TIMEOUT),
        &cancel,
    )
    .await;
    if host_found.is_err() {
        log::info!("Consent overlay not found or already dismissed");
        return true;
    }

    let accept = accept_script(site);
    let accept = accept.as_str();
    let clicked = await_condition(
        move || async move { page.evaluate_bool(accept).await.unwrap_or(false) },
        POLL_INTERVAL,
        WaitBound::Attempts(ACCEPT_ATTEMPTS),
        &cancel,
    )
    .await;

    match clicked {
        Ok(()) => {
            log::info!("Accepted privacy consent overlay");
            tokio::time::sleep(SETTLE_DELAY).await;
            true
        }
        Err(e) => {
            log::warn!("Consent accept button not found: {}", e);
            false
        }
    }
}
