use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::browser::{BrowserError, BrowserPage};
use crate::types::StoredCookie;

#[derive(Debug, Default)]
struct State {
    location: String,
    visited: Vec<String>,
    redirects: HashMap<String, String>,
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    script_results: HashMap<String, bool>,
    evaluations: Vec<String>,
    browser_cookies: Vec<StoredCookie>,
    applied_cookies: Vec<StoredCookie>,
}

/// In-memory stand-in for a browser tab.
///
/// Navigation follows registered redirects, scripts answer with whatever
/// was registered for that exact source (`false` otherwise), and every call
/// is recorded.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<State>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_page(&self, url: &str, html: &str) {
        self.with(|s| s.pages.insert(url.to_string(), html.to_string()));
    }

    pub fn redirect(&self, from: &str, to: &str) {
        self.with(|s| s.redirects.insert(from.to_string(), to.to_string()));
    }

    pub fn clear_redirects(&self) {
        self.with(|s| s.redirects.clear());
    }

    pub fn fail_navigation(&self, url: &str) {
        self.with(|s| s.failing.insert(url.to_string()));
    }

    /// Simulates the user navigating by hand.
    pub fn set_location(&self, url: &str) {
        self.with(|s| s.location = url.to_string());
    }

    pub fn set_script_result(&self, script: &str, result: bool) {
        self.with(|s| s.script_results.insert(script.to_string(), result));
    }

    pub fn set_browser_cookies(&self, cookies: Vec<StoredCookie>) {
        self.with(|s| s.browser_cookies = cookies);
    }

    pub fn visited(&self) -> Vec<String> {
        self.with(|s| s.visited.clone())
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.with(|s| s.evaluations.clone())
    }

    pub fn applied_cookies(&self) -> Vec<StoredCookie> {
        self.with(|s| s.applied_cookies.clone())
    }
}

impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.with(|s| {
            s.visited.push(url.to_string());
            if s.failing.contains(url) {
                return Err(BrowserError::Config(format!("net::ERR_FAILED at {url}")));
            }
            s.location = s
                .redirects
                .get(url)
                .cloned()
                .unwrap_or_else(|| url.to_string());
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.with(|s| s.location.clone()))
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.with(|s| s.pages.get(&s.location).cloned().unwrap_or_default()))
    }

    async fn evaluate_bool(&self, script: &str) -> Result<bool, BrowserError> {
        Ok(self.with(|s| {
            s.evaluations.push(script.to_string());
            s.script_results.get(script).copied().unwrap_or(false)
        }))
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        Ok(self.with(|s| s.browser_cookies.clone()))
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError> {
        self.with(|s| s.applied_cookies.extend_from_slice(cookies));
        Ok(())
    }
}
