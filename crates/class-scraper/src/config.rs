use std::path::PathBuf;
use std::time::Duration;

/// Addresses, markers and selectors of the studio-management site.
///
/// These are tied to the vendor's markup and carry no logic of their own;
/// tests override individual fields to point the components at fixtures.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Prefix every relative detail link is joined to.
    pub apps_url: String,
    pub landing_page: String,
    pub login_page: String,
    /// Substrings that mark an address as the login screen.
    pub login_markers: Vec<String>,
    /// Substrings that mark an address as an authenticated screen.
    pub authenticated_markers: Vec<String>,
    /// Element that only renders once logged in.
    pub landmark_selector: String,
    pub consent_host_selector: String,
    pub consent_accept_selector: String,
    pub panel_selector: String,
    pub detail_path_marker: String,
    pub session_cookie_name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            apps_url: format!("{}/apps/", crate::BASE_URL),
            landing_page: "classes.php".into(),
            login_page: "index.php".into(),
            login_markers: vec!["index.php".into(), "login".into()],
            authenticated_markers: vec!["classes.php".into(), "dashboard".into()],
            landmark_selector: "#season_tabs".into(),
            consent_host_selector: "#usercentrics-root".into(),
            consent_accept_selector: r#"[data-testid="uc-accept-all-button"]"#.into(),
            panel_selector: ".tab-pane".into(),
            detail_path_marker: "class_detail.php".into(),
            session_cookie_name: "PHPSESSID".into(),
        }
    }
}

impl SiteConfig {
    pub fn landing_url(&self) -> String {
        self.resolve(&self.landing_page)
    }

    pub fn login_url(&self) -> String {
        self.resolve(&self.login_page)
    }

    /// Turns a link as found on the page into an absolute address.
    pub fn resolve(&self, link: &str) -> String {
        if link.starts_with("http") {
            link.to_string()
        } else {
            format!("{}{}", self.apps_url, link.trim_start_matches('/'))
        }
    }

    pub fn is_login_url(&self, url: &str) -> bool {
        self.login_markers.iter().any(|m| url.contains(m.as_str()))
    }

    pub fn is_authenticated_url(&self, url: &str) -> bool {
        self.authenticated_markers
            .iter()
            .any(|m| url.contains(m.as_str()))
    }

    /// Whether a cookie is worth persisting after a fresh login.
    pub fn is_session_cookie(&self, name: &str) -> bool {
        name == self.session_cookie_name || name.contains("session") || name.contains("auth")
    }
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub site: SiteConfig,
    pub cookies_path: PathBuf,
    pub history_path: PathBuf,
    pub headless: bool,
    /// Upper bound on the interactive login wait.
    pub login_timeout: Duration,
    /// Pause after every detail page.
    pub request_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            cookies_path: PathBuf::from("cookies.json"),
            history_path: PathBuf::from("class-data.json"),
            headless: false,
            login_timeout: crate::session::DEFAULT_LOGIN_TIMEOUT,
            request_delay: crate::scraper::DEFAULT_REQUEST_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute_links() {
        let site = SiteConfig::default();

        assert_eq!(
            site.resolve("class_detail.php?id=12"),
            "https://app.gostudiopro.com/apps/class_detail.php?id=12"
        );
        assert_eq!(
            site.resolve("/class_detail.php?id=12"),
            "https://app.gostudiopro.com/apps/class_detail.php?id=12"
        );
        assert_eq!(
            site.resolve("https://elsewhere.test/x"),
            "https://elsewhere.test/x"
        );
        assert_eq!(
            site.landing_url(),
            "https://app.gostudiopro.com/apps/classes.php"
        );
    }

    #[test]
    fn test_login_and_authenticated_markers() {
        let site = SiteConfig::default();

        assert!(site.is_login_url("https://app.gostudiopro.com/apps/index.php"));
        assert!(site.is_login_url("https://app.gostudiopro.com/login?next=1"));
        assert!(!site.is_login_url("https://app.gostudiopro.com/apps/classes.php"));
        assert!(site.is_authenticated_url("https://app.gostudiopro.com/apps/classes.php"));
        assert!(site.is_authenticated_url("https://app.gostudiopro.com/dashboard"));
    }

    #[test]
    fn test_session_cookie_filter_is_case_sensitive() {
        let site = SiteConfig::default();

        assert!(site.is_session_cookie("PHPSESSID"));
        assert!(site.is_session_cookie("gsp_session"));
        assert!(site.is_session_cookie("oauth_token"));
        assert!(!site.is_session_cookie("SESSION"));
        assert!(!site.is_session_cookie("Auth"));
        assert!(!site.is_session_cookie("_ga"));
    }
}
