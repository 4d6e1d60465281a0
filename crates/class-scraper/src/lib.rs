pub mod browser;
pub mod config;
pub mod consent;
pub mod history;
mod parser;
pub mod pipeline;
pub mod scraper;
pub mod session;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::{PipelineConfig, SiteConfig};
pub use history::HistoryStore;
pub use parser::{ParseError, parse_class_record, parse_detail_links};
pub use scraper::ClassScraper;

pub(crate) const BASE_URL: &str = "https://app.gostudiopro.com";
