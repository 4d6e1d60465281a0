use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::config::SiteConfig;
use crate::types::{ClassRecord, Weekday};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid selector '{0}'")]
    Selector(String),
}

static OPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option").expect("invalid selector: option"));

static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("invalid selector: link"));

/// Attribute carrying a select's live `selectedIndex` once the page state
/// has been synced.
const SELECTED_INDEX_ATTR: &str = "data-selected-index";

/// Copies the live form state into the markup so that the serialized page
/// shows what the user would see: `checked`, `value` and `selectedIndex`
/// set from script after load included.
pub(crate) const SYNC_FORM_STATE_SCRIPT: &str = r#"(() => {
  for (const el of document.querySelectorAll('input')) {
    if (el.type === 'checkbox' || el.type === 'radio') {
      el.toggleAttribute('checked', el.checked);
    } else {
      el.setAttribute('value', el.value);
    }
  }
  for (const el of document.querySelectorAll('textarea')) {
    el.textContent = el.value;
  }
  for (const el of document.querySelectorAll('select')) {
    el.setAttribute('data-selected-index', String(el.selectedIndex));
    Array.from(el.options).forEach((o, i) => o.toggleAttribute('selected', i === el.selectedIndex));
  }
  return true;
})()"#;

/// Checkbox names for each weekday, in the order of [`Weekday::ALL`].
const DAY_FIELDS: [&str; 7] = [
    "class_mon",
    "class_tues",
    "class_wed",
    "class_thurs",
    "class_fri",
    "class_sat",
    "class_sun",
];

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn named(tag: &str, name: &str) -> Selector {
    Selector::parse(&format!(r#"{}[name="{}"]"#, tag, name))
        .expect("invalid selector: named control")
}

/// Read-only view over a legacy form page.
struct Form {
    document: Html,
}

impl Form {
    fn new(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    fn first(&self, tag: &str, name: &str) -> Option<ElementRef<'_>> {
        self.document.select(&named(tag, name)).next()
    }

    /// The control's `value`, falling back to its trimmed text. Textareas
    /// only have text.
    fn text(&self, tag: &str, name: &str) -> String {
        let Some(element) = self.first(tag, name) else {
            return String::new();
        };

        let value = match element.value().name() {
            "textarea" => "",
            _ => element.value().attr("value").unwrap_or_default(),
        };

        if value.is_empty() {
            elem_text(element).trim().to_string()
        } else {
            value.to_string()
        }
    }

    fn checked(&self, name: &str) -> bool {
        self.first("input", name)
            .is_some_and(|e| e.value().attr("checked").is_some())
    }

    /// Label of the selected option.
    ///
    /// A synced `selectedIndex` is authoritative. Without one, an option
    /// carrying the `selected` attribute wins, otherwise the one the
    /// control would show on its own.
    fn selected(&self, name: &str) -> String {
        let Some(select) = self.first("select", name) else {
            return String::new();
        };

        let options: Vec<ElementRef> = select.select(&OPTION).collect();
        let chosen = match select.value().attr(SELECTED_INDEX_ATTR) {
            Some(index) => index
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| options.get(i)),
            None => options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| default_selection(select, &options)),
        };

        chosen
            .map(|o| elem_text(*o).trim().to_string())
            .unwrap_or_default()
    }

    fn class_days(&self) -> Vec<Weekday> {
        DAY_FIELDS
            .iter()
            .zip(Weekday::ALL)
            .filter(|(name, _)| self.checked(name))
            .map(|(_, day)| day)
            .collect()
    }

    fn date(&self, prefix: &str) -> String {
        let month = self.selected(&format!("{}_month", prefix));
        let day = self.selected(&format!("{}_day", prefix));
        let year = self.selected(&format!("{}_year", prefix));
        compose_date(&month, &day, &year)
    }

    fn time(&self, prefix: &str) -> String {
        let hours = self.selected(&format!("{}_time_hours", prefix));
        let mins = self.selected(&format!("{}_time_mins", prefix));
        let ampm = self.selected(&format!("{}_time_ampm", prefix));
        compose_time(&hours, &mins, &ampm)
    }
}

/// Option a select displays when none is explicitly selected: the first
/// enabled one for a single-row, single-choice control, nothing otherwise.
fn default_selection<'a, 'b>(
    select: ElementRef<'a>,
    options: &'b [ElementRef<'a>],
) -> Option<&'b ElementRef<'a>> {
    let attrs = select.value();
    let rows = attrs
        .attr("size")
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(1);
    if attrs.attr("multiple").is_some() || rows > 1 {
        return None;
    }
    options.iter().find(|o| o.value().attr("disabled").is_none())
}

fn compose_date(month: &str, day: &str, year: &str) -> String {
    if month.is_empty() || day.is_empty() || year.is_empty() {
        return String::new();
    }
    format!("{} {}, {}", month, day, year)
}

fn compose_time(hours: &str, mins: &str, ampm: &str) -> String {
    if hours.is_empty() || mins.is_empty() || ampm.is_empty() {
        return String::new();
    }
    format!("{}:{} {}", hours, mins, ampm)
}

/// Extracts a class from its detail page.
///
/// Missing controls never fail the parse; they leave the matching field at
/// its default.
pub fn parse_class_record(html: &str, url: &str, extracted_at: DateTime<Utc>) -> ClassRecord {
    let form = Form::new(html);

    ClassRecord {
        class_name: form.text("input", "class_name"),
        location: form.selected("location"),
        room: form.selected("room"),
        season: form.selected("season_id"),
        active: form.checked("active"),
        recital: form.checked("recital"),
        class_days: form.class_days(),
        tuition: form.text("input", "tuition"),
        bill_separately: form.checked("bill"),
        allow_registration_online: form.checked("online"),
        class_registration_fee: form.text("input", "registration_fee"),
        online_class_description: form.text("textarea", "description"),
        ignore_registration_fee: form.checked("ignore_reg_fee"),
        start_date: form.date("start"),
        end_date: form.date("end"),
        gender: form.selected("gender"),
        min_age: form.selected("min_age"),
        max_age: form.selected("max_age"),
        start_time: form.time("start"),
        end_time: form.time("end"),
        max_students: form.text("input", "max_students"),
        hide_on_live_schedule: form.checked("hide_live_schedule"),
        url: url.to_string(),
        last_updated: extracted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Collects the distinct detail links of every category panel, in
/// document order.
pub fn parse_detail_links(html: &str, site: &SiteConfig) -> Result<Vec<String>, ParseError> {
    let document = Html::parse_document(html);
    let panel_selector = Selector::parse(&site.panel_selector)
        .map_err(|_| ParseError::Selector(site.panel_selector.clone()))?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for panel in document.select(&panel_selector) {
        for anchor in panel.select(&LINK) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if href.contains(site.detail_path_marker.as_str()) && seen.insert(href.to_string()) {
                links.push(href.to_string());
            }
        }
    }

    Ok(links)
}
