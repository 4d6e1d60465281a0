use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Canonical order used for `classDays`.
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];
}

/// One class as rendered on its detail page.
///
/// Every field is always serialized. Select and text fields fall back to an
/// empty string and flags to `false`, so two records can be compared field by
/// field no matter which controls the page actually had.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassRecord {
    pub class_name: String,
    pub location: String,
    pub room: String,
    pub season: String,
    pub active: bool,
    pub recital: bool,
    pub class_days: Vec<Weekday>,
    pub tuition: String,
    pub bill_separately: bool,
    pub allow_registration_online: bool,
    pub class_registration_fee: String,
    pub online_class_description: String,
    pub ignore_registration_fee: bool,
    pub start_date: String,
    pub end_date: String,
    pub gender: String,
    pub min_age: String,
    pub max_age: String,
    pub start_time: String,
    pub end_time: String,
    pub max_students: String,
    pub hide_on_live_schedule: bool,
    pub url: String,
    pub last_updated: String,
}

impl ClassRecord {
    /// Copy of the record with the provenance fields (`url`, `lastUpdated`)
    /// cleared, used when diffing datasets.
    pub fn without_provenance(&self) -> ClassRecord {
        ClassRecord {
            url: String::new(),
            last_updated: String::new(),
            ..self.clone()
        }
    }

    pub fn display_name(&self) -> &str {
        if self.class_name.is_empty() {
            "Untitled Class"
        } else {
            &self.class_name
        }
    }
}

/// One persisted capture of the full dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSnapshot")]
pub struct HistorySnapshot {
    pub timestamp: DateTime<Utc>,
    pub extraction_date: NaiveDate,
    pub class_count: usize,
    pub data: Vec<ClassRecord>,
}

/// Snapshots migrated from the bare-array format were written with only a
/// timestamp and data.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    timestamp: DateTime<Utc>,
    extraction_date: Option<NaiveDate>,
    class_count: Option<usize>,
    #[serde(default)]
    data: Vec<ClassRecord>,
}

impl From<RawSnapshot> for HistorySnapshot {
    fn from(raw: RawSnapshot) -> Self {
        Self {
            extraction_date: raw
                .extraction_date
                .unwrap_or_else(|| raw.timestamp.date_naive()),
            class_count: raw.class_count.unwrap_or(raw.data.len()),
            timestamp: raw.timestamp,
            data: raw.data,
        }
    }
}

impl HistorySnapshot {
    pub fn new(timestamp: DateTime<Utc>, data: Vec<ClassRecord>) -> Self {
        Self {
            timestamp,
            extraction_date: timestamp.date_naive(),
            class_count: data.len(),
            data,
        }
    }
}

/// On-disk layout of the class data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFile {
    pub last_updated: DateTime<Utc>,
    pub total_versions: usize,
    #[serde(default)]
    pub current_data: Option<Vec<ClassRecord>>,
    #[serde(default)]
    pub history: Vec<HistorySnapshot>,
}

/// A browser cookie in the shape the cookie file stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default = "default_cookie_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_cookie_expiry() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFailure {
    pub link: String,
    pub error: String,
}

/// Result of visiting every detail link once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopReport {
    pub records: Vec<ClassRecord>,
    pub failures: Vec<LinkFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_record_serializes_every_field() {
        let json = serde_json::to_value(ClassRecord::default()).expect("serialize");
        let obj = json.as_object().expect("object");

        assert_eq!(obj.len(), 24);
        assert_eq!(obj["className"], "");
        assert_eq!(obj["classDays"], serde_json::json!([]));
        assert_eq!(obj["hideOnLiveSchedule"], false);
        assert_eq!(obj["onlineClassDescription"], "");
    }

    #[test]
    fn test_class_record_tolerates_missing_keys() {
        let record: ClassRecord =
            serde_json::from_str(r#"{"className":"Ballet I","classDays":["monday","friday"]}"#)
                .expect("deserialize");

        assert_eq!(record.class_name, "Ballet I");
        assert_eq!(record.class_days, vec![Weekday::Monday, Weekday::Friday]);
        assert_eq!(record.room, "");
        assert!(!record.active);
    }

    #[test]
    fn test_without_provenance_clears_only_volatile_fields() {
        let record = ClassRecord {
            class_name: "Tap".into(),
            url: "https://example.com/a".into(),
            last_updated: "2026-01-01T00:00:00.000Z".into(),
            ..Default::default()
        };

        let normalized = record.without_provenance();
        assert_eq!(normalized.class_name, "Tap");
        assert!(normalized.url.is_empty());
        assert!(normalized.last_updated.is_empty());
    }

    #[test]
    fn test_stored_cookie_accepts_puppeteer_shape() {
        let cookie: StoredCookie = serde_json::from_str(
            r#"{"name":"PHPSESSID","value":"abc","domain":"app.gostudiopro.com","path":"/","expires":-1,"size":41,"httpOnly":false,"secure":true,"session":true,"sameSite":"Lax","priority":"Medium"}"#,
        )
        .expect("deserialize");

        assert_eq!(cookie.name, "PHPSESSID");
        assert!(cookie.secure);
        assert!(cookie.session);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }

    #[test]
    fn test_snapshot_without_date_or_count() {
        let snapshot: HistorySnapshot = serde_json::from_str(
            r#"{"timestamp":"2025-06-30T18:04:11.512Z","data":[{"className":"Tap"}]}"#,
        )
        .expect("deserialize");

        assert_eq!(snapshot.extraction_date.to_string(), "2025-06-30");
        assert_eq!(snapshot.class_count, 1);
        assert_eq!(snapshot.data[0].class_name, "Tap");
    }
}
