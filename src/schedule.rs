//! The persisted schedule document (`cron.json`).
//!
//! Three ordered lists, one per announcement kind. Entries have no stable id:
//! an entry is identified by its kind and its position in its list.

use crate::announcement::{AnnouncementKind, AnnouncementTemplate};
use serde::{Deserialize, Serialize};

/// Station call parameters as stored in the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationAnnouncement {
    pub train_number: String,
    pub direction: String,
    pub destination: String,
    pub track_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoAnnouncement {
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAnnouncement {
    pub language: String,
}

impl From<StationAnnouncement> for AnnouncementTemplate {
    fn from(s: StationAnnouncement) -> Self {
        AnnouncementTemplate::Station {
            train_number: s.train_number,
            direction: s.direction,
            destination: s.destination,
            track_number: s.track_number,
        }
    }
}

impl From<PromoAnnouncement> for AnnouncementTemplate {
    fn from(p: PromoAnnouncement) -> Self {
        AnnouncementTemplate::Promo { file: p.file }
    }
}

impl From<SafetyAnnouncement> for AnnouncementTemplate {
    fn from(s: SafetyAnnouncement) -> Self {
        AnnouncementTemplate::Safety { language: s.language }
    }
}

/// One row of a schedule list: a cron rule plus the announcement it plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduled<T> {
    /// Missing means disabled.
    #[serde(default)]
    pub enabled: bool,
    /// Unvalidated until the schedule is applied.
    #[serde(default)]
    pub cron: String,
    #[serde(flatten)]
    pub announcement: T,
}

impl<T> Scheduled<T> {
    pub fn new(cron: impl Into<String>, enabled: bool, announcement: T) -> Self {
        Scheduled {
            enabled,
            cron: cron.into(),
            announcement,
        }
    }
}

/// The full schedule. Replaced wholesale on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default)]
    pub station_announcements: Vec<Scheduled<StationAnnouncement>>,
    #[serde(default)]
    pub promo_announcements: Vec<Scheduled<PromoAnnouncement>>,
    #[serde(default)]
    pub safety_announcements: Vec<Scheduled<SafetyAnnouncement>>,
}

/// Kind-independent view of a schedule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub kind: AnnouncementKind,
    /// Position within its kind's list.
    pub index: usize,
    pub cron: String,
    pub enabled: bool,
    pub template: AnnouncementTemplate,
}

impl ScheduleEntry {
    /// Deterministic job id, e.g. `station_0`.
    pub fn job_id(&self) -> String {
        format!("{}_{}", self.kind, self.index)
    }

    /// Display name, e.g. `Station Announcement 1`.
    pub fn job_name(&self) -> String {
        format!("{} Announcement {}", self.kind.label(), self.index + 1)
    }
}

impl ScheduleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in document order: stations, then promos, then safety.
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        fn collect<T: Clone + Into<AnnouncementTemplate>>(
            kind: AnnouncementKind,
            rows: &[Scheduled<T>],
            out: &mut Vec<ScheduleEntry>,
        ) {
            for (index, row) in rows.iter().enumerate() {
                out.push(ScheduleEntry {
                    kind,
                    index,
                    cron: row.cron.clone(),
                    enabled: row.enabled,
                    template: row.announcement.clone().into(),
                });
            }
        }

        let mut out = Vec::with_capacity(self.len());
        collect(AnnouncementKind::Station, &self.station_announcements, &mut out);
        collect(AnnouncementKind::Promo, &self.promo_announcements, &mut out);
        collect(AnnouncementKind::Safety, &self.safety_announcements, &mut out);
        out
    }

    /// Total entries across all three lists.
    pub fn len(&self) -> usize {
        self.station_announcements.len()
            + self.promo_announcements.len()
            + self.safety_announcements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enabled_count(&self) -> usize {
        self.entries().iter().filter(|e| e.enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "station_announcements": [
            {"enabled": true, "cron": "0 8 * * 1-5", "train_number": "1",
             "direction": "westbound", "destination": "goodwin_station", "track_number": "1"}
        ],
        "promo_announcements": [
            {"enabled": false, "cron": "*/30 * * * *", "file": "gift_shop"}
        ],
        "safety_announcements": [
            {"enabled": true, "cron": "0 * * * *", "language": "english"},
            {"cron": "30 * * * *", "language": "spanish"}
        ],
        "comment": "ignored"
    }"#;

    #[test]
    fn parses_flat_entries_and_ignores_unknown_keys() {
        let doc: ScheduleDocument = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(doc.len(), 4);
        assert_eq!(doc.station_announcements[0].announcement.destination, "goodwin_station");
        assert_eq!(doc.promo_announcements[0].announcement.file, "gift_shop");
        assert!(!doc.safety_announcements[1].enabled, "missing flag means disabled");
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let doc: ScheduleDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.is_empty());
        let doc: ScheduleDocument =
            serde_json::from_str(r#"{"promo_announcements": []}"#).unwrap();
        assert!(doc.station_announcements.is_empty());
    }

    #[test]
    fn station_missing_field_is_structural_error() {
        let json = r#"{"station_announcements": [{"enabled": true, "cron": "* * * * *",
            "train_number": "1", "direction": "eastbound", "track_number": "2"}]}"#;
        assert!(serde_json::from_str::<ScheduleDocument>(json).is_err());
    }

    #[test]
    fn entries_carry_positional_ids() {
        let doc: ScheduleDocument = serde_json::from_str(SAMPLE).unwrap();
        let ids: Vec<String> = doc.entries().iter().map(|e| e.job_id()).collect();
        assert_eq!(ids, vec!["station_0", "promo_0", "safety_0", "safety_1"]);
        assert_eq!(doc.entries()[3].job_name(), "Safety Announcement 2");
        assert_eq!(doc.enabled_count(), 2);
    }

    #[test]
    fn entries_build_templates() {
        let doc: ScheduleDocument = serde_json::from_str(SAMPLE).unwrap();
        let entries = doc.entries();
        assert_eq!(
            entries[0].template,
            AnnouncementTemplate::Station {
                train_number: "1".into(),
                direction: "westbound".into(),
                destination: "goodwin_station".into(),
                track_number: "1".into(),
            }
        );
        assert_eq!(
            entries[2].template,
            AnnouncementTemplate::Safety { language: "english".into() }
        );
    }

    #[test]
    fn serializes_back_to_flat_shape() {
        let mut doc = ScheduleDocument::new();
        doc.promo_announcements
            .push(Scheduled::new("0 12 * * *", true, PromoAnnouncement { file: "museum".into() }));
        let json = serde_json::to_value(&doc).unwrap();
        let row = &json["promo_announcements"][0];
        assert_eq!(row["file"], "museum");
        assert_eq!(row["cron"], "0 12 * * *");
        assert_eq!(row["enabled"], true);
        assert!(json["station_announcements"].as_array().unwrap().is_empty());
    }
}
