//! Static lookup catalogs used to validate manual announcements.
//!
//! Each catalog lives in `<json_dir>/<name>.json` as
//! `{"<name>": [{"id": "...", "name": "..."}]}`. A missing or malformed file
//! gives an empty catalog, and an empty catalog accepts any id.

use crate::announcement::AnnouncementTemplate;
use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        CatalogItem {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub trains: Vec<CatalogItem>,
    pub directions: Vec<CatalogItem>,
    pub destinations: Vec<CatalogItem>,
    pub tracks: Vec<CatalogItem>,
    pub promo: Vec<CatalogItem>,
    pub safety: Vec<CatalogItem>,
}

impl Catalog {
    /// Load all six catalogs from `json_dir`. Never fails.
    pub fn load(json_dir: &Path) -> Self {
        Catalog {
            trains: load_list(json_dir, "trains"),
            directions: load_list(json_dir, "directions"),
            destinations: load_list(json_dir, "destinations"),
            tracks: load_list(json_dir, "tracks"),
            promo: load_list(json_dir, "promo"),
            safety: load_list(json_dir, "safety"),
        }
    }

    /// Validate a manually requested announcement.
    pub fn check(&self, template: &AnnouncementTemplate) -> Result<(), CatalogError> {
        match template {
            AnnouncementTemplate::Station {
                train_number,
                direction,
                destination,
                track_number,
            } => {
                let missing: Vec<&'static str> = [
                    ("train_number", train_number),
                    ("direction", direction),
                    ("destination", destination),
                    ("track_number", track_number),
                ]
                .into_iter()
                .filter(|(_, v)| v.trim().is_empty())
                .map(|(k, _)| k)
                .collect();
                if !missing.is_empty() {
                    return Err(CatalogError::MissingFields(missing));
                }
                ensure_clip_ids(template)?;
                ensure_known("train_number", train_number, &self.trains)?;
                ensure_known("direction", direction, &self.directions)?;
                ensure_known("destination", destination, &self.destinations)?;
                ensure_known("track_number", track_number, &self.tracks)
            }
            AnnouncementTemplate::Promo { file } => {
                if file.trim().is_empty() {
                    return Err(CatalogError::MissingFields(vec!["file"]));
                }
                ensure_clip_ids(template)?;
                let stem = file.strip_suffix(".mp3").unwrap_or(file);
                ensure_known("file", stem, &self.promo)
            }
            AnnouncementTemplate::Safety { language } => {
                if language.trim().is_empty() {
                    return Err(CatalogError::MissingFields(vec!["language"]));
                }
                ensure_clip_ids(template)?;
                ensure_known("language", language, &self.safety)
            }
        }
    }
}

fn ensure_clip_ids(template: &AnnouncementTemplate) -> Result<(), CatalogError> {
    match template.invalid_id() {
        Some((field, value)) => Err(CatalogError::InvalidId {
            field,
            value: value.to_string(),
        }),
        None => Ok(()),
    }
}

fn ensure_known(field: &'static str, value: &str, list: &[CatalogItem]) -> Result<(), CatalogError> {
    if list.is_empty() || list.iter().any(|item| item.id == value) {
        return Ok(());
    }
    Err(CatalogError::Unknown {
        field,
        value: value.to_string(),
        available: list.iter().map(|item| item.id.clone()).collect(),
    })
}

fn load_list(json_dir: &Path, name: &str) -> Vec<CatalogItem> {
    let path = json_dir.join(format!("{}.json", name));
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(_) => {
            debug!(catalog = name, "no catalog file, using empty list");
            return Vec::new();
        }
    };

    match serde_json::from_str::<HashMap<String, Vec<CatalogItem>>>(&text) {
        Ok(mut map) => match map.remove(name) {
            Some(items) => items,
            None => {
                warn!(catalog = name, "'{}' has no \"{}\" key, ignoring", path.display(), name);
                Vec::new()
            }
        },
        Err(e) => {
            warn!(catalog = name, "'{}' does not match catalog schema: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(format!("{}.json", name)), body).unwrap();
    }

    fn station(train: &str, track: &str) -> AnnouncementTemplate {
        AnnouncementTemplate::Station {
            train_number: train.into(),
            direction: "eastbound".into(),
            destination: "goodwin_station".into(),
            track_number: track.into(),
        }
    }

    #[test]
    fn loads_lists_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "safety",
            r#"{"safety": [{"id": "english", "name": "English"}, {"id": "spanish", "name": "Spanish"}]}"#,
        );
        let catalog = Catalog::load(dir.path());
        assert_eq!(catalog.safety.len(), 2);
        assert!(catalog.trains.is_empty());
    }

    #[test]
    fn schema_mismatch_yields_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "trains", r#"[{"id": "1", "name": "Train 1"}]"#);
        write(dir.path(), "tracks", r#"{"items": [{"id": "1", "name": "Track 1"}]}"#);
        write(dir.path(), "promo", "not json");
        let catalog = Catalog::load(dir.path());
        assert!(catalog.trains.is_empty());
        assert!(catalog.tracks.is_empty());
        assert!(catalog.promo.is_empty());
    }

    #[test]
    fn unknown_language_lists_available() {
        let catalog = Catalog {
            safety: vec![
                CatalogItem::new("english", "English"),
                CatalogItem::new("spanish", "Spanish"),
            ],
            ..Default::default()
        };
        let err = catalog
            .check(&AnnouncementTemplate::Safety { language: "french".into() })
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid language 'french'. Available: english, spanish");
        assert!(catalog
            .check(&AnnouncementTemplate::Safety { language: "english".into() })
            .is_ok());
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let err = Catalog::default().check(&station("", " ")).unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingFields(vec!["train_number", "track_number"])
        );
    }

    #[test]
    fn empty_catalog_imposes_no_constraint() {
        let catalog = Catalog {
            tracks: vec![CatalogItem::new("1", "Track 1")],
            ..Default::default()
        };
        assert!(catalog.check(&station("99", "1")).is_ok());
        assert!(matches!(
            catalog.check(&station("99", "7")),
            Err(CatalogError::Unknown { field: "track_number", .. })
        ));
    }

    #[test]
    fn promo_matches_with_or_without_extension() {
        let catalog = Catalog {
            promo: vec![CatalogItem::new("gift_shop", "Gift Shop")],
            ..Default::default()
        };
        assert!(catalog.check(&AnnouncementTemplate::Promo { file: "gift_shop.mp3".into() }).is_ok());
        assert!(catalog.check(&AnnouncementTemplate::Promo { file: "museum".into() }).is_err());
        assert_eq!(
            catalog.check(&AnnouncementTemplate::Promo { file: String::new() }),
            Err(CatalogError::MissingFields(vec!["file"]))
        );
    }

    #[test]
    fn traversal_ids_are_rejected_even_by_empty_catalog() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.check(&AnnouncementTemplate::Promo { file: "../../../secret".into() }),
            Err(CatalogError::InvalidId {
                field: "file",
                value: "../../../secret".into()
            })
        );
        assert!(matches!(
            catalog.check(&station("1", "../1")),
            Err(CatalogError::InvalidId { field: "track_number", .. })
        ));
        assert!(matches!(
            catalog.check(&AnnouncementTemplate::Safety { language: "..".into() }),
            Err(CatalogError::InvalidId { field: "language", .. })
        ));
    }
}
