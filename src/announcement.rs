use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Clip played at the start of every station announcement.
pub const CHIME_CLIP: &str = "chime";

/// Category of a schedulable announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementKind {
    Station,
    Promo,
    Safety,
}

impl AnnouncementKind {
    /// Human-readable label used in job names.
    pub fn label(&self) -> &'static str {
        match self {
            AnnouncementKind::Station => "Station",
            AnnouncementKind::Promo => "Promo",
            AnnouncementKind::Safety => "Safety",
        }
    }
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnouncementKind::Station => write!(f, "station"),
            AnnouncementKind::Promo => write!(f, "promo"),
            AnnouncementKind::Safety => write!(f, "safety"),
        }
    }
}

/// What to announce and with which parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnouncementTemplate {
    Station {
        train_number: String,
        /// Conventionally `eastbound` or `westbound`, but any clip name works.
        direction: String,
        destination: String,
        track_number: String,
    },
    Promo {
        file: String,
    },
    Safety {
        language: String,
    },
}

impl AnnouncementTemplate {
    pub fn kind(&self) -> AnnouncementKind {
        match self {
            AnnouncementTemplate::Station { .. } => AnnouncementKind::Station,
            AnnouncementTemplate::Promo { .. } => AnnouncementKind::Promo,
            AnnouncementTemplate::Safety { .. } => AnnouncementKind::Safety,
        }
    }

    /// First parameter that cannot name a clip file, as `(field, value)`.
    ///
    /// Ids are single path segments: no separators and no `..`.
    pub fn invalid_id(&self) -> Option<(&'static str, &str)> {
        let fields: Vec<(&'static str, &str)> = match self {
            AnnouncementTemplate::Station {
                train_number,
                direction,
                destination,
                track_number,
            } => vec![
                ("train_number", train_number.as_str()),
                ("direction", direction.as_str()),
                ("destination", destination.as_str()),
                ("track_number", track_number.as_str()),
            ],
            AnnouncementTemplate::Promo { file } => vec![("file", file.as_str())],
            AnnouncementTemplate::Safety { language } => vec![("language", language.as_str())],
        };
        fields.into_iter().find(|(_, value)| !is_clip_id(value))
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        match self {
            AnnouncementTemplate::Station {
                train_number,
                direction,
                destination,
                track_number,
            } => format!(
                "Train {}, {} to {}, Track {}",
                train_number, direction, destination, track_number
            ),
            AnnouncementTemplate::Promo { file } => format!("Promo {}", file),
            AnnouncementTemplate::Safety { language } => format!("Safety ({})", language),
        }
    }
}

/// Ordered clip references for one announcement, relative to the clip root
/// and without the `.mp3` extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSequence {
    clips: Vec<String>,
}

impl AudioSequence {
    pub fn new(clips: Vec<String>) -> Self {
        AudioSequence { clips }
    }

    pub fn clips(&self) -> &[String] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn is_clip_id(value: &str) -> bool {
    !value.contains(['/', '\\']) && value != ".." && value != "."
}

/// True when `clip` only descends below the clip root.
pub fn stays_under_root(clip: &str) -> bool {
    !clip.contains('\\')
        && Path::new(clip)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Map a clip reference to its `.mp3` file under `root`.
pub fn clip_path(root: &Path, clip: &str) -> PathBuf {
    root.join(format!("{}.mp3", clip))
}

/// Resolve a template to its clip sequence. Pure.
pub fn resolve(template: &AnnouncementTemplate) -> AudioSequence {
    let clips = match template {
        AnnouncementTemplate::Station {
            train_number,
            direction,
            destination,
            track_number,
        } => vec![
            CHIME_CLIP.to_string(),
            format!("train/{}", train_number),
            format!("direction/{}", direction),
            format!("destination/{}", destination),
            format!("track/{}", track_number),
        ],
        AnnouncementTemplate::Promo { file } => {
            // Older schedules stored promo ids with the extension.
            let stem = file.strip_suffix(".mp3").unwrap_or(file);
            vec![format!("promo/{}", stem)]
        }
        AnnouncementTemplate::Safety { language } => {
            vec![format!("safety/safety_{}", language)]
        }
    };
    AudioSequence::new(clips)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> AnnouncementTemplate {
        AnnouncementTemplate::Station {
            train_number: "1".into(),
            direction: "westbound".into(),
            destination: "goodwin_station".into(),
            track_number: "1".into(),
        }
    }

    #[test]
    fn station_resolves_in_fixed_order() {
        let seq = resolve(&station());
        assert_eq!(
            seq.clips(),
            &[
                "chime",
                "train/1",
                "direction/westbound",
                "destination/goodwin_station",
                "track/1"
            ]
        );
    }

    #[test]
    fn resolve_is_deterministic() {
        let t = station();
        assert_eq!(resolve(&t), resolve(&t));
        assert_eq!(resolve(&t), resolve(&t.clone()));
    }

    #[test]
    fn promo_and_safety_resolve_to_single_clip() {
        let promo = AnnouncementTemplate::Promo { file: "gift_shop".into() };
        assert_eq!(resolve(&promo).clips(), &["promo/gift_shop"]);

        let legacy = AnnouncementTemplate::Promo { file: "gift_shop.mp3".into() };
        assert_eq!(resolve(&legacy).clips(), &["promo/gift_shop"]);

        let safety = AnnouncementTemplate::Safety { language: "english".into() };
        assert_eq!(resolve(&safety).clips(), &["safety/safety_english"]);
    }

    #[test]
    fn clip_path_appends_extension_under_root() {
        let seq = resolve(&AnnouncementTemplate::Safety { language: "spanish".into() });
        assert_eq!(
            clip_path(Path::new("/srv/mp3"), &seq.clips()[0]),
            PathBuf::from("/srv/mp3/safety/safety_spanish.mp3")
        );
    }

    #[test]
    fn ids_with_path_components_are_invalid() {
        assert_eq!(station().invalid_id(), None);

        let promo = AnnouncementTemplate::Promo { file: "../../../secret".into() };
        assert_eq!(promo.invalid_id(), Some(("file", "../../../secret")));

        let safety = AnnouncementTemplate::Safety { language: "..".into() };
        assert_eq!(safety.invalid_id(), Some(("language", "..")));

        let station = AnnouncementTemplate::Station {
            train_number: "1".into(),
            direction: "west\\bound".into(),
            destination: "goodwin_station".into(),
            track_number: "1".into(),
        };
        assert_eq!(station.invalid_id(), Some(("direction", "west\\bound")));
    }

    #[test]
    fn resolved_clips_stay_under_root() {
        assert!(stays_under_root("promo/gift_shop"));
        assert!(stays_under_root("chime"));
        assert!(!stays_under_root("promo/../../../secret"));
        assert!(!stays_under_root("/etc/passwd"));
        assert!(!stays_under_root("promo\\..\\secret"));
    }

    #[test]
    fn template_serializes_with_type_tag() {
        let json = serde_json::to_value(&AnnouncementTemplate::Promo { file: "x".into() }).unwrap();
        assert_eq!(json["type"], "promo");
        assert_eq!(json["file"], "x");
    }

    #[test]
    fn kind_display_and_label() {
        assert_eq!(AnnouncementKind::Station.to_string(), "station");
        assert_eq!(AnnouncementKind::Safety.label(), "Safety");
        assert_eq!(station().kind(), AnnouncementKind::Station);
    }
}
