use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Identifies an upload session and the byte offset the next append must use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSessionCursor {
    pub session_id: String,
    pub offset: u64,
}

/// What the remote does when a file already exists at the destination.
///
/// `Update` carries the revision the caller expects to replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WriteMode {
    #[default]
    Add,
    Overwrite,
    Update(String),
}

impl Serialize for WriteMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WriteMode::Add => serializer.serialize_str("add"),
            WriteMode::Overwrite => serializer.serialize_str("overwrite"),
            WriteMode::Update(rev) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(".tag", "update")?;
                map.serialize_entry("update", rev)?;
                map.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WriteModeRepr {
    Tag(String),
    Tagged {
        #[serde(rename = ".tag")]
        tag: String,
        #[serde(default)]
        update: Option<String>,
    },
}

impl<'de> Deserialize<'de> for WriteMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, rev) = match WriteModeRepr::deserialize(deserializer)? {
            WriteModeRepr::Tag(tag) => (tag, None),
            WriteModeRepr::Tagged { tag, update } => (tag, update),
        };
        match (tag.as_str(), rev) {
            ("add", _) => Ok(WriteMode::Add),
            ("overwrite", _) => Ok(WriteMode::Overwrite),
            ("update", Some(rev)) => Ok(WriteMode::Update(rev)),
            ("update", None) => Err(de::Error::missing_field("update")),
            (other, _) => Err(de::Error::unknown_variant(
                other,
                &["add", "overwrite", "update"],
            )),
        }
    }
}

/// Destination metadata sent with a direct upload or a session finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub path: String,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub client_modified: Option<DateTime<Utc>>,
}

/// Metadata of a committed remote file.
///
/// Unknown fields in the response are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path_display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub rev: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_modified: Option<String>,
}

/// Remote timestamps are UTC with whole seconds only.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            NaiveDateTime::parse_from_str(&s, FORMAT)
                .map(|naive| naive.and_utc())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(mode: WriteMode) -> CommitInfo {
        CommitInfo {
            path: "/backups/db.tar".into(),
            mode,
            autorename: true,
            mute: false,
            client_modified: None,
        }
    }

    #[test]
    fn write_mode_plain_tags() {
        assert_eq!(serde_json::to_string(&WriteMode::Add).unwrap(), "\"add\"");
        assert_eq!(
            serde_json::to_string(&WriteMode::Overwrite).unwrap(),
            "\"overwrite\""
        );
    }

    #[test]
    fn write_mode_update_carries_rev() {
        let json = serde_json::to_value(WriteMode::Update("a1c10ce0dd78".into())).unwrap();
        assert_eq!(json[".tag"], "update");
        assert_eq!(json["update"], "a1c10ce0dd78");

        let parsed: WriteMode = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, WriteMode::Update("a1c10ce0dd78".into()));
    }

    #[test]
    fn write_mode_accepts_tagged_object() {
        let parsed: WriteMode = serde_json::from_str(r#"{".tag":"overwrite"}"#).unwrap();
        assert_eq!(parsed, WriteMode::Overwrite);
    }

    #[test]
    fn write_mode_rejects_unknown_and_bare_update() {
        assert!(serde_json::from_str::<WriteMode>("\"replace\"").is_err());
        assert!(serde_json::from_str::<WriteMode>(r#"{".tag":"update"}"#).is_err());
    }

    #[test]
    fn commit_info_omits_missing_timestamp() {
        let json = serde_json::to_string(&commit(WriteMode::Overwrite)).unwrap();
        assert!(!json.contains("client_modified"));
        assert!(json.contains(r#""mode":"overwrite""#));
        assert!(json.contains(r#""autorename":true"#));
    }

    #[test]
    fn commit_info_timestamp_has_no_fraction() {
        let mut info = commit(WriteMode::Add);
        info.client_modified = Some(
            Utc.with_ymd_and_hms(2024, 3, 9, 17, 4, 5).unwrap()
                + chrono::Duration::milliseconds(750),
        );
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["client_modified"], "2024-03-09T17:04:05Z");

        let parsed: CommitInfo = serde_json::from_value(json).unwrap();
        assert_eq!(
            parsed.client_modified,
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 17, 4, 5).unwrap())
        );
    }

    #[test]
    fn file_metadata_ignores_unknown_fields() {
        let json = r#"{
            ".tag": "file",
            "name": "db.tar",
            "id": "id:a4ayc_80_OEAAAAAAAAAXw",
            "path_display": "/backups/db.tar",
            "path_lower": "/backups/db.tar",
            "rev": "a1c10ce0dd78",
            "size": 7212,
            "content_hash": "e3b0c442",
            "is_downloadable": true,
            "server_modified": "2024-03-09T17:04:05Z"
        }"#;
        let meta: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.name, "db.tar");
        assert_eq!(meta.size, 7212);
        assert_eq!(meta.rev, "a1c10ce0dd78");
        assert_eq!(meta.content_hash.as_deref(), Some("e3b0c442"));
        assert!(meta.client_modified.is_none());
    }
}
