use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Logical field names. Every property lookup on a `Record` goes through a
/// `FieldMap` keyed by these, never through a raw native label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Title,
    Description,
    CameraPosition,
    Lens,
    PointOfView,
    Subtitle,
    Props,
    Segment,
    Location,
    Duration,
    Bgm,
    VoiceOver,
    CallToAction,
    Transition,
    Persons,
    RelatedContent,
    Status,
    Order,
    ImageOutput,
    ReadonlyRollup,
}

impl FieldKey {
    pub const ALL: [FieldKey; 20] = [
        FieldKey::Title,
        FieldKey::Description,
        FieldKey::CameraPosition,
        FieldKey::Lens,
        FieldKey::PointOfView,
        FieldKey::Subtitle,
        FieldKey::Props,
        FieldKey::Segment,
        FieldKey::Location,
        FieldKey::Duration,
        FieldKey::Bgm,
        FieldKey::VoiceOver,
        FieldKey::CallToAction,
        FieldKey::Transition,
        FieldKey::Persons,
        FieldKey::RelatedContent,
        FieldKey::Status,
        FieldKey::Order,
        FieldKey::ImageOutput,
        FieldKey::ReadonlyRollup,
    ];

    /// Native label used by the storyboard database this tool was built for.
    pub fn default_label(self) -> &'static str {
        match self {
            FieldKey::Title => "名称",
            FieldKey::Description => "画面描述",
            FieldKey::CameraPosition => "机位",
            FieldKey::Lens => "镜头",
            FieldKey::PointOfView => "视角",
            FieldKey::Subtitle => "字幕/屏幕要点",
            FieldKey::Props => "道具/素材",
            FieldKey::Segment => "段落",
            FieldKey::Location => "拍摄地点",
            FieldKey::Duration => "时长（秒）",
            FieldKey::Bgm => "BGM",
            FieldKey::VoiceOver => "台词/旁白",
            FieldKey::CallToAction => "CTA",
            FieldKey::Transition => "转场",
            FieldKey::Persons => "人员",
            FieldKey::RelatedContent => "关联内容",
            FieldKey::Status => "拍摄进度",
            FieldKey::Order => "顺序",
            FieldKey::ImageOutput => "Ai构图",
            FieldKey::ReadonlyRollup => "内容状态",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Title => "title",
            FieldKey::Description => "description",
            FieldKey::CameraPosition => "camera_position",
            FieldKey::Lens => "lens",
            FieldKey::PointOfView => "point_of_view",
            FieldKey::Subtitle => "subtitle",
            FieldKey::Props => "props",
            FieldKey::Segment => "segment",
            FieldKey::Location => "location",
            FieldKey::Duration => "duration",
            FieldKey::Bgm => "bgm",
            FieldKey::VoiceOver => "voice_over",
            FieldKey::CallToAction => "call_to_action",
            FieldKey::Transition => "transition",
            FieldKey::Persons => "persons",
            FieldKey::RelatedContent => "related_content",
            FieldKey::Status => "status",
            FieldKey::Order => "order",
            FieldKey::ImageOutput => "image_output",
            FieldKey::ReadonlyRollup => "readonly_rollup",
        }
    }
}

/// Immutable logical-name → native-label table, built once at startup and
/// passed explicitly to whoever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    labels: BTreeMap<FieldKey, String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        let labels = FieldKey::ALL
            .iter()
            .map(|k| (*k, k.default_label().to_string()))
            .collect();
        Self { labels }
    }
}

impl FieldMap {
    /// Default labels with the given entries replaced.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (FieldKey, String)>,
    {
        let mut map = Self::default();
        for (key, label) in overrides {
            map.labels.insert(key, label);
        }
        map
    }

    pub fn label(&self, key: FieldKey) -> &str {
        self.labels
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_label())
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.labels.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextSpan {
    #[serde(default, deserialize_with = "null_as_default")]
    pub plain_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SelectOption {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DateValue {
    #[serde(default)]
    pub start: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelationRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
}

/// A single property value, tagged by kind. Unknown tags and payloads that
/// do not match their tag decode to `Unsupported`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<TextSpan>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<TextSpan>,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<SelectOption>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Date {
        #[serde(default)]
        date: Option<DateValue>,
    },
    Status {
        #[serde(default)]
        status: Option<SelectOption>,
    },
    Rollup {
        rollup: RollupValue,
    },
    Relation {
        #[serde(default)]
        relation: Vec<RelationRef>,
    },
    #[serde(other)]
    Unsupported,
}

impl PropertyValue {
    /// Decode one property without failing: anything malformed is `Unsupported`.
    pub fn from_json(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(PropertyValue::Unsupported)
    }
}

/// Aggregated value carried by a rollup property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RollupValue {
    Array {
        #[serde(default, deserialize_with = "lenient_values")]
        array: Vec<PropertyValue>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Date {
        #[serde(default)]
        date: Option<DateValue>,
    },
    #[serde(other)]
    Unsupported,
}

fn lenient_values<'de, D>(deserializer: D) -> Result<Vec<PropertyValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(PropertyValue::from_json)
        .collect())
}

#[derive(Deserialize)]
struct RawRecord {
    id: String,
    #[serde(default)]
    properties: Map<String, Value>,
}

/// One page of the source database. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawRecord")]
pub struct Record {
    id: String,
    properties: HashMap<String, PropertyValue>,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        let properties = raw
            .properties
            .into_iter()
            .map(|(label, value)| (label, PropertyValue::from_json(value)))
            .collect();
        Self {
            id: raw.id,
            properties,
        }
    }
}

impl Record {
    pub fn new(id: impl Into<String>, properties: HashMap<String, PropertyValue>) -> Self {
        Self {
            id: id.into(),
            properties,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn property(&self, fields: &FieldMap, key: FieldKey) -> Option<&PropertyValue> {
        self.properties.get(fields.label(key))
    }
}

/// Positive/negative instruction strings for one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub positive: String,
    pub negative: String,
}

/// Terminal state of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Success {
        url: String,
    },
    Failure {
        error: String,
        /// Set when the image was generated but could not be persisted.
        url: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub record: Record,
    pub prompt: PromptPair,
    pub outcome: Outcome,
}
