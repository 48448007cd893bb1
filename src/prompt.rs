use crate::model::{FieldKey, FieldMap, PromptPair, PropertyValue, Record};
use crate::resolve::resolve_opt;

/// Separator between prompt segments.
pub const SEGMENT_SEPARATOR: &str = "；";

/// Closing style guidance, always the last segment.
pub const STYLE_SEGMENT: &str = "风格：写实高清，主体明确，构图简洁，光线自然，社媒短视频友好";

/// Defects the generator should steer away from.
pub const NEGATIVE_PROMPT: &str = "低清晰度, 畸变, 过曝, 过暗, 杂乱, 噪点, 文字水印, 画面扭曲";

/// Segment order matters to generation quality; the description always leads.
const SEGMENTS: [(FieldKey, &str, &str); 15] = [
    (FieldKey::Description, "画面描述", ""),
    (FieldKey::Title, "名称", ""),
    (FieldKey::CameraPosition, "机位", ""),
    (FieldKey::Lens, "镜头", ""),
    (FieldKey::PointOfView, "视角", ""),
    (FieldKey::Subtitle, "屏幕要点", ""),
    (FieldKey::Props, "道具", ""),
    (FieldKey::Segment, "段落", ""),
    (FieldKey::Location, "地点", ""),
    (FieldKey::Duration, "时长", "秒"),
    (FieldKey::Bgm, "BGM", ""),
    (FieldKey::VoiceOver, "台词/旁白", ""),
    (FieldKey::CallToAction, "CTA", ""),
    (FieldKey::Transition, "转场", ""),
    (FieldKey::Persons, "人员", ""),
];

const RELATED_LABEL: &str = "关联内容";

pub fn compose(record: &Record, fields: &FieldMap) -> PromptPair {
    let mut segments: Vec<String> = SEGMENTS
        .iter()
        .filter_map(|(key, label, suffix)| {
            let value = resolve_opt(record.property(fields, *key));
            (!value.is_empty()).then(|| format!("{}：{}{}", label, value, suffix))
        })
        .collect();

    // Relations are counted, never dereferenced.
    if let Some(PropertyValue::Relation { relation }) =
        record.property(fields, FieldKey::RelatedContent)
    {
        if !relation.is_empty() {
            segments.push(format!("{}：{} 项", RELATED_LABEL, relation.len()));
        }
    }

    segments.push(STYLE_SEGMENT.to_string());

    PromptPair {
        positive: segments.join(SEGMENT_SEPARATOR),
        negative: NEGATIVE_PROMPT.to_string(),
    }
}

/// Whether the record carries a description, i.e. is eligible for generation.
pub fn has_description(record: &Record, fields: &FieldMap) -> bool {
    !resolve_opt(record.property(fields, FieldKey::Description)).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelationRef, SelectOption, TextSpan};
    use std::collections::HashMap;

    fn text(s: &str) -> PropertyValue {
        PropertyValue::RichText {
            rich_text: vec![TextSpan {
                plain_text: s.into(),
            }],
        }
    }

    fn record(props: Vec<(&str, PropertyValue)>) -> Record {
        let map: HashMap<String, PropertyValue> =
            props.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        Record::new("page-1", map)
    }

    #[test]
    fn description_leads_and_style_closes() {
        let fields = FieldMap::default();
        let rec = record(vec![("画面描述", text("a red bicycle"))]);
        let pair = compose(&rec, &fields);
        assert_eq!(pair.positive, format!("画面描述：a red bicycle；{}", STYLE_SEGMENT));
        assert_eq!(pair.negative, NEGATIVE_PROMPT);
    }

    #[test]
    fn order_is_fixed_regardless_of_storage() {
        let fields = FieldMap::default();
        let rec = record(vec![
            ("人员", text("Ann")),
            ("时长（秒）", PropertyValue::Number { number: Some(5.0) }),
            (
                "镜头",
                PropertyValue::Select {
                    select: Some(SelectOption {
                        name: "特写".into(),
                    }),
                },
            ),
            (
                "名称",
                PropertyValue::Title {
                    title: vec![TextSpan {
                        plain_text: "Shot 1".into(),
                    }],
                },
            ),
            ("画面描述", text("dancer spins")),
        ]);
        let pair = compose(&rec, &fields);
        assert_eq!(
            pair.positive,
            format!(
                "画面描述：dancer spins；名称：Shot 1；镜头：特写；时长：5秒；人员：Ann；{}",
                STYLE_SEGMENT
            )
        );
    }

    #[test]
    fn relation_contributes_only_its_count() {
        let fields = FieldMap::default();
        let rel = |n: usize| PropertyValue::Relation {
            relation: (0..n)
                .map(|i| RelationRef {
                    id: format!("r{}", i),
                })
                .collect(),
        };
        let rec = record(vec![("画面描述", text("x")), ("关联内容", rel(2))]);
        assert_eq!(
            compose(&rec, &fields).positive,
            format!("画面描述：x；关联内容：2 项；{}", STYLE_SEGMENT)
        );

        let rec = record(vec![("画面描述", text("x")), ("关联内容", rel(0))]);
        assert!(!compose(&rec, &fields).positive.contains("关联内容"));
    }

    #[test]
    fn empty_description_leaves_only_style() {
        let fields = FieldMap::default();
        let rec = record(vec![("画面描述", text("   "))]);
        let pair = compose(&rec, &fields);
        assert_eq!(pair.positive, STYLE_SEGMENT);
        assert!(!has_description(&rec, &fields));
    }

    #[test]
    fn lookups_follow_configured_labels() {
        let fields = FieldMap::with_overrides([(FieldKey::Description, "Prompt".to_string())]);
        let rec = record(vec![("Prompt", text("sunset")), ("画面描述", text("ignored"))]);
        let pair = compose(&rec, &fields);
        assert!(pair.positive.starts_with("画面描述：sunset；"));
        assert!(!pair.positive.contains("ignored"));
        assert!(has_description(&rec, &fields));
    }
}
