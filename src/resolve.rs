use crate::model::{DateValue, PropertyValue, RollupValue, SelectOption, TextSpan};

/// Separator used between list entries (multi-select labels, rollup items).
pub const LIST_SEPARATOR: &str = "，";

/// Total: unsupported or malformed values render as `""`.
pub fn resolve(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Title { title: spans } | PropertyValue::RichText { rich_text: spans } => {
            join_spans(spans)
        }
        PropertyValue::Select { select } | PropertyValue::Status { status: select } => {
            option_name(select.as_ref())
        }
        PropertyValue::MultiSelect { multi_select } => multi_select
            .iter()
            .map(|opt| opt.name.as_str())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR)
            .trim()
            .to_string(),
        PropertyValue::Number { number } => format_number(*number),
        PropertyValue::Date { date } => date_start(date.as_ref()),
        PropertyValue::Rollup { rollup } => resolve_rollup(rollup),
        PropertyValue::Relation { .. } | PropertyValue::Unsupported => String::new(),
    }
}

/// Convenience for optional lookups: a missing property renders empty.
pub fn resolve_opt(value: Option<&PropertyValue>) -> String {
    value.map(resolve).unwrap_or_default()
}

fn resolve_rollup(rollup: &RollupValue) -> String {
    match rollup {
        RollupValue::Array { array } if array.is_empty() => String::new(),
        RollupValue::Array { array } => {
            let parts: Vec<String> = array
                .iter()
                .map(resolve)
                .filter(|text| !text.is_empty())
                .collect();
            if parts.is_empty() {
                format!("共{}项", array.len())
            } else {
                parts.join(LIST_SEPARATOR)
            }
        }
        RollupValue::Number { number } => format_number(*number),
        RollupValue::Date { date } => date_start(date.as_ref()),
        RollupValue::Unsupported => String::new(),
    }
}

fn join_spans(spans: &[TextSpan]) -> String {
    spans
        .iter()
        .map(|span| span.plain_text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn option_name(option: Option<&SelectOption>) -> String {
    option.map(|opt| opt.name.clone()).unwrap_or_default()
}

fn date_start(date: Option<&DateValue>) -> String {
    date.and_then(|d| d.start.clone()).unwrap_or_default()
}

// f64's Display already renders integral values without a fractional part.
fn format_number(number: Option<f64>) -> String {
    match number {
        Some(n) if n.is_finite() => n.to_string(),
        _ => String::new(),
    }
}
