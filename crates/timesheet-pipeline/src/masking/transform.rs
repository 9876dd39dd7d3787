use serde_json::Value;

use super::rule::MaskingType;

pub const REDACTION_MARKER: &str = "***HIDDEN***";
pub const AGGREGATED_MARKER: &str = "AGGREGATED";
const MASK_PREFIX: &str = "***";

/// Applies one masking transform. Nulls stay null so absence is not disguised
/// as data.
pub fn mask_value(masking: MaskingType, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match masking {
        MaskingType::None => value.clone(),
        MaskingType::Hidden => Value::String(REDACTION_MARKER.to_string()),
        MaskingType::PartialMask => Value::String(partial_mask(&stringify(value))),
        MaskingType::HashMask => {
            Value::String(format!("HASH_{}", string_hash(&stringify(value)).unsigned_abs()))
        }
        MaskingType::Anonymize => Value::String(format!(
            "ANONYMIZED_{}",
            string_hash(&stringify(value)).unsigned_abs() % 1000
        )),
        MaskingType::Aggregate => Value::String(AGGREGATED_MARKER.to_string()),
    }
}

/// Keeps the last four characters of values longer than four.
pub fn partial_mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 4 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{MASK_PREFIX}{tail}")
    } else {
        MASK_PREFIX.to_string()
    }
}

/// 32-bit polynomial string hash over UTF-16 code units (`h = 31 * h + c`).
/// Stable across processes, so masked identifiers stay joinable between
/// reports produced by different workers.
pub fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
