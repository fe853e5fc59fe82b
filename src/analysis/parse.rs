use serde_json::{Map, Value};

use super::{AnalysisResult, Counts, Scores, Tone};
use crate::error::ParseError;

type Object = Map<String, Value>;

/// Extract the first JSON object embedded in model output.
///
/// Tolerates surrounding prose, code-fence markers and whitespace. Braces
/// inside JSON strings do not affect matching.
pub fn extract_json_object(text: &str) -> Option<Object> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Fast path: the whole completion is the object
    if let Ok(Value::Object(object)) = serde_json::from_str(trimmed) {
        return Some(object);
    }

    for (start, _) in trimmed.match_indices('{') {
        let candidate = &trimmed[start..];
        let Some(end) = matching_brace(candidate) else {
            continue;
        };
        if let Ok(Value::Object(object)) = serde_json::from_str(&candidate[..=end]) {
            return Some(object);
        }
    }

    None
}

/// Byte index of the brace closing the one `text` starts with.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse and validate raw model text into an [`AnalysisResult`].
///
/// Either every required field is present and usable or the whole result is
/// rejected. Scores are rounded and clamped rather than rejected.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, ParseError> {
    let root = extract_json_object(text).ok_or(ParseError::NoJsonObject)?;
    validate(&root)
}

fn validate(root: &Object) -> Result<AnalysisResult, ParseError> {
    let transcript = required_string(root, "", "transcript")?;

    let scores_obj = required_object(root, "", "scores")?;
    let scores = Scores {
        overall: optional_score(scores_obj, "scores", "overall")?,
        fluency: required_score(scores_obj, "scores", "fluency")?,
        confidence: required_score(scores_obj, "scores", "confidence")?,
        filler: optional_score(scores_obj, "scores", "filler")?,
        filler_rate_per_min: filler_rate(scores_obj)?,
        tone: tone(scores_obj)?,
        keyword_coverage_pct: keyword_coverage(scores_obj)?,
    };

    let counts_obj = required_object(root, "", "counts")?;
    let counts = Counts {
        total_words: count(counts_obj, "total_words")?,
        total_fillers: count(counts_obj, "total_fillers")?,
        long_pauses: count(counts_obj, "long_pauses")?,
    };

    let suggestions = suggestions(root)?;

    Ok(AnalysisResult {
        transcript,
        scores,
        counts,
        suggestions,
    })
}

fn path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn invalid(path: String, expected: &str) -> ParseError {
    ParseError::InvalidField {
        path,
        expected: expected.to_string(),
    }
}

/// Present and non-null, or `MissingField`.
fn required<'a>(object: &'a Object, parent: &str, key: &str) -> Result<&'a Value, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(ParseError::MissingField {
            path: path(parent, key),
        }),
        Some(value) => Ok(value),
    }
}

fn required_object<'a>(
    object: &'a Object,
    parent: &str,
    key: &str,
) -> Result<&'a Object, ParseError> {
    required(object, parent, key)?
        .as_object()
        .ok_or_else(|| invalid(path(parent, key), "object"))
}

fn required_string(object: &Object, parent: &str, key: &str) -> Result<String, ParseError> {
    required(object, parent, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(path(parent, key), "string"))
}

/// Numbers, or strings holding one (a trailing `%` is allowed).
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn score_from(value: &Value, path: String) -> Result<u8, ParseError> {
    let number = coerce_number(value).ok_or_else(|| invalid(path, "integer 0-100"))?;
    Ok(number.round().clamp(0.0, 100.0) as u8)
}

fn required_score(object: &Object, parent: &str, key: &str) -> Result<u8, ParseError> {
    score_from(required(object, parent, key)?, path(parent, key))
}

fn optional_score(object: &Object, parent: &str, key: &str) -> Result<Option<u8>, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => score_from(value, path(parent, key)).map(Some),
    }
}

fn filler_rate(scores: &Object) -> Result<f64, ParseError> {
    let key = "filler_rate_per_min";
    let rate = coerce_number(required(scores, "scores", key)?)
        .ok_or_else(|| invalid(path("scores", key), "number >= 0"))?;
    Ok((rate.max(0.0) * 10.0).round() / 10.0)
}

fn tone(scores: &Object) -> Result<Tone, ParseError> {
    let label = required(scores, "scores", "tone")?
        .as_str()
        .ok_or_else(|| invalid(path("scores", "tone"), "string"))?;
    Tone::from_label(label).ok_or_else(|| invalid(path("scores", "tone"), "non-empty string"))
}

/// Optional: absent or null means no keywords were evaluated.
fn keyword_coverage(scores: &Object) -> Result<Option<f64>, ParseError> {
    let key = "keyword_coverage_pct";
    match scores.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_number(value)
            .map(|pct| Some(pct.clamp(0.0, 100.0)))
            .ok_or_else(|| invalid(path("scores", key), "number 0-100 or null")),
    }
}

fn count(counts: &Object, key: &str) -> Result<u32, ParseError> {
    let number = coerce_number(required(counts, "counts", key)?)
        .ok_or_else(|| invalid(path("counts", key), "integer >= 0"))?;
    Ok(number.round().clamp(0.0, u32::MAX as f64) as u32)
}

fn suggestions(root: &Object) -> Result<Vec<String>, ParseError> {
    let items = required(root, "", "suggestions")?
        .as_array()
        .ok_or_else(|| invalid("suggestions".to_string(), "array of strings"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| invalid(format!("suggestions[{}]", i), "string"))
        })
        .collect()
}
