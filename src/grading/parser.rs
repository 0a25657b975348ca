use std::collections::BTreeMap;

use serde_json::Value;

use super::errors::AnalysisError;
use super::types::{
    AiAnalysisResult, AnalysisPayload, ContentError, ContentErrorKind, DetectedAnswer,
    EssayAnalysis,
};

/// Grade injected when a truncated essay analysis lost its `final_grade`.
pub(crate) const DEFAULT_FINAL_GRADE: u8 = 3;
const TRUNCATED_CONTENT_QUALITY: &str = "Анализ прерван: ответ модели был обрезан";

/// One recovery step: returns a candidate text when the rule applies.
#[derive(Clone, Copy)]
pub(crate) struct RepairRule {
    pub(crate) name: &'static str,
    apply: fn(&str, bool) -> Option<String>,
}

impl RepairRule {
    pub(crate) fn apply(&self, text: &str, was_truncated: bool) -> Option<String> {
        (self.apply)(text, was_truncated)
    }
}

/// Tried in order; the first candidate that parses wins.
pub(crate) const REPAIR_RULES: [RepairRule; 5] = [
    RepairRule { name: "truncated_content_quality", apply: complete_truncated_content_quality },
    RepairRule { name: "truncated_examples", apply: complete_truncated_examples },
    RepairRule { name: "balance_braces", apply: balance_braces },
    RepairRule { name: "direct", apply: direct },
    RepairRule { name: "sanitize_strings", apply: sanitize_strings },
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Repaired {
    pub(crate) value: Value,
    pub(crate) rule: &'static str,
}

/// Full path from raw completion text to a validated analysis.
pub(crate) fn parse_completion(
    raw: &str,
    was_truncated: bool,
) -> Result<AiAnalysisResult, AnalysisError> {
    let candidate = extract(raw, was_truncated)?;
    let repaired = repair(candidate, was_truncated)?;
    if repaired.rule != "direct" {
        tracing::warn!(rule = repaired.rule, was_truncated, "Recovered malformed AI JSON");
    }
    validate(repaired.value)
}

/// Isolates the outermost JSON object from surrounding prose or code fences.
///
/// A truncated completion has lost its closing braces, so everything from the
/// first `{` to the end is kept.
pub(crate) fn extract(raw: &str, was_truncated: bool) -> Result<&str, AnalysisError> {
    let start = raw
        .find('{')
        .ok_or_else(|| AnalysisError::Parse("no JSON object in AI response".to_string()))?;

    let end = match raw.rfind('}') {
        Some(end) if end > start && !was_truncated => end + 1,
        _ => raw.len(),
    };

    let candidate = raw[start..end].trim_end();
    Ok(candidate.strip_suffix("```").map(str::trim_end).unwrap_or(candidate))
}

pub(crate) fn repair(candidate: &str, was_truncated: bool) -> Result<Repaired, AnalysisError> {
    let mut last_error = None;

    for rule in REPAIR_RULES {
        let Some(text) = rule.apply(candidate, was_truncated) else {
            continue;
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => return Ok(Repaired { value, rule: rule.name }),
            Err(err) => {
                tracing::debug!(rule = rule.name, error = %err, "Repair candidate rejected");
                last_error = Some(format!("{}: {err}", rule.name));
            }
        }
    }

    Err(AnalysisError::Parse(last_error.unwrap_or_else(|| "no repair rule applied".to_string())))
}

/// Accepts either a recognised content-error discriminator or a payload with
/// `answers` and a non-negative `total_questions`.
pub(crate) fn validate(parsed: Value) -> Result<AiAnalysisResult, AnalysisError> {
    let Value::Object(object) = parsed else {
        return Err(AnalysisError::Schema("top-level value is not an object".to_string()));
    };

    if let Some(kind) = object.get("error").and_then(Value::as_str).and_then(ContentErrorKind::parse)
    {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| kind.as_str().to_string());
        let detected_content_type = object
            .get("content_type_detected")
            .or_else(|| object.get("detected_content_type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(AiAnalysisResult::ContentError(ContentError {
            kind,
            message,
            detected_content_type,
        }));
    }

    let total_questions = object
        .get("total_questions")
        .and_then(as_count)
        .ok_or_else(|| AnalysisError::Schema("missing or negative total_questions".to_string()))?;
    let answers = object
        .get("answers")
        .ok_or_else(|| AnalysisError::Schema("missing answers".to_string()))
        .and_then(parse_answers)?;

    let essay_analysis = object.get("essay_analysis").filter(|value| value.is_object()).map(
        |value| EssayAnalysis {
            final_grade: value.get("final_grade").and_then(as_grade),
            raw: value.clone(),
        },
    );

    Ok(AiAnalysisResult::Success(AnalysisPayload {
        total_questions,
        variant_detected: object.get("variant_detected").and_then(as_count),
        confidence_score: object.get("confidence_score").and_then(Value::as_f64),
        student_name: object
            .get("student_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        answers,
        essay_analysis,
    }))
}

fn parse_answers(value: &Value) -> Result<BTreeMap<u32, DetectedAnswer>, AnalysisError> {
    let mut answers = BTreeMap::new();

    match value {
        Value::Object(map) => {
            for (key, entry) in map {
                let Ok(number) = key.trim().parse::<u32>() else {
                    continue;
                };
                answers.insert(number, detected_answer(entry));
            }
        }
        Value::Array(items) => {
            for (idx, entry) in items.iter().enumerate() {
                let number = entry
                    .get("question")
                    .or_else(|| entry.get("number"))
                    .and_then(as_count)
                    .unwrap_or(idx as u32 + 1);
                answers.insert(number, detected_answer(entry));
            }
        }
        _ => return Err(AnalysisError::Schema("answers is neither object nor array".to_string())),
    }

    Ok(answers)
}

fn detected_answer(entry: &Value) -> DetectedAnswer {
    match entry {
        Value::Object(map) => DetectedAnswer {
            detected_answer: map
                .get("detected_answer")
                .or_else(|| map.get("answer"))
                .map(scalar_text)
                .unwrap_or_default(),
            confidence: map.get("confidence").and_then(Value::as_f64),
        },
        other => DetectedAnswer { detected_answer: scalar_text(other), confidence: None },
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn as_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0 && n.fract() == 0.0).map(|n| n as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn as_grade(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|n| n.round() as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn direct(text: &str, _was_truncated: bool) -> Option<String> {
    Some(text.to_string())
}

fn is_cut_off(text: &str, was_truncated: bool) -> bool {
    was_truncated && !text.trim_end().ends_with('}')
}

fn complete_truncated_content_quality(text: &str, was_truncated: bool) -> Option<String> {
    if !is_cut_off(text, was_truncated) {
        return None;
    }

    let key = "\"content_quality\"";
    let key_at = text.rfind(key)?;
    let rest = text[key_at + key.len()..].trim_start().strip_prefix(':')?;
    let value = rest.trim_start().strip_prefix('"')?;
    if closing_quote(value).is_some() {
        return None;
    }

    let mut repaired = text.trim_end().trim_end_matches('\\').to_string();
    repaired.push('"');
    repaired.push_str(&format!(", \"final_grade\": {DEFAULT_FINAL_GRADE}"));
    close_remaining(&mut repaired);
    Some(repaired)
}

fn complete_truncated_examples(text: &str, was_truncated: bool) -> Option<String> {
    if !is_cut_off(text, was_truncated) {
        return None;
    }

    let key = "\"examples\"";
    let key_at = text.rfind(key)?;
    let after_key = &text[key_at + key.len()..];
    let array_offset = after_key.len() - after_key.trim_start().strip_prefix(':')?.trim_start().len();
    if !after_key[array_offset..].starts_with('[') {
        return None;
    }
    let array_at = key_at + key.len() + array_offset;

    let scan = scan_structure(text);
    let array_depth = scan_structure(&text[..=array_at]).stack.len();
    if array_depth < 2 || scan.stack.get(array_depth - 1) != Some(&'[') {
        return None;
    }

    let mut repaired = text.trim_end().to_string();
    if scan.in_string {
        repaired = repaired.trim_end_matches('\\').to_string();
        repaired.push('"');
    }
    trim_dangling(&mut repaired);

    // Close the array with everything nested in it, then its owner object
    // unless the owner is the root.
    let keep = if array_depth >= 3 { array_depth - 2 } else { array_depth - 1 };
    let mut stack = scan.stack;
    while stack.len() > keep {
        if let Some(open) = stack.pop() {
            repaired.push(closer(open));
        }
    }

    repaired.push_str(&format!(
        ", \"content_quality\": \"{TRUNCATED_CONTENT_QUALITY}\", \"final_grade\": {DEFAULT_FINAL_GRADE}"
    ));
    for open in stack.into_iter().rev() {
        repaired.push(closer(open));
    }
    Some(repaired)
}

fn balance_braces(text: &str, _was_truncated: bool) -> Option<String> {
    let opened = text.matches('{').count();
    let closed = text.matches('}').count();
    if opened <= closed {
        return None;
    }

    let mut repaired = text.trim_end().to_string();
    trim_dangling(&mut repaired);

    let scan = scan_structure(&repaired);
    if let Some(&open_at) = scan.opened_at.last() {
        let innermost = &repaired[open_at..];
        if innermost.starts_with('{')
            && owning_key(&repaired[..open_at]) == Some("essay_analysis")
            && !innermost.contains("\"final_grade\"")
        {
            if !repaired.ends_with('{') {
                repaired.push(',');
            }
            repaired.push_str(&format!(" \"final_grade\": {DEFAULT_FINAL_GRADE}"));
        }
    }

    close_remaining(&mut repaired);
    Some(repaired)
}

/// Key whose value starts right after `prefix`, e.g. `"essay_analysis": `.
fn owning_key(prefix: &str) -> Option<&str> {
    let quoted = prefix.trim_end().strip_suffix(':')?.trim_end().strip_suffix('"')?;
    let start = quoted.rfind('"')?;
    Some(&quoted[start + 1..])
}

fn sanitize_strings(text: &str, _was_truncated: bool) -> Option<String> {
    let chars = text.chars().map(|ch| if ch.is_control() { ' ' } else { ch }).collect::<Vec<_>>();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in chars.iter().copied().enumerate() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }

        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                let next = chars[idx + 1..].iter().find(|next| !next.is_whitespace());
                if matches!(next, None | Some(',' | ':' | '}' | ']')) {
                    in_string = false;
                    out.push(ch);
                } else {
                    out.push_str("\\\"");
                }
            }
            _ => out.push(ch),
        }
    }

    Some(out)
}

struct StructureScan {
    stack: Vec<char>,
    /// Byte offsets of the brackets in `stack`.
    opened_at: Vec<usize>,
    in_string: bool,
}

fn scan_structure(text: &str) -> StructureScan {
    let mut stack = Vec::new();
    let mut opened_at = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match (escaped, ch) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => {
                stack.push(ch);
                opened_at.push(idx);
            }
            '}' | ']' => {
                stack.pop();
                opened_at.pop();
            }
            _ => {}
        }
    }

    StructureScan { stack, opened_at, in_string }
}

fn closing_quote(value: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in value.char_indices() {
        match (escaped, ch) {
            (true, _) => escaped = false,
            (false, '\\') => escaped = true,
            (false, '"') => return Some(idx),
            _ => {}
        }
    }
    None
}

fn close_remaining(text: &mut String) {
    let scan = scan_structure(text);
    for open in scan.stack.into_iter().rev() {
        text.push(closer(open));
    }
}

/// Drops a trailing comma or an unfinished `"key":` so a closer can follow.
fn trim_dangling(text: &mut String) {
    loop {
        let trimmed = text.trim_end().trim_end_matches(',').trim_end();
        if trimmed.len() == text.len() {
            break;
        }
        text.truncate(trimmed.len());
    }
    if text.ends_with(':') {
        text.push_str(" null");
    }
}

fn closer(open: char) -> char {
    if open == '[' {
        ']'
    } else {
        '}'
    }
}
