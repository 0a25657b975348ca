use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::normalizer::normalize;

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([0-9]+)[).]?\s*.*$").expect("valid numbered regex"));
static NUMBERED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[).]\s*").expect("valid prefix regex"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[()\[\]{}.,;:!?]").expect("valid punctuation regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9\s.,+\-−]+$").expect("valid numeric regex"));
static LETTER_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}[0-9]|[0-9]\p{L}").expect("valid formula regex"));
static NEGATIVE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-[0-9]").expect("valid negative regex"));

const RELATIONAL: [char; 5] = ['<', '>', '=', '≤', '≥'];
const FORMULA_SYMBOLS: [char; 9] = ['+', '-', '*', '/', '^', '(', ')', '×', '÷'];
const FORMULA_MAX_LEN: usize = 50;

// Text-answer heuristic thresholds. Kept as-is for compatibility with grades
// already issued; they are not a semantic similarity measure.
const TEXT_MIN_LENGTH_RATIO: f64 = 0.3;
const TEXT_MIN_KEYWORD_RATIO: f64 = 0.5;
const TEXT_KEYWORD_MIN_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenAnswerKind {
    Comparison,
    Numeric,
    Formula,
    Text,
}

/// Compares an answer to a single/multiple choice question.
///
/// Non-strict matching lowercases both sides and tries, in order: exact
/// equality, the option number against a purely numeric reference, option
/// numbers on both sides, text after the option number, and finally text
/// without punctuation. The numbered rules decide the outcome as soon as they
/// apply. A blank answer never matches, even a blank reference.
pub(crate) fn compare_closed(student: &str, reference: &str, strict: bool) -> bool {
    let student = normalize(student);
    let reference = normalize(reference);
    if student.trim().is_empty() {
        return false;
    }

    if strict {
        return student == reference;
    }

    let student = student.trim().to_lowercase();
    let reference = reference.trim().to_lowercase();

    if student == reference {
        return true;
    }

    let reference_is_number =
        !reference.is_empty() && reference.chars().all(|ch| ch.is_ascii_digit());
    if reference_is_number {
        if let Some(number) = leading_number(&student) {
            return number == reference;
        }
    }

    if let (Some(student_number), Some(reference_number)) =
        (leading_number(&student), leading_number(&reference))
    {
        return student_number == reference_number;
    }

    let student_body = NUMBERED_PREFIX.replace(&student, "");
    let reference_body = NUMBERED_PREFIX.replace(&reference, "");
    if !student_body.is_empty() && student_body == reference_body {
        return true;
    }

    let student_clean = strip_punctuation(&student);
    let reference_clean = strip_punctuation(&reference);
    !student_clean.is_empty() && student_clean == reference_clean
}

/// Compares option lists such as `1, 3` regardless of order. Returns `None`
/// when either side is not a plain list of option numbers.
pub(crate) fn compare_choice_set(student: &str, reference: &str) -> Option<bool> {
    let reference = option_numbers(&normalize(reference))?;
    if reference.len() < 2 {
        return None;
    }
    let student = option_numbers(&normalize(student))?;
    Some(student == reference)
}

pub(crate) fn classify_open(reference: &str) -> OpenAnswerKind {
    let reference = normalize(reference);

    if reference.chars().any(|ch| RELATIONAL.contains(&ch)) {
        return OpenAnswerKind::Comparison;
    }

    if NUMERIC.is_match(&reference) && reference.chars().any(|ch| ch.is_ascii_digit()) {
        return OpenAnswerKind::Numeric;
    }

    let looks_like_formula = LETTER_DIGIT.is_match(&reference)
        || reference.chars().any(|ch| FORMULA_SYMBOLS.contains(&ch));
    if looks_like_formula && reference.chars().count() < FORMULA_MAX_LEN {
        return OpenAnswerKind::Formula;
    }

    OpenAnswerKind::Text
}

/// Compares a free-form answer using the strategy picked from the reference.
pub(crate) fn compare_open(student: &str, reference: &str) -> bool {
    let kind = classify_open(reference);
    let student = normalize(student);
    let reference = normalize(reference);
    if student.trim().is_empty() {
        return false;
    }

    match kind {
        OpenAnswerKind::Numeric => numeric_form(&student) == numeric_form(&reference),
        OpenAnswerKind::Comparison => {
            let student = numeric_form(&student).to_lowercase();
            let reference = numeric_form(&reference).to_lowercase();
            if NEGATIVE_NUMBER.is_match(&reference) && !NEGATIVE_NUMBER.is_match(&student) {
                return false;
            }
            student == reference
        }
        OpenAnswerKind::Formula => {
            without_whitespace(&student).to_lowercase()
                == without_whitespace(&reference).to_lowercase()
        }
        OpenAnswerKind::Text => compare_text(&student, &reference),
    }
}

fn compare_text(student: &str, reference: &str) -> bool {
    let reference_keywords = keywords(reference);
    if reference_keywords.is_empty() {
        return !student.is_empty() && student.to_lowercase() == reference.to_lowercase();
    }

    let student_len = student.chars().count() as f64;
    let reference_len = reference.chars().count() as f64;
    if student_len < reference_len * TEXT_MIN_LENGTH_RATIO {
        return false;
    }

    let student_keywords = keywords(student);
    let matched = reference_keywords
        .iter()
        .filter(|keyword| {
            student_keywords
                .iter()
                .any(|candidate| candidate.contains(keyword.as_str()) || keyword.contains(candidate))
        })
        .count();

    matched as f64 / reference_keywords.len() as f64 >= TEXT_MIN_KEYWORD_RATIO
}

fn keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.chars().count() >= TEXT_KEYWORD_MIN_CHARS)
        .map(str::to_string)
        .collect()
}

fn leading_number(text: &str) -> Option<&str> {
    NUMBERED.captures(text).and_then(|caps| caps.get(1)).map(|found| found.as_str())
}

fn strip_punctuation(text: &str) -> String {
    let stripped = PUNCTUATION.replace_all(text, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

fn numeric_form(text: &str) -> String {
    without_whitespace(text).replace(',', ".").replace('−', "-")
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

fn option_numbers(text: &str) -> Option<BTreeSet<String>> {
    let tokens = text
        .split(|ch: char| ch == ',' || ch == ';' || ch.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();
    if tokens.is_empty() || !tokens.iter().all(|token| token.chars().all(|ch| ch.is_ascii_digit()))
    {
        return None;
    }
    Some(tokens.into_iter().map(str::to_string).collect())
}
