use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::errors::ValidationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum QuestionKind {
    #[default]
    Single,
    Multiple,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CheckType {
    Test,
    Essay,
}

impl CheckType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Essay => "essay",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "test" => Some(Self::Test),
            "essay" => Some(Self::Essay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionMeta {
    #[serde(rename = "type", default)]
    pub(crate) kind: QuestionKind,
    #[serde(default)]
    pub(crate) points: Option<u32>,
    #[serde(default, rename = "strictMatch", alias = "strict_match")]
    pub(crate) strict_match: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub(crate) struct GradeCriterion {
    #[validate(range(min = 2, max = 5))]
    pub(crate) grade: u8,
    #[validate(range(max = 100))]
    pub(crate) min_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub(crate) struct EssayCriterion {
    #[validate(range(min = 2, max = 5))]
    pub(crate) grade: u8,
    #[serde(default)]
    pub(crate) description: String,
}

pub(crate) fn default_grade_criteria() -> Vec<GradeCriterion> {
    vec![
        GradeCriterion { grade: 5, min_percentage: 85 },
        GradeCriterion { grade: 4, min_percentage: 70 },
        GradeCriterion { grade: 3, min_percentage: 50 },
        GradeCriterion { grade: 2, min_percentage: 0 },
    ]
}

pub(crate) fn default_essay_criteria() -> Vec<EssayCriterion> {
    [
        (5, "Тема раскрыта полностью, логичная структура, ошибок практически нет"),
        (4, "Тема раскрыта, структура в целом выдержана, есть отдельные ошибки"),
        (3, "Тема раскрыта частично, нарушена логика, заметное число ошибок"),
        (2, "Тема не раскрыта, структура отсутствует, много грубых ошибок"),
    ]
    .into_iter()
    .map(|(grade, description)| EssayCriterion { grade, description: description.to_string() })
    .collect()
}

/// Grading configuration of one check (a test or an essay assignment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct CheckConfig {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) check_type: CheckType,
    #[validate(range(min = 1, max = 20))]
    pub(crate) variant_count: u32,
    #[validate(nested)]
    pub(crate) grade_criteria: Vec<GradeCriterion>,
    #[validate(nested)]
    pub(crate) essay_criteria: Vec<EssayCriterion>,
    pub(crate) questions: BTreeMap<u32, QuestionMeta>,
}

impl CheckConfig {
    pub(crate) fn validated(self) -> Result<Self, ValidationError> {
        self.validate().map_err(|err| ValidationError::InvalidCheck(err.to_string()))?;

        let empty = match self.check_type {
            CheckType::Test => self.grade_criteria.is_empty(),
            CheckType::Essay => self.essay_criteria.is_empty(),
        };
        if empty {
            return Err(ValidationError::EmptyCriteria);
        }

        Ok(self)
    }

    /// Folds the detected variant back into the configured range.
    pub(crate) fn effective_variant(&self, detected: Option<u32>) -> u32 {
        match detected {
            Some(variant) if variant >= 1 && variant <= self.variant_count => variant,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BankOption {
    pub(crate) text: String,
    #[serde(default, rename = "isCorrect", alias = "is_correct")]
    pub(crate) is_correct: bool,
}

/// One question of a generated test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BankQuestion {
    #[serde(default)]
    pub(crate) number: Option<u32>,
    #[serde(rename = "type", default)]
    pub(crate) kind: QuestionKind,
    #[serde(default)]
    pub(crate) points: Option<u32>,
    #[serde(default, rename = "strictMatch", alias = "strict_match")]
    pub(crate) strict_match: bool,
    #[serde(default)]
    pub(crate) options: Vec<BankOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceSource {
    QuestionBank,
    VariantAnswers,
}

impl ReferenceSource {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::QuestionBank => "question_bank",
            Self::VariantAnswers => "variant_answers",
        }
    }
}

/// Canonical answers for one variant plus the question metadata they are graded with.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReferenceSet {
    pub(crate) variant: u32,
    pub(crate) source: ReferenceSource,
    pub(crate) answers: BTreeMap<u32, String>,
    pub(crate) questions: BTreeMap<u32, QuestionMeta>,
}

impl ReferenceSet {
    pub(crate) fn from_variant_answers(
        variant: u32,
        raw: &BTreeMap<String, String>,
        questions: &BTreeMap<u32, QuestionMeta>,
    ) -> Self {
        let answers = raw
            .iter()
            .filter_map(|(key, value)| key.trim().parse::<u32>().ok().map(|n| (n, value.clone())))
            .collect();

        Self {
            variant,
            source: ReferenceSource::VariantAnswers,
            answers,
            questions: questions.clone(),
        }
    }

    /// Closed questions reference their 1-based option numbers, open questions
    /// the text of the correct option.
    pub(crate) fn from_question_bank(variant: u32, bank: &[BankQuestion]) -> Self {
        let mut answers = BTreeMap::new();
        let mut questions = BTreeMap::new();

        for (idx, question) in bank.iter().enumerate() {
            let number = question.number.unwrap_or(idx as u32 + 1);
            questions.insert(
                number,
                QuestionMeta {
                    kind: question.kind,
                    points: question.points,
                    strict_match: question.strict_match,
                },
            );

            let reference = match question.kind {
                QuestionKind::Open => question
                    .options
                    .iter()
                    .find(|option| option.is_correct)
                    .map(|option| option.text.clone()),
                QuestionKind::Single | QuestionKind::Multiple => {
                    let correct = question
                        .options
                        .iter()
                        .enumerate()
                        .filter(|(_, option)| option.is_correct)
                        .map(|(pos, _)| (pos + 1).to_string())
                        .collect::<Vec<_>>();
                    if correct.is_empty() {
                        None
                    } else if question.kind == QuestionKind::Single {
                        correct.into_iter().next()
                    } else {
                        Some(correct.join(", "))
                    }
                }
            };

            if let Some(reference) = reference {
                answers.insert(number, reference);
            }
        }

        Self { variant, source: ReferenceSource::QuestionBank, answers, questions }
    }

    pub(crate) fn total_questions(&self) -> u32 {
        let answered = self.answers.keys().copied().max().unwrap_or(0);
        let described = self.questions.keys().copied().max().unwrap_or(0);
        answered.max(described)
    }

    pub(crate) fn points_map(&self) -> BTreeMap<u32, u32> {
        self.questions
            .iter()
            .filter_map(|(number, meta)| meta.points.map(|points| (*number, points)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ContentErrorKind {
    InappropriateContent,
    UnsupportedTestFormat,
}

impl ContentErrorKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InappropriateContent => "inappropriate_content",
            Self::UnsupportedTestFormat => "unsupported_test_format",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "inappropriate_content" => Some(Self::InappropriateContent),
            "unsupported_test_format" => Some(Self::UnsupportedTestFormat),
            _ => None,
        }
    }
}

/// Terminal verdict: the images are not gradable work.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContentError {
    pub(crate) kind: ContentErrorKind,
    pub(crate) message: String,
    pub(crate) detected_content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DetectedAnswer {
    pub(crate) detected_answer: String,
    pub(crate) confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EssayAnalysis {
    pub(crate) final_grade: Option<i64>,
    pub(crate) raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnalysisPayload {
    pub(crate) total_questions: u32,
    pub(crate) variant_detected: Option<u32>,
    pub(crate) confidence_score: Option<f64>,
    pub(crate) student_name: Option<String>,
    pub(crate) answers: BTreeMap<u32, DetectedAnswer>,
    pub(crate) essay_analysis: Option<EssayAnalysis>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AiAnalysisResult {
    ContentError(ContentError),
    Success(AnalysisPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DetailedAnswer {
    pub(crate) given: String,
    pub(crate) correct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) points: Option<u32>,
}

/// Calculator output, before it is bound to a submission.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeSummary {
    pub(crate) total_questions: u32,
    pub(crate) correct_answers: u32,
    pub(crate) incorrect_answers: u32,
    pub(crate) percentage_score: u8,
    pub(crate) final_grade: u8,
    pub(crate) detailed_answers: BTreeMap<String, DetailedAnswer>,
}

/// Persisted, immutable outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EvaluationResult {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) total_questions: u32,
    pub(crate) correct_answers: u32,
    pub(crate) incorrect_answers: u32,
    pub(crate) percentage_score: u8,
    pub(crate) final_grade: u8,
    pub(crate) variant_used: u32,
    pub(crate) detailed_answers: BTreeMap<String, DetailedAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) essay_analysis: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> BankOption {
        BankOption { text: text.to_string(), is_correct }
    }

    #[test]
    fn question_bank_references_option_numbers() {
        let bank = vec![
            BankQuestion {
                number: None,
                kind: QuestionKind::Single,
                points: Some(2),
                strict_match: false,
                options: vec![option("Монитор", false), option("Принтер", true)],
            },
            BankQuestion {
                number: None,
                kind: QuestionKind::Multiple,
                points: None,
                strict_match: false,
                options: vec![option("a", true), option("b", false), option("c", true)],
            },
            BankQuestion {
                number: None,
                kind: QuestionKind::Open,
                points: None,
                strict_match: false,
                options: vec![option("3.5", true)],
            },
        ];

        let set = ReferenceSet::from_question_bank(2, &bank);
        assert_eq!(set.source, ReferenceSource::QuestionBank);
        assert_eq!(set.source.as_str(), "question_bank");
        assert_eq!(set.answers.get(&1).map(String::as_str), Some("2"));
        assert_eq!(set.answers.get(&2).map(String::as_str), Some("1, 3"));
        assert_eq!(set.answers.get(&3).map(String::as_str), Some("3.5"));
        assert_eq!(set.points_map(), BTreeMap::from([(1, 2)]));
        assert_eq!(set.total_questions(), 3);
    }

    #[test]
    fn variant_answers_skip_non_numeric_keys() {
        let raw = BTreeMap::from([
            ("1".to_string(), "2".to_string()),
            (" 2 ".to_string(), "4".to_string()),
            ("notes".to_string(), "x".to_string()),
        ]);
        let set = ReferenceSet::from_variant_answers(1, &raw, &BTreeMap::new());
        assert_eq!(set.answers.len(), 2);
        assert_eq!(set.total_questions(), 2);
    }

    #[test]
    fn effective_variant_falls_back_to_first() {
        let check = CheckConfig {
            id: "c".to_string(),
            title: "t".to_string(),
            check_type: CheckType::Test,
            variant_count: 2,
            grade_criteria: default_grade_criteria(),
            essay_criteria: Vec::new(),
            questions: BTreeMap::new(),
        };
        assert_eq!(check.effective_variant(Some(2)), 2);
        assert_eq!(check.effective_variant(Some(3)), 1);
        assert_eq!(check.effective_variant(Some(0)), 1);
        assert_eq!(check.effective_variant(None), 1);
    }

    #[test]
    fn validated_rejects_out_of_range_grades() {
        let check = CheckConfig {
            id: "c".to_string(),
            title: "t".to_string(),
            check_type: CheckType::Test,
            variant_count: 1,
            grade_criteria: vec![GradeCriterion { grade: 6, min_percentage: 90 }],
            essay_criteria: Vec::new(),
            questions: BTreeMap::new(),
        };
        assert!(matches!(check.validated(), Err(ValidationError::InvalidCheck(_))));
    }

    #[test]
    fn validated_requires_criteria_for_check_type() {
        let check = CheckConfig {
            id: "c".to_string(),
            title: "t".to_string(),
            check_type: CheckType::Essay,
            variant_count: 1,
            grade_criteria: default_grade_criteria(),
            essay_criteria: Vec::new(),
            questions: BTreeMap::new(),
        };
        assert_eq!(check.validated(), Err(ValidationError::EmptyCriteria));
    }
}
