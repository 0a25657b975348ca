use std::collections::BTreeMap;

use super::errors::ValidationError;
use super::matcher::{compare_choice_set, compare_closed, compare_open};
use super::types::{
    DetailedAnswer, DetectedAnswer, EssayCriterion, GradeCriterion, GradeSummary, QuestionKind,
    QuestionMeta,
};

const ESSAY_MAX_GRADE: u8 = 5;

/// How much each question is worth. Picked once when the calculator is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScoringScheme {
    /// Every question is worth one point.
    SimpleCount,
    /// Explicit weights; questions missing from the map are worth one point.
    PointsBased(BTreeMap<u32, u32>),
}

impl ScoringScheme {
    pub(crate) fn from_points(points: BTreeMap<u32, u32>) -> Self {
        if points.is_empty() {
            Self::SimpleCount
        } else {
            Self::PointsBased(points)
        }
    }

    fn points_for(&self, question: u32) -> u32 {
        match self {
            Self::SimpleCount => 1,
            Self::PointsBased(points) => points.get(&question).copied().unwrap_or(1),
        }
    }

    fn reports_points(&self) -> bool {
        matches!(self, Self::PointsBased(_))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GradeCalculator {
    scheme: ScoringScheme,
    criteria: Vec<GradeCriterion>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TestTally {
    pub(crate) total_questions: u32,
    pub(crate) correct_answers: u32,
    pub(crate) earned_points: u32,
    pub(crate) total_points: u32,
    pub(crate) detailed_answers: BTreeMap<String, DetailedAnswer>,
}

impl GradeCalculator {
    pub(crate) fn new(
        points: BTreeMap<u32, u32>,
        criteria: Vec<GradeCriterion>,
    ) -> Result<Self, ValidationError> {
        if criteria.is_empty() {
            return Err(ValidationError::EmptyCriteria);
        }
        Ok(Self { scheme: ScoringScheme::from_points(points), criteria })
    }

    pub(crate) fn scheme(&self) -> &ScoringScheme {
        &self.scheme
    }

    /// Scores questions `1..=total_questions`; a question without an AI answer
    /// or without a reference counts as incorrect.
    pub(crate) fn aggregate_test(
        &self,
        total_questions: u32,
        questions: &BTreeMap<u32, QuestionMeta>,
        ai_answers: &BTreeMap<u32, DetectedAnswer>,
        reference_answers: &BTreeMap<u32, String>,
    ) -> TestTally {
        let mut tally = TestTally {
            total_questions,
            correct_answers: 0,
            earned_points: 0,
            total_points: 0,
            detailed_answers: BTreeMap::new(),
        };

        for number in 1..=total_questions {
            let meta = questions.get(&number).cloned().unwrap_or_default();
            let points = self.scheme.points_for(number);
            let answer = ai_answers.get(&number);
            let reference = reference_answers.get(&number);
            tally.total_points = tally.total_points.saturating_add(points);

            let correct = match (answer, reference) {
                (Some(answer), Some(reference)) => {
                    is_correct(&meta, &answer.detected_answer, reference)
                }
                _ => false,
            };

            if correct {
                tally.correct_answers += 1;
                tally.earned_points = tally.earned_points.saturating_add(points);
            }

            tally.detailed_answers.insert(
                number.to_string(),
                DetailedAnswer {
                    given: answer.map(|answer| answer.detected_answer.clone()).unwrap_or_default(),
                    correct: reference.cloned(),
                    confidence: answer.and_then(|answer| answer.confidence),
                    points: self
                        .scheme
                        .reports_points()
                        .then_some(if correct { points } else { 0 }),
                },
            );
        }

        tally
    }

    pub(crate) fn summarize_test(&self, tally: TestTally) -> GradeSummary {
        let (percentage_score, final_grade) =
            percentage_and_grade(tally.earned_points, tally.total_points, &self.criteria);

        GradeSummary {
            total_questions: tally.total_questions,
            correct_answers: tally.correct_answers,
            incorrect_answers: tally.total_questions - tally.correct_answers,
            percentage_score,
            final_grade,
            detailed_answers: tally.detailed_answers,
        }
    }
}

fn is_correct(meta: &QuestionMeta, given: &str, reference: &str) -> bool {
    match meta.kind {
        QuestionKind::Open => compare_open(given, reference),
        QuestionKind::Multiple if !meta.strict_match => compare_choice_set(given, reference)
            .unwrap_or_else(|| compare_closed(given, reference, false)),
        QuestionKind::Single | QuestionKind::Multiple => {
            compare_closed(given, reference, meta.strict_match)
        }
    }
}

/// Rounds the score to a whole percentage and picks the best grade whose
/// threshold it reaches, falling back to the lowest configured grade.
///
/// `criteria` must not be empty.
pub(crate) fn percentage_and_grade(
    earned: u32,
    total: u32,
    criteria: &[GradeCriterion],
) -> (u8, u8) {
    let percentage = if total == 0 {
        0
    } else {
        (f64::from(earned) / f64::from(total) * 100.0).round().clamp(0.0, 100.0) as u8
    };

    let mut sorted = criteria.to_vec();
    sorted.sort_by(|a, b| b.grade.cmp(&a.grade));

    let grade = sorted
        .iter()
        .find(|criterion| criterion.min_percentage <= percentage)
        .or_else(|| sorted.last())
        .map(|criterion| criterion.grade)
        .unwrap_or(2);

    (percentage, grade)
}

/// Accepts the model's holistic grade only when it names a configured
/// criterion; anything else drops to the lowest configured grade.
pub(crate) fn essay_grade(
    ai_proposed_grade: Option<i64>,
    criteria: &[EssayCriterion],
) -> Result<(u8, u8), ValidationError> {
    let lowest =
        criteria.iter().map(|criterion| criterion.grade).min().ok_or(ValidationError::EmptyCriteria)?;

    let grade = ai_proposed_grade
        .and_then(|proposed| {
            criteria.iter().find(|criterion| i64::from(criterion.grade) == proposed)
        })
        .map(|criterion| criterion.grade)
        .unwrap_or(lowest);

    let percentage =
        (f64::from(grade) / f64::from(ESSAY_MAX_GRADE) * 100.0).round().clamp(0.0, 100.0) as u8;
    Ok((percentage, grade))
}

/// Essay results reuse the test counters: `grade` correct and `5 - grade`
/// incorrect out of a single graded piece of work.
pub(crate) fn summarize_essay(
    ai_proposed_grade: Option<i64>,
    criteria: &[EssayCriterion],
    given: String,
    confidence: Option<f64>,
) -> Result<GradeSummary, ValidationError> {
    let (percentage_score, final_grade) = essay_grade(ai_proposed_grade, criteria)?;

    let detailed_answers = BTreeMap::from([(
        "1".to_string(),
        DetailedAnswer { given, correct: None, confidence, points: None },
    )]);

    Ok(GradeSummary {
        total_questions: 1,
        correct_answers: u32::from(final_grade),
        incorrect_answers: u32::from(ESSAY_MAX_GRADE - final_grade),
        percentage_score,
        final_grade,
        detailed_answers,
    })
}
