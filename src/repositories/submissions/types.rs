use time::PrimitiveDateTime;

pub(crate) const COLUMNS: &str = "\
    id, check_id, user_id, status, image_urls, detected_variant, student_name, error_details, \
    evaluation_started_at, evaluation_completed_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub(crate) struct CompletionUpdate<'a> {
    pub(crate) detected_variant: Option<i32>,
    pub(crate) student_name: Option<&'a str>,
    pub(crate) completed_at: PrimitiveDateTime,
}
