use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::grading::errors::AnalysisError;
use crate::grading::retry::{Completion, CompletionRequest, CompletionTransport, MessagePart};
use crate::grading::types::{CheckConfig, CheckType, QuestionKind};

const TEST_SYSTEM_PROMPT: &str = r#"Вы — опытный преподаватель, проверяющий бланки тестов по фотографиям.
Ваша задача — распознать ответы ученика и вернуть их в строгом JSON формате. Не оценивайте ответы, только распознавайте.

Если на изображениях нет учебной работы или есть недопустимое содержимое, верните:
{"error": "inappropriate_content", "message": "описание проблемы", "content_type_detected": "что изображено"}

Если на изображениях учебная работа, но это не тест с нумерованными вопросами, верните:
{"error": "unsupported_test_format", "message": "описание проблемы", "content_type_detected": "что изображено"}

Иначе верните:
{
  "total_questions": <число вопросов>,
  "variant_detected": <номер варианта или null>,
  "student_name": "<имя ученика или null>",
  "confidence_score": <уверенность распознавания от 0 до 1>,
  "answers": {
    "1": {"detected_answer": "<ответ ученика как написано>", "confidence": <от 0 до 1>}
  }
}

Правила:
- Для вопросов с выбором указывайте номер выбранного варианта, для нескольких вариантов перечисляйте номера через запятую.
- Для открытых вопросов переписывайте ответ дословно, без исправлений.
- Если ответ не найден, используйте пустую строку.
"#;

const ESSAY_SYSTEM_PROMPT: &str = r#"Вы — опытный преподаватель русского языка и литературы, проверяющий сочинения по фотографиям.
Ваша задача — распознать текст сочинения, проанализировать его и предложить итоговую оценку.

Если на изображениях нет учебной работы или есть недопустимое содержимое, верните:
{"error": "inappropriate_content", "message": "описание проблемы", "content_type_detected": "что изображено"}

Если на изображениях учебная работа, но это не сочинение, верните:
{"error": "unsupported_test_format", "message": "описание проблемы", "content_type_detected": "что изображено"}

Иначе верните строгий JSON:
{
  "total_questions": 1,
  "variant_detected": <номер варианта или null>,
  "student_name": "<имя ученика или null>",
  "confidence_score": <уверенность распознавания от 0 до 1>,
  "answers": {
    "1": {"detected_answer": "<краткое изложение текста>", "confidence": <от 0 до 1>}
  },
  "essay_analysis": {
    "structure": "анализ структуры",
    "logic": "анализ логики и аргументации",
    "errors": {
      "count": <число ошибок>,
      "examples": ["пример ошибки 1", "пример ошибки 2"]
    },
    "content_quality": "общая оценка содержания",
    "final_grade": <оценка от 2 до 5>
  }
}

Будьте кратки: не более пяти примеров ошибок.
"#;

/// Builds the chat request for one submission of `check`.
pub(crate) fn build_request(
    check: &CheckConfig,
    submission_id: &str,
    image_urls: &[String],
    model: &str,
    temperature: f64,
    max_tokens: u32,
) -> CompletionRequest {
    let system_prompt = match check.check_type {
        CheckType::Test => TEST_SYSTEM_PROMPT,
        CheckType::Essay => ESSAY_SYSTEM_PROMPT,
    };

    let mut parts = Vec::with_capacity(image_urls.len() + 1);
    parts.push(MessagePart::Text(user_prompt(check, image_urls.len())));
    parts.extend(image_urls.iter().map(|url| MessagePart::ImageUrl(image_reference(url))));

    CompletionRequest {
        submission_id: submission_id.to_string(),
        model: model.to_string(),
        system_prompt: system_prompt.to_string(),
        parts,
        temperature,
        max_tokens,
    }
}

fn user_prompt(check: &CheckConfig, pages: usize) -> String {
    let mut prompt = format!(
        "Работа: {}\nТип проверки: {}\nКоличество вариантов: {}\nКоличество страниц: {}\n",
        check.title,
        check.check_type.as_str(),
        check.variant_count,
        pages
    );

    if check.check_type == CheckType::Essay {
        prompt.push_str("\nКритерии оценивания:\n");
        for criterion in &check.essay_criteria {
            prompt.push_str(&format!("- {}: {}\n", criterion.grade, criterion.description));
        }
        prompt.push_str("\nОБЯЗАТЕЛЬНО используйте JSON формат ответа как описано в системном промпте.\n");
        return prompt;
    }

    if !check.questions.is_empty() {
        prompt.push_str(&format!("Количество вопросов: {}\n\nТипы вопросов:\n", check.questions.len()));
        for (number, meta) in &check.questions {
            let kind = match meta.kind {
                QuestionKind::Single => "один вариант ответа",
                QuestionKind::Multiple => "несколько вариантов ответа",
                QuestionKind::Open => "открытый ответ",
            };
            prompt.push_str(&format!("{number}. {kind}\n"));
        }
    }
    prompt.push_str("\nОБЯЗАТЕЛЬНО используйте JSON формат ответа как описано в системном промпте.\n");
    prompt
}

fn image_reference(image: &str) -> String {
    if image.starts_with("http") || image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/jpeg;base64,{image}")
    }
}

/// OpenAI-compatible chat-completions transport. One call per attempt; the
/// retry loop lives in the executor.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn payload(request: &CompletionRequest) -> Value {
        let content = request
            .parts
            .iter()
            .map(|part| match part {
                MessagePart::Text(text) => json!({"type": "text", "text": text}),
                MessagePart::ImageUrl(url) => json!({
                    "type": "image_url",
                    "image_url": {"url": url, "detail": "high"}
                }),
            })
            .collect::<Vec<_>>();

        json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": content}
            ],
            "max_completion_tokens": request.max_tokens,
            "temperature": request.temperature,
            "response_format": {"type": "json_object"}
        })
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AnalysisError> {
        let timer = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);

        tracing::info!(
            submission_id = %request.submission_id,
            model = %request.model,
            images = request.parts.len().saturating_sub(1),
            "Sending AI analysis request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::payload(request))
            .send()
            .await
            .map_err(|err| AnalysisError::Transport(format!("request failed: {err}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| AnalysisError::Transport(format!("unreadable response body: {err}")))?;

        if !status.is_success() {
            return Err(AnalysisError::Transport(format!("OpenAI API error {status}: {body}")));
        }

        let completion = completion_from_body(&body)?;

        tracing::info!(
            submission_id = %request.submission_id,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = completion.tokens_used,
            finish_reason = completion.finish_reason.as_deref().unwrap_or("-"),
            "AI analysis response received"
        );

        Ok(completion)
    }
}

fn completion_from_body(body: &Value) -> Result<Completion, AnalysisError> {
    let choice = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| AnalysisError::Transport("response has no choices".to_string()))?;

    let content = choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| AnalysisError::Transport("missing response content".to_string()))?;

    Ok(Completion {
        content: content.to_string(),
        finish_reason: choice.get("finish_reason").and_then(Value::as_str).map(str::to_string),
        tokens_used: body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn request_orders_prompt_before_images() {
        let check = test_support::test_check(3);
        let images = vec!["https://cdn/p1.jpg".to_string(), "AAAA".to_string()];

        let request = build_request(&check, "sub-1", &images, "gpt-4o", 0.1, 4000);

        assert_eq!(request.parts.len(), 3);
        let MessagePart::Text(prompt) = &request.parts[0] else {
            panic!("first part must be text");
        };
        assert!(prompt.contains("Количество вариантов: 2"));
        assert!(prompt.contains("1. один вариант ответа"));
        assert_eq!(request.parts[1], MessagePart::ImageUrl("https://cdn/p1.jpg".to_string()));
        assert_eq!(
            request.parts[2],
            MessagePart::ImageUrl("data:image/jpeg;base64,AAAA".to_string())
        );
        assert!(request.system_prompt.contains("unsupported_test_format"));
    }

    #[test]
    fn essay_request_lists_criteria() {
        let check = test_support::essay_check();

        let request = build_request(&check, "sub-2", &[], "gpt-4o", 0.1, 4000);

        let MessagePart::Text(prompt) = &request.parts[0] else {
            panic!("first part must be text");
        };
        assert!(prompt.contains("Критерии оценивания"));
        assert!(request.system_prompt.contains("essay_analysis"));
    }

    #[test]
    fn payload_uses_chat_completion_shape() {
        let check = test_support::test_check(1);
        let request =
            build_request(&check, "sub-3", &["https://cdn/p1.jpg".to_string()], "gpt-4o", 0.2, 100);

        let payload = OpenAiTransport::payload(&request);

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["max_completion_tokens"], 100);
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(payload["messages"][1]["content"][1]["image_url"]["url"], "https://cdn/p1.jpg");
    }

    #[test]
    fn completion_reads_finish_reason_and_usage() {
        let body = json!({
            "choices": [{"message": {"content": "{}"}, "finish_reason": "length"}],
            "usage": {"total_tokens": 321}
        });

        let completion = completion_from_body(&body).expect("completion");

        assert!(completion.was_truncated());
        assert_eq!(completion.tokens_used, Some(321));
        assert!(matches!(
            completion_from_body(&json!({"choices": []})),
            Err(AnalysisError::Transport(_))
        ));
    }
}
