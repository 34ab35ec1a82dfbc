//! Turns ranked records into the text handed to the completion service.

use crate::tokenizer::token_spans;
use serde::Serialize;

/// Default number of context tokens when the caller sets no budget.
pub const DEFAULT_CONTEXT_BUDGET: usize = 1500;

/// A ranked record as seen by prompt assembly.
#[derive(Debug, Clone, Copy)]
pub struct ContextItem<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub text: String,
    /// Ids of the records that made it into the context, in rank order.
    pub sources: Vec<String>,
    /// Whether the context budget cut any record short or dropped one.
    pub truncated: bool,
}

/// Concatenate relevant records into a context block followed by the question.
///
/// Records scored 0.0 share nothing with the question and are left out. The
/// context is limited to `budget` tokens and cut on a token boundary; the
/// question is always kept whole.
pub fn build_prompt(question: &str, items: &[ContextItem<'_>], budget: usize) -> Prompt {
    let mut remaining = budget;
    let mut sources = Vec::new();
    let mut blocks = Vec::new();
    let mut truncated = false;

    for item in items.iter().filter(|i| i.score > 0.0) {
        if remaining == 0 {
            truncated = true;
            break;
        }
        let spans = token_spans(item.text);
        let text = if spans.len() > remaining {
            truncated = true;
            let cut = spans[remaining - 1].1;
            remaining = 0;
            format!("{} ...", &item.text[..cut])
        } else {
            remaining -= spans.len();
            item.text.trim().to_string()
        };
        blocks.push(format!("- [{}] {}", item.id, text));
        sources.push(item.id.to_string());
    }

    let mut text = String::from("You are a patient tutor helping a student.\n\n");
    if blocks.is_empty() {
        text.push_str("No course material matched this question. Answer from general knowledge and say that no course material was found.\n");
    } else {
        text.push_str("Answer using the course material below. If it does not cover the question, say so.\n\nCourse material:\n");
        for b in &blocks {
            text.push_str(b);
            text.push('\n');
        }
    }
    text.push_str("\nQuestion: ");
    text.push_str(question.trim());
    text.push_str("\nAnswer:");

    Prompt { text, sources, truncated }
}
