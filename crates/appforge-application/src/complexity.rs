//! Keyword classification of an opening request.
//!
//! The builder's planning guide changes with the class: simple changes go
//! straight to a one-to-three step plan, questions are answered without a plan,
//! and everything else starts with a short requirements conversation.

use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestComplexity {
    /// One concrete change to existing data or UI
    Simple,
    /// Informational, nothing to build
    Question,
    /// A new app or several features at once
    Complex,
}

const BUILD_VERBS: &[&str] = &[
    "add", "build", "change", "create", "delete", "design", "drop", "generate", "implement",
    "insert", "make", "modify", "remove", "rename", "set", "update",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "which", "how", "why", "where", "when", "who", "is", "are", "does", "do", "can",
    "could", "show", "list", "explain",
];

/// Targets a single operation usually touches.
const NARROW_TARGETS: &[&str] = &[
    "column", "field", "row", "rows", "record", "records", "index", "label", "title", "button",
    "color", "colour", "page", "chart", "filter", "route", "status",
];

/// Nouns that signal a whole application rather than one change.
const APP_NOUNS: &[&str] = &[
    "app", "application", "system", "platform", "portal", "website", "site", "dashboard", "crm",
    "erp", "tracker", "manager", "management",
];

const SIMPLE_MAX_WORDS: usize = 20;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn has_any(words: &[String], set: &[&str]) -> bool {
    words.iter().any(|w| set.contains(&w.as_str()))
}

/// Classifies the first message of a planning conversation.
pub fn classify_request(message: &str) -> RequestComplexity {
    let trimmed = message.trim();
    let words = words(trimmed);
    let Some(first) = words.first() else {
        return RequestComplexity::Complex;
    };

    let builds = has_any(&words, BUILD_VERBS);
    let asks = trimmed.ends_with('?') || QUESTION_WORDS.contains(&first.as_str());
    if asks && !builds {
        return RequestComplexity::Question;
    }

    if builds
        && words.len() <= SIMPLE_MAX_WORDS
        && has_any(&words, NARROW_TARGETS)
        && !has_any(&words, APP_NOUNS)
    {
        return RequestComplexity::Simple;
    }
    RequestComplexity::Complex
}
