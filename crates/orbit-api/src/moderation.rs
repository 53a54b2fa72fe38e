use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use tracing::info;
use uuid::Uuid;

use orbit_types::api::{InappropriateResult, ModerateRequest, ModerationLogEntry, ModerationResult, SpamResult};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::params::LimitQuery;
use crate::state::{AppState, blocking};

const SPAM_KEYWORDS: [&str; 11] = [
    "buy now",
    "click here",
    "free money",
    "get rich quick",
    "limited time",
    "act now",
    "guaranteed",
    "no risk",
    "make money fast",
    "work from home",
    "earn $$$",
];

/// Whole words that mark content as inappropriate, in three groups.
const INAPPROPRIATE_WORDS: [&[&str]; 3] = [
    &["hate", "violence", "harassment"],
    &["offensive", "abusive", "toxic"],
    &["discrimination", "racism", "sexism"],
];

/// Spam when at least two keywords appear (case-insensitive substring).
pub fn detect_spam(content: &str) -> SpamResult {
    let lower = content.to_lowercase();
    let keywords: Vec<String> = SPAM_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .map(|k| k.to_string())
        .collect();

    let score = keywords.len();
    SpamResult {
        is_spam: score >= 2,
        confidence: (score as f64 / 5.0).min(1.0),
        keywords,
    }
}

/// Whole-word, case-insensitive match against the word groups. Only ASCII
/// letters, digits and `_` form words, so accented letters act as
/// boundaries. Matches keep the casing they had in the content.
pub fn detect_inappropriate(content: &str) -> InappropriateResult {
    let words: Vec<&str> = content
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    let mut matches = Vec::new();
    for group in INAPPROPRIATE_WORDS {
        for word in &words {
            let lower = word.to_lowercase();
            if group.contains(&lower.as_str()) {
                matches.push(word.to_string());
            }
        }
    }

    InappropriateResult {
        is_inappropriate: !matches.is_empty(),
        confidence: (matches.len() as f64 / 3.0).min(1.0),
        matches,
    }
}

pub fn moderate(content: &str) -> ModerationResult {
    let spam_result = detect_spam(content);
    let inappropriate_result = detect_inappropriate(content);

    let mut reasons = Vec::new();
    if spam_result.is_spam {
        reasons.push("spam");
    }
    if inappropriate_result.is_inappropriate {
        reasons.push("inappropriate_content");
    }

    ModerationResult {
        is_blocked: !reasons.is_empty(),
        reason: reasons.join(", "),
        spam_result,
        inappropriate_result,
    }
}

pub async fn moderate_post(
    State(state): State<AppState>,
    payload: Result<Json<ModerateRequest>, JsonRejection>,
) -> ApiResult<Json<ModerationResult>> {
    let Json(req) = payload?;
    let result = moderate(&req.content);

    let post_id = req.post_id;
    let stored_reason = result.reason.replace(", ", ",");
    let (is_blocked, spam_score, inappropriate_score) = (
        result.is_blocked,
        result.spam_result.confidence,
        result.inappropriate_result.confidence,
    );
    blocking(&state, move |db| {
        let pid = post_id.to_string();
        if db.get_post(&pid)?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        db.insert_moderation_log(
            &Uuid::new_v4().to_string(),
            &pid,
            is_blocked,
            &stored_reason,
            spam_score,
            inappropriate_score,
        )?;
        Ok(())
    })
    .await?;

    if result.is_blocked {
        info!("Post {} flagged: {}", post_id, result.reason);
    }

    Ok(Json(result))
}

pub async fn history(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ModerationLogEntry>>> {
    let Query(query) = query?;
    let limit = query.resolve(50, 200);
    let rows = blocking(&state, move |db| Ok(db.moderation_history(limit)?)).await?;

    Ok(Json(rows.into_iter().map(convert::moderation_entry).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_keyword_is_not_spam() {
        let result = detect_spam("This offer is GUARANTEED");
        assert!(!result.is_spam);
        assert_eq!(result.keywords, vec!["guaranteed"]);
        assert_eq!(result.confidence, 0.2);
    }

    #[test]
    fn two_keywords_are_spam() {
        let result = detect_spam("Buy now! Click here for free money");
        assert!(result.is_spam);
        assert_eq!(result.keywords, vec!["buy now", "click here", "free money"]);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn inappropriate_words_match_whole_words_only() {
        let result = detect_inappropriate("So much Hate and toxic replies, hateful though?");
        assert!(result.is_inappropriate);
        assert_eq!(result.matches, vec!["Hate", "toxic"]);
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);

        assert!(!detect_inappropriate("what a lovely day").is_inappropriate);
    }

    #[test]
    fn non_ascii_letters_are_word_boundaries() {
        let result = detect_inappropriate("éhate and toxicö");
        assert_eq!(result.matches, vec!["hate", "toxic"]);
        assert!(!detect_inappropriate("hate_speech").is_inappropriate);
    }

    #[test]
    fn confidence_is_capped() {
        let result = detect_inappropriate("hate violence harassment racism");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn reasons_are_combined() {
        let result = moderate("act now, limited time: no more hate");
        assert!(result.is_blocked);
        assert_eq!(result.reason, "spam, inappropriate_content");

        let clean = moderate("hello friends");
        assert!(!clean.is_blocked);
        assert_eq!(clean.reason, "");
    }
}
