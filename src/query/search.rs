//! Search term composition.
//!
//! Free text is disambiguated before any query is built: text that is
//! exactly a status keyword (case-insensitive) becomes a status filter,
//! text that parses as a calendar date additionally matches the due date,
//! and anything else is a plain substring over title and description.

use std::str::FromStr;

use chrono::NaiveDate;

use crate::models::ProjectStatus;

/// What a free-text term turned out to mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTerm {
    /// The text was exactly one of the four status keywords; substring
    /// search is suppressed.
    StatusKeyword(ProjectStatus),
    /// Plain text, with an optional date reading for a due-date branch.
    Free {
        text: String,
        as_date: Option<NaiveDate>,
    },
}

/// A composed search: the conjunction of an optional text term, an optional
/// exact status filter, and an optional author-name filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPlan {
    pub text: Option<TextTerm>,
    pub status: Option<ProjectStatus>,
    pub author_name: Option<String>,
}

impl SearchPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Composes a plan from raw filter inputs. Empty or whitespace-only
    /// strings count as absent. Status strings are NOT parsed here — the
    /// callers reject unrecognized statuses before composing a plan.
    pub fn compose(
        free_text: Option<&str>,
        status: Option<ProjectStatus>,
        author_name: Option<&str>,
    ) -> Self {
        let text = free_text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| match ProjectStatus::from_str(t) {
                Ok(keyword) => TextTerm::StatusKeyword(keyword),
                Err(_) => TextTerm::Free {
                    text: t.to_string(),
                    as_date: parse_flexible_date(t),
                },
            });

        let author_name = author_name
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        Self {
            text,
            status,
            author_name,
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.text.is_none() && self.status.is_none() && self.author_name.is_none()
    }
}

/// Attempts to read `text` as a calendar date, normalized to date-only.
/// Accepts ISO dates, RFC 3339 timestamps (time of day discarded), and the
/// slash-separated month-first form.
pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%m/%d/%Y") {
        return Some(date);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_keyword_is_detected_case_insensitively() {
        for raw in ["DONE", "done", "Done", "in_progress", "IDEA", "review"] {
            let plan = SearchPlan::compose(Some(raw), None, None);
            assert!(
                matches!(plan.text, Some(TextTerm::StatusKeyword(_))),
                "{raw} should be a status keyword"
            );
        }
    }

    #[test]
    fn test_status_keyword_requires_exact_match() {
        let plan = SearchPlan::compose(Some("done deal"), None, None);
        assert!(matches!(plan.text, Some(TextTerm::Free { .. })));
    }

    #[test]
    fn test_whitespace_text_is_absent() {
        assert!(SearchPlan::compose(Some("   "), None, None).text.is_none());
        assert!(SearchPlan::compose(Some(""), None, None).text.is_none());
        assert!(SearchPlan::compose(None, None, None).is_unfiltered());
    }

    #[test]
    fn test_text_is_trimmed() {
        let plan = SearchPlan::compose(Some("  portail  "), None, None);
        match plan.text {
            Some(TextTerm::Free { text, .. }) => assert_eq!(text, "portail"),
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn test_date_text_gets_a_date_reading() {
        let plan = SearchPlan::compose(Some("2025-03-01"), None, None);
        match plan.text {
            Some(TextTerm::Free { as_date, .. }) => {
                assert_eq!(as_date, NaiveDate::from_ymd_opt(2025, 3, 1));
            }
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_date_falls_back_to_substring() {
        let plan = SearchPlan::compose(Some("2025-13-40"), None, None);
        match plan.text {
            Some(TextTerm::Free { as_date, .. }) => assert!(as_date.is_none()),
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn test_rfc3339_timestamp_is_normalized_to_date() {
        assert_eq!(
            parse_flexible_date("2025-03-01T15:30:00Z"),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
    }

    #[test]
    fn test_slash_date_is_month_first() {
        assert_eq!(
            parse_flexible_date("03/01/2025"),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
    }

    #[test]
    fn test_author_name_is_trimmed_and_optional() {
        let plan = SearchPlan::compose(None, None, Some("  amina "));
        assert_eq!(plan.author_name.as_deref(), Some("amina"));
        assert!(SearchPlan::compose(None, None, Some(" "))
            .author_name
            .is_none());
    }

    #[test]
    fn test_explicit_status_is_independent_of_text() {
        let plan = SearchPlan::compose(Some("portail"), Some(ProjectStatus::Review), None);
        assert!(matches!(plan.text, Some(TextTerm::Free { .. })));
        assert_eq!(plan.status, Some(ProjectStatus::Review));
    }
}
