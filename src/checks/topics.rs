//! Repository topic tags

use crate::domain::checks::CheckResult;
use std::collections::BTreeSet;

/// Split a comma-separated topic list; tags are trimmed and empties dropped
pub fn parse_topics(list: &str) -> BTreeSet<&str> {
    list.split(',').map(str::trim).filter(|tag| !tag.is_empty()).collect()
}

/// Expected topics absent from `actual`, sorted
pub fn missing_topics<'a>(actual: &str, expected: &'a [String]) -> Vec<&'a str> {
    let present = parse_topics(actual);
    let missing: BTreeSet<&str> = expected
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty() && !present.contains(tag))
        .collect();
    missing.into_iter().collect()
}

/// Check that the repository carries every expected topic; extra topics are allowed
pub fn check_topics(actual: Option<&str>, expected: &[String]) -> CheckResult {
    let label = format!("Topics on repo contain {}.", expected.join(", "));

    let Some(actual) = actual else {
        return CheckResult::fail(label).with_detail("Topics were not supplied.");
    };

    let missing = missing_topics(actual, expected);
    if missing.is_empty() {
        CheckResult::pass(label)
    } else {
        CheckResult::fail(label).with_detail(format!("Missing topics: {}.", missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checks::CheckStatus;
    use rstest::rstest;

    fn expected() -> Vec<String> {
        vec!["azd-templates".to_string(), "ai-azd-templates".to_string()]
    }

    #[test]
    fn test_reports_exactly_the_missing_topic() {
        assert_eq!(missing_topics("azd-templates,other", &expected()), vec!["ai-azd-templates"]);

        let item = check_topics(Some("azd-templates,other"), &expected());
        assert_eq!(item.status, CheckStatus::Fail);
        assert_eq!(item.details, vec!["Missing topics: ai-azd-templates."]);
    }

    #[rstest]
    #[case("azd-templates,ai-azd-templates")]
    #[case(" ai-azd-templates , azd-templates ,extra")]
    #[case("azd-templates,,ai-azd-templates,")]
    fn test_accepts_complete_lists(#[case] actual: &str) {
        assert_eq!(check_topics(Some(actual), &expected()).status, CheckStatus::Pass);
    }

    #[test]
    fn test_absent_topics_fail() {
        let item = check_topics(None, &expected());
        assert_eq!(item.status, CheckStatus::Fail);
        assert_eq!(item.details, vec!["Topics were not supplied."]);
    }

    #[test]
    fn test_missing_list_is_sorted() {
        let wanted = vec!["zeta".to_string(), "alpha".to_string()];
        let item = check_topics(Some(""), &wanted);
        assert_eq!(item.label, "Topics on repo contain zeta, alpha.");
        assert_eq!(item.details, vec!["Missing topics: alpha, zeta."]);
    }
}
