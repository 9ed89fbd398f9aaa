// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::parser::{ParsedEvent, Severity};
use tracing::warn;

fn non_empty(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// An event is escalated when it is an ERROR carrying an error kind and message.
pub fn is_eligible(event: &ParsedEvent) -> bool {
    event.severity == Severity::Error
        && event
            .error
            .as_ref()
            .is_some_and(|error| non_empty(error.kind.as_ref()) && non_empty(error.message.as_ref()))
}

/// Keeps the events to dispatch, in batch order.
///
/// Identical errors are not collapsed; every occurrence is dispatched.
pub fn select_eligible<I>(events: I) -> Vec<ParsedEvent>
where
    I: IntoIterator<Item = Option<ParsedEvent>>,
{
    events
        .into_iter()
        .flatten()
        .filter(|event| {
            if is_eligible(event) {
                return true;
            }
            if event.severity == Severity::Error {
                warn!(
                    "FILTER | Dropping ERROR record without usable error detail (timestamp: {})",
                    event.timestamp.as_deref().unwrap_or("<none>")
                );
            }
            false
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ErrorDetail;
    use tracing_test::traced_test;

    fn event(severity: Severity, error: Option<ErrorDetail>) -> ParsedEvent {
        ParsedEvent {
            timestamp: Some("2025-01-01T00:00:00Z".to_string()),
            severity,
            context_label: None,
            message: None,
            error,
        }
    }

    fn detail(kind: &str, message: &str) -> Option<ErrorDetail> {
        Some(ErrorDetail {
            kind: Some(kind.to_string()),
            message: Some(message.to_string()),
            trace: None,
        })
    }

    #[test]
    fn test_only_error_with_detail_is_eligible() {
        let events = vec![
            Some(event(Severity::Info, None)),
            Some(event(Severity::Error, None)),
            Some(event(Severity::Error, detail("X", "Y"))),
        ];

        let eligible = select_eligible(events);

        assert_eq!(eligible, vec![event(Severity::Error, detail("X", "Y"))]);
    }

    #[test]
    fn test_blank_kind_or_message_is_not_eligible() {
        assert!(!is_eligible(&event(Severity::Error, detail("", "Y"))));
        assert!(!is_eligible(&event(Severity::Error, detail("X", "  "))));
        assert!(!is_eligible(&event(
            Severity::Error,
            Some(ErrorDetail {
                kind: Some("X".to_string()),
                message: None,
                trace: Some("stack".to_string()),
            })
        )));
    }

    #[test]
    fn test_other_severities_with_detail_are_not_eligible() {
        assert!(!is_eligible(&event(Severity::Warn, detail("X", "Y"))));
        assert!(!is_eligible(&event(Severity::Fatal, detail("X", "Y"))));
    }

    #[test]
    fn test_order_and_duplicates_are_preserved() {
        let events = vec![
            Some(event(Severity::Error, detail("A", "first"))),
            None,
            Some(event(Severity::Error, detail("B", "second"))),
            Some(event(Severity::Error, detail("A", "first"))),
        ];

        let kinds: Vec<_> = select_eligible(events)
            .into_iter()
            .filter_map(|e| e.error.and_then(|d| d.kind))
            .collect();

        assert_eq!(kinds, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_no_events() {
        assert!(select_eligible(Vec::<Option<ParsedEvent>>::new()).is_empty());
        assert!(select_eligible(vec![None, Some(event(Severity::Info, None))]).is_empty());
    }

    #[test]
    #[traced_test]
    fn test_error_without_detail_is_logged() {
        let eligible = select_eligible(vec![Some(event(Severity::Error, None))]);
        assert!(eligible.is_empty());
        assert!(logs_contain("Dropping ERROR record without usable error detail"));
    }
}
