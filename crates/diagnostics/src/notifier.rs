// diagnostics/src/notifier.rs

use crate::{annotation, Annotation, CheckResult, Diagnostic};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Visual variant of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Success,
    Error,
}

/// The notification currently on screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Display key, unique per promotion even when content repeats
    pub key: u64,
    pub result: CheckResult,
}

impl Notification {
    pub fn variant(&self) -> NotificationVariant {
        if self.result.is_success() {
            NotificationVariant::Success
        } else {
            NotificationVariant::Error
        }
    }

    pub fn message(&self) -> &'static str {
        match self.variant() {
            NotificationVariant::Success => "Type-checking succeeded.",
            NotificationVariant::Error => "Type-checking failed.",
        }
    }
}

/// Serializes check outcomes into a non-overlapping notification stream.
///
/// At most one notification is visible. Results queue in arrival order and
/// are only promoted when nothing is visible, either on arrival or through
/// [`DiagnosticNotifier::advance`].
#[derive(Debug, Default)]
pub struct DiagnosticNotifier {
    pending: VecDeque<CheckResult>,
    visible: Option<Notification>,
    last_key: u64,
    total_enqueued: u64,
    total_shown: u64,
}

impl DiagnosticNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a check result, showing it right away if nothing is visible.
    pub fn on_check_result(&mut self, result: CheckResult) -> Option<&Notification> {
        self.pending.push_back(result);
        self.total_enqueued += 1;

        if self.visible.is_none() {
            self.promote_next();
        } else {
            tracing::debug!(
                "Notification queued behind visible #{} ({} pending)",
                self.last_key,
                self.pending.len()
            );
        }

        self.visible.as_ref()
    }

    /// Hide the visible notification without promoting the next one.
    pub fn dismiss(&mut self) -> Option<Notification> {
        let dismissed = self.visible.take();
        if let Some(notification) = &dismissed {
            tracing::debug!("Notification #{} dismissed", notification.key);
        }
        dismissed
    }

    /// Called once the visible notification has finished displaying.
    pub fn advance(&mut self) -> Option<&Notification> {
        self.visible = None;
        self.promote_next();
        self.visible.as_ref()
    }

    pub fn visible(&self) -> Option<&Notification> {
        self.visible.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.visible.is_none() && self.pending.is_empty()
    }

    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    pub fn total_shown(&self) -> u64 {
        self.total_shown
    }

    /// Inline markers for a file's last check error
    pub fn annotations_for(error: Option<&[Diagnostic]>) -> Vec<Annotation> {
        annotation::annotations_for(error)
    }

    fn promote_next(&mut self) {
        if let Some(result) = self.pending.pop_front() {
            self.last_key += 1;
            self.total_shown += 1;
            tracing::debug!("Showing notification #{}", self.last_key);
            self.visible = Some(Notification {
                key: self.last_key,
                result,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn failure(msg: &str) -> CheckResult {
        CheckResult::fail(vec![Diagnostic::new(1, 1, msg)])
    }

    #[test]
    fn test_first_result_shows_immediately() {
        let mut notifier = DiagnosticNotifier::new();
        let shown = notifier.on_check_result(CheckResult::Success).cloned().unwrap();

        assert_eq!(shown.key, 1);
        assert_eq!(shown.variant(), NotificationVariant::Success);
        assert_eq!(shown.message(), "Type-checking succeeded.");
        assert_eq!(notifier.pending_len(), 0);
    }

    #[test]
    fn test_second_result_waits_for_advance() {
        let mut notifier = DiagnosticNotifier::new();
        notifier.on_check_result(failure("a"));
        let still = notifier.on_check_result(failure("b")).cloned().unwrap();

        assert_eq!(still.key, 1);
        assert_eq!(still.result, failure("a"));
        assert_eq!(notifier.pending_len(), 1);

        let next = notifier.advance().cloned().unwrap();
        assert_eq!(next.key, 2);
        assert_eq!(next.result, failure("b"));
        assert_eq!(next.message(), "Type-checking failed.");

        assert!(notifier.advance().is_none());
        assert!(notifier.is_idle());
    }

    #[test]
    fn test_dismiss_does_not_promote() {
        let mut notifier = DiagnosticNotifier::new();
        notifier.on_check_result(failure("a"));
        notifier.on_check_result(failure("b"));

        let dismissed = notifier.dismiss().unwrap();
        assert_eq!(dismissed.key, 1);
        assert!(notifier.visible().is_none());
        assert_eq!(notifier.pending_len(), 1);

        assert_eq!(notifier.advance().map(|n| n.key), Some(2));
    }

    #[test]
    fn test_repeated_content_gets_fresh_keys() {
        let mut notifier = DiagnosticNotifier::new();
        notifier.on_check_result(CheckResult::Success);
        notifier.on_check_result(CheckResult::Success);

        let first = notifier.visible().unwrap().key;
        let second = notifier.advance().unwrap().key;
        assert!(second > first);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Arrive(bool),
        Advance,
        Dismiss,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Arrive),
            Just(Op::Advance),
            Just(Op::Dismiss),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_result_shown_once_in_arrival_order(ops in proptest::collection::vec(op_strategy(), 0..60)) {
            let mut notifier = DiagnosticNotifier::new();
            let mut arrived = Vec::new();
            let mut shown: Vec<Notification> = Vec::new();

            fn observe(notifier: &DiagnosticNotifier, shown: &mut Vec<Notification>) {
                if let Some(visible) = notifier.visible() {
                    if shown.last().map(|n| n.key) != Some(visible.key) {
                        shown.push(visible.clone());
                    }
                }
            }

            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Arrive(ok) => {
                        let result = if ok { CheckResult::Success } else { failure(&i.to_string()) };
                        arrived.push(result.clone());
                        notifier.on_check_result(result);
                    }
                    Op::Advance => { notifier.advance(); }
                    Op::Dismiss => { notifier.dismiss(); }
                }
                observe(&notifier, &mut shown);
            }

            while !notifier.is_idle() {
                notifier.advance();
                observe(&notifier, &mut shown);
            }

            prop_assert_eq!(notifier.total_shown(), notifier.total_enqueued());
            prop_assert_eq!(shown.len(), arrived.len());
            for window in shown.windows(2) {
                prop_assert!(window[0].key < window[1].key);
            }
            let shown_results: Vec<CheckResult> = shown.into_iter().map(|n| n.result).collect();
            prop_assert_eq!(shown_results, arrived);
        }
    }
}
