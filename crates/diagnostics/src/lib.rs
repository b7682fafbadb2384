// diagnostics/src/lib.rs

//! Checker diagnostics and their presentation
//!
//! This crate provides:
//! - Diagnostic and check result types, decoded leniently from checker output
//! - Annotation mapping for inline editor markers
//! - A one-at-a-time notification queue for check outcomes

pub mod annotation;
pub mod diagnostic;
pub mod notifier;

pub use annotation::{annotations_for, Annotation, AnnotationKind};
pub use diagnostic::{parse_check_result, CheckResult, Diagnostic};
pub use notifier::{DiagnosticNotifier, Notification, NotificationVariant};
