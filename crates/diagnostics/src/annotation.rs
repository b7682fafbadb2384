// diagnostics/src/annotation.rs

use crate::Diagnostic;
use serde::{Deserialize, Serialize};

/// Marker kind shown in the editor gutter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Error,
}

/// Display-ready, 0-indexed marker derived from a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub row: u32,
    pub col: u32,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub text: String,
}

impl From<&Diagnostic> for Annotation {
    fn from(diagnostic: &Diagnostic) -> Self {
        Self {
            // Line 0 stays on row 0 rather than wrapping
            row: diagnostic.line.saturating_sub(1),
            col: diagnostic.column,
            kind: AnnotationKind::Error,
            text: diagnostic.message.clone(),
        }
    }
}

/// Editor markers for a source file's last check error, in checker order
pub fn annotations_for(error: Option<&[Diagnostic]>) -> Vec<Annotation> {
    error
        .map(|diagnostics| diagnostics.iter().map(Annotation::from).collect())
        .unwrap_or_default()
}
