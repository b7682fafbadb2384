// session/src/editor.rs

//! Editor buffer kept in sync with the session's view of a source file.

use crate::SourceFile;
use diagnostics::{annotations_for, Annotation, Diagnostic};

/// What the editor currently displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorBuffer {
    pub name: String,
    pub code: String,
    pub error: Option<Vec<Diagnostic>>,
}

impl EditorBuffer {
    pub fn open(file: &SourceFile) -> Self {
        Self {
            name: file.name.clone(),
            code: file.code.clone(),
            error: file.error.clone(),
        }
    }

    /// Fold the session's current file into the buffer.
    ///
    /// Rules apply in order: a removed file clears the buffer, a different
    /// file replaces it, new diagnostics are merged while keeping the edited
    /// code. Anything else leaves the buffer as it is.
    pub fn reconcile(self, incoming: Option<&SourceFile>) -> Self {
        let Some(file) = incoming else {
            return Self::default();
        };

        if self.name != file.name {
            return Self::open(file);
        }

        if self.error != file.error {
            return Self {
                error: file.error.clone(),
                ..self
            };
        }

        self
    }

    /// Typing into the buffer
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    /// No file open
    pub fn read_only(&self) -> bool {
        self.name.is_empty()
    }

    /// The buffer holds changes not yet written to the store
    pub fn can_save(&self, file: Option<&SourceFile>) -> bool {
        file.map(|f| f.persisted.as_deref() != Some(self.code.as_str()))
            .unwrap_or(false)
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        annotations_for(self.error.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_error(name: &str, code: &str, error: Option<Vec<Diagnostic>>) -> SourceFile {
        SourceFile {
            error,
            ..SourceFile::persisted(name, code)
        }
    }

    #[test]
    fn test_removed_file_clears_buffer() {
        let buffer = EditorBuffer::open(&SourceFile::persisted("Foo", "code"));
        let next = buffer.reconcile(None);

        assert_eq!(next, EditorBuffer::default());
        assert!(next.read_only());
    }

    #[test]
    fn test_new_file_replaces_buffer() {
        let mut buffer = EditorBuffer::open(&SourceFile::persisted("Foo", "foo code"));
        buffer.set_code("edited");

        let bar = file_with_error("Bar", "bar code", Some(vec![Diagnostic::new(1, 1, "x")]));
        let next = buffer.reconcile(Some(&bar));

        assert_eq!(next.name, "Bar");
        assert_eq!(next.code, "bar code");
        assert_eq!(next.error, bar.error);
    }

    #[test]
    fn test_changed_diagnostics_merge_keeping_edits() {
        let mut buffer = EditorBuffer::open(&SourceFile::persisted("Foo", "original"));
        buffer.set_code("edited");

        let checked = file_with_error("Foo", "original", Some(vec![Diagnostic::new(0, 3, "x")]));
        let next = buffer.reconcile(Some(&checked));

        assert_eq!(next.code, "edited");
        assert_eq!(next.error, checked.error);
        assert_eq!(next.annotations()[0].row, 0);
        assert_eq!(next.annotations()[0].col, 3);
    }

    #[test]
    fn test_unchanged_file_keeps_buffer() {
        let mut buffer = EditorBuffer::open(&SourceFile::persisted("Foo", "original"));
        buffer.set_code("edited");
        let expected = buffer.clone();

        let next = buffer.reconcile(Some(&SourceFile::persisted("Foo", "something else")));
        assert_eq!(next, expected);
    }

    #[test]
    fn test_removal_takes_priority_over_everything() {
        let buffer = EditorBuffer {
            name: String::new(),
            code: String::new(),
            error: Some(vec![Diagnostic::new(1, 1, "stale")]),
        };
        assert_eq!(buffer.reconcile(None), EditorBuffer::default());
    }

    #[test]
    fn test_can_save_compares_with_persisted_code() {
        let file = SourceFile::persisted("Foo", "original");
        let mut buffer = EditorBuffer::open(&file);
        assert!(!buffer.can_save(Some(&file)));

        buffer.set_code("edited");
        assert!(buffer.can_save(Some(&file)));
        assert!(!buffer.can_save(None));
    }
}
