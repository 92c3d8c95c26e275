//! Call-site metadata attached to every tracked entry.

use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// Where a tracking call originated.
///
/// Purely descriptive: issues raised during verification point here instead of at the
/// teardown code that discovered them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    file_id: String,
    file_path: String,
    line: u32,
    column: u32,
}

impl SourceLocation {
    /// Build a location from explicit parts. `line` and `column` are clamped to be 1-based.
    #[must_use]
    pub fn new(
        file_id: impl Into<String>,
        file_path: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            file_path: file_path.into(),
            line: line.max(1),
            column: column.max(1),
        }
    }

    /// Location of the caller of the enclosing `#[track_caller]` function.
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_panic_location(Location::caller())
    }

    /// Convert a [`std::panic::Location`].
    #[must_use]
    pub fn from_panic_location(location: &Location<'_>) -> Self {
        let file_path = location.file();
        Self::new(
            file_name(file_path),
            file_path,
            location.line(),
            location.column(),
        )
    }

    /// Short file identifier, `<crate>/<file>` or `<file>`.
    #[must_use]
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Source path as reported by the compiler.
    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
    }
}

/// Final path component, accepting both separators.
#[doc(hidden)]
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Capture a [`SourceLocation`] for the current line, with a `<crate>/<file>` identifier.
#[macro_export]
macro_rules! source_location {
    () => {{
        let module = module_path!();
        let krate = module.split("::").next().unwrap_or(module);
        $crate::location::SourceLocation::new(
            format!("{}/{}", krate, $crate::location::file_name(file!())),
            file!(),
            line!(),
            column!(),
        )
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn captured() -> SourceLocation {
        SourceLocation::caller()
    }

    #[test]
    fn caller_points_at_call_site() {
        let expected_line = line!() + 1;
        let location = captured();
        assert_eq!(location.line(), expected_line);
        assert!(location.file_path().ends_with("location.rs"));
        assert_eq!(location.file_id(), "location.rs");
        assert!(location.column() >= 1);
    }

    #[test]
    fn macro_prefixes_crate_name() {
        let location = crate::source_location!();
        assert_eq!(location.file_id(), "leakcheck/location.rs");
        assert_eq!(location.line(), line!() - 1);
    }

    #[test]
    fn new_clamps_to_one_based() {
        let location = SourceLocation::new("a.rs", "src/a.rs", 0, 0);
        assert_eq!(location.line(), 1);
        assert_eq!(location.column(), 1);
        assert_eq!(location.to_string(), "src/a.rs:1:1");
    }

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(file_name("crates/x/src/lib.rs"), "lib.rs");
        assert_eq!(file_name(r"crates\x\src\lib.rs"), "lib.rs");
        assert_eq!(file_name("lib.rs"), "lib.rs");
    }
}
