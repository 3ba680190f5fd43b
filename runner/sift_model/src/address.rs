//! The user-facing test specifier grammar: `file_or_module[:callable]`.
//!
//! The head names a file (path separators, `.py` suffix, or a Windows
//! drive letter) or a dotted module. The optional callable part names a
//! function, `Class`, or `Class.method` inside it. A specifier that is
//! only `:callable` refers to whichever module the surrounding context
//! already identified.

use std::fmt;
use std::path::PathBuf;

use crate::error::AddressError;

/// A parsed test specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestAddress {
    pub filename: Option<PathBuf>,
    pub module: Option<String>,
    pub call: Option<String>,
}

impl TestAddress {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        let mut split_at = None;
        for (i, c) in input.char_indices() {
            if c != ':' {
                continue;
            }
            // `c:\tests\mod.py` — a colon at index 1 followed by a path
            // separator is a drive prefix, not the callable separator.
            if i == 1 && is_drive_prefix(input) {
                continue;
            }
            if split_at.is_some() {
                return Err(AddressError::TooManyColons(input.to_string()));
            }
            split_at = Some(i);
        }

        let (head, call) = match split_at {
            Some(i) => {
                let callable = &input[i + 1..];
                (&input[..i], (!callable.is_empty()).then(|| callable.to_string()))
            }
            None => (input, None),
        };

        if head.is_empty() {
            if call.is_none() {
                return Err(AddressError::Empty);
            }
            return Ok(TestAddress {
                filename: None,
                module: None,
                call,
            });
        }

        if head_is_path(head) {
            Ok(TestAddress {
                filename: Some(PathBuf::from(head)),
                module: None,
                call,
            })
        } else {
            Ok(TestAddress {
                filename: None,
                module: Some(head.to_string()),
                call,
            })
        }
    }

    /// Whether this address can restrict anything at all.
    pub fn is_callable_only(&self) -> bool {
        self.filename.is_none() && self.module.is_none()
    }
}

impl fmt::Display for TestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.filename {
            write!(f, "{}", file.display())?;
        } else if let Some(module) = &self.module {
            f.write_str(module)?;
        }
        if let Some(call) = &self.call {
            write!(f, ":{call}")?;
        }
        Ok(())
    }
}

fn is_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// A head is a filesystem path when it carries path separators, a source
/// suffix, a drive prefix, or is not a legal dotted identifier chain.
fn head_is_path(head: &str) -> bool {
    if head.contains('/') || head.contains('\\') || head.ends_with(".py") {
        return true;
    }
    if is_drive_prefix(head) {
        return true;
    }
    !head.split('.').all(is_identifier)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn addr(input: &str) -> TestAddress {
        TestAddress::parse(input).unwrap()
    }

    #[test]
    fn bare_module() {
        let a = addr("pack.mod");
        assert_eq!(a.module.as_deref(), Some("pack.mod"));
        assert_eq!(a.filename, None);
        assert_eq!(a.call, None);
    }

    #[test]
    fn module_with_callable() {
        let a = addr("pack.mod:TestCase.test_method");
        assert_eq!(a.module.as_deref(), Some("pack.mod"));
        assert_eq!(a.call.as_deref(), Some("TestCase.test_method"));
    }

    #[test]
    fn path_heads() {
        assert_eq!(
            addr("tests/test_mod.py").filename,
            Some(PathBuf::from("tests/test_mod.py"))
        );
        assert_eq!(addr("test_mod.py").filename, Some(PathBuf::from("test_mod.py")));
        // Not a legal identifier chain, so it must be a path
        assert_eq!(addr("some-dir").filename, Some(PathBuf::from("some-dir")));
    }

    #[test]
    fn path_with_callable() {
        let a = addr("tests/test_mod.py:test_func");
        assert_eq!(a.filename, Some(PathBuf::from("tests/test_mod.py")));
        assert_eq!(a.call.as_deref(), Some("test_func"));
    }

    #[test]
    fn windows_drive_is_not_a_separator() {
        let a = addr(r"c:\tests\test_mod.py");
        assert_eq!(a.filename, Some(PathBuf::from(r"c:\tests\test_mod.py")));
        assert_eq!(a.call, None);

        let b = addr(r"c:\tests\test_mod.py:TestCase");
        assert_eq!(b.filename, Some(PathBuf::from(r"c:\tests\test_mod.py")));
        assert_eq!(b.call.as_deref(), Some("TestCase"));
    }

    #[test]
    fn callable_only_form() {
        let a = addr(":test_func");
        assert!(a.is_callable_only());
        assert_eq!(a.call.as_deref(), Some("test_func"));
    }

    #[test]
    fn rejects_empty_and_extra_colons() {
        assert_eq!(TestAddress::parse(""), Err(AddressError::Empty));
        assert_eq!(TestAddress::parse(":"), Err(AddressError::Empty));
        assert!(matches!(
            TestAddress::parse("mod:Class:method"),
            Err(AddressError::TooManyColons(_))
        ));
    }

    #[test]
    fn display_round_trips() {
        for s in ["pack.mod", "pack.mod:TestCase.test", "tests/a.py:f", ":f"] {
            assert_eq!(addr(s).to_string(), s);
        }
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".*") {
            let _ = TestAddress::parse(&input);
        }

        #[test]
        fn module_heads_round_trip(
            head in "[a-z][a-z0-9_]{0,8}(\\.[a-z][a-z0-9_]{0,8}){0,3}",
            call in proptest::option::of("[A-Za-z_][A-Za-z0-9_]{0,8}"),
        ) {
            let input = match &call {
                Some(c) => format!("{head}:{c}"),
                None => head.clone(),
            };
            let a = TestAddress::parse(&input).unwrap();
            prop_assert_eq!(a.module.as_deref(), Some(head.as_str()));
            prop_assert_eq!(a.call.as_deref(), call.as_deref());
            prop_assert_eq!(a.to_string(), input);
        }
    }
}
