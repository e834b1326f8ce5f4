//! Sub-path differ: decides whether the value at a path inside a JSON
//! document actually changed between two versions.

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;
use tracing::error;

/// A dotted path selecting a scalar or substructure inside a document.
///
/// Segments are object keys; a segment that parses as an integer indexes into
/// an array. The empty expression selects the whole document.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PathExpr(Cow<'static, str>);

impl PathExpr {
    /// The whole document.
    pub const WHOLE: PathExpr = PathExpr(Cow::Borrowed(""));

    /// Service observability settings.
    pub const OBSERVABILITY: PathExpr = PathExpr(Cow::Borrowed("observability"));

    /// Service resilience settings.
    pub const RESILIENCE: PathExpr = PathExpr(Cow::Borrowed("resilience"));

    /// Service canary settings.
    pub const CANARY: PathExpr = PathExpr(Cow::Borrowed("canary"));

    /// Service load-balance policy.
    pub const LOAD_BALANCE: PathExpr = PathExpr(Cow::Borrowed("loadBalance"));

    /// Circuit-breaker part of the resilience settings.
    pub const CIRCUIT_BREAKER: PathExpr = PathExpr(Cow::Borrowed("resilience.circuitBreaker"));

    pub fn new(path: impl Into<String>) -> Self {
        PathExpr(Cow::Owned(path.into()))
    }

    /// Whether this expression selects the whole document.
    pub fn is_whole(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathExpr({:?})", self.0)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PathExpr {
    fn from(s: &str) -> Self {
        PathExpr::new(s)
    }
}

impl From<String> for PathExpr {
    fn from(s: String) -> Self {
        PathExpr(Cow::Owned(s))
    }
}

/// Returns whether `old` and `new` agree at `path`.
///
/// The empty path compares the raw documents byte for byte. Any other path
/// parses both documents and compares the extracted values; a missing path
/// extracts to "absent" on that side.
///
/// A document that fails to parse is an invariant violation elsewhere in the
/// system. It is logged and treated as "equal", suppressing the notification
/// rather than killing the watch worker or delivering a garbage value.
pub fn part_equal(path: &PathExpr, old: &str, new: &str) -> bool {
    if path.is_whole() {
        return old == new;
    }

    let old_doc: Value = match serde_json::from_str(old) {
        Ok(doc) => doc,
        Err(e) => {
            error!("BUG: parse document {:?} failed: {}", old, e);
            return true;
        }
    };

    let new_doc: Value = match serde_json::from_str(new) {
        Ok(doc) => doc,
        Err(e) => {
            error!("BUG: parse document {:?} failed: {}", new, e);
            return true;
        }
    };

    extract(&old_doc, path.as_str()) == extract(&new_doc, path.as_str())
}

/// Resolve a dotted path against a document. `None` means the path does not
/// exist in this document.
fn extract<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
