//! Request context merging.
//!
//! After login the server hands back a user context (language, timezone,
//! company ...). It becomes the default context of every model call; values
//! the caller passes explicitly take precedence key by key.

use serde_json::{Map, Value};

/// Merge the session's default context with a caller-supplied one.
///
/// Caller keys win on conflict. A caller context that is not a JSON object
/// is ignored.
pub fn merge_context(session: &Map<String, Value>, caller: Option<&Value>) -> Map<String, Value> {
    let mut merged = session.clone();
    if let Some(Value::Object(overrides)) = caller {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
