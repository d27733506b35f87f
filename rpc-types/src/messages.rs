//! Typed result payloads for the operations the client understands.
//!
//! Everything else travels as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{SessionToken, TypesError, Watermark};

/// `result.type` marking a response that must be expanded into sub-calls.
pub const PROXY_ACTION_TYPE: &str = "ir.actions.act_proxy";

/// Session description returned by authenticate and get_session_info.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Authenticated user id; `null`/`false` when not logged in
    #[serde(default)]
    pub uid: Value,
    /// Session id to persist
    #[serde(default)]
    pub session_id: Option<SessionToken>,
    /// Database the session is bound to
    #[serde(default)]
    pub db: Option<String>,
    /// Request context to apply to later calls (lang, tz, ...)
    #[serde(default)]
    pub user_context: Map<String, Value>,
    /// Members this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of an authenticate call. Same shape as [`SessionInfo`].
pub type LoginResult = SessionInfo;

impl SessionInfo {
    /// Parse from a `result` payload.
    pub fn from_value(value: Value) -> Result<Self, TypesError> {
        serde_json::from_value(value).map_err(TypesError::Deserialization)
    }

    /// The user id, if the session is authenticated.
    ///
    /// Zero, `false`, `null` and non-numeric ids all mean "not logged in".
    pub fn user_id(&self) -> Option<i64> {
        self.uid.as_i64().filter(|&id| id != 0)
    }
}

/// Server version description from the version-info endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Release series, e.g. `"8.0"` or `"saas~11.1"`
    #[serde(default)]
    pub server_serie: Option<String>,
    /// Full version string
    #[serde(default)]
    pub server_version: Option<String>,
    /// Members this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VersionInfo {
    /// Parse from a `result` payload.
    pub fn from_value(value: Value) -> Result<Self, TypesError> {
        serde_json::from_value(value).map_err(TypesError::Deserialization)
    }
}

/// One follow-up request inside a proxied multi-action result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyAction {
    /// Target URL (absolute, or a path relative to the server)
    pub url: String,
    /// Body to POST as JSON
    #[serde(default)]
    pub params: Value,
}

/// A result asking the client to issue N independent follow-up calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResult {
    /// Sub-actions to fan out
    #[serde(default)]
    pub action_list: Vec<ProxyAction>,
}

impl ProxyResult {
    /// Recognise the proxied multi-action shape.
    ///
    /// Returns `None` for any result whose `type` is not the proxy marker.
    pub fn detect(result: &Value) -> Option<Result<Self, TypesError>> {
        if result.get("type").and_then(Value::as_str) != Some(PROXY_ACTION_TYPE) {
            return None;
        }
        Some(serde_json::from_value(result.clone()).map_err(TypesError::Deserialization))
    }
}

/// Parameters of one incremental pull.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPageRequest {
    /// Model to synchronize
    pub model: String,
    /// Server-side key selecting the export function
    pub function_key: String,
    /// Domain every record must match
    pub base_domain: Value,
    /// Additional domain narrowing the delta
    pub filter_domain: Value,
    /// Maximum number of records per page
    pub limit: u32,
    /// Resume point; `None` on the first pull
    pub watermark: Option<Watermark>,
}

impl SyncPageRequest {
    /// Positional arguments for the `get_sync_data` model method.
    pub fn to_call_args(&self) -> Value {
        json!([
            self.function_key,
            self.watermark.as_ref().map(Watermark::as_value).cloned().unwrap_or(Value::Null),
            self.base_domain,
            self.filter_domain,
            self.limit,
        ])
    }
}

/// One page of changes returned by an incremental pull.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncPage {
    /// New resume point
    #[serde(default, alias = "timekey")]
    pub watermark: Option<Watermark>,
    /// Ids of records to drop from the dataset
    #[serde(default, rename = "removeIds", alias = "remove_ids")]
    pub remove_ids: Vec<Value>,
    /// Changed records keyed by id
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl SyncPage {
    /// Parse from a `result` payload.
    pub fn from_value(value: Value) -> Result<Self, TypesError> {
        serde_json::from_value(value).map_err(TypesError::Deserialization)
    }

    /// Whether this page reports no changed records.
    pub fn is_settled(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_info_user_id() {
        let ok = SessionInfo::from_value(json!({"uid": 7, "session_id": "S1"})).unwrap();
        assert_eq!(ok.user_id(), Some(7));
        assert_eq!(ok.session_id, Some(SessionToken::new("S1")));

        for uid in [json!(null), json!(false), json!(0)] {
            let info = SessionInfo::from_value(json!({ "uid": uid })).unwrap();
            assert_eq!(info.user_id(), None);
        }
    }

    #[test]
    fn session_info_keeps_user_context() {
        let info = SessionInfo::from_value(json!({
            "uid": 7,
            "user_context": {"lang": "en_US", "tz": "UTC"},
            "username": "bob",
        }))
        .unwrap();
        assert_eq!(info.user_context.get("lang"), Some(&json!("en_US")));
        assert_eq!(info.extra.get("username"), Some(&json!("bob")));
    }

    #[test]
    fn proxy_result_detection() {
        let proxied = json!({
            "type": PROXY_ACTION_TYPE,
            "action_list": [
                {"url": "http://printer.local/print", "params": {"doc": 1}},
                {"url": "/web/report", "params": {"doc": 2}},
            ]
        });
        let result = ProxyResult::detect(&proxied).unwrap().unwrap();
        assert_eq!(result.action_list.len(), 2);
        assert_eq!(result.action_list[1].url, "/web/report");

        assert!(ProxyResult::detect(&json!({"type": "ir.actions.act_window"})).is_none());
        assert!(ProxyResult::detect(&json!([1, 2])).is_none());
    }

    #[test]
    fn sync_page_accepts_both_field_spellings() {
        let documented = SyncPage::from_value(json!({
            "watermark": "t2",
            "removeIds": [3],
            "data": {"5": {"name": "a"}},
        }))
        .unwrap();
        let native = SyncPage::from_value(json!({
            "timekey": "t2",
            "remove_ids": [3],
            "data": {"5": {"name": "a"}},
        }))
        .unwrap();
        assert_eq!(documented, native);
        assert_eq!(documented.watermark, Some(Watermark::from("t2")));
        assert!(!documented.is_settled());
    }

    #[test]
    fn empty_sync_page_is_settled() {
        let page = SyncPage::from_value(json!({"timekey": "t3"})).unwrap();
        assert!(page.is_settled());
        assert!(page.remove_ids.is_empty());
    }

    #[test]
    fn sync_request_args_are_positional() {
        let request = SyncPageRequest {
            model: "res.partner".into(),
            function_key: "partners".into(),
            base_domain: json!([["active", "=", true]]),
            filter_domain: json!([]),
            limit: 50,
            watermark: None,
        };
        assert_eq!(
            request.to_call_args(),
            json!(["partners", null, [["active", "=", true]], [], 50])
        );
    }
}
