//! Instruction records sent by backends.
//!
//! Each line of an instruction stream is one JSON object shaped
//! `{"command": "<name>", "data": {...}}`. The command selects the variant and
//! `data` is decoded into that variant's fields.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::protocol::ProtocolError;

/// One decoded backend instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamInstruction {
    /// Append to the body. A JSON `null` writes the literal text `null`.
    Write { content: Value, flush: bool },
    /// Replace the content type with JSON, write the serialized value, flush.
    WriteJson { content: Value },
    SetStatus { code: u16 },
    SetHeader { key: String, value: String },
    SetCookie(CookieSpec),
    ClearCookie {
        name: String,
        domain: Option<String>,
        path: Option<String>,
    },
    ClearAllCookies {
        domain: Option<String>,
        path: Option<String>,
    },
    Flush,
    Redirect {
        url: String,
        query: Option<Map<String, Value>>,
        permanent: bool,
    },
    Finish,
}

/// Fields of a `set_cookie` instruction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expires_days: Option<f64>,
    #[serde(default)]
    pub max_age: Option<i64>,
    #[serde(default, alias = "httponly")]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: Option<String>,
    /// Signed cookie semantics when true.
    #[serde(default)]
    pub secure: bool,
}

#[derive(Deserialize)]
struct RawInstruction {
    command: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct WriteData {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    flush: bool,
}

#[derive(Deserialize)]
struct WriteJsonData {
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct StatusData {
    code: u16,
}

#[derive(Deserialize)]
struct HeaderData {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct ClearCookieData {
    name: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct ClearAllData {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct RedirectData {
    url: String,
    #[serde(default)]
    query: Value,
    #[serde(default)]
    permanent: bool,
}

impl StreamInstruction {
    /// Decode one instruction line (without its trailing newline).
    pub fn from_line(line: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(line)?;
        let raw: RawInstruction =
            serde_json::from_str(text).map_err(ProtocolError::MalformedInstruction)?;

        let instruction = match raw.command.as_str() {
            "write" => {
                let d: WriteData = data(raw.data)?;
                Self::Write {
                    content: d.content,
                    flush: d.flush,
                }
            }
            "writeJSON" => {
                let d: WriteJsonData = data(raw.data)?;
                Self::WriteJson { content: d.content }
            }
            "set_status" => {
                let d: StatusData = data(raw.data)?;
                Self::SetStatus { code: d.code }
            }
            "set_header" => {
                let d: HeaderData = data(raw.data)?;
                Self::SetHeader {
                    key: d.key,
                    value: d.value,
                }
            }
            "set_cookie" => Self::SetCookie(data(raw.data)?),
            "clear_cookie" => {
                let d: ClearCookieData = data(raw.data)?;
                Self::ClearCookie {
                    name: d.name,
                    domain: d.domain,
                    path: d.path,
                }
            }
            "clear_all_cookie" => {
                let d: ClearAllData = data(raw.data)?;
                Self::ClearAllCookies {
                    domain: d.domain,
                    path: d.path,
                }
            }
            "flush" => Self::Flush,
            "redirect" => {
                let d: RedirectData = data(raw.data)?;
                Self::Redirect {
                    url: d.url,
                    query: match d.query {
                        Value::Object(map) => Some(map),
                        _ => None,
                    },
                    permanent: d.permanent,
                }
            }
            "finish" => Self::Finish,
            _ => return Err(ProtocolError::UnsupportedInstruction(raw.command)),
        };

        Ok(instruction)
    }

    /// Wire name of the command, used for logs and metrics.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::WriteJson { .. } => "writeJSON",
            Self::SetStatus { .. } => "set_status",
            Self::SetHeader { .. } => "set_header",
            Self::SetCookie(_) => "set_cookie",
            Self::ClearCookie { .. } => "clear_cookie",
            Self::ClearAllCookies { .. } => "clear_all_cookie",
            Self::Flush => "flush",
            Self::Redirect { .. } => "redirect",
            Self::Finish => "finish",
        }
    }
}

/// Decode the `data` member; a missing member is treated as `{}`.
fn data<T: DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
    let value = match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(value).map_err(ProtocolError::MalformedInstruction)
}

/// Render the body text for a `write` instruction.
pub fn write_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the redirect target, appending `query` as a query string.
///
/// Booleans render as `true`/`false`, strings verbatim, null as empty and any
/// other value as its JSON text. An existing `?` in the URL is preserved by
/// joining with `&`.
pub fn redirect_target(url: &str, query: Option<&Map<String, Value>>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return url.to_string();
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in query {
        let rendered = match value {
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        serializer.append_pair(key, &rendered);
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, serializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_each_command() {
        let cases: Vec<(&str, StreamInstruction)> = vec![
            (
                r#"{"command":"write","data":{"content":"hi","flush":true}}"#,
                StreamInstruction::Write { content: json!("hi"), flush: true },
            ),
            (
                r#"{"command":"writeJSON","data":{"content":{"a":1}}}"#,
                StreamInstruction::WriteJson { content: json!({"a": 1}) },
            ),
            (
                r#"{"command":"set_status","data":{"code":201}}"#,
                StreamInstruction::SetStatus { code: 201 },
            ),
            (
                r#"{"command":"set_header","data":{"key":"X-Data","value":"v"}}"#,
                StreamInstruction::SetHeader { key: "X-Data".into(), value: "v".into() },
            ),
            (
                r#"{"command":"clear_cookie","data":{"name":"sid"}}"#,
                StreamInstruction::ClearCookie { name: "sid".into(), domain: None, path: None },
            ),
            (
                r#"{"command":"clear_all_cookie","data":{"path":"/app"}}"#,
                StreamInstruction::ClearAllCookies { domain: None, path: Some("/app".into()) },
            ),
            (r#"{"command":"flush"}"#, StreamInstruction::Flush),
            (r#"{"command":"finish","data":{}}"#, StreamInstruction::Finish),
        ];

        for (line, expected) in cases {
            assert_eq!(StreamInstruction::from_line(line.as_bytes()).unwrap(), expected, "{}", line);
        }
    }

    #[test]
    fn test_set_cookie_defaults() {
        let ins = StreamInstruction::from_line(
            br#"{"command":"set_cookie","data":{"name":"sid","value":"abc"}}"#,
        )
        .unwrap();
        match ins {
            StreamInstruction::SetCookie(spec) => {
                assert_eq!(spec.name, "sid");
                assert!(!spec.secure);
                assert!(spec.path.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_write_without_content_is_null() {
        let ins = StreamInstruction::from_line(br#"{"command":"write","data":{}}"#).unwrap();
        match ins {
            StreamInstruction::Write { content, flush } => {
                assert_eq!(write_text(&content), "null");
                assert!(!flush);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let err = StreamInstruction::from_line(br#"{"command":"teleport","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedInstruction(ref c) if c == "teleport"));
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            StreamInstruction::from_line(b"not json"),
            Err(ProtocolError::MalformedInstruction(_))
        ));
        assert!(matches!(
            StreamInstruction::from_line(br#"{"command":"set_status","data":{"code":"x"}}"#),
            Err(ProtocolError::MalformedInstruction(_))
        ));
        assert!(matches!(
            StreamInstruction::from_line(b"{\"command\":\"write\",\"data\":{\"content\":\"\xff\"}}"),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_write_text() {
        assert_eq!(write_text(&json!("plain")), "plain");
        assert_eq!(write_text(&Value::Null), "null");
        assert_eq!(write_text(&json!(12)), "12");
        assert_eq!(write_text(&json!({"k": [1, 2]})), r#"{"k":[1,2]}"#);
    }

    #[test]
    fn test_redirect_target() {
        let query = json!({"a": true, "b": "x"});
        assert_eq!(redirect_target("/go", query.as_object()), "/go?a=true&b=x");

        let query = json!({"flag": false});
        assert_eq!(redirect_target("/go?x=1", query.as_object()), "/go?x=1&flag=false");

        let query = json!({"n": 3, "q": "a b&c"});
        assert_eq!(redirect_target("https://h/p", query.as_object()), "https://h/p?n=3&q=a+b%26c");

        assert_eq!(redirect_target("/plain", None), "/plain");
    }

    #[test]
    fn test_redirect_query_keeps_backend_order() {
        let line = br#"{"command":"redirect","data":{"url":"/go","query":{"z":"1","m":"2","a":"3"}}}"#;
        let StreamInstruction::Redirect { url, query, .. } = StreamInstruction::from_line(line).unwrap() else {
            panic!("expected a redirect");
        };
        assert_eq!(redirect_target(&url, query.as_ref()), "/go?z=1&m=2&a=3");
    }

    #[test]
    fn test_redirect_query_must_be_mapping() {
        let ins = StreamInstruction::from_line(
            br#"{"command":"redirect","data":{"url":"/go","query":["a"]}}"#,
        )
        .unwrap();
        assert_eq!(
            ins,
            StreamInstruction::Redirect { url: "/go".into(), query: None, permanent: false }
        );
    }
}
