use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Error payload attached to every non-2xx JSON response from the
/// archive server. `errorCode` is a token of at most 8 characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerErrorBody {
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(rename = "errorMessage", default)]
    pub error_message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not reach the server at all. Raised at client
    /// construction, never retried.
    #[error("could not connect to {url}: {source}")]
    Connection {
        url: String,
        source: reqwest::Error,
    },

    /// The server speaks a newer API major version than this client
    /// was built against.
    #[error(
        "the archive server at {url} reports API version {server} but this \
         client expects {expected}; upgrade astrogetr"
    )]
    IncompatibleVersion {
        url: String,
        server: f64,
        expected: f64,
    },

    /// The requested asynchronous job has not finished. The caller may
    /// poll again later.
    #[error("{message}")]
    JobActive {
        message: String,
        traceback: Option<String>,
    },

    /// The server lacks sufficient data to answer.
    #[error("{message}")]
    CannotPredict {
        message: String,
        traceback: Option<String>,
    },

    /// A server error with a code this client does not recognize. The
    /// original code and message are preserved verbatim.
    #[error("{message} [{code}]")]
    UnknownServer {
        code: String,
        message: String,
        traceback: Option<String>,
    },

    /// A caller-supplied field name the server does not recognize.
    /// Declared for the closed taxonomy; validation against the server
    /// schema is not implemented yet, so nothing raises this.
    #[error("unknown field: {0}")]
    FieldValidation(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed server response: {0}")]
    BadResponse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Dispatch a decoded error payload to its typed kind. Codes are
    /// matched exactly; anything unrecognized (or missing) falls
    /// through to [`Error::UnknownServer`] with the original text.
    pub fn from_server(body: ServerErrorBody) -> Error {
        match body.error_code.as_deref() {
            Some("JOBACTIV") => Error::JobActive {
                message: body.error_message,
                traceback: body.traceback,
            },
            Some("NOPRED") => Error::CannotPredict {
                message: body.error_message,
                traceback: body.traceback,
            },
            other => Error::UnknownServer {
                code: other.unwrap_or("UNKNOWN").to_string(),
                message: body.error_message,
                traceback: body.traceback,
            },
        }
    }

    /// Decode a non-2xx archive response into a typed error.
    pub fn from_response(res: reqwest::blocking::Response) -> Error {
        let status = res.status();
        match res.json::<ServerErrorBody>() {
            Ok(body) => Error::from_server(body),
            Err(_) => Error::BadResponse(format!("HTTP {status} with undecodable error body")),
        }
    }

    /// Machine-readable error token, at most 8 characters.
    pub fn error_code(&self) -> &str {
        match self {
            Error::Connection { .. } => "CONNERR",
            Error::IncompatibleVersion { .. } => "BADVER",
            Error::JobActive { .. } => "JOBACTIV",
            Error::CannotPredict { .. } => "NOPRED",
            Error::UnknownServer { code, .. } => code,
            Error::FieldValidation(_) => "BADFLD",
            Error::Transport(_) | Error::Url(_) | Error::BadResponse(_) | Error::Io(_) => {
                "UNKNOWN"
            }
        }
    }

    /// Diagnostic trace carried over the wire, if the server sent one.
    pub fn traceback(&self) -> Option<&str> {
        match self {
            Error::JobActive { traceback, .. }
            | Error::CannotPredict { traceback, .. }
            | Error::UnknownServer { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }

    /// Round-trip back into the wire payload shape.
    pub fn to_body(&self) -> ServerErrorBody {
        let (message, traceback) = match self {
            Error::JobActive { message, traceback }
            | Error::CannotPredict { message, traceback }
            | Error::UnknownServer {
                message, traceback, ..
            } => (message.clone(), traceback.clone()),
            other => (other.to_string(), None),
        };
        ServerErrorBody {
            error_code: Some(self.error_code().to_string()),
            error_message: message,
            traceback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: Option<&str>, message: &str) -> ServerErrorBody {
        ServerErrorBody {
            error_code: code.map(str::to_string),
            error_message: message.to_string(),
            traceback: None,
        }
    }

    #[test]
    fn test_dispatch_job_active() {
        let err = Error::from_server(body(Some("JOBACTIV"), "still running"));
        match err {
            Error::JobActive { ref message, .. } => assert_eq!(message, "still running"),
            other => panic!("expected JobActive, got {other:?}"),
        }
        assert_eq!(err.to_string(), "still running");
    }

    #[test]
    fn test_dispatch_cannot_predict() {
        let err = Error::from_server(body(Some("NOPRED"), "not enough data"));
        assert!(matches!(err, Error::CannotPredict { .. }));
        assert_eq!(err.error_code(), "NOPRED");
    }

    #[test]
    fn test_dispatch_unknown_code_keeps_text() {
        let err = Error::from_server(body(Some("XYZZY"), "m"));
        assert!(matches!(err, Error::UnknownServer { .. }));
        let shown = err.to_string();
        assert!(shown.contains("m"));
        assert!(shown.contains("XYZZY"));
    }

    #[test]
    fn test_dispatch_missing_code() {
        let err = Error::from_server(body(None, "mystery"));
        assert_eq!(err.error_code(), "UNKNOWN");
        assert_eq!(err.to_string(), "mystery [UNKNOWN]");
    }

    #[test]
    fn test_round_trip_preserves_wire_shape() {
        let original = ServerErrorBody {
            error_code: Some("JOBACTIV".to_string()),
            error_message: "still running".to_string(),
            traceback: Some("File \"jobs.py\", line 12".to_string()),
        };
        let err = Error::from_server(original.clone());
        assert_eq!(err.to_body(), original);
        assert_eq!(err.traceback(), Some("File \"jobs.py\", line 12"));
    }

    #[test]
    fn test_wire_body_serde_field_names() {
        let json = r#"{"errorCode":"NOPRED","errorMessage":"m","traceback":"t"}"#;
        let parsed: ServerErrorBody = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error_code.as_deref(), Some("NOPRED"));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn test_error_codes_fit_in_8_chars() {
        let errors = [
            Error::FieldValidation("x".to_string()),
            Error::BadResponse("x".to_string()),
            Error::IncompatibleVersion {
                url: String::new(),
                server: 9.0,
                expected: 8.0,
            },
        ];
        for err in &errors {
            assert!(err.error_code().len() <= 8, "{}", err.error_code());
        }
    }
}
