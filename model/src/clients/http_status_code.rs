pub use http::StatusCode;
use kube::Error;

/// Reason strings the API server puts in a `Status` response.
const REASON_ALREADY_EXISTS: &str = "AlreadyExists";
const REASON_CONFLICT: &str = "Conflict";

pub trait HttpStatusCode {
    fn status_code(&self) -> Option<StatusCode>;

    /// The machine readable reason of an API server `Status`, if there is one.
    fn status_reason(&self) -> Option<&str>;

    fn is_status_code(&self, status_code: StatusCode) -> bool {
        self.status_code()
            .map(|some| some == status_code)
            .unwrap_or_default()
    }

    fn is_not_found(&self) -> bool {
        self.is_status_code(StatusCode::NOT_FOUND)
    }

    /// A create was rejected because an object with the same name exists.
    fn is_already_exists(&self) -> bool {
        self.is_status_code(StatusCode::CONFLICT)
            && self.status_reason() == Some(REASON_ALREADY_EXISTS)
    }

    /// A write was rejected because the object changed since it was read.
    fn is_conflict(&self) -> bool {
        self.is_status_code(StatusCode::CONFLICT) && self.status_reason() == Some(REASON_CONFLICT)
    }
}

impl HttpStatusCode for kube::Error {
    fn status_code(&self) -> Option<StatusCode> {
        if let Error::Api(error_response) = self {
            StatusCode::from_u16(error_response.code).ok()
        } else {
            None
        }
    }

    fn status_reason(&self) -> Option<&str> {
        if let Error::Api(error_response) = self {
            Some(error_response.reason.as_str())
        } else {
            None
        }
    }
}

impl<T, E> HttpStatusCode for std::result::Result<T, E>
where
    E: HttpStatusCode,
{
    fn status_code(&self) -> Option<StatusCode> {
        self.as_ref().err().and_then(|e| e.status_code())
    }

    fn status_reason(&self) -> Option<&str> {
        self.as_ref().err().and_then(|e| e.status_reason())
    }
}

/// Builds the error the API server would return, for fakes that stand in for it.
pub fn api_error(code: StatusCode, reason: &str, message: impl Into<String>) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code: code.as_u16(),
    })
}
