use serde::Serialize;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reply::Response;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HtmlError {
    /// The request violates a business rule.
    InvalidRequest,
    Unauthorized,
    InvalidSession,
    Forbidden,
    NotFound,
    /// A uniqueness constraint rejected the write.
    Conflict,
    InternalServerError,
}

impl HtmlError {
    pub fn code(&self) -> u16 {
        match self {
            HtmlError::InvalidRequest => 400,
            HtmlError::Unauthorized => 401,
            HtmlError::InvalidSession => 401,
            HtmlError::Forbidden => 403,
            HtmlError::NotFound => 404,
            HtmlError::Conflict => 409,
            HtmlError::InternalServerError => 500,
        }
    }

    pub fn new(self, info: &str) -> Error {
        Error {
            code: self.code(),
            kind: self,
            info: info.to_string(),
        }
    }

    pub fn default(self) -> Error {
        let info = match self {
            HtmlError::InvalidRequest => "Invalid request",
            HtmlError::Unauthorized => "Authentication credentials were not provided",
            HtmlError::InvalidSession => "Invalid session",
            HtmlError::Forbidden => "You don't have permission to perform this action",
            HtmlError::NotFound => "Not found",
            HtmlError::Conflict => "already exists",
            HtmlError::InternalServerError => "Internal server error",
        };
        self.new(info)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{code} {info}")]
pub struct Error {
    pub code: u16,
    pub kind: HtmlError,
    pub info: String,
}

impl Error {
    pub fn is(&self, kind: HtmlError) -> bool {
        self.kind == kind
    }
}

impl warp::reject::Reject for Error {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl warp::Reply for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = warp::reply::json(&ErrorBody { detail: &self.info });

        warp::reply::with_status(body, status).into_response()
    }
}
