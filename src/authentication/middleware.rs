use std::{convert::Infallible, sync::Arc};

use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    Filter, Reply,
};

use crate::error::{Error, HtmlError};

use super::jwt::{verify_jwt_session, SessionData};

/// Picks the token out of an `Authorization: Token <jwt>` / `Bearer <jwt>`
/// header, falling back to the `session` cookie.
fn extract_token(header: Option<String>, cookie: Option<String>) -> Option<String> {
    header
        .and_then(|value| {
            let value = value.trim();
            value
                .strip_prefix("Token ")
                .or_else(|| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        })
        .or(cookie)
}

fn with_token() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>("session"))
        .map(extract_token)
        .or(warp::any().map(|| None))
        .unify()
}

pub fn with_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_token().and_then(move |token: Option<String>| {
        let secret = secret.clone();
        async move {
            match token {
                Some(token) => verify_jwt_session(&token, &secret)
                    .map(SessionData::from)
                    .map_err(reject::custom),
                None => Err(reject::custom(HtmlError::Unauthorized.default())),
            }
        }
    })
}

pub fn with_possible_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    with_token().map(move |token: Option<String>| {
        token.and_then(|token| {
            verify_jwt_session(&token, &secret)
                .ok()
                .map(SessionData::from)
        })
    })
}

/// Turns any rejection into the `{"detail": ...}` error shape.
pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let error = if let Some(error) = rejection.find::<Error>() {
        error.clone()
    } else if rejection.is_not_found() {
        HtmlError::NotFound.default()
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        HtmlError::InvalidRequest.new(&format!("{e}"))
    } else if rejection.find::<reject::MethodNotAllowed>().is_some() {
        Error {
            code: StatusCode::METHOD_NOT_ALLOWED.as_u16(),
            kind: HtmlError::InvalidRequest,
            info: String::from("Method not allowed"),
        }
    } else {
        log::error!("unhandled rejection: {:?}", rejection);
        HtmlError::InternalServerError.default()
    };

    Ok(error.into_response())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{
        jwt::generate_jwt_session,
        schema::{User, UserRole},
    };

    fn token() -> String {
        let user = User {
            id: 3,
            email: String::from("a@b.c"),
            username: String::from("anna"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            role: UserRole::User,
        };
        generate_jwt_session(&user, "secret", Duration::hours(1)).unwrap()
    }

    #[test]
    fn token_prefixes() {
        assert_eq!(
            extract_token(Some(String::from("Token abc")), None),
            Some(String::from("abc"))
        );
        assert_eq!(
            extract_token(Some(String::from("Bearer abc")), Some(String::from("c"))),
            Some(String::from("abc"))
        );
        assert_eq!(extract_token(None, Some(String::from("c"))), Some(String::from("c")));
        assert_eq!(extract_token(Some(String::from("Basic abc")), None), None);
    }

    #[tokio::test]
    async fn session_from_header() {
        let filter = with_session(Arc::from("secret"));
        let session = warp::test::request()
            .header("authorization", format!("Token {}", token()))
            .filter(&filter)
            .await
            .unwrap();

        assert_eq!(session.user_id, 3);
    }

    #[tokio::test]
    async fn missing_session_is_rejected() {
        let filter = with_session(Arc::from("secret"));
        assert!(warp::test::request().filter(&filter).await.is_err());
    }

    #[tokio::test]
    async fn anonymous_is_allowed_for_possible_session() {
        let filter = with_possible_session(Arc::from("secret"));
        let session = warp::test::request()
            .header("cookie", "session=garbage")
            .filter(&filter)
            .await
            .unwrap();

        assert!(session.is_none());
    }

    #[tokio::test]
    async fn rejections_render_as_json() {
        let rejection = reject::custom(HtmlError::Forbidden.default());
        let response = handle_rejection(rejection).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
