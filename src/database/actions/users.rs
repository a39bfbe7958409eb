use log::{info, warn};

use super::memberships::{add_membership, has_membership, remove_membership};
use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
        permissions::ActionType,
    },
    config::Config,
    constants::{
        EMAIL_TAKEN_ERROR, INVALID_CREDENTIALS_ERROR, INVALID_PASSWORD_ERROR,
        USERNAME_TAKEN_ERROR,
    },
    error::{Error, HtmlError},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    repository::Store,
    schema::{Credentials, MembershipKind, NewUser, SetPassword, User, UserRole, Uuid},
    views::{RecipeShort, SubscriptionView, TokenView, UserView},
};

async fn get_user_row(id: Uuid, store: &dyn Store) -> Result<User, Error> {
    store
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())
}

/// Creates a user with the `user` role. Taken email or username is reported
/// before the insert; a race past that check surfaces as a conflict.
pub async fn register_user(user: &NewUser, store: &dyn Store) -> Result<UserView, Error> {
    if !user.email.contains('@') {
        return Err(HtmlError::InvalidRequest.new("Enter a valid email address"));
    }
    if user.username.trim().is_empty() {
        return Err(HtmlError::InvalidRequest.new("Username is required"));
    }
    if user.password.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Password is required"));
    }

    if store.get_user_by_email(&user.email).await?.is_some() {
        return Err(HtmlError::InvalidRequest.new(EMAIL_TAKEN_ERROR));
    }
    if store.get_user_by_username(&user.username).await?.is_some() {
        return Err(HtmlError::InvalidRequest.new(USERNAME_TAKEN_ERROR));
    }

    let password_hash = hash_password(&user.password)?;
    let row = store.insert_user(user, &password_hash, UserRole::User).await?;
    info!("Registered user {} ({})", row.id, row.username);

    Ok(UserView::new(row, false))
}

pub async fn login_user(
    credentials: &Credentials,
    config: &Config,
    store: &dyn Store,
) -> Result<TokenView, Error> {
    let user = match store.get_user_by_email(&credentials.email).await? {
        Some(user) => user,
        None => {
            warn!("Login failed for unknown email");
            return Err(HtmlError::InvalidRequest.new(INVALID_CREDENTIALS_ERROR));
        }
    };

    if !verify_password(&credentials.password, &user.password) {
        warn!("Login failed for user {}", user.id);
        return Err(HtmlError::InvalidRequest.new(INVALID_CREDENTIALS_ERROR));
    }

    let auth_token = generate_jwt_session(&user, &config.jwt_secret, config.session_lifetime())?;
    Ok(TokenView { auth_token })
}

pub async fn get_user(
    id: Uuid,
    session: Option<&SessionData>,
    store: &dyn Store,
) -> Result<UserView, Error> {
    let user = get_user_row(id, store).await?;
    let is_subscribed = has_membership(MembershipKind::Subscription, session, user.id, store).await?;

    Ok(UserView::new(user, is_subscribed))
}

pub async fn current_user(session: &SessionData, store: &dyn Store) -> Result<UserView, Error> {
    let user = get_user_row(session.user_id, store).await?;
    Ok(UserView::new(user, false))
}

pub async fn list_users(
    page: PageRequest,
    session: Option<&SessionData>,
    store: &dyn Store,
) -> Result<PageContext<UserView>, Error> {
    let (rows, total) = store.list_users(page.limit(), page.offset()).await?;

    let mut results = Vec::with_capacity(rows.len());
    for user in rows {
        let is_subscribed =
            has_membership(MembershipKind::Subscription, session, user.id, store).await?;
        results.push(UserView::new(user, is_subscribed));
    }

    Ok(PageContext::from_rows(results, total, page))
}

pub async fn set_password(
    payload: &SetPassword,
    session: &SessionData,
    store: &dyn Store,
) -> Result<(), Error> {
    let user = get_user_row(session.user_id, store).await?;
    if !verify_password(&payload.current_password, &user.password) {
        return Err(HtmlError::InvalidRequest.new(INVALID_PASSWORD_ERROR));
    }
    if payload.new_password.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Password is required"));
    }

    store.set_password(user.id, &hash_password(&payload.new_password)?).await?;
    info!("User {} changed password", user.id);

    Ok(())
}

async fn subscription_view(
    author: User,
    recipes_limit: Option<i64>,
    store: &dyn Store,
) -> Result<SubscriptionView, Error> {
    let recipes = store
        .list_author_recipes(author.id, recipes_limit.map(|limit| limit.max(0)))
        .await?
        .into_iter()
        .map(RecipeShort::from)
        .collect();
    let recipes_count = store.count_author_recipes(author.id).await?;

    Ok(SubscriptionView {
        user: UserView::new(author, true),
        recipes,
        recipes_count,
    })
}

pub async fn subscribe(
    author_id: Uuid,
    recipes_limit: Option<i64>,
    session: &SessionData,
    store: &dyn Store,
) -> Result<SubscriptionView, Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    add_membership(MembershipKind::Subscription, session.user_id, author_id, store).await?;

    let author = get_user_row(author_id, store).await?;
    subscription_view(author, recipes_limit, store).await
}

pub async fn unsubscribe(
    author_id: Uuid,
    session: &SessionData,
    store: &dyn Store,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    remove_membership(MembershipKind::Subscription, session.user_id, author_id, store).await
}

pub async fn list_subscriptions(
    page: PageRequest,
    recipes_limit: Option<i64>,
    session: &SessionData,
    store: &dyn Store,
) -> Result<PageContext<SubscriptionView>, Error> {
    let (authors, total) = store
        .list_membership_targets(
            MembershipKind::Subscription,
            session.user_id,
            page.limit(),
            page.offset(),
        )
        .await?;

    let mut results = Vec::with_capacity(authors.len());
    for author_id in authors {
        let author = get_user_row(author_id, store).await?;
        results.push(subscription_view(author, recipes_limit, store).await?);
    }

    Ok(PageContext::from_rows(results, total, page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::{fixtures, recipes::create_recipe},
        constants::{ALREADY_EXISTS_ERROR, SELF_FOLLOW_ERROR},
        jwt::verify_jwt_session,
        repository::UserRepository,
        store::memory::MemoryStore,
    };

    fn new_user(username: &str) -> NewUser {
        NewUser {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            first_name: String::from("Jamie"),
            last_name: String::from("Oliver"),
            password: String::from("correct horse"),
        }
    }

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some(String::from("test-secret")),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = MemoryStore::new();
        let config = config();
        let view = register_user(&new_user("cook"), &store).await.unwrap();
        assert_eq!(view.username, "cook");
        assert!(!view.is_subscribed);

        let token = login_user(
            &Credentials {
                email: String::from("cook@example.com"),
                password: String::from("correct horse"),
            },
            &config,
            &store,
        )
        .await
        .unwrap();
        let session = verify_jwt_session(&token.auth_token, &config.jwt_secret).unwrap();
        assert_eq!(session.user_id, view.id);

        let error = login_user(
            &Credentials {
                email: String::from("cook@example.com"),
                password: String::from("wrong"),
            },
            &config,
            &store,
        )
        .await
        .unwrap_err();
        assert_eq!(error.info, INVALID_CREDENTIALS_ERROR);
    }

    #[tokio::test]
    async fn taken_email_and_username_are_rejected() {
        let store = MemoryStore::new();
        register_user(&new_user("cook"), &store).await.unwrap();

        let error = register_user(&new_user("cook"), &store).await.unwrap_err();
        assert_eq!(error.info, EMAIL_TAKEN_ERROR);

        let mut other = new_user("cook");
        other.email = String::from("other@example.com");
        let error = register_user(&other, &store).await.unwrap_err();
        assert_eq!(error.info, USERNAME_TAKEN_ERROR);
    }

    #[tokio::test]
    async fn set_password_checks_current() {
        let store = MemoryStore::new();
        let view = register_user(&new_user("cook"), &store).await.unwrap();
        let session = SessionData {
            user_id: view.id,
            username: view.username.to_owned(),
            role: UserRole::User,
        };

        let error = set_password(
            &SetPassword {
                new_password: String::from("new"),
                current_password: String::from("wrong"),
            },
            &session,
            &store,
        )
        .await
        .unwrap_err();
        assert_eq!(error.info, INVALID_PASSWORD_ERROR);

        set_password(
            &SetPassword {
                new_password: String::from("new"),
                current_password: String::from("correct horse"),
            },
            &session,
            &store,
        )
        .await
        .unwrap();
        let user = store.get_user_by_id(view.id).await.unwrap().unwrap();
        assert!(verify_password("new", &user.password));
    }

    #[tokio::test]
    async fn subscriptions_list_followed_authors() {
        let store = MemoryStore::new();
        let reader = fixtures::user(&store, "reader", UserRole::User).await;
        let author = fixtures::user(&store, "author", UserRole::User).await;
        let tag = fixtures::tag(&store, "lunch").await;
        let tomato = fixtures::ingredient(&store, "tomato", "g").await;
        for _ in 0..3 {
            create_recipe(&fixtures::payload(vec![tag.id], &[(tomato.id, 1)]), &author, &store)
                .await
                .unwrap();
        }

        let view = subscribe(author.user_id, Some(2), &reader, &store).await.unwrap();
        assert!(view.user.is_subscribed);
        assert_eq!(view.recipes.len(), 2);
        assert_eq!(view.recipes_count, 3);

        let error = subscribe(author.user_id, None, &reader, &store).await.unwrap_err();
        assert_eq!(error.info, ALREADY_EXISTS_ERROR);
        let error = subscribe(reader.user_id, None, &reader, &store).await.unwrap_err();
        assert_eq!(error.info, SELF_FOLLOW_ERROR);

        let page = list_subscriptions(PageRequest::new(1, 10), None, &reader, &store)
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].user.id, author.user_id);
        assert_eq!(page.results[0].recipes.len(), 3);

        let seen = get_user(author.user_id, Some(&reader), &store).await.unwrap();
        assert!(seen.is_subscribed);
        let seen = get_user(author.user_id, None, &store).await.unwrap();
        assert!(!seen.is_subscribed);

        unsubscribe(author.user_id, &reader, &store).await.unwrap();
        let page = list_subscriptions(PageRequest::new(1, 10), None, &reader, &store)
            .await
            .unwrap();
        assert_eq!(page.count, 0);
    }

    #[tokio::test]
    async fn negative_recipes_limit_lists_nothing() {
        let store = MemoryStore::new();
        let reader = fixtures::user(&store, "reader", UserRole::User).await;
        let author = fixtures::user(&store, "author", UserRole::User).await;
        let tag = fixtures::tag(&store, "lunch").await;
        let tomato = fixtures::ingredient(&store, "tomato", "g").await;
        create_recipe(&fixtures::payload(vec![tag.id], &[(tomato.id, 1)]), &author, &store)
            .await
            .unwrap();

        let view = subscribe(author.user_id, Some(-1), &reader, &store).await.unwrap();
        assert!(view.recipes.is_empty());
        assert_eq!(view.recipes_count, 1);
    }
}
