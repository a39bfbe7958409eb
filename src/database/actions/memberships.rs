use log::{debug, info};

use crate::{
    authentication::permissions::ActionType,
    constants::{ALREADY_EXISTS_ERROR, NOT_FOUND_ERROR, SELF_FOLLOW_ERROR},
    error::{Error, HtmlError},
    jwt::SessionData,
    repository::Store,
    schema::{Membership, MembershipKind, Recipe, Uuid},
    views::RecipeShort,
};

async fn ensure_target(kind: MembershipKind, target_id: Uuid, store: &dyn Store) -> Result<(), Error> {
    let exists = match kind {
        MembershipKind::Subscription => store.get_user_by_id(target_id).await?.is_some(),
        MembershipKind::Favorite | MembershipKind::ShoppingCart => {
            store.get_recipe(target_id).await?.is_some()
        }
    };

    if !exists {
        return Err(HtmlError::NotFound.default());
    }
    Ok(())
}

/// Adds the (actor, target) pair. Self-follow is rejected before the target
/// is even looked up.
pub async fn add_membership(
    kind: MembershipKind,
    actor_id: Uuid,
    target_id: Uuid,
    store: &dyn Store,
) -> Result<Membership, Error> {
    if kind == MembershipKind::Subscription && actor_id == target_id {
        return Err(HtmlError::InvalidRequest.new(SELF_FOLLOW_ERROR));
    }
    ensure_target(kind, target_id, store).await?;

    if store.membership_exists(kind, actor_id, target_id).await? {
        debug!("{kind:?} {actor_id} -> {target_id} rejected, already present");
        return Err(HtmlError::InvalidRequest.new(ALREADY_EXISTS_ERROR));
    }
    store.insert_membership(kind, actor_id, target_id).await?;
    info!("{kind:?} added: {actor_id} -> {target_id}");

    Ok(Membership {
        kind,
        actor_id,
        target_id,
    })
}

pub async fn remove_membership(
    kind: MembershipKind,
    actor_id: Uuid,
    target_id: Uuid,
    store: &dyn Store,
) -> Result<(), Error> {
    ensure_target(kind, target_id, store).await?;

    let deleted = store.delete_membership(kind, actor_id, target_id).await?;
    if deleted == 0 {
        return Err(HtmlError::InvalidRequest.new(NOT_FOUND_ERROR));
    }
    info!("{kind:?} removed: {actor_id} -> {target_id}");

    Ok(())
}

/// `false` for anonymous viewers.
pub async fn has_membership(
    kind: MembershipKind,
    session: Option<&SessionData>,
    target_id: Uuid,
    store: &dyn Store,
) -> Result<bool, Error> {
    match session {
        Some(session) => store.membership_exists(kind, session.user_id, target_id).await,
        None => Ok(false),
    }
}

async fn recipe_short(recipe_id: Uuid, store: &dyn Store) -> Result<RecipeShort, Error> {
    store
        .get_recipe(recipe_id)
        .await?
        .map(|recipe: Recipe| recipe.into())
        .ok_or_else(|| HtmlError::NotFound.default())
}

pub async fn add_favorite(
    recipe_id: Uuid,
    session: &SessionData,
    store: &dyn Store,
) -> Result<RecipeShort, Error> {
    session.authenticate(ActionType::ManageOwnFavorites)?;
    add_membership(MembershipKind::Favorite, session.user_id, recipe_id, store).await?;

    recipe_short(recipe_id, store).await
}

pub async fn remove_favorite(
    recipe_id: Uuid,
    session: &SessionData,
    store: &dyn Store,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnFavorites)?;
    remove_membership(MembershipKind::Favorite, session.user_id, recipe_id, store).await
}

pub async fn add_to_cart(
    recipe_id: Uuid,
    session: &SessionData,
    store: &dyn Store,
) -> Result<RecipeShort, Error> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;
    add_membership(MembershipKind::ShoppingCart, session.user_id, recipe_id, store).await?;

    recipe_short(recipe_id, store).await
}

pub async fn remove_from_cart(
    recipe_id: Uuid,
    session: &SessionData,
    store: &dyn Store,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;
    remove_membership(MembershipKind::ShoppingCart, session.user_id, recipe_id, store).await
}
