use std::collections::HashSet;

use log::{debug, info};

use super::memberships::has_membership;
use crate::{
    authentication::permissions::ActionType,
    constants::{
        AMOUNT_VALIDATE_ERROR, COOKING_TIME_ERROR, INGREDIENT_UNIQUE_ERROR,
        INGREDIENT_VALIDATE_ERROR, TAG_VALIDATION_ERROR,
    },
    error::{Error, HtmlError},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    repository::Store,
    schema::{MembershipKind, Recipe, RecipeFilter, RecipePayload, RecipeWrite, Uuid},
    views::{RecipeIngredientView, RecipeView, UserView},
};

/// Checks the payload against the recipe write rules and returns the tag ids
/// with repeats dropped. Nothing is written.
///
/// Ingredients are walked in payload order; for each entry the duplicate
/// check runs before the amount check.
pub async fn validate_recipe(payload: &RecipePayload, store: &dyn Store) -> Result<Vec<Uuid>, Error> {
    if payload.cooking_time <= 0 {
        return Err(HtmlError::InvalidRequest.new(COOKING_TIME_ERROR));
    }
    if payload.tags.is_empty() {
        return Err(HtmlError::InvalidRequest.new(TAG_VALIDATION_ERROR));
    }
    if payload.ingredients.is_empty() {
        return Err(HtmlError::InvalidRequest.new(INGREDIENT_VALIDATE_ERROR));
    }

    let mut seen = HashSet::new();
    for entry in &payload.ingredients {
        if !seen.insert(entry.id) {
            return Err(HtmlError::InvalidRequest.new(INGREDIENT_UNIQUE_ERROR));
        }

        let ingredient = store
            .get_ingredient(entry.id)
            .await?
            .ok_or_else(|| HtmlError::NotFound.new(&format!("Ingredient {} not found", entry.id)))?;
        if entry.amount <= 0 {
            return Err(HtmlError::InvalidRequest.new(&format!(
                "{}: {}",
                ingredient.name, AMOUNT_VALIDATE_ERROR
            )));
        }
    }

    let mut tags: Vec<Uuid> = Vec::with_capacity(payload.tags.len());
    for id in &payload.tags {
        if tags.contains(id) {
            continue;
        }
        if store.get_tag(*id).await?.is_none() {
            return Err(HtmlError::NotFound.new(&format!("Tag {id} not found")));
        }
        tags.push(*id);
    }

    Ok(tags)
}

/// Validates the payload and then creates (`existing` is `None`) or fully
/// replaces the recipe, its tag set and its ingredient rows in one write.
pub async fn validate_and_save(
    payload: &RecipePayload,
    existing: Option<&Recipe>,
    author_id: Uuid,
    store: &dyn Store,
) -> Result<Recipe, Error> {
    let tags = validate_recipe(payload, store).await.map_err(|e| {
        debug!("Recipe write rejected: {}", e.info);
        e
    })?;

    let write = RecipeWrite {
        recipe_id: existing.map(|recipe| recipe.id),
        author_id: existing.map(|recipe| recipe.author_id).unwrap_or(author_id),
        name: payload.name.to_owned(),
        image: payload.image.to_owned(),
        text: payload.text.to_owned(),
        cooking_time: payload.cooking_time,
        tags,
        ingredients: payload.ingredients.to_owned(),
    };
    let recipe = store.save_recipe(&write).await?;

    match existing {
        Some(_) => info!("Recipe {} updated by {}", recipe.id, author_id),
        None => info!("Recipe {} created by {}", recipe.id, author_id),
    }
    Ok(recipe)
}

async fn get_recipe_row(id: Uuid, store: &dyn Store) -> Result<Recipe, Error> {
    store
        .get_recipe(id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())
}

/// Loads a recipe the session may modify: its own, or any with
/// `ManageAllRecipes`.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    store: &dyn Store,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = get_recipe_row(id, store).await?;

    match session.authenticate(ActionType::ManageAllRecipes) {
        Ok(_) => Ok(recipe),
        Err(_) if recipe.author_id == session.user_id => Ok(recipe),
        Err(e) => Err(e),
    }
}

pub async fn recipe_view(
    recipe: Recipe,
    session: Option<&SessionData>,
    store: &dyn Store,
) -> Result<RecipeView, Error> {
    let author = store
        .get_user_by_id(recipe.author_id)
        .await?
        .ok_or_else(|| HtmlError::InternalServerError.new("Recipe author is missing"))?;
    let is_subscribed =
        has_membership(MembershipKind::Subscription, session, author.id, store).await?;

    Ok(RecipeView {
        id: recipe.id,
        tags: store.list_recipe_tags(recipe.id).await?,
        author: UserView::new(author, is_subscribed),
        ingredients: store
            .list_recipe_ingredients(recipe.id)
            .await?
            .into_iter()
            .map(RecipeIngredientView::from)
            .collect(),
        is_favorited: has_membership(MembershipKind::Favorite, session, recipe.id, store).await?,
        is_in_shopping_cart: has_membership(MembershipKind::ShoppingCart, session, recipe.id, store)
            .await?,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn create_recipe(
    payload: &RecipePayload,
    session: &SessionData,
    store: &dyn Store,
) -> Result<RecipeView, Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    let recipe = validate_and_save(payload, None, session.user_id, store).await?;

    recipe_view(recipe, Some(session), store).await
}

pub async fn update_recipe(
    id: Uuid,
    payload: &RecipePayload,
    session: &SessionData,
    store: &dyn Store,
) -> Result<RecipeView, Error> {
    let existing = get_recipe_mut(id, session, store).await?;
    let recipe = validate_and_save(payload, Some(&existing), session.user_id, store).await?;

    recipe_view(recipe, Some(session), store).await
}

pub async fn delete_recipe(id: Uuid, session: &SessionData, store: &dyn Store) -> Result<(), Error> {
    let recipe = get_recipe_mut(id, session, store).await?;
    if !store.delete_recipe(recipe.id).await? {
        return Err(HtmlError::NotFound.default());
    }
    info!("Recipe {} deleted by {}", recipe.id, session.user_id);

    Ok(())
}

pub async fn get_recipe(
    id: Uuid,
    session: Option<&SessionData>,
    store: &dyn Store,
) -> Result<RecipeView, Error> {
    let recipe = get_recipe_row(id, store).await?;
    recipe_view(recipe, session, store).await
}

/// Newest first. Favorite and cart filters match nothing for anonymous
/// viewers.
pub async fn list_recipes(
    filter: &RecipeFilter,
    page: PageRequest,
    session: Option<&SessionData>,
    store: &dyn Store,
) -> Result<PageContext<RecipeView>, Error> {
    if filter.needs_viewer() && session.is_none() {
        return Ok(PageContext::no_rows());
    }

    let viewer = session.map(|session| session.user_id);
    let (rows, total) = store
        .list_recipes(filter, viewer, page.limit(), page.offset())
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for recipe in rows {
        results.push(recipe_view(recipe, session, store).await?);
    }

    Ok(PageContext::from_rows(results, total, page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::{fixtures, memberships::add_favorite},
        repository::RecipeRepository,
        schema::UserRole,
        store::memory::MemoryStore,
    };

    struct Kitchen {
        store: MemoryStore,
        cook: SessionData,
        tags: Vec<Uuid>,
        tomato: Uuid,
        onion: Uuid,
    }

    async fn kitchen() -> Kitchen {
        let store = MemoryStore::new();
        let cook = fixtures::user(&store, "cook", UserRole::User).await;
        let lunch = fixtures::tag(&store, "lunch").await;
        let dinner = fixtures::tag(&store, "dinner").await;
        let tomato = fixtures::ingredient(&store, "tomato", "g").await;
        let onion = fixtures::ingredient(&store, "onion", "unit").await;

        Kitchen {
            store,
            cook,
            tags: vec![lunch.id, dinner.id],
            tomato: tomato.id,
            onion: onion.id,
        }
    }

    #[tokio::test]
    async fn valid_payload_persists_exact_associations() {
        let k = kitchen().await;
        let payload = fixtures::payload(k.tags.clone(), &[(k.tomato, 200), (k.onion, 2)]);

        let view = create_recipe(&payload, &k.cook, &k.store).await.unwrap();

        let tag_ids: Vec<Uuid> = view.tags.iter().map(|tag| tag.id).collect();
        assert_eq!(tag_ids, k.tags);
        let ingredients: Vec<(Uuid, i32)> =
            view.ingredients.iter().map(|i| (i.id, i.amount)).collect();
        assert_eq!(ingredients, vec![(k.tomato, 200), (k.onion, 2)]);
        assert_eq!(view.author.username, "cook");
        assert!(!view.is_favorited);
        assert!(!view.is_in_shopping_cart);
    }

    #[tokio::test]
    async fn zero_cooking_time_fails_first() {
        let k = kitchen().await;
        // Every other field is also invalid.
        let mut payload = fixtures::payload(vec![], &[(k.tomato, 0), (k.tomato, 0)]);
        payload.cooking_time = 0;

        let error = create_recipe(&payload, &k.cook, &k.store).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::InvalidRequest);
        assert_eq!(error.info, COOKING_TIME_ERROR);
    }

    #[tokio::test]
    async fn empty_tags_then_empty_ingredients() {
        let k = kitchen().await;

        let error = create_recipe(&fixtures::payload(vec![], &[]), &k.cook, &k.store)
            .await
            .unwrap_err();
        assert_eq!(error.info, TAG_VALIDATION_ERROR);

        let error = create_recipe(&fixtures::payload(k.tags.clone(), &[]), &k.cook, &k.store)
            .await
            .unwrap_err();
        assert_eq!(error.info, INGREDIENT_VALIDATE_ERROR);
    }

    #[tokio::test]
    async fn duplicate_ingredient_precedes_its_amount_check() {
        let k = kitchen().await;
        let payload = fixtures::payload(k.tags.clone(), &[(k.tomato, 100), (k.tomato, -1)]);

        let error = create_recipe(&payload, &k.cook, &k.store).await.unwrap_err();
        assert_eq!(error.info, INGREDIENT_UNIQUE_ERROR);
    }

    #[tokio::test]
    async fn non_positive_amount_names_the_ingredient() {
        let k = kitchen().await;
        let payload = fixtures::payload(k.tags.clone(), &[(k.onion, 0), (k.onion, 1)]);

        let error = create_recipe(&payload, &k.cook, &k.store).await.unwrap_err();
        assert_eq!(error.info, "onion: amount must be positive");

        let (rows, _) = k
            .store
            .list_recipes(&RecipeFilter::default(), None, 10, 0)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let k = kitchen().await;

        let error = create_recipe(&fixtures::payload(k.tags.clone(), &[(999, 1)]), &k.cook, &k.store)
            .await
            .unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);

        let error = create_recipe(&fixtures::payload(vec![999], &[(k.tomato, 1)]), &k.cook, &k.store)
            .await
            .unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);
    }

    #[tokio::test]
    async fn update_replaces_both_sets() {
        let k = kitchen().await;
        let created = create_recipe(
            &fixtures::payload(k.tags.clone(), &[(k.tomato, 200), (k.onion, 2)]),
            &k.cook,
            &k.store,
        )
        .await
        .unwrap();

        let mut payload = fixtures::payload(vec![k.tags[1]], &[(k.onion, 5)]);
        payload.name = String::from("Onion soup");
        let updated = update_recipe(created.id, &payload, &k.cook, &k.store)
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Onion soup");
        assert_eq!(updated.tags.len(), 1);
        assert_eq!(updated.tags[0].id, k.tags[1]);
        assert_eq!(updated.ingredients.len(), 1);
        assert_eq!(updated.ingredients[0].id, k.onion);
        assert_eq!(updated.ingredients[0].amount, 5);
    }

    #[tokio::test]
    async fn only_author_or_admin_may_modify() {
        let k = kitchen().await;
        let stranger = fixtures::user(&k.store, "stranger", UserRole::User).await;
        let admin = fixtures::user(&k.store, "admin", UserRole::Admin).await;
        let created = create_recipe(&fixtures::payload(k.tags.clone(), &[(k.tomato, 1)]), &k.cook, &k.store)
            .await
            .unwrap();

        let error = delete_recipe(created.id, &stranger, &k.store).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::Forbidden);

        let updated = update_recipe(
            created.id,
            &fixtures::payload(k.tags.clone(), &[(k.onion, 3)]),
            &admin,
            &k.store,
        )
        .await
        .unwrap();
        // The author survives an admin edit.
        assert_eq!(updated.author.id, k.cook.user_id);

        delete_recipe(created.id, &admin, &k.store).await.unwrap();
        let error = get_recipe(created.id, None, &k.store).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);
    }

    #[tokio::test]
    async fn favorite_filter_needs_a_viewer() {
        let k = kitchen().await;
        let created = create_recipe(&fixtures::payload(k.tags.clone(), &[(k.tomato, 1)]), &k.cook, &k.store)
            .await
            .unwrap();
        create_recipe(&fixtures::payload(k.tags.clone(), &[(k.onion, 1)]), &k.cook, &k.store)
            .await
            .unwrap();
        add_favorite(created.id, &k.cook, &k.store).await.unwrap();

        let filter = RecipeFilter {
            is_favorited: true,
            ..RecipeFilter::default()
        };
        let page = PageRequest::new(1, 10);

        let anonymous = list_recipes(&filter, page, None, &k.store).await.unwrap();
        assert_eq!(anonymous.count, 0);

        let own = list_recipes(&filter, page, Some(&k.cook), &k.store)
            .await
            .unwrap();
        assert_eq!(own.count, 1);
        assert_eq!(own.results[0].id, created.id);
        assert!(own.results[0].is_favorited);

        let all = list_recipes(&RecipeFilter::default(), page, None, &k.store)
            .await
            .unwrap();
        assert_eq!(all.count, 2);
    }

    #[tokio::test]
    async fn failed_update_keeps_original_sets() {
        let k = kitchen().await;
        let created = create_recipe(
            &fixtures::payload(vec![k.tags[0]], &[(k.tomato, 1)]),
            &k.cook,
            &k.store,
        )
        .await
        .unwrap();

        let payload = fixtures::payload(vec![k.tags[1]], &[(k.onion, 2), (k.tomato, 0)]);
        let error = update_recipe(created.id, &payload, &k.cook, &k.store)
            .await
            .unwrap_err();
        assert_eq!(error.info, "tomato: amount must be positive");

        let stored = get_recipe(created.id, None, &k.store).await.unwrap();
        let tag_ids: Vec<Uuid> = stored.tags.iter().map(|tag| tag.id).collect();
        assert_eq!(tag_ids, vec![k.tags[0]]);
        let ingredients: Vec<(Uuid, i32)> =
            stored.ingredients.iter().map(|i| (i.id, i.amount)).collect();
        assert_eq!(ingredients, vec![(k.tomato, 1)]);
    }

    #[tokio::test]
    async fn page_past_the_end_keeps_total() {
        let k = kitchen().await;
        for _ in 0..3 {
            create_recipe(&fixtures::payload(k.tags.clone(), &[(k.tomato, 1)]), &k.cook, &k.store)
                .await
                .unwrap();
        }

        let page = list_recipes(&RecipeFilter::default(), PageRequest::new(5, 2), None, &k.store)
            .await
            .unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.count, 3);
    }
}
