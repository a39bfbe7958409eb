use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    constants::ALREADY_EXISTS_ERROR,
    database::{
        repository::{
            IngredientRepository, MembershipRepository, RecipeRepository, TagRepository,
            UserRepository,
        },
        schema::{
            Ingredient, MembershipKind, NewIngredient, NewTag, NewUser, Recipe, RecipeFilter,
            RecipeIngredient, RecipeWrite, Tag, User, UserRole, Uuid,
        },
    },
    error::{Error, HtmlError},
};

#[derive(Debug, Default)]
struct MemoryState {
    last_id: Uuid,
    users: BTreeMap<Uuid, User>,
    tags: BTreeMap<Uuid, Tag>,
    ingredients: BTreeMap<Uuid, Ingredient>,
    recipes: BTreeMap<Uuid, Recipe>,
    // (recipe, tag)
    recipe_tags: BTreeSet<(Uuid, Uuid)>,
    // (recipe, ingredient, amount), insertion ordered
    recipe_ingredients: Vec<(Uuid, Uuid, i32)>,
    memberships: BTreeSet<(MembershipKind, Uuid, Uuid)>,
}

impl MemoryState {
    fn next_id(&mut self) -> Uuid {
        self.last_id += 1;
        self.last_id
    }

    fn recipe_ingredients(&self, recipe_id: Uuid) -> Vec<RecipeIngredient> {
        self.recipe_ingredients
            .iter()
            .filter(|(recipe, _, _)| *recipe == recipe_id)
            .filter_map(|(recipe, ingredient, amount)| {
                self.ingredients.get(ingredient).map(|i| RecipeIngredient {
                    recipe_id: *recipe,
                    ingredient_id: i.id,
                    name: i.name.to_owned(),
                    measurement_unit: i.measurement_unit.to_owned(),
                    amount: *amount,
                })
            })
            .collect()
    }

    fn matches(&self, recipe: &Recipe, filter: &RecipeFilter, viewer: Option<Uuid>) -> bool {
        if let Some(author) = filter.author {
            if recipe.author_id != author {
                return false;
            }
        }
        if !filter.tags.is_empty() {
            let tagged = self
                .recipe_tags
                .iter()
                .filter(|(r, _)| *r == recipe.id)
                .filter_map(|(_, tag)| self.tags.get(tag))
                .any(|tag| filter.tags.contains(&tag.slug));
            if !tagged {
                return false;
            }
        }
        for (flag, kind) in [
            (filter.is_favorited, MembershipKind::Favorite),
            (filter.is_in_shopping_cart, MembershipKind::ShoppingCart),
        ] {
            if !flag {
                continue;
            }
            match viewer {
                Some(viewer) if self.memberships.contains(&(kind, viewer, recipe.id)) => {}
                _ => return false,
            }
        }
        true
    }
}

fn conflict() -> Error {
    HtmlError::Conflict.new(ALREADY_EXISTS_ERROR)
}

fn missing_reference() -> Error {
    HtmlError::InvalidRequest.new("Referenced object does not exist")
}

/// In-process store holding the same constraints as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(
        &self,
        user: &NewUser,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, Error> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(conflict());
        }

        let row = User {
            id: state.next_id(),
            email: user.email.to_owned(),
            username: user.username.to_owned(),
            first_name: user.first_name.to_owned(),
            last_name: user.last_name.to_owned(),
            password: password_hash.to_owned(),
            role,
        };
        state.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), Error> {
        let state = self.state.read().await;
        let rows = state
            .users
            .values()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((rows, state.users.len() as i64))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&id) {
            Some(user) => {
                user.password = password_hash.to_owned();
                Ok(())
            }
            None => Err(HtmlError::NotFound.default()),
        }
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn insert_tag(&self, tag: &NewTag) -> Result<Tag, Error> {
        let mut state = self.state.write().await;
        if state
            .tags
            .values()
            .any(|t| t.name == tag.name || t.color == tag.color || t.slug == tag.slug)
        {
            return Err(conflict());
        }

        let row = Tag {
            id: state.next_id(),
            name: tag.name.to_owned(),
            color: tag.color.to_owned(),
            slug: tag.slug.to_owned(),
        };
        state.tags.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, Error> {
        Ok(self.state.read().await.tags.get(&id).cloned())
    }

    async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, Error> {
        let state = self.state.read().await;
        Ok(state.tags.values().find(|t| t.slug == slug).cloned())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        Ok(self.state.read().await.tags.values().cloned().collect())
    }
}

#[async_trait]
impl IngredientRepository for MemoryStore {
    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient, Error> {
        let mut state = self.state.write().await;
        let row = Ingredient {
            id: state.next_id(),
            name: ingredient.name.to_owned(),
            measurement_unit: ingredient.measurement_unit.to_owned(),
        };
        state.ingredients.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, Error> {
        Ok(self.state.read().await.ingredients.get(&id).cloned())
    }

    async fn find_ingredient(
        &self,
        name: &str,
        measurement_unit: &str,
    ) -> Result<Option<Ingredient>, Error> {
        let state = self.state.read().await;
        Ok(state
            .ingredients
            .values()
            .find(|i| i.name == name && i.measurement_unit == measurement_unit)
            .cloned())
    }

    async fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>, Error> {
        let state = self.state.read().await;
        let search = search.map(str::to_lowercase).unwrap_or_default();

        let mut rows: Vec<(bool, String, Ingredient)> = state
            .ingredients
            .values()
            .filter_map(|i| {
                let name = i.name.to_lowercase();
                if !name.contains(&search) {
                    return None;
                }
                Some((!name.starts_with(&search), name, i.clone()))
            })
            .collect();
        rows.sort_by(|a, b| (a.0, &a.1, a.2.id).cmp(&(b.0, &b.1, b.2.id)));

        Ok(rows.into_iter().map(|(_, _, i)| i).collect())
    }
}

#[async_trait]
impl RecipeRepository for MemoryStore {
    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, Error> {
        Ok(self.state.read().await.recipes.get(&id).cloned())
    }

    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        viewer: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error> {
        let state = self.state.read().await;
        let mut rows: Vec<&Recipe> = state
            .recipes
            .values()
            .filter(|recipe| state.matches(recipe, filter, viewer))
            .collect();
        rows.sort_by(|a, b| (b.pub_date, b.id).cmp(&(a.pub_date, a.id)));

        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((rows, total))
    }

    async fn list_author_recipes(
        &self,
        author_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Recipe>, Error> {
        let state = self.state.read().await;
        let mut rows: Vec<Recipe> = state
            .recipes
            .values()
            .filter(|r| r.author_id == author_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.pub_date, b.id).cmp(&(a.pub_date, a.id)));
        if let Some(limit) = limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn count_author_recipes(&self, author_id: Uuid) -> Result<i64, Error> {
        let state = self.state.read().await;
        Ok(state
            .recipes
            .values()
            .filter(|r| r.author_id == author_id)
            .count() as i64)
    }

    async fn list_recipe_tags(&self, recipe_id: Uuid) -> Result<Vec<Tag>, Error> {
        let state = self.state.read().await;
        Ok(state
            .recipe_tags
            .iter()
            .filter(|(recipe, _)| *recipe == recipe_id)
            .filter_map(|(_, tag)| state.tags.get(tag).cloned())
            .collect())
    }

    async fn list_recipe_ingredients(
        &self,
        recipe_id: Uuid,
    ) -> Result<Vec<RecipeIngredient>, Error> {
        Ok(self.state.read().await.recipe_ingredients(recipe_id))
    }

    async fn save_recipe(&self, recipe: &RecipeWrite) -> Result<Recipe, Error> {
        let mut state = self.state.write().await;

        // Every constraint is checked before the first mutation.
        if !state.users.contains_key(&recipe.author_id)
            || recipe.tags.iter().any(|tag| !state.tags.contains_key(tag))
            || recipe
                .ingredients
                .iter()
                .any(|i| !state.ingredients.contains_key(&i.id))
        {
            return Err(missing_reference());
        }
        let unique: BTreeSet<Uuid> = recipe.ingredients.iter().map(|i| i.id).collect();
        if unique.len() != recipe.ingredients.len() {
            return Err(conflict());
        }
        if recipe.cooking_time <= 0 || recipe.ingredients.iter().any(|i| i.amount <= 0) {
            return Err(HtmlError::InvalidRequest.new("check constraint violated"));
        }

        let row = match recipe.recipe_id {
            Some(id) => {
                let existing = state
                    .recipes
                    .get_mut(&id)
                    .ok_or_else(|| HtmlError::NotFound.default())?;
                existing.name = recipe.name.to_owned();
                existing.image = recipe.image.to_owned();
                existing.text = recipe.text.to_owned();
                existing.cooking_time = recipe.cooking_time;
                existing.clone()
            }
            None => {
                let row = Recipe {
                    id: state.next_id(),
                    author_id: recipe.author_id,
                    name: recipe.name.to_owned(),
                    image: recipe.image.to_owned(),
                    text: recipe.text.to_owned(),
                    cooking_time: recipe.cooking_time,
                    pub_date: Utc::now(),
                };
                state.recipes.insert(row.id, row.clone());
                row
            }
        };

        state.recipe_tags.retain(|(r, _)| *r != row.id);
        for tag in &recipe.tags {
            state.recipe_tags.insert((row.id, *tag));
        }
        state.recipe_ingredients.retain(|(r, _, _)| *r != row.id);
        for ingredient in &recipe.ingredients {
            state
                .recipe_ingredients
                .push((row.id, ingredient.id, ingredient.amount));
        }

        Ok(row)
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, Error> {
        let mut state = self.state.write().await;
        if state.recipes.remove(&id).is_none() {
            return Ok(false);
        }
        state.recipe_tags.retain(|(r, _)| *r != id);
        state.recipe_ingredients.retain(|(r, _, _)| *r != id);
        state.memberships.retain(|(kind, _, target)| {
            *kind == MembershipKind::Subscription || *target != id
        });
        Ok(true)
    }

    async fn list_cart_ingredients(&self, user_id: Uuid) -> Result<Vec<RecipeIngredient>, Error> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|(kind, actor, _)| *kind == MembershipKind::ShoppingCart && *actor == user_id)
            .flat_map(|(_, _, recipe)| state.recipe_ingredients(*recipe))
            .collect())
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn membership_exists(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<bool, Error> {
        let state = self.state.read().await;
        Ok(state.memberships.contains(&(kind, actor_id, target_id)))
    }

    async fn insert_membership(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let target_exists = match kind {
            MembershipKind::Subscription => state.users.contains_key(&target_id),
            _ => state.recipes.contains_key(&target_id),
        };
        if !state.users.contains_key(&actor_id) || !target_exists {
            return Err(missing_reference());
        }
        if !state.memberships.insert((kind, actor_id, target_id)) {
            return Err(conflict());
        }
        Ok(())
    }

    async fn delete_membership(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<u64, Error> {
        let mut state = self.state.write().await;
        Ok(state.memberships.remove(&(kind, actor_id, target_id)) as u64)
    }

    async fn list_membership_targets(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Uuid>, i64), Error> {
        let state = self.state.read().await;
        let targets: Vec<Uuid> = state
            .memberships
            .iter()
            .filter(|(k, actor, _)| *k == kind && *actor == actor_id)
            .map(|(_, _, target)| *target)
            .collect();
        let total = targets.len() as i64;

        Ok((
            targets
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total,
        ))
    }
}
