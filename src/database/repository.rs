use async_trait::async_trait;

use super::schema::{
    Ingredient, MembershipKind, NewIngredient, NewTag, NewUser, Recipe, RecipeFilter,
    RecipeIngredient, RecipeWrite, Tag, User, UserRole, Uuid,
};
use crate::error::Error;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with a conflict when the email or username is taken.
    async fn insert_user(
        &self,
        user: &NewUser,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, Error>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, Error>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, Error>;
    /// Newest first, with the total row count.
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), Error>;
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn insert_tag(&self, tag: &NewTag) -> Result<Tag, Error>;
    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, Error>;
    async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, Error>;
    async fn list_tags(&self) -> Result<Vec<Tag>, Error>;
}

#[async_trait]
pub trait IngredientRepository: Send + Sync {
    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient, Error>;
    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, Error>;
    async fn find_ingredient(
        &self,
        name: &str,
        measurement_unit: &str,
    ) -> Result<Option<Ingredient>, Error>;
    /// Case-insensitive name search; prefix matches come before substring
    /// matches, each group alphabetical.
    async fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>, Error>;
}

#[async_trait]
pub trait RecipeRepository: Send + Sync {
    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, Error>;
    /// Newest first. `viewer` backs the favorite and cart filters.
    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        viewer: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error>;
    async fn list_author_recipes(
        &self,
        author_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Recipe>, Error>;
    async fn count_author_recipes(&self, author_id: Uuid) -> Result<i64, Error>;
    async fn list_recipe_tags(&self, recipe_id: Uuid) -> Result<Vec<Tag>, Error>;
    async fn list_recipe_ingredients(&self, recipe_id: Uuid)
        -> Result<Vec<RecipeIngredient>, Error>;
    /// Creates or fully replaces a recipe together with its tag and
    /// ingredient sets in one transaction.
    async fn save_recipe(&self, recipe: &RecipeWrite) -> Result<Recipe, Error>;
    async fn delete_recipe(&self, id: Uuid) -> Result<bool, Error>;
    /// Every ingredient row of every recipe in the user's shopping cart.
    async fn list_cart_ingredients(&self, user_id: Uuid) -> Result<Vec<RecipeIngredient>, Error>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn membership_exists(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<bool, Error>;
    /// Fails with a conflict when the pair already exists.
    async fn insert_membership(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), Error>;
    /// Returns the number of deleted rows.
    async fn delete_membership(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<u64, Error>;
    async fn list_membership_targets(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Uuid>, i64), Error>;
}

pub trait Store:
    UserRepository + TagRepository + IngredientRepository + RecipeRepository + MembershipRepository
{
}

impl<T> Store for T where
    T: UserRepository
        + TagRepository
        + IngredientRepository
        + RecipeRepository
        + MembershipRepository
{
}
