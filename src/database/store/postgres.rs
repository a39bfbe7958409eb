use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, QueryBuilder};

use crate::{
    config::Config,
    database::{
        error::QueryError,
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

/// Appends the `WHERE` conditions of a recipe listing to a query over
/// `recipes r`. Shared by the page query and its count.
fn push_recipe_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
) {
    query.push(" WHERE TRUE");
    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if filter.is_favorited {
        query
            .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(viewer)
            .push(")");
    }
    if filter.is_in_shopping_cart {
        query
            .push(" AND EXISTS (SELECT 1 FROM shopping_cart sc WHERE sc.recipe_id = r.id AND sc.user_id = ")
            .push_bind(viewer)
            .push(")");
    }
}

const RECIPE_INGREDIENT_COLUMNS: &str = "
    ri.recipe_id AS recipe_id, i.id AS ingredient_id, i.name AS name,
    i.measurement_unit AS measurement_unit, ri.amount AS amount
";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> Result<Self, Error> {
        log::info!("Connecting pool to DB...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
            .map_err(QueryError::from)?;
        log::info!("Connected to DB!");

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueryError::new(format!("{e}")))?;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(
        &self,
        user: &NewUser,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, Error> {
        let row: User = sqlx::query_as(
            "
            INSERT INTO users (email, username, first_name, last_name, password, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        ",
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), Error> {
        let rows: Vec<User> =
            sqlx::query_as("SELECT * FROM users ORDER BY id DESC LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(QueryError::from)?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok((rows, total.0))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), Error> {
        let result = sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        if result.rows_affected() == 0 {
            return Err(HtmlError::NotFound.default());
        }
        Ok(())
    }
}

#[async_trait]
impl TagRepository for PgStore {
    async fn insert_tag(&self, tag: &NewTag) -> Result<Tag, Error> {
        let row: Tag =
            sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *")
                .bind(&tag.name)
                .bind(&tag.color)
                .bind(&tag.slug)
                .fetch_one(&self.pool)
                .await
                .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>, Error> {
        let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, Error> {
        let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(rows)
    }
}

#[async_trait]
impl IngredientRepository for PgStore {
    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient, Error> {
        let row: Ingredient = sqlx::query_as(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
        )
        .bind(&ingredient.name)
        .bind(&ingredient.measurement_unit)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, Error> {
        let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn find_ingredient(
        &self,
        name: &str,
        measurement_unit: &str,
    ) -> Result<Option<Ingredient>, Error> {
        let row: Option<Ingredient> = sqlx::query_as(
            "SELECT * FROM ingredients WHERE name = $1 AND measurement_unit = $2 LIMIT 1",
        )
        .bind(name)
        .bind(measurement_unit)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>, Error> {
        let rows: Vec<Ingredient> = sqlx::query_as(
            "
            SELECT * FROM ingredients
            WHERE STRPOS(LOWER(name), LOWER($1)) > 0
            ORDER BY STRPOS(LOWER(name), LOWER($1)) <> 1, LOWER(name), id
        ",
        )
        .bind(search.unwrap_or(""))
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }
}

#[async_trait]
impl RecipeRepository for PgStore {
    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>, Error> {
        let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        viewer: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT r.* FROM recipes r");
        push_recipe_filter(&mut query, filter, viewer);
        query
            .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<Recipe> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
        push_recipe_filter(&mut count, filter, viewer);
        let total: (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok((rows, total.0))
    }

    async fn list_author_recipes(
        &self,
        author_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Recipe>, Error> {
        let rows: Vec<Recipe> = sqlx::query_as(
            "SELECT * FROM recipes WHERE author_id = $1 ORDER BY pub_date DESC, id DESC LIMIT $2",
        )
        .bind(author_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn count_author_recipes(&self, author_id: Uuid) -> Result<i64, Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(count.0)
    }

    async fn list_recipe_tags(&self, recipe_id: Uuid) -> Result<Vec<Tag>, Error> {
        let rows: Vec<Tag> = sqlx::query_as(
            "
            SELECT t.* FROM recipe_tags rt
            INNER JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = $1
            ORDER BY t.id
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn list_recipe_ingredients(
        &self,
        recipe_id: Uuid,
    ) -> Result<Vec<RecipeIngredient>, Error> {
        let rows: Vec<RecipeIngredient> = sqlx::query_as(&format!(
            "
            SELECT {RECIPE_INGREDIENT_COLUMNS}
            FROM recipe_ingredients ri
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE ri.recipe_id = $1
            ORDER BY ri.position
        "
        ))
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn save_recipe(&self, recipe: &RecipeWrite) -> Result<Recipe, Error> {
        let mut tr = self
            .pool
            .begin()
            .await
            .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

        let row: Recipe = match recipe.recipe_id {
            Some(id) => {
                let row: Option<Recipe> = sqlx::query_as(
                    "
                    UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4
                    WHERE id = $5
                    RETURNING *
                ",
                )
                .bind(&recipe.name)
                .bind(&recipe.image)
                .bind(&recipe.text)
                .bind(recipe.cooking_time)
                .bind(id)
                .fetch_optional(&mut *tr)
                .await
                .map_err(QueryError::from)?;

                row.ok_or_else(|| HtmlError::NotFound.default())?
            }
            None => sqlx::query_as(
                "
                INSERT INTO recipes (author_id, name, image, text, cooking_time)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            ",
            )
            .bind(recipe.author_id)
            .bind(&recipe.name)
            .bind(&recipe.image)
            .bind(&recipe.text)
            .bind(recipe.cooking_time)
            .fetch_one(&mut *tr)
            .await
            .map_err(QueryError::from)?,
        };

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(row.id)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, UNNEST($2::int[])")
            .bind(row.id)
            .bind(&recipe.tags)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(row.id)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;

        for ingredient in &recipe.ingredients {
            sqlx::query(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES ($1, $2, $3)",
            )
            .bind(row.id)
            .bind(ingredient.id)
            .bind(ingredient.amount)
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?;
        }

        tr.commit()
            .await
            .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

        Ok(row)
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_cart_ingredients(&self, user_id: Uuid) -> Result<Vec<RecipeIngredient>, Error> {
        let rows: Vec<RecipeIngredient> = sqlx::query_as(&format!(
            "
            SELECT {RECIPE_INGREDIENT_COLUMNS}
            FROM shopping_cart sc
            INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE sc.user_id = $1
        "
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }
}

#[async_trait]
impl MembershipRepository for PgStore {
    async fn membership_exists(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<bool, Error> {
        let row: Option<(i32,)> = sqlx::query_as(&format!(
            "SELECT 1 FROM {} WHERE user_id = $1 AND {} = $2",
            kind.table(),
            kind.target_column()
        ))
        .bind(actor_id)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row.is_some())
    }

    async fn insert_membership(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), Error> {
        sqlx::query(&format!(
            "INSERT INTO {} (user_id, {}) VALUES ($1, $2)",
            kind.table(),
            kind.target_column()
        ))
        .bind(actor_id)
        .bind(target_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(())
    }

    async fn delete_membership(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
            kind.table(),
            kind.target_column()
        ))
        .bind(actor_id)
        .bind(target_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected())
    }

    async fn list_membership_targets(
        &self,
        kind: MembershipKind,
        actor_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Uuid>, i64), Error> {
        let rows: Vec<(i32,)> = sqlx::query_as(&format!(
            "SELECT {column} FROM {table} WHERE user_id = $1 ORDER BY {column} LIMIT $2 OFFSET $3",
            column = kind.target_column(),
            table = kind.table(),
        ))
        .bind(actor_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = $1",
            kind.table()
        ))
        .bind(actor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok((rows.into_iter().map(|row| row.0).collect(), total.0))
    }
}
