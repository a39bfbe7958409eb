use log::info;

use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError},
    jwt::SessionData,
    repository::Store,
    schema::{Ingredient, NewIngredient, Uuid},
    seed::parse_ingredients,
};

/// Case-insensitive search on `name`; prefix matches come first.
pub async fn list_ingredients(search: Option<&str>, store: &dyn Store) -> Result<Vec<Ingredient>, Error> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    store.list_ingredients(search).await
}

pub async fn get_ingredient(id: Uuid, store: &dyn Store) -> Result<Ingredient, Error> {
    store
        .get_ingredient(id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())
}

pub async fn create_ingredient(
    ingredient: &NewIngredient,
    session: &SessionData,
    store: &dyn Store,
) -> Result<Ingredient, Error> {
    session.authenticate(ActionType::ManageIngredients)?;
    if ingredient.name.trim().is_empty() || ingredient.measurement_unit.trim().is_empty() {
        return Err(HtmlError::InvalidRequest.new("Name and measurement unit are required"));
    }

    let ingredient = store.insert_ingredient(ingredient).await?;
    info!("Ingredient {} ({}) created", ingredient.id, ingredient.name);
    Ok(ingredient)
}

/// Loads `name,unit` rows, reusing an ingredient with the same name and unit.
pub async fn load_ingredients(csv: &str, store: &dyn Store) -> Result<usize, Error> {
    let mut created = 0;

    for row in parse_ingredients(csv) {
        if store
            .find_ingredient(&row.name, &row.measurement_unit)
            .await?
            .is_none()
        {
            store.insert_ingredient(&row).await?;
            created += 1;
        }
    }

    info!("Loaded {created} new ingredients");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions::fixtures, schema::UserRole, store::memory::MemoryStore};

    #[tokio::test]
    async fn load_skips_known_pairs() {
        let store = MemoryStore::new();
        let csv = "сахар,г\nсахар,кг\nсоль,г\n";

        assert_eq!(load_ingredients(csv, &store).await.unwrap(), 3);
        assert_eq!(load_ingredients(csv, &store).await.unwrap(), 0);
        assert_eq!(list_ingredients(None, &store).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let store = MemoryStore::new();
        fixtures::ingredient(&store, "Tomato", "g").await;
        fixtures::ingredient(&store, "cherry tomato", "g").await;
        fixtures::ingredient(&store, "onion", "unit").await;

        let names: Vec<String> = list_ingredients(Some(" TOM "), &store)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Tomato", "cherry tomato"]);
    }

    #[tokio::test]
    async fn only_admin_creates_ingredients() {
        let store = MemoryStore::new();
        let cook = fixtures::user(&store, "cook", UserRole::User).await;
        let admin = fixtures::user(&store, "admin", UserRole::Admin).await;
        let ingredient = NewIngredient {
            name: String::from("flour"),
            measurement_unit: String::from("g"),
        };

        let error = create_ingredient(&ingredient, &cook, &store).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::Forbidden);

        let created = create_ingredient(&ingredient, &admin, &store).await.unwrap();
        assert_eq!(get_ingredient(created.id, &store).await.unwrap(), created);
    }
}
