use std::collections::BTreeMap;

use log::info;
use serde::Serialize;
use warp::http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::reply::Response;

use crate::{
    authentication::permissions::ActionType,
    constants::{SHOPPING_LIST_CONTENT_TYPE, SHOPPING_LIST_HEADER},
    error::Error,
    jwt::SessionData,
    repository::Store,
    schema::{RecipeIngredient, Uuid},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListEntry {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

/// Sums amounts per (name, unit), ordered by name then unit.
pub fn aggregate_ingredients(rows: &[RecipeIngredient]) -> Vec<ShoppingListEntry> {
    let mut totals: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for row in rows {
        *totals
            .entry((row.name.as_str(), row.measurement_unit.as_str()))
            .or_insert(0) += i64::from(row.amount);
    }

    totals
        .into_iter()
        .map(|((name, unit), total)| ShoppingListEntry {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            total,
        })
        .collect()
}

pub fn render_shopping_list(entries: &[ShoppingListEntry]) -> String {
    let mut text = String::from(SHOPPING_LIST_HEADER);
    for (index, entry) in entries.iter().enumerate() {
        text.push_str(&format!(
            "{} {}({}) - {} \n",
            index + 1,
            entry.name,
            entry.measurement_unit,
            entry.total
        ));
    }
    text
}

pub async fn build_shopping_list(
    user_id: Uuid,
    store: &dyn Store,
) -> Result<Vec<ShoppingListEntry>, Error> {
    let rows = store.list_cart_ingredients(user_id).await?;
    Ok(aggregate_ingredients(&rows))
}

/// Plain-text attachment of a rendered shopping list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListFile {
    pub filename: String,
    pub body: String,
}

impl warp::Reply for ShoppingListFile {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body.into());
        let headers = response.headers_mut();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static(SHOPPING_LIST_CONTENT_TYPE));
        if let Ok(disposition) =
            HeaderValue::from_str(&format!("attachment; filename=\"{}\"", self.filename))
        {
            headers.insert(CONTENT_DISPOSITION, disposition);
        }

        response
    }
}

pub async fn download_shopping_cart(
    session: &SessionData,
    filename: &str,
    store: &dyn Store,
) -> Result<ShoppingListFile, Error> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;

    let entries = build_shopping_list(session.user_id, store).await?;
    info!(
        "Shopping list for {} rendered with {} entries",
        session.user_id,
        entries.len()
    );

    Ok(ShoppingListFile {
        filename: filename.to_string(),
        body: render_shopping_list(&entries),
    })
}
