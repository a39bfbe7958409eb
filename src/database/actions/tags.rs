use log::info;

use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError},
    jwt::SessionData,
    repository::Store,
    schema::{NewTag, Tag, Uuid},
    seed::parse_tags,
};

pub async fn list_tags(store: &dyn Store) -> Result<Vec<Tag>, Error> {
    store.list_tags().await
}

pub async fn get_tag(id: Uuid, store: &dyn Store) -> Result<Tag, Error> {
    store
        .get_tag(id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())
}

pub async fn create_tag(tag: &NewTag, session: &SessionData, store: &dyn Store) -> Result<Tag, Error> {
    session.authenticate(ActionType::ManageTags)?;

    let tag = store.insert_tag(tag).await?;
    info!("Tag {} ({}) created", tag.id, tag.slug);
    Ok(tag)
}

/// Loads `name,color,slug` rows, reusing tags whose slug already exists.
pub async fn load_tags(csv: &str, store: &dyn Store) -> Result<Vec<Tag>, Error> {
    let mut tags = vec![];
    let mut created = 0;

    for row in parse_tags(csv) {
        let tag = match store.find_tag_by_slug(&row.slug).await? {
            Some(tag) => tag,
            None => {
                created += 1;
                store.insert_tag(&row).await?
            }
        };
        tags.push(tag);
    }

    info!("Loaded {} tags, {} new", tags.len(), created);
    Ok(tags)
}
