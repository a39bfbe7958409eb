use std::{
    collections::{hash_map::Entry, HashMap},
    str::FromStr,
};

use serde_json::Value;

use super::{
    error::TypeError,
    pagination::PageRequest,
    schema::{RecipeFilter, Uuid},
};
use crate::error::Error;

pub type FormData = HashMap<String, Value>;

/// Loosely typed query parameters. Repeated keys arrive as a JSON array.
pub struct Form {
    inner: HashMap<String, Value>,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    /// Builds a form from raw `key=value` pairs, collecting repeated keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut inner: HashMap<String, Value> = HashMap::new();
        for (key, value) in pairs {
            let value = Value::String(value.into());
            match inner.entry(key.into()) {
                Entry::Occupied(mut entry) => match entry.get_mut() {
                    Value::Array(values) => values.push(value),
                    existing => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, value]);
                    }
                },
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }
        Self { inner }
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        match self.inner.get(key) {
            Some(Value::Number(number)) => number
                .to_string()
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new("Invalid type conversion").into()),
            Some(Value::String(value)) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(&format!("Invalid number for {key}")).into()),
            Some(_) => Err(TypeError::new("Failed to parse value as number").into()),
            None => Ok(None),
        }
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.inner.get(key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(value)) => vec![value.to_owned()],
            _ => vec![],
        }
    }

    /// `1` / `true` enable a flag; anything else, or a missing key, leaves it off.
    pub fn get_flag(&self, key: &str) -> bool {
        match self.inner.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_i64() == Some(1),
            Some(Value::String(value)) => matches!(value.as_str(), "1" | "true" | "True"),
            _ => false,
        }
    }
}

impl TryFrom<&Form> for RecipeFilter {
    type Error = Error;

    fn try_from(form: &Form) -> Result<Self, Self::Error> {
        Ok(Self {
            author: form.get_number::<Uuid>("author")?,
            tags: form.get_list("tags"),
            is_favorited: form.get_flag("is_favorited"),
            is_in_shopping_cart: form.get_flag("is_in_shopping_cart"),
        })
    }
}

impl PageRequest {
    pub fn from_form(form: &Form, default_limit: i64) -> Result<Self, Error> {
        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        let limit = form.get_number::<i64>("limit")?.unwrap_or(default_limit);

        Ok(PageRequest::new(page, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_keys_collect_into_list() {
        let form = Form::from_pairs([("tags", "breakfast"), ("tags", "lunch"), ("author", "3")]);
        let filter = RecipeFilter::try_from(&form).unwrap();

        assert_eq!(filter.tags, vec!["breakfast", "lunch"]);
        assert_eq!(filter.author, Some(3));
        assert!(!filter.is_favorited);
    }

    #[test]
    fn flags_accept_one_and_true() {
        let form = Form::from_pairs([("is_favorited", "1"), ("is_in_shopping_cart", "true")]);
        let filter = RecipeFilter::try_from(&form).unwrap();

        assert!(filter.is_favorited);
        assert!(filter.is_in_shopping_cart);
    }

    #[test]
    fn invalid_number_is_rejected() {
        let form = Form::from_pairs([("author", "abc")]);
        let error = RecipeFilter::try_from(&form).unwrap_err();
        assert_eq!(error.code, 400);
    }

    #[test]
    fn page_request_defaults() {
        let form = Form::from_data(FormData::new());
        let page = PageRequest::from_form(&form, 6).unwrap();
        assert_eq!(page, PageRequest::new(1, 6));

        let form = Form::from_pairs([("page", "3"), ("limit", "2")]);
        let page = PageRequest::from_form(&form, 6).unwrap();
        assert_eq!(page.offset(), 4);
    }
}
