use log::warn;

use crate::{
    database::error::TypeError,
    schema::{NewIngredient, NewTag},
};

/*
Fixture syntax, one row per line

tags.csv         name,color,slug
Завтрак,#E26C2D,breakfast

ingredients.csv  name,unit
абрикосовое варенье,г
*/

impl TryFrom<&str> for NewTag {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [name, color, slug] if !name.is_empty() && !slug.is_empty() => Ok(NewTag {
                name: name.to_string(),
                color: color.to_string(),
                slug: slug.to_string(),
            }),
            _ => Err(TypeError::new("Invalid syntax; Expected name,color,slug")),
        }
    }
}

impl TryFrom<&str> for NewIngredient {
    type Error = TypeError;

    /// The unit is everything after the last comma so names may contain commas.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (name, unit) = value
            .rsplit_once(',')
            .ok_or_else(|| TypeError::new("Invalid syntax; Expected name,unit"))?;
        let (name, unit) = (name.trim(), unit.trim());
        if name.is_empty() || unit.is_empty() {
            return Err(TypeError::new("Invalid syntax; Empty name or unit"));
        }

        Ok(NewIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        })
    }
}

fn parse_rows<'a, T>(csv: &'a str) -> Vec<T>
where
    T: TryFrom<&'a str, Error = TypeError>,
{
    csv.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match T::try_from(line) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("Skipping fixture line {}: {}", n + 1, e);
                None
            }
        })
        .collect()
}

pub fn parse_tags(csv: &str) -> Vec<NewTag> {
    parse_rows(csv)
}

pub fn parse_ingredients(csv: &str) -> Vec<NewIngredient> {
    parse_rows(csv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_skip_rows_with_wrong_column_count() {
        let tags = parse_tags("Завтрак,#E26C2D,breakfast\nbroken,#000000\n\nУжин,#8775D2,dinner\n");

        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].slug, "breakfast");
        assert_eq!(tags[1].name, "Ужин");
        assert_eq!(tags[1].color, "#8775D2");
    }

    #[test]
    fn ingredient_unit_is_taken_after_last_comma() {
        let ingredients = parse_ingredients("абрикосовое варенье,г\nсоль, перец,по вкусу\nnounit\n");

        assert_eq!(
            ingredients,
            vec![
                NewIngredient {
                    name: String::from("абрикосовое варенье"),
                    measurement_unit: String::from("г"),
                },
                NewIngredient {
                    name: String::from("соль, перец"),
                    measurement_unit: String::from("по вкусу"),
                },
            ]
        );
    }
}
