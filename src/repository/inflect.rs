//! English singular forms for many-to-many relation names (`tags` -> `tag`).

const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("criteria", "criterion"),
];

const UNCHANGED_SUFFIXES: &[&str] = &["ss", "us", "is", "news", "series", "species"];

/// Singular form of the last word of `word`, keeping the leading part intact
/// (`productCategories` -> `productCategory`).
#[must_use]
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();

    for (plural, singular) in IRREGULAR {
        if lower.ends_with(plural) {
            let stem = &word[..word.len() - plural.len()];
            return format!("{stem}{}", match_case(&word[stem.len()..], singular));
        }
    }
    if UNCHANGED_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return word.to_owned();
    }
    if lower.len() > 3 && lower.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if ["sses", "shes", "ches", "xes", "zes"]
        .iter()
        .any(|s| lower.ends_with(s))
    {
        return word[..word.len() - 2].to_owned();
    }
    if lower.ends_with('s') && word.len() > 1 {
        return word[..word.len() - 1].to_owned();
    }
    word.to_owned()
}

fn match_case(original: &str, replacement: &str) -> String {
    if original.starts_with(|c: char| c.is_ascii_uppercase()) {
        let mut chars = replacement.chars();
        chars
            .next()
            .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
            .unwrap_or_default()
    } else {
        replacement.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_plurals() {
        for (plural, singular) in [
            ("tags", "tag"),
            ("categories", "category"),
            ("boxes", "box"),
            ("matches", "match"),
            ("addresses", "address"),
            ("productCategories", "productCategory"),
        ] {
            assert_eq!(singularize(plural), singular, "{plural}");
        }
    }

    #[test]
    fn test_irregular_and_unchanged() {
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("salesPeople"), "salesPerson");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("access"), "access");
        assert_eq!(singularize("tag"), "tag");
    }
}
