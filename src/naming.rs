//! Conversion between script identifiers and document tag/attribute names
//!
//! Scripts name element types in `PascalCase` and attributes in
//! `snake_case`; documents use lower-case hyphenated names.

/// `WorkTitle` -> `work-title`
pub fn to_tag_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch == '_' {
            result.push('-');
        } else if ch.is_uppercase() {
            if i > 0 && !result.ends_with('-') {
                result.push('-');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// `font_family` -> `font-family`, prefixed with `namespace:` when declared
pub fn to_attribute_name(name: &str, namespace: Option<&str>) -> String {
    let local = to_tag_name(name);
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}:{local}"),
        _ => local,
    }
}

/// `work-title` -> `WorkTitle`
pub fn to_type_name(tag: &str) -> String {
    tag.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// `xlink:font-family` -> `font_family`
pub fn to_field_name(attribute: &str) -> String {
    let local = attribute
        .rsplit_once(':')
        .map_or(attribute, |(_, local)| local);
    local.replace('-', "_").to_lowercase()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names() {
        assert_eq!(to_tag_name("WorkTitle"), "work-title");
        assert_eq!(to_tag_name("Note"), "note");
        assert_eq!(to_tag_name("ScorePartwise"), "score-partwise");
        assert_eq!(to_tag_name("Flat1"), "flat1");
        assert_eq!(to_tag_name(""), "");
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(to_attribute_name("font_family", None), "font-family");
        assert_eq!(to_attribute_name("number", None), "number");
        assert_eq!(to_attribute_name("href", Some("xlink")), "xlink:href");
        assert_eq!(to_attribute_name("id", Some("")), "id");
    }

    #[test]
    fn test_reverse_names() {
        assert_eq!(to_type_name("work-title"), "WorkTitle");
        assert_eq!(to_type_name("beat-type"), "BeatType");
        assert_eq!(to_field_name("font-family"), "font_family");
        assert_eq!(to_field_name("xlink:href"), "href");
        assert_eq!(to_type_name(""), "");
        assert_eq!(to_field_name(""), "");
    }

    #[test]
    fn test_round_trip_through_tag() {
        for name in ["PageMargins", "TimeModification", "Pitch", "BeatType"] {
            assert_eq!(to_type_name(&to_tag_name(name)), name);
        }
    }
}
