//! English singularization for table names.
//!
//! Used to derive default foreign keys (`authors` -> `author_id`) and the
//! prefix applied to colliding joined columns (`authors` -> `author_name`).

/// Words that are the same in singular and plural.
const UNCOUNTABLE: &[&str] = &[
    "data", "equipment", "information", "media", "metadata", "money", "news", "series",
    "sheep", "species", "fish", "deer", "status", "settings", "feedback",
];

/// Irregular plural -> singular pairs.
const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("geese", "goose"),
    ("mice", "mouse"),
    ("indices", "index"),
    ("matrices", "matrix"),
    ("vertices", "vertex"),
    ("analyses", "analysis"),
    ("crises", "crisis"),
    ("axes", "axis"),
    ("quizzes", "quiz"),
    ("movies", "movie"),
];

/// Return the singular form of `word`, preserving everything before the last
/// underscore-separated segment (`blog_posts` -> `blog_post`).
pub fn singular(word: &str) -> String {
    match word.rsplit_once('_') {
        Some((head, last)) if !last.is_empty() => format!("{}_{}", head, singular_word(last)),
        _ => singular_word(word),
    }
}

fn singular_word(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }

    if let Some((_, single)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return keep_case(word, single);
    }

    // Words ending in "ies" -> "y" (categories -> category)
    if lower.ends_with("ies") && lower.len() > 3 {
        return format!("{}y", &word[..word.len() - 3]);
    }

    // Words ending in "ves" -> "f" (shelves -> shelf), except "ves" stems
    if lower.ends_with("lves") || lower.ends_with("rves") {
        return format!("{}f", &word[..word.len() - 3]);
    }

    // Words ending in "sses", "xes", "ches", "shes", "zes" drop "es"
    if lower.ends_with("sses")
        || lower.ends_with("xes")
        || lower.ends_with("ches")
        || lower.ends_with("shes")
        || lower.ends_with("zes")
    {
        return word[..word.len() - 2].to_string();
    }

    // "ss", "us" and "is" endings are already singular (address, status, basis)
    if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }

    if lower.ends_with('s') {
        return word[..word.len() - 1].to_string();
    }

    word.to_string()
}

fn keep_case(original: &str, replacement: &str) -> String {
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}
