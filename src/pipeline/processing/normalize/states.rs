use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Canonical names of all Indian states and union territories, paired with
/// the two-letter codes that appear in source files.
pub static STATE_TABLE: &[(&str, &str)] = &[
    ("AP", "Andhra Pradesh"),
    ("AR", "Arunachal Pradesh"),
    ("AS", "Assam"),
    ("BR", "Bihar"),
    ("CG", "Chhattisgarh"),
    ("GA", "Goa"),
    ("GJ", "Gujarat"),
    ("HR", "Haryana"),
    ("HP", "Himachal Pradesh"),
    ("JH", "Jharkhand"),
    ("KA", "Karnataka"),
    ("KL", "Kerala"),
    ("MP", "Madhya Pradesh"),
    ("MH", "Maharashtra"),
    ("MN", "Manipur"),
    ("ML", "Meghalaya"),
    ("MZ", "Mizoram"),
    ("NL", "Nagaland"),
    ("OD", "Odisha"),
    ("PB", "Punjab"),
    ("RJ", "Rajasthan"),
    ("SK", "Sikkim"),
    ("TN", "Tamil Nadu"),
    ("TS", "Telangana"),
    ("TR", "Tripura"),
    ("UK", "Uttarakhand"),
    ("UP", "Uttar Pradesh"),
    ("WB", "West Bengal"),
    ("AN", "Andaman and Nicobar Islands"),
    ("CH", "Chandigarh"),
    ("DN", "Dadra and Nagar Haveli"),
    ("DD", "Daman and Diu"),
    ("DL", "Delhi"),
    ("JK", "Jammu and Kashmir"),
    ("LA", "Ladakh"),
    ("LD", "Lakshadweep"),
    ("PY", "Puducherry"),
];

static BY_LOWER_NAME: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    STATE_TABLE
        .iter()
        .map(|(_, name)| (name.to_lowercase(), *name))
        .collect()
});

static BY_ABBREVIATION: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| STATE_TABLE.iter().map(|(abbr, name)| (*abbr, *name)).collect());

// Spellings that predate renames but still show up in source files
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("orissa", "Odisha"),
        ("pondicherry", "Puducherry"),
        ("uttaranchal", "Uttarakhand"),
        ("new delhi", "Delhi"),
        ("nct of delhi", "Delhi"),
    ])
});

/// Resolve a raw state value to its canonical name. Accepts full names in
/// any case, two-letter codes, and a few legacy spellings. Returns None for
/// anything unrecognized; callers keep the raw value and flag the record.
pub fn canonical_state(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if let Some(name) = BY_LOWER_NAME.get(&lower) {
        return Some(name);
    }
    if let Some(name) = ALIASES.get(lower.as_str()) {
        return Some(name);
    }
    if trimmed.len() == 2 {
        if let Some(name) = BY_ABBREVIATION.get(trimmed.to_uppercase().as_str()) {
            return Some(name);
        }
    }
    None
}

/// Scan free text for a state name, used when the state column is absent
/// and the state is buried in the street/city fields.
pub fn find_state_in_text(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    // Longest names first so "Arunachal Pradesh" is not matched as "Pradesh"
    let mut names: Vec<&'static str> = STATE_TABLE.iter().map(|(_, n)| *n).collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    names
        .into_iter()
        .find(|name| lower.contains(&name.to_lowercase()))
}
