use std::collections::HashMap;
use std::sync::OnceLock;

use deunicode::deunicode;
use regex::Regex;

/// Generational suffixes dropped from player names.
const NAME_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];

fn bracketed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "(NYY)", "[P]" and similar annotations appended by either source
    RE.get_or_init(|| Regex::new(r"[\(\[][^\)\]]*[\)\]]").expect("static regex"))
}

/// Canonical player name: ASCII, lowercase, "first last", no punctuation,
/// no generational suffix, no trailing team abbreviation.
///
/// `"Smith, J."` and `"J. Smith"` both become `"j smith"`.
pub fn canonical_player_name(raw: &str, team: Option<&str>) -> String {
    let ascii = deunicode(raw).to_lowercase();
    let stripped = bracketed_re().replace_all(&ascii, " ");

    // "last, first" -> "first last" unless the tail is only a suffix ("griffey, jr.")
    let reordered = match stripped.split_once(',') {
        Some((last, rest)) => {
            let rest_tokens = tokens(rest);
            if rest_tokens.is_empty() || rest_tokens.iter().all(|t| NAME_SUFFIXES.contains(&t.as_str())) {
                last.to_string()
            } else {
                format!("{rest} {last}")
            }
        }
        None => stripped.into_owned(),
    };

    let mut parts: Vec<String> = tokens(&reordered)
        .into_iter()
        .filter(|t| !NAME_SUFFIXES.contains(&t.as_str()))
        .collect();

    if let Some(team) = team.map(fold_token).filter(|t| !t.is_empty()) {
        if parts.len() > 2 && parts.last() == Some(&team) {
            parts.pop();
        }
    }

    parts.join(" ")
}

/// First initial + surname, used when the full name finds no counterpart.
/// `"john smith"` -> `"j smith"`. None for single-token names.
pub fn initial_key(canonical: &str) -> Option<String> {
    let mut it = canonical.split(' ');
    let first = it.next()?.chars().next()?;
    let last = it.last()?;
    Some(format!("{first} {last}"))
}

/// Market labels folded to ASCII snake_case: `"Pitcher Strikeouts"` -> `"pitcher_strikeouts"`.
pub fn fold_label(raw: &str) -> String {
    let ascii = deunicode(raw).to_lowercase();
    let mut out = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub fn canonical_game_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Case-folded team abbreviation or name.
pub fn fold_token(raw: &str) -> String {
    deunicode(raw).trim().to_lowercase()
}

fn tokens(s: &str) -> Vec<String> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '.' && *c != '\'')
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Market synonym table
// ---------------------------------------------------------------------------

/// Maps every known spelling of a market label to one canonical label.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    /// folded synonym -> canonical label
    synonyms: HashMap<String, String>,
}

impl SynonymTable {
    pub fn new(entries: &HashMap<String, String>) -> Self {
        let mut synonyms = HashMap::with_capacity(entries.len() * 2);
        for (alias, canonical) in entries {
            let canonical = fold_label(canonical);
            synonyms.insert(fold_label(alias), canonical.clone());
            // canonical labels resolve to themselves
            synonyms.insert(canonical.clone(), canonical);
        }
        Self { synonyms }
    }

    /// Returns the canonical label and whether the table knew the label.
    /// Unknown labels pass through folded.
    pub fn canonical(&self, raw: &str) -> (String, bool) {
        let folded = fold_label(raw);
        match self.synonyms.get(&folded) {
            Some(canonical) => (canonical.clone(), true),
            None => (folded, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_first_and_initial_forms_agree() {
        assert_eq!(canonical_player_name("J. Smith", None), "j smith");
        assert_eq!(canonical_player_name("Smith, J.", None), "j smith");
        assert_eq!(canonical_player_name("  SMITH,   j ", None), "j smith");
    }

    #[test]
    fn accents_suffixes_and_team_tags_are_removed() {
        assert_eq!(canonical_player_name("José Ramírez", None), "jose ramirez");
        assert_eq!(canonical_player_name("Vladimir Guerrero Jr.", None), "vladimir guerrero");
        assert_eq!(canonical_player_name("Griffey, Jr.", None), "griffey");
        assert_eq!(canonical_player_name("Gerrit Cole (NYY)", Some("NYY")), "gerrit cole");
        assert_eq!(canonical_player_name("Gerrit Cole NYY", Some("nyy")), "gerrit cole");
        assert_eq!(canonical_player_name("Travis d'Arnaud", None), "travis darnaud");
    }

    #[test]
    fn two_token_name_keeps_token_matching_team() {
        // "Will Smith" on team "smith" is still a full name
        assert_eq!(canonical_player_name("Will Smith", Some("SMITH")), "will smith");
    }

    #[test]
    fn initial_key_uses_first_initial_and_surname() {
        assert_eq!(initial_key("john smith").as_deref(), Some("j smith"));
        assert_eq!(initial_key("j smith").as_deref(), Some("j smith"));
        assert_eq!(initial_key("ohtani"), None);
    }

    #[test]
    fn labels_fold_to_snake_case() {
        assert_eq!(fold_label("Pitcher Strikeouts"), "pitcher_strikeouts");
        assert_eq!(fold_label("  Ks "), "ks");
        assert_eq!(fold_label("Hits + Runs + RBIs"), "hits_runs_rbis");
    }

    #[test]
    fn synonym_table_maps_aliases_and_canonicals() {
        let mut entries = HashMap::new();
        entries.insert("Ks".to_string(), "pitcher_strikeouts".to_string());
        entries.insert("Strikeouts".to_string(), "pitcher_strikeouts".to_string());
        let table = SynonymTable::new(&entries);

        assert_eq!(table.canonical("KS"), ("pitcher_strikeouts".to_string(), true));
        assert_eq!(table.canonical("strikeouts"), ("pitcher_strikeouts".to_string(), true));
        assert_eq!(table.canonical("Pitcher Strikeouts"), ("pitcher_strikeouts".to_string(), true));
        assert_eq!(table.canonical("Stolen Bases"), ("stolen_bases".to_string(), false));
    }
}
