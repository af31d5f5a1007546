//! Localized genre phrases mapped to catalog genre names.

/// Spanish phrase -> canonical genre. Longer phrases come first so that a
/// multi-word phrase is tried before any of its words.
const SPANISH_GENRES: &[(&str, &str)] = &[
    ("ciencia ficción", "Science Fiction"),
    ("ciencia ficcion", "Science Fiction"),
    ("acción", "Action"),
    ("accion", "Action"),
    ("aventura", "Adventure"),
    ("animación", "Animation"),
    ("animacion", "Animation"),
    ("animada", "Animation"),
    ("comedia", "Comedy"),
    ("crimen", "Crime"),
    ("policiaca", "Crime"),
    ("policíaca", "Crime"),
    ("documental", "Documentary"),
    ("drama", "Drama"),
    ("familiar", "Family"),
    ("fantasía", "Fantasy"),
    ("fantasia", "Fantasy"),
    ("histórica", "History"),
    ("historica", "History"),
    ("terror", "Horror"),
    ("miedo", "Horror"),
    ("musical", "Music"),
    ("misterio", "Mystery"),
    ("romántica", "Romance"),
    ("romantica", "Romance"),
    ("romance", "Romance"),
    ("suspenso", "Thriller"),
    ("suspense", "Thriller"),
    ("bélica", "War"),
    ("belica", "War"),
    ("guerra", "War"),
    ("western", "Western"),
    ("vaqueros", "Western"),
];

/// Maps phrases of a user's language to the genre names used in the catalog
#[derive(Debug, Clone)]
pub struct GenreLexicon {
    entries: Vec<(String, String)>,
}

impl Default for GenreLexicon {
    fn default() -> Self {
        Self::spanish()
    }
}

impl GenreLexicon {
    /// The built-in Spanish lexicon
    pub fn spanish() -> Self {
        Self::from_entries(SPANISH_GENRES.iter().copied())
    }

    /// Build a lexicon from `(phrase, genre)` pairs. Phrases match
    /// case-insensitively.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(phrase, genre)| (phrase.to_lowercase(), genre.to_string()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical genres whose phrases occur in `text`, without duplicates,
    /// in lexicon order
    pub fn genres_in(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut found: Vec<String> = Vec::new();
        for (phrase, genre) in &self.entries {
            if lowered.contains(phrase.as_str()) && !found.contains(genre) {
                found.push(genre.clone());
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spanish_phrases() {
        let lexicon = GenreLexicon::spanish();
        assert_eq!(
            lexicon.genres_in("Quiero una película de ACCIÓN o de terror"),
            vec!["Action", "Horror"]
        );
        assert_eq!(lexicon.genres_in("algo de ciencia ficción"), vec!["Science Fiction"]);
    }

    #[test]
    fn test_synonyms_collapse() {
        let lexicon = GenreLexicon::spanish();
        assert_eq!(lexicon.genres_in("terror, mucho miedo"), vec!["Horror"]);
    }

    #[test]
    fn test_nothing_found() {
        assert!(GenreLexicon::spanish().genres_in("hola").is_empty());
        assert!(GenreLexicon::from_entries(Vec::<(&str, &str)>::new()).is_empty());
    }
}
