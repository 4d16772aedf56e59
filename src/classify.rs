//! Channel categories and the sport-event heuristic

use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing group, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sport,
    Cinema,
    SerieTv,
    News,
    Documentari,
    Intrattenimento,
}

impl Category {
    /// Output and matching priority
    pub const ORDER: [Category; 6] = [
        Category::Sport,
        Category::Cinema,
        Category::SerieTv,
        Category::News,
        Category::Documentari,
        Category::Intrattenimento,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Sport => "Sport",
            Category::Cinema => "Cinema",
            Category::SerieTv => "Serie TV",
            Category::News => "News",
            Category::Documentari => "Documentari",
            Category::Intrattenimento => "Intrattenimento",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Keywords that put a channel in `category`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

fn rule(category: Category, keywords: &[&str]) -> CategoryRule {
    CategoryRule {
        category,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        rule(
            Category::Sport,
            &[
                "sport", "calcio", "football", "soccer", "dazn", "eurosport", "tennis", "golf",
                "motor", "f1", "motogp", "nba", "inter tv", "milan tv", "juventus", "bike",
            ],
        ),
        rule(
            Category::Cinema,
            &[
                "cinema", "movie", "film", "iris", "cine", "premiere", "warner tv", "paramount",
            ],
        ),
        rule(
            Category::SerieTv,
            &[
                "serie", "series", "fiction", "crime", "giallo", "fox", "comedy", "investigation",
                "rai 4", "rai4", "italia 2",
            ],
        ),
        rule(
            Category::News,
            &[
                "news", "tg24", "tgcom", "tg ", "notizie", "euronews", "cnn", "bbc world",
                "bloomberg", "cnbc", "meteo",
            ],
        ),
        rule(
            Category::Documentari,
            &[
                "documentar", "discovery", "geographic", "nat geo", "history", "storia", "focus",
                "dmax", "animal", "nature", "science", "scienza",
            ],
        ),
    ]
}

/// Assigns a category to a channel by keyword match on its lower-cased name
#[derive(Debug, Clone)]
pub struct ChannelClassifier {
    rules: Vec<(Category, Vec<String>)>,
}

impl ChannelClassifier {
    /// Rules are evaluated in `Category::ORDER` whatever order they are given in
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = Category::ORDER
            .iter()
            .filter_map(|category| {
                let keywords: Vec<String> = rules
                    .iter()
                    .filter(|r| r.category == *category)
                    .flat_map(|r| r.keywords.iter())
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (!keywords.is_empty()).then_some((*category, keywords))
            })
            .collect();
        Self { rules }
    }

    /// The channel id is accepted for interface symmetry; only the name is matched
    pub fn classify(&self, _channel_id: &str, channel_name: &str) -> Category {
        let name = channel_name.to_lowercase();
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k.as_str())))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Intrattenimento)
    }
}

impl Default for ChannelClassifier {
    fn default() -> Self {
        Self::new(&default_category_rules())
    }
}

pub fn default_sport_keywords() -> Vec<String> {
    [
        // competitions
        "serie a", "serie b", "champions league", "europa league", "conference league",
        "premier league", "la liga", "liga", "bundesliga", "ligue 1", "coppa italia",
        "supercoppa", "mondiali", "europei", "nations league",
        // teams
        "juventus", "milan", "inter", "napoli", "roma", "lazio", "atalanta", "fiorentina",
        "torino", "bologna", "real madrid", "barcelona", "atletico", "bayern", "psg",
        "manchester", "liverpool", "chelsea", "arsenal",
        // sports
        "calcio", "football", "soccer", "tennis", "atp", "wta", "formula 1", "motogp",
        "gran premio", "nba", "nfl", "nhl", "basket", "volley", "rugby", "ufc", "boxe",
        "boxing", "ciclismo", "giro d'italia",
        // fixture marker, "Juventus vs Milan"
        "vs",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

/// Lower-cased words joined by single spaces and padded on both ends,
/// so that " roma " only matches the whole word: "Napoli - Roma" -> " napoli roma "
fn word_key(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        String::new()
    } else {
        format!(" {} ", words.join(" "))
    }
}

/// Decides whether an event title is worth a stream lookup.
/// Keywords match whole words; multi-word keywords match as a phrase.
#[derive(Debug, Clone)]
pub struct SportMatcher {
    keywords: Vec<String>,
}

impl SportMatcher {
    /// Keywords without any letter or digit can never match and are dropped
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| word_key(k))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_sport_event(&self, title: &str) -> bool {
        let title = word_key(title);
        !title.is_empty() && self.keywords.iter().any(|k| title.contains(k.as_str()))
    }
}

impl Default for SportMatcher {
    fn default() -> Self {
        Self::new(&default_sport_keywords())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        let classifier = ChannelClassifier::default();
        assert_eq!(classifier.classify("rainews", "RaiNews"), Category::News);
        assert_eq!(classifier.classify("skysport24", "SkySport24"), Category::Sport);
        assert_eq!(classifier.classify("skycinema", "Sky Cinema Uno"), Category::Cinema);
        assert_eq!(classifier.classify("topcrime", "Top Crime"), Category::SerieTv);
        assert_eq!(classifier.classify("dmax", "DMAX"), Category::Documentari);
        assert_eq!(classifier.classify("rai1", "Rai 1"), Category::Intrattenimento);
    }

    #[test]
    fn test_priority_order() {
        // "sport" and "news" both match, Sport is checked first
        let classifier = ChannelClassifier::default();
        assert_eq!(classifier.classify("x", "Sport News 24"), Category::Sport);
        // "film" before "documentar"
        assert_eq!(classifier.classify("x", "Film Documentari"), Category::Cinema);
    }

    #[test]
    fn test_config_order_does_not_change_priority() {
        let rules = vec![
            rule(Category::News, &["uno"]),
            rule(Category::Sport, &["UNO"]),
        ];
        let classifier = ChannelClassifier::new(&rules);
        assert_eq!(classifier.classify("x", "Canale Uno"), Category::Sport);
        assert_eq!(classifier.classify("x", "Canale Due"), Category::Intrattenimento);
    }

    #[test]
    fn test_category_labels_and_order() {
        let labels: Vec<_> = Category::ORDER.iter().map(|c| c.label()).collect();
        assert_eq!(
            labels,
            ["Sport", "Cinema", "Serie TV", "News", "Documentari", "Intrattenimento"]
        );
        assert!(Category::Sport < Category::Intrattenimento);
    }

    #[test]
    fn test_sport_matcher() {
        let matcher = SportMatcher::default();
        assert!(matcher.is_sport_event("Juventus vs Milan"));
        assert!(matcher.is_sport_event("Serie A: Napoli - Roma"));
        assert!(matcher.is_sport_event("TENNIS ATP Finals"));
        assert!(!matcher.is_sport_event("TG1"));
        assert!(!matcher.is_sport_event("Il commissario Montalbano"));
    }

    #[test]
    fn test_sport_keywords_match_whole_words() {
        let matcher = SportMatcher::default();
        for title in [
            "Interstellar",
            "Romanzo criminale",
            "Il commissario Montalbano - La gita a Tindari",
            "Milano Finanza",
            "Quark - Viaggi nella natura",
            "Atlantide - Storie di uomini e di mondi",
        ] {
            assert!(!matcher.is_sport_event(title), "{} is not a sport event", title);
        }

        assert!(matcher.is_sport_event("Inter - Roma"));
        assert!(matcher.is_sport_event("Giro d'Italia: tappa 5"));
        assert!(matcher.is_sport_event("Calcio, Serie A"));
        // phrase keywords need every word in sequence
        assert!(!matcher.is_sport_event("Serie Antologica"));
    }

    #[test]
    fn test_punctuation_only_keywords_are_dropped() {
        let matcher = SportMatcher::new(&[" - ".to_string(), "VS.".to_string()]);
        assert!(!matcher.is_sport_event("Quark - Viaggi nella natura"));
        assert!(matcher.is_sport_event("Napoli vs. Lazio"));
        assert!(!matcher.is_sport_event("Versus"));
    }
}
