//! Locale-specific field extraction from descriptions.
//!
//! Each locale has an ordered list of [`ExtractionRule`]s. A rule is a pure
//! function from a description to the field it found and the description
//! with the match cut out. Rules run in order; a rule whose field is already
//! filled is skipped, so at most one rule fills each field.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use super::repair::cut;

/// Heuristic set selected by country code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Locale {
    UnitedKingdom,
    NewZealand,
    Australia,
    Italy,
    Generic,
}

impl Locale {
    pub fn from_country(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "GBR" | "IRL" => Locale::UnitedKingdom,
            "NZL" => Locale::NewZealand,
            "AUS" => Locale::Australia,
            "ITA" => Locale::Italy,
            _ => Locale::Generic,
        }
    }

    pub fn rules(self) -> &'static [ExtractionRule] {
        match self {
            Locale::UnitedKingdom => &UNITED_KINGDOM,
            Locale::NewZealand | Locale::Australia => &OCEANIA,
            Locale::Italy => &ITALY,
            Locale::Generic => &GENERIC,
        }
    }

    /// Whether a leading clause is split off as the episode subtitle.
    pub fn extracts_subtitle(self) -> bool {
        matches!(self, Locale::UnitedKingdom | Locale::Australia)
    }
}

/// A value pulled out of a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedField {
    Season(u32),
    Episode(u32),
    SeasonEpisode { season: u32, episode: u32 },
    Year(u16),
    Directors(Vec<String>),
    Cast(Vec<String>),
    Writers(Vec<String>),
}

pub type ExtractFn = fn(&str) -> Option<(ExtractedField, String)>;

#[derive(Clone, Copy)]
pub struct ExtractionRule {
    pub name: &'static str,
    pub extract: ExtractFn,
}

impl std::fmt::Debug for ExtractionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Fields filled by the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub year: Option<u16>,
    pub directors: Vec<String>,
    pub cast: Vec<String>,
    pub writers: Vec<String>,
}

impl ExtractedFields {
    fn is_free(&self, field: &ExtractedField) -> bool {
        match field {
            ExtractedField::Season(_) => self.season.is_none(),
            ExtractedField::Episode(_) => self.episode.is_none(),
            ExtractedField::SeasonEpisode { .. } => self.season.is_none() && self.episode.is_none(),
            ExtractedField::Year(_) => self.year.is_none(),
            ExtractedField::Directors(_) => self.directors.is_empty(),
            ExtractedField::Cast(_) => self.cast.is_empty(),
            ExtractedField::Writers(_) => self.writers.is_empty(),
        }
    }

    fn set(&mut self, field: ExtractedField) {
        match field {
            ExtractedField::Season(season) => self.season = Some(season),
            ExtractedField::Episode(episode) => self.episode = Some(episode),
            ExtractedField::SeasonEpisode { season, episode } => {
                self.season = Some(season);
                self.episode = Some(episode);
            }
            ExtractedField::Year(year) => self.year = Some(year),
            ExtractedField::Directors(names) => self.directors = names,
            ExtractedField::Cast(names) => self.cast = names,
            ExtractedField::Writers(names) => self.writers = names,
        }
    }
}

/// Run `rules` over `description`. With `remove` set, each match is cut out
/// of the returned description.
pub fn apply_rules(rules: &[ExtractionRule], description: &str, remove: bool) -> (ExtractedFields, String) {
    let mut fields = ExtractedFields::default();
    let mut text = description.to_string();

    for rule in rules {
        if let Some((field, remaining)) = (rule.extract)(&text) {
            if !fields.is_free(&field) {
                continue;
            }
            fields.set(field);
            if remove {
                text = remaining;
            }
        }
    }

    (fields, text)
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).unwrap());
    };
}

pattern!(SHORT_SEASON_EPISODE, r"\(?\bS(\d{1,2}),?\s*Ep?\s?(\d{1,3})\b\)?\.?");
pattern!(SERIES, r"\bSeries (\d{1,2})\b\.?");
pattern!(EPISODE, r"\b(?:Ep|Episode) (\d{1,3})(?: of \d{1,3})?\b\.?");
pattern!(YEAR_IN_PARENS, r"\((\d{4})\)");
pattern!(DIR_COLON, r"\bDir:\s*([^.;()]+)[.;]?");
pattern!(STARRING, r"\bStarring\s+([^.;()]+)[.;]?");
pattern!(WRITTEN_BY, r"\b(?:Written by|Writer:)\s*([^.;()]+)[.;]?");
pattern!(LONG_SEASON_EPISODE, r"\bSeason (\d{1,2}),?\s*Episode (\d{1,3})\b\.?");
pattern!(DIRECTED_BY, r"\bDirected by\s+([^.;()]+)[.;]?");
pattern!(STAGIONE_EPISODIO, r"\bStagione (\d{1,2}),?\s*Ep(?:\.|isodio)?\s*(\d{1,3})\b\.?");
pattern!(EPISODIO, r"\bEpisodio (\d{1,3})\b\.?");
pattern!(ANNO, r"\bAnno (\d{4})\b\.?");
pattern!(REGIA_DI, r"\bRegia di\s+([^.;()]+)[.;]?");
pattern!(CON, r"\bCon\s+([^.;()]+)[.;]?");
pattern!(NAME_SEPARATOR, r"\s*(?:,|\band\b|\be\b|&)\s*");

/// First match of `re` that builds a field from its captures.
fn find(
    re: &Regex,
    text: &str,
    field: impl Fn(&Captures) -> Option<ExtractedField>,
) -> Option<(ExtractedField, String)> {
    re.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let value = field(&caps)?;
        Some((value, cut(text, whole.start(), whole.end())))
    })
}

fn number(caps: &Captures, index: usize) -> Option<u32> {
    caps.get(index)?.as_str().parse().ok()
}

fn year(caps: &Captures) -> Option<ExtractedField> {
    let year: u16 = caps.get(1)?.as_str().parse().ok()?;
    (1900..=2100).contains(&year).then_some(ExtractedField::Year(year))
}

fn names(caps: &Captures) -> Option<Vec<String>> {
    let list = caps.get(1)?.as_str();
    let names: Vec<String> = NAME_SEPARATOR
        .split(list)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();
    (!names.is_empty()).then_some(names)
}

fn season_episode(caps: &Captures) -> Option<ExtractedField> {
    Some(ExtractedField::SeasonEpisode {
        season: number(caps, 1)?,
        episode: number(caps, 2)?,
    })
}

fn short_season_episode(text: &str) -> Option<(ExtractedField, String)> {
    find(&SHORT_SEASON_EPISODE, text, season_episode)
}

fn series(text: &str) -> Option<(ExtractedField, String)> {
    find(&SERIES, text, |c| number(c, 1).map(ExtractedField::Season))
}

fn episode(text: &str) -> Option<(ExtractedField, String)> {
    find(&EPISODE, text, |c| number(c, 1).map(ExtractedField::Episode))
}

fn year_in_parens(text: &str) -> Option<(ExtractedField, String)> {
    find(&YEAR_IN_PARENS, text, year)
}

fn dir_colon(text: &str) -> Option<(ExtractedField, String)> {
    find(&DIR_COLON, text, |c| names(c).map(ExtractedField::Directors))
}

fn starring(text: &str) -> Option<(ExtractedField, String)> {
    find(&STARRING, text, |c| names(c).map(ExtractedField::Cast))
}

fn written_by(text: &str) -> Option<(ExtractedField, String)> {
    find(&WRITTEN_BY, text, |c| names(c).map(ExtractedField::Writers))
}

fn long_season_episode(text: &str) -> Option<(ExtractedField, String)> {
    find(&LONG_SEASON_EPISODE, text, season_episode)
}

fn directed_by(text: &str) -> Option<(ExtractedField, String)> {
    find(&DIRECTED_BY, text, |c| names(c).map(ExtractedField::Directors))
}

fn stagione_episodio(text: &str) -> Option<(ExtractedField, String)> {
    find(&STAGIONE_EPISODIO, text, season_episode)
}

fn episodio(text: &str) -> Option<(ExtractedField, String)> {
    find(&EPISODIO, text, |c| number(c, 1).map(ExtractedField::Episode))
}

fn anno(text: &str) -> Option<(ExtractedField, String)> {
    find(&ANNO, text, year)
}

fn regia_di(text: &str) -> Option<(ExtractedField, String)> {
    find(&REGIA_DI, text, |c| names(c).map(ExtractedField::Directors))
}

fn con(text: &str) -> Option<(ExtractedField, String)> {
    find(&CON, text, |c| names(c).map(ExtractedField::Cast))
}

const fn rule(name: &'static str, extract: ExtractFn) -> ExtractionRule {
    ExtractionRule { name, extract }
}

static UNITED_KINGDOM: [ExtractionRule; 7] = [
    rule("season/episode (S3 Ep5)", short_season_episode),
    rule("series (Series 3)", series),
    rule("episode (Ep 5)", episode),
    rule("year ((2019))", year_in_parens),
    rule("director (Dir:)", dir_colon),
    rule("cast (Starring)", starring),
    rule("writer (Written by)", written_by),
];

static OCEANIA: [ExtractionRule; 5] = [
    rule("season/episode (Season 3, Episode 5)", long_season_episode),
    rule("season/episode (S3 Ep5)", short_season_episode),
    rule("year ((2019))", year_in_parens),
    rule("director (Directed by)", directed_by),
    rule("cast (Starring)", starring),
];

static ITALY: [ExtractionRule; 5] = [
    rule("season/episode (Stagione 3 Ep. 5)", stagione_episodio),
    rule("episode (Episodio 5)", episodio),
    rule("year (Anno 2019)", anno),
    rule("director (Regia di)", regia_di),
    rule("cast (Con)", con),
];

static GENERIC: [ExtractionRule; 1] = [rule("year ((2019))", year_in_parens)];

#[cfg(test)]
mod tests {
    use super::*;

    fn run(locale: Locale, text: &str) -> (ExtractedFields, String) {
        apply_rules(locale.rules(), text, true)
    }

    #[test]
    fn test_locale_selection() {
        assert_eq!(Locale::from_country("GBR"), Locale::UnitedKingdom);
        assert_eq!(Locale::from_country("irl"), Locale::UnitedKingdom);
        assert_eq!(Locale::from_country("NZL"), Locale::NewZealand);
        assert_eq!(Locale::from_country("AUS"), Locale::Australia);
        assert_eq!(Locale::from_country("ITA"), Locale::Italy);
        assert_eq!(Locale::from_country("DEU"), Locale::Generic);
        assert!(Locale::Australia.extracts_subtitle());
        assert!(!Locale::NewZealand.extracts_subtitle());
    }

    #[test]
    fn test_united_kingdom() {
        let (fields, text) = run(
            Locale::UnitedKingdom,
            "Tense thriller. (S3 Ep5) Dir: Jane Roe. Starring Ann Lee, Bob Ray and Cy Dee. (2019)",
        );
        assert_eq!(fields.season, Some(3));
        assert_eq!(fields.episode, Some(5));
        assert_eq!(fields.year, Some(2019));
        assert_eq!(fields.directors, vec!["Jane Roe"]);
        assert_eq!(fields.cast, vec!["Ann Lee", "Bob Ray", "Cy Dee"]);
        assert_eq!(text, "Tense thriller.");
    }

    #[test]
    fn test_one_rule_per_field() {
        // Season comes from the first rule; "Series 4" is left alone
        let (fields, text) = run(Locale::UnitedKingdom, "S3 Ep5. Series 4 recap.");
        assert_eq!(fields.season, Some(3));
        assert_eq!(fields.episode, Some(5));
        assert_eq!(text, "Series 4 recap.");
    }

    #[test]
    fn test_series_and_episode_separately() {
        let (fields, text) = run(Locale::UnitedKingdom, "Series 2. Episode 4 of 6. Drama.");
        assert_eq!(fields.season, Some(2));
        assert_eq!(fields.episode, Some(4));
        assert_eq!(text, "Drama.");
    }

    #[test]
    fn test_failed_rule_leaves_text() {
        let text = "A film (1850) about nothing.";
        let (fields, remaining) = run(Locale::UnitedKingdom, text);
        assert_eq!(fields, ExtractedFields::default());
        assert_eq!(remaining, text);
    }

    #[test]
    fn test_keep_text_when_not_removing() {
        let text = "Comedy. (S1 Ep2)";
        let (fields, remaining) = apply_rules(Locale::UnitedKingdom.rules(), text, false);
        assert_eq!(fields.episode, Some(2));
        assert_eq!(remaining, text);
    }

    #[test]
    fn test_oceania() {
        let (fields, text) = run(
            Locale::NewZealand,
            "Season 3, Episode 5. The team regroups. Directed by Sam Hill.",
        );
        assert_eq!(fields.season, Some(3));
        assert_eq!(fields.episode, Some(5));
        assert_eq!(fields.directors, vec!["Sam Hill"]);
        assert_eq!(text, "The team regroups.");
    }

    #[test]
    fn test_italy() {
        let (fields, text) = run(
            Locale::Italy,
            "Stagione 2 Ep. 7. Una storia. Anno 2001. Regia di Mario Rossi. Con Anna Bianchi e Luca Verdi.",
        );
        assert_eq!(fields.season, Some(2));
        assert_eq!(fields.episode, Some(7));
        assert_eq!(fields.year, Some(2001));
        assert_eq!(fields.directors, vec!["Mario Rossi"]);
        assert_eq!(fields.cast, vec!["Anna Bianchi", "Luca Verdi"]);
        assert_eq!(text, "Una storia.");
    }

    #[test]
    fn test_later_year_tried_after_out_of_range_one() {
        let (fields, text) = run(Locale::Generic, "Remake of the (1850) classic. (2019)");
        assert_eq!(fields.year, Some(2019));
        assert_eq!(text, "Remake of the (1850) classic.");
    }

    #[test]
    fn test_writers() {
        let (fields, text) = run(
            Locale::UnitedKingdom,
            "Courtroom drama. Written by Ann Lee and Bob Ray. Starring Cy Dee.",
        );
        assert_eq!(fields.writers, vec!["Ann Lee", "Bob Ray"]);
        assert_eq!(fields.cast, vec!["Cy Dee"]);
        assert_eq!(text, "Courtroom drama.");
    }

    #[test]
    fn test_italy_episode_only() {
        let (fields, text) = run(Locale::Italy, "Episodio 12. Il ritorno.");
        assert_eq!(fields.season, None);
        assert_eq!(fields.episode, Some(12));
        assert_eq!(text, "Il ritorno.");
    }

    #[test]
    fn test_generic_year_only() {
        let (fields, text) = run(Locale::Generic, "Film (1999). S3 Ep5.");
        assert_eq!(fields.year, Some(1999));
        assert_eq!(fields.season, None);
        assert_eq!(text, "Film. S3 Ep5.");
    }
}
