use serde::Deserialize;

/// Primary lookup payload for one movie. Every field is optional on the wire;
/// defaulting rules are applied in [`NormalizedMovie::from_details`].
#[derive(Debug, Clone, Deserialize)]
pub struct MovieDetails {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub runtime: Option<i64>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub adult: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genre {
    pub name: String,
}

/// Secondary lookup payload: per-country certification entries.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseDatesResponse {
    #[serde(default)]
    pub results: Vec<CountryReleases>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryReleases {
    #[serde(default)]
    pub iso_3166_1: String,
    #[serde(default)]
    pub release_dates: Vec<ReleaseEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEntry {
    #[serde(default)]
    pub certification: String,
}

impl ReleaseDatesResponse {
    /// First non-empty certification for the given country, if any.
    pub fn certification_for(&self, country: &str) -> Option<String> {
        self.results
            .iter()
            .filter(|c| c.iso_3166_1 == country)
            .flat_map(|c| c.release_dates.iter())
            .map(|r| r.certification.trim())
            .find(|cert| !cert.is_empty())
            .map(|cert| cert.to_string())
    }
}

/// Sentinel stored when no certification could be determined.
pub const NOT_RATED: &str = "NR";
/// Sentinel stored when the genre list is empty.
pub const UNKNOWN_GENRE: &str = "Unknown";

/// Fully-defaulted record ready for the upsert sink, keyed by `movie_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMovie {
    pub movie_id: i64,
    pub title: String,
    pub genre_summary: String,
    pub runtime_minutes: i64,
    pub certification: String,
    pub original_language: String,
    pub release_date: String,
    pub poster_path: Option<String>,
    pub poster_full_url: Option<String>,
    pub adult: bool,
}

impl NormalizedMovie {
    /// Apply the defaulting rules to a raw details payload. `certification`
    /// comes from the secondary lookup; callers pass [`NOT_RATED`] when that
    /// lookup produced nothing.
    pub fn from_details(
        movie_id: i64,
        details: &MovieDetails,
        certification: String,
        image_base: &str,
    ) -> Self {
        let genre_summary = if details.genres.is_empty() {
            UNKNOWN_GENRE.to_string()
        } else {
            details
                .genres
                .iter()
                .map(|g| g.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let poster_path = details
            .poster_path
            .clone()
            .filter(|p| !p.trim().is_empty());
        let poster_full_url = poster_path.as_deref().map(|p| format!("{image_base}{p}"));

        Self {
            movie_id,
            title: details.title.clone().unwrap_or_default(),
            genre_summary,
            runtime_minutes: details.runtime.unwrap_or(0).max(0),
            certification,
            original_language: details.original_language.clone().unwrap_or_default(),
            release_date: details.release_date.clone().unwrap_or_default(),
            poster_path,
            poster_full_url,
            adult: details.adult,
        }
    }
}

/// Result of one identifier's lookup. `NotFound` and `Excluded` are terminal;
/// `Transient` is eligible for limited retry by the coordinator.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(NormalizedMovie),
    NotFound,
    Excluded,
    Transient(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(json: serde_json::Value) -> MovieDetails {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn defaults_apply_when_fields_are_absent_or_null() {
        let d = details(serde_json::json!({ "runtime": null }));
        let m = NormalizedMovie::from_details(7, &d, NOT_RATED.into(), "https://img/");

        assert_eq!(m.title, "");
        assert_eq!(m.runtime_minutes, 0);
        assert_eq!(m.original_language, "");
        assert_eq!(m.release_date, "");
        assert_eq!(m.genre_summary, "Unknown");
        assert_eq!(m.poster_path, None);
        assert_eq!(m.poster_full_url, None);
        assert_eq!(m.certification, "NR");
        assert!(!m.adult);
    }

    #[test]
    fn genres_join_and_poster_url_derives_from_path() {
        let d = details(serde_json::json!({
            "title": "Heat",
            "runtime": 170,
            "original_language": "en",
            "release_date": "1995-12-15",
            "genres": [{"id": 80, "name": "Crime"}, {"id": 18, "name": "Drama"}],
            "poster_path": "/heat.jpg",
        }));
        let m = NormalizedMovie::from_details(
            949,
            &d,
            "R".into(),
            "https://image.tmdb.org/t/p/w500",
        );

        assert_eq!(m.genre_summary, "Crime, Drama");
        assert_eq!(m.poster_path.as_deref(), Some("/heat.jpg"));
        assert_eq!(
            m.poster_full_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/heat.jpg")
        );
        assert_eq!(m.certification, "R");
    }

    #[test]
    fn certification_takes_first_non_empty_entry_for_country() {
        let resp: ReleaseDatesResponse = serde_json::from_value(serde_json::json!({
            "results": [
                {"iso_3166_1": "DE", "release_dates": [{"certification": "16"}]},
                {"iso_3166_1": "US", "release_dates": [
                    {"certification": ""},
                    {"certification": "PG-13"},
                ]},
            ]
        }))
        .unwrap();

        assert_eq!(resp.certification_for("US").as_deref(), Some("PG-13"));
        assert_eq!(resp.certification_for("FR"), None);
    }
}
