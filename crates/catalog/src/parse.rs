//! Metadata payload parsing
//!
//! Converts raw provider JSON into `CatalogueItem` records. Parsers are
//! lenient: a missing optional field becomes `None`, but an item without an
//! id or title is rejected.

use mood_gateway_core::{CatalogueItem, ContentType};
use serde_json::Value;

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn f32_field(value: &Value, key: &str) -> f32 {
    value.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0) as f32
}

fn name_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| entry.get("name").and_then(|n| n.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a full detail payload (with credits and keywords appended) into a
/// catalogue item. The embedding is left empty; encoding happens later.
pub fn parse_detail(content_type: ContentType, data: &Value) -> Option<CatalogueItem> {
    let tmdb_id = data.get("id").and_then(|v| v.as_i64())?;

    let (title, original_title, release_date) = match content_type {
        ContentType::Movie => (
            str_field(data, "title")?,
            str_field(data, "original_title"),
            str_field(data, "release_date"),
        ),
        ContentType::Tv => (
            str_field(data, "name")?,
            str_field(data, "original_name"),
            str_field(data, "first_air_date"),
        ),
    };

    let keywords = match content_type {
        // Movie keyword payloads nest under "keywords.keywords", TV under
        // "keywords.results".
        ContentType::Movie => name_list(data.pointer("/keywords/keywords")),
        ContentType::Tv => name_list(data.pointer("/keywords/results")),
    };

    let cast: Vec<String> = data
        .pointer("/credits/cast")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .take(5)
                .filter_map(|c| c.get("name").and_then(|n| n.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    let network = data
        .pointer("/networks/0/name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Some(CatalogueItem {
        tmdb_id,
        content_type,
        title,
        original_title,
        overview: str_field(data, "overview").unwrap_or_default(),
        genres: name_list(data.get("genres")),
        release_date,
        poster_path: str_field(data, "poster_path"),
        backdrop_path: str_field(data, "backdrop_path"),
        vote_average: f32_field(data, "vote_average"),
        vote_count: data.get("vote_count").and_then(|v| v.as_i64()).unwrap_or(0),
        popularity: f32_field(data, "popularity"),
        original_language: str_field(data, "original_language"),
        tagline: str_field(data, "tagline"),
        keywords,
        cast,
        network,
        embedding: Vec::new(),
    })
}

/// Lightweight entry from a popular/discover/search results list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListEntry {
    pub tmdb_id: i64,
    pub vote_average: f32,
}

/// Extract `(id, vote_average)` pairs from a paged list response.
pub fn list_entries(data: &Value) -> Vec<ListEntry> {
    data.get("results")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let tmdb_id = item.get("id").and_then(|v| v.as_i64())?;
                    Some(ListEntry {
                        tmdb_id,
                        vote_average: f32_field(item, "vote_average"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Total pages reported by a paged list response.
pub fn total_pages(data: &Value) -> u32 {
    data.get("total_pages")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn movie_detail() -> Value {
        json!({
            "id": 550,
            "title": "Fight Club",
            "original_title": "Fight Club",
            "overview": "An insomniac office worker.",
            "genres": [{"id": 18, "name": "Drama"}],
            "release_date": "1999-10-15",
            "poster_path": "/poster.jpg",
            "backdrop_path": "/backdrop.jpg",
            "vote_average": 8.4,
            "vote_count": 27000,
            "popularity": 61.4,
            "original_language": "en",
            "tagline": "Mischief. Mayhem. Soap.",
            "keywords": {"keywords": [{"id": 1, "name": "insomnia"}]},
            "credits": {"cast": [
                {"name": "Edward Norton"}, {"name": "Brad Pitt"}, {"name": "Helena Bonham Carter"},
                {"name": "Meat Loaf"}, {"name": "Jared Leto"}, {"name": "Zach Grenier"}
            ]}
        })
    }

    #[test]
    fn test_parse_movie_detail() {
        let item = parse_detail(ContentType::Movie, &movie_detail()).unwrap();
        assert_eq!(item.tmdb_id, 550);
        assert_eq!(item.title, "Fight Club");
        assert_eq!(item.genres, vec!["Drama"]);
        assert_eq!(item.keywords, vec!["insomnia"]);
        // Cast is capped at the top five names
        assert_eq!(item.cast.len(), 5);
        assert!(item.embedding.is_empty());
    }

    #[test]
    fn test_parse_tv_detail_uses_name_and_networks() {
        let data = json!({
            "id": 1396,
            "name": "Breaking Bad",
            "overview": "A chemistry teacher.",
            "first_air_date": "2008-01-20",
            "genres": [{"name": "Drama"}],
            "vote_average": 8.9,
            "networks": [{"name": "AMC"}],
            "keywords": {"results": [{"name": "drug cartel"}]}
        });

        let item = parse_detail(ContentType::Tv, &data).unwrap();
        assert_eq!(item.title, "Breaking Bad");
        assert_eq!(item.release_date.as_deref(), Some("2008-01-20"));
        assert_eq!(item.network.as_deref(), Some("AMC"));
        assert_eq!(item.keywords, vec!["drug cartel"]);
    }

    #[test]
    fn test_parse_rejects_missing_id_or_title() {
        assert!(parse_detail(ContentType::Movie, &json!({"title": "x"})).is_none());
        assert!(parse_detail(ContentType::Movie, &json!({"id": 5})).is_none());
    }

    #[test]
    fn test_list_entries() {
        let data = json!({
            "page": 1,
            "total_pages": 500,
            "results": [
                {"id": 1, "vote_average": 7.2},
                {"id": 2, "vote_average": 5.1},
                {"vote_average": 9.0}
            ]
        });

        let entries = list_entries(&data);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tmdb_id, 1);
        assert!((entries[1].vote_average - 5.1).abs() < 1e-6);
        assert_eq!(total_pages(&data), 500);
    }
}
