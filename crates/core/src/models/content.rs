//! Catalogue item model
//!
//! A `CatalogueItem` is the payload stored alongside each vector in the
//! index and mirrored to the relational store. It is assembled from the
//! metadata provider's detail responses, never deserialized from them
//! directly.

use crate::types::ContentType;
use serde::{Deserialize, Serialize};

/// One movie or TV show known to the vector index.
///
/// Unique by `(content_type, tmdb_id)`. `embedding` is always either empty
/// (not yet encoded) or a unit vector of the index dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueItem {
    pub tmdb_id: i64,
    pub content_type: ContentType,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: String,
    pub genres: Vec<String>,
    /// YYYY-MM-DD
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: f32,
    pub vote_count: i64,
    pub popularity: f32,
    pub original_language: Option<String>,
    pub tagline: Option<String>,
    pub keywords: Vec<String>,
    /// Top-billed cast names (TV enrichment only; empty otherwise)
    pub cast: Vec<String>,
    pub network: Option<String>,
    pub embedding: Vec<f32>,
}

impl CatalogueItem {
    pub fn key(&self) -> (ContentType, i64) {
        (self.content_type, self.tmdb_id)
    }

    fn release_year(&self) -> Option<&str> {
        self.release_date.as_deref().map(|d| &d[..d.len().min(4)])
    }

    /// Text representation fed to the sentence encoder.
    ///
    /// Movies: title, overview, genres, year, tagline. TV additionally
    /// appends keywords, top cast and the broadcasting network.
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !self.title.is_empty() {
            parts.push(self.title.clone());
        }
        if !self.overview.is_empty() {
            parts.push(self.overview.clone());
        }
        if !self.genres.is_empty() {
            parts.push(self.genres.join(", "));
        }
        if let Some(year) = self.release_year() {
            if !year.is_empty() {
                parts.push(year.to_string());
            }
        }
        if let Some(tagline) = self.tagline.as_deref() {
            if !tagline.is_empty() {
                parts.push(tagline.to_string());
            }
        }

        if self.content_type == ContentType::Tv {
            if !self.keywords.is_empty() {
                parts.push(self.keywords.join(", "));
            }
            if !self.cast.is_empty() {
                parts.push(format!("Cast: {}", self.cast.join(", ")));
            }
            if let Some(network) = self.network.as_deref() {
                if !network.is_empty() {
                    parts.push(format!("Network: {}", network));
                }
            }
        }

        parts.join(" ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> CatalogueItem {
        CatalogueItem {
            tmdb_id: 550,
            content_type: ContentType::Movie,
            title: "Fight Club".into(),
            original_title: None,
            overview: "An insomniac office worker crosses paths with a soap maker.".into(),
            genres: vec!["Drama".into(), "Thriller".into()],
            release_date: Some("1999-10-15".into()),
            poster_path: Some("/poster.jpg".into()),
            backdrop_path: None,
            vote_average: 8.4,
            vote_count: 27000,
            popularity: 61.0,
            original_language: Some("en".into()),
            tagline: Some("Mischief. Mayhem. Soap.".into()),
            keywords: vec![],
            cast: vec![],
            network: None,
            embedding: vec![],
        }
    }

    #[test]
    fn test_movie_embedding_text() {
        let text = movie().embedding_text();
        assert!(text.starts_with("Fight Club"));
        assert!(text.contains("Drama, Thriller"));
        assert!(text.contains("1999"));
        assert!(text.contains("Mischief. Mayhem. Soap."));
        // Movie text never carries TV-only sections
        assert!(!text.contains("Cast:"));
        assert!(!text.contains("Network:"));
    }

    #[test]
    fn test_tv_embedding_text_includes_cast_and_network() {
        let mut item = movie();
        item.content_type = ContentType::Tv;
        item.keywords = vec!["heist".into()];
        item.cast = vec!["A".into(), "B".into()];
        item.network = Some("HBO".into());

        let text = item.embedding_text();
        assert!(text.contains("heist"));
        assert!(text.contains("Cast: A, B"));
        assert!(text.contains("Network: HBO"));
    }

    #[test]
    fn test_empty_fields_are_skipped() {
        let mut item = movie();
        item.overview.clear();
        item.tagline = None;
        item.genres.clear();
        item.release_date = None;

        assert_eq!(item.embedding_text(), "Fight Club");
    }
}
