use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub director: Option<String>,
    pub release_year: Option<i32>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovie {
    pub title: String,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
}

/// In-memory movie list shared by all request handlers.
#[derive(Debug)]
pub struct MovieCatalog {
    movies: RwLock<Vec<Movie>>,
    next_id: AtomicU64,
}

impl MovieCatalog {
    pub fn new() -> Self {
        Self {
            movies: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// A handful of titles so a fresh deployment has something to list.
    pub async fn with_samples() -> Self {
        let catalog = Self::new();
        let samples = [
            ("The Matrix", "Lana Wachowski", 1999),
            ("Spirited Away", "Hayao Miyazaki", 2001),
            ("Arrival", "Denis Villeneuve", 2016),
        ];
        for (title, director, year) in samples {
            catalog
                .add(
                    NewMovie {
                        title: title.to_string(),
                        director: Some(director.to_string()),
                        release_year: Some(year),
                    },
                    "system",
                )
                .await;
        }
        catalog
    }

    pub async fn list(&self) -> Vec<Movie> {
        self.movies.read().await.clone()
    }

    pub async fn add(&self, movie: NewMovie, created_by: &str) -> Movie {
        let movie = Movie {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            title: movie.title.trim().to_string(),
            director: movie.director.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            release_year: movie.release_year,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.movies.write().await.push(movie.clone());
        movie
    }
}

impl Default for MovieCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let catalog = MovieCatalog::new();
        let first = catalog
            .add(
                NewMovie {
                    title: " Heat ".into(),
                    director: None,
                    release_year: Some(1995),
                },
                "admin",
            )
            .await;
        let second = catalog
            .add(
                NewMovie {
                    title: "Alien".into(),
                    director: Some("  ".into()),
                    release_year: None,
                },
                "mod",
            )
            .await;
        assert_eq!(first.id, 1);
        assert_eq!(first.title, "Heat");
        assert_eq!(second.id, 2);
        assert_eq!(second.director, None);
        assert_eq!(catalog.list().await.len(), 2);
    }

    #[tokio::test]
    async fn samples_are_seeded() {
        assert_eq!(MovieCatalog::with_samples().await.list().await.len(), 3);
    }
}
