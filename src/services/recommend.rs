use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{queries, Store};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub id: String,
    pub name: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub cuisines: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Recommendation {
    pub fn describe(&self) -> String {
        let mut line = format!(
            "{} (ID: {}) - {}",
            self.name.as_deref().unwrap_or("N/A"),
            self.id,
            self.city.as_deref().unwrap_or("N/A"),
        );
        if !self.cuisines.is_empty() {
            line.push_str(&format!("; cuisines: {}", self.cuisines.join(", ")));
        }
        if !self.features.is_empty() {
            line.push_str(&format!("; features: {}", self.features.join(", ")));
        }
        line
    }
}

/// Ranked restaurant suggestions. The order returned is the order shown.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(
        &self,
        query: &str,
        city: Option<&str>,
        cuisine: Option<&str>,
        top_k: usize,
    ) -> anyhow::Result<Vec<Recommendation>>;
}

/// Client for an external search service answering
/// `{"recommendations": [...]}` to a JSON query.
pub struct HttpRecommender {
    url: String,
    client: reqwest::Client,
}

impl HttpRecommender {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct RecommendationResponse {
    recommendations: Vec<Recommendation>,
}

#[async_trait]
impl Recommender for HttpRecommender {
    async fn recommend(
        &self,
        query: &str,
        city: Option<&str>,
        cuisine: Option<&str>,
        top_k: usize,
    ) -> anyhow::Result<Vec<Recommendation>> {
        let body = json!({
            "user_query": query,
            "city": city,
            "cuisine": cuisine,
            "top_k": top_k,
        });

        let resp: RecommendationResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("failed to call recommendation service")?
            .error_for_status()
            .context("recommendation service returned error")?
            .json()
            .await
            .context("failed to parse recommendation response")?;

        Ok(resp.recommendations.into_iter().take(top_k).collect())
    }
}

/// Falls back to the local catalog: restaurants matching city and cuisine,
/// in id order.
pub struct CatalogRecommender {
    store: Store,
}

impl CatalogRecommender {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Recommender for CatalogRecommender {
    async fn recommend(
        &self,
        _query: &str,
        city: Option<&str>,
        cuisine: Option<&str>,
        top_k: usize,
    ) -> anyhow::Result<Vec<Recommendation>> {
        let city = city.map(|c| c.trim().to_string());
        let cuisine = cuisine.map(|c| c.trim().to_string());

        let restaurants = self
            .store
            .call("search_restaurants", move |conn| {
                Ok(queries::search_restaurants(
                    conn,
                    city.as_deref(),
                    cuisine.as_deref(),
                    top_k,
                )?)
            })
            .await?;

        Ok(restaurants
            .into_iter()
            .map(|r| Recommendation {
                id: r.id.to_string(),
                name: Some(r.name),
                city: Some(r.city),
                cuisines: r.cuisines,
                features: r.features,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::Restaurant;

    #[test]
    fn test_describe() {
        let rec = Recommendation {
            id: "45".to_string(),
            name: Some("Spice Route".to_string()),
            city: Some("Delhi".to_string()),
            cuisines: vec!["North Indian".to_string()],
            features: vec![],
        };
        assert_eq!(rec.describe(), "Spice Route (ID: 45) - Delhi; cuisines: North Indian");
    }

    #[tokio::test]
    async fn test_catalog_recommender() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("rec.db"), Duration::from_secs(5)).unwrap();
        let make = |id: i64, city: &str, cuisine: &str| Restaurant {
            id,
            name: format!("Place {id}"),
            city: city.to_string(),
            cuisines: vec![cuisine.to_string()],
            features: vec![],
            rating: None,
            rating_count: None,
            cost: None,
            address: None,
            capacity: None,
            description: None,
            opening_time: None,
            closing_time: None,
            slots: vec![],
        };
        store
            .upsert_restaurants(vec![
                make(1, "Delhi", "Italian"),
                make(2, "Delhi", "Chinese"),
                make(3, "Delhi", "Italian"),
            ])
            .await
            .unwrap();

        let recommender = CatalogRecommender::new(store);
        let recs = recommender
            .recommend("pasta", Some("delhi"), Some("italian"), 3)
            .await
            .unwrap();
        let ids: Vec<_> = recs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
