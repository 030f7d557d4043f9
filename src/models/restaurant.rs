use serde::{Deserialize, Serialize};

/// A restaurant together with its static slot catalog.
///
/// Deserializes from the seed file format, where cuisines are listed under
/// `cuisine` and the catalog under `daily_slots`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub city: String,
    #[serde(default, alias = "cuisine")]
    pub cuisines: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub cost: Option<i64>,
    pub address: Option<String>,
    pub capacity: Option<i64>,
    pub description: Option<String>,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
    #[serde(default, alias = "daily_slots")]
    pub slots: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_format() {
        let json = r#"{
            "id": 45,
            "name": "Spice Route",
            "city": "Delhi",
            "rating": 4.3,
            "lic_no": "ignored",
            "cuisine": ["North Indian", "Mughlai"],
            "features": ["rooftop"],
            "daily_slots": ["7:00 PM", "7:30 PM"]
        }"#;
        let r: Restaurant = serde_json::from_str(json).unwrap();
        assert_eq!(r.id, 45);
        assert_eq!(r.cuisines, vec!["North Indian", "Mughlai"]);
        assert_eq!(r.slots, vec!["7:00 PM", "7:30 PM"]);
        assert_eq!(r.capacity, None);
    }
}
