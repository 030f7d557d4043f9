use chrono::{NaiveDate, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingId, BookingSummary, Conversation, ReservationRequest, Restaurant};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Restaurants ──

pub fn upsert_restaurant(conn: &Connection, r: &Restaurant) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO restaurants (id, name, city, rating, rating_count, cost, address, capacity, description, opening_time, closing_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           city = excluded.city,
           rating = excluded.rating,
           rating_count = excluded.rating_count,
           cost = excluded.cost,
           address = excluded.address,
           capacity = excluded.capacity,
           description = excluded.description,
           opening_time = excluded.opening_time,
           closing_time = excluded.closing_time",
        params![
            r.id,
            r.name,
            r.city,
            r.rating,
            r.rating_count,
            r.cost,
            r.address,
            r.capacity,
            r.description,
            r.opening_time,
            r.closing_time,
        ],
    )?;

    // Catalog and tags are replaced, not merged, so entries dropped from the
    // source stop being offered.
    for table in ["restaurant_cuisines", "restaurant_features", "slots"] {
        conn.execute(
            &format!("DELETE FROM {table} WHERE restaurant_id = ?1"),
            params![r.id],
        )?;
    }

    for cuisine in &r.cuisines {
        let cuisine_id = get_or_create_tag(conn, "cuisines", cuisine)?;
        conn.execute(
            "INSERT OR IGNORE INTO restaurant_cuisines (restaurant_id, cuisine_id) VALUES (?1, ?2)",
            params![r.id, cuisine_id],
        )?;
    }

    for feature in &r.features {
        let feature_id = get_or_create_tag(conn, "features", feature)?;
        conn.execute(
            "INSERT OR IGNORE INTO restaurant_features (restaurant_id, feature_id) VALUES (?1, ?2)",
            params![r.id, feature_id],
        )?;
    }

    for slot in &r.slots {
        conn.execute(
            "INSERT OR IGNORE INTO slots (restaurant_id, label) VALUES (?1, ?2)",
            params![r.id, slot],
        )?;
    }

    Ok(())
}

// `table` is always one of the two tag tables, never user input.
fn get_or_create_tag(conn: &Connection, table: &str, name: &str) -> rusqlite::Result<i64> {
    conn.execute(
        &format!("INSERT INTO {table} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING"),
        params![name],
    )?;
    conn.query_row(
        &format!("SELECT id FROM {table} WHERE name = ?1"),
        params![name],
        |row| row.get(0),
    )
}

pub fn restaurant_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM restaurants WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub fn get_restaurant(conn: &Connection, id: i64) -> rusqlite::Result<Option<Restaurant>> {
    let restaurant = conn
        .query_row(
            "SELECT id, name, city, rating, rating_count, cost, address, capacity, description, opening_time, closing_time
             FROM restaurants WHERE id = ?1",
            params![id],
            |row| {
                Ok(Restaurant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    city: row.get(2)?,
                    rating: row.get(3)?,
                    rating_count: row.get(4)?,
                    cost: row.get(5)?,
                    address: row.get(6)?,
                    capacity: row.get(7)?,
                    description: row.get(8)?,
                    opening_time: row.get(9)?,
                    closing_time: row.get(10)?,
                    cuisines: vec![],
                    features: vec![],
                    slots: vec![],
                })
            },
        )
        .optional()?;

    let Some(mut restaurant) = restaurant else {
        return Ok(None);
    };

    restaurant.cuisines = get_tags(
        conn,
        "SELECT c.name FROM cuisines c JOIN restaurant_cuisines rc ON rc.cuisine_id = c.id
         WHERE rc.restaurant_id = ?1 ORDER BY c.name",
        id,
    )?;
    restaurant.features = get_tags(
        conn,
        "SELECT f.name FROM features f JOIN restaurant_features rf ON rf.feature_id = f.id
         WHERE rf.restaurant_id = ?1 ORDER BY f.name",
        id,
    )?;
    restaurant.slots = get_slot_catalog(conn, id)?;

    Ok(Some(restaurant))
}

fn get_tags(conn: &Connection, sql: &str, restaurant_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![restaurant_id], |row| row.get(0))?;
    rows.collect()
}

/// Resolves a restaurant by exact, case-insensitive name, preferring one in
/// `city` when several share the name.
pub fn find_restaurant_id(
    conn: &Connection,
    name: &str,
    city: Option<&str>,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM restaurants
         WHERE name = ?1 COLLATE NOCASE
         ORDER BY (city = ?2 COLLATE NOCASE) DESC, id ASC
         LIMIT 1",
        params![name.trim(), city.unwrap_or("").trim()],
        |row| row.get(0),
    )
    .optional()
}

pub fn search_restaurants(
    conn: &Connection,
    city: Option<&str>,
    cuisine: Option<&str>,
    limit: usize,
) -> rusqlite::Result<Vec<Restaurant>> {
    let mut stmt = conn.prepare(
        "SELECT r.id FROM restaurants r
         WHERE (?1 IS NULL OR r.city = ?1 COLLATE NOCASE)
           AND (?2 IS NULL OR EXISTS (
                SELECT 1 FROM restaurant_cuisines rc
                JOIN cuisines c ON c.id = rc.cuisine_id
                WHERE rc.restaurant_id = r.id AND c.name = ?2 COLLATE NOCASE))
         ORDER BY r.id ASC
         LIMIT ?3",
    )?;

    let ids = stmt
        .query_map(params![city, cuisine, limit as i64], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut restaurants = vec![];
    for id in ids {
        if let Some(r) = get_restaurant(conn, id)? {
            restaurants.push(r);
        }
    }
    Ok(restaurants)
}

// ── Slots ──

pub fn get_slot_catalog(conn: &Connection, restaurant_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT label FROM slots WHERE restaurant_id = ?1 ORDER BY label ASC")?;
    let rows = stmt.query_map(params![restaurant_id], |row| row.get(0))?;
    rows.collect()
}

pub fn get_booked_slots(
    conn: &Connection,
    restaurant_id: i64,
    date: NaiveDate,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT slot FROM bookings WHERE restaurant_id = ?1 AND date = ?2")?;
    let rows = stmt.query_map(params![restaurant_id, date], |row| row.get(0))?;
    rows.collect()
}

// ── Bookings ──

/// Inserts a booking row. A UNIQUE violation means the key is already taken.
pub fn insert_booking(conn: &Connection, req: &ReservationRequest) -> rusqlite::Result<Booking> {
    let created_at = Utc::now().naive_utc();

    conn.execute(
        "INSERT INTO bookings (restaurant_id, date, slot, contact_name, contact_number, contact_email, party_size, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            req.restaurant_id,
            req.date,
            req.slot,
            req.contact.name,
            req.contact.number,
            req.contact.email,
            req.party_size,
            created_at.format(TS_FORMAT).to_string(),
        ],
    )?;

    Ok(Booking {
        booking_id: conn.last_insert_rowid(),
        restaurant_id: req.restaurant_id,
        date: req.date,
        slot: req.slot.clone(),
        contact_name: req.contact.name.clone(),
        contact_number: req.contact.number.clone(),
        contact_email: req.contact.email.clone(),
        party_size: i64::from(req.party_size),
        created_at: created_at.with_nanosecond(0).unwrap_or(created_at),
    })
}

pub fn get_booking(conn: &Connection, booking_id: BookingId) -> rusqlite::Result<Option<Booking>> {
    conn.query_row(
        "SELECT booking_id, restaurant_id, date, slot, contact_name, contact_number, contact_email, party_size, created_at
         FROM bookings WHERE booking_id = ?1",
        params![booking_id],
        |row| {
            Ok(Booking {
                booking_id: row.get(0)?,
                restaurant_id: row.get(1)?,
                date: row.get(2)?,
                slot: row.get(3)?,
                contact_name: row.get(4)?,
                contact_number: row.get(5)?,
                contact_email: row.get(6)?,
                party_size: row.get(7)?,
                created_at: row.get(8)?,
            })
        },
    )
    .optional()
}

pub fn delete_booking(conn: &Connection, booking_id: BookingId) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "DELETE FROM bookings WHERE booking_id = ?1",
        params![booking_id],
    )?;
    Ok(count > 0)
}

pub fn get_bookings_for_contact(
    conn: &Connection,
    contact_number: &str,
    contact_email: &str,
) -> rusqlite::Result<Vec<BookingSummary>> {
    let mut stmt = conn.prepare(
        "SELECT b.booking_id, b.restaurant_id, r.name, b.date, b.slot
         FROM bookings b
         JOIN restaurants r ON b.restaurant_id = r.id
         WHERE b.contact_number = ?1 AND b.contact_email = ?2
         ORDER BY b.date ASC, b.slot ASC",
    )?;

    let rows = stmt.query_map(params![contact_number, contact_email], |row| {
        Ok(BookingSummary {
            booking_id: row.get(0)?,
            restaurant_id: row.get(1)?,
            restaurant_name: row.get(2)?,
            date: row.get(3)?,
            slot: row.get(4)?,
        })
    })?;
    rows.collect()
}

// ── Conversations ──

pub fn get_conversation(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<Conversation>> {
    let now = Utc::now().naive_utc().format(TS_FORMAT).to_string();
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM conversations WHERE session_id = ?1 AND expires_at > ?2",
            params![session_id, now],
            |row| row.get(0),
        )
        .optional()?;

    Ok(data.and_then(|json| match serde_json::from_str(&json) {
        Ok(conv) => Some(conv),
        Err(e) => {
            tracing::warn!(session = session_id, error = %e, "discarding unreadable conversation");
            None
        }
    }))
}

pub fn save_conversation(conn: &Connection, conv: &Conversation) -> rusqlite::Result<()> {
    let data = serde_json::to_string(conv)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let last_activity = conv.last_activity.format(TS_FORMAT).to_string();
    let expires_at = conv.expires_at.format(TS_FORMAT).to_string();

    conn.execute(
        "INSERT INTO conversations (session_id, stage, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(session_id) DO UPDATE SET
           stage = excluded.stage,
           data = excluded.data,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![conv.session_id, conv.stage.as_str(), data, last_activity, expires_at],
    )?;
    Ok(())
}

pub fn delete_conversation(conn: &Connection, session_id: &str) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "DELETE FROM conversations WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(count > 0)
}

pub fn expire_old_conversations(conn: &Connection) -> rusqlite::Result<usize> {
    let now = Utc::now().naive_utc().format(TS_FORMAT).to_string();
    conn.execute("DELETE FROM conversations WHERE expires_at <= ?1", params![now])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use crate::models::Contact;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn
    }

    fn restaurant(id: i64, name: &str, city: &str, cuisines: &[&str]) -> Restaurant {
        Restaurant {
            id,
            name: name.to_string(),
            city: city.to_string(),
            cuisines: cuisines.iter().map(|s| s.to_string()).collect(),
            features: vec!["rooftop".to_string()],
            rating: Some(4.1),
            rating_count: None,
            cost: None,
            address: None,
            capacity: Some(40),
            description: None,
            opening_time: None,
            closing_time: None,
            slots: vec!["8:00 PM".to_string(), "7:00 PM".to_string()],
        }
    }

    fn request(slot: &str) -> ReservationRequest {
        ReservationRequest {
            restaurant_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 6, 6).unwrap(),
            slot: slot.to_string(),
            contact: Contact {
                name: "Asha Rao".to_string(),
                number: "9876543210".to_string(),
                email: "asha@example.com".to_string(),
            },
            party_size: 2,
        }
    }

    #[test]
    fn test_upsert_and_get_restaurant() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Spice Route", "Delhi", &["North Indian"])).unwrap();
        upsert_restaurant(&conn, &restaurant(1, "Spice Route", "Delhi", &["north indian", "Mughlai"])).unwrap();

        let r = get_restaurant(&conn, 1).unwrap().unwrap();
        assert_eq!(r.cuisines, vec!["Mughlai", "North Indian"]);
        assert_eq!(r.slots, vec!["7:00 PM", "8:00 PM"]);
        assert_eq!(r.capacity, Some(40));
        assert!(get_restaurant(&conn, 2).unwrap().is_none());
    }

    #[test]
    fn test_reseed_replaces_catalog_and_tags() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Spice Route", "Delhi", &["North Indian", "Mughlai"])).unwrap();
        insert_booking(&conn, &request("8:00 PM")).unwrap();

        let mut reseeded = restaurant(1, "Spice Route", "Delhi", &["North Indian"]);
        reseeded.features = vec![];
        reseeded.slots = vec!["7:00 PM".to_string()];
        upsert_restaurant(&conn, &reseeded).unwrap();

        let r = get_restaurant(&conn, 1).unwrap().unwrap();
        assert_eq!(r.slots, vec!["7:00 PM"]);
        assert_eq!(r.cuisines, vec!["North Indian"]);
        assert!(r.features.is_empty());

        let date = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap();
        assert_eq!(get_booked_slots(&conn, 1, date).unwrap(), vec!["8:00 PM"]);
    }

    #[test]
    fn test_find_restaurant_prefers_city() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Roma", "Delhi", &["Italian"])).unwrap();
        upsert_restaurant(&conn, &restaurant(2, "Roma", "Mumbai", &["Italian"])).unwrap();

        assert_eq!(find_restaurant_id(&conn, "roma", Some("mumbai")).unwrap(), Some(2));
        assert_eq!(find_restaurant_id(&conn, "ROMA ", None).unwrap(), Some(1));
        assert_eq!(find_restaurant_id(&conn, "Napoli", None).unwrap(), None);
    }

    #[test]
    fn test_search_restaurants_filters() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Roma", "Delhi", &["Italian"])).unwrap();
        upsert_restaurant(&conn, &restaurant(2, "Dragon", "Delhi", &["Chinese"])).unwrap();
        upsert_restaurant(&conn, &restaurant(3, "Trattoria", "Mumbai", &["Italian"])).unwrap();

        let found = search_restaurants(&conn, Some("delhi"), Some("italian"), 3).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Roma");

        let all = search_restaurants(&conn, None, None, 2).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_insert_duplicate_key_fails() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Roma", "Delhi", &["Italian"])).unwrap();

        let first = insert_booking(&conn, &request("7:00 PM")).unwrap();
        let err = insert_booking(&conn, &request("7:00 PM")).unwrap_err();
        assert!(crate::errors::is_unique_violation(&err));

        let stored = get_booking(&conn, first.booking_id).unwrap().unwrap();
        assert_eq!(stored.slot, "7:00 PM");
        assert_eq!(stored.party_size, 2);
        assert_eq!(stored, first);
    }

    #[test]
    fn test_booked_slots_and_history() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Roma", "Delhi", &["Italian"])).unwrap();
        let booking = insert_booking(&conn, &request("8:00 PM")).unwrap();

        let booked = get_booked_slots(&conn, 1, NaiveDate::from_ymd_opt(2025, 6, 6).unwrap()).unwrap();
        assert_eq!(booked, vec!["8:00 PM"]);

        let history = get_bookings_for_contact(&conn, "9876543210", "asha@example.com").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].restaurant_name, "Roma");
        assert!(get_bookings_for_contact(&conn, "9876543210", "other@example.com").unwrap().is_empty());

        assert!(delete_booking(&conn, booking.booking_id).unwrap());
        assert!(!delete_booking(&conn, booking.booking_id).unwrap());
    }

    #[test]
    fn test_booking_ids_are_not_reused() {
        let conn = setup_db();
        upsert_restaurant(&conn, &restaurant(1, "Roma", "Delhi", &["Italian"])).unwrap();
        let first = insert_booking(&conn, &request("7:00 PM")).unwrap();
        delete_booking(&conn, first.booking_id).unwrap();
        let second = insert_booking(&conn, &request("7:00 PM")).unwrap();
        assert!(second.booking_id > first.booking_id);
    }

    #[test]
    fn test_conversation_save_and_expire() {
        let conn = setup_db();
        let mut conv = Conversation::new("abc", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 30);
        save_conversation(&conn, &conv).unwrap();
        assert!(get_conversation(&conn, "abc").unwrap().is_some());

        conv.expires_at = Utc::now().naive_utc() - chrono::Duration::minutes(1);
        save_conversation(&conn, &conv).unwrap();
        assert!(get_conversation(&conn, "abc").unwrap().is_none());
        assert_eq!(expire_old_conversations(&conn).unwrap(), 1);
        assert!(!delete_conversation(&conn, "abc").unwrap());
    }
}
