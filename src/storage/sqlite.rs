//! SQLite storage backend

use super::traits::{DomainStore, ExtractFilter, OpenStore, StorageError, StorageResult, StoreCounts};
use crate::aggregate::{Aggregates, DishAttributes, OccurrenceSentiment, ScoreInputs};
use crate::model::{
    AliasCandidate, AliasKind, AliasMapping, Dish, DishId, KeywordCategory, KeywordId, Polarity,
    RestaurantId, ReviewDishId, ReviewExtract, SourceRef,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed domain store
///
/// One database file holds extracts, entities, links and alias tables.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema. Safe to run on an existing database.
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Raw extraction text, one row per processed review
            CREATE TABLE IF NOT EXISTS review_extracts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_type TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                data_extract TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_review_extracts_source
                ON review_extracts(source_type, source_id);

            CREATE TABLE IF NOT EXISTS restaurants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                cuisine TEXT,
                restriction TEXT,
                menu_size INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS restaurant_locations (
                restaurant_id INTEGER NOT NULL,
                location_name TEXT NOT NULL,
                PRIMARY KEY (restaurant_id, location_name),
                FOREIGN KEY (restaurant_id) REFERENCES restaurants(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS dishes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                restaurant_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                cuisine TEXT,
                restriction TEXT,
                positive_score INTEGER NOT NULL DEFAULT 0,
                negative_score INTEGER NOT NULL DEFAULT 0,
                total_score REAL NOT NULL DEFAULT 0,
                UNIQUE (restaurant_id, name),
                FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
            );

            CREATE TABLE IF NOT EXISTS keywords (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                keyword TEXT NOT NULL,
                category TEXT NOT NULL,
                sentiment TEXT NOT NULL,
                UNIQUE (keyword, category, sentiment)
            );

            CREATE TABLE IF NOT EXISTS dish_keywords (
                dish_id INTEGER NOT NULL,
                keyword_id INTEGER NOT NULL,
                frequency INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (dish_id, keyword_id),
                FOREIGN KEY (dish_id) REFERENCES dishes(id) ON DELETE CASCADE,
                FOREIGN KEY (keyword_id) REFERENCES keywords(id) ON DELETE CASCADE
            );

            -- One row per (review, dish): the idempotency key
            CREATE TABLE IF NOT EXISTS review_dishes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dish_id INTEGER NOT NULL,
                restaurant_id INTEGER NOT NULL,
                source_type TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                UNIQUE (source_type, source_id, dish_id),
                FOREIGN KEY (dish_id) REFERENCES dishes(id) ON DELETE CASCADE,
                FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
            );
            CREATE INDEX IF NOT EXISTS idx_review_dishes_dish
                ON review_dishes(dish_id);

            CREATE TABLE IF NOT EXISTS review_dish_keywords (
                review_dish_id INTEGER NOT NULL,
                keyword_id INTEGER NOT NULL,
                PRIMARY KEY (review_dish_id, keyword_id),
                FOREIGN KEY (review_dish_id) REFERENCES review_dishes(id) ON DELETE CASCADE,
                FOREIGN KEY (keyword_id) REFERENCES keywords(id) ON DELETE CASCADE
            );

            -- Live aliases consulted by canonicalization
            CREATE TABLE IF NOT EXISTS alias_mappings (
                kind TEXT NOT NULL,
                alias TEXT NOT NULL,
                canonical TEXT NOT NULL,
                PRIMARY KEY (kind, alias)
            );

            -- Merge proposals awaiting curation
            CREATE TABLE IF NOT EXISTS alias_candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                cluster_id INTEGER NOT NULL,
                category TEXT,
                canonical TEXT NOT NULL,
                member TEXT NOT NULL,
                support INTEGER NOT NULL,
                location_name TEXT,
                proposed INTEGER NOT NULL DEFAULT 1,
                accept INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_alias_candidates_cluster
                ON alias_candidates(kind, cluster_id);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL lets incremental runs read while another writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(format!("{raw}: {e}")))
    }

    fn parse_category(raw: &str) -> StorageResult<KeywordCategory> {
        KeywordCategory::from_str(raw).ok_or_else(|| StorageError::InvalidValue {
            column: "category",
            value: raw.to_string(),
        })
    }

    fn parse_polarity(raw: &str) -> StorageResult<Polarity> {
        Polarity::from_str(raw).ok_or_else(|| StorageError::InvalidValue {
            column: "sentiment",
            value: raw.to_string(),
        })
    }

    fn row_to_extract(
        id: i64,
        source_type: String,
        source_id: i64,
        data_extract: String,
        created_at: String,
    ) -> StorageResult<ReviewExtract> {
        Ok(ReviewExtract {
            id,
            source: SourceRef::new(source_type, source_id),
            data_extract,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

type ExtractRow = (i64, String, i64, String, String);

fn extract_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

type CandidateRow = (
    String,
    i64,
    Option<String>,
    String,
    String,
    i64,
    Option<String>,
    bool,
    bool,
);

impl DomainStore for SqliteStore {
    // === Review Extracts ===

    fn insert_extract(&self, source: &SourceRef, data_extract: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_extracts (source_type, source_id, data_extract, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source.source_type,
                source.source_id,
                data_extract,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn latest_extract(&self, source: &SourceRef) -> StorageResult<Option<ReviewExtract>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, source_type, source_id, data_extract, created_at
                 FROM review_extracts WHERE source_type = ?1 AND source_id = ?2
                 ORDER BY id DESC LIMIT 1",
                params![source.source_type, source.source_id],
                extract_row,
            )
            .optional()?;
        row.map(|(id, st, sid, data, created)| Self::row_to_extract(id, st, sid, data, created))
            .transpose()
    }

    fn list_extracts(&self, filter: &ExtractFilter) -> StorageResult<Vec<ReviewExtract>> {
        let conn = self.conn()?;

        let mut sql = String::from(
            "SELECT id, source_type, source_id, data_extract, created_at FROM review_extracts",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref source_type) = filter.source_type {
            sql.push_str(" WHERE source_type = ?");
            params_vec.push(Box::new(source_type.clone()));
        }
        sql.push_str(" ORDER BY id");

        // SQLite needs a LIMIT for OFFSET; -1 means unbounded
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, filter.offset));

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), extract_row)?;

        let mut extracts = Vec::new();
        for row in rows {
            let (id, st, sid, data, created) = row?;
            extracts.push(Self::row_to_extract(id, st, sid, data, created)?);
        }
        Ok(extracts)
    }

    // === Restaurants ===

    fn find_restaurant(&self, name: &str) -> StorageResult<Option<RestaurantId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM restaurants WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(RestaurantId))
    }

    fn insert_restaurant(&self, name: &str) -> StorageResult<RestaurantId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO restaurants (name, menu_size) VALUES (?1, 0)
             ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM restaurants WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(RestaurantId(id))
    }

    fn insert_restaurant_location(
        &self,
        restaurant_id: RestaurantId,
        location_name: &str,
    ) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO restaurant_locations (restaurant_id, location_name)
             VALUES (?1, ?2)",
            params![restaurant_id.0, location_name],
        )?;
        Ok(rows > 0)
    }

    fn has_restaurant_location(
        &self,
        restaurant_id: RestaurantId,
        location_name: &str,
    ) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM restaurant_locations
                           WHERE restaurant_id = ?1 AND location_name = ?2)",
            params![restaurant_id.0, location_name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn restaurants_without_locations(&self) -> StorageResult<Vec<(RestaurantId, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.name FROM restaurants r
             WHERE NOT EXISTS (SELECT 1 FROM restaurant_locations l WHERE l.restaurant_id = r.id)
             ORDER BY r.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((RestaurantId(row.get::<_, i64>(0)?), row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // === Dishes ===

    fn find_dish(&self, restaurant_id: RestaurantId, name: &str) -> StorageResult<Option<Dish>> {
        let conn = self.conn()?;
        let dish = conn
            .query_row(
                "SELECT id, restaurant_id, name, cuisine, restriction,
                        positive_score, negative_score, total_score
                 FROM dishes WHERE restaurant_id = ?1 AND name = ?2",
                params![restaurant_id.0, name],
                |row| {
                    Ok(Dish {
                        id: DishId(row.get(0)?),
                        restaurant_id: RestaurantId(row.get(1)?),
                        name: row.get(2)?,
                        cuisine: row.get(3)?,
                        restriction: row.get(4)?,
                        positive_score: row.get(5)?,
                        negative_score: row.get(6)?,
                        total_score: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(dish)
    }

    fn insert_dish(
        &self,
        restaurant_id: RestaurantId,
        name: &str,
        cuisine: Option<&str>,
        restriction: Option<&str>,
    ) -> StorageResult<DishId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO dishes (restaurant_id, name, cuisine, restriction,
                                 positive_score, negative_score, total_score)
             VALUES (?1, ?2, ?3, ?4, 0, 0, 0)
             ON CONFLICT(restaurant_id, name) DO NOTHING",
            params![restaurant_id.0, name, cuisine, restriction],
        )?;
        let id = conn.query_row(
            "SELECT id FROM dishes WHERE restaurant_id = ?1 AND name = ?2",
            params![restaurant_id.0, name],
            |row| row.get(0),
        )?;
        Ok(DishId(id))
    }

    fn backfill_dish(
        &self,
        dish_id: DishId,
        cuisine: Option<&str>,
        restriction: Option<&str>,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE dishes
             SET cuisine = COALESCE(cuisine, ?2),
                 restriction = COALESCE(restriction, ?3)
             WHERE id = ?1",
            params![dish_id.0, cuisine, restriction],
        )?;
        Ok(())
    }

    // === Keywords ===

    fn find_keyword(
        &self,
        text: &str,
        category: KeywordCategory,
        sentiment: Polarity,
    ) -> StorageResult<Option<KeywordId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM keywords WHERE keyword = ?1 AND category = ?2 AND sentiment = ?3",
                params![text, category.as_str(), sentiment.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(KeywordId))
    }

    fn insert_keyword(
        &self,
        text: &str,
        category: KeywordCategory,
        sentiment: Polarity,
    ) -> StorageResult<KeywordId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO keywords (keyword, category, sentiment) VALUES (?1, ?2, ?3)
             ON CONFLICT(keyword, category, sentiment) DO NOTHING",
            params![text, category.as_str(), sentiment.as_str()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM keywords WHERE keyword = ?1 AND category = ?2 AND sentiment = ?3",
            params![text, category.as_str(), sentiment.as_str()],
            |row| row.get(0),
        )?;
        Ok(KeywordId(id))
    }

    // === Review Links ===

    fn find_review_dish(
        &self,
        source: &SourceRef,
        dish_id: DishId,
    ) -> StorageResult<Option<ReviewDishId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM review_dishes
                 WHERE source_type = ?1 AND source_id = ?2 AND dish_id = ?3",
                params![source.source_type, source.source_id, dish_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(ReviewDishId))
    }

    fn insert_review_dish(
        &self,
        dish_id: DishId,
        restaurant_id: RestaurantId,
        source: &SourceRef,
    ) -> StorageResult<Option<ReviewDishId>> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO review_dishes (dish_id, restaurant_id, source_type, source_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![dish_id.0, restaurant_id.0, source.source_type, source.source_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(ReviewDishId(conn.last_insert_rowid())))
    }

    fn has_review_dishes(&self, source: &SourceRef) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM review_dishes WHERE source_type = ?1 AND source_id = ?2)",
            params![source.source_type, source.source_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn link_review_dish_keyword(
        &self,
        review_dish_id: ReviewDishId,
        keyword_id: KeywordId,
    ) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO review_dish_keywords (review_dish_id, keyword_id) VALUES (?1, ?2)",
            params![review_dish_id.0, keyword_id.0],
        )?;
        Ok(rows > 0)
    }

    fn bump_dish_keyword(&self, dish_id: DishId, keyword_id: KeywordId) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO dish_keywords (dish_id, keyword_id, frequency) VALUES (?1, ?2, 1)
             ON CONFLICT(dish_id, keyword_id) DO UPDATE SET frequency = frequency + 1",
            params![dish_id.0, keyword_id.0],
        )?;
        Ok(())
    }

    // === Aggregates ===

    fn load_score_inputs(&self) -> StorageResult<ScoreInputs> {
        let conn = self.conn()?;

        let restaurants = {
            let mut stmt = conn.prepare("SELECT id FROM restaurants")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.map(|r| r.map(RestaurantId))
                .collect::<Result<Vec<_>, _>>()?
        };

        let dishes = {
            let mut stmt = conn.prepare("SELECT id, restaurant_id, cuisine, restriction FROM dishes")?;
            let rows = stmt.query_map([], |row| {
                Ok(DishAttributes {
                    dish_id: DishId(row.get(0)?),
                    restaurant_id: RestaurantId(row.get(1)?),
                    cuisine: row.get(2)?,
                    restriction: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let raw_links = {
            let mut stmt = conn.prepare(
                "SELECT rd.dish_id, rd.id, k.sentiment
                 FROM review_dish_keywords rk
                 JOIN review_dishes rd ON rd.id = rk.review_dish_id
                 JOIN keywords k ON k.id = rk.keyword_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut links = Vec::with_capacity(raw_links.len());
        for (dish_id, review_dish_id, sentiment) in raw_links {
            links.push(OccurrenceSentiment {
                dish_id: DishId(dish_id),
                review_dish_id: ReviewDishId(review_dish_id),
                sentiment: Self::parse_polarity(&sentiment)?,
            });
        }

        Ok(ScoreInputs {
            restaurants,
            dishes,
            links,
        })
    }

    fn write_aggregates(&self, aggregates: &Aggregates) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut update_dish = tx.prepare(
                "UPDATE dishes SET positive_score = ?2, negative_score = ?3, total_score = ?4
                 WHERE id = ?1",
            )?;
            for (id, score) in &aggregates.dishes {
                update_dish.execute(params![
                    id.0,
                    score.positive_score,
                    score.negative_score,
                    score.total_score
                ])?;
            }

            let mut update_restaurant = tx.prepare(
                "UPDATE restaurants SET menu_size = ?2, cuisine = ?3, restriction = ?4
                 WHERE id = ?1",
            )?;
            for (id, summary) in &aggregates.restaurants {
                update_restaurant.execute(params![
                    id.0,
                    summary.menu_size,
                    summary.cuisine,
                    summary.restriction
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // === Aliases ===

    fn load_alias_mappings(&self, kind: AliasKind) -> StorageResult<Vec<AliasMapping>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT alias, canonical FROM alias_mappings WHERE kind = ?1 ORDER BY alias",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], |row| {
            Ok(AliasMapping::new(kind, row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn upsert_alias_mapping(&self, mapping: &AliasMapping) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alias_mappings (kind, alias, canonical) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind, alias) DO UPDATE SET canonical = excluded.canonical",
            params![mapping.kind.as_str(), mapping.alias, mapping.canonical],
        )?;
        Ok(())
    }

    fn dish_name_support(&self) -> StorageResult<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.name, COUNT(r.id)
             FROM dishes d LEFT JOIN review_dishes r ON r.dish_id = d.id
             GROUP BY d.name ORDER BY d.name",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn keyword_support(&self, category: KeywordCategory) -> StorageResult<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT k.keyword, COALESCE(SUM(dk.frequency), 0)
             FROM keywords k LEFT JOIN dish_keywords dk ON dk.keyword_id = k.id
             WHERE k.category = ?1
             GROUP BY k.keyword ORDER BY k.keyword",
        )?;
        let rows = stmt.query_map(params![category.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn replace_alias_candidates(
        &self,
        kind: AliasKind,
        candidates: &[AliasCandidate],
    ) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM alias_candidates WHERE kind = ?1", params![kind.as_str()])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO alias_candidates
                    (kind, cluster_id, category, canonical, member, support,
                     location_name, proposed, accept)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for c in candidates {
                insert.execute(params![
                    kind.as_str(),
                    c.cluster_id,
                    c.category.map(|cat| cat.as_str()),
                    c.canonical,
                    c.member,
                    c.support,
                    c.location_name,
                    c.proposed,
                    c.accept
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_alias_candidates(&self, kind: AliasKind) -> StorageResult<Vec<AliasCandidate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, cluster_id, category, canonical, member, support,
                    location_name, proposed, accept
             FROM alias_candidates WHERE kind = ?1 ORDER BY cluster_id, id",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], |row| -> rusqlite::Result<CandidateRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (kind_raw, cluster_id, category, canonical, member, support, location_name, proposed, accept) =
                row?;
            let kind = AliasKind::from_str(&kind_raw).ok_or_else(|| StorageError::InvalidValue {
                column: "kind",
                value: kind_raw.clone(),
            })?;
            candidates.push(AliasCandidate {
                kind,
                cluster_id,
                category: category.as_deref().map(Self::parse_category).transpose()?,
                canonical,
                member,
                support,
                location_name,
                proposed,
                accept,
            });
        }
        Ok(candidates)
    }

    fn set_candidate_accept(
        &self,
        kind: AliasKind,
        cluster_id: i64,
        member: Option<&str>,
        accept: bool,
    ) -> StorageResult<usize> {
        let conn = self.conn()?;
        let rows = match member {
            Some(member) => conn.execute(
                "UPDATE alias_candidates SET accept = ?4
                 WHERE kind = ?1 AND cluster_id = ?2 AND member = ?3",
                params![kind.as_str(), cluster_id, member, accept],
            )?,
            None => conn.execute(
                "UPDATE alias_candidates SET accept = ?3 WHERE kind = ?1 AND cluster_id = ?2",
                params![kind.as_str(), cluster_id, accept],
            )?,
        };
        Ok(rows)
    }

    // === Administration ===

    fn reset_dish_tables(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            BEGIN;
            DELETE FROM review_dish_keywords;
            DELETE FROM review_dishes;
            DELETE FROM dish_keywords;
            DELETE FROM dishes;
            UPDATE restaurants SET menu_size = 0, cuisine = NULL, restriction = NULL;
            COMMIT;
            "#,
        )?;
        Ok(())
    }

    fn counts(&self) -> StorageResult<StoreCounts> {
        let conn = self.conn()?;
        let count = |table: &str| -> StorageResult<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(StoreCounts {
            review_extracts: count("review_extracts")?,
            restaurants: count("restaurants")?,
            dishes: count("dishes")?,
            keywords: count("keywords")?,
            review_dishes: count("review_dishes")?,
            review_dish_keywords: count("review_dish_keywords")?,
            dish_keywords: count("dish_keywords")?,
            alias_mappings: count("alias_mappings")?,
            alias_candidates: count("alias_candidates")?,
            restaurant_locations: count("restaurant_locations")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{DishScore, RestaurantSummary};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_extract_round_trip_and_latest() {
        let store = create_test_store();
        let src = SourceRef::web(7);
        store.insert_extract(&src, "[]").unwrap();
        let id = store.insert_extract(&src, "[{\"dish\": \"x\"}]").unwrap();
        store.insert_extract(&SourceRef::user(7), "[]").unwrap();

        let latest = store.latest_extract(&src).unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.source, src);
        assert!(latest.data_extract.contains("dish"));
        assert!(store.latest_extract(&SourceRef::web(8)).unwrap().is_none());
    }

    #[test]
    fn test_list_extracts_filter_offset_limit() {
        let store = create_test_store();
        for i in 0..5 {
            store.insert_extract(&SourceRef::web(i), "[]").unwrap();
            store.insert_extract(&SourceRef::user(i), "[]").unwrap();
        }
        assert_eq!(store.list_extracts(&ExtractFilter::new()).unwrap().len(), 10);

        let web = store
            .list_extracts(&ExtractFilter::new().with_source_type("web").with_offset(1).with_limit(2))
            .unwrap();
        let ids: Vec<i64> = web.iter().map(|e| e.source.source_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(web.iter().all(|e| e.source.source_type == "web"));

        let tail = store.list_extracts(&ExtractFilter::new().with_offset(8)).unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn test_restaurant_insert_is_idempotent() {
        let store = create_test_store();
        let a = store.insert_restaurant("ร้านป้าแดง").unwrap();
        let b = store.insert_restaurant("ร้านป้าแดง").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.find_restaurant("ร้านป้าแดง").unwrap(), Some(a));
        assert_eq!(store.find_restaurant("other").unwrap(), None);
    }

    #[test]
    fn test_dish_backfill_never_overwrites() {
        let store = create_test_store();
        let r = store.insert_restaurant("A").unwrap();
        let d = store.insert_dish(r, "ข้าวผัด", None, Some("halal")).unwrap();

        store.backfill_dish(d, Some("thai"), Some("vegan")).unwrap();
        let dish = store.find_dish(r, "ข้าวผัด").unwrap().unwrap();
        assert_eq!(dish.cuisine.as_deref(), Some("thai"));
        assert_eq!(dish.restriction.as_deref(), Some("halal"));

        store.backfill_dish(d, Some("chinese"), None).unwrap();
        let dish = store.find_dish(r, "ข้าวผัด").unwrap().unwrap();
        assert_eq!(dish.cuisine.as_deref(), Some("thai"));
    }

    #[test]
    fn test_same_dish_name_in_two_restaurants() {
        let store = create_test_store();
        let a = store.insert_restaurant("A").unwrap();
        let b = store.insert_restaurant("B").unwrap();
        let da = store.insert_dish(a, "ส้มตำ", None, None).unwrap();
        let db = store.insert_dish(b, "ส้มตำ", None, None).unwrap();
        assert_ne!(da, db);
        assert_eq!(store.insert_dish(a, "ส้มตำ", None, None).unwrap(), da);
    }

    #[test]
    fn test_review_dish_unique_per_source_and_dish() {
        let store = create_test_store();
        let r = store.insert_restaurant("A").unwrap();
        let d = store.insert_dish(r, "ลาบหมู", None, None).unwrap();
        let src = SourceRef::web(1);

        let first = store.insert_review_dish(d, r, &src).unwrap();
        assert!(first.is_some());
        assert_eq!(store.insert_review_dish(d, r, &src).unwrap(), None);
        assert_eq!(store.find_review_dish(&src, d).unwrap(), first);
        assert!(store.has_review_dishes(&src).unwrap());
        assert!(!store.has_review_dishes(&SourceRef::user(1)).unwrap());

        // Same id in another source space is a different review
        assert!(store.insert_review_dish(d, r, &SourceRef::user(1)).unwrap().is_some());
    }

    #[test]
    fn test_keyword_links_and_frequency() {
        let store = create_test_store();
        let r = store.insert_restaurant("A").unwrap();
        let d = store.insert_dish(r, "ลาบหมู", None, None).unwrap();
        let rd = store.insert_review_dish(d, r, &SourceRef::web(1)).unwrap().unwrap();
        let k = store
            .insert_keyword("อร่อย", KeywordCategory::Flavor, Polarity::Positive)
            .unwrap();
        assert_eq!(
            store.find_keyword("อร่อย", KeywordCategory::Flavor, Polarity::Positive).unwrap(),
            Some(k)
        );
        assert_eq!(
            store.find_keyword("อร่อย", KeywordCategory::Others, Polarity::Positive).unwrap(),
            None
        );

        assert!(store.link_review_dish_keyword(rd, k).unwrap());
        assert!(!store.link_review_dish_keyword(rd, k).unwrap());
        store.bump_dish_keyword(d, k).unwrap();
        store.bump_dish_keyword(d, k).unwrap();

        let support = store.keyword_support(KeywordCategory::Flavor).unwrap();
        assert_eq!(support, vec![("อร่อย".to_string(), 2)]);
    }

    #[test]
    fn test_score_inputs_and_aggregate_write() {
        let store = create_test_store();
        let r = store.insert_restaurant("A").unwrap();
        let d = store.insert_dish(r, "ต้มยำกุ้ง", Some("thai"), None).unwrap();
        let rd = store.insert_review_dish(d, r, &SourceRef::web(1)).unwrap().unwrap();
        let k = store
            .insert_keyword("เค็ม", KeywordCategory::Flavor, Polarity::Negative)
            .unwrap();
        store.link_review_dish_keyword(rd, k).unwrap();

        let inputs = store.load_score_inputs().unwrap();
        assert_eq!(inputs.restaurants, vec![r]);
        assert_eq!(inputs.dishes.len(), 1);
        assert_eq!(inputs.links.len(), 1);
        assert_eq!(inputs.links[0].sentiment, Polarity::Negative);

        let mut aggregates = Aggregates::default();
        aggregates.dishes.insert(
            d,
            DishScore {
                positive_score: 0,
                negative_score: 1,
                total_score: 1.0,
            },
        );
        aggregates.restaurants.insert(
            r,
            RestaurantSummary {
                menu_size: 1,
                cuisine: Some("thai".into()),
                restriction: None,
            },
        );
        store.write_aggregates(&aggregates).unwrap();

        let dish = store.find_dish(r, "ต้มยำกุ้ง").unwrap().unwrap();
        assert_eq!(dish.negative_score, 1);
        assert_eq!(dish.total_score, 1.0);
    }

    #[test]
    fn test_alias_mapping_upsert() {
        let store = create_test_store();
        store
            .upsert_alias_mapping(&AliasMapping::new(AliasKind::Dish, "ผัดกะเพรา", "ผัดกระเพรา"))
            .unwrap();
        store
            .upsert_alias_mapping(&AliasMapping::new(AliasKind::Dish, "ผัดกะเพรา", "กะเพรา"))
            .unwrap();
        let dish = store.load_alias_mappings(AliasKind::Dish).unwrap();
        assert_eq!(dish.len(), 1);
        assert_eq!(dish[0].canonical, "กะเพรา");
        assert!(store.load_alias_mappings(AliasKind::Keyword).unwrap().is_empty());
    }

    #[test]
    fn test_alias_candidates_replace_and_accept() {
        let store = create_test_store();
        let row = |cluster_id: i64, member: &str| AliasCandidate {
            kind: AliasKind::Keyword,
            cluster_id,
            category: Some(KeywordCategory::Flavor),
            canonical: "อร่อย".into(),
            member: member.into(),
            support: 3,
            location_name: None,
            proposed: true,
            accept: false,
        };
        store
            .replace_alias_candidates(AliasKind::Keyword, &[row(1, "อร่อย"), row(1, "อร่อยย")])
            .unwrap();
        store
            .replace_alias_candidates(AliasKind::Keyword, &[row(2, "อร่อย"), row(2, "อรอย")])
            .unwrap();

        let listed = store.list_alias_candidates(AliasKind::Keyword).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|c| c.cluster_id == 2));
        assert_eq!(listed[0].category, Some(KeywordCategory::Flavor));

        assert_eq!(
            store.set_candidate_accept(AliasKind::Keyword, 2, Some("อรอย"), true).unwrap(),
            1
        );
        assert_eq!(store.set_candidate_accept(AliasKind::Dish, 2, None, true).unwrap(), 0);
        let accepted: Vec<_> = store
            .list_alias_candidates(AliasKind::Keyword)
            .unwrap()
            .into_iter()
            .filter(|c| c.accept)
            .collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].member, "อรอย");
    }

    #[test]
    fn test_restaurant_locations() {
        let store = create_test_store();
        let r = store.insert_restaurant("MK").unwrap();
        assert!(store.insert_restaurant_location(r, "สยาม").unwrap());
        assert!(!store.insert_restaurant_location(r, "สยาม").unwrap());
        assert!(store.has_restaurant_location(r, "สยาม").unwrap());
        assert!(!store.has_restaurant_location(r, "บางนา").unwrap());

        let bare = store.insert_restaurant("Bonchon").unwrap();
        assert_eq!(
            store.restaurants_without_locations().unwrap(),
            vec![(bare, "Bonchon".to_string())]
        );
    }

    #[test]
    fn test_reset_keeps_restaurants_and_extracts() {
        let store = create_test_store();
        store.insert_extract(&SourceRef::web(1), "[]").unwrap();
        let r = store.insert_restaurant("A").unwrap();
        let d = store.insert_dish(r, "x", None, None).unwrap();
        let rd = store.insert_review_dish(d, r, &SourceRef::web(1)).unwrap().unwrap();
        let k = store.insert_keyword("ดี", KeywordCategory::Flavor, Polarity::Positive).unwrap();
        store.link_review_dish_keyword(rd, k).unwrap();
        store.bump_dish_keyword(d, k).unwrap();

        store.reset_dish_tables().unwrap();
        let counts = store.counts().unwrap();
        assert_eq!(counts.dishes, 0);
        assert_eq!(counts.review_dishes, 0);
        assert_eq!(counts.review_dish_keywords, 0);
        assert_eq!(counts.dish_keywords, 0);
        assert_eq!(counts.restaurants, 1);
        assert_eq!(counts.review_extracts, 1);
        assert_eq!(counts.keywords, 1);
    }

    #[test]
    fn test_open_creates_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dishdive.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_restaurant("A").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find_restaurant("A").unwrap().is_some());
    }
}
