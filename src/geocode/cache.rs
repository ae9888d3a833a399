//! The geocode cache: a content-addressed lookup keyed by parsed street
//! address, with buffered, deduplicated inserts flushed in bulk.
//!
//! Grounded on the teacher's `geocoders::cache::Cache` (same buffer/flush
//! shape, same `describe_counter!`/`counter!` metrics idiom) but backed by
//! `sqlx::PgPool` against the `cache.geocache` table named in the external
//! interfaces, rather than a generic `KeyValueStore`: the source's
//! "duplicate-insert errors are swallowed" language describes a
//! uniqueness-constrained relational table, not a blind key/value `SET`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use metrics::{counter, describe_counter};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{
    addresses::{self, Address, StreetAddress},
    geocode::{Geocode, GeocodedAddress, Quality},
    Result,
};

/// Postgres unique-violation SQLSTATE, per
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>.
const UNIQUE_VIOLATION: &str = "23505";

/// Default `BUFFER_SIZE`: number of pending rows that triggers a flush.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

struct PendingInsert {
    address: Address,
    geocode: Geocode,
}

/// The write-through geocode cache.
pub struct GeocodeCache {
    pool: PgPool,
    buffer: Mutex<Vec<PendingInsert>>,
    buffer_size: usize,
    flushing: AtomicBool,
}

impl GeocodeCache {
    pub fn new(pool: PgPool, buffer_size: usize) -> Arc<GeocodeCache> {
        describe_counter!("geocache.hits.total", "Geocode cache hits");
        describe_counter!("geocache.misses.total", "Geocode cache misses");
        describe_counter!(
            "geocache.inserts.total",
            "Rows successfully inserted into the geocode cache"
        );
        describe_counter!(
            "geocache.duplicate_inserts.total",
            "Cache inserts suppressed because the row already existed"
        );
        describe_counter!(
            "geocache.insert_errors.total",
            "Cache insert failures other than duplicate key"
        );
        Arc::new(GeocodeCache {
            pool,
            buffer: Mutex::new(Vec::new()),
            buffer_size,
            flushing: AtomicBool::new(false),
        })
    }

    /// `lookup(StreetAddress) -> GeocodedAddress | null`.
    ///
    /// The address must be retrievable (see
    /// [`StreetAddress::is_retrievable`]). Matching rules:
    ///
    /// - non-PO-box, non-empty street: match on `(bldg_num, pre_dir, street,
    ///   post_dir, street_type)` and either a matching non-empty zip5, or no
    ///   zip5 with a matching city+state.
    /// - PO-box / empty-street: match on city/zip5/state only.
    ///
    /// A hit whose stored quality is below `HOUSE` is treated as a miss.
    pub async fn lookup(&self, street: &StreetAddress) -> Result<Option<GeocodedAddress>> {
        if !street.is_retrievable() {
            return Ok(None);
        }

        let row = if street.is_street_address() {
            sqlx::query_as::<_, CacheRow>(
                r#"
                select bldg_num, pre_dir, street_name, street_type, post_dir,
                       city, state, zip5, zip4, lat, lon, method, quality
                from cache.geocache
                where bldg_num = $1
                  and coalesce(pre_dir, '') = coalesce($2, '')
                  and street_name = $3
                  and coalesce(post_dir, '') = coalesce($4, '')
                  and street_type = $5
                  and (
                        (length($6) > 0 and zip5 = $6)
                        or (length($6) = 0 and city = $7 and state = $8)
                      )
                limit 1
                "#,
            )
            .bind(street.bldg_num as i32)
            .bind(street.pre_dir.map(|d| d.as_str().to_owned()))
            .bind(&street.street_name)
            .bind(street.post_dir.map(|d| d.as_str().to_owned()))
            .bind(street.street_type.clone().unwrap_or_default())
            .bind(&street.zip5)
            .bind(&street.city)
            .bind(&street.state)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, CacheRow>(
                r#"
                select bldg_num, pre_dir, street_name, street_type, post_dir,
                       city, state, zip5, zip4, lat, lon, method, quality
                from cache.geocache
                where (length($1) > 0 and zip5 = $1)
                   or (length($1) = 0 and city = $2 and state = $3)
                limit 1
                "#,
            )
            .bind(&street.zip5)
            .bind(&street.city)
            .bind(&street.state)
            .fetch_optional(&self.pool)
            .await?
        };

        match row {
            Some(row) if row.quality_enum() >= Quality::House || !street.is_street_address() => {
                counter!("geocache.hits.total", 1);
                Ok(Some(row.into_geocoded_address()))
            }
            Some(_) => {
                counter!("geocache.misses.total", 1);
                Ok(None)
            }
            None => {
                counter!("geocache.misses.total", 1);
                Ok(None)
            }
        }
    }

    /// `put(GeocodedAddress)`.
    ///
    /// Filters by validity and cacheability, then pushes onto the pending
    /// buffer. When the buffer exceeds `buffer_size`, a flush is triggered.
    pub async fn put(self: &Arc<Self>, geocoded: GeocodedAddress) -> Result<()> {
        let Some(geocode) = geocoded.geocode.clone() else {
            return Ok(());
        };
        if geocoded.address.is_empty() || !geocode.is_valid() || geocode.cached {
            return Ok(());
        }

        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(PendingInsert {
                address: geocoded.address,
                geocode,
            });
            buffer.len() > self.buffer_size
        };

        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Drain the pending buffer and insert every cacheable row. At most one
    /// flush runs at a time; concurrent callers that lose the race simply
    /// return once the running flush has drained the buffer they also
    /// queued into.
    pub async fn flush(self: &Arc<Self>) -> Result<()> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let result = self.flush_inner().await;
        self.flushing.store(false, Ordering::Release);
        result
    }

    async fn flush_inner(self: &Arc<Self>) -> Result<()> {
        let pending = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };

        for entry in pending {
            let street = match addresses::parse(&entry.address) {
                Ok(street) => street,
                Err(err) => {
                    counter!("geocache.insert_errors.total", 1);
                    tracing::warn!(error = %err, "geocode cache entry failed to parse, dropping");
                    continue;
                }
            };
            if !street.is_cacheable() {
                continue;
            }
            match self.insert_row(&street, &entry.geocode).await {
                Ok(()) => counter!("geocache.inserts.total", 1),
                Err(err) if is_unique_violation(&err) => {
                    counter!("geocache.duplicate_inserts.total", 1);
                }
                Err(err) => {
                    counter!("geocache.insert_errors.total", 1);
                    tracing::warn!(error = %err, "geocode cache insert failed");
                }
            }
        }
        Ok(())
    }

    async fn insert_row(&self, street: &StreetAddress, geocode: &Geocode) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            insert into cache.geocache
                (bldg_num, pre_dir, street_name, street_type, post_dir,
                 city, state, zip5, zip4, lat, lon, method, quality)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(street.bldg_num as i32)
        .bind(street.pre_dir.map(|d| d.as_str().to_owned()))
        .bind(&street.street_name)
        .bind(street.street_type.clone().unwrap_or_default())
        .bind(street.post_dir.map(|d| d.as_str().to_owned()))
        .bind(&street.city)
        .bind(&street.state)
        .bind(&street.zip5)
        .bind(&street.zip4)
        .bind(geocode.lat)
        .bind(geocode.lon)
        .bind(&geocode.method)
        .bind(quality_to_str(geocode.quality))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err.as_database_error(), Some(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn quality_to_str(quality: Quality) -> &'static str {
    match quality {
        Quality::Unknown => "UNKNOWN",
        Quality::State => "STATE",
        Quality::County => "COUNTY",
        Quality::City => "CITY",
        Quality::Zip => "ZIP",
        Quality::Street => "STREET",
        Quality::House => "HOUSE",
        Quality::Point => "POINT",
    }
}

fn quality_from_str(s: &str) -> Quality {
    match s {
        "STATE" => Quality::State,
        "COUNTY" => Quality::County,
        "CITY" => Quality::City,
        "ZIP" => Quality::Zip,
        "STREET" => Quality::Street,
        "HOUSE" => Quality::House,
        "POINT" => Quality::Point,
        _ => Quality::Unknown,
    }
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    bldg_num: i32,
    pre_dir: Option<String>,
    street_name: String,
    street_type: String,
    post_dir: Option<String>,
    city: String,
    state: String,
    zip5: String,
    zip4: String,
    lat: f64,
    lon: f64,
    method: String,
    quality: String,
}

impl CacheRow {
    fn quality_enum(&self) -> Quality {
        quality_from_str(&self.quality)
    }

    fn into_geocoded_address(self) -> GeocodedAddress {
        let addr1 = if self.bldg_num > 0 {
            let mut parts = vec![];
            parts.push(self.bldg_num.to_string());
            if let Some(pre) = &self.pre_dir {
                parts.push(pre.clone());
            }
            parts.push(title_case(&self.street_name));
            parts.push(self.street_type.clone());
            if let Some(post) = &self.post_dir {
                parts.push(post.clone());
            }
            parts.join(" ")
        } else {
            String::new()
        };

        GeocodedAddress {
            address: Address {
                addr1,
                addr2: String::new(),
                city: title_case(&self.city),
                state: self.state.clone(),
                zip5: self.zip5.clone(),
                zip4: self.zip4.clone(),
                is_parsed: true,
            },
            geocode: Some(Geocode {
                lat: self.lat,
                lon: self.lon,
                method: self.method.clone(),
                quality: self.quality_enum(),
                cached: true,
            }),
        }
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_round_trips_through_its_string_form() {
        for quality in [
            Quality::Unknown,
            Quality::State,
            Quality::County,
            Quality::City,
            Quality::Zip,
            Quality::Street,
            Quality::House,
            Quality::Point,
        ] {
            assert_eq!(quality_from_str(quality_to_str(quality)), quality);
        }
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("ALBANY"), "Albany");
        assert_eq!(title_case("NEW YORK"), "New York");
    }
}
