//! Street-file district lookup: a tabular store keyed by
//! `(street name, bldgNum range low/high, parity, zip5)` mapping to
//! district codes, supplied by election boards rather than a shapefile.

use std::collections::{HashMap, HashSet};

use sqlx::{PgPool, Row};

use crate::{
    addresses::StreetAddress,
    district::{normalize_code, CodeSetsByType, DistrictEntry, DistrictInfo, DistrictType},
    geocode::GeocodedAddress,
    Result,
};

/// One raw range row, as returned by `getDistrictStreetRanges` for
/// display/diagnostics.
#[derive(Clone, Debug)]
pub struct StreetRangeRow {
    pub street_name: String,
    pub bldg_num_low: u32,
    pub bldg_num_high: u32,
    pub parity: Option<Parity>,
    pub zip5: String,
    pub codes: HashMap<DistrictType, String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Parity {
    Even,
    Odd,
}

fn parity_of(bldg_num: u32) -> Parity {
    if bldg_num % 2 == 0 {
        Parity::Even
    } else {
        Parity::Odd
    }
}

const DISTRICT_COLUMNS: &[(DistrictType, &str)] = &[
    (DistrictType::Senate, "senate"),
    (DistrictType::Assembly, "assembly"),
    (DistrictType::Congressional, "congressional"),
    (DistrictType::County, "county"),
    (DistrictType::School, "school"),
    (DistrictType::Town, "town"),
    (DistrictType::Election, "election"),
    (DistrictType::Fire, "fire"),
    (DistrictType::Village, "village"),
    (DistrictType::City, "city"),
];

pub struct StreetFileStore {
    pool: PgPool,
}

impl StreetFileStore {
    pub fn new(pool: PgPool) -> StreetFileStore {
        StreetFileStore { pool }
    }

    /// `assignDistricts(geocodedAddress)`: resolve a specific house number
    /// to a single matching row. Match level is HOUSE.
    pub async fn assign_districts(
        &self,
        geocoded: &GeocodedAddress,
    ) -> Result<Option<DistrictInfo>> {
        let street = crate::addresses::parse(&geocoded.address)?;
        if !street.is_street_address() {
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            select senate, assembly, congressional, county, school, town,
                   election, fire, village, city
            from districts.street_ranges
            where street_name = $1
              and zip5 = $2
              and $3 between bldg_num_low and bldg_num_high
              and (parity is null or parity = $4)
            limit 1
            "#,
        )
        .bind(&street.street_name)
        .bind(&street.zip5)
        .bind(street.bldg_num as i32)
        .bind(match parity_of(street.bldg_num) {
            Parity::Even => "EVEN",
            Parity::Odd => "ODD",
        })
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let mut info = DistrictInfo::default();
        for &(district_type, column) in DISTRICT_COLUMNS {
            let code: Option<String> = row.try_get(column)?;
            if let Some(code) = code {
                info.districts.insert(
                    district_type,
                    DistrictEntry {
                        name: String::new(),
                        code: normalize_code(&code),
                        map: None,
                        proximity_meters: None,
                        overlap: None,
                    },
                );
            }
        }
        Ok(Some(info))
    }

    /// `getAllStandardDistrictMatches(streetNames?, zip5s)`: the set of
    /// distinct codes per `DistrictType` across every matching row. An
    /// empty street-name list matches any street within the given zips.
    pub async fn all_standard_district_matches(
        &self,
        street_names: Option<&[String]>,
        zip5s: &[String],
    ) -> Result<CodeSetsByType> {
        let rows = if let Some(streets) = street_names.filter(|s| !s.is_empty()) {
            sqlx::query(
                r#"
                select senate, assembly, congressional, county, school, town,
                       election, fire, village, city
                from districts.street_ranges
                where zip5 = any($1) and street_name = any($2)
                "#,
            )
            .bind(zip5s)
            .bind(streets)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                select senate, assembly, congressional, county, school, town,
                       election, fire, village, city
                from districts.street_ranges
                where zip5 = any($1)
                "#,
            )
            .bind(zip5s)
            .fetch_all(&self.pool)
            .await?
        };

        let mut result: CodeSetsByType = HashMap::new();
        for row in rows {
            for &(district_type, column) in DISTRICT_COLUMNS {
                let code: Option<String> = row.try_get(column)?;
                if let Some(code) = code {
                    result
                        .entry(district_type)
                        .or_insert_with(HashSet::new)
                        .insert(normalize_code(&code));
                }
            }
        }
        Ok(result)
    }

    /// Zip codes on file for any street range whose CITY-type district code
    /// is in `city_codes`. Backs `cityZipLookup` when a caller supplies a
    /// city name instead of a zip: the shapefile store resolves the name to
    /// CITY codes, then this turns those codes into zips the way the
    /// street-file already links the two.
    pub async fn distinct_zip5_for_city_codes(&self, city_codes: &[String]) -> Result<Vec<String>> {
        if city_codes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "select distinct zip5 from districts.street_ranges where city = any($1)",
        )
        .bind(city_codes)
        .fetch_all(&self.pool)
        .await?;
        let mut zips = Vec::with_capacity(rows.len());
        for row in rows {
            zips.push(row.try_get::<String, _>("zip5")?);
        }
        Ok(zips)
    }

    /// `getDistrictStreetRanges(streetName, zip5s)`: raw range rows, for
    /// display/diagnostics.
    pub async fn district_street_ranges(
        &self,
        street_name: &str,
        zip5s: &[String],
    ) -> Result<Vec<StreetRangeRow>> {
        let rows = sqlx::query(
            r#"
            select street_name, bldg_num_low, bldg_num_high, parity, zip5,
                   senate, assembly, congressional, county, school, town,
                   election, fire, village, city
            from districts.street_ranges
            where street_name = $1 and zip5 = any($2)
            "#,
        )
        .bind(street_name)
        .bind(zip5s)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let parity: Option<String> = row.try_get("parity")?;
            let mut codes = HashMap::new();
            for &(district_type, column) in DISTRICT_COLUMNS {
                let code: Option<String> = row.try_get(column)?;
                if let Some(code) = code {
                    codes.insert(district_type, normalize_code(&code));
                }
            }
            result.push(StreetRangeRow {
                street_name: row.try_get("street_name")?,
                bldg_num_low: row.try_get::<i32, _>("bldg_num_low")? as u32,
                bldg_num_high: row.try_get::<i32, _>("bldg_num_high")? as u32,
                parity: match parity.as_deref() {
                    Some("EVEN") => Some(Parity::Even),
                    Some("ODD") => Some(Parity::Odd),
                    _ => None,
                },
                zip5: row.try_get("zip5")?,
                codes,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_of_matches_house_number_parity() {
        assert_eq!(parity_of(200), Parity::Even);
        assert_eq!(parity_of(201), Parity::Odd);
    }
}
