//! The USPS adapter: the reference `AddressService` implementation,
//! talking to the public ShippingAPI v3 (XML request/response over plain
//! GET). Its main job in this codebase is to concretely pin down the
//! `AddressService` contract and demonstrate a genuinely batched external
//! validator — USPS's Verify call accepts up to 5 addresses per request.
//!
//! Grounded on the teacher's `geocoders::smarty::client::SmartyClient`: a
//! shared `hyper` client, a GET built from query parameters, and
//! `#[instrument]`ed calls timed into a histogram. The XML body itself is
//! built and parsed with `quick-xml`, since the wire format here is XML
//! rather than JSON.

use std::time::Instant;

use async_trait::async_trait;
use metrics::{describe_histogram, histogram};
use serde::Deserialize;

use crate::{
    addresses::Address,
    http_client::SharedHttpClient,
    providers::{AddressResult, AddressService},
    Result,
};

/// USPS batches up to 5 addresses per `Verify` call.
const VERIFY_BATCH_SIZE: usize = 5;

pub struct UspsAddressService {
    client: SharedHttpClient,
    base_url: url::Url,
    user_id: String,
}

impl UspsAddressService {
    pub fn new(client: SharedHttpClient, base_url: url::Url, user_id: String) -> UspsAddressService {
        describe_histogram!(
            "usps.request.duration_seconds",
            "Time spent waiting for a USPS ShippingAPI response"
        );
        UspsAddressService {
            client,
            base_url,
            user_id,
        }
    }

    async fn call(&self, api: &str, xml: &str) -> Result<String> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("API", api)
            .append_pair("XML", xml);

        let request = hyper::Request::get(url.as_str())
            .body(hyper::Body::empty())
            .map_err(anyhow::Error::from)?;

        let start = Instant::now();
        let response = self.client.request(request).await?;
        let body = hyper::body::to_bytes(response.into_body()).await?;
        histogram!("usps.request.duration_seconds", start.elapsed().as_secs_f64());

        Ok(String::from_utf8(body.to_vec())?)
    }

    async fn verify_chunk(&self, addresses: &[Address]) -> Result<Vec<AddressResult>> {
        let mut xml = format!(
            r#"<AddressValidateRequest USERID="{}">"#,
            escape_xml(&self.user_id)
        );
        for (i, address) in addresses.iter().enumerate() {
            xml.push_str(&format!(
                r#"<Address ID="{id}"><Address1>{a1}</Address1><Address2>{a2}</Address2><City>{city}</City><State>{state}</State><Zip5>{zip5}</Zip5><Zip4>{zip4}</Zip4></Address>"#,
                id = i,
                a1 = escape_xml(&address.addr2),
                a2 = escape_xml(&address.addr1),
                city = escape_xml(&address.city),
                state = escape_xml(&address.state),
                zip5 = escape_xml(&address.zip5),
                zip4 = escape_xml(&address.zip4),
            ));
        }
        xml.push_str("</AddressValidateRequest>");

        let body = self.call("Verify", &xml).await?;
        let parsed: VerifyResponse = quick_xml::de::from_str(&body)
            .map_err(|err| anyhow::anyhow!("failed to parse USPS verify response: {err}"))?;

        if let Some(error) = parsed.error {
            return Err(anyhow::anyhow!("USPS verify request failed: {}", error.description));
        }

        let mut results = Vec::with_capacity(addresses.len());
        for (original, entry) in addresses.iter().zip(parsed.addresses) {
            if let Some(error) = entry.error {
                results.push(AddressResult {
                    address: original.clone(),
                    validated: false,
                    messages: vec![error.description],
                });
                continue;
            }
            results.push(AddressResult {
                address: Address {
                    addr1: entry.address2.unwrap_or_default(),
                    addr2: entry.address1.unwrap_or_default(),
                    city: entry.city.unwrap_or_default(),
                    state: entry.state.unwrap_or_default(),
                    zip5: entry.zip5.unwrap_or_default(),
                    zip4: entry.zip4.unwrap_or_default(),
                    is_parsed: true,
                },
                validated: true,
                messages: Vec::new(),
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl AddressService for UspsAddressService {
    fn tag(&self) -> &str {
        "usps"
    }

    #[tracing::instrument(skip(self, address), fields(addr1 = %address.addr1))]
    async fn validate(&self, address: &Address) -> Result<AddressResult> {
        let mut results = self.verify_chunk(std::slice::from_ref(address)).await?;
        results.pop().ok_or_else(|| anyhow::anyhow!("USPS returned no address result"))
    }

    /// Batches in groups of 5, the limit USPS's Verify endpoint accepts per
    /// request, rather than the trait's default one-call-per-address loop.
    async fn validate_batch(&self, addresses: &[Address]) -> Result<Vec<AddressResult>> {
        let mut results = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(VERIFY_BATCH_SIZE) {
            results.extend(self.verify_chunk(chunk).await?);
        }
        Ok(results)
    }

    #[tracing::instrument(skip(self, address), fields(zip5 = %address.zip5))]
    async fn lookup_city_state(&self, address: &Address) -> Result<AddressResult> {
        let xml = format!(
            r#"<CityStateLookupRequest USERID="{}"><ZipCode ID="0"><Zip5>{}</Zip5></ZipCode></CityStateLookupRequest>"#,
            escape_xml(&self.user_id),
            escape_xml(&address.zip5),
        );
        let body = self.call("CityStateLookup", &xml).await?;
        let parsed: CityStateLookupResponse = quick_xml::de::from_str(&body)
            .map_err(|err| anyhow::anyhow!("failed to parse USPS city/state response: {err}"))?;

        if let Some(error) = parsed.error {
            return Err(anyhow::anyhow!("USPS city/state lookup failed: {}", error.description));
        }
        let Some(entry) = parsed.zip_codes.into_iter().next() else {
            return Err(anyhow::anyhow!("USPS returned no city/state result"));
        };
        if let Some(error) = entry.error {
            return Ok(AddressResult {
                address: address.clone(),
                validated: false,
                messages: vec![error.description],
            });
        }
        Ok(AddressResult {
            address: Address {
                city: entry.city.unwrap_or_default(),
                state: entry.state.unwrap_or_default(),
                ..address.clone()
            },
            validated: true,
            messages: Vec::new(),
        })
    }

    #[tracing::instrument(skip(self, address), fields(addr1 = %address.addr1))]
    async fn lookup_zipcode(&self, address: &Address) -> Result<AddressResult> {
        let xml = format!(
            r#"<ZipCodeLookupRequest USERID="{}"><Address ID="0"><Address1>{}</Address1><Address2>{}</Address2><City>{}</City><State>{}</State></Address></ZipCodeLookupRequest>"#,
            escape_xml(&self.user_id),
            escape_xml(&address.addr2),
            escape_xml(&address.addr1),
            escape_xml(&address.city),
            escape_xml(&address.state),
        );
        let body = self.call("ZipCodeLookup", &xml).await?;
        let parsed: VerifyResponse = quick_xml::de::from_str(&body)
            .map_err(|err| anyhow::anyhow!("failed to parse USPS zip lookup response: {err}"))?;

        if let Some(error) = parsed.error {
            return Err(anyhow::anyhow!("USPS zip lookup failed: {}", error.description));
        }
        let Some(entry) = parsed.addresses.into_iter().next() else {
            return Err(anyhow::anyhow!("USPS returned no zip lookup result"));
        };
        if let Some(error) = entry.error {
            return Ok(AddressResult {
                address: address.clone(),
                validated: false,
                messages: vec![error.description],
            });
        }
        Ok(AddressResult {
            address: Address {
                zip5: entry.zip5.unwrap_or_default(),
                zip4: entry.zip4.unwrap_or_default(),
                ..address.clone()
            },
            validated: true,
            messages: Vec::new(),
        })
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "Address", default)]
    addresses: Vec<UspsAddressEntry>,
    #[serde(rename = "Error")]
    error: Option<UspsError>,
}

#[derive(Debug, Deserialize)]
struct UspsAddressEntry {
    #[serde(rename = "Address1")]
    address1: Option<String>,
    #[serde(rename = "Address2")]
    address2: Option<String>,
    #[serde(rename = "City")]
    city: Option<String>,
    #[serde(rename = "State")]
    state: Option<String>,
    #[serde(rename = "Zip5")]
    zip5: Option<String>,
    #[serde(rename = "Zip4")]
    zip4: Option<String>,
    #[serde(rename = "Error")]
    error: Option<UspsError>,
}

#[derive(Debug, Deserialize)]
struct CityStateLookupResponse {
    #[serde(rename = "ZipCode", default)]
    zip_codes: Vec<ZipCodeEntry>,
    #[serde(rename = "Error")]
    error: Option<UspsError>,
}

#[derive(Debug, Deserialize)]
struct ZipCodeEntry {
    #[serde(rename = "City")]
    city: Option<String>,
    #[serde(rename = "State")]
    state: Option<String>,
    #[serde(rename = "Error")]
    error: Option<UspsError>,
}

#[derive(Debug, Deserialize)]
struct UspsError {
    #[serde(rename = "Description")]
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_xml_covers_the_five_predefined_entities_we_emit() {
        assert_eq!(escape_xml(r#"AT&T "Main" <St>"#), "AT&amp;T &quot;Main&quot; &lt;St&gt;");
    }

    #[test]
    fn verify_response_parses_a_successful_single_address() {
        let xml = r#"<AddressValidateResponse><Address ID="0"><Address2>6406 IVY LN</Address2><City>GREENBELT</City><State>MD</State><Zip5>20770</Zip5><Zip4>1441</Zip4></Address></AddressValidateResponse>"#;
        let parsed: VerifyResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.addresses.len(), 1);
        assert_eq!(parsed.addresses[0].city.as_deref(), Some("GREENBELT"));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn verify_response_parses_a_per_address_error() {
        let xml = r#"<AddressValidateResponse><Address ID="0"><Error><Description>Address Not Found.</Description></Error></Address></AddressValidateResponse>"#;
        let parsed: VerifyResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.addresses.len(), 1);
        assert!(parsed.addresses[0].error.is_some());
    }
}
