//! Test server mode end-to-end. Requires a live Postgres instance with the
//! `geo`/`districts`/`cache` schemas loaded; set `DATABASE_URL` and point
//! `--config` at a TOML file naming it. Not run by default.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cli_test_dir::*;
use reqwest::blocking::Client;

#[test]
#[ignore]
fn healthz_and_district_assign() -> Result<()> {
    let testdir = TestDir::new("nys-districts", "");
    testdir.create_file(
        "config.toml",
        &format!(
            "database_url = \"{}\"\n",
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set for this test")?
        ),
    );

    let mut child = testdir
        .cmd()
        .arg("--config")
        .arg("config.toml")
        .arg("serve")
        .arg("--listen-address")
        .arg("127.0.0.1:18787")
        .spawn()
        .context("server failed to start")?;

    let result = exercise_server();
    if let Err(err) = child.kill() {
        eprintln!("could not stop web server: {}", err);
    }
    result
}

fn exercise_server() -> Result<()> {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    let healthz_url = "http://127.0.0.1:18787/healthz";
    loop {
        if client.get(healthz_url).send().is_ok() {
            break;
        }
        if Instant::now() > deadline {
            anyhow::bail!("server did not become healthy in time");
        }
        sleep(Duration::from_millis(100));
    }

    let response = client
        .get("http://127.0.0.1:18787/api/district/assign")
        .query(&[
            ("addr1", "200 State St"),
            ("city", "Albany"),
            ("state", "NY"),
            ("zip5", "12210"),
            ("uspsValidate", "true"),
        ])
        .send()
        .context("district assign request failed")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        anyhow::bail!("error status from server: {:?}\nbody: {}", status, body);
    }
    let body: serde_json::Value = response.json().context("couldn't parse response body")?;
    assert_eq!(body["matchLevel"], "HOUSE");
    assert!(body["districtInfo"]["districts"]["SENATE"].is_object());
    Ok(())
}
