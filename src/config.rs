use std::{net, time};

use serde::Deserialize;

use crate::workflow::{display::Locale, CancelPolicy};

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub workflow: Workflow,
    #[serde(default)]
    pub display: Display,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}

#[derive(Default, Deserialize)]
pub struct Workflow {
    /// Where a ticket cancelled by its creator ends up.
    #[serde(default)]
    pub cancel: CancelPolicy,
}

#[derive(Default, Deserialize)]
pub struct Display {
    #[serde(default)]
    pub locale: Locale,
}
