// meteotrentino_exporter - Prometheus metrics exporter for MeteoTrentino weather stations
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use std::error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Unexpected(StatusCode, Url, String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid station URL {}", u),
            Self::Unexpected(status, url, body) => {
                write!(f, "unexpected status {} for {}, body: {}", status, url, body)
            }
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// URL schema used to reach the station data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSchema {
    Http,
    Https,
}

impl UrlSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for UrlSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(format!("unsupported URL schema '{}', expected 'http' or 'https'", other)),
        }
    }
}

/// Client for the "latest readings" endpoint of a single station.
///
/// The URL is resolved once at construction and each call to `latest()` makes exactly
/// one request for it. No retries are performed: a failed request is reported to the
/// caller and the next refresh will simply try again.
#[derive(Debug)]
pub struct StationClient {
    client: Client,
    url: Url,
}

impl StationClient {
    const USER_AGENT: &'static str =
        "MeteoTrentino Prometheus Exporter (https://github.com/56quarters/meteotrentino_exporter)";
    const XML_RESPONSE: &'static str = "application/xml, text/xml";

    pub fn new(client: Client, schema: UrlSchema, host: &str, station: &str) -> Result<Self, ClientError> {
        let url = Self::station_url(schema, host, station)?;
        Ok(StationClient { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the raw body of the latest readings document for the station.
    pub async fn latest(&self) -> Result<Vec<u8>, ClientError> {
        tracing::debug!(message = "making latest readings request", url = %self.url);

        let res = self
            .client
            .get(self.url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::XML_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        let body = res.bytes().await.map_err(ClientError::Internal)?;

        if status.as_u16() > 299 {
            Err(ClientError::Unexpected(
                status,
                self.url.clone(),
                String::from_utf8_lossy(&body).into_owned(),
            ))
        } else {
            Ok(body.to_vec())
        }
    }

    fn station_url(schema: UrlSchema, host: &str, station: &str) -> Result<Url, ClientError> {
        let encoded_station = utf8_percent_encode(station, NON_ALPHANUMERIC);
        let raw = format!(
            "{}://{}/service.asmx/ultimiDatiStazione?codice={}",
            schema, host, encoded_station
        );

        Url::parse(&raw).map_err(|_| ClientError::InvalidUrl(raw))
    }
}

#[cfg(test)]
mod test {
    use super::{ClientError, StationClient, UrlSchema};
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use reqwest::Client;
    use std::collections::HashMap;
    use std::net::{SocketAddr, TcpListener};

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service());
        tokio::spawn(server);
        addr
    }

    #[test]
    fn test_station_url() {
        let client =
            StationClient::new(Client::new(), UrlSchema::Https, "dati.meteotrentino.it", "T0147").unwrap();
        assert_eq!(
            "https://dati.meteotrentino.it/service.asmx/ultimiDatiStazione?codice=T0147",
            client.url().as_str()
        );
    }

    #[test]
    fn test_station_url_encodes_code() {
        let client = StationClient::new(Client::new(), UrlSchema::Http, "localhost:8080", "T 01&47").unwrap();
        assert_eq!(
            "http://localhost:8080/service.asmx/ultimiDatiStazione?codice=T%2001%2647",
            client.url().as_str()
        );
    }

    #[test]
    fn test_url_schema_from_str() {
        assert_eq!(UrlSchema::Http, "http".parse().unwrap());
        assert_eq!(UrlSchema::Https, "HTTPS".parse().unwrap());
        assert!("ftp".parse::<UrlSchema>().is_err());
    }

    #[tokio::test]
    async fn test_latest_success() {
        let app = Router::new().route(
            "/service.asmx/ultimiDatiStazione",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                format!("<datiOggi>{}</datiOggi>", params.get("codice").cloned().unwrap_or_default())
            }),
        );
        let addr = serve(app).await;

        let client = StationClient::new(Client::new(), UrlSchema::Http, &addr.to_string(), "T0147").unwrap();
        let body = client.latest().await.unwrap();

        assert_eq!(b"<datiOggi>T0147</datiOggi>".to_vec(), body);
    }

    #[tokio::test]
    async fn test_latest_error_status() {
        let app = Router::new().route(
            "/service.asmx/ultimiDatiStazione",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "station service unavailable") }),
        );
        let addr = serve(app).await;

        let client = StationClient::new(Client::new(), UrlSchema::Http, &addr.to_string(), "T0147").unwrap();
        let res = client.latest().await;

        match res {
            Err(ClientError::Unexpected(status, _, body)) => {
                assert_eq!(500, status.as_u16());
                assert_eq!("station service unavailable", body);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_latest_transport_error() {
        // Bind and immediately drop a listener to get a port nothing is listening on
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

        let client = StationClient::new(Client::new(), UrlSchema::Http, &addr.to_string(), "T0147").unwrap();
        let res = client.latest().await;

        assert!(matches!(res, Err(ClientError::Internal(_))));
    }
}
