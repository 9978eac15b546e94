//! HTTP transport for the remote inventory service.

use std::time::Duration;

use serde::Serialize;

use arborsync_core::{InventoryService, RemoteError, ServerInfo, Tree, TreeId};

/// Inventory API client (blocking).
#[derive(Clone, Debug)]
pub struct InventoryClient {
    http: reqwest::blocking::Client,
    api_base: String,
    token: String,
}

/// Wire form of one tree record.
#[derive(Debug, Serialize)]
struct TreePayload<'a> {
    tree_number: &'a str,
    species: &'a str,
    latitude: f64,
    longitude: f64,
    planting_year: i32,
    street: &'a str,
    area: &'a str,
    description: &'a str,
}

impl<'a> TreePayload<'a> {
    fn from_tree(tree: &'a Tree, description: &'a str) -> Self {
        Self {
            tree_number: &tree.number,
            species: &tree.species,
            latitude: tree.latitude,
            longitude: tree.longitude,
            planting_year: tree.planting_year,
            street: &tree.street,
            area: &tree.area,
            description,
        }
    }
}

impl InventoryClient {
    /// Create a new client. Fails when no token is configured.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let token = token.into();
        if token.is_empty() {
            return Err(RemoteError::NotAuthenticated);
        }

        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("arborsync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self { http, api_base: api_base.into(), token })
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, RemoteError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::NotAuthenticated);
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(RemoteError::Http { status: status.as_u16(), body });
        }
        Ok(resp)
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, RemoteError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Self::check(resp)
    }

    fn send_json<B: Serialize>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &B,
    ) -> Result<reqwest::blocking::Response, RemoteError> {
        let resp = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Self::check(resp)
    }

    fn delete(&self, url: &str) -> Result<(), RemoteError> {
        let resp = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Self::check(resp).map(|_| ())
    }
}

impl InventoryService for InventoryClient {
    fn server_info(&self) -> Result<ServerInfo, RemoteError> {
        let url = format!("{}/v1/info", self.api_base);
        let resp = self.get(&url)?;
        resp.json::<ServerInfo>().map_err(|e| RemoteError::Parse(e.to_string()))
    }

    fn create_tree(&self, tree: &Tree) -> Result<TreeId, RemoteError> {
        let url = format!("{}/v1/trees", self.api_base);
        let payload = TreePayload::from_tree(tree, "Created by the CSV import.");
        let resp = self.send_json(reqwest::Method::POST, &url, &payload)?;
        let json: serde_json::Value =
            resp.json().map_err(|e| RemoteError::Parse(e.to_string()))?;
        json["id"]
            .as_i64()
            .ok_or_else(|| RemoteError::Parse("missing id in create response".into()))
    }

    fn update_tree(&self, id: TreeId, tree: &Tree) -> Result<(), RemoteError> {
        let url = format!("{}/v1/trees/{id}", self.api_base);
        let payload = TreePayload::from_tree(tree, "Updated by the CSV import.");
        self.send_json(reqwest::Method::PUT, &url, &payload).map(|_| ())
    }

    fn delete_tree(&self, id: TreeId) -> Result<(), RemoteError> {
        let url = format!("{}/v1/trees/{id}", self.api_base);
        self.delete(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use httpmock::prelude::*;

    fn tree(id: TreeId) -> Tree {
        let now = Utc::now();
        Tree {
            id,
            created_at: now,
            updated_at: now,
            area: "Mitte".into(),
            number: "B-1".into(),
            species: "Tilia cordata".into(),
            latitude: 54.78,
            longitude: 9.43,
            planting_year: 2010,
            street: "Norderstraße".into(),
        }
    }

    fn client(server: &MockServer) -> InventoryClient {
        InventoryClient::new(server.base_url(), "token-1", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn empty_token_is_rejected_at_construction() {
        let err = InventoryClient::new("http://localhost", "", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, RemoteError::NotAuthenticated));
    }

    #[test]
    fn create_sends_bearer_token_and_returns_the_assigned_id() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/trees")
                .header("authorization", "Bearer token-1")
                .json_body_includes(r#"{"tree_number": "B-1", "planting_year": 2010}"#);
            then.status(201).json_body(serde_json::json!({ "id": 77 }));
        });

        let id = client(&server).create_tree(&tree(0)).unwrap();
        mock.assert();
        assert_eq!(id, 77);
    }

    #[test]
    fn update_puts_to_the_record_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/v1/trees/41");
            then.status(200).json_body(serde_json::json!({}));
        });

        client(&server).update_tree(41, &tree(41)).unwrap();
        mock.assert();
    }

    #[test]
    fn delete_hits_the_record_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE).path("/v1/trees/41");
            then.status(204);
        });

        client(&server).delete_tree(41).unwrap();
        mock.assert();
    }

    #[test]
    fn server_error_maps_to_http_with_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/trees");
            then.status(500).body("boom");
        });

        let err = client(&server).create_tree(&tree(0)).unwrap_err();
        match err {
            RemoteError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[test]
    fn unauthorized_maps_to_not_authenticated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/info");
            then.status(401);
        });

        let err = client(&server).server_info().unwrap_err();
        assert!(matches!(err, RemoteError::NotAuthenticated));
    }

    #[test]
    fn info_parses_the_service_identity() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/info");
            then.status(200)
                .json_body(serde_json::json!({ "name": "inventory", "version": "2.4.0" }));
        });

        let info = client(&server).server_info().unwrap();
        assert_eq!(info.name, "inventory");
        assert_eq!(info.version, "2.4.0");
    }
}
