//! Federated identity client.
//!
//! OVH public cloud projects are OpenStack tenants; region-scoped service
//! access goes through the identity endpoint (Keystone v2): username,
//! password and tenant name are exchanged for a token and a service
//! catalog, from which region-scoped endpoints are selected.

use std::fmt;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;

/// Which of a catalog endpoint's URLs to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    /// The public endpoint URL (the default).
    #[default]
    Public,
    /// The internal endpoint URL.
    Internal,
    /// The administrative endpoint URL.
    Admin,
}

impl Availability {
    /// Parse the provider's endpoint-type setting.
    ///
    /// Both the bare and the URL-suffixed spellings are accepted; the
    /// empty string selects the public endpoint. Anything else is a
    /// configuration error.
    pub fn parse(value: &str) -> Result<Self, ProviderError> {
        match value {
            "" | "public" | "publicURL" => Ok(Self::Public),
            "internal" | "internalURL" => Ok(Self::Internal),
            "admin" | "adminURL" => Ok(Self::Admin),
            other => Err(ProviderError::Configuration(format!(
                "invalid openstack endpoint type {other:?}"
            ))),
        }
    }
}

/// Credentials for the identity endpoint.
#[derive(Clone, Default)]
pub struct AuthOptions {
    /// Base URL of the identity service.
    pub identity_endpoint: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Tenant the session is scoped to.
    pub tenant_name: String,
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("identity_endpoint", &self.identity_endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant_name", &self.tenant_name)
            .finish()
    }
}

/// One endpoint of a service-catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEndpoint {
    /// Region the endpoint serves.
    #[serde(default)]
    pub region: String,
    /// Public URL.
    #[serde(rename = "publicURL", default)]
    pub public_url: String,
    /// Internal URL, when exposed.
    #[serde(rename = "internalURL", default)]
    pub internal_url: String,
    /// Administrative URL, when exposed.
    #[serde(rename = "adminURL", default)]
    pub admin_url: String,
}

/// One service of the catalog returned at authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Service type, e.g. `network` or `compute`.
    #[serde(rename = "type")]
    pub service_type: String,
    /// Vendor-assigned service name.
    #[serde(default)]
    pub name: String,
    /// The service's endpoints, one per region.
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,
}

/// An authenticated identity session.
#[derive(Debug, Clone)]
pub struct Session {
    /// The scoped token.
    pub token: String,
    /// The service catalog the token grants access to.
    pub catalog: Vec<CatalogEntry>,
}

impl Session {
    /// Resolve the URL of a service in a region, honoring the requested
    /// availability.
    pub fn service_endpoint(
        &self,
        service_type: &str,
        region: &str,
        availability: Availability,
    ) -> Result<String, ProviderError> {
        for entry in self.catalog.iter().filter(|e| e.service_type == service_type) {
            for endpoint in endpoint_candidates(entry, region) {
                let url = match availability {
                    Availability::Public => &endpoint.public_url,
                    Availability::Internal => &endpoint.internal_url,
                    Availability::Admin => &endpoint.admin_url,
                };
                if !url.is_empty() {
                    return Ok(url.clone());
                }
            }
        }
        Err(ProviderError::Configuration(format!(
            "no {service_type} endpoint available in region {region:?}"
        )))
    }
}

fn endpoint_candidates<'a>(
    entry: &'a CatalogEntry,
    region: &'a str,
) -> impl Iterator<Item = &'a ServiceEndpoint> {
    entry
        .endpoints
        .iter()
        .filter(move |e| region.is_empty() || e.region == region)
}

/// Exchange credentials for a scoped session.
///
/// Any failure here — unreachable endpoint, rejected credentials,
/// unexpected response shape — is a configuration error: the provider
/// cannot operate without a session when one was asked for.
pub async fn authenticate(
    http: &reqwest::Client,
    opts: &AuthOptions,
) -> Result<Session, ProviderError> {
    #[derive(Deserialize)]
    struct TokenResponse {
        access: Access,
    }
    #[derive(Deserialize)]
    struct Access {
        token: Token,
        #[serde(rename = "serviceCatalog", default)]
        service_catalog: Vec<CatalogEntry>,
    }
    #[derive(Deserialize)]
    struct Token {
        id: String,
    }

    let url = format!("{}/tokens", opts.identity_endpoint.trim_end_matches('/'));
    let body = json!({
        "auth": {
            "passwordCredentials": {
                "username": opts.username,
                "password": opts.password,
            },
            "tenantName": opts.tenant_name,
        }
    });

    debug!(endpoint = %opts.identity_endpoint, username = %opts.username, "authenticating identity session");

    let response = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| ProviderError::Configuration(format!("identity authentication failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Configuration(format!(
            "identity authentication failed: {status}"
        )));
    }

    let parsed: TokenResponse = response.json().await.map_err(|e| {
        ProviderError::Configuration(format!("unexpected identity response: {e}"))
    })?;

    Ok(Session {
        token: parsed.access.token.id,
        catalog: parsed.access.service_catalog,
    })
}
