//! Zone DNS record resource.
//!
//! The vendor's domain API happily stores several records for the same
//! (zone, subdomain, type) tuple; create enforces at most one by
//! deleting any matching priors first. Every mutation is followed by a
//! zone refresh so changes propagate to the name servers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{id_str, opt_str, required_str, set_attr};
use crate::client::OvhClient;
use crate::error::{ApiError, ProviderError};
use crate::provider::Resource;
use crate::schema::{Attribute, Schema};

/// Type name this resource registers under.
pub const TYPE: &str = "ovh_domain_record";

/// DNS record in a domain zone.
pub struct DomainRecord;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordCreate<'a> {
    field_type: &'a str,
    sub_domain: &'a str,
    target: &'a str,
    ttl: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordUpdate<'a> {
    sub_domain: &'a str,
    target: &'a str,
    ttl: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordDelete<'a> {
    zone_name: &'a str,
    id: &'a str,
    sub_domain: &'a str,
    target: &'a str,
    ttl: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    id: i64,
    #[serde(default)]
    zone: String,
    field_type: String,
    sub_domain: String,
    target: String,
    ttl: i64,
}

fn record_path(zone: &str, id: &str) -> String {
    format!("/domain/zone/{zone}/record/{id}")
}

/// Ids of every record matching the (zone, subdomain, type) tuple.
async fn matching_record_ids(
    client: &OvhClient,
    zone: &str,
    sub_domain: &str,
    field_type: &str,
) -> Result<Vec<i64>, ApiError> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("fieldType", field_type)
        .append_pair("subDomain", sub_domain)
        .finish();
    client.get(&format!("/domain/zone/{zone}/record?{query}")).await
}

/// Apply pending zone changes so they propagate.
async fn refresh_zone(client: &OvhClient, zone: &str) -> Result<(), ApiError> {
    client
        .post_empty::<()>(&format!("/domain/zone/{zone}/refresh"))
        .await
}

#[async_trait]
impl Resource for DomainRecord {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "domain",
                Attribute::required_string().with_description("Zone the record belongs to"),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("value", Attribute::required_string())
            .with_attribute("type", Attribute::required_string())
            .with_attribute(
                "ttl",
                Attribute::optional_int64()
                    .with_env_default("OVH_DOMAIN_DEFAULT_TTL")
                    .with_default(json!(3600)),
            )
            .with_attribute("id", Attribute::computed_string())
    }

    async fn create(
        &self,
        client: &OvhClient,
        mut state: Value,
    ) -> Result<Value, ProviderError> {
        let zone = required_str(&state, "domain")?.to_string();
        let name = required_str(&state, "name")?.to_string();
        let value = required_str(&state, "value")?.to_string();
        let record_type = required_str(&state, "type")?.to_string();
        let ttl = state.get("ttl").and_then(Value::as_i64).unwrap_or(3600);

        // At most one record per (zone, subdomain, type): delete priors.
        for prior in matching_record_ids(client, &zone, &name, &record_type).await? {
            debug!(zone = %zone, record = prior, "deleting prior record with the same key");
            client
                .delete(&record_path(&zone, &prior.to_string()))
                .await?;
        }

        debug!(zone = %zone, record_type = %record_type, sub_domain = %name, target = %value, "creating domain record");

        let params = RecordCreate {
            field_type: &record_type,
            sub_domain: &name,
            target: &value,
            ttl,
        };
        let created: Record = client
            .post(&format!("/domain/zone/{zone}/record"), &params)
            .await?;

        refresh_zone(client, &zone).await?;

        set_attr(&mut state, "id", json!(created.id.to_string()));
        set_attr(&mut state, "ttl", json!(created.ttl));
        Ok(state)
    }

    async fn read(&self, client: &OvhClient, mut state: Value) -> Result<Value, ProviderError> {
        let zone = required_str(&state, "domain")?.to_string();
        let id = id_str(&state)?.to_string();

        let record: Record = client.get(&record_path(&zone, &id)).await?;

        set_attr(&mut state, "name", json!(record.sub_domain));
        set_attr(&mut state, "value", json!(record.target));
        set_attr(&mut state, "type", json!(record.field_type));
        set_attr(&mut state, "ttl", json!(record.ttl));
        if !record.zone.is_empty() {
            set_attr(&mut state, "domain", json!(record.zone));
        }
        Ok(state)
    }

    async fn update(
        &self,
        client: &OvhClient,
        prior: Value,
        mut planned: Value,
    ) -> Result<Value, ProviderError> {
        let zone = required_str(&planned, "domain")?.to_string();
        let id = id_str(&prior)?.to_string();
        let name = required_str(&planned, "name")?.to_string();
        let value = required_str(&planned, "value")?.to_string();
        let ttl = planned.get("ttl").and_then(Value::as_i64).unwrap_or(3600);

        let params = RecordUpdate {
            sub_domain: &name,
            target: &value,
            ttl,
        };
        client.put(&record_path(&zone, &id), &params).await?;

        refresh_zone(client, &zone).await?;

        set_attr(&mut planned, "id", json!(id));
        Ok(planned)
    }

    async fn delete(&self, client: &OvhClient, state: Value) -> Result<(), ProviderError> {
        let zone = required_str(&state, "domain")?.to_string();
        let id = id_str(&state)?.to_string();
        let ttl = state.get("ttl").and_then(Value::as_i64).unwrap_or(3600);

        debug!(zone = %zone, record = %id, "deleting domain record");

        let params = RecordDelete {
            zone_name: &zone,
            id: &id,
            sub_domain: opt_str(&state, "name"),
            target: opt_str(&state, "value"),
            ttl,
        };
        client
            .delete_with_body(&record_path(&zone, &id), &params)
            .await?;

        refresh_zone(client, &zone).await?;
        Ok(())
    }

    async fn exists(&self, client: &OvhClient, state: Value) -> Result<bool, ProviderError> {
        let zone = required_str(&state, "domain")?.to_string();
        let id = id_str(&state)?.to_string();

        match client.get::<Record>(&record_path(&zone, &id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    fn record_json(id: i64) -> Value {
        json!({
            "id": id,
            "zone": "example.com",
            "fieldType": "A",
            "subDomain": "www",
            "target": "192.0.2.1",
            "ttl": 3600,
        })
    }

    fn base_state() -> Value {
        json!({
            "domain": "example.com",
            "name": "www",
            "type": "A",
            "value": "192.0.2.1",
            "ttl": 3600,
        })
    }

    #[tokio::test]
    async fn test_create_deletes_matching_priors_first() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Get,
            "/domain/zone/example.com/record?fieldType=A&subDomain=www",
            json!([111, 222]),
        );
        transport.stub(Method::Delete, "/domain/zone/example.com/record/111", Value::Null);
        transport.stub(Method::Delete, "/domain/zone/example.com/record/222", Value::Null);
        transport.stub(Method::Post, "/domain/zone/example.com/record", record_json(333));
        transport.stub(Method::Post, "/domain/zone/example.com/refresh", Value::Null);

        let client = OvhClient::new(transport.clone());
        let state = DomainRecord.create(&client, base_state()).await.unwrap();

        assert_eq!(state["id"], "333");

        let calls = transport.calls();
        let order: Vec<_> = calls.iter().map(|c| (c.method, c.path.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (Method::Get, "/domain/zone/example.com/record?fieldType=A&subDomain=www"),
                (Method::Delete, "/domain/zone/example.com/record/111"),
                (Method::Delete, "/domain/zone/example.com/record/222"),
                (Method::Post, "/domain/zone/example.com/record"),
                (Method::Post, "/domain/zone/example.com/refresh"),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_without_priors() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Get,
            "/domain/zone/example.com/record?fieldType=A&subDomain=www",
            json!([]),
        );
        transport.stub(Method::Post, "/domain/zone/example.com/record", record_json(42));
        transport.stub(Method::Post, "/domain/zone/example.com/refresh", Value::Null);

        let client = OvhClient::new(transport.clone());
        let state = DomainRecord.create(&client, base_state()).await.unwrap();

        assert_eq!(state["id"], "42");
        assert_eq!(transport.count(Method::Delete, "/domain/zone/example.com/record/42"), 0);
        assert_eq!(transport.count(Method::Post, "/domain/zone/example.com/refresh"), 1);
    }

    #[tokio::test]
    async fn test_create_sends_vendor_shaped_body() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Get,
            "/domain/zone/example.com/record?fieldType=A&subDomain=www",
            json!([]),
        );
        transport.stub(Method::Post, "/domain/zone/example.com/record", record_json(42));
        transport.stub(Method::Post, "/domain/zone/example.com/refresh", Value::Null);

        let client = OvhClient::new(transport.clone());
        DomainRecord.create(&client, base_state()).await.unwrap();

        let calls = transport.calls();
        let body = calls[1].body.as_ref().unwrap();
        assert_eq!(
            body,
            &json!({"fieldType": "A", "subDomain": "www", "target": "192.0.2.1", "ttl": 3600})
        );
    }

    #[tokio::test]
    async fn test_read_repopulates_every_field() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Get,
            "/domain/zone/example.com/record/333",
            json!({
                "id": 333,
                "zone": "example.com",
                "fieldType": "CNAME",
                "subDomain": "mail",
                "target": "mx.example.net.",
                "ttl": 300,
            }),
        );

        let client = OvhClient::new(transport);
        let mut state = base_state();
        state["id"] = json!("333");
        let state = DomainRecord.read(&client, state).await.unwrap();

        assert_eq!(state["name"], "mail");
        assert_eq!(state["value"], "mx.example.net.");
        assert_eq!(state["type"], "CNAME");
        assert_eq!(state["ttl"], 300);
        assert_eq!(state["domain"], "example.com");
    }

    #[tokio::test]
    async fn test_read_propagates_lookup_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.stub_error(
            Method::Get,
            "/domain/zone/example.com/record/333",
            404,
            "This record does not exist",
        );

        let client = OvhClient::new(transport);
        let mut state = base_state();
        state["id"] = json!("333");
        let err = DomainRecord.read(&client, state).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_refreshes_zone() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Put, "/domain/zone/example.com/record/333", Value::Null);
        transport.stub(Method::Post, "/domain/zone/example.com/refresh", Value::Null);

        let client = OvhClient::new(transport.clone());
        let mut prior = base_state();
        prior["id"] = json!("333");
        let mut planned = base_state();
        planned["value"] = json!("198.51.100.7");

        let state = DomainRecord.update(&client, prior, planned).await.unwrap();

        assert_eq!(state["id"], "333");
        assert_eq!(transport.count(Method::Post, "/domain/zone/example.com/refresh"), 1);

        let calls = transport.calls();
        assert_eq!(calls[0].body.as_ref().unwrap()["target"], "198.51.100.7");
    }

    #[tokio::test]
    async fn test_delete_carries_body_and_refreshes() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Delete, "/domain/zone/example.com/record/333", Value::Null);
        transport.stub(Method::Post, "/domain/zone/example.com/refresh", Value::Null);

        let client = OvhClient::new(transport.clone());
        let mut state = base_state();
        state["id"] = json!("333");
        DomainRecord.delete(&client, state).await.unwrap();

        let calls = transport.calls();
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(body["zoneName"], "example.com");
        assert_eq!(body["id"], "333");
        assert_eq!(transport.count(Method::Post, "/domain/zone/example.com/refresh"), 1);
    }

    #[tokio::test]
    async fn test_exists() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Get, "/domain/zone/example.com/record/333", record_json(333));
        transport.stub_error(
            Method::Get,
            "/domain/zone/example.com/record/999",
            404,
            "This record does not exist",
        );

        let client = OvhClient::new(transport);
        let mut state = base_state();
        state["id"] = json!("333");
        assert!(DomainRecord.exists(&client, state).await.unwrap());

        let mut state = base_state();
        state["id"] = json!("999");
        assert!(!DomainRecord.exists(&client, state).await.unwrap());
    }
}
