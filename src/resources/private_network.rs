//! Public cloud private network resource.
//!
//! Networks are provisioned asynchronously: the create call returns a
//! `BUILDING` object and the provider waits until every region reports
//! the network `ACTIVE`. Teardown mirrors this with `DELETING` until the
//! object reports `DELETED` or disappears.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{id_str, opt_i64, required_str, set_attr};
use crate::client::OvhClient;
use crate::error::ProviderError;
use crate::poll::StateWaiter;
use crate::provider::Resource;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

/// Type name this resource registers under.
pub const TYPE: &str = "ovh_publiccloud_private_network";

/// vRack-backed private network of a public cloud project.
pub struct PrivateNetwork;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkCreate<'a> {
    service_name: &'a str,
    vlan_id: i64,
    name: &'a str,
    regions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NetworkUpdate<'a> {
    name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkRegion {
    #[serde(default)]
    status: String,
    #[serde(default)]
    region: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Network {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    vlan_id: i64,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    regions: Vec<NetworkRegion>,
}

fn network_path(project: &str, id: &str) -> String {
    format!("/cloud/project/{project}/network/private/{id}")
}

fn regions_from_state(state: &Value) -> Vec<String> {
    state
        .get("regions")
        .and_then(Value::as_array)
        .map(|regions| {
            regions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn populate(state: &mut Value, network: &Network) {
    set_attr(state, "name", json!(network.name));
    set_attr(state, "status", json!(network.status));
    set_attr(state, "type", json!(network.kind));
    set_attr(state, "vlan_id", json!(network.vlan_id));

    let regions: Vec<&str> = network.regions.iter().map(|r| r.region.as_str()).collect();
    let regions_status: Vec<Value> = network
        .regions
        .iter()
        .map(|r| json!({"region": r.region, "status": r.status}))
        .collect();
    set_attr(state, "regions", json!(regions));
    set_attr(state, "regions_status", json!(regions_status));
    set_attr(state, "id", json!(network.id));
}

type RefreshFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<(Network, String), crate::error::ApiError>> + Send>,
>;

/// Refresh closure polling the network's status endpoint.
fn refresh(client: &OvhClient, path: &str) -> impl FnMut() -> RefreshFuture {
    let client = client.clone();
    let path = path.to_string();
    move || -> RefreshFuture {
        let client = client.clone();
        let path = path.clone();
        Box::pin(async move {
            let network: Network = client.get(&path).await?;
            let status = network.status.clone();
            Ok((network, status))
        })
    }
}

#[async_trait]
impl Resource for PrivateNetwork {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_env_default("OVH_PROJECT_ID")
                    .force_new(),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "vlan_id",
                Attribute::optional_int64().with_default(json!(0)).force_new(),
            )
            .with_attribute(
                "regions",
                Attribute::new(
                    AttributeType::set(AttributeType::String),
                    AttributeFlags::optional_computed(),
                )
                .force_new(),
            )
            .with_block(
                "regions_status",
                NestedBlock::set(
                    Block::new()
                        .with_attribute("status", Attribute::computed_string())
                        .with_attribute(
                            "region",
                            Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
                        ),
                ),
            )
            .with_attribute("status", Attribute::computed_string())
            .with_attribute("type", Attribute::computed_string())
            .with_attribute("id", Attribute::computed_string())
    }

    async fn create(
        &self,
        client: &OvhClient,
        mut state: Value,
    ) -> Result<Value, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let name = required_str(&state, "name")?.to_string();

        let params = NetworkCreate {
            service_name: &project,
            vlan_id: opt_i64(&state, "vlan_id").unwrap_or(0),
            name: &name,
            regions: regions_from_state(&state),
        };

        debug!(project = %project, name = %name, "creating private network");

        let network: Network = client
            .post(&format!("/cloud/project/{project}/network/private"), &params)
            .await?;

        let path = network_path(&project, &network.id);
        StateWaiter::new(format!("private network {}", network.id))
            .pending(&["BUILDING"])
            .target(&["ACTIVE"])
            .wait_for(refresh(client, &path))
            .await?;

        debug!(network = %network.id, "private network active");

        set_attr(&mut state, "id", json!(network.id));
        Ok(state)
    }

    async fn read(&self, client: &OvhClient, mut state: Value) -> Result<Value, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();

        let network: Network = client.get(&network_path(&project, &id)).await?;
        populate(&mut state, &network);
        Ok(state)
    }

    async fn update(
        &self,
        client: &OvhClient,
        prior: Value,
        mut planned: Value,
    ) -> Result<Value, ProviderError> {
        let project = required_str(&planned, "project_id")?.to_string();
        let id = id_str(&prior)?.to_string();
        let name = required_str(&planned, "name")?.to_string();

        client
            .put(&network_path(&project, &id), &NetworkUpdate { name: &name })
            .await?;

        debug!(project = %project, network = %id, "renamed private network");

        set_attr(&mut planned, "id", json!(id));
        Ok(planned)
    }

    async fn delete(&self, client: &OvhClient, state: Value) -> Result<(), ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();
        let path = network_path(&project, &id);

        debug!(project = %project, network = %id, "deleting private network");

        client.delete(&path).await?;

        StateWaiter::new(format!("deletion of private network {id}"))
            .pending(&["DELETING"])
            .target(&["DELETED"])
            .absent_means("DELETED")
            .wait_for(refresh(client, &path))
            .await?;

        Ok(())
    }

    async fn exists(&self, client: &OvhClient, state: Value) -> Result<bool, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();

        match client.get::<Network>(&network_path(&project, &id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn import(&self, _client: &OvhClient, id: &str) -> Result<Value, ProviderError> {
        // The composite state is recovered by the read that follows; the
        // owning project is not part of the vendor id.
        let project = std::env::var("OVH_PROJECT_ID").unwrap_or_default();
        Ok(json!({"id": id, "project_id": project}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    fn network_json(status: &str) -> Value {
        json!({
            "id": "pn-1000",
            "status": status,
            "vlanId": 42,
            "name": "backend",
            "type": "private",
            "regions": [
                {"region": "GRA1", "status": status},
                {"region": "SBG3", "status": status},
            ],
        })
    }

    const NETWORK_PATH: &str = "/cloud/project/p-1/network/private/pn-1000";

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_active() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Post,
            "/cloud/project/p-1/network/private",
            network_json("BUILDING"),
        );
        transport.enqueue(Method::Get, NETWORK_PATH, Ok(network_json("BUILDING")));
        transport.enqueue(Method::Get, NETWORK_PATH, Ok(network_json("BUILDING")));
        transport.enqueue(Method::Get, NETWORK_PATH, Ok(network_json("ACTIVE")));

        let client = OvhClient::new(transport.clone());
        let state = PrivateNetwork
            .create(
                &client,
                json!({"project_id": "p-1", "name": "backend", "vlan_id": 42, "regions": ["GRA1", "SBG3"]}),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "pn-1000");
        assert_eq!(transport.count(Method::Get, NETWORK_PATH), 3);

        // The create body follows the vendor's shape.
        let calls = transport.calls();
        assert_eq!(
            calls[0].body.as_ref().unwrap(),
            &json!({"serviceName": "p-1", "vlanId": 42, "name": "backend", "regions": ["GRA1", "SBG3"]})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_fails_when_network_never_activates() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Post,
            "/cloud/project/p-1/network/private",
            network_json("BUILDING"),
        );
        transport.stub(Method::Get, NETWORK_PATH, network_json("BUILDING"));

        let client = OvhClient::new(transport);
        let err = PrivateNetwork
            .create(&client, json!({"project_id": "p-1", "name": "backend"}))
            .await
            .unwrap_err();

        match err {
            ProviderError::DeadlineExceeded(msg) => {
                assert!(msg.contains("private network pn-1000"))
            }
            other => panic!("expected DeadlineExceeded, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_read_round_trips_vendor_fields() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Get, NETWORK_PATH, network_json("ACTIVE"));

        let client = OvhClient::new(transport);
        let state = PrivateNetwork
            .read(&client, json!({"project_id": "p-1", "id": "pn-1000"}))
            .await
            .unwrap();

        assert_eq!(state["name"], "backend");
        assert_eq!(state["status"], "ACTIVE");
        assert_eq!(state["type"], "private");
        assert_eq!(state["vlan_id"], 42);
        assert_eq!(state["regions"], json!(["GRA1", "SBG3"]));
        assert_eq!(
            state["regions_status"],
            json!([
                {"region": "GRA1", "status": "ACTIVE"},
                {"region": "SBG3", "status": "ACTIVE"},
            ])
        );
    }

    #[tokio::test]
    async fn test_update_renames() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Put, NETWORK_PATH, Value::Null);

        let client = OvhClient::new(transport.clone());
        let state = PrivateNetwork
            .update(
                &client,
                json!({"project_id": "p-1", "id": "pn-1000", "name": "backend"}),
                json!({"project_id": "p-1", "name": "frontend"}),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "pn-1000");
        let calls = transport.calls();
        assert_eq!(calls[0].body.as_ref().unwrap(), &json!({"name": "frontend"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_polls_until_gone() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Delete, NETWORK_PATH, Value::Null);
        transport.enqueue(Method::Get, NETWORK_PATH, Ok(network_json("DELETING")));
        transport.enqueue(
            Method::Get,
            NETWORK_PATH,
            Err((404, "This private network does not exist".to_string())),
        );

        let client = OvhClient::new(transport.clone());
        PrivateNetwork
            .delete(&client, json!({"project_id": "p-1", "id": "pn-1000"}))
            .await
            .unwrap();

        assert_eq!(transport.count(Method::Get, NETWORK_PATH), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_accepts_explicit_deleted_status() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Delete, NETWORK_PATH, Value::Null);
        transport.enqueue(Method::Get, NETWORK_PATH, Ok(network_json("DELETING")));
        transport.enqueue(Method::Get, NETWORK_PATH, Ok(network_json("DELETED")));

        let client = OvhClient::new(transport);
        PrivateNetwork
            .delete(&client, json!({"project_id": "p-1", "id": "pn-1000"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_import_recovers_project_from_environment() {
        let _guard = crate::testing::env_lock();
        std::env::set_var("OVH_PROJECT_ID", "p-imported");
        let client = OvhClient::new(Arc::new(MockTransport::new()));
        let state = PrivateNetwork.import(&client, "pn-7").await.unwrap();
        assert_eq!(state["id"], "pn-7");
        assert_eq!(state["project_id"], "p-imported");
        std::env::remove_var("OVH_PROJECT_ID");
    }
}
