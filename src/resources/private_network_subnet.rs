//! Subnet of a public cloud private network.
//!
//! Subnets are synchronous on the vendor side, so no polling is
//! involved. The vendor exposes no per-subnet read endpoint: reads list
//! the network's subnets and locate the stored identifier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{id_str, opt_bool, required_str, set_attr};
use crate::client::OvhClient;
use crate::error::ProviderError;
use crate::provider::Resource;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

/// Type name this resource registers under.
pub const TYPE: &str = "ovh_publiccloud_private_network_subnet";

/// Address range allocated inside a private network region.
pub struct PrivateNetworkSubnet;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubnetCreate<'a> {
    service_name: &'a str,
    network_id: &'a str,
    dhcp: bool,
    no_gateway: bool,
    start: &'a str,
    end: &'a str,
    network: &'a str,
    region: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpPool {
    #[serde(default)]
    network: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    dhcp: bool,
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subnet {
    id: String,
    #[serde(default)]
    gateway_ip: Option<String>,
    #[serde(default)]
    cidr: Option<String>,
    #[serde(default)]
    ip_pools: Vec<IpPool>,
}

fn subnets_path(project: &str, network: &str) -> String {
    format!("/cloud/project/{project}/network/private/{network}/subnet")
}

async fn list_subnets(
    client: &OvhClient,
    project: &str,
    network: &str,
) -> Result<Vec<Subnet>, ProviderError> {
    Ok(client.get(&subnets_path(project, network)).await?)
}

fn populate(state: &mut Value, subnet: &Subnet) {
    set_attr(state, "gateway_ip", json!(subnet.gateway_ip));
    set_attr(state, "cidr", json!(subnet.cidr));

    let pools: Vec<Value> = subnet
        .ip_pools
        .iter()
        .map(|p| {
            json!({
                "network": p.network,
                "region": p.region,
                "dhcp": p.dhcp,
                "start": p.start,
                "end": p.end,
            })
        })
        .collect();
    set_attr(state, "ip_pools", json!(pools));
    set_attr(state, "id", json!(subnet.id));
}

#[async_trait]
impl Resource for PrivateNetworkSubnet {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("project_id", Attribute::required_string().force_new())
            .with_attribute("network_id", Attribute::required_string().force_new())
            .with_attribute(
                "dhcp",
                Attribute::optional_bool().with_default(json!(false)).force_new(),
            )
            .with_attribute("start", Attribute::required_string().force_new())
            .with_attribute("end", Attribute::required_string().force_new())
            .with_attribute("network", Attribute::required_string().force_new())
            .with_attribute("region", Attribute::required_string().force_new())
            .with_attribute(
                "no_gateway",
                Attribute::optional_bool().with_default(json!(false)).force_new(),
            )
            .with_attribute(
                "gateway_ip",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
            )
            .with_attribute(
                "cidr",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
            )
            .with_block(
                "ip_pools",
                NestedBlock::set(
                    Block::new()
                        .with_attribute("network", Attribute::computed_string())
                        .with_attribute("region", Attribute::computed_string())
                        .with_attribute(
                            "dhcp",
                            Attribute::new(AttributeType::Bool, AttributeFlags::computed()),
                        )
                        .with_attribute("start", Attribute::computed_string())
                        .with_attribute("end", Attribute::computed_string()),
                ),
            )
            .with_attribute("id", Attribute::computed_string())
    }

    async fn create(
        &self,
        client: &OvhClient,
        mut state: Value,
    ) -> Result<Value, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let network_id = required_str(&state, "network_id")?.to_string();
        let start = required_str(&state, "start")?.to_string();
        let end = required_str(&state, "end")?.to_string();
        let network = required_str(&state, "network")?.to_string();
        let region = required_str(&state, "region")?.to_string();

        let params = SubnetCreate {
            service_name: &project,
            network_id: &network_id,
            dhcp: opt_bool(&state, "dhcp"),
            no_gateway: opt_bool(&state, "no_gateway"),
            start: &start,
            end: &end,
            network: &network,
            region: &region,
        };

        debug!(project = %project, network = %network_id, region = %region, "creating subnet");

        let subnet: Subnet = client
            .post(&subnets_path(&project, &network_id), &params)
            .await?;

        set_attr(&mut state, "id", json!(subnet.id));
        Ok(state)
    }

    async fn read(&self, client: &OvhClient, mut state: Value) -> Result<Value, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let network_id = required_str(&state, "network_id")?.to_string();
        let id = id_str(&state)?.to_string();

        let subnets = list_subnets(client, &project, &network_id).await?;
        let subnet = subnets
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ProviderError::NotFound(format!("subnet {id}")))?;

        populate(&mut state, subnet);
        Ok(state)
    }

    async fn delete(&self, client: &OvhClient, state: Value) -> Result<(), ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let network_id = required_str(&state, "network_id")?.to_string();
        let id = id_str(&state)?.to_string();

        debug!(project = %project, network = %network_id, subnet = %id, "deleting subnet");

        client
            .delete(&format!("{}/{id}", subnets_path(&project, &network_id)))
            .await?;
        Ok(())
    }

    async fn exists(&self, client: &OvhClient, state: Value) -> Result<bool, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let network_id = required_str(&state, "network_id")?.to_string();
        let id = id_str(&state)?.to_string();

        let subnets = list_subnets(client, &project, &network_id).await?;
        Ok(subnets.iter().any(|s| s.id == id))
    }
}
