//! The provider: the ABI surface the host runtime drives.
//!
//! The host keys its calls by resource type name; [`OvhProvider`] owns
//! the registry mapping each name to its [`Resource`] implementation and
//! the configured vendor connection, and dispatches the host-facing
//! [`ProviderService`] operations.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::OvhClient;
use crate::config::{Connection, ProviderConfig};
use crate::error::ProviderError;
use crate::resources;
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation;

/// A resource type: its schema plus CRUD callbacks over JSON state.
///
/// State documents are the host's declarative field maps; the persisted
/// vendor identifier lives under `id`.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The resource's schema.
    fn schema(&self) -> Schema;

    /// Create the vendor object and return state with `id` persisted.
    async fn create(&self, client: &OvhClient, state: Value) -> Result<Value, ProviderError>;

    /// Re-populate every declarative field from current vendor state.
    async fn read(&self, client: &OvhClient, state: Value) -> Result<Value, ProviderError>;

    /// Apply mutable-field changes. Resources whose attributes all force
    /// replacement keep the default.
    async fn update(
        &self,
        client: &OvhClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (client, prior, planned);
        Err(ProviderError::Unimplemented(
            "update is not supported for this resource type".to_string(),
        ))
    }

    /// Delete the vendor object, blocking until teardown finishes.
    async fn delete(&self, client: &OvhClient, state: Value) -> Result<(), ProviderError>;

    /// Whether the vendor still returns the object.
    async fn exists(&self, client: &OvhClient, state: Value) -> Result<bool, ProviderError>;

    /// Recover importable state from a vendor identifier.
    async fn import(&self, client: &OvhClient, id: &str) -> Result<Value, ProviderError> {
        let _ = (client, id);
        Err(ProviderError::Unimplemented(
            "import is not supported for this resource type".to_string(),
        ))
    }
}

/// The host-facing provider ABI.
#[async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// The provider's schema including all resource types.
    fn schema(&self) -> ProviderSchema;

    /// The registered resource type names.
    fn resource_types(&self) -> Vec<String> {
        self.schema().resources.keys().cloned().collect()
    }

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&self.schema().provider, &config))
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value)
        -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value)
        -> Result<(), ProviderError>;

    /// Whether the resource still exists vendor-side. Used by destroy
    /// checks and import flows.
    async fn exists(&self, resource_type: &str, current_state: Value)
        -> Result<bool, ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// The OVHcloud provider.
pub struct OvhProvider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    connection: RwLock<Option<Arc<Connection>>>,
}

impl OvhProvider {
    /// An unconfigured provider with every resource type registered.
    pub fn new() -> Self {
        let mut registry: BTreeMap<&'static str, Box<dyn Resource>> = BTreeMap::new();
        registry.insert(
            resources::domain_record::TYPE,
            Box::new(resources::domain_record::DomainRecord),
        );
        registry.insert(
            resources::private_network::TYPE,
            Box::new(resources::private_network::PrivateNetwork),
        );
        registry.insert(
            resources::private_network_subnet::TYPE,
            Box::new(resources::private_network_subnet::PrivateNetworkSubnet),
        );
        registry.insert(
            resources::user::TYPE,
            Box::new(resources::user::PublicCloudUser),
        );
        registry.insert(
            resources::vrack_attachment::TYPE,
            Box::new(resources::vrack_attachment::VrackAttachment),
        );

        Self {
            resources: registry,
            connection: RwLock::new(None),
        }
    }

    /// A provider over an already-opened connection, bypassing
    /// [`configure`](ProviderService::configure). Used by the test
    /// harness.
    pub fn with_connection(connection: Connection) -> Self {
        let provider = Self::new();
        provider.install(connection);
        provider
    }

    fn install(&self, connection: Connection) {
        let mut slot = self
            .connection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(connection));
    }

    fn connection(&self) -> Result<Arc<Connection>, ProviderError> {
        self.connection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| {
                ProviderError::Configuration("provider is not configured".to_string())
            })
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    /// State with the resource schema's env/static defaults resolved.
    fn resolved(&self, resource_type: &str, mut state: Value) -> Result<Value, ProviderError> {
        self.resource(resource_type)?
            .schema()
            .apply_defaults(&mut state)?;
        Ok(state)
    }

    fn provider_config_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "endpoint",
                Attribute::required_string().with_env_default("OVH_ENDPOINT"),
            )
            .with_attribute(
                "application_key",
                Attribute::optional_string().with_env_default("OVH_APPLICATION_KEY"),
            )
            .with_attribute(
                "application_secret",
                Attribute::optional_string()
                    .with_env_default("OVH_APPLICATION_SECRET")
                    .sensitive(),
            )
            .with_attribute(
                "consumer_key",
                Attribute::optional_string()
                    .with_env_default("OVH_CONSUMER_KEY")
                    .sensitive(),
            )
            .with_attribute(
                "os_auth_url",
                Attribute::optional_string().with_env_default("OS_AUTH_URL"),
            )
            .with_attribute(
                "os_user_name",
                Attribute::optional_string().with_env_default("OS_USERNAME"),
            )
            .with_attribute(
                "os_tenant_name",
                Attribute::optional_string().with_env_default("OS_TENANT_NAME"),
            )
            .with_attribute(
                "os_password",
                Attribute::optional_string()
                    .with_env_default("OS_PASSWORD")
                    .sensitive(),
            )
            .with_attribute(
                "os_endpoint_type",
                Attribute::optional_string().with_env_default("OS_ENDPOINT_TYPE"),
            )
    }
}

impl Default for OvhProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderService for OvhProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema =
            ProviderSchema::new().with_provider_config(Self::provider_config_schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        schema
    }

    fn resource_types(&self) -> Vec<String> {
        self.resources.keys().map(|k| k.to_string()).collect()
    }

    async fn configure(&self, mut config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Self::provider_config_schema().apply_defaults(&mut config)?;
        let parsed: ProviderConfig = serde_json::from_value(config)?;
        debug!(config = ?parsed, "configuring provider");

        let connection = parsed.load_and_validate().await?;
        self.install(connection);

        info!("provider configured");
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(validation::validate(&resource.schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        Ok(diff(&schema, prior_state, proposed_state))
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let connection = self.connection()?;
        let state = self.resolved(resource_type, planned_state)?;
        info!(resource_type, "creating resource");
        self.resource(resource_type)?
            .create(connection.client(), state)
            .await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let connection = self.connection()?;
        let state = self.resolved(resource_type, current_state)?;
        self.resource(resource_type)?
            .read(connection.client(), state)
            .await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let connection = self.connection()?;
        let planned = self.resolved(resource_type, planned_state)?;
        info!(resource_type, "updating resource");
        self.resource(resource_type)?
            .update(connection.client(), prior_state, planned)
            .await
    }

    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let connection = self.connection()?;
        let state = self.resolved(resource_type, current_state)?;
        info!(resource_type, "deleting resource");
        self.resource(resource_type)?
            .delete(connection.client(), state)
            .await
    }

    async fn exists(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<bool, ProviderError> {
        let connection = self.connection()?;
        let state = self.resolved(resource_type, current_state)?;
        self.resource(resource_type)?
            .exists(connection.client(), state)
            .await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let connection = self.connection()?;
        info!(resource_type, id, "importing resource");
        let state = self
            .resource(resource_type)?
            .import(connection.client(), id)
            .await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}

/// Schema-driven plan: compare prior and proposed state per attribute.
///
/// Computed attributes and blocks absent from the proposal carry their
/// prior values forward; a change to a force-new attribute marks the
/// plan as requiring replacement.
fn diff(schema: &Schema, prior: Option<Value>, proposed: Value) -> PlanResult {
    let prior = match prior {
        None => {
            let changes = proposed
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| AttributeChange::added(k.as_str(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            return PlanResult::with_changes(proposed, changes, false);
        }
        Some(prior) => prior,
    };

    let mut planned = proposed;
    let mut changes = Vec::new();
    let mut requires_replace = false;

    if let (Some(planned_obj), Some(prior_obj)) = (planned.as_object_mut(), prior.as_object()) {
        for (name, attr) in &schema.block.attributes {
            let before = prior_obj.get(name).cloned().filter(|v| !v.is_null());
            let after = planned_obj.get(name).cloned().filter(|v| !v.is_null());

            if attr.flags.computed && after.is_none() {
                if let Some(before) = before {
                    planned_obj.insert(name.clone(), before);
                }
                continue;
            }

            if before != after {
                if attr.force_new {
                    requires_replace = true;
                }
                changes.push(AttributeChange::new(name.as_str(), before, after));
            }
        }

        for name in schema.block.blocks.keys() {
            let absent = matches!(planned_obj.get(name), None | Some(Value::Null));
            if absent {
                if let Some(before) = prior_obj.get(name).cloned() {
                    planned_obj.insert(name.clone(), before);
                }
            }
        }
    }

    if changes.is_empty() {
        PlanResult::no_change(planned)
    } else {
        PlanResult::with_changes(planned, changes, requires_replace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn provider_with_mock() -> (OvhProvider, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = OvhClient::new(transport.clone());
        let provider = OvhProvider::with_connection(Connection::new(client));
        (provider, transport)
    }

    #[test]
    fn test_registry_lists_every_resource_type() {
        let provider = OvhProvider::new();
        assert_eq!(
            provider.resource_types(),
            vec![
                "ovh_domain_record",
                "ovh_publiccloud_private_network",
                "ovh_publiccloud_private_network_subnet",
                "ovh_publiccloud_user",
                "ovh_vrack_publiccloud_attachment",
            ]
        );

        let schema = ProviderService::schema(&provider);
        assert_eq!(schema.resources.len(), 5);
        assert!(schema.provider.block.attributes.contains_key("endpoint"));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (provider, _) = provider_with_mock();
        let err = provider
            .create("ovh_dedicated_server", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_refuses_operations() {
        let provider = OvhProvider::new();
        let err = provider
            .read("ovh_domain_record", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_endpoint_alias() {
        let provider = OvhProvider::new();
        let err = provider
            .configure(json!({"endpoint": "ovh-mars"}))
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("not a valid ovh endpoint"));
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let provider = OvhProvider::new();

        let diagnostics = provider
            .validate_resource_config(
                "ovh_domain_record",
                json!({"domain": "example.com", "name": "www", "value": "1.2.3.4", "type": "A"}),
            )
            .await
            .unwrap();
        assert!(diagnostics.is_empty());

        let diagnostics = provider
            .validate_resource_config("ovh_domain_record", json!({"domain": 42}))
            .await
            .unwrap();
        assert!(!diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_plan_create_lists_additions() {
        let provider = OvhProvider::new();
        let plan = provider
            .plan(
                "ovh_publiccloud_private_network",
                None,
                json!({"project_id": "p-1", "name": "backend"}),
            )
            .await
            .unwrap();

        assert_eq!(plan.changes.len(), 2);
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_update_in_place_vs_replacement() {
        let provider = OvhProvider::new();
        let prior = json!({
            "project_id": "p-1", "name": "backend", "vlan_id": 1,
            "id": "pn-1", "status": "ACTIVE",
        });

        // `name` is mutable: in-place change.
        let plan = provider
            .plan(
                "ovh_publiccloud_private_network",
                Some(prior.clone()),
                json!({"project_id": "p-1", "name": "frontend", "vlan_id": 1}),
            )
            .await
            .unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "name");
        assert!(!plan.requires_replace);
        // Computed attributes carry forward.
        assert_eq!(plan.planned_state["status"], "ACTIVE");
        assert_eq!(plan.planned_state["id"], "pn-1");

        // `vlan_id` forces new.
        let plan = provider
            .plan(
                "ovh_publiccloud_private_network",
                Some(prior),
                json!({"project_id": "p-1", "name": "backend", "vlan_id": 7}),
            )
            .await
            .unwrap();
        assert!(plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_no_change() {
        let provider = OvhProvider::new();
        let state = json!({"vrack_id": "pn-0001", "project_id": "p-1", "id": "x"});
        let plan = provider
            .plan(
                "ovh_vrack_publiccloud_attachment",
                Some(state.clone()),
                state,
            )
            .await
            .unwrap();
        assert!(plan.changes.is_empty());
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_create_applies_schema_defaults() {
        let (provider, transport) = provider_with_mock();
        transport.stub(
            Method::Get,
            "/domain/zone/example.com/record?fieldType=A&subDomain=www",
            json!([]),
        );
        transport.stub(
            Method::Post,
            "/domain/zone/example.com/record",
            json!({"id": 1, "zone": "example.com", "fieldType": "A", "subDomain": "www", "target": "1.2.3.4", "ttl": 3600}),
        );
        transport.stub(Method::Post, "/domain/zone/example.com/refresh", Value::Null);

        provider
            .create(
                "ovh_domain_record",
                json!({"domain": "example.com", "name": "www", "type": "A", "value": "1.2.3.4"}),
            )
            .await
            .unwrap();

        // ttl was absent: the schema default flowed into the payload.
        let calls = transport.calls();
        let create_call = calls
            .iter()
            .find(|c| c.method == Method::Post && c.path.ends_with("/record"))
            .unwrap();
        assert_eq!(create_call.body.as_ref().unwrap()["ttl"], 3600);
    }

    #[tokio::test]
    async fn test_import_dispatch_wraps_state() {
        let (provider, _) = provider_with_mock();
        let imported = provider
            .import_resource(
                "ovh_vrack_publiccloud_attachment",
                "vrack_pn-0001-cloudproject_p-1-attach",
            )
            .await
            .unwrap();

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "ovh_vrack_publiccloud_attachment");
        assert_eq!(imported[0].state["vrack_id"], "pn-0001");
    }

    #[tokio::test]
    async fn test_import_unsupported_for_subnets() {
        let (provider, _) = provider_with_mock();
        let err = provider
            .import_resource("ovh_publiccloud_private_network_subnet", "sub-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
    }
}
