//! Public cloud project user resource.
//!
//! The vendor returns the password only when it is (re)generated —
//! creation and explicit regeneration — never on plain reads, so read
//! must not clobber the stored value. The `openstack_rc` map is scraped
//! out of the vendor's openrc shell script by fixed-format extraction;
//! the vendor gives no schema guarantee for that document.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{id_str, opt_str, required_str, set_attr};
use crate::client::OvhClient;
use crate::error::ProviderError;
use crate::poll::StateWaiter;
use crate::provider::Resource;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Type name this resource registers under.
pub const TYPE: &str = "ovh_publiccloud_user";

/// Operator account of a public cloud project, with its generated
/// OpenStack credentials.
pub struct PublicCloudUser;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserCreate<'a> {
    service_name: &'a str,
    description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: i64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    description: String,
    /// Only present in creation/regeneration responses.
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    creation_date: String,
}

#[derive(Debug, Deserialize)]
struct OpenstackRc {
    content: String,
}

static RC_AUTH_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"export OS_AUTH_URL="?([^\s"]+)"?"#).expect("static pattern"));
static RC_TENANT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"export OS_TENANT_ID="?([[:alnum:]]+)"?"#).expect("static pattern"));
static RC_TENANT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"export OS_TENANT_NAME="?([[:alnum:]]+)"?"#).expect("static pattern")
});
static RC_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"export OS_USERNAME="?([[:alnum:]]+)"?"#).expect("static pattern"));

fn user_path(project: &str, id: &str) -> String {
    format!("/cloud/project/{project}/user/{id}")
}

/// Pull the `export VAR=value` lines out of an openrc document.
fn parse_openstack_rc(content: &str) -> Result<BTreeMap<String, String>, ProviderError> {
    let mut rc = BTreeMap::new();
    for (var, pattern) in [
        ("OS_AUTH_URL", &*RC_AUTH_URL),
        ("OS_TENANT_ID", &*RC_TENANT_ID),
        ("OS_TENANT_NAME", &*RC_TENANT_NAME),
        ("OS_USERNAME", &*RC_USERNAME),
    ] {
        let capture = pattern
            .captures(content)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                ProviderError::Extraction(format!("couldn't extract {var} from openrc content"))
            })?;
        rc.insert(var.to_string(), capture.as_str().to_string());
    }
    Ok(rc)
}

async fn fetch_openstack_rc(
    client: &OvhClient,
    project: &str,
    id: &str,
) -> Result<BTreeMap<String, String>, ProviderError> {
    // The region placeholder is rewritten by consumers of the bundle.
    let rc: OpenstackRc = client
        .get(&format!(
            "/cloud/project/{project}/user/{id}/openrc?region=to_be_overriden"
        ))
        .await?;
    parse_openstack_rc(&rc.content)
}

/// Everything except the password, which the vendor only hands out at
/// generation time.
fn populate(state: &mut Value, user: &User) {
    set_attr(state, "username", json!(user.username));
    set_attr(state, "status", json!(user.status));
    set_attr(state, "description", json!(user.description));
    set_attr(state, "creation_date", json!(user.creation_date));
    set_attr(state, "id", json!(user.id.to_string()));
}

type RefreshFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<(User, String), crate::error::ApiError>> + Send>,
>;

fn refresh(client: &OvhClient, path: &str) -> impl FnMut() -> RefreshFuture {
    let client = client.clone();
    let path = path.to_string();
    move || -> RefreshFuture {
        let client = client.clone();
        let path = path.clone();
        Box::pin(async move {
            let user: User = client.get(&path).await?;
            let status = user.status.clone();
            Ok((user, status))
        })
    }
}

impl PublicCloudUser {
    /// Regenerate the user's password and wait for the account to settle.
    ///
    /// The only way to learn a password after creation: imports go
    /// through here because a plain read never returns one.
    async fn regenerate_password(
        &self,
        client: &OvhClient,
        mut state: Value,
    ) -> Result<Value, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();
        let path = user_path(&project, &id);

        debug!(project = %project, user = %id, "regenerating user password");

        let regenerated: User = client
            .post_empty(&format!("{path}/regeneratePassword"))
            .await?;

        let settled = StateWaiter::new(format!("user {id}"))
            .pending(&["updating"])
            .target(&["ok"])
            .wait_for(refresh(client, &path))
            .await?;

        if let Some(user) = settled {
            populate(&mut state, &user);
        }
        populate_password(&mut state, &regenerated);

        let rc = fetch_openstack_rc(client, &project, &id).await?;
        set_attr(&mut state, "openstack_rc", json!(rc));
        Ok(state)
    }
}

fn populate_password(state: &mut Value, user: &User) {
    if let Some(password) = &user.password {
        set_attr(state, "password", json!(password));
    }
}

#[async_trait]
impl Resource for PublicCloudUser {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_env_default("OVH_PROJECT_ID")
                    .force_new(),
            )
            .with_attribute("description", Attribute::optional_string().force_new())
            .with_attribute("username", Attribute::computed_string())
            .with_attribute("password", Attribute::computed_string().sensitive())
            .with_attribute("status", Attribute::computed_string())
            .with_attribute("creation_date", Attribute::computed_string())
            .with_attribute(
                "openstack_rc",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional_computed(),
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

        let params = UserCreate {
            service_name: &project,
            description: opt_str(&state, "description"),
        };

        debug!(project = %project, "creating public cloud user");

        let created: User = client
            .post(&format!("/cloud/project/{project}/user"), &params)
            .await?;

        let id = created.id.to_string();
        let path = user_path(&project, &id);
        let settled = StateWaiter::new(format!("user {id}"))
            .pending(&["creating"])
            .target(&["ok"])
            .wait_for(refresh(client, &path))
            .await?;

        // Status and metadata come from the settled account; the password
        // only ever appears in the creation response.
        if let Some(user) = settled {
            populate(&mut state, &user);
        }
        populate_password(&mut state, &created);
        set_attr(&mut state, "id", json!(id));

        let rc = fetch_openstack_rc(client, &project, &id).await?;
        set_attr(&mut state, "openstack_rc", json!(rc));
        Ok(state)
    }

    async fn read(&self, client: &OvhClient, mut state: Value) -> Result<Value, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();

        let user: User = client.get(&user_path(&project, &id)).await?;
        // Never the password: the vendor omits it on plain reads and an
        // absent field must not erase the stored value.
        populate(&mut state, &user);

        let rc = fetch_openstack_rc(client, &project, &id).await?;
        set_attr(&mut state, "openstack_rc", json!(rc));
        Ok(state)
    }

    async fn delete(&self, client: &OvhClient, state: Value) -> Result<(), ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();
        let path = user_path(&project, &id);

        debug!(project = %project, user = %id, "deleting public cloud user");

        client.delete(&path).await?;

        StateWaiter::new(format!("deletion of user {id}"))
            .pending(&["deleting"])
            .target(&["deleted"])
            .absent_means("deleted")
            .wait_for(refresh(client, &path))
            .await?;

        Ok(())
    }

    async fn exists(&self, client: &OvhClient, state: Value) -> Result<bool, ProviderError> {
        let project = required_str(&state, "project_id")?.to_string();
        let id = id_str(&state)?.to_string();

        match client.get::<User>(&user_path(&project, &id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn import(&self, client: &OvhClient, id: &str) -> Result<Value, ProviderError> {
        let project = std::env::var("OVH_PROJECT_ID").unwrap_or_default();
        let state = json!({"id": id, "project_id": project});
        self.regenerate_password(client, state).await
    }
}
