//! vRack ↔ public cloud project attachment resource.
//!
//! Attachment and detachment both run as vendor-side tasks under the
//! vRack; the provider waits on `/vrack/{service}/task/{id}` until the
//! task completes or disappears (a finished task is garbage collected,
//! so a 404 also means done).
//!
//! The vendor assigns no identifier to the attachment itself; the
//! persisted id is the synthesized composite
//! `vrack_{vrack}-cloudproject_{project}-attach`, parsed back on import.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{required_str, set_attr};
use crate::client::OvhClient;
use crate::error::ProviderError;
use crate::poll::StateWaiter;
use crate::provider::Resource;
use crate::schema::{Attribute, Schema};

/// Type name this resource registers under.
pub const TYPE: &str = "ovh_vrack_publiccloud_attachment";

/// Membership of a public cloud project in a vRack.
pub struct VrackAttachment;

static ATTACHMENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^vrack_(.+)-cloudproject_(.+)-attach$").expect("static pattern")
});

/// Build the composite identifier persisted for an attachment.
pub fn attachment_id(vrack: &str, project: &str) -> String {
    format!("vrack_{vrack}-cloudproject_{project}-attach")
}

/// Recover the (vrack, project) pair from a composite identifier.
pub fn parse_attachment_id(id: &str) -> Result<(String, String), ProviderError> {
    ATTACHMENT_ID
        .captures(id)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .ok_or_else(|| {
            ProviderError::Validation(format!(
                "couldn't extract vrack id nor project id from id {id:?}"
            ))
        })
}

#[derive(Debug, Serialize)]
struct AttachParams<'a> {
    project: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    id: i64,
    #[serde(default)]
    function: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Attachment {
    #[serde(default)]
    vrack: String,
    #[serde(default)]
    project: String,
}

fn attachment_path(vrack: &str, project: &str) -> String {
    format!("/vrack/{vrack}/cloudProject/{project}")
}

/// Wait until the vRack task reaches `completed` (or is gone).
async fn wait_for_task(
    client: &OvhClient,
    vrack: &str,
    task_id: i64,
    what: String,
) -> Result<(), ProviderError> {
    let path = format!("/vrack/{vrack}/task/{task_id}");
    let poll_client = client.clone();

    let finished = StateWaiter::new(what)
        .pending(&["init", "todo", "doing"])
        .target(&["completed"])
        .absent_means("completed")
        .wait_for(move || {
            let client = poll_client.clone();
            let path = path.clone();
            async move {
                let task: Task = client.get(&path).await?;
                let status = task.status.clone();
                Ok((task, status))
            }
        })
        .await?;

    if let Some(task) = finished {
        debug!(task = task.id, last_update = ?task.last_update, "vrack task completed");
    }
    Ok(())
}

#[async_trait]
impl Resource for VrackAttachment {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "vrack_id",
                Attribute::required_string()
                    .with_env_default("OVH_VRACK_ID")
                    .force_new(),
            )
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_env_default("OVH_PROJECT_ID")
                    .force_new(),
            )
            .with_attribute("id", Attribute::computed_string())
    }

    async fn create(
        &self,
        client: &OvhClient,
        mut state: Value,
    ) -> Result<Value, ProviderError> {
        let vrack = required_str(&state, "vrack_id")?.to_string();
        let project = required_str(&state, "project_id")?.to_string();

        debug!(vrack = %vrack, project = %project, "attaching project to vrack");

        let task: Task = client
            .post(
                &format!("/vrack/{vrack}/cloudProject"),
                &AttachParams { project: &project },
            )
            .await?;

        debug!(task = task.id, function = %task.function, "waiting for attachment task");

        wait_for_task(
            client,
            &vrack,
            task.id,
            format!("attachment of project {project} to vrack {vrack}"),
        )
        .await?;

        set_attr(&mut state, "id", json!(attachment_id(&vrack, &project)));
        Ok(state)
    }

    async fn read(&self, client: &OvhClient, mut state: Value) -> Result<Value, ProviderError> {
        let vrack = required_str(&state, "vrack_id")?.to_string();
        let project = required_str(&state, "project_id")?.to_string();

        let attachment: Attachment = client.get(&attachment_path(&vrack, &project)).await?;

        if !attachment.vrack.is_empty() {
            set_attr(&mut state, "vrack_id", json!(attachment.vrack));
        }
        if !attachment.project.is_empty() {
            set_attr(&mut state, "project_id", json!(attachment.project));
        }
        Ok(state)
    }

    async fn delete(&self, client: &OvhClient, state: Value) -> Result<(), ProviderError> {
        let vrack = required_str(&state, "vrack_id")?.to_string();
        let project = required_str(&state, "project_id")?.to_string();

        debug!(vrack = %vrack, project = %project, "detaching project from vrack");

        let task: Task = client
            .delete_into(&attachment_path(&vrack, &project))
            .await?;

        wait_for_task(
            client,
            &vrack,
            task.id,
            format!("detachment of project {project} from vrack {vrack}"),
        )
        .await?;
        Ok(())
    }

    async fn exists(&self, client: &OvhClient, state: Value) -> Result<bool, ProviderError> {
        let vrack = required_str(&state, "vrack_id")?.to_string();
        let project = required_str(&state, "project_id")?.to_string();

        match client
            .get::<Attachment>(&attachment_path(&vrack, &project))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn import(&self, _client: &OvhClient, id: &str) -> Result<Value, ProviderError> {
        let (vrack, project) = parse_attachment_id(id)?;
        Ok(json!({"id": id, "vrack_id": vrack, "project_id": project}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    fn task_json(status: &str) -> Value {
        json!({
            "id": 7,
            "function": "addVrackCloudProject",
            "status": status,
            "serviceName": "pn-0001",
            "targetDomain": "p-1",
            "orderId": null,
            "lastUpdate": "2016-10-03T09:21:27+02:00",
            "TodoDate": "2016-10-03T09:21:25+02:00",
        })
    }

    const TASK_PATH: &str = "/vrack/pn-0001/task/7";

    fn base_state() -> Value {
        json!({"vrack_id": "pn-0001", "project_id": "p-1"})
    }

    #[test]
    fn test_composite_identifier_round_trip() {
        for (vrack, project) in [
            ("pn-0001", "p1"),
            ("vrack42", "0123456789abcdef"),
            ("a_b", "c_d"),
        ] {
            let id = attachment_id(vrack, project);
            let (parsed_vrack, parsed_project) = parse_attachment_id(&id).unwrap();
            assert_eq!(parsed_vrack, vrack);
            assert_eq!(parsed_project, project);
        }
    }

    #[test]
    fn test_parse_rejects_foreign_identifiers() {
        assert!(parse_attachment_id("pn-0001/p-1").is_err());
        assert!(parse_attachment_id("vrack_x-attach").is_err());
        assert!(parse_attachment_id("").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_task_completion() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(Method::Post, "/vrack/pn-0001/cloudProject", task_json("init"));
        transport.enqueue(Method::Get, TASK_PATH, Ok(task_json("todo")));
        transport.enqueue(Method::Get, TASK_PATH, Ok(task_json("doing")));
        transport.enqueue(Method::Get, TASK_PATH, Ok(task_json("completed")));

        let client = OvhClient::new(transport.clone());
        let state = VrackAttachment.create(&client, base_state()).await.unwrap();

        assert_eq!(state["id"], "vrack_pn-0001-cloudproject_p-1-attach");
        assert_eq!(transport.count(Method::Get, TASK_PATH), 3);

        let calls = transport.calls();
        assert_eq!(calls[0].body.as_ref().unwrap(), &json!({"project": "p-1"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_treats_missing_task_as_completed() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Delete,
            "/vrack/pn-0001/cloudProject/p-1",
            task_json("init"),
        );
        transport.enqueue(
            Method::Get,
            TASK_PATH,
            Err((404, "Task does not exist".to_string())),
        );

        let client = OvhClient::new(transport);
        VrackAttachment.delete(&client, base_state()).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_and_exists() {
        let transport = Arc::new(MockTransport::new());
        transport.stub(
            Method::Get,
            "/vrack/pn-0001/cloudProject/p-1",
            json!({"vrack": "pn-0001", "project": "p-1"}),
        );
        transport.stub_error(
            Method::Get,
            "/vrack/pn-0001/cloudProject/p-9",
            404,
            "This attachment does not exist",
        );

        let client = OvhClient::new(transport);
        let state = VrackAttachment.read(&client, base_state()).await.unwrap();
        assert_eq!(state["vrack_id"], "pn-0001");
        assert!(VrackAttachment
            .exists(&client, base_state())
            .await
            .unwrap());

        let mut gone = base_state();
        gone["project_id"] = json!("p-9");
        assert!(!VrackAttachment.exists(&client, gone).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_recovers_both_identifiers() {
        let client = OvhClient::new(Arc::new(MockTransport::new()));
        let state = VrackAttachment
            .import(&client, "vrack_pn-0001-cloudproject_p-1-attach")
            .await
            .unwrap();
        assert_eq!(state["vrack_id"], "pn-0001");
        assert_eq!(state["project_id"], "p-1");

        let err = VrackAttachment.import(&client, "bogus").await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
