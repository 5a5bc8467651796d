//! Testing utilities for provider implementations.
//!
//! [`MockTransport`] is a scripted, in-memory [`Transport`]: tests stub
//! the vendor responses route by route and assert on the recorded
//! calls. [`ProviderTester`] wraps a provider wired to such a transport
//! and exposes the host-side operations plus lifecycle helpers.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_record() {
//!     let tester = ProviderTester::new();
//!     tester.transport().stub(
//!         Method::Post,
//!         "/domain/zone/example.com/record",
//!         json!({"id": 1, "fieldType": "A", "subDomain": "www", "target": "1.2.3.4", "ttl": 3600}),
//!     );
//!     // ...
//!     let state = tester
//!         .create("ovh_domain_record", json!({"domain": "example.com", /* ... */}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["id"], "1");
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{Method, OvhClient, Transport};
use crate::config::Connection;
use crate::error::{ApiError, ProviderError};
use crate::provider::{OvhProvider, ProviderService};
use crate::types::{ImportedResource, PlanResult};

type Outcome = Result<Value, (u16, String)>;

/// One call recorded by a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// HTTP method of the call.
    pub method: Method,
    /// Path including any query string.
    pub path: String,
    /// JSON body, when one was sent.
    pub body: Option<Value>,
}

/// Scripted in-memory transport.
///
/// Responses are stubbed per (method, path) route. A route replays its
/// stubbed outcomes in order and keeps repeating the last one, so a
/// single [`stub`](Self::stub) acts as a static route while
/// [`enqueue`](Self::enqueue) sequences build poll scripts
/// (`BUILDING`, `BUILDING`, `ACTIVE`). A call to a route with no stub
/// panics: tests must declare the traffic they expect.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Outcome>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// A transport with no routes stubbed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub a route with a static JSON response.
    pub fn stub(&self, method: Method, path: &str, response: Value) {
        self.enqueue(method, path, Ok(response));
    }

    /// Stub a route with a vendor error.
    pub fn stub_error(&self, method: Method, path: &str, status: u16, message: &str) {
        self.enqueue(method, path, Err((status, message.to_string())));
    }

    /// Append an outcome to a route's script.
    pub fn enqueue(&self, method: Method, path: &str, outcome: Outcome) {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry((method, path.to_string()))
            .or_default()
            .push_back(outcome);
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// How many calls hit the given route.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                method,
                path: path.to_string(),
                body: body.cloned(),
            });

        let mut routes = self
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let queue = routes
            .get_mut(&(method, path.to_string()))
            .unwrap_or_else(|| panic!("unexpected call: {method} {path}"));

        let outcome = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err((status, message))) => Err(ApiError::Api {
                method: method.to_string(),
                path: path.to_string(),
                status,
                message,
            }),
            None => panic!("unexpected call: {method} {path}"),
        }
    }
}

/// Serializes tests that mutate process environment variables.
pub fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A test harness wiring [`OvhProvider`] to a [`MockTransport`].
pub struct ProviderTester {
    provider: OvhProvider,
    transport: Arc<MockTransport>,
}

impl ProviderTester {
    /// A pre-configured provider over a fresh mock transport.
    pub fn new() -> Self {
        let transport = Arc::new(MockTransport::new());
        let client = OvhClient::new(transport.clone());
        let provider = OvhProvider::with_connection(Connection::new(client));
        Self {
            provider,
            transport,
        }
    }

    /// The transport, for stubbing routes and asserting on calls.
    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    /// The provider under test.
    pub fn provider(&self) -> &OvhProvider {
        &self.provider
    }

    /// The registered resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.resource_types()
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, proposed_state).await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Whether the resource still exists vendor-side.
    pub async fn exists(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<bool, ProviderError> {
        self.provider.exists(resource_type, current_state).await
    }

    /// Import existing infrastructure into management.
    pub async fn import(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Run a full create lifecycle: plan, create, read back.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }
}

impl Default for ProviderTester {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates without requiring replacement.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not change the given attribute.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}
