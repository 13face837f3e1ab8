//! Caller-supplied request context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::audit::classification::{classify, DataClassification};

/// Describes the call being guarded.
///
/// The breaker never reads these fields for its own decisions; they are
/// copied into audit entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    /// Correlation ID, generated when the context is built.
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub patient_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub service_name: String,
    /// Human-readable description of the operation.
    pub description: Option<String>,
    /// Wall-clock creation time (ms since epoch). Zero means "stamp on use".
    pub timestamp_ms: u64,
    pub metadata: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(service_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            patient_id: None,
            endpoint: endpoint.into(),
            method: "GET".to_string(),
            service_name: service_name.into(),
            description: None,
            timestamp_ms: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sensitivity tier inferred from the endpoint, service, description
    /// and metadata keys.
    pub fn data_classification(&self) -> DataClassification {
        let fixed = [
            self.endpoint.as_str(),
            self.service_name.as_str(),
            self.description.as_deref().unwrap_or_default(),
        ];
        classify(fixed.into_iter().chain(self.metadata.keys().map(String::as_str)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_from_endpoint() {
        let ctx = RequestContext::new("records", "/api/patients/7").with_method("POST");
        assert_eq!(ctx.data_classification(), DataClassification::Restricted);
        assert_eq!(ctx.method, "POST");
    }

    #[test]
    fn test_classification_from_metadata_key() {
        let ctx = RequestContext::new("gateway", "/api/v1/items").with_metadata("billing_ref", "INV-1");
        assert_eq!(ctx.data_classification(), DataClassification::Confidential);
    }

    #[test]
    fn test_identifiers_do_not_affect_classification() {
        let ctx = RequestContext::new("status", "/ping").with_patient("patient-123");
        assert_eq!(ctx.data_classification(), DataClassification::Public);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new("a", "/");
        let b = RequestContext::new("a", "/");
        assert_ne!(a.request_id, b.request_id);
    }
}
