//! `allow_domain` request handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::controller::FirewallController;
use super::normalize::normalize;
use crate::control::{
    ControlResult, Handler, decode_payload, encode_payload,
    protocol::{AllowDomainRequest, AllowDomainResponse},
};
use crate::prompt::{PromptRequest, Prompter};
use crate::telemetry::{self, AuditEvent, Decision};

/// Grants outbound access to one domain after human approval.
pub struct AllowDomainHandler {
    container: String,
    controller: Arc<FirewallController>,
    prompter: Arc<dyn Prompter>,
}

impl AllowDomainHandler {
    /// Handler for requests from `container`.
    pub fn new(
        container: impl Into<String>,
        controller: Arc<FirewallController>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            container: container.into(),
            controller,
            prompter,
        }
    }

    async fn decide(&self, request: AllowDomainRequest) -> AllowDomainResponse {
        if request.domain.trim().is_empty() {
            return rejected("domain is required");
        }

        let domain = match normalize(&request.domain) {
            Ok(domain) => domain,
            Err(e) => return rejected(e.to_string()),
        };

        let approved = match self
            .prompter
            .confirm(&PromptRequest::allow_domain(&domain))
            .await
        {
            Ok(approved) => approved,
            Err(e) => return rejected(e.to_string()),
        };

        telemetry::record(AuditEvent::DomainDecision {
            container: self.container.clone(),
            domain: domain.clone(),
            decision: Decision::from(approved),
        });

        if !approved {
            info!("Denied {} for {}", domain, self.container);
            return AllowDomainResponse::default();
        }

        match self.controller.allow_domain(&self.container, &domain).await {
            Ok(_) => AllowDomainResponse {
                approved: true,
                error: None,
            },
            Err(e) => {
                warn!("Approved {} but firewall update failed: {}", domain, e);
                AllowDomainResponse {
                    approved: true,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn rejected(message: impl Into<String>) -> AllowDomainResponse {
    AllowDomainResponse {
        approved: false,
        error: Some(message.into()),
    }
}

#[async_trait]
impl Handler for AllowDomainHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        let request: AllowDomainRequest = decode_payload(payload)?;
        encode_payload(&self.decide(request).await)
    }
}
