use std::time::{Duration, Instant};

use async_trait::async_trait;
use probe_core::{
    GatewayError, InsertRecord, InvocationRecord, InvokeReply, RecordGateway, UpdateRecord,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP implementation of the gateway contract. The collaborator exposes
/// POST-only JSON endpoints under `/api/dubbo` (catalog and invoke) and
/// `/api/execute` (stored records).
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PortQuery {
    port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MethodsQuery<'a> {
    port: u16,
    service_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokeQuery<'a> {
    port: u16,
    service_name: &'a str,
    method_name: &'a str,
    json_params: &'a str,
}

#[derive(Serialize)]
struct DeleteQuery {
    id: i64,
}

#[derive(Deserialize)]
struct ServicesReply {
    #[serde(default)]
    services: Vec<String>,
}

#[derive(Deserialize)]
struct MethodsReply {
    #[serde(default)]
    methods: Vec<String>,
}

#[derive(Deserialize)]
struct InvokeWireReply {
    #[serde(default)]
    result: String,
    #[serde(default)]
    time: Option<u64>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_raw<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                warn!(event = "gateway_request_failed", path, error = %err);
                GatewayError::Transport(err.to_string())
            })?;
        let status = response.status();
        if !status.is_success() {
            warn!(event = "gateway_bad_status", path, code = status.as_u16());
            return Err(GatewayError::Status {
                code: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GatewayError> {
        let response = self.post_raw(path, body).await?;
        response
            .json::<R>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), GatewayError> {
        self.post_raw(path, body).await.map(|_| ())
    }
}

#[async_trait]
impl RecordGateway for HttpGateway {
    async fn list_services(&self, port: u16) -> Result<Vec<String>, GatewayError> {
        let reply: ServicesReply = self
            .post_json("/api/dubbo/services", &PortQuery { port })
            .await?;
        Ok(reply.services)
    }

    async fn list_methods(&self, port: u16, service: &str) -> Result<Vec<String>, GatewayError> {
        let reply: MethodsReply = self
            .post_json(
                "/api/dubbo/methods",
                &MethodsQuery {
                    port,
                    service_name: service,
                },
            )
            .await?;
        Ok(reply.methods)
    }

    async fn invoke(
        &self,
        port: u16,
        service: &str,
        method: &str,
        json_params: &str,
    ) -> Result<InvokeReply, GatewayError> {
        let started = Instant::now();
        let reply: InvokeWireReply = self
            .post_json(
                "/api/dubbo/invoke",
                &InvokeQuery {
                    port,
                    service_name: service,
                    method_name: method,
                    json_params,
                },
            )
            .await?;
        Ok(InvokeReply {
            result: reply.result,
            elapsed_ms: reply
                .time
                .unwrap_or_else(|| started.elapsed().as_millis() as u64),
        })
    }

    async fn list_records(&self, port: u16) -> Result<Vec<InvocationRecord>, GatewayError> {
        self.post_json("/api/execute/list", &PortQuery { port })
            .await
    }

    async fn insert_record(&self, req: &InsertRecord) -> Result<i64, GatewayError> {
        self.post_json("/api/execute/insert", req).await
    }

    async fn update_record(&self, req: &UpdateRecord) -> Result<(), GatewayError> {
        self.post_unit("/api/execute/update", req).await
    }

    async fn delete_record(&self, id: i64) -> Result<(), GatewayError> {
        self.post_unit("/api/execute/delete", &DeleteQuery { id })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_query_spells_service_name_the_collaborator_way() {
        let payload = serde_json::to_value(MethodsQuery {
            port: 31802,
            service_name: "com.example.user.UserService",
        })
        .unwrap();
        assert_eq!(payload["serviceName"], "com.example.user.UserService");
        assert_eq!(payload["port"], 31802);
    }

    #[test]
    fn invoke_query_carries_raw_params() {
        let payload = serde_json::to_value(InvokeQuery {
            port: 31802,
            service_name: "OrderService",
            method_name: "createOrder",
            json_params: "{\"productId\":101}",
        })
        .unwrap();
        assert_eq!(payload["methodName"], "createOrder");
        assert_eq!(payload["jsonParams"], "{\"productId\":101}");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let gateway = HttpGateway::new("http://localhost:8080/").unwrap();
        assert_eq!(gateway.base_url, "http://localhost:8080");
    }

    #[test]
    fn invoke_reply_tolerates_missing_time() {
        let reply: InvokeWireReply =
            serde_json::from_value(serde_json::json!({"result": "ok"})).unwrap();
        assert_eq!(reply.result, "ok");
        assert!(reply.time.is_none());
    }
}
