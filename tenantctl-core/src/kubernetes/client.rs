//! Kubernetes client wrapper
//!
//! Wraps the kube-rs Client with the context it was built from and the
//! namespace the kubeconfig selects for the caller.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

use super::error::{GatewayError, GatewayResult};

/// Wrapper around kube-rs Client with connection context
#[derive(Clone)]
pub struct K8sClient {
    inner: Client,
    context: Option<String>,
    api_server: String,
    default_namespace: String,
}

impl K8sClient {
    /// Connect using an explicit kubeconfig file, or the usual discovery
    /// chain ($KUBECONFIG, ~/.kube/config, in-cluster) when none is given
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> GatewayResult<Self> {
        let options = KubeConfigOptions {
            context: context.map(String::from),
            ..Default::default()
        };

        let config = match (kubeconfig, context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    GatewayError::InvalidKubeconfig(format!(
                        "Failed to read {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                return Self::from_kubeconfig(kubeconfig, context).await;
            }
            (None, Some(_)) => Config::from_kubeconfig(&options).await.map_err(|e| {
                GatewayError::InvalidKubeconfig(format!("Failed to create config: {}", e))
            })?,
            (None, None) => Config::infer().await.map_err(|e| {
                GatewayError::InvalidKubeconfig(format!("Failed to infer config: {}", e))
            })?,
        };

        Self::from_config(config, context.map(String::from))
    }

    /// Build from an already parsed kubeconfig with optional context
    async fn from_kubeconfig(kubeconfig: Kubeconfig, context: Option<&str>) -> GatewayResult<Self> {
        let config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: context.map(String::from),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| GatewayError::InvalidKubeconfig(format!("Failed to create config: {}", e)))?;

        Self::from_config(config, context.map(String::from))
    }

    fn from_config(config: Config, context: Option<String>) -> GatewayResult<Self> {
        let api_server = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();

        let client = Client::try_from(config)
            .map_err(|e| GatewayError::InvalidKubeconfig(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            inner: client,
            context,
            api_server,
            default_namespace,
        })
    }

    /// Get the inner kube-rs Client
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Context explicitly selected at connect time
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Get API server URL
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    /// Namespace selected by the kubeconfig context
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }
}

impl std::fmt::Debug for K8sClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K8sClient")
            .field("context", &self.context)
            .field("api_server", &self.api_server)
            .field("default_namespace", &self.default_namespace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: acme
clusters:
- name: lab
  cluster:
    server: https://127.0.0.1:6443
contexts:
- name: acme
  context:
    cluster: lab
    user: acme
    namespace: acme-n1
users:
- name: acme
  user:
    token: abc123
"#;

    async fn client_from_yaml(context: Option<&str>) -> GatewayResult<K8sClient> {
        let kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        K8sClient::from_kubeconfig(kubeconfig, context).await
    }

    #[tokio::test]
    async fn test_kubeconfig_context_namespace_is_default() {
        let client = client_from_yaml(None).await.unwrap();
        assert_eq!(client.default_namespace(), "acme-n1");
        assert!(client.api_server().starts_with("https://127.0.0.1:6443"));
    }

    #[tokio::test]
    async fn test_unknown_context_is_rejected() {
        let err = client_from_yaml(Some("missing")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidKubeconfig(_)));
    }
}
