//! TCP listener for the callback endpoint.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use super::CallbackEndpoint;
use crate::config::CallbackConfig;
use crate::error::{Result, TckError};

impl CallbackEndpoint {
    /// Bind per configuration and start serving in the background.
    ///
    /// Port 0 picks a free port. Unless an address is configured, the
    /// advertised address is the bound socket plus the base path.
    pub async fn bind(config: &CallbackConfig) -> Result<Self> {
        let addr = config.listen_addr()?;
        Self::bind_to(addr, &config.base_path, config.address.as_deref()).await
    }

    /// Bind to `addr` and start serving in the background.
    pub async fn bind_to(
        addr: SocketAddr,
        base_path: &str,
        advertised: Option<&str>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            TckError::Server(format!("Failed to bind callback listener to {addr}: {e}"))
        })?;
        let local = listener.local_addr()?;

        let address = match advertised {
            Some(address) => address.to_string(),
            None => format!("http://{local}/{}", base_path.trim_matches('/')),
        };
        let endpoint = Self::new(&address, base_path);

        let router = endpoint.router();
        let mut shutdown_rx = endpoint.state.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = server.await {
                tracing::error!("Callback listener error: {}", e);
            }
            tracing::debug!("Callback listener on {} stopped", local);
        });

        tracing::info!("Callback endpoint listening on {} ({})", local, endpoint.address());
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::handler;
    use serde_json::json;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = CallbackConfig {
            port: 0,
            base_path: "/callback".to_string(),
            ..Default::default()
        };
        let endpoint = CallbackEndpoint::bind(&config).await.unwrap();
        assert!(endpoint.address().starts_with("http://127.0.0.1:"));
        assert!(endpoint.address().ends_with("/callback"));
        assert!(!endpoint.address().ends_with(":0/callback"));

        endpoint
            .register_handler(
                "/negotiations/[^/]+/events",
                handler(|_body| async { Ok::<_, TckError>(Some(json!({"received": true}))) }),
            )
            .await
            .unwrap();

        let response = reqwest::Client::new()
            .post(format!("{}/negotiations/c-1/events", endpoint.address()))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["received"], true);

        endpoint.shutdown();
    }

    #[tokio::test]
    async fn test_advertised_address_override() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let endpoint = CallbackEndpoint::bind_to(addr, "", Some("https://tck.example.com/"))
            .await
            .unwrap();
        assert_eq!(endpoint.address(), "https://tck.example.com");
        endpoint.shutdown();
    }
}
