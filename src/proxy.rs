//! Client side of the server proxy: the same operations, with the API key
//! kept on the server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::codec::ImagePayload;
use crate::error::MonumentError;
use crate::gemini::ApiKey;
use crate::studio::{CredentialMode, MonumentService};
use crate::web::api::{
    DescriptionResponse, ErrorResponse, FinalImageResponse, GenerateRequest, ImageBody,
    ImageUrlResponse,
};

/// Talks to a running `monument-mixer` server over `POST /api/generate`.
#[derive(Clone, Debug)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl ProxyClient {
    /// Builds a client for the server at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MonumentError> {
        let endpoint = format!("{}/api/generate", base_url.trim().trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint).map_err(|err| {
            MonumentError::InputValidation(format!("Invalid server URL {base_url:?}: {err}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| MonumentError::transport(err.to_string()))?;
        Ok(Self { http, endpoint })
    }

    async fn call<T: DeserializeOwned>(&self, request: &GenerateRequest) -> Result<T, MonumentError> {
        debug!("Proxying {} to {}", request.operation(), self.endpoint);
        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let (detail, code) = match serde_json::from_slice::<ErrorResponse>(&bytes) {
                Ok(body) => (body.error, body.code),
                Err(_) => (String::from_utf8_lossy(&bytes).trim().to_string(), None),
            };
            warn!("Server rejected {}: {} {}", request.operation(), status, detail);
            return Err(MonumentError::from_code(
                code.as_deref(),
                status.as_u16(),
                detail,
            ));
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            MonumentError::transport(format!("Malformed response from server: {err}"))
        })
    }

    async fn image(&self, request: GenerateRequest) -> Result<ImagePayload, MonumentError> {
        let body: ImageUrlResponse = self.call(&request).await?;
        ImagePayload::from_data_url(&body.image_url)
    }
}

impl MonumentService for ProxyClient {
    async fn generate_monument(&self, prompt: &str) -> Result<ImagePayload, MonumentError> {
        self.image(GenerateRequest::GenerateMonumentFromPrompt {
            prompt: prompt.to_string(),
        })
        .await
    }

    async fn generate_monument_from_image(
        &self,
        image: &ImagePayload,
        style: &str,
    ) -> Result<ImagePayload, MonumentError> {
        self.image(GenerateRequest::GenerateMonumentFromImage {
            image: ImageBody::from(image),
            prompt: style.to_string(),
        })
        .await
    }

    async fn describe_scene(&self, image: &ImagePayload) -> Result<String, MonumentError> {
        let body: DescriptionResponse = self
            .call(&GenerateRequest::DescribeScene {
                image: ImageBody::from(image),
            })
            .await?;
        Ok(body.description)
    }

    async fn generate_scene(&self, prompt: &str) -> Result<ImagePayload, MonumentError> {
        self.image(GenerateRequest::GenerateScene {
            prompt: prompt.to_string(),
        })
        .await
    }

    async fn place_monument(
        &self,
        scene: &ImagePayload,
        monument: &ImagePayload,
        instruction: &str,
    ) -> Result<ImagePayload, MonumentError> {
        let body: FinalImageResponse = self
            .call(&GenerateRequest::PlaceMonument {
                scene_image: ImageBody::from(scene),
                monument_image: ImageBody::from(monument),
                prompt: instruction.to_string(),
            })
            .await?;
        ImagePayload::from_data_url(&body.final_image_url)
    }

    fn credential_mode(&self) -> CredentialMode {
        CredentialMode::ServerProxied
    }

    async fn set_credential(&self, _key: ApiKey) -> Result<(), MonumentError> {
        Err(MonumentError::InputValidation(
            "The API key is configured on the server".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_built_from_base() {
        let client = ProxyClient::new("http://localhost:9000/", Duration::from_secs(1))
            .expect("client");
        assert_eq!(
            client.endpoint.as_str(),
            "http://localhost:9000/api/generate"
        );
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let err = ProxyClient::new("::nope::", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, MonumentError::InputValidation(_)));
    }

    #[tokio::test]
    async fn credentials_cannot_be_set_client_side() {
        let client = ProxyClient::new("http://localhost:9000", Duration::from_secs(1))
            .expect("client");
        assert_eq!(client.credential_mode(), CredentialMode::ServerProxied);
        let key = ApiKey::new("abc").expect("key");
        assert!(client.set_credential(key).await.is_err());
    }
}
