//! Rendering service boundary.

use async_trait::async_trait;

use super::SpeechError;

/// Boundary to a speech rendering service: text in, audio bytes out.
#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>, SpeechError>;
}

/// Cloud provider reached over HTTP: POSTs the utterance as JSON with
/// bearer auth and receives the rendered audio bytes.
pub struct HttpSpeechRenderer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpSpeechRenderer {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1/audio/speech";
    pub const DEFAULT_MODEL: &'static str = "tts-1";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl SpeechRenderer for HttpSpeechRenderer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn render(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>, SpeechError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": text,
                "voice": voice,
                "speed": speed,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::ProviderStatus(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Stand-in for the platform speech API, used when no cloud provider is
/// configured or the provider fails. Yields the utterance text as UTF-8
/// bytes for the platform layer to synthesize locally.
pub struct SystemSpeechRenderer;

#[async_trait]
impl SpeechRenderer for SystemSpeechRenderer {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn render(&self, text: &str, _voice: &str, _speed: f32) -> Result<Vec<u8>, SpeechError> {
        Ok(text.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_renderer_posts_utterance_and_returns_audio() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/audio/speech")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "input": "hello chat",
                "voice": "alloy",
            })))
            .with_status(200)
            .with_body(b"fake-mp3-bytes".to_vec())
            .create_async()
            .await;

        let renderer = HttpSpeechRenderer::with_endpoint(
            format!("{}/v1/audio/speech", server.url()),
            "sk-test",
        );
        let audio = renderer.render("hello chat", "alloy", 1.0).await.unwrap();

        assert_eq!(audio, b"fake-mp3-bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_renderer_surfaces_provider_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/audio/speech")
            .with_status(401)
            .create_async()
            .await;

        let renderer = HttpSpeechRenderer::with_endpoint(
            format!("{}/v1/audio/speech", server.url()),
            "bad-key",
        );
        let error = renderer.render("hello", "alloy", 1.0).await.unwrap_err();

        assert!(matches!(error, SpeechError::ProviderStatus(401)));
    }

    #[tokio::test]
    async fn system_renderer_never_fails() {
        let renderer = SystemSpeechRenderer;
        let audio = renderer.render("hello", "any", 2.0).await.unwrap();
        assert_eq!(audio, b"hello");
    }
}
