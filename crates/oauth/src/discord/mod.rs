use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use rewards_domain::config::OAuthConfig;
use rewards_domain::model::{ExternalProfile, IdentitySource};
use rewards_domain::provider::{IdentityProvider, ProviderError};
use tracing::{debug, warn};

mod types;

use types::TokenRequest;
pub use types::{DiscordToken, DiscordUser};

const AVATAR_CDN: &str = "https://cdn.discordapp.com/avatars";

/// Discord authorization-code flow: `POST /oauth2/token`, then
/// `GET /users/@me` with the issued bearer token.
pub struct DiscordProvider {
    http: Client,
    config: OAuthConfig,
}

impl DiscordProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(map_reqwest)?;
        Ok(Self { http, config })
    }

    async fn request_token(&self, code: &str) -> Result<DiscordToken, ProviderError> {
        let form = TokenRequest {
            client_id: self.config.client_id(),
            client_secret: self.config.client_secret(),
            grant_type: "authorization_code",
            code,
            redirect_uri: self.config.redirect_uri(),
        };
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.config.api_base()))
            .form(&form)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
            });
        }
        response
            .json::<DiscordToken>()
            .await
            .map_err(map_reqwest)
    }

    async fn fetch_user(&self, token: &DiscordToken) -> Result<DiscordUser, ProviderError> {
        let response = self
            .http
            .get(format!("{}/users/@me", self.config.api_base()))
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
            });
        }
        response.json::<DiscordUser>().await.map_err(map_reqwest)
    }
}

#[async_trait]
impl IdentityProvider for DiscordProvider {
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, ProviderError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ProviderError::MissingCode);
        }

        let result = async {
            let token = self.request_token(code).await?;
            let user = self.fetch_user(&token).await?;
            Ok::<_, ProviderError>(convert_user(user))
        }
        .await;

        match &result {
            Ok(profile) => {
                counter!("oauth_exchanges_total", "provider" => "discord", "result" => "ok")
                    .increment(1);
                debug!(external_id = %profile.external_id, "discord code exchanged");
            }
            Err(err) => {
                counter!("oauth_exchanges_total", "provider" => "discord", "result" => "error")
                    .increment(1);
                warn!(?err, "discord code exchange failed");
            }
        }
        result
    }
}

fn convert_user(user: DiscordUser) -> ExternalProfile {
    let avatar_url = user
        .avatar
        .as_deref()
        .filter(|hash| !hash.is_empty())
        .map(|hash| format!("{AVATAR_CDN}/{}/{hash}.png", user.id));
    let display_name = user
        .global_name
        .filter(|name| !name.trim().is_empty())
        .or(Some(user.username));

    ExternalProfile {
        source: IdentitySource::Discord,
        external_id: user.id,
        display_name,
        avatar_url,
    }
}

fn map_reqwest(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    const USER_BODY: &str =
        r#"{"id":"80351110224678912","username":"nelly","global_name":"Nelly","avatar":"8342729096ea3675442027381ff50dfe"}"#;

    fn config(base: &str) -> OAuthConfig {
        OAuthConfig::new("client", "secret", "https://rewards.test/auth/discord")
            .with_api_base(base)
            .with_timeout(Duration::from_millis(500))
    }

    /// Reads one HTTP request (headers plus `Content-Length` body) and returns
    /// its request line.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + content_length {
                    return text.lines().next().unwrap_or_default().to_string();
                }
            }
        }
        String::new()
    }

    async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    }

    /// Serves the token and profile endpoints with canned answers.
    async fn spawn_stub(token_status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let line = read_request(&mut stream).await;
                if line.starts_with("POST /api/oauth2/token") {
                    respond(
                        &mut stream,
                        token_status,
                        r#"{"access_token":"abc","token_type":"Bearer"}"#,
                    )
                    .await;
                } else if line.starts_with("GET /api/users/@me") {
                    respond(&mut stream, "200 OK", USER_BODY).await;
                } else {
                    respond(&mut stream, "404 Not Found", "{}").await;
                }
            }
        });
        format!("http://{addr}/api")
    }

    #[test]
    fn converts_user_into_profile() {
        let user: DiscordUser = serde_json::from_str(USER_BODY).unwrap();
        let profile = convert_user(user);
        assert_eq!(profile.source, IdentitySource::Discord);
        assert_eq!(profile.external_id, "80351110224678912");
        assert_eq!(profile.display_name.as_deref(), Some("Nelly"));
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png")
        );
    }

    #[test]
    fn falls_back_to_username_without_avatar() {
        let user: DiscordUser = serde_json::from_str(
            r#"{"id":"1","username":"plain","global_name":null,"avatar":null}"#,
        )
        .unwrap();
        let profile = convert_user(user);
        assert_eq!(profile.display_name.as_deref(), Some("plain"));
        assert_eq!(profile.avatar_url, None);
    }

    #[tokio::test]
    async fn exchanges_code_for_profile() {
        let base = spawn_stub("200 OK").await;
        let provider = DiscordProvider::new(config(&base)).unwrap();
        let profile = provider.exchange("auth-code").await.unwrap();
        assert_eq!(profile.external_id, "80351110224678912");
        assert_eq!(profile.display_name.as_deref(), Some("Nelly"));
    }

    #[tokio::test]
    async fn rejected_code_surfaces_status() {
        let base = spawn_stub("400 Bad Request").await;
        let provider = DiscordProvider::new(config(&base)).unwrap();
        let err = provider.exchange("stale-code").await.unwrap_err();
        assert_eq!(err, ProviderError::Rejected { status: 400 });
    }

    #[tokio::test]
    async fn empty_code_is_refused_locally() {
        let provider = DiscordProvider::new(config("http://127.0.0.1:9")).unwrap();
        assert_eq!(
            provider.exchange("  ").await.unwrap_err(),
            ProviderError::MissingCode
        );
    }

    #[tokio::test]
    async fn silent_provider_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let provider = DiscordProvider::new(
            config(&format!("http://{addr}/api")).with_timeout(Duration::from_millis(100)),
        )
        .unwrap();
        let err = provider.exchange("auth-code").await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout);
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = DiscordProvider::new(config(&format!("http://{addr}/api"))).unwrap();
        let err = provider.exchange("auth-code").await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
