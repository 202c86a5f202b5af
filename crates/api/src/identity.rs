//! The one call the core needs per platform: validate a recovered token and
//! resolve the account behind it. Response shapes are deserialized into
//! explicit structs at this boundary; anything malformed is a payload error,
//! not a silently wrong value.

use serde::Deserialize;
use sessrec_recovery::Platform;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::transport::{AuthScheme, Transport};

/// Who the token belongs to.
#[derive(Debug, Clone)]
pub struct Identity {
    pub account_id: String,
    pub account_name: String,
}

/// Base URL of the platform's private API surface.
pub fn base_url(platform: Platform) -> &'static str {
    match platform {
        Platform::Slack => "https://slack.com/api",
        Platform::Discord => "https://discord.com/api/v10",
        Platform::Teams => "https://teams.microsoft.com/api/mt/beta",
    }
}

/// How the platform expects the token in the Authorization header.
pub fn auth_scheme(platform: Platform, token: &str) -> AuthScheme {
    match platform {
        // Discord user clients send the raw token.
        Platform::Discord => AuthScheme::Raw(token.to_string()),
        Platform::Slack | Platform::Teams => AuthScheme::Bearer(token.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct SlackAuthTest {
    ok: bool,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamsProfile {
    #[serde(default)]
    mri: String,
    #[serde(default)]
    display_name: String,
}

/// Fetch the account identity behind the client's credential.
pub async fn fetch_identity<T: Transport>(
    client: &ApiClient<T>,
    platform: Platform,
) -> Result<Identity, ApiError> {
    match platform {
        Platform::Discord => {
            let user: DiscordUser = expect_body(client.get("/users/@me").await?)?;
            Ok(Identity {
                account_id: user.id,
                account_name: user.username,
            })
        }
        Platform::Slack => {
            let test: SlackAuthTest =
                expect_body(client.post("/auth.test", serde_json::json!({})).await?)?;
            if !test.ok {
                let reason = test.error.unwrap_or_else(|| "unknown_error".to_string());
                return match reason.as_str() {
                    "invalid_auth" | "not_authed" | "token_revoked" | "token_expired"
                    | "account_inactive" => Err(ApiError::Unauthorized),
                    _ => Err(ApiError::Platform(reason)),
                };
            }
            Ok(Identity {
                account_id: test.user_id,
                account_name: test.user,
            })
        }
        Platform::Teams => {
            let profile: TeamsProfile = expect_body(client.get("/users/ME/profile").await?)?;
            Ok(Identity {
                account_id: profile.mri,
                account_name: profile.display_name,
            })
        }
    }
}

fn expect_body<R>(body: Option<R>) -> Result<R, ApiError> {
    body.ok_or_else(|| ApiError::Payload("identity endpoint returned no body".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{FakeTransport, json_response};

    fn client_with(body: &str) -> ApiClient<FakeTransport> {
        ApiClient::with_transport(
            FakeTransport::new(vec![json_response(200, body)]),
            base_url(Platform::Slack),
            AuthScheme::Bearer("tok".into()),
        )
    }

    #[tokio::test]
    async fn discord_identity_parses_user() {
        let api = ApiClient::with_transport(
            FakeTransport::new(vec![json_response(
                200,
                r#"{"id":"1056670271878887496","username":"someone","discriminator":"0"}"#,
            )]),
            base_url(Platform::Discord),
            auth_scheme(Platform::Discord, "tok"),
        );
        let identity = fetch_identity(&api, Platform::Discord).await.unwrap();
        assert_eq!(identity.account_id, "1056670271878887496");
        assert_eq!(identity.account_name, "someone");
    }

    #[tokio::test]
    async fn slack_in_band_auth_failure_maps_to_unauthorized() {
        let api = client_with(r#"{"ok":false,"error":"invalid_auth"}"#);
        let err = fetch_identity(&api, Platform::Slack).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn slack_other_in_band_errors_stay_distinct() {
        let api = client_with(r#"{"ok":false,"error":"ratelimited"}"#);
        let err = fetch_identity(&api, Platform::Slack).await.unwrap_err();
        assert!(matches!(err, ApiError::Platform(reason) if reason == "ratelimited"));
    }

    #[tokio::test]
    async fn slack_success_carries_account_fields() {
        let api = client_with(r#"{"ok":true,"user_id":"U0EXAMPLE","user":"jo","team":"acme"}"#);
        let identity = fetch_identity(&api, Platform::Slack).await.unwrap();
        assert_eq!(identity.account_id, "U0EXAMPLE");
        assert_eq!(identity.account_name, "jo");
    }
}
