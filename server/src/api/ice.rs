//! ICE Server Handler
//!
//! Hands clients the TURN descriptor they should use for NAT traversal.
//! Credentials are either the static configured pair or TURN REST
//! (time-limited username + HMAC-SHA1 password), selected by
//! configuration.

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

use crate::config::{Config, IceCredentialMode};

use super::AppState;

type HmacSha1 = Hmac<Sha1>;

/// ICE-server descriptor returned to clients.
#[derive(Debug, Serialize)]
pub struct IceServerResponse {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// TURN REST credential: base64(HMAC-SHA1(secret, username)).
fn turn_rest_credential(secret: &str, username: &str) -> String {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(username.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Build the descriptor for the configured credential mode.
fn issue_ice_servers(config: &Config) -> IceServerResponse {
    let urls = vec![config.turn_url("udp"), config.turn_url("tcp")];

    match (config.ice_credential_mode, config.turn_secret.as_deref()) {
        (IceCredentialMode::Hmac, Some(secret)) => {
            // coturn's use-auth-secret scheme: username is the expiry
            // timestamp, valid for one hour.
            let expiration = (Utc::now() + Duration::hours(1)).timestamp();
            let username = expiration.to_string();
            let credential = turn_rest_credential(secret, &username);
            IceServerResponse {
                urls,
                username,
                credential,
            }
        }
        _ => IceServerResponse {
            urls,
            username: config.turn_username.clone(),
            credential: config.turn_password.clone(),
        },
    }
}

/// Get the ICE server descriptor.
///
/// GET /api/ice-servers
pub async fn get_ice_servers(State(state): State<AppState>) -> Json<IceServerResponse> {
    Json(issue_ice_servers(&state.config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_mode_uses_configured_pair() {
        let config = Config::default_for_test();
        let response = issue_ice_servers(&config);
        assert_eq!(
            response.urls,
            vec![
                "turn:turn.test.invalid?transport=udp",
                "turn:turn.test.invalid?transport=tcp"
            ]
        );
        assert_eq!(response.username, config.turn_username);
        assert_eq!(response.credential, config.turn_password);
    }

    #[test]
    fn hmac_mode_issues_time_limited_credentials() {
        let mut config = Config::default_for_test();
        config.ice_credential_mode = IceCredentialMode::Hmac;

        let response = issue_ice_servers(&config);

        let expiration: i64 = response.username.parse().expect("numeric username");
        assert!(expiration > Utc::now().timestamp());

        // HMAC-SHA1 digest is 20 bytes.
        let raw = BASE64.decode(&response.credential).expect("base64");
        assert_eq!(raw.len(), 20);
    }

    #[test]
    fn rest_credential_is_deterministic_per_username() {
        let a = turn_rest_credential("secret", "1700000000");
        let b = turn_rest_credential("secret", "1700000000");
        let c = turn_rest_credential("secret", "1700000001");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
