use std::{fmt, path::Path};

use anyhow::Context;
use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

type OAuthClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }

    fn slug(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Deserialize)]
struct ClientKeys {
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct FirebaseKeys {
    apikey: String,
}

#[derive(Deserialize)]
struct ClientsFile {
    firebase: FirebaseKeys,
    google: Option<ClientKeys>,
    github: Option<ClientKeys>,
}

#[derive(Clone, Default)]
pub struct Clients {
    pub(crate) firebase_idpurl: Option<String>,
    google_client: Option<OAuthClient>,
    github_client: Option<OAuthClient>,
}

fn build(provider: ClientProvider, keys: ClientKeys, public_url: &str) -> anyhow::Result<OAuthClient> {
    let (auth_url, token_url) = provider.endpoints();

    Ok(
        BasicClient::new(ClientId::new(keys.client_id))
            .set_client_secret(ClientSecret::new(keys.client_secret))
            .set_auth_uri(AuthUrl::new(auth_url.to_owned())?)
            .set_token_uri(TokenUrl::new(token_url.to_owned())?)
            .set_redirect_uri(RedirectUrl::new(format!("{public_url}/lockin/{}", provider.slug()))?)
    )
}

impl Clients {
    pub fn from_json(json: &str, public_url: &str) -> anyhow::Result<Clients> {
        let file: ClientsFile = serde_json::from_str(json)?;

        Ok(Clients {
            firebase_idpurl: Some(format!(
                "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
                file.firebase.apikey
            )),
            google_client: file.google.map(|keys| build(ClientProvider::Google, keys, public_url)).transpose()?,
            github_client: file.github.map(|keys| build(ClientProvider::Github, keys, public_url)).transpose()?,
        })
    }

    pub fn from_file(path: &Path, public_url: &str) -> anyhow::Result<Clients> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading OAuth clients from {}", path.display()))?;
        Self::from_json(&json, public_url)
    }

    pub fn providers(&self) -> Vec<ClientProvider> {
        let mut providers = Vec::new();
        if self.google_client.is_some() {
            providers.push(ClientProvider::Google);
        }
        if self.github_client.is_some() {
            providers.push(ClientProvider::Github);
        }
        providers
    }

    pub(crate) fn get_client(&self, provider: ClientProvider) -> AppResult<OAuthClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or_else(|| AppError::NotFound("login provider"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configured_providers_are_offered() {
        let clients = Clients::from_json(
            r#"{"firebase":{"apikey":"k"},"github":{"client_id":"id","client_secret":"s"}}"#,
            "http://localhost:8080",
        )
        .unwrap();

        assert_eq!(clients.providers(), vec![ClientProvider::Github]);
        assert!(clients.get_client(ClientProvider::Google).is_err());
        assert!(clients.firebase_idpurl.unwrap().ends_with("key=k"));
    }
}
