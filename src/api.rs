use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    auth::{self, CsrfStore, Session},
    consts::{
        MEDIA_API, MEDIA_CHARACTER, MEDIA_COLLECTION, MEDIA_CONTACT_COLLECTION,
        MEDIA_CONTACT_CREATE,
    },
    error::{Error, Result},
    model::{
        ApiRootWire, CharacterWire, Contact, ContactCreate, ContactList, ContactTarget,
        SearchResultsWire, Standing,
    },
    settings::Settings,
    util::truncate_message,
};

/// Hyperlinks discovered by walking API root -> character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub contacts: String,
    pub notifications: String,
    pub search: Option<String>,
}

/// Completes login from `redirect` and walks to the user's resources.
/// The API is not contacted unless the CSRF check passes.
pub async fn connect(
    settings: &Settings,
    redirect: &str,
    store: &CsrfStore,
) -> Result<(CrestClient, Endpoints)> {
    let session = auth::complete(redirect, store)?;
    let client = CrestClient::new(session);
    let endpoints = client.discover(&settings.server).await?;
    Ok((client, endpoints))
}

fn accept(media: &str) -> String {
    format!("application/{media}+json, charset=utf-8")
}

fn content_type(media: &str) -> String {
    format!("application/{media}+json")
}

/// CREST client bound to one session. Every request is bearer-authenticated
/// and asks for a precise versioned media type.
#[derive(Debug, Clone)]
pub struct CrestClient {
    http: reqwest::Client,
    session: Session,
}

impl CrestClient {
    pub fn new(session: Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            session,
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Follows API root and character links to the contact and notification resources.
    pub async fn discover(&self, server: &str) -> Result<Endpoints> {
        let root_uri = format!("{}/", server.trim_end_matches('/'));
        let root: ApiRootWire = self.get_json(&root_uri, MEDIA_API, "API root").await?;
        let character: CharacterWire = self
            .get_json(&root.character.href, MEDIA_CHARACTER, "character")
            .await?;
        debug!(
            "discover: character={:?} contacts={} notifications={}",
            character.name, character.contacts.href, character.notifications.href
        );
        Ok(Endpoints {
            contacts: character.contacts.href,
            notifications: character.notifications.href,
            search: root.search.map(|link| link.href),
        })
    }

    pub async fn contacts(&self, uri: &str) -> Result<ContactList> {
        self.get_json(uri, MEDIA_CONTACT_COLLECTION, "contact collection")
            .await
    }

    pub async fn create_contact(
        &self,
        collection_uri: &str,
        target_href: &str,
        standing: Standing,
    ) -> Result<()> {
        let body = ContactCreate {
            contact: ContactTarget {
                href: target_href.to_string(),
            },
            standing,
        };
        debug!("POST {collection_uri} target={target_href} standing={standing}");
        let response = self
            .http
            .post(collection_uri)
            .bearer_auth(self.session.token())
            .header(CONTENT_TYPE, content_type(MEDIA_CONTACT_CREATE))
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn update_contact(&self, contact: &Contact) -> Result<()> {
        debug!("PUT {} standing={}", contact.href, contact.standing);
        let response = self
            .http
            .put(&contact.href)
            .bearer_auth(self.session.token())
            .header(CONTENT_TYPE, content_type(MEDIA_CONTACT_CREATE))
            .json(contact)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn delete_contact(&self, href: &str) -> Result<()> {
        debug!("DELETE {href}");
        let response = self
            .http
            .delete(href)
            .bearer_auth(self.session.token())
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Hrefs of resources whose name matches `name`, in server order.
    pub async fn search(&self, search_uri: &str, name: &str) -> Result<Vec<String>> {
        let mut url = reqwest::Url::parse(search_uri)
            .map_err(|error| Error::Config(format!("Invalid search URI: {error}")))?;
        url.query_pairs_mut().append_pair("name", name);
        let results: SearchResultsWire = self
            .get_json(url.as_str(), MEDIA_COLLECTION, "search results")
            .await?;
        Ok(results
            .items
            .into_iter()
            .map(|item| item.resource.href)
            .collect())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        uri: &str,
        media: &str,
        what: &'static str,
    ) -> Result<T> {
        debug!("GET {uri} accept={media}");
        let response = self
            .http
            .get(uri)
            .bearer_auth(self.session.token())
            .header(ACCEPT, accept(media))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str::<T>(&body).map_err(|error| Error::Decode {
            what,
            detail: format!("{error}: {}", truncate_message(&body, 140)),
        })
    }
}

/// Returns the response on success, otherwise an [`Error::Http`] carrying the body.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read response body>".to_string());
    Err(Error::Http {
        status,
        url,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_headers() {
        assert_eq!(
            accept(MEDIA_CONTACT_COLLECTION),
            "application/vnd.ccp.eve.ContactCollection-v1+json, charset=utf-8"
        );
        assert_eq!(
            content_type(MEDIA_CONTACT_CREATE),
            "application/vnd.ccp.eve.ContactCreate-v1+json"
        );
    }
}
