use tracing::{debug, info, warn};

use crate::{
    api::CrestClient,
    error::{Error, Result},
    model::{Contact, ContactChanges, ContactList, Standing},
};

/// Rendering collaborator. The synchronizer tells it what to draw; it never
/// reads state back.
pub trait ContactView {
    fn render(&mut self, list: &ContactList, collection_uri: &str);

    fn present_error(&mut self, status: Option<u16>, url: Option<&str>, message: &str);
}

/// In-progress optimistic update, captured before the PUT goes out.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub(crate) snapshot: Contact,
    pub(crate) updated: Contact,
    pub(crate) generation: u64,
}

impl PendingUpdate {
    pub fn updated(&self) -> &Contact {
        &self.updated
    }
}

/// Owns the cached contact list and keeps it in line with the server.
///
/// The cache is only ever replaced wholesale from the server, except for
/// in-place eviction after a delete and the optimistic copy of an update.
pub struct ContactSync<V> {
    client: CrestClient,
    view: V,
    collection_uri: String,
    search_uri: Option<String>,
    list: ContactList,
    generation: u64,
}

impl<V: ContactView> ContactSync<V> {
    pub fn new(client: CrestClient, view: V, collection_uri: impl Into<String>) -> Self {
        Self {
            client,
            view,
            collection_uri: collection_uri.into(),
            search_uri: None,
            list: ContactList::default(),
            generation: 0,
        }
    }

    #[must_use]
    pub fn with_search_uri(mut self, search_uri: Option<String>) -> Self {
        self.search_uri = search_uri;
        self
    }

    pub fn list(&self) -> &ContactList {
        &self.list
    }

    pub fn collection_uri(&self) -> &str {
        &self.collection_uri
    }

    /// Bumped every time the cache is replaced from the server.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn lookup(&self, name: &str) -> Option<&Contact> {
        self.list.lookup(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.list.remove(name)
    }

    /// Shows `error` through the view's error presenter.
    pub fn report(&mut self, error: &Error) {
        self.view
            .present_error(error.status(), error.url(), &error.message());
    }

    /// Replaces the cache with the server's current collection and renders it.
    pub async fn refresh(&mut self) -> Result<()> {
        let fresh = self.client.contacts(&self.collection_uri).await?;
        self.replace(fresh);
        Ok(())
    }

    pub(crate) fn replace(&mut self, fresh: ContactList) {
        debug!(
            "contact cache replaced: {} items (generation {})",
            fresh.items.len(),
            self.generation + 1
        );
        self.list = fresh;
        self.generation = self.generation.wrapping_add(1);
        self.render();
    }

    /// Routes to the collection named by a `#<uri>` fragment and loads it.
    pub async fn navigate(&mut self, fragment: &str) -> Result<()> {
        let uri = fragment.trim().trim_start_matches('#');
        if uri.is_empty() {
            return Err(Error::Config("Empty navigation target".to_string()));
        }
        if uri != self.collection_uri {
            info!("navigating to {uri}");
            self.collection_uri = uri.to_string();
        }
        self.refresh().await
    }

    /// Follows the `next` pagination link. Returns `false` on the last page.
    pub async fn next_page(&mut self) -> Result<bool> {
        match self.list.next.clone() {
            Some(link) => self.navigate(&link.href).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Follows the `previous` pagination link. Returns `false` on the first page.
    pub async fn previous_page(&mut self) -> Result<bool> {
        match self.list.previous.clone() {
            Some(link) => self.navigate(&link.href).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Adds `target_href` as a contact and reloads, so the new entry shows
    /// with whatever the server assigned to it.
    pub async fn create(&mut self, target_href: &str, standing: Standing) -> Result<()> {
        self.client
            .create_contact(&self.collection_uri, target_href, standing)
            .await?;
        self.refresh().await
    }

    /// Searches by name and adds the first hit with neutral standing.
    /// Returns `false` when nothing matched.
    pub async fn add_by_name(&mut self, query: &str) -> Result<bool> {
        let search_uri = self
            .search_uri
            .clone()
            .ok_or_else(|| Error::Config("API root advertises no search resource".to_string()))?;
        let hits = self.client.search(&search_uri, query).await?;
        match hits.first() {
            Some(target) => {
                self.create(target, Standing::Neutral).await?;
                Ok(true)
            }
            None => {
                debug!("search for {query:?} returned nothing");
                Ok(false)
            }
        }
    }

    /// Deletes the contact on the server, then evicts it from the cache.
    pub async fn delete(&mut self, name: &str) -> Result<()> {
        let href = self
            .lookup(name)
            .map(|contact| contact.href.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.client.delete_contact(&href).await?;
        if self.remove(name) {
            self.render();
        }
        Ok(())
    }

    /// Optimistically applies `changes` and PUTs the result; rolls back on failure.
    pub async fn update(&mut self, name: &str, changes: ContactChanges) -> Result<()> {
        let pending = self.begin_update(name, changes)?;
        let result = self.client.update_contact(pending.updated()).await;
        self.finish_update(pending, result)
    }

    pub fn begin_update(&mut self, name: &str, changes: ContactChanges) -> Result<PendingUpdate> {
        let index = self
            .list
            .position(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let snapshot = self.list.items[index].clone();
        let updated = snapshot.with_changes(&changes);
        self.list.items[index] = updated.clone();
        Ok(PendingUpdate {
            snapshot,
            updated,
            generation: self.generation,
        })
    }

    /// Settles an optimistic update. A result that arrives after the cache
    /// was replaced from the server is dropped: the refreshed list wins.
    pub fn finish_update(&mut self, pending: PendingUpdate, result: Result<()>) -> Result<()> {
        if pending.generation != self.generation {
            warn!(
                "discarding stale update for {:?}: cache moved from generation {} to {}",
                pending.snapshot.name(),
                pending.generation,
                self.generation
            );
            return result;
        }

        match result {
            Ok(()) => {
                debug!("update for {:?} accepted", pending.updated.name());
                Ok(())
            }
            Err(error) => {
                warn!(
                    "update for {:?} failed, restoring previous value",
                    pending.snapshot.name()
                );
                if let Some(index) = self.list.position(pending.snapshot.name()) {
                    self.list.items[index] = pending.snapshot;
                }
                self.render();
                Err(error)
            }
        }
    }

    fn render(&mut self) {
        self.view.render(&self.list, &self.collection_uri);
    }
}
