//! VK-style poller adapter (spec §4.4).
//!
//! `N_VK` worker tasks each own a disjoint, stable subset of watched groups
//! (`{g : h(g) mod N_VK == i}`). A refresh loop re-reads the watched-group
//! list from the Store every `T_refresh` and, when a worker's subset has
//! changed, pushes the new partition to that worker over a
//! [`tokio::sync::watch`] channel — a single-slot, drop-latest primitive
//! that gives the worker lock-free eventual consistency of its partition
//! (spec §9 "Graceful VK partition reshape") without an explicit mutex.
//!
//! `N_VK_HIST` additional workers service on-demand "fetch last K posts"
//! requests, sharded by a hash of the group's public name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::PlatformApiError;
use crate::event::{shard_of, Event, Platform};
use crate::store::Store;

/// A single VK post as returned by the host API.
#[derive(Debug, Clone, Deserialize)]
pub struct VkPost {
    /// The post's numeric id within its group's wall.
    pub id: i64,
    /// The post's text.
    pub text: String,
}

/// Minimal VK host API client: fetches recent wall posts for a group.
///
/// The VK wall API itself is an external collaborator (spec §1); this is a
/// thin `reqwest` wrapper, shaped like [`crate::matcher::MatcherClient`].
pub struct VkApiClient {
    base_url: String,
    token: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl VkApiClient {
    /// Construct a client bound to `base_url` (e.g. `https://api.vk.com`)
    /// and a service/user access `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the most recent `count` posts from `group_id`'s wall, newest
    /// first (spec §4.4 `get_latest(group, count)`).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformApiError`] on a network failure or a non-2xx/
    /// `error`-bearing response.
    pub async fn get_latest(&self, group_id: &str, count: u32) -> Result<Vec<VkPost>, PlatformApiError> {
        let url = format!("{}/method/wall.get", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("owner_id", format!("-{group_id}")),
                ("count", count.to_string()),
                ("access_token", self.token.clone()),
                ("v", "5.199".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlatformApiError::Api(format!(
                "VK wall.get returned status {}",
                response.status()
            )));
        }
        let body: WallGetResponse = response.json().await.map_err(PlatformApiError::Transport)?;
        body.response
            .map(|r| r.items)
            .ok_or_else(|| PlatformApiError::Api("VK wall.get response missing items".to_string()))
    }

    /// Resolve a group id's public display name (`groups.getById`).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformApiError`] on a network failure or a non-2xx/
    /// `error`-bearing response.
    pub async fn get_group_name(&self, group_id: &str) -> Result<String, PlatformApiError> {
        let url = format!("{}/method/groups.getById", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("group_id", group_id.to_string()),
                ("access_token", self.token.clone()),
                ("v", "5.199".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlatformApiError::Api(format!(
                "VK groups.getById returned status {}",
                response.status()
            )));
        }
        let body: GroupsGetByIdResponse =
            response.json().await.map_err(PlatformApiError::Transport)?;
        body.response
            .and_then(|groups| groups.into_iter().next())
            .map(|g| g.name)
            .ok_or_else(|| PlatformApiError::Api("VK groups.getById response empty".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct WallGetResponse {
    response: Option<WallGetInner>,
}

#[derive(Debug, Deserialize)]
struct WallGetInner {
    items: Vec<VkPost>,
}

#[derive(Debug, Deserialize)]
struct GroupsGetByIdResponse {
    response: Option<Vec<VkGroup>>,
}

#[derive(Debug, Deserialize)]
struct VkGroup {
    name: String,
}

/// An on-demand "fetch last K posts" request (spec §4.4 `UserHistory`).
#[derive(Debug, Clone)]
pub struct UserHistoryRequest {
    /// The requesting user's handle.
    pub user: String,
    /// The VK group id to fetch from.
    pub group_id: String,
    /// The group's public display name (already resolved by the caller).
    pub public_name: String,
    /// How many recent posts to fetch.
    pub count: u32,
}

/// Running handles for the VK adapter's worker pools.
pub struct VkAdapter {
    history_txs: Vec<mpsc::Sender<UserHistoryRequest>>,
    worker_handles: Vec<JoinHandle<()>>,
    refresh_handle: JoinHandle<()>,
    history_handles: Vec<JoinHandle<()>>,
}

impl VkAdapter {
    /// Route a history request to `history_q[h(public_name) mod N_VK_HIST]`
    /// (spec §4.4).
    pub async fn request_history(&self, request: UserHistoryRequest) -> Result<(), UserHistoryRequest> {
        let shard = shard_of(&request.public_name, self.history_txs.len());
        self.history_txs[shard].send(request).await.map_err(|e| e.0)
    }

    /// Stop accepting new history requests and wait for every worker to
    /// drain and stop.
    pub async fn shutdown(self) {
        drop(self.history_txs);
        for handle in self.worker_handles {
            let _ = handle.await;
        }
        self.refresh_handle.abort();
        for handle in self.history_handles {
            let _ = handle.await;
        }
    }
}

/// Bootstrap: seed every watched group's cursor from its current latest post
/// so steady-state polling does not replay history on first run (spec §4.4
/// "Bootstrap").
pub async fn bootstrap(store: &dyn Store, api: &VkApiClient) {
    let groups = match store.get_vk_groups().await {
        Ok(groups) => groups,
        Err(err) => {
            error!(error = %err, "VK bootstrap: failed to load watched groups");
            return;
        }
    };
    for group in groups {
        if store.get_vk_last_post(&group).await.unwrap_or(0) != 0 {
            continue;
        }
        match api.get_latest(&group, 1).await {
            Ok(posts) => {
                if let Some(latest) = posts.first() {
                    if let Err(err) = store.update_vk_last_post(&group, latest.id).await {
                        error!(%group, error = %err, "VK bootstrap: failed to seed cursor");
                    }
                }
            }
            Err(err) => warn!(%group, error = %err, "VK bootstrap: failed to fetch latest post"),
        }
    }
}

/// Spawn the VK adapter's full worker topology: `n_vk` steady-state pollers,
/// one refresh loop, and `n_vk_hist` history workers.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    store: Arc<dyn Store>,
    api: Arc<VkApiClient>,
    dispatcher: Arc<Dispatcher>,
    n_vk: usize,
    n_vk_hist: usize,
    t_refresh: Duration,
    poll_interval: Duration,
) -> VkAdapter {
    let mut watch_txs = Vec::with_capacity(n_vk);
    let mut worker_handles = Vec::with_capacity(n_vk);

    for worker_id in 0..n_vk {
        let (watch_tx, watch_rx) = watch::channel(Vec::<String>::new());
        watch_txs.push(watch_tx);
        let store = Arc::clone(&store);
        let api = Arc::clone(&api);
        let dispatcher = Arc::clone(&dispatcher);
        worker_handles.push(tokio::spawn(run_poll_worker(
            worker_id,
            store,
            api,
            dispatcher,
            watch_rx,
            poll_interval,
        )));
    }

    let refresh_handle = tokio::spawn(run_refresh_loop(
        Arc::clone(&store),
        n_vk,
        t_refresh,
        watch_txs,
    ));

    let mut history_txs = Vec::with_capacity(n_vk_hist);
    let mut history_handles = Vec::with_capacity(n_vk_hist);
    for worker_id in 0..n_vk_hist {
        let (tx, rx) = mpsc::channel(64);
        history_txs.push(tx);
        let store = Arc::clone(&store);
        let api = Arc::clone(&api);
        let dispatcher = Arc::clone(&dispatcher);
        history_handles.push(tokio::spawn(run_history_worker(
            worker_id, store, api, dispatcher, rx,
        )));
    }

    info!(n_vk, n_vk_hist, "VK adapter worker topology started");
    VkAdapter {
        history_txs,
        worker_handles,
        refresh_handle,
        history_handles,
    }
}

/// Re-reads `get_vk_groups()` every `t_refresh`, recomputes the `h(g) mod
/// n_vk` partition, and pushes a worker's new subset only when it changed
/// (sorted equality) — spec §4.4 "Steady state".
async fn run_refresh_loop(
    store: Arc<dyn Store>,
    n_vk: usize,
    t_refresh: Duration,
    watch_txs: Vec<watch::Sender<Vec<String>>>,
) {
    let mut previous: Vec<Vec<String>> = vec![Vec::new(); n_vk];
    loop {
        let groups = match store.get_vk_groups().await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(error = %err, "VK refresh loop: failed to load groups, retrying next cycle");
                tokio::time::sleep(t_refresh).await;
                continue;
            }
        };

        let mut partitions: Vec<Vec<String>> = vec![Vec::new(); n_vk];
        for group in groups {
            let shard = shard_of(&group, n_vk);
            partitions[shard].push(group);
        }
        for partition in &mut partitions {
            partition.sort();
        }

        for (i, partition) in partitions.into_iter().enumerate() {
            if partition != previous[i] {
                debug!(worker_id = i, count = partition.len(), "VK partition changed");
                // `send` only fails if every receiver was dropped, which
                // happens only during shutdown; nothing to recover from.
                let _ = watch_txs[i].send(partition.clone());
                previous[i] = partition;
            }
        }

        tokio::time::sleep(t_refresh).await;
    }
}

/// One steady-state poll worker's cycle (spec §4.4 "Per-worker cycle"):
/// every `poll_interval`, poll each owned group for new posts, enqueue an
/// [`Event`] per new post, and advance the cursor.
async fn run_poll_worker(
    worker_id: usize,
    store: Arc<dyn Store>,
    api: Arc<VkApiClient>,
    dispatcher: Arc<Dispatcher>,
    mut groups_rx: watch::Receiver<Vec<String>>,
    poll_interval: Duration,
) {
    let mut current_groups: Vec<String> = groups_rx.borrow().clone();
    loop {
        // Non-blocking read of the latest partition, replacing the local
        // copy — spec §9 "Graceful VK partition reshape".
        if groups_rx.has_changed().unwrap_or(false) {
            current_groups = groups_rx.borrow_and_update().clone();
        }

        for group in &current_groups {
            poll_one_group(worker_id, &store, &api, &dispatcher, group).await;
        }

        tokio::time::sleep(poll_interval).await;
    }
}

async fn poll_one_group(
    worker_id: usize,
    store: &Arc<dyn Store>,
    api: &VkApiClient,
    dispatcher: &Dispatcher,
    group: &str,
) {
    let last = store.get_vk_last_post(group).await.unwrap_or(0);
    let posts = match api.get_latest(group, 1).await {
        Ok(posts) => posts,
        Err(err) => {
            warn!(worker_id, %group, error = %err, "VK poll failed");
            return;
        }
    };

    let display_name = store
        .get_vk_public_name(group)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| group.to_string());

    let mut new_last = last;
    for post in posts.into_iter().filter(|p| p.id > last) {
        new_last = new_last.max(post.id);
        let event = Event::new(
            Platform::Vk,
            display_name.clone(),
            group.to_string(),
            post.text,
            format!("https://vk.com/wall-{group}_{}", post.id),
            post.id.to_string(),
        );
        if dispatcher.enqueue(event).await.is_err() {
            warn!(worker_id, %group, "dispatcher shard closed, dropping VK event");
        }
    }

    if new_last != last {
        if let Err(err) = store.update_vk_last_post(group, new_last).await {
            error!(worker_id, %group, error = %err, "failed to advance VK cursor");
        }
    }
}

/// One history worker's loop: services explicit "fetch last K posts"
/// requests, bypassing cooldown and pause entirely (spec §4.4 "History
/// requests", §4.2 step 5/7).
async fn run_history_worker(
    worker_id: usize,
    store: Arc<dyn Store>,
    api: Arc<VkApiClient>,
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<UserHistoryRequest>,
) {
    while let Some(request) = rx.recv().await {
        let posts = match api.get_latest(&request.group_id, request.count).await {
            Ok(posts) => posts,
            Err(err) => {
                warn!(worker_id, group = %request.group_id, error = %err, "VK history fetch failed");
                continue;
            }
        };
        if store
            .add_vk_public(&request.public_name, &request.group_id)
            .await
            .is_err()
        {
            debug!(worker_id, group = %request.group_id, "failed to cache VK public name");
        }
        for post in posts {
            let event = Event::new(
                Platform::Vk,
                request.public_name.clone(),
                request.group_id.clone(),
                post.text,
                format!("https://vk.com/wall-{}_{}", request.group_id, post.id),
                post.id.to_string(),
            )
            .with_history_request(request.user.clone());
            if dispatcher.enqueue(event).await.is_err() {
                warn!(worker_id, "dispatcher shard closed, dropping VK history event");
            }
        }
    }
    debug!(worker_id, "VK history worker drained and stopped");
}
