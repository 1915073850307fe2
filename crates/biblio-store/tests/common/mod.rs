//! Shared fixtures for biblio-store integration tests
#![allow(dead_code)]

use biblio_core::model::dataset::{ACCESS_LEVEL_EMBARGO, ACCESS_LEVEL_OPEN};
use biblio_core::{Contributor, Dataset, Publication, User};
use biblio_store::{Client, Repo, RepoConfig, StoreConfig};
use std::time::Duration;
use tempfile::TempDir;

/// A client on a fresh file database; keep the `TempDir` alive
pub fn file_client() -> (TempDir, Client) {
    file_client_with(StoreConfig::default())
}

pub fn file_client_with(config: StoreConfig) -> (TempDir, Client) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("biblio.db");
    let config = config.with_database(path.to_string_lossy().to_string());
    let client = Client::open(&config).expect("Failed to open client");
    (dir, client)
}

pub fn memory_client() -> Client {
    Client::open(&StoreConfig::in_memory()).expect("Failed to open in-memory client")
}

pub fn repo() -> (TempDir, Repo) {
    repo_with(RepoConfig::default())
}

pub fn repo_with(config: RepoConfig) -> (TempDir, Repo) {
    let (dir, client) = file_client();
    (dir, Repo::new(client, config))
}

pub fn user() -> User {
    User::new("u1", "Ada Lovelace")
}

pub fn other_user() -> User {
    User::new("u2", "Grace Hopper")
}

pub fn dataset(id: &str, title: &str) -> Dataset {
    let mut d = Dataset::new(id);
    d.title = Some(title.to_string());
    d
}

pub fn publication(id: &str, title: &str) -> Publication {
    let mut p = Publication::new(id);
    p.title = Some(title.to_string());
    p
}

pub fn embargoed_dataset(id: &str, until: &str) -> Dataset {
    let mut d = dataset(id, "Embargoed");
    d.access_level = Some(ACCESS_LEVEL_EMBARGO.to_string());
    d.embargo_date = Some(until.to_string());
    d.access_level_after_embargo = Some(ACCESS_LEVEL_OPEN.to_string());
    d
}

pub fn person(id: &str, first: &str, last: &str) -> Contributor {
    Contributor::new(first, last).with_person_id(id)
}

pub fn json(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).expect("Failed to encode payload")
}

/// Let the clock move past the previous write
pub fn tick() {
    std::thread::sleep(Duration::from_millis(5));
}
