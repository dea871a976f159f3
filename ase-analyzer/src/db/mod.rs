//! Document store access for ase-analyzer
//!
//! Three collections are opened at startup: `keywords`, `results` and `cache`.
//! Only `results` is ever written, and nothing is read back.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use ase_common::ResultDocument;

use crate::error::Result;

pub const KEYWORDS_COLLECTION: &str = "keywords";
pub const RESULTS_COLLECTION: &str = "results";
pub const CACHE_COLLECTION: &str = "cache";

/// Database used when the connection URL names none
pub const DEFAULT_DATABASE: &str = "ase";

/// Append-only sink for scored results
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn insert_result(&self, result: &ResultDocument) -> Result<()>;
}

/// MongoDB-backed store
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
    keywords: Collection<Document>,
    results: Collection<ResultDocument>,
    cache: Collection<Document>,
}

impl MongoStore {
    /// Connect and verify the server answers a ping
    ///
    /// The driver connects lazily, so the ping is what surfaces an unreachable
    /// server at startup.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));

        database.run_command(doc! { "ping": 1 }, None).await?;
        info!("Connection to database '{}' established", database.name());

        Ok(Self {
            keywords: database.collection(KEYWORDS_COLLECTION),
            results: database.collection(RESULTS_COLLECTION),
            cache: database.collection(CACHE_COLLECTION),
            database,
        })
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Keyword collection (opened, not used by the pipeline)
    pub fn keywords(&self) -> &Collection<Document> {
        &self.keywords
    }

    /// Cache collection (opened, not used by the pipeline)
    pub fn cache(&self) -> &Collection<Document> {
        &self.cache
    }
}

#[async_trait]
impl ResultStore for MongoStore {
    async fn insert_result(&self, result: &ResultDocument) -> Result<()> {
        let inserted = self.results.insert_one(result, None).await?;
        debug!("Inserted result {:?} for phrase '{}'", inserted.inserted_id, result.phrase);
        Ok(())
    }
}
