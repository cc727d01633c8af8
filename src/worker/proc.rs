//! The `Process(GET|PUT)` pipelines.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use tokio::task;

use crate::cache::EntityCache;
use crate::crypto::{EntityCipher, MasterKey};
use crate::error::{DbError, DbResult};
use crate::naming::validate_entity_names;
use crate::rpc::codec::{ProcessRequest, ProcessResponse};
use crate::schema::{SchemaError, SchemaRegistry};
use crate::store::{EntityMetadata, FileStore, StoreError, ENTITY_ALG};

/// `cache` field values surfaced to REST as `X-Cache`.
const CACHE_HIT: &str = "HIT";
const CACHE_MISS: &str = "MISS";

/// One worker's processing capability: store + crypto + schemas + cache.
///
/// Wrapped in `Arc` by callers; the same type backs a standalone proc-worker
/// process and the main worker's colocated fallback.
pub struct ProcWorker {
    worker_id: String,
    store: FileStore,
    cipher: Arc<EntityCipher>,
    schemas: SchemaRegistry,
    cache: Arc<EntityCache>,
}

impl ProcWorker {
    pub fn new(
        worker_id: &str,
        shared_fs_root: &Path,
        master: &MasterKey,
        cache_capacity: usize,
    ) -> DbResult<Self> {
        let store = FileStore::open(shared_fs_root).map_err(DbError::from)?;
        let schemas = SchemaRegistry::open(shared_fs_root)
            .map_err(|_| DbError::internal("storage error"))?;
        Ok(Self {
            worker_id: worker_id.to_string(),
            store,
            cipher: Arc::new(EntityCipher::new(master)),
            schemas,
            cache: Arc::new(EntityCache::with_capacity(cache_capacity)),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// `(hits, misses)` of the plaintext cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Serve one `Process` request. Operations other than GET and PUT are
    /// argument errors.
    pub async fn process(&self, request: &ProcessRequest) -> DbResult<ProcessResponse> {
        match request.operation.as_str() {
            "GET" => self.get(request).await,
            "PUT" => self.put(request).await,
            other => Err(DbError::bad_input(format!(
                "unsupported operation: {other:.16}"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // PUT
    // ------------------------------------------------------------------

    async fn put(&self, request: &ProcessRequest) -> DbResult<ProcessResponse> {
        validate_entity_names(&request.database_name, &request.entity_key)?;
        if request.payload.is_empty() {
            return Err(DbError::bad_input("payload must not be empty"));
        }

        if !request.schema_id.is_empty() {
            let document: serde_json::Value = serde_json::from_slice(&request.payload)
                .map_err(|_| DbError::bad_input("payload is not valid JSON"))?;
            match self.schemas.validate(&request.schema_id, &document) {
                Ok(()) => {}
                Err(SchemaError::NotFound) => {
                    return Err(DbError::bad_input("unknown schema_id"))
                }
                Err(SchemaError::Invalid(message)) => return Err(DbError::bad_input(message)),
                Err(_) => return Err(DbError::internal("schema validation failed")),
            }
        }

        let sealed = self
            .cipher
            .seal(&request.payload)
            .map_err(|_| DbError::internal("encryption failed"))?;

        let store = self.store.clone();
        let cache = Arc::clone(&self.cache);
        let database = request.database_name.clone();
        let entity_key = request.entity_key.clone();
        let schema_id = request.schema_id.clone();
        let writer_id = self.worker_id.clone();
        let key_id = self.cipher.key_id().to_string();
        let plaintext = request.payload.clone();

        let metadata = task::spawn_blocking(move || {
            let (db_path, key_path) = (database.clone(), entity_key.clone());
            let (cache_db, cache_key) = (database.clone(), entity_key.clone());
            store.update(
                &db_path,
                &key_path,
                move |prev| {
                    let version = prev.map(|m| m.version + 1).unwrap_or(1);
                    let metadata = EntityMetadata {
                        key_id,
                        alg: ENTITY_ALG.to_string(),
                        iv: BASE64.encode(sealed.nonce),
                        tag: BASE64.encode(sealed.tag),
                        schema_id,
                        version,
                        writer_id,
                        timestamp: Utc::now(),
                        database,
                        entity_key,
                    };
                    Ok((sealed.ciphertext, metadata))
                },
                // Publish inside the exclusive lock: disk write happens-before
                // cache write happens-before lock release.
                move |meta| cache.put(&cache_db, &cache_key, plaintext, meta.version),
            )
        })
        .await
        .map_err(|_| DbError::internal("storage error"))?
        .map_err(DbError::from)?;

        tracing::debug!(
            database = %metadata.database,
            entity_key = %metadata.entity_key,
            version = metadata.version,
            "entity written"
        );

        Ok(ProcessResponse {
            status: "OK".to_string(),
            version: metadata.version,
            ..Default::default()
        })
    }

    // ------------------------------------------------------------------
    // GET
    // ------------------------------------------------------------------

    async fn get(&self, request: &ProcessRequest) -> DbResult<ProcessResponse> {
        validate_entity_names(&request.database_name, &request.entity_key)?;

        if let Some(entry) = self.cache.get(&request.database_name, &request.entity_key) {
            return Ok(ProcessResponse {
                status: "OK".to_string(),
                result: entry.plaintext.as_ref().clone(),
                version: entry.version,
                cache: CACHE_HIT.to_string(),
                ..Default::default()
            });
        }

        let store = self.store.clone();
        let cipher = Arc::clone(&self.cipher);
        let cache = Arc::clone(&self.cache);
        let database = request.database_name.clone();
        let entity_key = request.entity_key.clone();

        let outcome = task::spawn_blocking(move || {
            let (db_path, key_path) = (database.clone(), entity_key.clone());
            store.read_with(&db_path, &key_path, |blob, metadata| {
                let nonce = BASE64
                    .decode(metadata.iv.as_bytes())
                    .map_err(|_| StoreError::Corrupt)?;
                let tag = BASE64
                    .decode(metadata.tag.as_bytes())
                    .map_err(|_| StoreError::Corrupt)?;
                let plaintext = cipher
                    .open(blob, &nonce, &tag)
                    .map_err(|_| StoreError::Corrupt)?;

                // Populate while the shared lock is held; a writer cannot
                // rename a newer version under us, so this entry matches disk.
                cache.put(&database, &entity_key, plaintext.clone(), metadata.version);
                Ok((plaintext, metadata.version))
            })
        })
        .await
        .map_err(|_| DbError::internal("storage error"))?;

        let (plaintext, version) = outcome.map_err(|err| match err {
            StoreError::NotFound => DbError::not_found("entity not found"),
            // Tamper, missing halves, bad metadata, decrypt failure: one
            // generic internal error, never the failing step.
            other => DbError::from(other),
        })?;

        Ok(ProcessResponse {
            status: "OK".to_string(),
            result: plaintext,
            version,
            cache: CACHE_MISS.to_string(),
            ..Default::default()
        })
    }
}
