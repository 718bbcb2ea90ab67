//! Simple file-backed [`CredentialStore`] for lightweight deployments and bots.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::{
		GlobalTokenPatch, GlobalTokenRecord, OAuthTokenPatch, OAuthTokenRecord, SignaturePatch,
		SignatureRecord,
	},
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Credential store keeping all records in memory and writing them to one
/// JSON document on a fixed interval.
///
/// The document holds three sections, `globalToken`, `signatures`, and
/// `oauthTokens`, and is replaced atomically (write to `<path>.tmp`, sync,
/// rename). Mutations touch only the in-memory snapshot; a crash between
/// flushes loses at most one interval of updates.
#[derive(Debug)]
pub struct FileBackedStore {
	inner: Arc<Inner>,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl FileBackedStore {
	/// Default interval between periodic snapshot writes.
	pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::minutes(3);

	/// Opens (or creates) a store at the provided path with the default flush
	/// interval. Must be called within a Tokio runtime context.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		Self::open_with_interval(path, Self::DEFAULT_FLUSH_INTERVAL)
	}

	/// Opens (or creates) a store at the provided path, eagerly loading
	/// existing data.
	///
	/// A positive `flush_interval` starts the periodic flush task and
	/// therefore requires a Tokio runtime context. A non-positive interval
	/// disables the task, leaving all writes to explicit
	/// [`flush`](CredentialStore::flush) calls.
	pub fn open_with_interval(
		path: impl Into<PathBuf>,
		flush_interval: Duration,
	) -> Result<Self, StoreError> {
		let path = path.into();

		Inner::ensure_parent_exists(&path)?;

		let snapshot = Inner::load_snapshot(&path)?;
		let inner = Arc::new(Inner { path, snapshot: RwLock::new(snapshot) });
		let task = flush_interval.is_positive().then(|| {
			let inner = inner.clone();
			let period = flush_interval.unsigned_abs();

			tokio::spawn(async move {
				let mut ticker = tokio::time::interval(period);

				// The first tick completes immediately; skip it so writes
				// happen on the interval, not at startup.
				ticker.tick().await;

				loop {
					ticker.tick().await;

					// A failed periodic write retries on the next tick;
					// explicit flushes surface their own errors.
					let _ = inner.persist();
				}
			})
		});

		Ok(Self { inner, task: Mutex::new(task) })
	}

	/// Stops the periodic flush task and writes the snapshot once more.
	pub async fn shutdown(&self) -> Result<(), StoreError> {
		if let Some(task) = self.task.lock().take() {
			task.abort();
		}

		self.inner.persist()
	}
}
impl CredentialStore for FileBackedStore {
	fn global_token(&self) -> StoreFuture<'_, Option<GlobalTokenRecord>> {
		Box::pin(async move { Ok(self.inner.snapshot.read().global_token.clone()) })
	}

	fn update_global_token(&self, patch: GlobalTokenPatch) -> StoreFuture<'_, GlobalTokenRecord> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut guard = self.inner.snapshot.write();
			let record =
				guard.global_token.get_or_insert_with(|| GlobalTokenRecord::bootstrap(now));

			record.apply(patch, now);

			Ok(record.clone())
		})
	}

	fn signature_exists<'a>(&'a self, url: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.inner.snapshot.read().signatures.contains_key(url)) })
	}

	fn signature<'a>(&'a self, url: &'a str) -> StoreFuture<'a, Option<SignatureRecord>> {
		Box::pin(async move { Ok(self.inner.snapshot.read().signatures.get(url).cloned()) })
	}

	fn save_signature(&self, record: SignatureRecord) -> StoreFuture<'_, SignatureRecord> {
		Box::pin(async move {
			self.inner.snapshot.write().signatures.insert(record.url.clone(), record.clone());

			Ok(record)
		})
	}

	fn update_signature<'a>(
		&'a self,
		url: &'a str,
		patch: SignaturePatch,
	) -> StoreFuture<'a, SignatureRecord> {
		Box::pin(async move {
			let mut guard = self.inner.snapshot.write();

			match guard.signatures.get_mut(url) {
				Some(record) => {
					record.apply(patch, OffsetDateTime::now_utc());

					Ok(record.clone())
				},
				None => Err(StoreError::MissingRecord { key: url.into() }),
			}
		})
	}

	fn oauth_token<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<OAuthTokenRecord>> {
		Box::pin(async move { Ok(self.inner.snapshot.read().oauth_tokens.get(key).cloned()) })
	}

	fn save_oauth_token(&self, record: OAuthTokenRecord) -> StoreFuture<'_, OAuthTokenRecord> {
		Box::pin(async move {
			self.inner.snapshot.write().oauth_tokens.insert(record.key.clone(), record.clone());

			Ok(record)
		})
	}

	fn update_oauth_token<'a>(
		&'a self,
		key: &'a str,
		patch: OAuthTokenPatch,
	) -> StoreFuture<'a, OAuthTokenRecord> {
		Box::pin(async move {
			let mut guard = self.inner.snapshot.write();

			match guard.oauth_tokens.get_mut(key) {
				Some(record) => {
					record.apply(patch, OffsetDateTime::now_utc());

					Ok(record.clone())
				},
				None => Err(StoreError::MissingRecord { key: key.into() }),
			}
		})
	}

	fn flush(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.inner.persist() })
	}
}
impl Drop for FileBackedStore {
	fn drop(&mut self) {
		if let Some(task) = self.task.lock().take() {
			task.abort();
		}
	}
}

#[derive(Debug)]
struct Inner {
	path: PathBuf,
	snapshot: RwLock<StoreSnapshot>,
}
impl Inner {
	fn load_snapshot(path: &Path) -> Result<StoreSnapshot, StoreError> {
		if !path.exists() {
			return Ok(StoreSnapshot::default());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(StoreSnapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist(&self) -> Result<(), StoreError> {
		let guard = self.snapshot.read();

		self.persist_locked(&guard)
	}

	fn persist_locked(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoreSnapshot {
	global_token: Option<GlobalTokenRecord>,
	signatures: HashMap<String, SignatureRecord>,
	oauth_tokens: HashMap<String, OAuthTokenRecord>,
}
