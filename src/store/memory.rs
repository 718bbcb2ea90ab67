//! Thread-safe in-memory [`DocumentBackend`] for local development and tests.

// crates.io
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	store::{
		StoreError,
		document::{DocFuture, DocumentBackend},
	},
};

type Collections = Arc<RwLock<HashMap<String, Vec<Entry>>>>;

#[derive(Clone, Debug)]
struct Entry {
	id: Option<String>,
	document: Value,
}

/// In-process document backend keeping collections in a map, for tests and
/// demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend(Collections);
impl MemoryBackend {
	fn insert_now(
		collections: Collections,
		collection: String,
		document: Value,
	) -> Result<(), StoreError> {
		collections.write().entry(collection).or_default().push(Entry { id: None, document });

		Ok(())
	}

	fn upsert_now(
		collections: Collections,
		collection: String,
		id: String,
		document: Value,
	) -> Result<(), StoreError> {
		let mut guard = collections.write();
		let entries = guard.entry(collection).or_default();

		match entries.iter_mut().find(|e| e.id.as_deref() == Some(id.as_str())) {
			Some(entry) => entry.document = document,
			None => entries.push(Entry { id: Some(id), document }),
		}

		Ok(())
	}

	fn find_now(
		collections: Collections,
		collection: String,
		id: String,
	) -> Result<Option<Value>, StoreError> {
		Ok(collections.read().get(&collection).and_then(|entries| {
			entries
				.iter()
				.find(|e| e.id.as_deref() == Some(id.as_str()))
				.map(|e| e.document.clone())
		}))
	}

	fn find_latest_now(
		collections: Collections,
		collection: String,
		date_field: String,
	) -> Result<Option<Value>, StoreError> {
		let guard = collections.read();
		let Some(entries) = guard.get(&collection) else { return Ok(None) };
		let mut latest: Option<(OffsetDateTime, &Entry)> = None;

		for entry in entries {
			let date = document_date(&entry.document, &date_field)?;

			if latest.as_ref().is_none_or(|(current, _)| date > *current) {
				latest = Some((date, entry));
			}
		}

		Ok(latest.map(|(_, entry)| entry.document.clone()))
	}

	fn count_now(collections: Collections, collection: String) -> Result<u64, StoreError> {
		Ok(collections.read().get(&collection).map(|entries| entries.len() as u64).unwrap_or(0))
	}

	fn remove_oldest_now(
		collections: Collections,
		collection: String,
		date_field: String,
	) -> Result<(), StoreError> {
		let mut guard = collections.write();
		let Some(entries) = guard.get_mut(&collection) else { return Ok(()) };
		let mut oldest: Option<(OffsetDateTime, usize)> = None;

		for (index, entry) in entries.iter().enumerate() {
			let date = document_date(&entry.document, &date_field)?;

			if oldest.as_ref().is_none_or(|(current, _)| date < *current) {
				oldest = Some((date, index));
			}
		}

		if let Some((_, index)) = oldest {
			entries.remove(index);
		}

		Ok(())
	}
}
impl DocumentBackend for MemoryBackend {
	fn insert<'a>(&'a self, collection: &'a str, document: Value) -> DocFuture<'a, ()> {
		let collections = self.0.clone();
		let collection = collection.to_owned();

		Box::pin(async move { Self::insert_now(collections, collection, document) })
	}

	fn upsert<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		document: Value,
	) -> DocFuture<'a, ()> {
		let collections = self.0.clone();
		let collection = collection.to_owned();
		let id = id.to_owned();

		Box::pin(async move { Self::upsert_now(collections, collection, id, document) })
	}

	fn find<'a>(&'a self, collection: &'a str, id: &'a str) -> DocFuture<'a, Option<Value>> {
		let collections = self.0.clone();
		let collection = collection.to_owned();
		let id = id.to_owned();

		Box::pin(async move { Self::find_now(collections, collection, id) })
	}

	fn find_latest<'a>(
		&'a self,
		collection: &'a str,
		date_field: &'a str,
	) -> DocFuture<'a, Option<Value>> {
		let collections = self.0.clone();
		let collection = collection.to_owned();
		let date_field = date_field.to_owned();

		Box::pin(async move { Self::find_latest_now(collections, collection, date_field) })
	}

	fn count<'a>(&'a self, collection: &'a str) -> DocFuture<'a, u64> {
		let collections = self.0.clone();
		let collection = collection.to_owned();

		Box::pin(async move { Self::count_now(collections, collection) })
	}

	fn remove_oldest<'a>(&'a self, collection: &'a str, date_field: &'a str) -> DocFuture<'a, ()> {
		let collections = self.0.clone();
		let collection = collection.to_owned();
		let date_field = date_field.to_owned();

		Box::pin(async move { Self::remove_oldest_now(collections, collection, date_field) })
	}
}

fn document_date(document: &Value, date_field: &str) -> Result<OffsetDateTime, StoreError> {
	let raw = document.get(date_field).and_then(Value::as_str).ok_or_else(|| {
		StoreError::Backend { message: format!("document is missing the {date_field} field") }
	})?;

	OffsetDateTime::parse(raw, &Rfc3339)
		.map_err(|e| StoreError::Backend { message: format!("unparseable {date_field}: {e}") })
}
