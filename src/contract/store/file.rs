//! JSON file-backed [`ContractStore`] so learned contracts survive restarts.

// std
use std::{
	fs::{self, File},
	io::{self, ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	contract::store::{ContractSnapshot, ContractStore, StoreError, StoreFuture},
};

/// Persists the snapshot to a JSON file, replacing it atomically on every save.
///
/// The file is read once at [`open`](Self::open); later loads are served from memory. Saves
/// write a sibling `.tmp` file, fsync it, then rename it over the target so a crash never leaves
/// a half-written snapshot behind.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	cached: Arc<RwLock<Option<ContractSnapshot>>>,
}
impl FileStore {
	/// Opens the store at `path`, creating parent directories and loading any existing snapshot.
	///
	/// A missing or empty file means nothing has been learned yet.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		create_parent(&path)?;

		let snapshot = match fs::read(&path) {
			Ok(bytes) if bytes.is_empty() => None,
			Ok(bytes) => Some(serde_json::from_slice(&bytes).map_err(|e| {
				StoreError::Serialization {
					message: format!("Contract snapshot {} is corrupt: {e}", path.display()),
				}
			})?),
			Err(e) if e.kind() == ErrorKind::NotFound => None,
			Err(e) => return Err(backend("read", &path, e)),
		};

		Ok(Self { path, cached: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_through(&self, snapshot: &ContractSnapshot) -> Result<(), StoreError> {
		let payload = serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
			message: format!("Contract snapshot could not be encoded: {e}"),
		})?;
		let staging = self.path.with_extension("tmp");

		create_parent(&self.path)?;

		let mut file = File::create(&staging).map_err(|e| backend("create", &staging, e))?;

		file.write_all(&payload).map_err(|e| backend("write", &staging, e))?;
		file.sync_all().map_err(|e| backend("sync", &staging, e))?;
		drop(file);

		fs::rename(&staging, &self.path).map_err(|e| backend("replace", &self.path, e))
	}
}
impl ContractStore for FileStore {
	fn save(&self, snapshot: ContractSnapshot) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut cached = self.cached.write();

			self.write_through(&snapshot)?;
			*cached = Some(snapshot);

			Ok(())
		})
	}

	fn load(&self) -> StoreFuture<'_, Option<ContractSnapshot>> {
		Box::pin(async move { Ok(self.cached.read().clone()) })
	}
}

fn create_parent(path: &Path) -> Result<(), StoreError> {
	match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() =>
			fs::create_dir_all(parent).map_err(|e| backend("create directory", parent, e)),
		_ => Ok(()),
	}
}

fn backend(action: &str, path: &Path, e: io::Error) -> StoreError {
	StoreError::Backend { message: format!("Could not {action} {}: {e}", path.display()) }
}
