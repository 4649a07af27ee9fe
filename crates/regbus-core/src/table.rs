//! Persistent name-to-descriptor address table.
//!
//! The table maps case-sensitive, dot-delimited register names (for
//! example `GEM_AMC.DAQ.CONTROL.DAQ_ENABLE`) to [`RegisterDescriptor`]s.
//! It is populated in bulk from an externally parsed schema, immutable
//! between reloads, and backed by a record file that survives process
//! restarts. A reload never leaves the backing store half-populated: the
//! new contents are staged to a sibling file and renamed over the old one.
//!
//! Concurrent reload during active lookups in other processes is
//! caller-synchronized; within one process the `&mut self` receiver on
//! [`AddressTable::reload`] enforces exclusivity.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::descriptor::RegisterDescriptor;
use crate::error::BusError;

/// Upper bound on the persistent store size in bytes (the original
/// deployment's 50 MiB map cap).
pub const STORE_SIZE_CAP: u64 = 50 * 1024 * 1024;

/// Environment variable naming the directory that holds the store.
pub const STORE_PATH_ENV: &str = "GEM_PATH";

/// File name of the store inside the base directory.
pub const STORE_FILE_NAME: &str = "address_table.db";

/// Persistent mapping from register name to [`RegisterDescriptor`].
#[derive(Debug)]
pub struct AddressTable {
    path: PathBuf,
    entries: HashMap<String, RegisterDescriptor>,
}

impl AddressTable {
    /// Opens the table backed by the store file at `path`, loading the
    /// current contents. A missing store yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns a store error when the file cannot be read, exceeds
    /// [`STORE_SIZE_CAP`], or holds an unparsable record.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BusError> {
        let path = path.into();
        let entries = if path.exists() {
            load_store(&path)?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "address table opened");
        Ok(Self { path, entries })
    }

    /// Opens the table at the conventional location under the directory
    /// named by [`STORE_PATH_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::StoreUnconfigured`] when the environment
    /// variable is unset, or any [`Self::open`] error.
    pub fn from_env() -> Result<Self, BusError> {
        let base = env::var_os(STORE_PATH_ENV)
            .ok_or(BusError::StoreUnconfigured(STORE_PATH_ENV))?;
        Self::open(PathBuf::from(base).join(STORE_FILE_NAME))
    }

    /// Path of the backing store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up the descriptor for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotFound`] when the name is absent.
    pub fn lookup(&self, name: &str) -> Result<&RegisterDescriptor, BusError> {
        self.entries
            .get(name)
            .ok_or_else(|| BusError::NotFound(name.to_owned()))
    }

    /// Non-failing existence probe, for call sites that optionally
    /// support registers present only in certain firmware generations.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of named registers in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the table holds no registers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, descriptor)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisterDescriptor)> {
        self.entries
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    /// Atomically discards the current table and repopulates it from an
    /// externally parsed schema.
    ///
    /// The new contents are serialized to a staging file and renamed over
    /// the store, so a failure at any point leaves both the in-memory
    /// table and the backing store at their previous state.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::StoreTooLarge`] when the serialized table
    /// would exceed [`STORE_SIZE_CAP`], or a store I/O error.
    pub fn reload<I>(&mut self, schema: I) -> Result<(), BusError>
    where
        I: IntoIterator<Item = (String, RegisterDescriptor)>,
    {
        let staged: HashMap<String, RegisterDescriptor> = schema.into_iter().collect();

        let mut names: Vec<&String> = staged.keys().collect();
        names.sort_unstable();
        let mut serialized = String::new();
        for name in names {
            serialized.push_str(name);
            serialized.push('\t');
            serialized.push_str(&staged[name].to_record());
            serialized.push('\n');
        }

        if serialized.len() as u64 > STORE_SIZE_CAP {
            return Err(BusError::StoreTooLarge {
                limit: STORE_SIZE_CAP,
            });
        }

        let staging = staging_path(&self.path);
        fs::write(&staging, serialized)?;
        fs::rename(&staging, &self.path)?;

        info!(entries = staged.len(), path = %self.path.display(), "address table reloaded");
        self.entries = staged;
        Ok(())
    }
}

fn staging_path(store: &Path) -> PathBuf {
    let mut name = store
        .file_name()
        .map_or_else(|| std::ffi::OsString::from("store"), ToOwned::to_owned);
    name.push(".staging");
    store.with_file_name(name)
}

fn load_store(path: &Path) -> Result<HashMap<String, RegisterDescriptor>, BusError> {
    let reported = fs::metadata(path)?.len();
    if reported > STORE_SIZE_CAP {
        return Err(BusError::StoreTooLarge {
            limit: STORE_SIZE_CAP,
        });
    }

    let contents = fs::read_to_string(path)?;
    let mut entries = HashMap::new();
    for (index, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;
        let (name, record) = line.split_once('\t').ok_or_else(|| BusError::StoreCorrupted {
            line: line_no,
            reason: "missing name/record separator".to_owned(),
        })?;
        let descriptor =
            RegisterDescriptor::from_record(record).map_err(|err| BusError::StoreCorrupted {
                line: line_no,
                reason: err.to_string(),
            })?;
        entries.insert(name.to_owned(), descriptor);
    }
    Ok(entries)
}
