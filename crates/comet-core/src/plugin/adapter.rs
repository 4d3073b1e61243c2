//! Host-side wrapper exposing a module's capability table as a [`Provider`].
//!
//! All raw pointers on the host side live in this file. Results returned by a
//! module are copied into owned [`Entry`] values and handed back to the
//! module's `release` before any adapter method returns, so no module-owned
//! memory escapes.

use std::collections::{BTreeMap, HashMap};
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

use comet_abi::{read_str, HostContext, PluginTable, RawEntry, FLAG_NO_HISTORY, FLAG_NO_SORT};
use libloading::Library;

use crate::entry::Entry;
use crate::error::CometError;
use crate::plugin::loader::LoadedModule;
use crate::provider::Provider;

/// Per-module state reachable from the host callbacks.
///
/// Holds the module's scoped settings and the shared data directory as C
/// strings, so pointers handed to the module stay valid as long as the binding.
#[derive(Debug)]
pub struct HostBinding {
    module: String,
    settings: HashMap<String, CString>,
    data_dir: CString,
}

impl HostBinding {
    pub fn new(module: &str, settings: BTreeMap<String, String>, data_dir: &Path) -> Self {
        let settings = settings
            .into_iter()
            .filter_map(|(key, value)| match CString::new(value) {
                Ok(value) => Some((key, value)),
                Err(_) => {
                    tracing::warn!("Setting {}.{} contains a NUL byte, ignored", module, key);
                    None
                }
            })
            .collect();

        let data_dir = CString::new(data_dir.to_string_lossy().into_owned()).unwrap_or_default();

        Self {
            module: module.to_string(),
            settings,
            data_dir,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }
}

unsafe extern "C" fn host_get_config_value(ctx: *mut c_void, key: *const c_char) -> *const c_char {
    if ctx.is_null() || key.is_null() {
        return ptr::null();
    }
    let binding = &*(ctx as *const HostBinding);
    let key = CStr::from_ptr(key).to_string_lossy();
    binding
        .settings
        .get(key.as_ref())
        .map_or(ptr::null(), |value| value.as_ptr())
}

unsafe extern "C" fn host_get_data_dir(ctx: *mut c_void) -> *const c_char {
    if ctx.is_null() {
        return ptr::null();
    }
    let binding = &*(ctx as *const HostBinding);
    binding.data_dir.as_ptr()
}

/// A loaded module presented through the [`Provider`] interface.
///
/// Dropping it calls the module's `teardown` and then unloads the library.
pub struct PluginProvider {
    name: String,
    table: *const PluginTable,
    triggers: Vec<String>,
    participates_in_history: bool,
    disables_default_sort: bool,
    // Field order matters: the context points into the binding, and both must
    // outlive every module call; the library is dropped last.
    _context: Box<HostContext>,
    binding: Box<HostBinding>,
    library: Option<Library>,
}

impl PluginProvider {
    /// Take ownership of a loaded module and initialize it.
    pub fn new(module: LoadedModule, binding: HostBinding) -> Self {
        let (name, table, library) = module.into_parts();
        // SAFETY: the loader validated the table and it lives inside `library`,
        // which this provider now owns.
        unsafe { Self::from_table(name, table, binding, Some(library)) }
    }

    /// Wrap a capability table directly.
    ///
    /// # Safety
    /// `table` must be non-null, point to a valid `PluginTable` and stay valid
    /// (together with every function it references) until the provider is
    /// dropped. If the table lives in a dynamic library, pass it as `library`.
    pub unsafe fn from_table(
        name: impl Into<String>,
        table: *const PluginTable,
        binding: HostBinding,
        library: Option<Library>,
    ) -> Self {
        let name = name.into();
        let binding = Box::new(binding);
        let context = Box::new(HostContext {
            ctx: &*binding as *const HostBinding as *mut c_void,
            get_config_value: Some(host_get_config_value),
            get_data_dir: Some(host_get_data_dir),
        });

        let raw = &*table;
        if raw.release.is_none() {
            tracing::warn!("Module {} has no release function; its results will leak", name);
        }

        if let Some(init) = raw.init {
            init(&*context);
        }

        let triggers = read_triggers(raw);
        tracing::debug!("Module {} registered triggers {:?}", name, triggers);

        Self {
            name,
            table,
            triggers,
            participates_in_history: raw.flags & FLAG_NO_HISTORY == 0,
            disables_default_sort: raw.flags & FLAG_NO_SORT != 0,
            _context: context,
            binding,
            library,
        }
    }

    fn table(&self) -> &PluginTable {
        // SAFETY: guaranteed valid for our lifetime by the constructors.
        unsafe { &*self.table }
    }

    pub fn binding(&self) -> &HostBinding {
        &self.binding
    }

    /// Copy a module-returned array and hand it back to `release`.
    ///
    /// Inconsistent pointer/count pairs yield no entries and are never read.
    unsafe fn take_entries(&self, entries: *mut RawEntry, count: usize) -> Vec<Entry> {
        match (entries.is_null(), count) {
            (true, 0) => Vec::new(),
            (true, n) => {
                self.report_malformed(format!("count {} with a null array", n));
                Vec::new()
            }
            (false, 0) => {
                self.report_malformed("non-null array with count 0".to_string());
                self.release(entries, 0);
                Vec::new()
            }
            (false, n) => {
                let copied = std::slice::from_raw_parts(entries, n)
                    .iter()
                    .map(|raw| copy_entry(raw))
                    .collect();
                self.release(entries, n);
                copied
            }
        }
    }

    unsafe fn release(&self, entries: *mut RawEntry, count: usize) {
        if let Some(release) = self.table().release {
            release(entries, count);
        }
    }

    fn report_malformed(&self, reason: String) {
        let err = CometError::MalformedResult {
            module: self.name.clone(),
            reason,
        };
        tracing::warn!("{}", err);
    }

    fn synthesized_help(&self) -> Entry {
        Entry::new(self.name.clone(), self.triggers.first().cloned().unwrap_or_default())
            .with_comment(format!("Triggers: {}", self.triggers.join(", ")))
            .with_icon("application-x-addon")
            .with_category("plugin")
    }
}

impl Provider for PluginProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn help(&self) -> Entry {
        let Some(help) = self.table().help else {
            return self.synthesized_help();
        };

        // SAFETY: calling into the module per the ABI; a non-null result is
        // one entry that we release with count 1.
        let mut entries = unsafe {
            let entry = help();
            if entry.is_null() {
                Vec::new()
            } else {
                self.take_entries(entry, 1)
            }
        };

        match entries.pop() {
            Some(mut entry) => {
                if entry.category.is_empty() {
                    entry.category = "plugin".to_string();
                }
                entry
            }
            None => self.synthesized_help(),
        }
    }

    fn query(&self, term: &str) -> Vec<Entry> {
        let Some(query) = self.table().query else {
            return Vec::new();
        };
        let Ok(term) = CString::new(term) else {
            tracing::debug!("Query for {} contains a NUL byte, skipped", self.name);
            return Vec::new();
        };

        let mut count = 0usize;
        // SAFETY: `term` outlives the call; `count` is a valid out-pointer.
        unsafe {
            let entries = query(term.as_ptr(), &mut count);
            self.take_entries(entries, count)
        }
    }

    fn participates_in_history(&self) -> bool {
        self.participates_in_history
    }

    fn disables_default_sort(&self) -> bool {
        self.disables_default_sort
    }
}

impl Drop for PluginProvider {
    fn drop(&mut self) {
        if let Some(teardown) = self.table().teardown {
            // SAFETY: the library is still loaded; it is dropped after this body.
            unsafe { teardown() };
        }
        tracing::debug!("Module {} torn down", self.name);
    }
}

impl std::fmt::Debug for PluginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProvider")
            .field("name", &self.name)
            .field("triggers", &self.triggers)
            .field("participates_in_history", &self.participates_in_history)
            .field("disables_default_sort", &self.disables_default_sort)
            .field("dynamic", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

unsafe fn read_triggers(table: &PluginTable) -> Vec<String> {
    let Some(list_triggers) = table.list_triggers else {
        return Vec::new();
    };
    let mut cursor = list_triggers();
    let mut triggers = Vec::new();
    if cursor.is_null() {
        return triggers;
    }
    while !(*cursor).is_null() {
        let trigger = read_str(*cursor);
        if !trigger.is_empty() {
            triggers.push(trigger);
        }
        cursor = cursor.add(1);
    }
    triggers
}

unsafe fn copy_entry(raw: &RawEntry) -> Entry {
    Entry {
        name: read_str(raw.name),
        comment: read_str(raw.comment),
        icon: read_str(raw.icon),
        command: read_str(raw.command),
        category: read_str(raw.category),
        preview_image_path: read_str(raw.preview_image_path),
        rank_score: raw.rank_score,
    }
}
