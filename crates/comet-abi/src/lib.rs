//! Binary interface between the Comet host and its extension modules.
//!
//! A module is a `cdylib` exporting one symbol, [`ENTRY_SYMBOL`], which returns a
//! pointer to a static [`PluginTable`]. The table layout is versioned by
//! [`ABI_VERSION`]; the host refuses any other version.
//!
//! # Memory ownership
//!
//! Everything a module returns (result arrays and the strings inside them) is
//! allocated by the module and stays module-owned until the host passes the same
//! pointer and count back to [`PluginTable::release`]. Strings the host passes in
//! (the query term, callback results) belong to the host.
//!
//! Module authors should build results with [`RawEntry::new`], hand them out with
//! [`entries_into_raw`] and free them in `release` with [`release_entries`]. The
//! two functions are a matched pair and must come from the same module build.
//!
//! # Example
//!
//! ```ignore
//! use comet_abi::*;
//!
//! static TABLE: PluginTable = PluginTable {
//!     abi_version: ABI_VERSION,
//!     flags: FLAG_NO_SORT,
//!     init: None,
//!     teardown: None,
//!     list_triggers: Some(triggers),
//!     help: None,
//!     query: Some(query),
//!     release: Some(release),
//! };
//!
//! export_plugin!(TABLE);
//! ```

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

/// Current layout version of [`PluginTable`]. Bump on any layout change.
pub const ABI_VERSION: u32 = 1;

/// Name of the exported entry function, NUL-terminated for symbol lookup.
pub const ENTRY_SYMBOL: &[u8] = b"comet_plugin_entry\0";

/// The module's results never feed into or receive usage-history scores.
pub const FLAG_NO_HISTORY: u32 = 1 << 0;

/// The module's result order is final and must not be re-sorted.
pub const FLAG_NO_SORT: u32 = 1 << 1;

pub type EntryFn = unsafe extern "C" fn() -> *const PluginTable;
pub type InitFn = unsafe extern "C" fn(host: *const HostContext);
pub type TeardownFn = unsafe extern "C" fn();
pub type ListTriggersFn = unsafe extern "C" fn() -> *const *const c_char;
pub type HelpFn = unsafe extern "C" fn() -> *mut RawEntry;
pub type QueryFn =
    unsafe extern "C" fn(term: *const c_char, out_count: *mut usize) -> *mut RawEntry;
pub type ReleaseFn = unsafe extern "C" fn(entries: *mut RawEntry, count: usize);

pub type GetConfigValueFn =
    unsafe extern "C" fn(ctx: *mut c_void, key: *const c_char) -> *const c_char;
pub type GetDataDirFn = unsafe extern "C" fn(ctx: *mut c_void) -> *const c_char;

/// Capability table exported by a module.
///
/// Every function pointer may be null. The host skips a null `init` or
/// `teardown`, treats a null `query` as "no results" and a null `help` as
/// "synthesize one from the triggers".
#[repr(C)]
#[derive(Debug)]
pub struct PluginTable {
    pub abi_version: u32,
    /// OR of `FLAG_*` bits.
    pub flags: u32,
    /// Called once after loading. The context outlives the module.
    pub init: Option<InitFn>,
    /// Called once before the library is unloaded.
    pub teardown: Option<TeardownFn>,
    /// Null-terminated array of trigger strings. Module-owned, never released.
    pub list_triggers: Option<ListTriggersFn>,
    /// One entry describing the module, or null. Released with count 1.
    pub help: Option<HelpFn>,
    /// Results for `term`; the element count is written to `out_count`.
    pub query: Option<QueryFn>,
    /// Frees an array previously returned by `help` or `query`.
    pub release: Option<ReleaseFn>,
}

/// One result entry as laid out across the boundary.
///
/// Null string pointers are read as empty strings by the host.
#[repr(C)]
#[derive(Debug)]
pub struct RawEntry {
    pub name: *mut c_char,
    pub comment: *mut c_char,
    pub icon: *mut c_char,
    pub command: *mut c_char,
    pub category: *mut c_char,
    pub preview_image_path: *mut c_char,
    pub rank_score: i64,
}

impl RawEntry {
    /// Allocate an entry with module-owned copies of every string.
    pub fn new(name: &str, comment: &str, icon: &str, command: &str, category: &str) -> Self {
        Self {
            name: alloc_str(name),
            comment: alloc_str(comment),
            icon: alloc_str(icon),
            command: alloc_str(command),
            category: alloc_str(category),
            preview_image_path: ptr::null_mut(),
            rank_score: 0,
        }
    }

    pub fn with_preview(mut self, path: &str) -> Self {
        free_str(self.preview_image_path);
        self.preview_image_path = alloc_str(path);
        self
    }

    pub fn with_rank(mut self, rank_score: i64) -> Self {
        self.rank_score = rank_score;
        self
    }

    fn free_strings(&mut self) {
        for field in [
            &mut self.name,
            &mut self.comment,
            &mut self.icon,
            &mut self.command,
            &mut self.category,
            &mut self.preview_image_path,
        ] {
            free_str(*field);
            *field = ptr::null_mut();
        }
    }
}

/// Callbacks the host exposes to one module.
///
/// `ctx` is opaque to the module and must be passed back unchanged. Returned
/// strings are host-owned and stay valid for the lifetime of the module.
#[repr(C)]
#[derive(Debug)]
pub struct HostContext {
    pub ctx: *mut c_void,
    pub get_config_value: Option<GetConfigValueFn>,
    pub get_data_dir: Option<GetDataDirFn>,
}

impl HostContext {
    /// Look up one of this module's configuration keys.
    ///
    /// # Safety
    /// `self` must be the context the host passed to `init`.
    pub unsafe fn config_value(&self, key: &str) -> Option<String> {
        let lookup = self.get_config_value?;
        let key = CString::new(key).ok()?;
        let value = lookup(self.ctx, key.as_ptr());
        if value.is_null() {
            None
        } else {
            Some(read_str(value))
        }
    }

    /// The host's shared data directory.
    ///
    /// # Safety
    /// `self` must be the context the host passed to `init`.
    pub unsafe fn data_dir(&self) -> Option<String> {
        let lookup = self.get_data_dir?;
        let value = lookup(self.ctx);
        if value.is_null() {
            None
        } else {
            Some(read_str(value))
        }
    }
}

/// Null-terminated trigger array with stable addresses.
///
/// Meant to live in a `static` (e.g. behind `once_cell::sync::Lazy`) so the
/// pointer returned from `list_triggers` stays valid for the module lifetime.
#[derive(Debug)]
pub struct TriggerList {
    _owned: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

// The pointers only reference `_owned`, which is never mutated after construction.
unsafe impl Send for TriggerList {}
unsafe impl Sync for TriggerList {}

impl TriggerList {
    pub fn new(triggers: &[&str]) -> Self {
        let owned: Vec<CString> = triggers
            .iter()
            .filter_map(|t| CString::new(*t).ok())
            .collect();
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(ptr::null());
        Self {
            _owned: owned,
            ptrs,
        }
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hand a vector of entries to the host.
///
/// Returns `(null, 0)` for an empty vector. The array must be freed with
/// [`release_entries`] from the same module.
pub fn entries_into_raw(entries: Vec<RawEntry>) -> (*mut RawEntry, usize) {
    if entries.is_empty() {
        return (ptr::null_mut(), 0);
    }
    let boxed = entries.into_boxed_slice();
    let count = boxed.len();
    (Box::into_raw(boxed) as *mut RawEntry, count)
}

/// Free an array produced by [`entries_into_raw`].
///
/// A null pointer or zero count is a no-op.
///
/// # Safety
/// `entries` and `count` must be exactly what `entries_into_raw` returned, and
/// the array must not be used afterwards.
pub unsafe fn release_entries(entries: *mut RawEntry, count: usize) {
    if entries.is_null() || count == 0 {
        return;
    }
    let slice = Box::from_raw(ptr::slice_from_raw_parts_mut(entries, count));
    for mut entry in slice.into_vec() {
        entry.free_strings();
    }
}

/// Copy a C string into an owned `String`. Null reads as empty; invalid UTF-8
/// is replaced lossily.
///
/// # Safety
/// A non-null `ptr` must point to a NUL-terminated string valid for the call.
pub unsafe fn read_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

fn alloc_str(s: &str) -> *mut c_char {
    let s = CString::new(s).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|b| *b != 0);
        CString::new(bytes).unwrap_or_default()
    });
    s.into_raw()
}

fn free_str(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: every non-null string in a RawEntry comes from alloc_str.
        unsafe { drop(CString::from_raw(s)) };
    }
}

/// Export `$table` (a `static PluginTable`) under [`ENTRY_SYMBOL`].
#[macro_export]
macro_rules! export_plugin {
    ($table:path) => {
        #[no_mangle]
        pub extern "C" fn comet_plugin_entry() -> *const $crate::PluginTable {
            &$table
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_round_trip_through_release() {
        let entries = vec![
            RawEntry::new("Firefox", "Web browser", "firefox", "firefox", "app"),
            RawEntry::new("Files", "", "", "nautilus", "app").with_rank(3),
        ];
        let (ptr, count) = entries_into_raw(entries);
        assert!(!ptr.is_null());
        assert_eq!(count, 2);

        unsafe {
            let slice = std::slice::from_raw_parts(ptr, count);
            assert_eq!(read_str(slice[0].name), "Firefox");
            assert_eq!(read_str(slice[1].comment), "");
            assert_eq!(read_str(slice[1].preview_image_path), "");
            assert_eq!(slice[1].rank_score, 3);
            release_entries(ptr, count);
        }
    }

    #[test]
    fn test_empty_vec_is_null() {
        let (ptr, count) = entries_into_raw(Vec::new());
        assert!(ptr.is_null());
        assert_eq!(count, 0);
        unsafe { release_entries(ptr, count) };
    }

    #[test]
    fn test_interior_nul_is_stripped() {
        let entry = RawEntry::new("a\0b", "", "", "", "");
        unsafe {
            assert_eq!(read_str(entry.name), "ab");
        }
        let (ptr, count) = entries_into_raw(vec![entry]);
        unsafe { release_entries(ptr, count) };
    }

    #[test]
    fn test_preview_path() {
        let entry = RawEntry::new("x", "", "", "", "").with_preview("/tmp/x.png");
        unsafe {
            assert_eq!(read_str(entry.preview_image_path), "/tmp/x.png");
        }
        let (ptr, count) = entries_into_raw(vec![entry]);
        unsafe { release_entries(ptr, count) };
    }

    #[test]
    fn test_trigger_list_is_null_terminated() {
        let list = TriggerList::new(&[":calc", "="]);
        assert_eq!(list.len(), 2);
        unsafe {
            let ptr = list.as_ptr();
            assert_eq!(read_str(*ptr), ":calc");
            assert_eq!(read_str(*ptr.add(1)), "=");
            assert!((*ptr.add(2)).is_null());
        }
    }

    #[test]
    fn test_read_str_null_is_empty() {
        assert_eq!(unsafe { read_str(ptr::null()) }, "");
    }

    #[test]
    fn test_host_context_without_callbacks() {
        let host = HostContext {
            ctx: ptr::null_mut(),
            get_config_value: None,
            get_data_dir: None,
        };
        unsafe {
            assert_eq!(host.config_value("precision"), None);
            assert_eq!(host.data_dir(), None);
        }
    }
}
