//! Calculator module: `:calc <expression>` evaluates arithmetic with `meval`.
//!
//! Settings (`[plugins.calc]` in the host config):
//! - `precision`: maximum number of decimal places shown (default 10)

use std::ffi::c_char;

use comet_abi::{
    entries_into_raw, export_plugin, read_str, release_entries, HostContext, PluginTable,
    RawEntry, TriggerList, ABI_VERSION, FLAG_NO_HISTORY,
};
use once_cell::sync::{Lazy, OnceCell};

const DEFAULT_PRECISION: usize = 10;
const MAX_PRECISION: usize = 15;

static TRIGGERS: Lazy<TriggerList> = Lazy::new(|| TriggerList::new(&[":calc", "="]));
static PRECISION: OnceCell<usize> = OnceCell::new();

static TABLE: PluginTable = PluginTable {
    abi_version: ABI_VERSION,
    flags: FLAG_NO_HISTORY,
    init: Some(init),
    teardown: None,
    list_triggers: Some(list_triggers),
    help: Some(help),
    query: Some(query),
    release: Some(release),
};

export_plugin!(TABLE);

/// Evaluate a math expression, `None` if it is not one or the result is not finite.
pub fn evaluate(expr: &str) -> Option<f64> {
    let expr = expr.trim();

    if expr.is_empty() || !expr.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    meval::eval_str(expr).ok().filter(|result| result.is_finite())
}

/// Removes unnecessary decimal places (e.g., 4.0 -> "4").
pub fn format_value(value: f64, precision: usize) -> String {
    if value.fract() == 0.0 && value.abs() < 1e12 {
        format!("{}", value as i64)
    } else {
        let formatted = format!("{:.*}", precision, value);
        if formatted.contains('.') {
            formatted
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        } else {
            formatted
        }
    }
}

fn precision() -> usize {
    PRECISION.get().copied().unwrap_or(DEFAULT_PRECISION)
}

unsafe extern "C" fn init(host: *const HostContext) {
    if host.is_null() {
        return;
    }
    let configured = (*host)
        .config_value("precision")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|p| p.min(MAX_PRECISION));
    if let Some(p) = configured {
        let _ = PRECISION.set(p);
    }
}

unsafe extern "C" fn list_triggers() -> *const *const c_char {
    TRIGGERS.as_ptr()
}

unsafe extern "C" fn help() -> *mut RawEntry {
    let entry = RawEntry::new(
        "Calculator",
        "Evaluate arithmetic (:calc 2+2)",
        "accessories-calculator",
        ":calc",
        "help",
    );
    entries_into_raw(vec![entry]).0
}

unsafe extern "C" fn query(term: *const c_char, out_count: *mut usize) -> *mut RawEntry {
    let expr = read_str(term);
    let entries = match evaluate(&expr) {
        Some(value) => {
            let result = format_value(value, precision());
            vec![RawEntry::new(
                &result,
                &format!("{} =", expr.trim()),
                "accessories-calculator",
                &format!("printf '%s\\n' '{}'", result),
                "calc",
            )]
        }
        None => Vec::new(),
    };

    let (ptr, count) = entries_into_raw(entries);
    if !out_count.is_null() {
        *out_count = count;
    }
    ptr
}

unsafe extern "C" fn release(entries: *mut RawEntry, count: usize) {
    release_entries(entries, count);
}
