// crates/dataroute-core/src/runtime/context_store.rs
// ============================================================================
// Module: Context Store
// Description: Thread-scoped data-source and table-mapping override slots.
// Purpose: Guarantee structural save/restore of routing overrides around
//          intercepted calls.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Override slots are thread-local: a value set on one thread is never
//! visible to another. The scoped helpers push an override, run the caller's
//! closure, and pop back to the exact prior value on every exit path —
//! normal return and unwind alike — via RAII guards. Nesting is unbounded
//! and independent per key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::core::RouteError;

// ============================================================================
// SECTION: Thread-Local Slots
// ============================================================================

thread_local! {
    /// Per-thread data-source override.
    static DATA_SOURCE: RefCell<Option<String>> = const { RefCell::new(None) };
    /// Per-thread logical-to-physical table-name overrides.
    static TABLE_MAPPINGS: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

// ============================================================================
// SECTION: Data-Source Slot
// ============================================================================

/// Returns the data-source override for the calling thread.
#[must_use]
pub fn current_data_source() -> Option<String> {
    DATA_SOURCE.with(|slot| slot.borrow().clone())
}

/// Sets the data-source override for the calling thread.
///
/// # Errors
///
/// Returns [`RouteError::InvalidArgument`] when `name` is empty.
pub fn set_data_source(name: &str) -> Result<(), RouteError> {
    if name.is_empty() {
        return Err(RouteError::InvalidArgument("data source name must not be empty".to_string()));
    }
    DATA_SOURCE.with(|slot| *slot.borrow_mut() = Some(name.to_string()));
    Ok(())
}

/// Clears the data-source override for the calling thread.
pub fn clear_data_source() {
    DATA_SOURCE.with(|slot| *slot.borrow_mut() = None);
}

/// Runs `f` with the data-source override set to `name`, restoring the prior
/// value on every exit path.
///
/// # Errors
///
/// Returns [`RouteError::InvalidArgument`] when `name` is empty; `f` is not
/// invoked in that case.
pub fn with_data_source<T>(name: &str, f: impl FnOnce() -> T) -> Result<T, RouteError> {
    if name.is_empty() {
        return Err(RouteError::InvalidArgument("data source name must not be empty".to_string()));
    }
    let _guard = DataSourceGuard::push(name.to_string());
    Ok(f())
}

/// Restores the prior data-source override on drop.
struct DataSourceGuard {
    /// Value to restore when the guard drops.
    prior: Option<String>,
}

impl DataSourceGuard {
    /// Saves the current override and installs `name`.
    fn push(name: String) -> Self {
        let prior = DATA_SOURCE.with(|slot| slot.borrow_mut().replace(name));
        Self {
            prior,
        }
    }
}

impl Drop for DataSourceGuard {
    fn drop(&mut self) {
        let prior = self.prior.take();
        DATA_SOURCE.with(|slot| *slot.borrow_mut() = prior);
    }
}

// ============================================================================
// SECTION: Table-Mapping Slot
// ============================================================================

/// Returns the physical table name for `logical`, or `logical` itself when
/// no mapping is set on the calling thread.
#[must_use]
pub fn table_mapping(logical: &str) -> String {
    TABLE_MAPPINGS.with(|slot| {
        slot.borrow().get(logical).cloned().unwrap_or_else(|| logical.to_string())
    })
}

/// Sets a table mapping for the calling thread.
///
/// # Errors
///
/// Returns [`RouteError::InvalidArgument`] when either name is empty.
pub fn set_table_mapping(logical: &str, physical: &str) -> Result<(), RouteError> {
    if logical.is_empty() || physical.is_empty() {
        return Err(RouteError::InvalidArgument("table names must not be empty".to_string()));
    }
    TABLE_MAPPINGS
        .with(|slot| slot.borrow_mut().insert(logical.to_string(), physical.to_string()));
    Ok(())
}

/// Clears all table mappings for the calling thread.
pub fn clear_table_mappings() {
    TABLE_MAPPINGS.with(|slot| slot.borrow_mut().clear());
}

/// Runs `f` with one table mapping installed, restoring the prior state of
/// that key on every exit path.
///
/// # Errors
///
/// Returns [`RouteError::InvalidArgument`] when either name is empty; `f` is
/// not invoked in that case.
pub fn with_table_mapping<T>(
    logical: &str,
    physical: &str,
    f: impl FnOnce() -> T,
) -> Result<T, RouteError> {
    if logical.is_empty() || physical.is_empty() {
        return Err(RouteError::InvalidArgument("table names must not be empty".to_string()));
    }
    let mut mappings = BTreeMap::new();
    mappings.insert(logical.to_string(), physical.to_string());
    with_table_mappings(&mappings, f)
}

/// Runs `f` with a batch of table mappings installed, saving and restoring
/// every affected key individually. Keys that had no prior mapping are
/// removed again on exit, not left present.
///
/// # Errors
///
/// Returns [`RouteError::InvalidArgument`] when any name is empty; `f` is
/// not invoked in that case.
pub fn with_table_mappings<T>(
    mappings: &BTreeMap<String, String>,
    f: impl FnOnce() -> T,
) -> Result<T, RouteError> {
    for (logical, physical) in mappings {
        if logical.is_empty() || physical.is_empty() {
            return Err(RouteError::InvalidArgument("table names must not be empty".to_string()));
        }
    }
    let _guard = TableMappingGuard::push(mappings);
    Ok(f())
}

/// Restores the prior state of each affected mapping key on drop.
struct TableMappingGuard {
    /// Saved prior value per key; `None` means the key was absent.
    saved: Vec<(String, Option<String>)>,
}

impl TableMappingGuard {
    /// Saves the current state of each key and installs the new mappings.
    fn push(mappings: &BTreeMap<String, String>) -> Self {
        let saved = TABLE_MAPPINGS.with(|slot| {
            let mut current = slot.borrow_mut();
            mappings
                .iter()
                .map(|(logical, physical)| {
                    let prior = current.insert(logical.clone(), physical.clone());
                    (logical.clone(), prior)
                })
                .collect()
        });
        Self {
            saved,
        }
    }
}

impl Drop for TableMappingGuard {
    fn drop(&mut self) {
        let saved = std::mem::take(&mut self.saved);
        TABLE_MAPPINGS.with(|slot| {
            let mut current = slot.borrow_mut();
            for (logical, prior) in saved {
                match prior {
                    Some(physical) => {
                        current.insert(logical, physical);
                    }
                    None => {
                        current.remove(&logical);
                    }
                }
            }
        });
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rejects_empty_name() {
        assert!(set_data_source("").is_err());
    }

    #[test]
    fn scoped_override_restores_prior_value() {
        clear_data_source();
        let outer = with_data_source("outer", || {
            let inner = with_data_source("inner", current_data_source);
            assert_eq!(inner.ok().flatten().as_deref(), Some("inner"));
            current_data_source()
        });
        assert_eq!(outer.ok().flatten().as_deref(), Some("outer"));
        assert_eq!(current_data_source(), None);
    }

    #[test]
    fn unmapped_table_is_identity() {
        clear_table_mappings();
        assert_eq!(table_mapping("user"), "user");
    }
}
